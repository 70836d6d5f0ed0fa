pub mod codec;
pub mod sync;
pub mod validation;

pub use codec::{AttendeeSnapshot, RedemptionCodec, RedemptionCredential};
pub use sync::{SyncCoordinator, SyncIngest};
pub use validation::{TicketIssuer, ValidationRecorder};
