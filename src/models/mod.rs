pub mod attendee;
pub mod ticket;
pub mod user;
pub mod validation;

pub use attendee::Attendee;
pub use ticket::{Ticket, TicketType};
pub use user::User;
pub use validation::{
    NewValidation, PendingValidation, TicketDetails, ValidationEvent, ValidationFilter,
    ValidationPage, ValidationStats, ValidationWithGuard,
};
