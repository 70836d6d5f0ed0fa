use std::env;
use std::time::Duration;

pub mod cors;
pub mod security;
pub mod server_mode;

pub use cors::create_cors_layer;
pub use security::create_security_headers_layer;
pub use server_mode::ServerMode;

const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

/// Process configuration, resolved once at startup and passed into
/// components by constructor. Nothing reads the environment at call time.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub server_mode: ServerMode,
    /// 32-byte key for the redemption code cipher.
    pub redemption_secret: [u8; 32],
    /// Base URL of the global server, required for sync pushes.
    pub global_server_url: Option<String>,
    /// Shared key for the sync wire protocol, both sides.
    pub sync_api_key: Option<String>,
    pub sync_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let server_mode = ServerMode::from_parts(
            &env::var("SERVER_MODE").unwrap_or_else(|_| "global".to_string()),
            env::var("LOCAL_SERVER_ID").ok(),
        )?;

        let secret = env::var("REDEMPTION_CODE_PRIVATE_KEY")
            .map_err(|_| "REDEMPTION_CODE_PRIVATE_KEY must be set".to_string())?;
        let redemption_secret = parse_secret(&secret)?;

        let sync_timeout = env::var("SYNC_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_SYNC_TIMEOUT_SECS);

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost/gatepass".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(3001),
            server_mode,
            redemption_secret,
            global_server_url: env::var("GLOBAL_SERVER_URL").ok(),
            sync_api_key: env::var("GLOBAL_SERVER_SYNC_API_KEY").ok(),
            sync_timeout: Duration::from_secs(sync_timeout),
        })
    }
}

/// The cipher key is the raw bytes of the configured secret, which must be
/// exactly 32 bytes for AES-256.
fn parse_secret(secret: &str) -> Result<[u8; 32], String> {
    let bytes = secret.as_bytes();
    if bytes.len() != 32 {
        return Err(format!(
            "REDEMPTION_CODE_PRIVATE_KEY must be exactly 32 bytes, got {}",
            bytes.len()
        ));
    }
    let mut key = [0u8; 32];
    key.copy_from_slice(bytes);
    Ok(key)
}
