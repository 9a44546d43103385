use dmdj_proto::protocol::{Channel, Method};
use thiserror::Error;

/// Everything that can go wrong talking to the remote service.  None of
/// these are fatal: a failed command simply does not take effect.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Non-2xx answer to a command.
    #[error("{method} {path} failed: {status}")]
    Status {
        method: Method,
        path: String,
        status: u16,
    },

    /// Network failure before a status was received.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("remote base URL is not configured (set $DMDJ_API)")]
    NotConfigured,

    #[error("{channel} does not support '{action}'")]
    Unsupported {
        channel: Channel,
        action: &'static str,
    },

    /// A 2xx response whose body could not be decoded.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// Push channel could not be opened or broke.
    #[error("push connection error: {0}")]
    Connection(String),

    /// Push message that is not a valid partial snapshot.
    #[error("malformed push message: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type Result<T, E = ClientError> = std::result::Result<T, E>;
