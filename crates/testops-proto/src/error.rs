use thiserror::Error;

/// Errors surfaced by a [`crate::ReportingService`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
