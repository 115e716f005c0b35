use testops_proto::ServiceError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error: {status} - {body}")]
    ApiError { status: u16, body: String },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Missing field in response: {0}")]
    MissingField(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

impl From<ClientError> for ServiceError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::HttpError(e) => ServiceError::Transport(e.to_string()),
            ClientError::ApiError { status, body } => ServiceError::Api {
                status,
                message: body,
            },
            ClientError::ConfigError(msg) => ServiceError::InvalidRequest(msg),
            ClientError::MissingField(field) => {
                ServiceError::Decode(format!("missing field '{}'", field))
            }
            ClientError::IoError(e) => ServiceError::Io(e),
        }
    }
}
