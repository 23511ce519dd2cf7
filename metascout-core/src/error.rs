use metascout_model::ErrorProjection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScoutError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Could not reach search server: {0}")]
    TransportFailure(String),

    #[error("Server rejected search: {0}")]
    Server(String),

    #[error("Malformed stream payload: {0}")]
    Codec(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoutError {
    /// Connection-level failures, as opposed to explicit server answers.
    pub fn is_transport(&self) -> bool {
        matches!(self, ScoutError::TransportFailure(_) | ScoutError::Io(_))
    }

    /// Reduce the error to the single projection handed to the renderer.
    pub fn projection(&self) -> ErrorProjection {
        match self {
            ScoutError::Server(message) => ErrorProjection {
                message: message.clone(),
                recoverable: false,
            },
            other => ErrorProjection {
                message: other.to_string(),
                recoverable: other.is_transport(),
            },
        }
    }
}

impl From<reqwest::Error> for ScoutError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ScoutError::Codec(err.to_string())
        } else {
            ScoutError::TransportFailure(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ScoutError>;
