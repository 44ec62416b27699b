use crate::gateway::GatewayError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{kind} {name} not found")]
    NotFound { kind: &'static str, name: String },

    #[error("Deployment {0} declares no containers")]
    MalformedWorkload(String),

    #[error("Image tag must not be empty")]
    InvalidTag,

    #[error("{0:?} is not a valid application name")]
    InvalidName(String),

    #[error("Cluster gateway error: {0}")]
    Gateway(GatewayError),

    #[error("Operation cancelled")]
    Cancelled,
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::NotFound { kind, name } => AppError::NotFound { kind, name },
            other => AppError::Gateway(other),
        }
    }
}
