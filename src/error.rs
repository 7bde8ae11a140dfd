use std::convert::Infallible;

/// Failure kinds surfaced to callers of the marketplace core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthorized,
    Forbidden,
    NotFound,
    InvalidInput,
    InvalidTransition,
    Conflict,
    Internal,
}

#[derive(thiserror::Error, Debug)]
pub enum MarketError {
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Invalid status: {0}")]
    InvalidStatus(String),
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("Record encoding failed: {0}")]
    Encoding(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl MarketError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::InvalidInput(_) | Self::InvalidStatus(_) => ErrorKind::InvalidInput,
            Self::InvalidTransition(_) => ErrorKind::InvalidTransition,
            Self::Conflict(_) => ErrorKind::Conflict,
            Self::Storage(_) | Self::Encoding(_) | Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<minicbor::encode::Error<Infallible>> for MarketError {
    fn from(value: minicbor::encode::Error<Infallible>) -> Self {
        Self::Encoding(value.to_string())
    }
}

impl From<minicbor::decode::Error> for MarketError {
    fn from(value: minicbor::decode::Error) -> Self {
        Self::Encoding(value.to_string())
    }
}
