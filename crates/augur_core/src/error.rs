use thiserror::Error;

#[derive(Debug, Error)]
pub enum AugurError {
    #[error("schema error: {message}")]
    Schema { message: String },
    #[error("validation error: {message}")]
    Validation { message: String },
    #[error("storage error: {message}")]
    Storage { message: String },
    #[error("config error: {message}")]
    Config { message: String },
    #[error("not found: {message}")]
    NotFound { message: String },
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },
}

impl AugurError {
    pub fn schema(message: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// The bare message, without the category prefix added by `Display`.
    pub fn message(&self) -> &str {
        match self {
            Self::Schema { message }
            | Self::Validation { message }
            | Self::Storage { message }
            | Self::Config { message }
            | Self::NotFound { message }
            | Self::InvalidArgument { message } => message,
        }
    }
}

pub type AugurResult<T> = Result<T, AugurError>;

impl From<sea_orm::DbErr> for AugurError {
    fn from(value: sea_orm::DbErr) -> Self {
        AugurError::storage(value.to_string())
    }
}
