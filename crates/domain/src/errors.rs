use thiserror::Error;

/// 领域错误类型。
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid argument {field}: {reason}")]
    InvalidArgument { field: String, reason: String },

    #[error("chat not found")]
    ChatNotFound,

    #[error("message not found")]
    MessageNotFound,

    #[error("user not found")]
    UserNotFound,

    #[error("user is not a chat participant")]
    NotAParticipant,

    #[error("user already exists")]
    UserAlreadyExists,

    #[error("invalid credentials")]
    InvalidCredentials,
}

impl DomainError {
    pub fn invalid_argument(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;
