//! Domain error taxonomy shared by every component.

use thiserror::Error;

/// The stable tag codes clients use to localize conflict errors.
pub mod tags {
    pub const ACTIVE_IN_OTHER_CHAT: &str = "#ERR_01";
    pub const ALREADY_IN_CALL: &str = "#ERR_02";
    pub const BUSY: &str = "#ERR_03";
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("access denied")]
    AccessDenied,

    #[error("feature disabled")]
    FeatureDisabled,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {message} ({tag})")]
    Conflict { tag: &'static str, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn active_in_other_chat() -> Self {
        CoreError::Conflict {
            tag: tags::ACTIVE_IN_OTHER_CHAT,
            message: "user already has an active call in another chat".into(),
        }
    }

    pub fn already_in_call() -> Self {
        CoreError::Conflict {
            tag: tags::ALREADY_IN_CALL,
            message: "user already in this call".into(),
        }
    }

    pub fn busy() -> Self {
        CoreError::Conflict {
            tag: tags::BUSY,
            message: "target user is busy".into(),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::QueryReturnedNoRows => {
                CoreError::NotFound("row not found".to_string())
            }
            other => CoreError::Internal(other.to_string()),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
