//! Session engine errors.

use session_state_core::{CodecError, SavePathError};
use thiserror::Error;

use crate::config::ConfigError;

/// Session engine error.
///
/// Backend I/O failures are not represented here: they surface as a
/// `false` result from the lifecycle call that hit them.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("A session had already been started")]
    AlreadyStarted,
    #[error("Cannot instance session handler '{0}' - session startup failed")]
    UnknownHandler(String),
    #[error("Invalid save path for session handler '{handler}': {source}")]
    InvalidSavePath {
        handler: String,
        #[source]
        source: SavePathError,
    },
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Session data error: {0}")]
    Codec(#[from] CodecError),
}

impl SessionError {
    /// Whether the operation needed an idle engine but found an active session.
    #[must_use]
    pub const fn is_state_conflict(&self) -> bool {
        matches!(self, Self::AlreadyStarted)
    }

    /// Whether the backend or its path could not be resolved.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownHandler(_) | Self::InvalidSavePath { .. } | Self::Config(_)
        )
    }
}
