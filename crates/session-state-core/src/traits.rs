//! Core traits for session storage backends.

use thiserror::Error;

/// Handler error.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid session id: {0}")]
    InvalidId(String),
    #[error("Handler error: {0}")]
    Internal(String),
    #[error("Operation rejected: {0}")]
    Rejected(String),
}

/// Longest session id the engine will accept from outside.
pub const MAX_SESSION_ID_LEN: usize = 256;

/// Check that an id is non-empty, bounded, and uses only `[A-Za-z0-9,-]`.
#[must_use]
pub fn is_valid_session_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_SESSION_ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b',' || b == b'-')
}

/// Trait for session storage backends.
///
/// Every operation is a synchronous call. A backend signals failure by
/// returning an error; the engine decides what that means for the caller.
/// Backends are shared behind `Arc`, so state lives behind interior
/// mutability.
pub trait SessionHandler: Send + Sync {
    /// Prepare the backend for one start/close cycle.
    ///
    /// Called once per start with the resolved save path and the session
    /// (cookie) name. The backend may cache either.
    fn open(&self, save_path: &str, session_name: &str) -> Result<(), HandlerError>;

    /// Read the stored payload for a session.
    ///
    /// Unknown ids are not an error: they yield an empty payload.
    fn read(&self, session_id: &str) -> Result<Vec<u8>, HandlerError>;

    /// Replace the stored payload for a session.
    fn write(&self, session_id: &str, data: &[u8]) -> Result<(), HandlerError>;

    /// Remove the stored payload for a session. No-op if absent.
    fn destroy(&self, session_id: &str) -> Result<(), HandlerError>;

    /// Opportunistically remove entries idle for longer than `max_lifetime` seconds.
    fn gc(&self, max_lifetime: u64) -> Result<(), HandlerError>;

    /// Release resources acquired by `open`.
    fn close(&self) -> Result<(), HandlerError>;
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Mutex};

    use super::*;

    #[derive(Default)]
    struct MapHandler {
        tmp: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl SessionHandler for MapHandler {
        fn open(&self, _save_path: &str, _session_name: &str) -> Result<(), HandlerError> {
            Ok(())
        }

        fn read(&self, session_id: &str) -> Result<Vec<u8>, HandlerError> {
            Ok(self
                .tmp
                .lock()
                .map_err(|e| HandlerError::Internal(e.to_string()))?
                .get(session_id)
                .cloned()
                .unwrap_or_default())
        }

        fn write(&self, session_id: &str, data: &[u8]) -> Result<(), HandlerError> {
            self.tmp
                .lock()
                .map_err(|e| HandlerError::Internal(e.to_string()))?
                .insert(session_id.to_string(), data.to_vec());
            Ok(())
        }

        fn destroy(&self, session_id: &str) -> Result<(), HandlerError> {
            self.tmp
                .lock()
                .map_err(|e| HandlerError::Internal(e.to_string()))?
                .remove(session_id);
            Ok(())
        }

        fn gc(&self, _max_lifetime: u64) -> Result<(), HandlerError> {
            Ok(())
        }

        fn close(&self) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn test_handler_is_object_safe() {
        let handler: Box<dyn SessionHandler> = Box::new(MapHandler::default());
        handler.open("", "sid").unwrap();
        assert!(handler.read("missing").unwrap().is_empty());

        handler.write("a", b"foo|s:3:\"bar\";").unwrap();
        assert_eq!(handler.read("a").unwrap(), b"foo|s:3:\"bar\";");

        handler.destroy("a").unwrap();
        handler.destroy("a").unwrap();
        assert!(handler.read("a").unwrap().is_empty());
        handler.close().unwrap();
    }

    #[test]
    fn test_session_id_validation() {
        assert!(is_valid_session_id("abc123"));
        assert!(is_valid_session_id("a,b-c"));
        assert!(!is_valid_session_id(""));
        assert!(!is_valid_session_id("../etc"));
        assert!(!is_valid_session_id("a b"));
        assert!(!is_valid_session_id(&"a".repeat(MAX_SESSION_ID_LEN + 1)));
    }

    #[test]
    fn test_error_display() {
        let err = HandlerError::InvalidId("../etc".to_string());
        assert_eq!(err.to_string(), "Invalid session id: ../etc");

        let err: HandlerError = std::io::Error::other("disk full").into();
        assert!(err.to_string().starts_with("I/O error"));
    }
}
