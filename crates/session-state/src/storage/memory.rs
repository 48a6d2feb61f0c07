//! In-memory session storage.

use std::{
    collections::HashMap,
    sync::RwLock,
    time::{SystemTime, UNIX_EPOCH},
};

use session_state_core::{HandlerError, SessionHandler};

struct Entry {
    data: Vec<u8>,
    updated_at: u64,
}

/// In-memory storage implementation.
///
/// Useful for tests and single-process deployments.
/// Data is lost on restart.
pub struct MemoryHandler {
    payloads: RwLock<HashMap<String, Entry>>,
    opened: RwLock<Option<(String, String)>>,
}

impl MemoryHandler {
    /// Create a new in-memory handler.
    #[must_use]
    pub fn new() -> Self {
        Self {
            payloads: RwLock::new(HashMap::new()),
            opened: RwLock::new(None),
        }
    }

    /// Stored payload for a session, if any.
    #[must_use]
    pub fn payload(&self, session_id: &str) -> Option<Vec<u8>> {
        self.payloads
            .read()
            .ok()?
            .get(session_id)
            .map(|entry| entry.data.clone())
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.payloads.read().map_or(0, |payloads| payloads.len())
    }

    /// Whether nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Save path and session name from the last `open`.
    #[must_use]
    pub fn opened_with(&self) -> Option<(String, String)> {
        self.opened.read().ok()?.clone()
    }
}

impl Default for MemoryHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl SessionHandler for MemoryHandler {
    fn open(&self, save_path: &str, session_name: &str) -> Result<(), HandlerError> {
        *self
            .opened
            .write()
            .map_err(|e| HandlerError::Internal(e.to_string()))? =
            Some((save_path.to_string(), session_name.to_string()));
        Ok(())
    }

    fn read(&self, session_id: &str) -> Result<Vec<u8>, HandlerError> {
        Ok(self
            .payloads
            .read()
            .map_err(|e| HandlerError::Internal(e.to_string()))?
            .get(session_id)
            .map(|entry| entry.data.clone())
            .unwrap_or_default())
    }

    fn write(&self, session_id: &str, data: &[u8]) -> Result<(), HandlerError> {
        self.payloads
            .write()
            .map_err(|e| HandlerError::Internal(e.to_string()))?
            .insert(
                session_id.to_string(),
                Entry {
                    data: data.to_vec(),
                    updated_at: now(),
                },
            );
        Ok(())
    }

    fn destroy(&self, session_id: &str) -> Result<(), HandlerError> {
        self.payloads
            .write()
            .map_err(|e| HandlerError::Internal(e.to_string()))?
            .remove(session_id);
        Ok(())
    }

    fn gc(&self, max_lifetime: u64) -> Result<(), HandlerError> {
        let cutoff = now().saturating_sub(max_lifetime);
        let mut payloads = self
            .payloads
            .write()
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        let before = payloads.len();
        payloads.retain(|_, entry| entry.updated_at >= cutoff);
        tracing::debug!(removed = before - payloads.len(), "Memory session gc");
        Ok(())
    }

    fn close(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}
