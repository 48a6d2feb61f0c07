#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use serde_json::{Map, Value};
use session_state::{Backend, HandlerError, SessionHandler};

/// Handler keeping payloads in a map and remembering the last open path.
#[derive(Default)]
pub struct RecordingHandler {
    path: Mutex<Option<String>>,
    tmp: Mutex<HashMap<String, String>>,
}

impl RecordingHandler {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn path(&self) -> Option<String> {
        self.path.lock().unwrap().clone()
    }

    pub fn tmp(&self, id: &str) -> Option<String> {
        self.tmp.lock().unwrap().get(id).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.tmp.lock().unwrap().is_empty()
    }
}

impl SessionHandler for RecordingHandler {
    fn open(&self, save_path: &str, _session_name: &str) -> Result<(), HandlerError> {
        *self.path.lock().unwrap() = Some(save_path.to_string());
        Ok(())
    }

    fn read(&self, session_id: &str) -> Result<Vec<u8>, HandlerError> {
        Ok(self.tmp(session_id).unwrap_or_default().into_bytes())
    }

    fn write(&self, session_id: &str, data: &[u8]) -> Result<(), HandlerError> {
        let data = String::from_utf8(data.to_vec()).map_err(|e| HandlerError::Internal(e.to_string()))?;
        self.tmp.lock().unwrap().insert(session_id.to_string(), data);
        Ok(())
    }

    fn destroy(&self, session_id: &str) -> Result<(), HandlerError> {
        self.tmp.lock().unwrap().remove(session_id);
        Ok(())
    }

    fn gc(&self, _max_lifetime: u64) -> Result<(), HandlerError> {
        Ok(())
    }

    fn close(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}

pub fn backend(handler: &Arc<RecordingHandler>) -> Backend {
    Backend::handler(Arc::clone(handler))
}

/// Build expected content from string pairs.
pub fn content(pairs: &[(&str, &str)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), Value::from(*v)))
        .collect()
}
