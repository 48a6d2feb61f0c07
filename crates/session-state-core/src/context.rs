//! Handler context shared between an engine and its backends.

use std::sync::{Arc, PoisonError, RwLock};

use crate::SavePath;

/// Shared view of the owning engine's declared save path.
///
/// The engine keeps this updated whenever its save path changes. Backends
/// built by a factory receive a clone and read the current path when they
/// open, rather than trusting whatever string was passed to `open`.
#[derive(Debug, Clone, Default)]
pub struct HandlerContext {
    save_path: Arc<RwLock<SavePath>>,
}

impl HandlerContext {
    /// Create a context with an initial save path.
    #[must_use]
    pub fn new(save_path: SavePath) -> Self {
        Self {
            save_path: Arc::new(RwLock::new(save_path)),
        }
    }

    /// Get the save path currently declared by the engine.
    #[must_use]
    pub fn save_path(&self) -> SavePath {
        self.save_path
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Publish a new save path to every holder of this context.
    pub fn set_save_path(&self, save_path: SavePath) {
        *self
            .save_path
            .write()
            .unwrap_or_else(PoisonError::into_inner) = save_path;
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_clones_share_path() {
        let ctx = HandlerContext::new(SavePath::from("a"));
        let seen_by_backend = ctx.clone();

        ctx.set_save_path(SavePath::Data(json!({"host": "h"})));
        assert_eq!(
            seen_by_backend.save_path(),
            SavePath::Data(json!({"host": "h"}))
        );
    }

    #[test]
    fn test_default_is_empty_text() {
        assert_eq!(HandlerContext::default().save_path().as_text(), Some(""));
    }
}
