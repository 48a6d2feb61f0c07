//! Callback-based handler.
//!
//! Lets callers supply six functions instead of implementing
//! [`SessionHandler`] themselves.

use std::fmt;

use session_state_core::{HandlerContext, HandlerError, SavePath, SessionHandler};

type OpenFn = dyn Fn(&SavePath, &str) -> Result<(), HandlerError> + Send + Sync;
type CloseFn = dyn Fn() -> Result<(), HandlerError> + Send + Sync;
type ReadFn = dyn Fn(&str) -> Result<Vec<u8>, HandlerError> + Send + Sync;
type WriteFn = dyn Fn(&str, &[u8]) -> Result<(), HandlerError> + Send + Sync;
type DestroyFn = dyn Fn(&str) -> Result<(), HandlerError> + Send + Sync;
type GcFn = dyn Fn(u64) -> Result<(), HandlerError> + Send + Sync;

/// The six callbacks behind a [`CallbackHandler`].
///
/// `open` receives the engine's declared save path in its structured form,
/// not the resolved string.
pub struct SaveMethods {
    open: Box<OpenFn>,
    close: Box<CloseFn>,
    read: Box<ReadFn>,
    write: Box<WriteFn>,
    destroy: Box<DestroyFn>,
    gc: Box<GcFn>,
}

impl SaveMethods {
    /// Bundle the callbacks.
    #[must_use]
    pub fn new<O, C, R, W, D, G>(open: O, close: C, read: R, write: W, destroy: D, gc: G) -> Self
    where
        O: Fn(&SavePath, &str) -> Result<(), HandlerError> + Send + Sync + 'static,
        C: Fn() -> Result<(), HandlerError> + Send + Sync + 'static,
        R: Fn(&str) -> Result<Vec<u8>, HandlerError> + Send + Sync + 'static,
        W: Fn(&str, &[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
        D: Fn(&str) -> Result<(), HandlerError> + Send + Sync + 'static,
        G: Fn(u64) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            open: Box::new(open),
            close: Box::new(close),
            read: Box::new(read),
            write: Box::new(write),
            destroy: Box::new(destroy),
            gc: Box::new(gc),
        }
    }
}

impl fmt::Debug for SaveMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SaveMethods").finish_non_exhaustive()
    }
}

/// Handler that forwards every operation to a [`SaveMethods`] bundle.
#[derive(Debug)]
pub struct CallbackHandler {
    ctx: HandlerContext,
    methods: SaveMethods,
}

impl CallbackHandler {
    /// Create a handler reading the save path through `ctx`.
    #[must_use]
    pub const fn new(ctx: HandlerContext, methods: SaveMethods) -> Self {
        Self { ctx, methods }
    }
}

impl SessionHandler for CallbackHandler {
    fn open(&self, _save_path: &str, session_name: &str) -> Result<(), HandlerError> {
        let save_path = self.ctx.save_path();
        (self.methods.open)(&save_path, session_name)
    }

    fn read(&self, session_id: &str) -> Result<Vec<u8>, HandlerError> {
        (self.methods.read)(session_id)
    }

    fn write(&self, session_id: &str, data: &[u8]) -> Result<(), HandlerError> {
        (self.methods.write)(session_id, data)
    }

    fn destroy(&self, session_id: &str) -> Result<(), HandlerError> {
        (self.methods.destroy)(session_id)
    }

    fn gc(&self, max_lifetime: u64) -> Result<(), HandlerError> {
        (self.methods.gc)(max_lifetime)
    }

    fn close(&self) -> Result<(), HandlerError> {
        (self.methods.close)()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use super::*;

    #[test]
    fn test_forwards_with_live_path() {
        let calls = Arc::new(Mutex::new(Vec::<String>::new()));
        let log = |calls: &Arc<Mutex<Vec<String>>>| {
            let calls = Arc::clone(calls);
            move |entry: String| calls.lock().unwrap().push(entry)
        };

        let on_open = log(&calls);
        let on_close = log(&calls);
        let on_write = log(&calls);
        let on_destroy = log(&calls);
        let on_gc = log(&calls);
        let methods = SaveMethods::new(
            move |path, name| {
                on_open(format!("open {path:?} {name}"));
                Ok(())
            },
            move || {
                on_close("close".to_string());
                Ok(())
            },
            |id| Ok(format!("n|s:{}:\"{id}\";", id.len()).into_bytes()),
            move |id, data| {
                on_write(format!("write {id} {}", data.len()));
                Ok(())
            },
            move |id| {
                on_destroy(format!("destroy {id}"));
                Ok(())
            },
            move |max| {
                on_gc(format!("gc {max}"));
                Ok(())
            },
        );

        let ctx = HandlerContext::new(SavePath::from("a"));
        let handler = CallbackHandler::new(ctx.clone(), methods);
        ctx.set_save_path(SavePath::Data(json!({"host": "db"})));

        handler.open("ignored", "sid").unwrap();
        assert_eq!(handler.read("ab").unwrap(), b"n|s:2:\"ab\";");
        handler.write("ab", b"xyz").unwrap();
        handler.destroy("ab").unwrap();
        handler.gc(60).unwrap();
        handler.close().unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(
            *calls,
            vec![
                format!("open {:?} sid", SavePath::Data(json!({"host": "db"}))),
                "write ab 3".to_string(),
                "destroy ab".to_string(),
                "gc 60".to_string(),
                "close".to_string(),
            ]
        );
    }

    #[test]
    fn test_errors_propagate() {
        let methods = SaveMethods::new(
            |_, _| Err(HandlerError::Rejected("no".to_string())),
            || Ok(()),
            |_| Ok(Vec::new()),
            |_, _| Ok(()),
            |_| Ok(()),
            |_| Ok(()),
        );
        let handler = CallbackHandler::new(HandlerContext::default(), methods);
        assert!(matches!(
            handler.open("", "sid"),
            Err(HandlerError::Rejected(_))
        ));
    }
}
