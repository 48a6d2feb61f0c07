//! Session lifecycle engine with pluggable storage.
//!
//! Provides:
//! - `Session` - Configure, start, mutate, commit and release a session
//! - `HandlerRegistry` - Resolve backend names to handlers
//! - `SaveMethods` - Build a handler from six callbacks
//! - Storage implementations (files, memory)
//!
//! Wire format and the handler contract live in `session_state_core`.

pub mod bridge;
pub mod config;
pub mod cookie;
pub mod engine;
pub mod error;
pub mod registry;
pub mod storage;

pub use bridge::{CallbackHandler, SaveMethods};
pub use config::{ConfigError, ConfigStore, IniDefaults, IniValue, SessionOptions};
pub use cookie::ResponseCookie;
pub use engine::{Session, SessionBuilder, SessionScope};
pub use error::SessionError;
pub use registry::{Backend, HandlerFactory, HandlerRegistry};
pub use session_state_core::{
    Content, HandlerContext, HandlerError, NetworkAddress, SavePath, SessionHandler,
};
