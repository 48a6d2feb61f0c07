//! Core abstractions for session state management.
//!
//! This crate provides the fundamental building blocks:
//! - `SessionHandler` - The capability contract every storage backend satisfies
//! - `HandlerContext` - Shared view of the owning engine's declared save path
//! - `SavePath` - Save path data and its native connection-string rendering
//! - `codec` - The flat `name|tag:len:value;` session wire format

pub mod codec;
pub mod context;
pub mod path;
pub mod traits;

pub use codec::{CodecError, Content};
pub use context::HandlerContext;
pub use path::{NetworkAddress, SavePath, SavePathError};
pub use traits::{HandlerError, MAX_SESSION_ID_LEN, SessionHandler, is_valid_session_id};
