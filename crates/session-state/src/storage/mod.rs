//! Storage implementations.

#[cfg(feature = "files")]
pub mod files;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "files")]
pub use files::FilesHandler;
#[cfg(feature = "memory")]
pub use memory::MemoryHandler;
