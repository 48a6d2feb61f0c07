//! Backend identities and the handler registry.

use std::{collections::HashMap, fmt, sync::Arc};

use session_state_core::{HandlerContext, SessionHandler};

use crate::error::SessionError;

/// Factory producing a backend for one engine.
pub type HandlerFactory = Arc<dyn Fn(&HandlerContext) -> Arc<dyn SessionHandler> + Send + Sync>;

/// A declared backend: a name to resolve, or a ready handler instance.
#[derive(Clone)]
pub enum Backend {
    /// Native tag, registered type name, or built-in short name.
    Named(String),
    /// A handler used as-is.
    Handler(Arc<dyn SessionHandler>),
}

impl Backend {
    /// Wrap a concrete handler.
    #[must_use]
    pub fn handler<H: SessionHandler + 'static>(handler: Arc<H>) -> Self {
        Self::Handler(handler)
    }

    /// The name, if this is a named backend.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Named(name) => Some(name.as_str()),
            Self::Handler(_) => None,
        }
    }
}

impl PartialEq for Backend {
    /// Names compare by value, instances by identity.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Named(a), Self::Named(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
            _ => false,
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Handler(handler) => write!(f, "Handler({:p})", Arc::as_ptr(handler)),
        }
    }
}

impl From<&str> for Backend {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for Backend {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn SessionHandler>> for Backend {
    fn from(handler: Arc<dyn SessionHandler>) -> Self {
        Self::Handler(handler)
    }
}

/// A backend after resolution.
#[derive(Clone)]
pub(crate) enum ActiveHandler {
    /// A well-known backend addressed by its native tag.
    Native {
        tag: &'static str,
        handler: Arc<dyn SessionHandler>,
    },
    /// Any other handler instance.
    Instance(Arc<dyn SessionHandler>),
}

impl fmt::Debug for ActiveHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native { tag, handler } => write!(f, "Native({tag}, {:p})", Arc::as_ptr(handler)),
            Self::Instance(handler) => write!(f, "Instance({:p})", Arc::as_ptr(handler)),
        }
    }
}

impl ActiveHandler {
    pub(crate) const fn handler(&self) -> &Arc<dyn SessionHandler> {
        match self {
            Self::Native { handler, .. } | Self::Instance(handler) => handler,
        }
    }

    pub(crate) const fn native_tag(&self) -> Option<&'static str> {
        match self {
            Self::Native { tag, .. } => Some(*tag),
            Self::Instance(_) => None,
        }
    }
}

/// Registry of backend factories.
///
/// Names resolve in three namespaces, in order: native tags (`files`,
/// `redis`, `memcache`, `memcached`; case-insensitive, available only when
/// registered), registered type names (exact match), then the built-in
/// short names (case-insensitive, `memcached` folds to `memcache`).
#[derive(Clone)]
pub struct HandlerRegistry {
    natives: HashMap<&'static str, HandlerFactory>,
    types: HashMap<String, HandlerFactory>,
    builtins: HashMap<&'static str, HandlerFactory>,
}

impl HandlerRegistry {
    /// Create a registry with the handlers compiled into this crate.
    #[must_use]
    pub fn new() -> Self {
        #[allow(unused_mut)]
        let mut registry = Self::empty();

        #[cfg(feature = "files")]
        registry.natives.insert(
            "files",
            Arc::new(|_: &HandlerContext| -> Arc<dyn SessionHandler> {
                Arc::new(crate::storage::FilesHandler::new())
            }),
        );

        #[cfg(feature = "memory")]
        registry.builtins.insert(
            "memory",
            Arc::new(|_: &HandlerContext| -> Arc<dyn SessionHandler> {
                Arc::new(crate::storage::MemoryHandler::new())
            }),
        );

        registry
    }

    /// Create a registry with nothing registered.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            natives: HashMap::new(),
            types: HashMap::new(),
            builtins: HashMap::new(),
        }
    }

    /// Make a native tag available.
    ///
    /// # Errors
    /// Returns error if `tag` is not one of the well-known native tags.
    pub fn register_native<F>(&mut self, tag: &str, factory: F) -> Result<&mut Self, SessionError>
    where
        F: Fn(&HandlerContext) -> Arc<dyn SessionHandler> + Send + Sync + 'static,
    {
        let tag = match tag.trim().to_lowercase().as_str() {
            "files" => "files",
            "redis" => "redis",
            "memcache" => "memcache",
            "memcached" => "memcached",
            _ => return Err(SessionError::UnknownHandler(tag.to_string())),
        };
        self.natives.insert(tag, Arc::new(factory));
        Ok(self)
    }

    /// Register a handler type under its exact name.
    pub fn register<F>(&mut self, type_name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&HandlerContext) -> Arc<dyn SessionHandler> + Send + Sync + 'static,
    {
        self.types.insert(type_name.into(), Arc::new(factory));
        self
    }

    /// Whether a native tag is available.
    #[must_use]
    pub fn has_native(&self, tag: &str) -> bool {
        self.native(&tag.trim().to_lowercase()).is_some()
    }

    /// Pick the native factory for a lowercased name.
    ///
    /// Both memcache spellings prefer `memcached` and fall back to `memcache`.
    fn native(&self, name: &str) -> Option<(&'static str, &HandlerFactory)> {
        let candidates: &[&'static str] = match name {
            "files" => &["files"],
            "redis" => &["redis"],
            "memcache" | "memcached" => &["memcached", "memcache"],
            _ => &[],
        };
        candidates
            .iter()
            .find_map(|tag| self.natives.get(tag).map(|factory| (*tag, factory)))
    }

    /// Resolve a declared backend into a usable handler.
    pub(crate) fn resolve(
        &self,
        backend: &Backend,
        ctx: &HandlerContext,
    ) -> Result<ActiveHandler, SessionError> {
        let name = match backend {
            Backend::Handler(handler) => return Ok(ActiveHandler::Instance(Arc::clone(handler))),
            Backend::Named(name) => name,
        };

        let lower = name.trim().to_lowercase();
        if let Some((tag, factory)) = self.native(&lower) {
            return Ok(ActiveHandler::Native {
                tag,
                handler: factory(ctx),
            });
        }

        if let Some(factory) = self.types.get(name.as_str()) {
            return Ok(ActiveHandler::Instance(factory(ctx)));
        }

        let short = if lower == "memcached" { "memcache" } else { lower.as_str() };
        if let Some(factory) = self.builtins.get(short) {
            return Ok(ActiveHandler::Instance(factory(ctx)));
        }

        Err(SessionError::UnknownHandler(name.clone()))
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("natives", &self.natives.keys().collect::<Vec<_>>())
            .field("types", &self.types.keys().collect::<Vec<_>>())
            .field("builtins", &self.builtins.keys().collect::<Vec<_>>())
            .finish()
    }
}
