//! Session engine.
//!
//! A [`Session`] owns its configuration, resolves a storage backend and
//! drives the `start`/`close` lifecycle. One engine can serve many
//! sequential requests in a long-lived worker: [`Session::release`] puts it
//! back to its boot configuration between them.

use std::{
    collections::{BTreeMap, HashMap},
    path::Path,
    sync::Arc,
};

use serde::{Serialize, Serializer};
use serde_json::Value;
use session_state_core::{
    Content, HandlerContext, HandlerError, SavePath, SessionHandler, codec, is_valid_session_id,
};
use uuid::Uuid;

use crate::{
    bridge::{CallbackHandler, SaveMethods},
    config::{
        ConfigStore, IniDefaults, IniValue, Reserved, SAVE_HANDLER, SAVE_PATH, SessionOptions,
        reserved,
    },
    cookie::{CookieMode, ResponseCookie},
    error::SessionError,
    registry::{ActiveHandler, Backend, HandlerRegistry},
};

/// Memoized result of resolving a declared value.
#[derive(Clone)]
enum Resolution<T> {
    Unresolved,
    Resolved(T),
}

/// Backend state captured when the boot snapshot is locked.
#[derive(Clone)]
struct BootBackend {
    handler: Option<Backend>,
    path: Option<SavePath>,
    real_handler: ActiveHandler,
    real_path: String,
    register_shutdown: bool,
}

/// The backend a running session was opened with.
#[derive(Clone)]
struct OpenSession {
    handler: Arc<dyn SessionHandler>,
    save_path: String,
    name: String,
}

/// Log a backend failure and turn it into a success flag.
fn succeeded(result: Result<(), HandlerError>, op: &str) -> bool {
    match result {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!(error = %e, op, "Session handler call failed");
            false
        }
    }
}

fn generate_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Builder for [`Session`].
#[derive(Debug, Default)]
pub struct SessionBuilder {
    defaults: Option<IniDefaults>,
    registry: Option<HandlerRegistry>,
    handler: Option<Backend>,
    save_path: Option<SavePath>,
}

impl SessionBuilder {
    /// Use these ambient defaults instead of the built-in ones.
    #[must_use]
    pub fn defaults(mut self, defaults: IniDefaults) -> Self {
        self.defaults = Some(defaults);
        self
    }

    /// Use this handler registry.
    #[must_use]
    pub fn registry(mut self, registry: HandlerRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Declare the backend up front.
    #[must_use]
    pub fn handler(mut self, handler: impl Into<Backend>) -> Self {
        self.handler = Some(handler.into());
        self
    }

    /// Declare the backend path up front.
    #[must_use]
    pub fn save_path(mut self, path: impl Into<SavePath>) -> Self {
        self.save_path = Some(path.into());
        self
    }

    /// Build the engine.
    #[must_use]
    pub fn build(self) -> Session {
        let config = ConfigStore::new(self.defaults.unwrap_or_default());
        let ini_path = SavePath::Text(config.get_or(SAVE_PATH, "").to_string());
        let mut session = Session {
            config,
            registry: self.registry.unwrap_or_default(),
            context: HandlerContext::new(ini_path),
            user_handler: None,
            user_path: None,
            real_handler: Resolution::Unresolved,
            real_path: Resolution::Unresolved,
            register_shutdown: true,
            boot: None,
            id: String::new(),
            open: None,
            loaded: false,
            content: Content::new(),
            entry: Content::new(),
            cookies: CookieMode::External,
            saved_use_cookies: None,
        };
        if let Some(handler) = self.handler {
            session.apply_handler(handler, true, true);
        }
        if let Some(path) = self.save_path {
            session.apply_path(path, true);
        }
        session
    }
}

/// Session state engine.
///
/// Content is readable and writable from the first successful
/// [`start`](Self::start) until [`release`](Self::release), even after
/// [`close`](Self::close). Operations that only make sense while the
/// backend is open are silent no-ops otherwise.
pub struct Session {
    config: ConfigStore,
    registry: HandlerRegistry,
    context: HandlerContext,
    user_handler: Option<Backend>,
    user_path: Option<SavePath>,
    real_handler: Resolution<ActiveHandler>,
    real_path: Resolution<String>,
    register_shutdown: bool,
    boot: Option<BootBackend>,
    id: String,
    open: Option<OpenSession>,
    loaded: bool,
    content: Content,
    entry: Content,
    cookies: CookieMode,
    saved_use_cookies: Option<String>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("active", &self.open.is_some())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Create an engine with built-in defaults and handlers.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Start building an engine.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    // --- configuration ---

    /// Change one setting.
    ///
    /// `save_handler` and `save_path` (or their aliases `backend-identity`
    /// and `backend-path`) declare the backend instead. An empty name is
    /// ignored.
    pub fn set_ini(&mut self, name: &str, value: impl IniValue) -> &mut Self {
        if name.is_empty() {
            return self;
        }
        let value = value.into_ini();
        match reserved(name) {
            Some(Reserved::Handler) => self.apply_handler(Backend::Named(value), true, false),
            Some(Reserved::Path) => self.apply_path(SavePath::Text(value), false),
            None => {
                if self.config.set(name, value) {
                    tracing::trace!(name, "Session setting changed");
                }
            }
        }
        self
    }

    /// Live value of a setting.
    #[must_use]
    pub fn get_ini(&self, name: &str) -> Option<&str> {
        match reserved(name) {
            Some(Reserved::Handler) => match &self.user_handler {
                Some(Backend::Named(value)) => Some(value.as_str()),
                Some(Backend::Handler(_)) => None,
                None => self.config.get(SAVE_HANDLER),
            },
            Some(Reserved::Path) => match &self.user_path {
                Some(path) => path.as_text(),
                None => self.config.get(SAVE_PATH),
            },
            None => self.config.get(name),
        }
    }

    /// Live value of a setting, or `default` if unset.
    #[must_use]
    pub fn get_ini_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.get_ini(name).unwrap_or(default)
    }

    /// Boolean interpretation of a setting.
    #[must_use]
    pub fn is_ini(&self, name: &str) -> bool {
        self.get_ini(name).is_some_and(crate::config::is_truthy)
    }

    /// The setting store.
    #[must_use]
    pub const fn config(&self) -> &ConfigStore {
        &self.config
    }

    /// Apply many settings at once.
    ///
    /// With `lock`, the result becomes the boot snapshot that
    /// [`release`](Self::release) returns to, and the backend is resolved
    /// immediately.
    ///
    /// # Errors
    /// Returns error if locking while a session is running, or if the
    /// locked backend cannot be resolved.
    pub fn set_options(&mut self, options: SessionOptions, lock: bool) -> Result<&mut Self, SessionError> {
        if lock && self.open.is_some() {
            return Err(SessionError::AlreadyStarted);
        }

        let SessionOptions {
            settings,
            handler,
            save_path,
        } = options;

        let mut locked = BTreeMap::new();
        for (name, value) in settings {
            if lock {
                if self.config.set_untracked(&name, value.clone()) {
                    locked.insert(name, value);
                }
            } else {
                self.config.set(&name, value);
            }
        }
        if let Some((backend, register_shutdown)) = handler {
            self.apply_handler(backend, register_shutdown, lock);
        }
        if let Some(path) = save_path {
            self.apply_path(path, lock);
        }

        if lock {
            let (real_handler, real_path) = self.resolve()?;
            self.config.lock(locked);
            self.boot = Some(BootBackend {
                handler: self.user_handler.clone(),
                path: self.user_path.clone(),
                real_handler,
                real_path,
                register_shutdown: self.register_shutdown,
            });
            tracing::debug!("Locked session boot configuration");
        }
        Ok(self)
    }

    // --- backend ---

    /// Declare the backend, registering it for commit on drop.
    pub fn set_save_handler(&mut self, handler: impl Into<Backend>) -> &mut Self {
        self.set_save_handler_with_shutdown(handler, true)
    }

    /// Declare the backend and whether dropping the engine commits a running session.
    pub fn set_save_handler_with_shutdown(
        &mut self,
        handler: impl Into<Backend>,
        register_shutdown: bool,
    ) -> &mut Self {
        self.apply_handler(handler.into(), register_shutdown, false);
        self
    }

    /// Use six callbacks as the backend.
    pub fn set_save_methods(&mut self, methods: SaveMethods) -> &mut Self {
        let handler: Arc<dyn SessionHandler> =
            Arc::new(CallbackHandler::new(self.context.clone(), methods));
        self.set_save_handler(handler)
    }

    /// The declared backend.
    #[must_use]
    pub fn save_handler(&self) -> Backend {
        self.user_handler
            .clone()
            .unwrap_or_else(|| Backend::Named(self.config.get_or(SAVE_HANDLER, "").to_string()))
    }

    /// Declare the backend path.
    pub fn set_save_path(&mut self, path: impl Into<SavePath>) -> &mut Self {
        self.apply_path(path.into(), false);
        self
    }

    /// The declared backend path.
    #[must_use]
    pub fn save_path(&self) -> SavePath {
        self.user_path
            .clone()
            .unwrap_or_else(|| SavePath::Text(self.config.get_or(SAVE_PATH, "").to_string()))
    }

    /// Context shared with backends built by this engine.
    #[must_use]
    pub fn context(&self) -> HandlerContext {
        self.context.clone()
    }

    /// The handler registry.
    #[must_use]
    pub const fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The handler registry, for registering more backends.
    pub const fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    fn apply_handler(&mut self, handler: Backend, register_shutdown: bool, first: bool) {
        if self.save_handler() != handler {
            self.user_handler = Some(handler);
            self.real_handler = Resolution::Unresolved;
        } else if self.register_shutdown != register_shutdown
            && matches!(self.real_handler, Resolution::Resolved(ActiveHandler::Instance(_)))
        {
            self.real_handler = Resolution::Unresolved;
        }
        self.register_shutdown = register_shutdown;

        if !first && matches!(self.real_handler, Resolution::Unresolved) {
            self.config.mark_dirty(SAVE_HANDLER);
        }
    }

    fn apply_path(&mut self, path: SavePath, first: bool) {
        let path = match path {
            SavePath::Text(text) if !text.is_empty() && Path::new(&text).is_dir() => {
                std::fs::canonicalize(&text)
                    .map(|p| SavePath::Text(p.to_string_lossy().into_owned()))
                    .unwrap_or(SavePath::Text(text))
            }
            other => other,
        };
        if self.save_path() == path {
            return;
        }
        self.context.set_save_path(path.clone());
        self.user_path = Some(path);
        self.real_path = Resolution::Unresolved;
        if !first {
            self.config.mark_dirty(SAVE_PATH);
        }
    }

    /// Resolve the declared backend and path, memoizing both.
    fn resolve(&mut self) -> Result<(ActiveHandler, String), SessionError> {
        let handler = match &self.real_handler {
            Resolution::Resolved(handler) => handler.clone(),
            Resolution::Unresolved => {
                let handler = self.registry.resolve(&self.save_handler(), &self.context)?;
                tracing::debug!(
                    native = handler.native_tag().unwrap_or("instance"),
                    "Resolved session handler"
                );
                self.real_handler = Resolution::Resolved(handler.clone());
                self.real_path = Resolution::Unresolved;
                handler
            }
        };

        let path = match &self.real_path {
            Resolution::Resolved(path) => path.clone(),
            Resolution::Unresolved => {
                let declared = self.save_path();
                let path = match handler.native_tag() {
                    Some(tag) => declared.to_native(tag).map_err(|source| {
                        SessionError::InvalidSavePath {
                            handler: tag.to_string(),
                            source,
                        }
                    })?,
                    None => declared.as_text().unwrap_or_default().to_string(),
                };
                self.real_path = Resolution::Resolved(path.clone());
                path
            }
        };

        Ok((handler, path))
    }

    // --- cookie settings ---

    /// Set the cookie name.
    pub fn set_cookie_name(&mut self, name: &str) -> &mut Self {
        self.set_ini("name", name)
    }

    /// The cookie name.
    #[must_use]
    pub fn cookie_name(&self) -> &str {
        self.config.get_or("name", "")
    }

    /// Set the path the cookie is scoped to.
    pub fn set_cookie_path(&mut self, path: &str) -> &mut Self {
        self.set_ini("cookie_path", path)
    }

    /// The cookie path.
    #[must_use]
    pub fn cookie_path(&self) -> &str {
        self.config.get_or("cookie_path", "")
    }

    /// Set the cookie domain; `None` leaves it host-only.
    pub fn set_cookie_domain(&mut self, domain: Option<&str>) -> &mut Self {
        self.set_ini("cookie_domain", domain)
    }

    /// The cookie domain, empty when host-only.
    #[must_use]
    pub fn cookie_domain(&self) -> &str {
        self.config.get_or("cookie_domain", "")
    }

    /// Set the cookie lifetime in seconds; `0` means until the browser closes.
    pub fn set_cookie_lifetime(&mut self, seconds: i64) -> &mut Self {
        self.set_ini("cookie_lifetime", seconds)
    }

    /// The cookie lifetime in seconds.
    #[must_use]
    pub fn cookie_lifetime(&self) -> i64 {
        self.config.get_int("cookie_lifetime").unwrap_or(0)
    }

    /// Set the `SameSite` attribute; `None` omits it.
    pub fn set_cookie_same_site(&mut self, same_site: Option<&str>) -> &mut Self {
        self.set_ini("cookie_samesite", same_site)
    }

    /// The `SameSite` attribute, empty when omitted.
    #[must_use]
    pub fn cookie_same_site(&self) -> &str {
        self.config.get_or("cookie_samesite", "")
    }

    /// Set whether the cookie is hidden from scripts.
    pub fn set_cookie_http_only(&mut self, http_only: bool) -> &mut Self {
        self.set_ini("cookie_httponly", http_only)
    }

    /// Whether the cookie carries `HttpOnly`.
    #[must_use]
    pub fn is_cookie_http_only(&self) -> bool {
        self.config.is_truthy("cookie_httponly")
    }

    /// Set whether the cookie is only sent over HTTPS.
    pub fn set_cookie_secure(&mut self, secure: bool) -> &mut Self {
        self.set_ini("cookie_secure", secure)
    }

    /// Whether the cookie carries `Secure`.
    #[must_use]
    pub fn is_cookie_secure(&self) -> bool {
        self.config.is_truthy("cookie_secure")
    }

    // --- self-managed cookies ---

    /// Hand the request's cookies to the engine, or `None` to let the host
    /// environment manage the session cookie again.
    ///
    /// While cookies are supplied, `use_cookies` is forced off; its previous
    /// value comes back on `None`.
    pub fn set_request_cookies(&mut self, cookies: Option<HashMap<String, String>>) -> &mut Self {
        match cookies {
            Some(values) => {
                if self.saved_use_cookies.is_none() {
                    self.saved_use_cookies =
                        Some(self.config.get_or("use_cookies", "").to_string());
                    self.config.set_untracked("use_cookies", "0".to_string());
                }
                self.cookies = CookieMode::Pending(values);
            }
            None => {
                if let Some(saved) = self.saved_use_cookies.take() {
                    self.config.set_untracked("use_cookies", saved);
                }
                self.cookies = CookieMode::External;
            }
        }
        self
    }

    /// The cookie to send back, when the engine manages cookies and the
    /// client does not yet know the current id.
    #[must_use]
    pub fn response_cookie(&self) -> Option<ResponseCookie> {
        if !self.cookies.should_emit() {
            return None;
        }
        ResponseCookie::from_config(&self.config, self.id.as_str(), chrono::Utc::now().timestamp())
    }

    /// [`response_cookie`](Self::response_cookie) in `Set-Cookie` form.
    #[must_use]
    pub fn response_cookie_line(&self) -> Option<String> {
        self.response_cookie().map(|cookie| cookie.to_string())
    }

    // --- lifecycle ---

    /// The session id; empty until started or set.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Choose the id for the next start.
    ///
    /// # Errors
    /// Returns error if a session is running.
    pub fn set_id(&mut self, id: impl Into<String>) -> Result<&mut Self, SessionError> {
        if self.open.is_some() {
            tracing::warn!(id = %self.id, "Cannot change the id of an active session");
            return Err(SessionError::AlreadyStarted);
        }
        self.id = id.into();
        Ok(self)
    }

    /// Whether the backend is open.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.open.is_some()
    }

    /// Start the session with the current configuration.
    ///
    /// # Errors
    /// See [`start_with`](Self::start_with).
    pub fn start(&mut self) -> Result<bool, SessionError> {
        self.start_with(SessionOptions::new())
    }

    /// Apply `options` and start the session.
    ///
    /// Returns `Ok(false)` when the backend fails to open or read, or the
    /// stored payload is corrupt (the record is then destroyed).
    ///
    /// # Errors
    /// Returns error if a session is already running, or the backend or
    /// its path cannot be resolved.
    pub fn start_with(&mut self, options: SessionOptions) -> Result<bool, SessionError> {
        if self.open.is_some() {
            return Err(SessionError::AlreadyStarted);
        }
        if !options.is_empty() {
            self.set_options(options, false)?;
        }

        let name = self.cookie_name().to_string();
        if let Some(id) = self.cookies.settle(&self.id, &name) {
            tracing::debug!(id = %id, "Adopted session id from request cookie");
            self.id = id;
        }

        let (active, save_path) = self.resolve()?;

        if self.id.is_empty() {
            self.id = generate_id();
        } else if !is_valid_session_id(&self.id) {
            tracing::warn!("Replacing malformed session id");
            self.id = generate_id();
        }

        let handler = Arc::clone(active.handler());
        if !succeeded(handler.open(&save_path, &name), "open") {
            return Ok(false);
        }
        self.maybe_gc(handler.as_ref());

        let payload = match handler.read(&self.id) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read session");
                succeeded(handler.close(), "close");
                return Ok(false);
            }
        };
        let content = match codec::decode(&payload) {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!(error = %e, id = %self.id, "Discarding corrupt session payload");
                succeeded(handler.destroy(&self.id), "destroy");
                succeeded(handler.close(), "close");
                return Ok(false);
            }
        };

        self.content = content;
        self.entry = self.content.clone();
        self.loaded = true;
        self.open = Some(OpenSession {
            handler,
            save_path,
            name,
        });
        tracing::debug!(id = %self.id, entries = self.content.len(), "Session started");
        Ok(true)
    }

    fn maybe_gc(&self, handler: &dyn SessionHandler) {
        let probability = self.config.get_int("gc_probability").unwrap_or(0);
        let divisor = self.config.get_int("gc_divisor").unwrap_or(0);
        let (Ok(probability), Ok(divisor)) = (u128::try_from(probability), u128::try_from(divisor))
        else {
            return;
        };
        if probability == 0 || divisor == 0 {
            return;
        }
        if Uuid::new_v4().as_u128() % divisor < probability {
            let max_lifetime = self
                .config
                .get_int("gc_maxlifetime")
                .and_then(|v| u64::try_from(v).ok())
                .unwrap_or(0);
            tracing::debug!(max_lifetime, "Running session gc");
            succeeded(handler.gc(max_lifetime), "gc");
        }
    }

    /// Write either the live content or the entry snapshot and close the backend.
    fn commit(&mut self, snapshot: bool) -> bool {
        let Some(open) = self.open.take() else {
            return true;
        };
        let payload = codec::encode(if snapshot { &self.entry } else { &self.content });
        let written = succeeded(open.handler.write(&self.id, payload.as_bytes()), "write");
        let closed = succeeded(open.handler.close(), "close");
        tracing::debug!(id = %self.id, snapshot, "Session committed");
        written && closed
    }

    /// Persist the content and close the backend.
    ///
    /// Content stays readable afterwards. Returns `false` if a backend call failed.
    pub fn close(&mut self) -> bool {
        let ok = self.commit(false);
        self.entry = self.content.clone();
        ok
    }

    /// Persist the content as it was at start and close the backend.
    ///
    /// The live content is left as is.
    pub fn abort(&mut self) -> bool {
        self.commit(true)
    }

    /// Put the content back to what it was at start.
    pub fn reset(&mut self) -> &mut Self {
        if self.open.is_some() {
            self.content = self.entry.clone();
        }
        self
    }

    /// Remove the stored record and close the backend.
    ///
    /// The live content is left as is.
    pub fn destroy(&mut self) -> bool {
        let Some(open) = self.open.take() else {
            return true;
        };
        let destroyed = succeeded(open.handler.destroy(&self.id), "destroy");
        let closed = succeeded(open.handler.close(), "close");
        tracing::debug!(id = %self.id, "Session destroyed");
        destroyed && closed
    }

    /// Move the running session to a fresh id.
    ///
    /// The old record is destroyed with `delete_old`, otherwise it receives
    /// the current content. Returns `false` if no session is running or a
    /// backend call failed.
    pub fn regenerate(&mut self, delete_old: bool) -> bool {
        let Some(open) = self.open.clone() else {
            tracing::warn!("Cannot regenerate session id - session is not active");
            return false;
        };

        let mut ok = if delete_old {
            succeeded(open.handler.destroy(&self.id), "destroy")
        } else {
            let payload = codec::encode(&self.content);
            succeeded(open.handler.write(&self.id, payload.as_bytes()), "write")
        };
        ok &= succeeded(open.handler.close(), "close");

        if !succeeded(open.handler.open(&open.save_path, &open.name), "open") {
            self.open = None;
            return false;
        }

        let old = std::mem::replace(&mut self.id, generate_id());
        self.cookies.renew();
        tracing::debug!(old = %old, new = %self.id, delete_old, "Session id regenerated");
        ok
    }

    /// Return to the boot configuration for the next request.
    ///
    /// Commits a running session, forgets the id and content, leaves
    /// self-managed cookie mode and restores every setting and backend
    /// declaration changed since the boot snapshot. Safe to call repeatedly.
    pub fn release(&mut self) {
        if self.open.is_some() {
            self.commit(false);
            self.id.clear();
        }
        self.loaded = false;
        self.content.clear();
        self.entry.clear();
        self.set_request_cookies(None);

        let dirty = self.config.take_dirty();
        if dirty.is_empty() {
            return;
        }
        let Some(boot) = self.boot.clone() else {
            return;
        };

        let handler_dirty = dirty.contains(SAVE_HANDLER);
        let path_dirty = dirty.contains(SAVE_PATH);
        for name in &dirty {
            if reserved(name).is_none() {
                self.config.restore(name);
            }
        }
        if handler_dirty {
            self.user_handler = boot.handler;
            self.register_shutdown = boot.register_shutdown;
            self.real_handler = Resolution::Resolved(boot.real_handler);
        }
        if path_dirty {
            self.user_path = boot.path;
            self.context.set_save_path(self.save_path());
        }
        if handler_dirty || path_dirty {
            self.real_path = Resolution::Resolved(boot.real_path);
        }
        tracing::debug!(restored = dirty.len(), "Session configuration restored");
    }

    /// Borrow the engine for one request; it is released when the guard drops.
    pub fn scope(&mut self) -> SessionScope<'_> {
        SessionScope { session: self }
    }

    // --- content ---

    /// All content.
    #[must_use]
    pub const fn all(&self) -> &Content {
        &self.content
    }

    /// Whether `name` holds a non-null value.
    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// The value stored under `name`, unless absent or null.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.content.get(name).filter(|value| !value.is_null())
    }

    /// Store a value.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        if self.loaded {
            self.content.insert(name.into(), value.into());
        }
        self
    }

    /// Remove a value.
    pub fn remove(&mut self, name: &str) -> &mut Self {
        if self.loaded {
            self.content.shift_remove(name);
        }
        self
    }

    /// Remove every value while the session is running.
    pub fn clear(&mut self) -> &mut Self {
        if self.open.is_some() {
            self.content.clear();
        }
        self
    }

    /// Number of stored values, nulls included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.content.len()
    }

    /// Whether no values are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    /// Content in the session wire format.
    #[must_use]
    pub fn encode(&self) -> String {
        if self.loaded {
            codec::encode(&self.content)
        } else {
            String::new()
        }
    }

    /// Merge wire-format data into the content.
    ///
    /// # Errors
    /// Returns error if `data` is malformed; the content is then unchanged.
    pub fn decode(&mut self, data: &str) -> Result<&mut Self, SessionError> {
        if self.loaded {
            codec::decode_into(data, &mut self.content)?;
        }
        Ok(self)
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for Session {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.content.serialize(serializer)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.register_shutdown {
            self.commit(false);
        } else if let Some(open) = self.open.take() {
            succeeded(open.handler.close(), "close");
        }
    }
}

/// Request guard returned by [`Session::scope`].
pub struct SessionScope<'a> {
    session: &'a mut Session,
}

impl std::ops::Deref for SessionScope<'_> {
    type Target = Session;

    fn deref(&self) -> &Session {
        self.session
    }
}

impl std::ops::DerefMut for SessionScope<'_> {
    fn deref_mut(&mut self) -> &mut Session {
        self.session
    }
}

impl Drop for SessionScope<'_> {
    fn drop(&mut self) {
        self.session.release();
    }
}
