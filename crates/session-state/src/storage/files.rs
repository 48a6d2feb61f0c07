//! File-per-session storage.

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::RwLock,
    time::{Duration, SystemTime},
};

use session_state_core::{HandlerError, SessionHandler, is_valid_session_id};

const PREFIX: &str = "sess_";

/// Stores each session in `<dir>/sess_<id>`.
///
/// The save path names the directory. An empty path uses the system temp
/// directory; a `N;/dir` path uses the segment after the last `;`.
pub struct FilesHandler {
    dir: RwLock<Option<PathBuf>>,
}

impl FilesHandler {
    /// Create a handler that has not been opened yet.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            dir: RwLock::new(None),
        }
    }

    /// Directory chosen by the last `open`.
    #[must_use]
    pub fn dir(&self) -> Option<PathBuf> {
        self.dir.read().ok()?.clone()
    }

    fn file(&self, session_id: &str) -> Result<PathBuf, HandlerError> {
        if !is_valid_session_id(session_id) {
            return Err(HandlerError::InvalidId(session_id.to_string()));
        }
        let dir = self
            .dir
            .read()
            .map_err(|e| HandlerError::Internal(e.to_string()))?
            .clone()
            .ok_or_else(|| HandlerError::Rejected("files handler is not open".to_string()))?;
        Ok(dir.join(format!("{PREFIX}{session_id}")))
    }
}

impl Default for FilesHandler {
    fn default() -> Self {
        Self::new()
    }
}

fn directory_for(save_path: &str) -> PathBuf {
    let dir = save_path.rsplit(';').next().unwrap_or_default();
    if dir.is_empty() {
        std::env::temp_dir()
    } else {
        PathBuf::from(dir)
    }
}

fn is_expired(path: &Path, max_age: Duration, now: SystemTime) -> io::Result<bool> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(now.duration_since(modified).unwrap_or_default() > max_age)
}

impl SessionHandler for FilesHandler {
    fn open(&self, save_path: &str, _session_name: &str) -> Result<(), HandlerError> {
        let dir = directory_for(save_path);
        if !dir.is_dir() {
            return Err(HandlerError::Io(io::Error::new(
                io::ErrorKind::NotFound,
                format!("session directory {} does not exist", dir.display()),
            )));
        }
        *self
            .dir
            .write()
            .map_err(|e| HandlerError::Internal(e.to_string()))? = Some(dir);
        Ok(())
    }

    fn read(&self, session_id: &str) -> Result<Vec<u8>, HandlerError> {
        match fs::read(self.file(session_id)?) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, session_id: &str, data: &[u8]) -> Result<(), HandlerError> {
        fs::write(self.file(session_id)?, data)?;
        Ok(())
    }

    fn destroy(&self, session_id: &str) -> Result<(), HandlerError> {
        match fs::remove_file(self.file(session_id)?) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }

    fn gc(&self, max_lifetime: u64) -> Result<(), HandlerError> {
        let Some(dir) = self.dir() else {
            return Ok(());
        };
        let max_age = Duration::from_secs(max_lifetime);
        let now = SystemTime::now();
        let mut removed = 0_usize;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            let is_session = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with(PREFIX));
            if !is_session {
                continue;
            }
            // Another process may remove the file between listing and checking.
            if is_expired(&path, max_age, now).unwrap_or(false) && fs::remove_file(&path).is_ok() {
                removed += 1;
            }
        }
        tracing::debug!(dir = %dir.display(), removed, "Files session gc");
        Ok(())
    }

    fn close(&self) -> Result<(), HandlerError> {
        Ok(())
    }
}
