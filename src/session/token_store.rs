//! Durable storage of the current access token
//!
//! Other HTTP clients in the application read the token from here. The
//! session manager is the only writer; an absent token means logged out.

use anyhow::{Context, Result};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

/// Default file name of the stored access token
pub const ACCESS_TOKEN_FILE: &str = "access_token";

/// Storage for the access token shared with other clients
pub trait TokenStore: Send + Sync {
    /// Read the stored token, `None` when logged out
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be read
    fn load(&self) -> Result<Option<String>>;

    /// Replace the stored token
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be written
    fn save(&self, token: &str) -> Result<()>;

    /// Remove the stored token; clearing an empty store succeeds
    ///
    /// # Errors
    ///
    /// Returns an error if the backing storage cannot be modified
    fn clear(&self) -> Result<()>;
}

/// Token kept in a single file with owner-only permissions
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store the token as `access_token` inside `dir`
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(ACCESS_TOKEN_FILE))
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to read token from {}", self.path.display())),
        }
    }

    fn save(&self, token: &str) -> Result<()> {
        write_private_file(&self.path, token.as_bytes())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove {}", self.path.display())),
        }
    }
}

/// Write `contents` readable by the owner only, creating parent directories
pub(crate) fn write_private_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
    }

    #[cfg(unix)]
    let mut file = {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("Failed to open {} for writing", path.display()))?
    };

    #[cfg(not(unix))]
    let mut file = fs::File::create(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;

    file.write_all(contents)
        .with_context(|| format!("Failed to write to {}", path.display()))
}

/// In-process token storage for embedding and tests
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current token without going through the `Result` API
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>> {
        Ok(self.token())
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
