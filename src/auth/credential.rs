//! Credential persistence. The session token must survive a restart of the
//! client, so the default store keeps it in a single file under the
//! configured directory. Writes go through a temp file and a rename so a reader
//! never observes a half-written token; the last write wins.

use secrecy::{ExposeSecret, SecretString};
use std::{
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, PoisonError},
};
use thiserror::Error;

/// Well-known key (file name) the token is stored under.
pub const CREDENTIAL_KEY: &str = "token";

/// Opaque bearer token issued by the API.
#[derive(Clone)]
pub struct Credential(SecretString);

impl Credential {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }

    /// Parses persisted content; an empty value means no credential.
    fn from_stored(raw: &str) -> Option<Self> {
        let token = raw.trim_end_matches(['\r', '\n']);
        if token.trim().is_empty() {
            None
        } else {
            Some(Self::new(token))
        }
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl PartialEq for Credential {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Credential {}

impl fmt::Debug for Credential {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("Credential([REDACTED])")
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to read credential from {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to write credential to {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to clear credential at {}: {source}", .path.display())]
    Clear { path: PathBuf, source: io::Error },
}

/// Storage for the one session credential. Only the session state machine writes.
pub trait CredentialStore: Send + Sync {
    /// # Errors
    /// Returns an error if the backing storage cannot be read.
    fn get(&self) -> Result<Option<Credential>, StoreError>;

    /// # Errors
    /// Returns an error if the credential cannot be persisted.
    fn set(&self, credential: &Credential) -> Result<(), StoreError>;

    /// Removing an absent credential succeeds.
    ///
    /// # Errors
    /// Returns an error if an existing credential cannot be removed.
    fn clear(&self) -> Result<(), StoreError>;
}

/// File-backed store: `<dir>/token`, mode `0600` on Unix.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    #[must_use]
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(CREDENTIAL_KEY),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_atomically(&self, contents: &str) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let staging = self.path.with_extension("tmp");
        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&staging)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&staging, &self.path)
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self) -> Result<Option<Credential>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => Ok(Credential::from_stored(&raw)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Read {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn set(&self, credential: &Credential) -> Result<(), StoreError> {
        self.write_atomically(credential.expose())
            .map_err(|source| StoreError::Write {
                path: self.path.clone(),
                source,
            })
    }

    fn clear(&self) -> Result<(), StoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Clear {
                path: self.path.clone(),
                source,
            }),
        }
    }
}

/// Process-local store for tests and sessions that must not touch disk.
#[derive(Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<Credential>>,
}

impl MemoryCredentialStore {
    #[must_use]
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            slot: Mutex::new(Some(credential)),
        }
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self) -> Result<Option<Credential>, StoreError> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn set(&self, credential: &Credential) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(credential.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}
