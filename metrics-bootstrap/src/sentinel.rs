// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted one-time initialization marker for a daemon.
//!
//! The sentinel is a single-line file holding either `NotInitialized` or
//! `Initialized`. Provisioning creates it; the bootstrap controller flips it
//! to `Initialized` exactly once, through [SentinelGuard::mark_initialized].
//! Nothing in this crate deletes it or sets it back: an operator resets it by
//! hand to force another bootstrap.

use crate::files::{write_atomic, WriteError};
use camino::{Utf8Path, Utf8PathBuf};
use std::fmt;
use std::fs::{File, OpenOptions, Permissions};
use std::io::Write;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::str::FromStr;

/// Mode of a freshly provisioned sentinel file.
pub const SENTINEL_MODE: u32 = 0o770;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentinelState {
    NotInitialized,
    Initialized,
}

impl SentinelState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentinelState::NotInitialized => "NotInitialized",
            SentinelState::Initialized => "Initialized",
        }
    }
}

impl fmt::Display for SentinelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unrecognized sentinel value {0:?}")]
pub struct ParseSentinelError(String);

impl FromStr for SentinelState {
    type Err = ParseSentinelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "NotInitialized" => Ok(SentinelState::NotInitialized),
            "Initialized" => Ok(SentinelState::Initialized),
            other => Err(ParseSentinelError(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SentinelError {
    #[error("sentinel file {0} does not exist (was the host provisioned?)")]
    Missing(Utf8PathBuf),

    #[error("failed to read sentinel file {path}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("bad contents in sentinel file {path}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        err: ParseSentinelError,
    },

    #[error("failed to write sentinel file {path}")]
    Write {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },

    #[error("failed to lock sentinel via {path}")]
    Lock {
        path: Utf8PathBuf,
        #[source]
        err: std::io::Error,
    },
}

/// The sentinel file of one daemon.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentinelStore {
    path: Utf8PathBuf,
}

impl SentinelStore {
    pub fn new(path: impl Into<Utf8PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// The advisory lock file guarding read-act-write on this sentinel.
    pub fn lock_path(&self) -> Utf8PathBuf {
        let mut name = self.path.file_name().unwrap_or("sentinel").to_string();
        name.push_str(".lock");
        self.path.with_file_name(name)
    }

    pub fn read(&self) -> Result<SentinelState, SentinelError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(SentinelError::Missing(self.path.clone()));
            }
            Err(err) => {
                return Err(SentinelError::Read {
                    path: self.path.clone(),
                    err,
                })
            }
        };
        contents.parse().map_err(|err| SentinelError::Parse {
            path: self.path.clone(),
            err,
        })
    }

    /// Creates the sentinel in the `NotInitialized` state.
    ///
    /// Returns `false` without touching the file if it already exists, so
    /// re-provisioning never resets a bootstrapped daemon.
    pub fn provision(&self) -> Result<bool, SentinelError> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(SENTINEL_MODE)
            .open(&self.path);
        let mut file = match file {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                return Ok(false);
            }
            Err(err) => {
                return Err(SentinelError::Write {
                    path: self.path.clone(),
                    err,
                })
            }
        };
        write_state(&mut file, SentinelState::NotInitialized)
            .and_then(|()| {
                // The process umask may have masked the requested mode.
                std::fs::set_permissions(
                    &self.path,
                    Permissions::from_mode(SENTINEL_MODE),
                )
            })
            .map_err(|err| SentinelError::Write {
                path: self.path.clone(),
                err,
            })?;
        Ok(true)
    }

    /// Takes the exclusive lock for this sentinel, blocking until any other
    /// holder releases it.
    pub fn lock(&self) -> Result<SentinelGuard<'_>, SentinelError> {
        let lock_path = self.lock_path();
        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|err| SentinelError::Lock {
                path: lock_path.clone(),
                err,
            })?;
        fs2::FileExt::lock_exclusive(&lock_file)
            .map_err(|err| SentinelError::Lock { path: lock_path, err })?;
        Ok(SentinelGuard { store: self, _lock: lock_file })
    }
}

fn write_state(file: &mut File, state: SentinelState) -> std::io::Result<()> {
    writeln!(file, "{state}")?;
    file.sync_all()
}

/// Exclusive access to a sentinel. The lock is released on drop.
#[derive(Debug)]
pub struct SentinelGuard<'a> {
    store: &'a SentinelStore,
    _lock: File,
}

impl SentinelGuard<'_> {
    /// Re-reads the sentinel while holding the lock.
    pub fn state(&self) -> Result<SentinelState, SentinelError> {
        self.store.read()
    }

    /// Records that the daemon has been bootstrapped.
    ///
    /// The new contents replace the file in one rename, so a crash leaves
    /// either the old state or the new one behind.
    pub fn mark_initialized(self) -> Result<(), SentinelError> {
        let path = self.store.path();
        if !path.exists() {
            return Err(SentinelError::Missing(path.to_owned()));
        }
        write_atomic(path, &format!("{}\n", SentinelState::Initialized))
            .map_err(|WriteError { path, err }| SentinelError::Write {
                path,
                err,
            })?;
        std::fs::set_permissions(path, Permissions::from_mode(SENTINEL_MODE))
            .map_err(|err| SentinelError::Write { path: path.to_owned(), err })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_parse_tokens() {
        assert_eq!(
            "NotInitialized\n".parse::<SentinelState>(),
            Ok(SentinelState::NotInitialized)
        );
        assert_eq!(
            "Initialized".parse::<SentinelState>(),
            Ok(SentinelState::Initialized)
        );
        assert!("initialized".parse::<SentinelState>().is_err());
        assert!("".parse::<SentinelState>().is_err());
    }

    #[test]
    fn test_provision_then_mark() {
        let dir = Utf8TempDir::new().unwrap();
        let store = SentinelStore::new(dir.path().join("chronograf.flag"));

        assert!(matches!(store.read(), Err(SentinelError::Missing(_))));
        assert!(store.provision().unwrap());
        assert_eq!(store.read().unwrap(), SentinelState::NotInitialized);
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "NotInitialized\n"
        );
        let mode =
            std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SENTINEL_MODE);

        let guard = store.lock().unwrap();
        assert_eq!(guard.state().unwrap(), SentinelState::NotInitialized);
        guard.mark_initialized().unwrap();

        assert_eq!(store.read().unwrap(), SentinelState::Initialized);
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "Initialized\n"
        );
        let mode =
            std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, SENTINEL_MODE, "mode must survive marking");
    }

    #[test]
    fn test_mark_replaces_rather_than_truncates() {
        let dir = Utf8TempDir::new().unwrap();
        let store = SentinelStore::new(dir.path().join("kapacitor.flag"));
        assert!(store.provision().unwrap());
        // A second name for the provisioned inode.
        let before = dir.path().join("before.flag");
        std::fs::hard_link(store.path(), &before).unwrap();

        store.lock().unwrap().mark_initialized().unwrap();

        assert_eq!(
            std::fs::read_to_string(&before).unwrap(),
            "NotInitialized\n"
        );
        assert_eq!(store.read().unwrap(), SentinelState::Initialized);
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 3, "{names:?}");
    }

    #[test]
    fn test_mark_missing_sentinel() {
        let dir = Utf8TempDir::new().unwrap();
        let store = SentinelStore::new(dir.path().join("chronograf.flag"));
        let err = store.lock().unwrap().mark_initialized().unwrap_err();
        assert!(matches!(err, SentinelError::Missing(_)), "{err}");
        assert!(!store.path().exists());
    }

    #[test]
    fn test_provision_never_resets() {
        let dir = Utf8TempDir::new().unwrap();
        let store = SentinelStore::new(dir.path().join("kapacitor.flag"));
        std::fs::write(store.path(), "Initialized\n").unwrap();

        assert!(!store.provision().unwrap());
        assert_eq!(store.read().unwrap(), SentinelState::Initialized);
    }

    #[test]
    fn test_bad_contents() {
        let dir = Utf8TempDir::new().unwrap();
        let store = SentinelStore::new(dir.path().join("kapacitor.flag"));
        std::fs::write(store.path(), "garbage\n").unwrap();
        assert!(matches!(store.read(), Err(SentinelError::Parse { .. })));
    }

    #[test]
    fn test_lock_path_is_a_sibling() {
        let store = SentinelStore::new("/var/log/chronograf_default.log");
        assert_eq!(
            store.lock_path(),
            Utf8PathBuf::from("/var/log/chronograf_default.log.lock")
        );
    }
}
