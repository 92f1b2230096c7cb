// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Setting ownership and permission bits on files handed to a daemon.

use camino::{Utf8Path, Utf8PathBuf};
use std::fs::{set_permissions, Permissions};
use std::os::unix::fs::{chown, PermissionsExt};
use uzers::{get_group_by_name, get_user_by_name};

#[derive(thiserror::Error, Debug)]
pub enum OwnershipError {
    #[error("failed to look up user {0}")]
    UnknownUser(String),

    #[error("failed to look up group {0}")]
    UnknownGroup(String),

    #[error("could not set ownership to {user}:{group} on {path}")]
    Chown {
        path: Utf8PathBuf,
        user: String,
        group: String,
        #[source]
        err: std::io::Error,
    },

    #[error("failed to set mode {mode:o} on {path}")]
    Mode {
        path: Utf8PathBuf,
        mode: u32,
        #[source]
        err: std::io::Error,
    },
}

/// Changes the owner of files on behalf of a daemon's service account.
pub trait Ownership: Send + Sync {
    fn set_owner(
        &self,
        path: &Utf8Path,
        user: &str,
        group: &str,
    ) -> Result<(), OwnershipError>;
}

/// Resolves account names through the host's user database.
#[derive(Debug, Default)]
pub struct HostOwnership {}

impl Ownership for HostOwnership {
    fn set_owner(
        &self,
        path: &Utf8Path,
        user: &str,
        group: &str,
    ) -> Result<(), OwnershipError> {
        let uid = get_user_by_name(user)
            .ok_or_else(|| OwnershipError::UnknownUser(user.to_string()))?
            .uid();
        let gid = get_group_by_name(group)
            .ok_or_else(|| OwnershipError::UnknownGroup(group.to_string()))?
            .gid();

        chown(path, Some(uid), Some(gid)).map_err(|err| {
            OwnershipError::Chown {
                path: path.to_owned(),
                user: user.to_string(),
                group: group.to_string(),
                err,
            }
        })
    }
}

/// Sets the permission bits of `path` to exactly `mode`.
pub fn set_mode(path: &Utf8Path, mode: u32) -> Result<(), OwnershipError> {
    set_permissions(path, Permissions::from_mode(mode)).map_err(|err| {
        OwnershipError::Mode { path: path.to_owned(), mode, err }
    })
}

#[cfg(test)]
mod test {
    use super::*;
    use camino_tempfile::Utf8TempDir;

    #[test]
    fn test_unknown_user_is_reported() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, "x").unwrap();

        let user = "no-such-user-for-metrics-bootstrap";
        let err = HostOwnership::default()
            .set_owner(&path, user, "root")
            .expect_err("unknown user should fail");
        assert!(
            matches!(err, OwnershipError::UnknownUser(ref u) if u == user),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_set_mode() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("file");
        std::fs::write(&path, "x").unwrap();

        set_mode(&path, 0o550).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o550);
    }

    #[test]
    fn test_set_mode_missing_file() {
        let dir = Utf8TempDir::new().unwrap();
        let path = dir.path().join("missing");
        let err = set_mode(&path, 0o550).unwrap_err();
        assert!(matches!(err, OwnershipError::Mode { mode: 0o550, .. }));
    }
}
