// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use crate::ownership::{Ownership, OwnershipError};
use camino::{Utf8Path, Utf8PathBuf};
use std::sync::Mutex;

/// One recorded call to [FakeOwnership::set_owner].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OwnerChange {
    pub path: Utf8PathBuf,
    pub user: String,
    pub group: String,
}

/// A fake implementation of [crate::ownership::Ownership].
///
/// Records requested ownership changes instead of applying them, so tests
/// can run without root.
#[derive(Debug, Default)]
pub struct FakeOwnership {
    changes: Mutex<Vec<OwnerChange>>,
}

impl FakeOwnership {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changes(&self) -> Vec<OwnerChange> {
        self.changes.lock().unwrap().clone()
    }
}

impl Ownership for FakeOwnership {
    fn set_owner(
        &self,
        path: &Utf8Path,
        user: &str,
        group: &str,
    ) -> Result<(), OwnershipError> {
        self.changes.lock().unwrap().push(OwnerChange {
            path: path.to_owned(),
            user: user.to_string(),
            group: group.to_string(),
        });
        Ok(())
    }
}
