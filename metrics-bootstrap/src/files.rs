// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Installing rendered files.

use camino::{Utf8Path, Utf8PathBuf};
use std::io::Write;

#[derive(Debug, thiserror::Error)]
#[error("failed to write {path}")]
pub struct WriteError {
    pub path: Utf8PathBuf,
    #[source]
    pub err: std::io::Error,
}

/// Replaces `path` with `contents` so readers see either the old or the new
/// file, never a partial one.
pub fn write_atomic(path: &Utf8Path, contents: &str) -> Result<(), WriteError> {
    let file = atomicwrites::AtomicFile::new(
        path,
        atomicwrites::OverwriteBehavior::AllowOverwrite,
    );
    let res = file.write(|f| {
        f.write_all(contents.as_bytes())?;
        f.sync_all()
    });
    match res {
        Ok(()) => Ok(()),
        Err(atomicwrites::Error::Internal(err))
        | Err(atomicwrites::Error::User(err)) => {
            Err(WriteError { path: path.to_owned(), err })
        }
    }
}
