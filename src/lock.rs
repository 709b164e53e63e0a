// Copyright 2024 FastLabs Developers
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::ffi::OsString;
use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::path::PathBuf;

use crate::Error;
use crate::ErrorKind;

pub(crate) const LOCK_SUFFIX: &str = "_lock";
pub(crate) const SYMLINK_SUFFIX: &str = "_symlink";

/// Append `suffix` to the last component of `path`, e.g., `app.log` to `app.log_lock`.
pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s = OsString::from(path.as_os_str());
    s.push(suffix);
    PathBuf::from(s)
}

/// An advisory lock guarding the side effects of one rotation.
///
/// The lock is a marker file `<filename>_lock` created exclusively. Processes writing with the
/// same pattern skip the symlink update and the retention sweep while the marker exists. The
/// marker is removed when the guard is released or dropped.
///
/// A process that crashes mid-rotation leaves the marker behind. There is no expiry: side
/// effects for that filename stay disabled until the stale marker is removed by hand.
#[derive(Debug)]
pub(crate) struct LockGuard {
    path: PathBuf,
    file: Option<File>,
}

impl LockGuard {
    /// Try to take the lock for `filename`.
    ///
    /// Return `Ok(None)` if the marker already exists, i.e., someone else is rotating.
    pub(crate) fn try_acquire(filename: &Path) -> Result<Option<LockGuard>, Error> {
        let path = with_suffix(filename, LOCK_SUFFIX);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => Ok(Some(LockGuard {
                path,
                file: Some(file),
            })),
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => Ok(None),
            Err(err) => Err(
                Error::new(ErrorKind::RotationSideEffectFailed, "failed to create lock file")
                    .with_context("path", path.display())
                    .with_source(err),
            ),
        }
    }

    /// Close and remove the marker. Calling it more than once is a no-op.
    pub(crate) fn release(&mut self) {
        if let Some(file) = self.file.take() {
            drop(file);
            let _ = fs::remove_file(&self.path);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release();
    }
}
