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

use std::cmp::Ordering;
use std::fs;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::thread::JoinHandle;
use std::time::Duration;
use std::time::SystemTime;

use crossbeam_channel::Sender;
use crossbeam_channel::unbounded;

use crate::Error;
use crate::ErrorKind;
use crate::lock::LOCK_SUFFIX;
use crate::lock::SYMLINK_SUFFIX;
use crate::worker::Worker;

/// Which rotated files survive a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPolicy {
    /// Keep files modified at or after `now - age`.
    ///
    /// Symlinks are never removed under this policy.
    MaxAge(Duration),
    /// Keep at most this many matching files, removing the first ones in path order.
    ///
    /// Digit runs compare by value and the active file is always kept.
    MaxCount(NonZeroUsize),
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        RetentionPolicy::MaxAge(RetentionPolicy::DEFAULT_MAX_AGE)
    }
}

impl RetentionPolicy {
    /// The maximum age used when neither a maximum age nor a maximum count is configured.
    pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

    /// Resolve the configured options into exactly one policy.
    ///
    /// A zero `max_age` counts as not configured.
    pub(crate) fn resolve(
        max_age: Option<Duration>,
        max_count: Option<NonZeroUsize>,
    ) -> Result<RetentionPolicy, Error> {
        let max_age = max_age.filter(|age| !age.is_zero());
        match (max_age, max_count) {
            (Some(age), Some(count)) => Err(Error::new(
                ErrorKind::ConflictingRetentionPolicy,
                "max age and max count cannot be both set",
            )
            .with_context("max_age", format!("{age:?}"))
            .with_context("max_count", count)),
            (Some(age), None) => Ok(RetentionPolicy::MaxAge(age)),
            (None, Some(count)) => Ok(RetentionPolicy::MaxCount(count)),
            (None, None) => Ok(RetentionPolicy::default()),
        }
    }
}

/// Collect the files matching `glob` that violate `policy`.
///
/// Files carrying a generation suffix (`<glob>.N`) are included. Lock markers and temporary
/// symlinks are never considered, and the `active` file is never returned.
pub(crate) fn expired_files(
    glob: &str,
    policy: &RetentionPolicy,
    now: SystemTime,
    active: &Path,
) -> Result<Vec<PathBuf>, Error> {
    // forced rotations append `.N` to the rendered name
    let mut paths = list_files(glob)?;
    paths.extend(list_files(&format!("{glob}.*"))?);
    paths.sort();
    paths.dedup();

    let mut candidates = vec![];
    for path in paths {
        let filename = path.as_os_str().to_string_lossy();
        if filename.ends_with(LOCK_SUFFIX) || filename.ends_with(SYMLINK_SUFFIX) {
            continue;
        }

        // dangling symlinks and vanished files are skipped
        let Ok(metadata) = fs::metadata(&path) else {
            continue;
        };
        let Ok(link_metadata) = fs::symlink_metadata(&path) else {
            continue;
        };

        if let RetentionPolicy::MaxAge(age) = policy {
            if link_metadata.file_type().is_symlink() || path == active {
                continue;
            }
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            match now.checked_sub(*age) {
                Some(cutoff) if modified < cutoff => {}
                _ => continue,
            }
        }

        candidates.push(path);
    }

    if let RetentionPolicy::MaxCount(count) = policy {
        if candidates.len() <= count.get() {
            return Ok(vec![]);
        }
        // the active file always takes one of the kept slots
        let before = candidates.len();
        candidates.retain(|path| path != active);
        let keep = count.get() - (before - candidates.len());
        candidates.sort_by(|a, b| natural_cmp(a, b));
        candidates.truncate(candidates.len().saturating_sub(keep));
    }

    Ok(candidates)
}

fn list_files(glob: &str) -> Result<Vec<PathBuf>, Error> {
    let matches = glob::glob(glob).map_err(|err| {
        Error::new(ErrorKind::RotationSideEffectFailed, "failed to list rotated files")
            .with_context("glob", glob)
            .with_source(err)
    })?;
    Ok(matches.filter_map(Result::ok).collect())
}

/// Compare paths with digit runs ordered by value, so `app.log.10` sorts after `app.log.9`.
fn natural_cmp(a: &Path, b: &Path) -> Ordering {
    let a = a.as_os_str().to_string_lossy();
    let b = b.as_os_str().to_string_lossy();
    let mut a = a.as_bytes();
    let mut b = b.as_bytes();
    loop {
        match (a.first(), b.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (x, rest_a) = split_digits(a);
                let (y, rest_b) = split_digits(b);
                let ordering = compare_digits(x, y);
                if ordering != Ordering::Equal {
                    return ordering;
                }
                a = rest_a;
                b = rest_b;
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(y);
                }
                a = &a[1..];
                b = &b[1..];
            }
        }
    }
}

fn split_digits(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|c| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn compare_digits(x: &[u8], y: &[u8]) -> Ordering {
    let trim = |s: &[u8]| -> usize { s.iter().position(|&c| c != b'0').unwrap_or(s.len()) };
    let (tx, ty) = (&x[trim(x)..], &y[trim(y)..]);
    tx.len()
        .cmp(&ty.len())
        .then_with(|| tx.cmp(ty))
        .then_with(|| x.len().cmp(&y.len()))
}

/// Sweeps rotated files and hands the expired ones to a background deletion thread.
///
/// Deletion is fire-and-forget: a sweep returns once the files are queued, and removal errors
/// are never reported.
#[derive(Debug)]
pub(crate) struct Sweeper {
    sender: Sender<Vec<PathBuf>>,
    _handle: JoinHandle<()>,
}

impl Sweeper {
    pub(crate) fn spawn(thread_name: impl Into<String>) -> Result<Sweeper, Error> {
        let (sender, receiver) = unbounded();
        let handle = Worker::new(receiver)
            .make_thread(thread_name.into())
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "failed to spawn sweeper thread").with_source(err)
            })?;
        Ok(Sweeper {
            sender,
            _handle: handle,
        })
    }

    pub(crate) fn sweep(
        &self,
        glob: &str,
        policy: &RetentionPolicy,
        now: SystemTime,
        active: &Path,
    ) -> Result<(), Error> {
        let expired = expired_files(glob, policy, now, active)?;
        if !expired.is_empty() {
            // the worker only goes away with the sweeper itself
            let _ = self.sender.send(expired);
        }
        Ok(())
    }
}
