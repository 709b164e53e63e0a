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

use std::fs;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::io::Write;
use std::num::NonZeroUsize;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::RwLock;
use std::time::Duration;
use std::time::SystemTime;

use jiff::Zoned;

use crate::Clock;
use crate::Error;
use crate::ErrorKind;
use crate::Pattern;
use crate::RetentionPolicy;
use crate::RotationEvents;
use crate::Trap;
use crate::lock::LockGuard;
use crate::lock::SYMLINK_SUFFIX;
use crate::lock::with_suffix;
use crate::notify::RotationNotifier;
use crate::retention::Sweeper;
use crate::trap::DefaultTrap;

/// A writer that rotates its output file as the rendered filename pattern changes.
///
/// Every write renders the pattern at the start of the current rotation period. When the
/// rendered name differs from the active one, the writer opens the new file, updates the
/// optional symlink, sweeps old files by the retention policy, and publishes a rotation event
/// before writing.
///
/// The writer is shared by reference: [`Write`] is implemented for `&RotateLog`, and all writes
/// are serialized so records never interleave.
#[derive(Debug)]
pub struct RotateLog {
    pattern: Pattern,
    rotation_time: Duration,
    policy: RetentionPolicy,
    link_name: Option<PathBuf>,
    clock: Clock,
    trap: Box<dyn Trap>,
    sweeper: Sweeper,
    notifier: RotationNotifier,
    state: Mutex<State>,
    current: RwLock<PathBuf>,
}

#[derive(Debug, Default)]
struct State {
    file: Option<File>,
    // the rendered pattern, without generation suffix
    base: PathBuf,
    filename: PathBuf,
    generation: usize,
    closed: bool,
}

impl RotateLog {
    /// Creates a new [`RotateLogBuilder`].
    ///
    /// # Examples
    ///
    /// ```
    /// use rotatelog::RotateLog;
    ///
    /// let builder = RotateLog::builder("logs/app.%Y%m%d.log");
    /// ```
    #[must_use]
    pub fn builder(pattern: impl Into<String>) -> RotateLogBuilder {
        RotateLogBuilder::new(pattern)
    }

    /// Return the file currently written to.
    ///
    /// The path is empty until the first write or rotation. It may change right after it is
    /// read, since writers are not blocked by this call.
    pub fn current_filename(&self) -> PathBuf {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Forcefully rotate the log file.
    ///
    /// If the rendered filename has not changed since the last rotation, a generation suffix
    /// `.1`, `.2`, ... is appended, using the next generation whose file does not exist yet.
    /// This is meant to be called from a signal handler, e.g., to reopen logs on `SIGHUP`.
    ///
    /// # Errors
    ///
    /// * [`ErrorKind::OpenFailed`] if the new file cannot be opened. The previous file stays
    ///   active.
    /// * [`ErrorKind::RotationSideEffectFailed`] if the symlink update or the retention sweep
    ///   failed. The new file is active regardless.
    /// * [`ErrorKind::Closed`] if the writer has been closed.
    pub fn rotate(&self) -> Result<(), Error> {
        let mut state = self.state();
        self.rotate_nolock(&mut state, true)
    }

    /// Close the active file.
    ///
    /// Closing is idempotent. Once closed, writes and rotations fail with [`ErrorKind::Closed`].
    pub fn close(&self) -> Result<(), Error> {
        let mut state = self.state();
        state.closed = true;
        if let Some(mut file) = state.file.take() {
            file.flush().map_err(|err| {
                Error::new(ErrorKind::Unexpected, "failed to flush log file on close")
                    .with_context("path", state.filename.display())
                    .with_source(err)
            })?;
        }
        Ok(())
    }

    /// Subscribe to rotation events.
    ///
    /// Each event carries the filename that became active. See [`RotationEvents`] for the
    /// delivery guarantees.
    pub fn rotation_events(&self) -> RotationEvents {
        self.notifier.subscribe()
    }

    /// The compiled filename pattern.
    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }

    /// The retention policy applied after each rotation.
    pub fn policy(&self) -> RetentionPolicy {
        self.policy
    }

    /// The length of a rotation period.
    pub fn rotation_time(&self) -> Duration {
        self.rotation_time
    }

    /// The symlink kept pointing at the active file, if configured.
    pub fn link_name(&self) -> Option<&Path> {
        self.link_name.as_deref()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn rotate_nolock(&self, state: &mut State, force: bool) -> Result<(), Error> {
        if state.closed {
            return Err(Error::new(ErrorKind::Closed, "rotating log is closed")
                .with_context("pattern", self.pattern.as_str()));
        }

        let now = self.clock.now();
        let period_start = Pattern::truncate(&now, self.rotation_time)?;
        let base = PathBuf::from(self.pattern.render(&period_start)?);

        let (filename, generation) = if base != state.base {
            (base.clone(), 0)
        } else if !force {
            return Ok(());
        } else {
            next_generation(&base, state.generation)
        };

        let file = open_log_file(&filename)?;
        let side_effects = self.rotate_side_effects(&filename, &now);

        if let Some(mut previous) = state.file.replace(file) {
            if let Err(err) = previous.flush() {
                let err = Error::new(ErrorKind::Unexpected, "failed to flush previous log file")
                    .with_context("path", state.filename.display())
                    .with_source(err);
                self.trap.trap(&err);
            }
        }
        state.base = base;
        state.filename = filename.clone();
        state.generation = generation;
        *self.current.write().unwrap_or_else(|e| e.into_inner()) = filename.clone();
        self.notifier.try_publish(filename);

        match side_effects {
            Ok(()) => Ok(()),
            Err(err) if force => Err(err),
            Err(err) => {
                self.trap.trap(&err);
                Ok(())
            }
        }
    }

    fn rotate_side_effects(&self, filename: &Path, now: &Zoned) -> Result<(), Error> {
        let Some(mut guard) = LockGuard::try_acquire(filename)? else {
            // another writer is rotating to this file
            return Ok(());
        };

        if let Some(link_name) = &self.link_name {
            update_symlink(filename, link_name)?;
        }

        self.sweeper.sweep(
            self.pattern.glob(),
            &self.policy,
            SystemTime::from(now.timestamp()),
            filename,
        )?;

        guard.release();
        Ok(())
    }
}

impl Write for &RotateLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state();
        self.rotate_nolock(&mut state, false)?;

        let file = state
            .file
            .as_mut()
            .ok_or_else(|| Error::new(ErrorKind::Closed, "no log file is open"))?;
        file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.state().file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl Write for RotateLog {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        (&*self).write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        (&*self).flush()
    }
}

impl Drop for RotateLog {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(file) = state.file.as_mut() {
            if let Err(err) = file.flush() {
                let err = Error::new(ErrorKind::Unexpected, "failed to flush log file on dropped")
                    .with_context("path", state.filename.display())
                    .with_source(err);
                self.trap.trap(&err);
            }
        }
    }
}

/// A builder for configuring [`RotateLog`].
#[derive(Debug)]
pub struct RotateLogBuilder {
    // required
    pattern: String,

    // has default
    rotation_time: Duration,
    max_age: Option<Duration>,
    max_count: Option<NonZeroUsize>,
    link_name: Option<PathBuf>,
    clock: Clock,
    trap: Box<dyn Trap>,
}

impl RotateLogBuilder {
    /// The default length of a rotation period, one day.
    pub const DEFAULT_ROTATION_TIME: Duration = Duration::from_secs(24 * 60 * 60);

    /// Creates a new [`RotateLogBuilder`] for the given filename pattern.
    #[must_use]
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            rotation_time: Self::DEFAULT_ROTATION_TIME,
            max_age: None,
            max_count: None,
            link_name: None,
            clock: Clock::default(),
            trap: Box::new(DefaultTrap::default()),
        }
    }

    /// Set the length of a rotation period.
    ///
    /// The current time is truncated to a multiple of this period, in local calendar terms,
    /// before the pattern is rendered. Zero disables truncation. Default to one day.
    #[must_use]
    pub fn rotation_time(mut self, rotation_time: Duration) -> Self {
        self.rotation_time = rotation_time;
        self
    }

    /// Remove rotated files whose modification time is older than `max_age`.
    ///
    /// Conflicts with [`max_count`](Self::max_count). When neither is set, files older than
    /// seven days are removed.
    #[must_use]
    pub fn max_age(mut self, max_age: Duration) -> Self {
        self.max_age = Some(max_age);
        self
    }

    /// Keep at most `n` rotated files.
    ///
    /// Conflicts with [`max_age`](Self::max_age).
    #[must_use]
    pub fn max_count(mut self, n: NonZeroUsize) -> Self {
        self.max_count = Some(n);
        self
    }

    /// Maintain a symlink at `link_name` pointing to the active file.
    #[must_use]
    pub fn link_name(mut self, link_name: impl Into<PathBuf>) -> Self {
        self.link_name = Some(link_name.into());
        self
    }

    /// Set the clock. Default to [`Clock::Local`].
    #[must_use]
    pub fn clock(mut self, clock: impl Into<Clock>) -> Self {
        self.clock = clock.into();
        self
    }

    /// Set the trap for errors that are reported but not returned.
    ///
    /// Default to [`DefaultTrap`].
    #[must_use]
    pub fn trap(mut self, trap: impl Into<Box<dyn Trap>>) -> Self {
        self.trap = trap.into();
        self
    }

    /// Builds the [`RotateLog`].
    ///
    /// No file is opened until the first write or rotation.
    ///
    /// # Errors
    ///
    /// Return an error if either:
    ///
    /// * The pattern is invalid.
    /// * Both a maximum age and a maximum count are configured.
    /// * The background sweeper thread cannot be spawned.
    pub fn build(self) -> Result<RotateLog, Error> {
        let Self {
            pattern,
            rotation_time,
            max_age,
            max_count,
            link_name,
            clock,
            trap,
        } = self;

        let pattern = Pattern::compile(pattern)?;
        let policy = RetentionPolicy::resolve(max_age, max_count)?;
        let sweeper = Sweeper::spawn("rotatelog-sweeper")?;

        Ok(RotateLog {
            pattern,
            rotation_time,
            policy,
            link_name,
            clock,
            trap,
            sweeper,
            notifier: RotationNotifier::new(),
            state: Mutex::new(State::default()),
            current: RwLock::new(PathBuf::new()),
        })
    }
}

fn next_generation(base: &Path, current: usize) -> (PathBuf, usize) {
    let mut generation = current;
    loop {
        generation += 1;
        let filename = with_suffix(base, &format!(".{generation}"));
        if fs::symlink_metadata(&filename).is_err() {
            return (filename, generation);
        }
    }
}

fn open_log_file(filename: &Path) -> Result<File, Error> {
    let failed = |err: io::Error| {
        Error::new(ErrorKind::OpenFailed, "failed to open log file")
            .with_context("path", filename.display())
            .with_source(err)
    };

    if let Some(dir) = filename.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(failed)?;
    }

    let mut options = OpenOptions::new();
    options.append(true).create(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o644);
    }
    options.open(filename).map_err(failed)
}

/// Point `link_name` at `filename` by renaming a fresh temporary symlink over it.
fn update_symlink(filename: &Path, link_name: &Path) -> Result<(), Error> {
    let tmp_link = with_suffix(filename, SYMLINK_SUFFIX);
    let failed = |message: &str, err: io::Error| {
        Error::new(ErrorKind::RotationSideEffectFailed, message)
            .with_context("path", filename.display())
            .with_context("link", link_name.display())
            .with_source(err)
    };

    // left behind by a rotation that crashed; we hold the lock
    match fs::remove_file(&tmp_link) {
        Err(err) if err.kind() != io::ErrorKind::NotFound => {
            return Err(failed("failed to remove stale temporary symlink", err));
        }
        _ => {}
    }

    let target = symlink_target(filename, link_name)
        .map_err(|err| failed("failed to resolve symlink target", err))?;
    symlink(&target, &tmp_link).map_err(|err| failed("failed to create new symlink", err))?;
    fs::rename(&tmp_link, link_name).map_err(|err| {
        let _ = fs::remove_file(&tmp_link);
        failed("failed to rename new symlink", err)
    })
}

// Symlink targets resolve against the directory of the link, not the working directory.
fn symlink_target(filename: &Path, link_name: &Path) -> io::Result<PathBuf> {
    if filename.is_absolute() {
        return Ok(filename.to_path_buf());
    }
    match filename.file_name() {
        Some(name) if filename.parent() == link_name.parent() => Ok(PathBuf::from(name)),
        _ => std::path::absolute(filename),
    }
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(original, link)
}

#[cfg(not(any(unix, windows)))]
fn symlink(_original: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    use rand::Rng;
    use rand::distr::Alphanumeric;
    use tempfile::TempDir;

    use super::*;
    use crate::ManualClock;
    use crate::lock::LOCK_SUFFIX;

    #[derive(Debug, Default, Clone)]
    struct RecordingTrap {
        kinds: Arc<Mutex<Vec<ErrorKind>>>,
    }

    impl RecordingTrap {
        fn kinds(&self) -> Vec<ErrorKind> {
            self.kinds.lock().unwrap().clone()
        }
    }

    impl Trap for RecordingTrap {
        fn trap(&self, err: &Error) {
            self.kinds.lock().unwrap().push(err.kind());
        }
    }

    fn zoned(s: &str) -> Zoned {
        Zoned::from_str(s).unwrap()
    }

    fn pattern_in(dir: &TempDir, pattern: &str) -> String {
        dir.path().join(pattern).display().to_string()
    }

    fn write(log: &RotateLog, s: &str) {
        let mut log = log;
        assert_eq!(log.write(s.as_bytes()).unwrap(), s.len());
    }

    fn write_err(log: &RotateLog, s: &str) -> ErrorKind {
        let mut log = log;
        let err = log.write(s.as_bytes()).unwrap_err();
        Error::from_io_error(&err).unwrap().kind()
    }

    fn generate_random_string() -> String {
        let mut rng = rand::rng();
        let len = rng.random_range(50..=100);
        std::iter::repeat(())
            .map(|()| rng.sample(Alphanumeric))
            .map(char::from)
            .take(len)
            .collect()
    }

    #[test]
    fn test_no_rotation_within_period() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T00:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .build()
            .unwrap();
        assert_eq!(log.current_filename(), PathBuf::new());

        let mut expected = String::new();
        for hour in 0..24 {
            clock.set_now(zoned(&format!("2024-08-10T{hour:02}:30:00[UTC]")));
            let record = generate_random_string();
            write(&log, &record);
            expected.push_str(&record);
        }

        let filename = temp_dir.path().join("log-20240810.txt");
        assert_eq!(log.current_filename(), filename);
        assert_eq!(fs::read_to_string(&filename).unwrap(), expected);
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 1);
        assert_eq!(log.state().generation, 0);
    }

    #[test]
    fn test_rotation_on_period_boundary() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T23:59:59[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .build()
            .unwrap();

        write(&log, "a");
        clock.set_now(zoned("2024-08-11T00:00:00[UTC]"));
        write(&log, "b");

        let day1 = temp_dir.path().join("log-20240810.txt");
        let day2 = temp_dir.path().join("log-20240811.txt");
        assert_eq!(log.current_filename(), day2);
        assert_eq!(fs::read_to_string(day1).unwrap(), "a");
        assert_eq!(fs::read_to_string(day2).unwrap(), "b");
    }

    #[test]
    fn test_period_starts_at_local_midnight() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2018-06-01T03:18:00+09:00[+09:00]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d%H.txt"))
            .clock(clock)
            .build()
            .unwrap();

        write(&log, "a");
        assert_eq!(
            log.current_filename(),
            temp_dir.path().join("log-2018060100.txt")
        );
    }

    #[test]
    fn test_forced_rotation_uses_generations() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .build()
            .unwrap();

        let base = temp_dir.path().join("log-20240810.txt");
        log.rotate().unwrap();
        assert_eq!(log.current_filename(), base);
        log.rotate().unwrap();
        assert_eq!(log.current_filename(), with_suffix(&base, ".1"));
        log.rotate().unwrap();
        assert_eq!(log.current_filename(), with_suffix(&base, ".2"));

        // writes stay on the latest generation until the period ends
        write(&log, "a");
        assert_eq!(
            fs::read_to_string(with_suffix(&base, ".2")).unwrap(),
            "a"
        );
        assert_eq!(fs::read_to_string(&base).unwrap(), "");

        clock.set_now(zoned("2024-08-11T12:00:00[UTC]"));
        write(&log, "b");
        assert_eq!(
            log.current_filename(),
            temp_dir.path().join("log-20240811.txt")
        );
        assert_eq!(log.state().generation, 0);
    }

    #[test]
    fn test_forced_rotation_skips_existing_generations() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "app.log"))
            .clock(clock)
            .build()
            .unwrap();

        let base = temp_dir.path().join("app.log");
        fs::write(with_suffix(&base, ".1"), b"old").unwrap();
        fs::write(with_suffix(&base, ".2"), b"old").unwrap();

        write(&log, "a");
        log.rotate().unwrap();
        assert_eq!(log.current_filename(), with_suffix(&base, ".3"));
        assert_eq!(fs::read_to_string(with_suffix(&base, ".1")).unwrap(), "old");
    }

    #[test]
    fn test_close() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .build()
            .unwrap();

        log.close().unwrap();
        log.close().unwrap();
        assert_eq!(write_err(&log, "a"), ErrorKind::Closed);
        assert_eq!(log.rotate().unwrap_err().kind(), ErrorKind::Closed);

        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .build()
            .unwrap();
        write(&log, "a");
        log.close().unwrap();
        assert_eq!(fs::read_to_string(log.current_filename()).unwrap(), "a");
        assert_eq!(write_err(&log, "b"), ErrorKind::Closed);
    }

    #[test]
    fn test_open_failure_keeps_previous_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "%Y%m%d/app.log"))
            .clock(clock.clone())
            .build()
            .unwrap();

        write(&log, "a");
        let day1 = temp_dir.path().join("20240810").join("app.log");
        assert_eq!(log.current_filename(), day1);

        // a regular file where the next directory should be
        fs::write(temp_dir.path().join("20240811"), b"").unwrap();
        clock.set_now(zoned("2024-08-11T12:00:00[UTC]"));
        assert_eq!(write_err(&log, "b"), ErrorKind::OpenFailed);
        assert_eq!(log.rotate().unwrap_err().kind(), ErrorKind::OpenFailed);
        assert_eq!(log.current_filename(), day1);

        clock.set_now(zoned("2024-08-10T13:00:00[UTC]"));
        write(&log, "c");
        assert_eq!(fs::read_to_string(&day1).unwrap(), "ac");
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_follows_active_file() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let link = temp_dir.path().join("current.log");
        let trap = RecordingTrap::default();
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .link_name(&link)
            .trap(trap.clone())
            .build()
            .unwrap();

        write(&log, "a");
        assert_eq!(fs::read_link(&link).unwrap(), log.current_filename());
        assert_eq!(fs::read_to_string(&link).unwrap(), "a");

        clock.set_now(zoned("2024-08-11T12:00:00[UTC]"));
        write(&log, "b");
        assert_eq!(fs::read_link(&link).unwrap(), log.current_filename());
        assert_eq!(fs::read_to_string(&link).unwrap(), "b");

        assert!(trap.kinds().is_empty());
        let leftovers = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
            .filter(|name| name.ends_with(LOCK_SUFFIX) || name.ends_with(SYMLINK_SUFFIX))
            .collect::<Vec<_>>();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_side_effect_failure_policies() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let trap = RecordingTrap::default();
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock)
            .link_name(temp_dir.path().join("missing").join("current.log"))
            .trap(trap.clone())
            .build()
            .unwrap();

        // write-triggered rotation reports through the trap and carries on
        write(&log, "a");
        let base = temp_dir.path().join("log-20240810.txt");
        assert_eq!(log.current_filename(), base);
        assert_eq!(trap.kinds(), vec![ErrorKind::RotationSideEffectFailed]);

        // forced rotation returns the error, but the new file is active anyway
        let err = log.rotate().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::RotationSideEffectFailed);
        assert_eq!(log.current_filename(), with_suffix(&base, ".1"));
        write(&log, "b");
        assert_eq!(fs::read_to_string(with_suffix(&base, ".1")).unwrap(), "b");

        assert!(!with_suffix(&base, LOCK_SUFFIX).exists());
        assert!(!with_suffix(&with_suffix(&base, ".1"), LOCK_SUFFIX).exists());
        assert_eq!(trap.kinds().len(), 1);
    }

    #[test]
    fn test_stale_lock_skips_side_effects() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let link = temp_dir.path().join("current.log");
        let trap = RecordingTrap::default();
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock)
            .link_name(&link)
            .trap(trap.clone())
            .build()
            .unwrap();

        let base = temp_dir.path().join("log-20240810.txt");
        let marker = with_suffix(&base, LOCK_SUFFIX);
        fs::write(&marker, b"").unwrap();

        log.rotate().unwrap();
        write(&log, "a");
        assert_eq!(log.current_filename(), base);
        assert!(fs::symlink_metadata(&link).is_err());
        assert!(marker.exists());
        assert!(trap.kinds().is_empty());
    }

    #[test]
    fn test_rotation_events_are_dropped_when_unconsumed() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .build()
            .unwrap();
        let events = log.rotation_events();

        write(&log, "a");
        let day1 = log.current_filename();
        clock.set_now(zoned("2024-08-11T12:00:00[UTC]"));
        write(&log, "b");
        let day2 = log.current_filename();

        assert_eq!(events.try_recv(), Some(day1));
        assert_eq!(events.try_recv(), None);

        log.rotate().unwrap();
        assert_eq!(
            events.recv_timeout(Duration::from_secs(1)),
            Some(with_suffix(&day2, ".1"))
        );
    }

    #[test]
    fn test_max_count_keeps_newest_files() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-01T12:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .max_count(NonZeroUsize::new(3).unwrap())
            .build()
            .unwrap();
        assert_eq!(
            log.policy(),
            RetentionPolicy::MaxCount(NonZeroUsize::new(3).unwrap())
        );

        for day in 1..=6 {
            clock.set_now(zoned(&format!("2024-08-{day:02}T12:00:00[UTC]")));
            write(&log, &generate_random_string());
        }

        let expected = (4..=6)
            .map(|day| format!("log-202408{day:02}.txt"))
            .collect::<Vec<_>>();
        let list = || {
            let mut names = fs::read_dir(temp_dir.path())
                .unwrap()
                .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
                .collect::<Vec<_>>();
            names.sort();
            names
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while list() != expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(list(), expected);
    }

    #[test]
    fn test_max_count_sweeps_forced_generations() {
        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let clock = ManualClock::new(zoned("2024-08-10T12:00:00[UTC]"));
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(clock.clone())
            .max_count(NonZeroUsize::new(2).unwrap())
            .build()
            .unwrap();

        for day in 10..20 {
            clock.set_now(zoned(&format!("2024-08-{day}T12:00:00[UTC]")));
            write(&log, &generate_random_string());
            log.rotate().unwrap();
        }
        assert_eq!(
            log.current_filename(),
            temp_dir.path().join("log-20240819.txt.1")
        );

        let expected = vec![
            "log-20240819.txt".to_string(),
            "log-20240819.txt.1".to_string(),
        ];
        let list = || {
            let mut names = fs::read_dir(temp_dir.path())
                .unwrap()
                .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
                .collect::<Vec<_>>();
            names.sort();
            names
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while list() != expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(list(), expected);
    }

    #[cfg(unix)]
    #[test]
    fn test_log_files_are_created_with_mode_0644() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().expect("failed to create a temporary directory");
        let log = RotateLog::builder(pattern_in(&temp_dir, "log-%Y%m%d.txt"))
            .clock(ManualClock::new(zoned("2024-08-10T12:00:00[UTC]")))
            .build()
            .unwrap();
        write(&log, "hello");

        let mode = fs::metadata(log.current_filename())
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        // the umask may clear bits but never adds any
        assert_eq!(mode & !0o644, 0, "unexpected mode {mode:o}");
        assert_ne!(mode & 0o600, 0, "unexpected mode {mode:o}");
    }

    #[test]
    fn test_builder_rejects_conflicts_and_bad_patterns() {
        let err = RotateLog::builder("log-%Y.txt")
            .max_age(Duration::from_secs(60))
            .max_count(NonZeroUsize::new(1).unwrap())
            .build()
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConflictingRetentionPolicy);

        let err = RotateLog::builder("log-%Q.txt").build().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPattern);

        let log = RotateLog::builder("log-%Y.txt").build().unwrap();
        assert_eq!(log.policy(), RetentionPolicy::default());
        assert_eq!(log.rotation_time(), RotateLogBuilder::DEFAULT_ROTATION_TIME);
        assert_eq!(log.pattern().glob(), "log-*.txt");
        assert!(log.link_name().is_none());
    }
}
