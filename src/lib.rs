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

//! A log file writer that rotates its output by a time-based filename pattern.
//!
//! The filename is a strftime-like pattern, e.g., `logs/app.%Y%m%d.log`. Each write renders the
//! pattern at the start of the current rotation period; when the rendered name changes, the
//! writer switches to the new file, optionally re-points a symlink at it, and removes old files
//! according to a retention policy.
//!
//! # Overview
//!
//! * [`RotateLog`] is the writer. It implements [`std::io::Write`] on shared references, so it can
//!   be used from many threads at once.
//! * [`RotateLog::rotate`] forces a rotation, e.g., from a `SIGHUP` handler.
//! * [`RotateLog::rotation_events`] reports which file became active after each rotation.
//! * [`RetentionPolicy`] keeps files either by maximum age or by maximum count.
//! * Processes sharing a pattern coordinate their rotation side effects through lock files
//!   named `<filename>_lock`.
//!
//! # Examples
//!
//! ```
//! use std::io::Write;
//! use std::num::NonZeroUsize;
//!
//! use rotatelog::RotateLog;
//!
//! let dir = tempfile::tempdir().unwrap();
//! let pattern = dir.path().join("app.%Y%m%d%H.log");
//!
//! let log = RotateLog::builder(pattern.display().to_string())
//!     .rotation_time(std::time::Duration::from_secs(60 * 60))
//!     .max_count(NonZeroUsize::new(24).unwrap())
//!     .link_name(dir.path().join("app.log"))
//!     .build()
//!     .unwrap();
//!
//! (&log).write_all(b"This line is written to the current hourly file.\n").unwrap();
//! log.close().unwrap();
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use self::clock::Clock;
pub use self::clock::ManualClock;
pub use self::error::Error;
pub use self::error::ErrorKind;
pub use self::notify::RotationEvents;
pub use self::pattern::Pattern;
pub use self::retention::RetentionPolicy;
pub use self::rotate::RotateLog;
pub use self::rotate::RotateLogBuilder;
pub use self::trap::DefaultTrap;
pub use self::trap::Trap;

mod clock;
mod error;
mod lock;
mod notify;
mod pattern;
mod retention;
mod rotate;
mod trap;
mod worker;
