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

use std::sync::Arc;
use std::sync::Mutex;

use jiff::Timestamp;
use jiff::Zoned;
use jiff::tz::TimeZone;

/// The source of "now" for a rotating writer.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Wall-clock time in the system time zone.
    #[default]
    Local,
    /// Wall-clock time in UTC.
    Utc,
    /// A clock that only moves when told to.
    Manual(ManualClock),
}

impl Clock {
    /// Return the current time of this clock.
    pub fn now(&self) -> Zoned {
        match self {
            Clock::Local => Zoned::now(),
            Clock::Utc => Timestamp::now().to_zoned(TimeZone::UTC),
            Clock::Manual(clock) => clock.now(),
        }
    }
}

impl From<ManualClock> for Clock {
    fn from(clock: ManualClock) -> Self {
        Clock::Manual(clock)
    }
}

/// The time could be reset.
///
/// Clones share the same time, so a test can keep one handle and pass another to the writer.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Zoned>>,
}

impl ManualClock {
    /// Create a clock stopped at `now`.
    pub fn new(now: Zoned) -> ManualClock {
        ManualClock {
            now: Arc::new(Mutex::new(now)),
        }
    }

    /// Return the time this clock is set to.
    pub fn now(&self) -> Zoned {
        self.now.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Reset the time of this clock and all its clones.
    pub fn set_now(&self, now: Zoned) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }
}
