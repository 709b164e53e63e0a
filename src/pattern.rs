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

use std::time::Duration;

use jiff::Timestamp;
use jiff::Zoned;
use jiff::fmt::strtime;
use jiff::tz::TimeZone;

use crate::Error;
use crate::ErrorKind;

/// A compiled filename pattern.
///
/// The pattern is a path template with strftime-like placeholders, e.g., `logs/app-%Y%m%d.log`.
/// Compiling it yields both a renderer (time to filename) and a glob that matches every filename
/// the renderer can produce. The glob is only used to enumerate files for retention; it never
/// parses time back out of a filename.
///
/// Recognized conversion specifiers are `%A %a %B %b %C %c %D %d %e %F %H %I %j %k %l %M %m %n %p
/// %R %r %S %T %t %U %u %V %v %W %w %X %x %Y %y %Z %z %%`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    format: String,
    glob: String,
    placeholders: bool,
}

impl Pattern {
    /// Compile a filename pattern.
    ///
    /// # Errors
    ///
    /// Return an [`ErrorKind::InvalidPattern`] error if the pattern is empty, contains an
    /// unknown conversion specifier, or ends with a dangling `%`.
    pub fn compile(pattern: impl Into<String>) -> Result<Pattern, Error> {
        let raw = pattern.into();
        if raw.is_empty() {
            return Err(Error::new(
                ErrorKind::InvalidPattern,
                "pattern must not be empty",
            ));
        }

        let mut format = String::with_capacity(raw.len());
        let mut glob = String::with_capacity(raw.len());
        let mut literal = String::new();
        let mut placeholders = false;

        let mut chars = raw.chars();
        while let Some(c) = chars.next() {
            match c {
                '%' => {
                    let spec = chars.next().ok_or_else(|| {
                        Error::new(ErrorKind::InvalidPattern, "dangling '%' at end of pattern")
                            .with_context("pattern", &raw)
                    })?;
                    let expanded = expand_specifier(spec).ok_or_else(|| {
                        Error::new(
                            ErrorKind::InvalidPattern,
                            format!("unknown conversion specifier '%{spec}'"),
                        )
                        .with_context("pattern", &raw)
                    })?;
                    format.push_str(expanded);
                    placeholders |= !matches!(spec, '%' | 'n' | 't');
                    push_literal(&mut glob, &mut literal);
                    push_wildcard(&mut glob);
                }
                '*' => {
                    format.push('*');
                    push_literal(&mut glob, &mut literal);
                    push_wildcard(&mut glob);
                }
                c => {
                    format.push(c);
                    literal.push(c);
                }
            }
        }
        push_literal(&mut glob, &mut literal);

        let pattern = Pattern {
            raw,
            format,
            glob,
            placeholders,
        };

        // surface formatter-side failures at construction rather than on the first write
        pattern.render(&Timestamp::UNIX_EPOCH.to_zoned(TimeZone::UTC))?;
        Ok(pattern)
    }

    /// Render the pattern at the given time.
    pub fn render(&self, time: &Zoned) -> Result<String, Error> {
        strtime::format(&self.format, time).map_err(|err| {
            Error::new(ErrorKind::InvalidPattern, "failed to render pattern")
                .with_context("pattern", &self.raw)
                .with_context("time", time)
                .with_source(err)
        })
    }

    /// The glob matching every filename this pattern renders.
    pub fn glob(&self) -> &str {
        &self.glob
    }

    /// The pattern as it was given.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether the pattern contains any time placeholder.
    ///
    /// A pattern without placeholders always renders the same filename.
    pub fn has_placeholders(&self) -> bool {
        self.placeholders
    }

    /// Truncate `now` to the start of its rotation period.
    ///
    /// The truncation works on the calendar-local fields of `now`: they are projected onto UTC,
    /// truncated there against the Unix epoch, and projected back into the zone of `now`. So a
    /// daily period starts at local midnight, not at UTC midnight. A zero period returns `now`
    /// unchanged.
    pub fn truncate(now: &Zoned, period: Duration) -> Result<Zoned, Error> {
        let period = i128::try_from(period.as_nanos()).unwrap_or(i128::MAX);
        if period == 0 {
            return Ok(now.clone());
        }

        let failed = |err: jiff::Error| {
            Error::new(ErrorKind::Unexpected, "failed to truncate time to rotation period")
                .with_context("time", now)
                .with_source(err)
        };

        let neutral = now
            .datetime()
            .to_zoned(TimeZone::UTC)
            .map_err(failed)?
            .timestamp()
            .as_nanosecond();
        let truncated = neutral - neutral.rem_euclid(period);
        let truncated = Timestamp::from_nanosecond(truncated).map_err(failed)?;
        TimeZone::UTC
            .to_datetime(truncated)
            .to_zoned(now.time_zone().clone())
            .map_err(failed)
    }
}

fn push_literal(glob: &mut String, literal: &mut String) {
    if !literal.is_empty() {
        glob.push_str(&glob::Pattern::escape(literal));
        literal.clear();
    }
}

fn push_wildcard(glob: &mut String) {
    if !glob.ends_with('*') {
        glob.push('*');
    }
}

// Composite specifiers are spelled out with C locale layouts.
fn expand_specifier(spec: char) -> Option<&'static str> {
    let expanded = match spec {
        'A' => "%A",
        'a' => "%a",
        'B' => "%B",
        'b' => "%b",
        'C' => "%C",
        'c' => "%a %b %e %H:%M:%S %Y",
        'D' => "%m/%d/%y",
        'd' => "%d",
        'e' => "%e",
        'F' => "%Y-%m-%d",
        'H' => "%H",
        'I' => "%I",
        'j' => "%j",
        'k' => "%k",
        'l' => "%l",
        'M' => "%M",
        'm' => "%m",
        'n' => "%n",
        'p' => "%p",
        'R' => "%H:%M",
        'r' => "%I:%M:%S %p",
        'S' => "%S",
        'T' => "%H:%M:%S",
        't' => "%t",
        'U' => "%U",
        'u' => "%u",
        'V' => "%V",
        'v' => "%e-%b-%Y",
        'W' => "%W",
        'w' => "%w",
        'X' => "%H:%M:%S",
        'x' => "%m/%d/%y",
        'Y' => "%Y",
        'y' => "%y",
        'Z' => "%Z",
        'z' => "%z",
        '%' => "%%",
        _ => return None,
    };
    Some(expanded)
}
