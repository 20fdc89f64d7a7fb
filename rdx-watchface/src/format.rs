//! Display formats and the policy that picks the active one.
//!
//! A [`DisplayFormat`] is an immutable, locale-bound value compiled once from a
//! pattern string and shared by cheap clones. Patterns use the familiar
//! ICU-style letters:
//!
//! | Letters            | Meaning                                  |
//! |--------------------|------------------------------------------|
//! | `h` / `hh`         | hour of half-day, 1-12                   |
//! | `K` / `KK`         | hour of half-day, 0-11                   |
//! | `H` / `HH`         | hour of day, 0-23                        |
//! | `k` / `kk`         | hour of day, 1-24                        |
//! | `m` / `mm`         | minute                                   |
//! | `s` / `ss`         | second                                   |
//! | `a`                | half-day marker from the locale          |
//! | `d` / `dd`         | day of month                             |
//! | `M` `MM` `MMM` `MMMM` | month number, short name, long name   |
//! | `yy` / `yyyy`      | two-digit or full year                   |
//! | `E` / `EEEE`       | short or long weekday name               |
//! | `Z`                | UTC offset, `+hhmm`                      |
//!
//! Text between single quotes is copied verbatim and `''` is a literal quote.
//! Every other non-letter character is a literal.

use crate::error::{PatternError, Result, WatchError};
use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;

/// The built-in 12-hour pattern: hours, minutes and the half-day marker.
pub const DEFAULT_TWELVE_HOUR_PATTERN: &str = "h:mm a";

/// The built-in 24-hour pattern: hours and minutes.
pub const DEFAULT_TWENTY_FOUR_HOUR_PATTERN: &str = "H:mm";

/// 01:02:03 past the epoch, the probe used to detect a seconds field.
const PROBE_SECONDS: i64 = 3_723;
const SECONDS_TOKEN: &str = "03";

/// Locale data a format needs at render time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DisplayLocale {
    /// A BCP 47 tag, informational.
    pub tag: String,
    /// Marker rendered by `a` before noon.
    pub am: String,
    /// Marker rendered by `a` from noon on.
    pub pm: String,
}

impl DisplayLocale {
    pub fn new(tag: impl Into<String>, am: impl Into<String>, pm: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            am: am.into(),
            pm: pm.into(),
        }
    }
}

impl Default for DisplayLocale {
    fn default() -> Self {
        Self::new("en-US", "AM", "PM")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HourCycle {
    /// `h`: 1-12
    OneToTwelve,
    /// `K`: 0-11
    ZeroToEleven,
    /// `H`: 0-23
    ZeroToTwentyThree,
    /// `k`: 1-24
    OneToTwentyFour,
}

impl HourCycle {
    fn hour_of(self, hour_of_day: u32) -> u32 {
        match self {
            HourCycle::OneToTwelve => match hour_of_day % 12 {
                0 => 12,
                hour => hour,
            },
            HourCycle::ZeroToEleven => hour_of_day % 12,
            HourCycle::ZeroToTwentyThree => hour_of_day,
            HourCycle::OneToTwentyFour => match hour_of_day {
                0 => 24,
                hour => hour,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Hour { cycle: HourCycle, width: usize },
    Minute { width: usize },
    Second { width: usize },
    Halfday,
    Day { width: usize },
    Month { width: usize },
    MonthName { long: bool },
    Weekday { long: bool },
    Year { width: usize },
    Offset,
}

/// A compiled, locale-bound display pattern.
///
/// `includes_seconds` is derived once, at construction, by rendering a fixed
/// probe time (`01:02:03`) and looking for `03` in the output. This is a
/// heuristic: a pattern carrying a literal `03` is classified as showing
/// seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFormat {
    pattern: Arc<str>,
    segments: Arc<[Segment]>,
    locale: Arc<DisplayLocale>,
    includes_seconds: bool,
}

impl DisplayFormat {
    /// Compiles `pattern` for `locale`.
    pub fn parse(pattern: &str, locale: &DisplayLocale) -> Result<Self> {
        let segments = compile(pattern).map_err(|reason| WatchError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        })?;
        Ok(Self::from_segments(pattern, segments, locale))
    }

    /// The built-in 12-hour default (`h:mm a`).
    pub fn default_twelve_hour(locale: &DisplayLocale) -> Self {
        let segments = vec![
            Segment::Hour {
                cycle: HourCycle::OneToTwelve,
                width: 1,
            },
            Segment::Literal(":".to_string()),
            Segment::Minute { width: 2 },
            Segment::Literal(" ".to_string()),
            Segment::Halfday,
        ];
        Self::from_segments(DEFAULT_TWELVE_HOUR_PATTERN, segments, locale)
    }

    /// The built-in 24-hour default (`H:mm`).
    pub fn default_twenty_four_hour(locale: &DisplayLocale) -> Self {
        let segments = vec![
            Segment::Hour {
                cycle: HourCycle::ZeroToTwentyThree,
                width: 1,
            },
            Segment::Literal(":".to_string()),
            Segment::Minute { width: 2 },
        ];
        Self::from_segments(DEFAULT_TWENTY_FOUR_HOUR_PATTERN, segments, locale)
    }

    fn from_segments(pattern: &str, segments: Vec<Segment>, locale: &DisplayLocale) -> Self {
        let mut format = Self {
            pattern: Arc::from(pattern),
            segments: Arc::from(segments),
            locale: Arc::new(locale.clone()),
            includes_seconds: false,
        };
        format.includes_seconds = format.render(&probe_time()).contains(SECONDS_TOKEN);
        format
    }

    /// The same pattern bound to a different locale.
    pub fn with_locale(&self, locale: &DisplayLocale) -> Self {
        Self::from_segments(&self.pattern, self.segments.to_vec(), locale)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn locale(&self) -> &DisplayLocale {
        &self.locale
    }

    pub fn includes_seconds(&self) -> bool {
        self.includes_seconds
    }

    /// Renders `time` in its own zone.
    pub fn render<Z>(&self, time: &DateTime<Z>) -> String
    where
        Z: TimeZone,
        Z::Offset: fmt::Display,
    {
        let mut out = String::with_capacity(self.pattern.len() + 8);
        for segment in self.segments.iter() {
            self.render_segment(segment, time, &mut out);
        }
        out
    }

    fn render_segment<Z>(&self, segment: &Segment, time: &DateTime<Z>, out: &mut String)
    where
        Z: TimeZone,
        Z::Offset: fmt::Display,
    {
        match segment {
            Segment::Literal(text) => out.push_str(text),
            Segment::Hour { cycle, width } => pad(out, cycle.hour_of(time.hour()), *width),
            Segment::Minute { width } => pad(out, time.minute(), *width),
            Segment::Second { width } => pad(out, time.second(), *width),
            Segment::Halfday => {
                let marker = if time.hour() < 12 {
                    &self.locale.am
                } else {
                    &self.locale.pm
                };
                out.push_str(marker);
            }
            Segment::Day { width } => pad(out, time.day(), *width),
            Segment::Month { width } => pad(out, time.month(), *width),
            Segment::MonthName { long } => {
                let directive = if *long { "%B" } else { "%b" };
                out.push_str(&time.format(directive).to_string());
            }
            Segment::Weekday { long } => {
                let directive = if *long { "%A" } else { "%a" };
                out.push_str(&time.format(directive).to_string());
            }
            Segment::Year { width: 2 } => pad(out, time.year().rem_euclid(100), 2),
            Segment::Year { width } => pad(out, time.year(), *width),
            Segment::Offset => out.push_str(&time.format("%z").to_string()),
        }
    }
}

impl fmt::Display for DisplayFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Picks the active format.
///
/// With the 24-hour policy the order is {24h pattern, 12h pattern, built-in
/// 24h default}; otherwise {12h pattern, 24h pattern, built-in 12h default}.
/// A user format compiled under another locale is rebound to `locale`.
pub fn select_format(
    use_24_hour: bool,
    twelve_hour: Option<&DisplayFormat>,
    twenty_four_hour: Option<&DisplayFormat>,
    locale: &DisplayLocale,
) -> DisplayFormat {
    let preferred = if use_24_hour {
        twenty_four_hour.or(twelve_hour)
    } else {
        twelve_hour.or(twenty_four_hour)
    };
    match preferred {
        Some(format) if format.locale() == locale => format.clone(),
        Some(format) => format.with_locale(locale),
        None if use_24_hour => DisplayFormat::default_twenty_four_hour(locale),
        None => DisplayFormat::default_twelve_hour(locale),
    }
}

fn probe_time() -> DateTime<Utc> {
    DateTime::<Utc>::default() + chrono::Duration::seconds(PROBE_SECONDS)
}

fn pad<T: fmt::Display>(out: &mut String, value: T, width: usize) {
    out.push_str(&format!("{value:0width$}"));
}

fn compile(pattern: &str) -> std::result::Result<Vec<Segment>, PatternError> {
    if pattern.is_empty() {
        return Err(PatternError::Empty);
    }

    let chars: Vec<(usize, char)> = pattern.char_indices().collect();
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut i = 0;

    while i < chars.len() {
        let (offset, c) = chars[i];

        if c == '\'' {
            if matches!(chars.get(i + 1), Some((_, '\''))) {
                literal.push('\'');
                i += 2;
                continue;
            }
            let mut j = i + 1;
            let mut closed = false;
            while j < chars.len() {
                let (_, quoted) = chars[j];
                if quoted == '\'' {
                    if matches!(chars.get(j + 1), Some((_, '\''))) {
                        literal.push('\'');
                        j += 2;
                        continue;
                    }
                    closed = true;
                    break;
                }
                literal.push(quoted);
                j += 1;
            }
            if !closed {
                return Err(PatternError::UnterminatedQuote(offset));
            }
            i = j + 1;
            continue;
        }

        if !c.is_ascii_alphabetic() {
            literal.push(c);
            i += 1;
            continue;
        }

        let mut count = 1;
        while matches!(chars.get(i + count), Some(&(_, next)) if next == c) {
            count += 1;
        }
        let segment = field(c, count)?;
        if !literal.is_empty() {
            segments.push(Segment::Literal(std::mem::take(&mut literal)));
        }
        segments.push(segment);
        i += count;
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn field(letter: char, count: usize) -> std::result::Result<Segment, PatternError> {
    let hour = |cycle| Segment::Hour {
        cycle,
        width: count,
    };
    Ok(match letter {
        'h' => hour(HourCycle::OneToTwelve),
        'K' => hour(HourCycle::ZeroToEleven),
        'H' => hour(HourCycle::ZeroToTwentyThree),
        'k' => hour(HourCycle::OneToTwentyFour),
        'm' => Segment::Minute { width: count },
        's' => Segment::Second { width: count },
        'a' => Segment::Halfday,
        'd' => Segment::Day { width: count },
        'M' if count >= 4 => Segment::MonthName { long: true },
        'M' if count == 3 => Segment::MonthName { long: false },
        'M' => Segment::Month { width: count },
        'y' => Segment::Year { width: count },
        'E' => Segment::Weekday { long: count >= 4 },
        'Z' => Segment::Offset,
        other => return Err(PatternError::UnsupportedLetter(other)),
    })
}
