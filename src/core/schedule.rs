//! Schedule parsing and due-instant matching.
//!
//! Supports extended 6-field cron (with seconds), standard 5-field cron,
//! shortcuts (@daily, @hourly, etc.), and interval expressions (@every).
//! A compiled [`Schedule`] answers one question per tick: is this instant due?

use chrono::{DateTime, SubsecRound, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when compiling a schedule pattern.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
}

/// A compiled recurrence pattern.
#[derive(Debug, Clone)]
pub struct Schedule {
    /// The original pattern string.
    pattern: String,
    /// Timezone cron fields are evaluated in.
    timezone: Tz,
    /// Parsed schedule kind.
    kind: ScheduleKind,
    /// Reference instant for interval schedules.
    anchor: DateTime<Utc>,
}

#[derive(Debug, Clone)]
enum ScheduleKind {
    /// Cron fields, always normalised to the 6-field form.
    Cron(Box<CronSchedule>),
    /// Fixed interval in whole seconds (e.g., @every 5m).
    Interval(u64),
}

impl Schedule {
    /// Compile a pattern evaluated in UTC.
    ///
    /// Supports:
    /// - Extended 6-field cron: `second minute hour day month weekday`
    /// - Standard 5-field cron: `minute hour day month weekday`
    /// - Shortcuts: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
    /// - Intervals: `@every 5m`, `@every 1h30m`
    pub fn new(pattern: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(pattern, "UTC")
    }

    /// Compile a pattern evaluated in the named IANA timezone.
    pub fn with_timezone(
        pattern: impl Into<String>,
        timezone: &str,
    ) -> Result<Self, ScheduleError> {
        let timezone = parse_timezone(timezone)?;
        Self::compile(pattern.into(), timezone, Utc::now())
    }

    /// Compile with an explicit interval anchor instead of the current time.
    pub fn with_anchor(
        pattern: impl Into<String>,
        timezone: Tz,
        anchor: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        Self::compile(pattern.into(), timezone, anchor)
    }

    fn compile(
        pattern: String,
        timezone: Tz,
        anchor: DateTime<Utc>,
    ) -> Result<Self, ScheduleError> {
        let kind = Self::parse_pattern(&pattern)?;
        Ok(Self {
            pattern,
            timezone,
            kind,
            anchor: anchor.trunc_subsecs(0),
        })
    }

    fn parse_pattern(pattern: &str) -> Result<ScheduleKind, ScheduleError> {
        let trimmed = pattern.trim();
        if trimmed.starts_with('@') {
            return Self::parse_shortcut(trimmed);
        }
        Self::parse_cron(trimmed)
    }

    fn parse_shortcut(pattern: &str) -> Result<ScheduleKind, ScheduleError> {
        match pattern.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 0 * * *"),
            "@hourly" => Self::parse_cron("0 0 * * * *"),
            s if s.starts_with("@every ") => {
                let secs = parse_duration(s["@every ".len()..].trim())?;
                Ok(ScheduleKind::Interval(secs.as_secs()))
            }
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                pattern
            ))),
        }
    }

    fn parse_cron(pattern: &str) -> Result<ScheduleKind, ScheduleError> {
        let fields: Vec<&str> = pattern.split_whitespace().collect();

        let expr = match fields.len() {
            6 => pattern.to_string(),
            // Standard 5-field cron fires on second zero
            5 => format!("0 {}", pattern),
            n => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    n
                )));
            }
        };

        let schedule =
            CronSchedule::from_str(&expr).map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;
        Ok(ScheduleKind::Cron(Box::new(schedule)))
    }

    /// Whether the schedule is due at `at`.
    ///
    /// Resolution is one second: sub-second parts of `at` are ignored.
    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        let at = at.trunc_subsecs(0);
        match &self.kind {
            ScheduleKind::Cron(schedule) => schedule.includes(at.with_timezone(&self.timezone)),
            ScheduleKind::Interval(secs) => {
                let elapsed = (at - self.anchor).num_seconds();
                elapsed > 0 && elapsed as u64 % secs == 0
            }
        }
    }

    /// Next due instant strictly after `after`, if any.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match &self.kind {
            ScheduleKind::Cron(schedule) => schedule
                .after(&after.with_timezone(&self.timezone))
                .next()
                .map(|dt| dt.with_timezone(&Utc)),
            ScheduleKind::Interval(secs) => {
                // Intervals beyond chrono's range have no next instant
                let secs = i64::try_from(*secs).ok()?;
                let elapsed = (after.trunc_subsecs(0) - self.anchor).num_seconds();
                let periods = if elapsed < 0 { 0 } else { elapsed / secs };
                let offset = periods.checked_add(1)?.checked_mul(secs)?;
                let delta = chrono::TimeDelta::try_seconds(offset)?;
                self.anchor.checked_add_signed(delta)
            }
        }
    }

    /// The original pattern string.
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// The timezone cron fields are evaluated in.
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Interval length for `@every` schedules.
    pub fn interval(&self) -> Option<Duration> {
        match self.kind {
            ScheduleKind::Interval(secs) => Some(Duration::from_secs(secs)),
            ScheduleKind::Cron(_) => None,
        }
    }
}

impl FromStr for Schedule {
    type Err = ScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Schedule::new(s)
    }
}

/// Parse an IANA timezone name.
pub fn parse_timezone(name: &str) -> Result<Tz, ScheduleError> {
    name.parse::<Tz>()
        .map_err(|_| ScheduleError::InvalidTimezone(name.to_string()))
}

/// Parse a duration string like "5m", "1h", "1h30m", "30s", "1d".
fn parse_duration(s: &str) -> Result<Duration, ScheduleError> {
    let mut total_secs: u64 = 0;
    let mut current_num = String::new();

    for c in s.chars() {
        if c.is_ascii_digit() {
            current_num.push(c);
            continue;
        }
        let num: u64 = current_num
            .parse()
            .map_err(|_| ScheduleError::InvalidInterval(s.to_string()))?;
        current_num.clear();

        let unit = match c {
            's' => 1,
            'm' => 60,
            'h' => 3600,
            'd' => 86400,
            _ => return Err(ScheduleError::InvalidInterval(s.to_string())),
        };
        total_secs = num
            .checked_mul(unit)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| ScheduleError::InvalidInterval(s.to_string()))?;
    }

    // Trailing digits without a unit
    if !current_num.is_empty() || total_secs == 0 {
        return Err(ScheduleError::InvalidInterval(s.to_string()));
    }

    Ok(Duration::from_secs(total_secs))
}
