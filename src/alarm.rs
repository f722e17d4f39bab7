use std::fmt;

use chrono::{NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

pub type AlarmId = u64;

pub const MINUTES_PER_DAY: u16 = 1440;

/// A wall-clock time with no date, `0..=1439`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u16", into = "u16")]
pub struct MinuteOfDay(u16);

impl MinuteOfDay {
    pub const MIDNIGHT: Self = Self(0);

    /// Wraps any minute count onto the clock face, negative values included.
    #[must_use]
    pub fn wrapping(raw: i64) -> Self {
        // rem_euclid of 1440 always fits in a u16
        Self(u16::try_from(raw.rem_euclid(i64::from(MINUTES_PER_DAY))).unwrap_or(0))
    }

    #[must_use]
    pub fn from_hm(hour: u32, minute: u32) -> Self {
        Self::wrapping(i64::from(hour) * 60 + i64::from(minute))
    }

    /// Parses `HH:MM` (24 hour) or `h:MM AM/PM`.
    ///
    /// # Errors
    /// [`ValidationError::MalformedTime`] if neither format matches.
    pub fn parse(text: &str) -> Result<Self, ValidationError> {
        let text = text.trim();
        ["%H:%M", "%I:%M %p", "%I:%M%p"]
            .iter()
            .find_map(|format| NaiveTime::parse_from_str(text, format).ok())
            .map(Self::from)
            .ok_or_else(|| ValidationError::MalformedTime(text.to_string()))
    }

    /// Moves forward by `minutes`, wrapping past midnight.
    #[must_use]
    pub fn plus(self, minutes: u32) -> Self {
        Self::wrapping(i64::from(self.0) + i64::from(minutes))
    }

    #[must_use]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[must_use]
    pub const fn hour(self) -> u16 {
        self.0 / 60
    }

    #[must_use]
    pub const fn minute(self) -> u16 {
        self.0 % 60
    }

    #[must_use]
    pub fn to_naive_time(self) -> NaiveTime {
        NaiveTime::from_hms_opt(u32::from(self.hour()), u32::from(self.minute()), 0)
            .unwrap_or(NaiveTime::MIN)
    }
}

impl From<NaiveTime> for MinuteOfDay {
    fn from(time: NaiveTime) -> Self {
        Self::from_hm(time.hour(), time.minute())
    }
}

impl TryFrom<u16> for MinuteOfDay {
    type Error = String;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        if value < MINUTES_PER_DAY {
            Ok(Self(value))
        } else {
            Err(format!("minute of day {value} is out of range"))
        }
    }
}

impl From<MinuteOfDay> for u16 {
    fn from(minute: MinuteOfDay) -> Self {
        minute.0
    }
}

impl fmt::Display for MinuteOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// An absolute minute: which day, and which minute of that day.
///
/// `day` counts days from the common era so it only ever grows across midnight,
/// which is what lets yesterday's 09:00 differ from today's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MinuteKey {
    pub day: i32,
    pub minute: MinuteOfDay,
}

impl From<NaiveDateTime> for MinuteKey {
    fn from(now: NaiveDateTime) -> Self {
        use chrono::Datelike;
        Self {
            day: now.date().num_days_from_ce(),
            minute: MinuteOfDay::from(now.time()),
        }
    }
}

impl fmt::Display for MinuteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "day {} {}", self.day, self.minute)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AlarmState {
    #[default]
    Armed,
    Firing,
    Snoozed,
    Disabled,
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Armed => "armed",
            Self::Firing => "firing",
            Self::Snoozed => "snoozed",
            Self::Disabled => "disabled",
        })
    }
}

/// What a caller hands the engine to create or edit an alarm.
///
/// Defaults (message, sound, snooze) are the caller's job, see
/// [`Config::alarm_spec`](crate::config::Config::alarm_spec).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmSpec {
    pub time: String,
    pub message: String,
    pub sound: String,
    pub repeat_daily: bool,
    pub snooze_minutes: u32,
}

/// The checked form of an [`AlarmSpec`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValidSpec {
    pub(crate) minute: MinuteOfDay,
    pub(crate) message: String,
    pub(crate) sound: String,
    pub(crate) repeat_daily: bool,
    pub(crate) snooze_minutes: u32,
}

impl AlarmSpec {
    pub const MAX_SNOOZE_MINUTES: u32 = MINUTES_PER_DAY as u32 - 1;

    #[must_use]
    pub fn new(time: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            time: time.into(),
            message: message.into(),
            sound: "standard".to_string(),
            repeat_daily: false,
            snooze_minutes: 5,
        }
    }

    #[must_use]
    pub fn sound(mut self, sound: impl Into<String>) -> Self {
        self.sound = sound.into();
        self
    }

    #[must_use]
    pub const fn repeat_daily(mut self, repeat: bool) -> Self {
        self.repeat_daily = repeat;
        self
    }

    #[must_use]
    pub const fn snooze_minutes(mut self, minutes: u32) -> Self {
        self.snooze_minutes = minutes;
        self
    }

    pub(crate) fn validate(self) -> Result<ValidSpec, ValidationError> {
        ValidSpec::new(
            MinuteOfDay::parse(&self.time)?,
            &self.message,
            self.sound,
            self.repeat_daily,
            self.snooze_minutes,
        )
    }
}

impl ValidSpec {
    /// Checks everything but the time, which is already parsed.
    pub(crate) fn new(
        minute: MinuteOfDay,
        message: &str,
        sound: String,
        repeat_daily: bool,
        snooze_minutes: u32,
    ) -> Result<Self, ValidationError> {
        if !(1..=AlarmSpec::MAX_SNOOZE_MINUTES).contains(&snooze_minutes) {
            return Err(ValidationError::SnoozeOutOfRange(snooze_minutes));
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(ValidationError::EmptyMessage);
        }
        Ok(Self {
            minute,
            message: message.to_string(),
            sound,
            repeat_daily,
            snooze_minutes,
        })
    }
}

/// represents an alarm
/// the one record type shared by the store, the state machine and every front end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alarm {
    pub id: AlarmId,
    pub minute: MinuteOfDay,
    pub message: String,
    /// opaque to the engine, only the notifier knows what it sounds like
    pub sound: String,
    pub repeat_daily: bool,
    pub snooze_minutes: u32,
    pub state: AlarmState,
    pub last_fired: Option<MinuteKey>,
}

impl Alarm {
    pub(crate) fn from_spec(id: AlarmId, spec: ValidSpec) -> Self {
        Self {
            id,
            minute: spec.minute,
            message: spec.message,
            sound: spec.sound,
            repeat_daily: spec.repeat_daily,
            snooze_minutes: spec.snooze_minutes,
            state: AlarmState::Armed,
            last_fired: None,
        }
    }

    /// used so that when we edit an alarm we don't lose its id
    /// state is left alone, that belongs to the state machine
    pub(crate) fn replace_with(&mut self, spec: ValidSpec) {
        self.minute = spec.minute;
        self.message = spec.message;
        self.sound = spec.sound;
        self.repeat_daily = spec.repeat_daily;
        self.snooze_minutes = spec.snooze_minutes;
    }

    #[must_use]
    pub fn time(&self) -> NaiveTime {
        self.minute.to_naive_time()
    }

    #[must_use]
    pub fn is_firing(&self) -> bool {
        self.state == AlarmState::Firing
    }
}

impl fmt::Display for Alarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} - {} ({})",
            self.minute,
            self.message,
            if self.repeat_daily { "Daily" } else { "Once" }
        )
    }
}
