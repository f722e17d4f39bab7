//! Per-alarm state transitions.
//!
//! ```text
//!            Fire(key)              Snooze
//!  Armed ───────────────► Firing ──────────► Snoozed ──► Armed (+snooze minutes)
//!   ▲  │                    │  │
//!   │  │ Disable            │  │ Dismiss
//!   │  ▼                    │  ├─ repeat_daily ──► Armed (same minute)
//!  Disabled ◄───────────────┘  └─ one shot ─────► deleted
//!      │        Disable
//!      └── Enable ──► Armed
//!
//!  any state ── Rearm (edit) ──► Armed, last ring forgotten
//! ```
//!
//! Every function here checks before it writes, so a rejected event leaves the
//! alarm exactly as it was.

use std::fmt;

use crate::{
    alarm::{Alarm, AlarmState, MinuteKey, MinuteOfDay},
    error::AlarmError,
    trigger,
};

/// Something that happened to an alarm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The evaluator matched the alarm at this minute.
    Fire(MinuteKey),
    Snooze,
    Dismiss,
    Disable,
    Enable,
    /// The alarm was edited; start over as if newly added.
    Rearm,
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fire(_) => "fire",
            Self::Snooze => "snooze",
            Self::Dismiss => "dismiss",
            Self::Disable => "disable",
            Self::Enable => "enable",
            Self::Rearm => "re-arm",
        })
    }
}

/// Whether the record survives the transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Retain,
    Delete,
}

/// `(minute + snooze) mod 1440`
#[must_use]
pub fn snooze_minute(minute: MinuteOfDay, snooze_minutes: u32) -> MinuteOfDay {
    minute.plus(snooze_minutes)
}

/// Applies `event` to `alarm`.
///
/// # Errors
/// [`AlarmError::InvalidState`] when `event` isn't legal from the alarm's state;
/// the alarm is left untouched.
pub fn transition(alarm: &mut Alarm, event: Event) -> Result<Disposition, AlarmError> {
    match (alarm.state, event) {
        (AlarmState::Armed, Event::Fire(key)) if trigger::should_fire(alarm, key) => {
            alarm.state = AlarmState::Firing;
            alarm.last_fired = Some(key);
            Ok(Disposition::Retain)
        }
        (AlarmState::Firing, Event::Snooze) => {
            alarm.state = AlarmState::Snoozed;
            alarm.minute = snooze_minute(alarm.minute, alarm.snooze_minutes);
            log::debug!("alarm {} snoozed until {}", alarm.id, alarm.minute);
            alarm.state = AlarmState::Armed;
            Ok(Disposition::Retain)
        }
        (AlarmState::Firing, Event::Dismiss) if alarm.repeat_daily => {
            // last_fired still holds today's key, so it won't ring again until tomorrow
            alarm.state = AlarmState::Armed;
            Ok(Disposition::Retain)
        }
        (AlarmState::Firing, Event::Dismiss) => Ok(Disposition::Delete),
        (AlarmState::Armed | AlarmState::Firing, Event::Disable) => {
            alarm.state = AlarmState::Disabled;
            Ok(Disposition::Retain)
        }
        (AlarmState::Disabled, Event::Enable) => {
            alarm.state = AlarmState::Armed;
            Ok(Disposition::Retain)
        }
        (_, Event::Rearm) => {
            // forget the last ring so an edit to the current minute still goes off
            alarm.state = AlarmState::Armed;
            alarm.last_fired = None;
            Ok(Disposition::Retain)
        }
        (state, event) => Err(AlarmError::InvalidState {
            id: alarm.id,
            event,
            state,
        }),
    }
}
