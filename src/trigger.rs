//! Deciding which alarms ring this minute.

use crate::alarm::{Alarm, AlarmId, AlarmState, MinuteKey};

/// Whether `alarm` is due at `now` and hasn't already rung for it.
#[must_use]
pub fn should_fire(alarm: &Alarm, now: MinuteKey) -> bool {
    alarm.state == AlarmState::Armed && alarm.minute == now.minute && alarm.last_fired != Some(now)
}

/// Ids of the alarms in `snapshot` that must fire at `now`, in snapshot order.
///
/// Pure: nothing is mutated, the caller applies the transitions.
#[must_use]
pub fn evaluate(snapshot: &[Alarm], now: MinuteKey) -> Vec<AlarmId> {
    snapshot
        .iter()
        .filter(|alarm| should_fire(alarm, now))
        .map(|alarm| alarm.id)
        .collect()
}
