//! The authoritative, thread-safe set of alarms.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard,
};

use indexmap::IndexMap;

use crate::{
    alarm::{Alarm, AlarmId, ValidSpec},
    error::AlarmError,
    machine::Disposition,
};

/// What [`AlarmStore::apply`] committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// The alarm as it is now stored.
    Updated(Alarm),
    /// The alarm as it was when it got removed.
    Removed(Alarm),
}

impl Applied {
    #[must_use]
    pub const fn alarm(&self) -> &Alarm {
        match self {
            Self::Updated(alarm) | Self::Removed(alarm) => alarm,
        }
    }
}

/// Alarms keyed by id, kept in insertion order.
///
/// Every method takes the lock for the duration of one map operation (or one
/// clone of the map for [`snapshot`](Self::snapshot)), so a reader never waits on
/// anything slower than that.
#[derive(Debug)]
pub struct AlarmStore {
    alarms: RwLock<IndexMap<AlarmId, Alarm>>,
    next_id: AtomicU64,
}

impl Default for AlarmStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AlarmStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            alarms: RwLock::new(IndexMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// A store seeded with previously saved alarms.
    ///
    /// Ids handed out afterwards start above the largest one loaded.
    #[must_use]
    pub fn with_alarms(alarms: impl IntoIterator<Item = Alarm>) -> Self {
        let store = Self::new();
        for alarm in alarms {
            store.insert(alarm);
        }
        store
    }

    fn read(&self) -> RwLockReadGuard<'_, IndexMap<AlarmId, Alarm>> {
        self.alarms.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, IndexMap<AlarmId, Alarm>> {
        self.alarms.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn add(&self, spec: ValidSpec) -> AlarmId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.write().insert(id, Alarm::from_spec(id, spec));
        id
    }

    /// Puts an existing alarm back, replacing any alarm with the same id.
    pub fn insert(&self, alarm: Alarm) {
        self.next_id.fetch_max(alarm.id.saturating_add(1), Ordering::Relaxed);
        self.write().insert(alarm.id, alarm);
    }

    /// # Errors
    /// [`AlarmError::NotFound`] if there is no such alarm.
    pub fn remove(&self, id: AlarmId) -> Result<Alarm, AlarmError> {
        self.write()
            .shift_remove(&id)
            .ok_or(AlarmError::NotFound(id))
    }

    #[must_use]
    pub fn get(&self, id: AlarmId) -> Option<Alarm> {
        self.read().get(&id).cloned()
    }

    /// A point-in-time copy of every alarm, in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Alarm> {
        self.read().values().cloned().collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Atomically runs `mutate` against alarm `id`.
    ///
    /// `mutate` works on a copy; the copy is only written back (or the alarm
    /// removed, for [`Disposition::Delete`]) if it returns `Ok`.
    ///
    /// # Errors
    /// [`AlarmError::NotFound`] if there is no such alarm, otherwise whatever
    /// `mutate` returned.
    pub fn apply<F>(&self, id: AlarmId, mutate: F) -> Result<Applied, AlarmError>
    where
        F: FnOnce(&mut Alarm) -> Result<Disposition, AlarmError>,
    {
        let mut alarms = self.write();
        let current = alarms.get_mut(&id).ok_or(AlarmError::NotFound(id))?;
        let mut draft = current.clone();
        match mutate(&mut draft)? {
            Disposition::Retain => {
                *current = draft.clone();
                Ok(Applied::Updated(draft))
            }
            Disposition::Delete => {
                let removed = alarms.shift_remove(&id).unwrap_or(draft);
                Ok(Applied::Removed(removed))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, thread};

    use super::*;
    use crate::alarm::{AlarmSpec, AlarmState};

    fn spec(time: &str) -> ValidSpec {
        AlarmSpec::new(time, "test").validate().unwrap()
    }

    #[test]
    fn ids_are_unique_and_order_is_kept() {
        let store = AlarmStore::new();
        let a = store.add(spec("09:00"));
        let b = store.add(spec("08:00"));
        let c = store.add(spec("07:00"));
        store.remove(b).unwrap();
        let d = store.add(spec("06:00"));
        assert_ne!(d, b);
        let ids: Vec<_> = store.snapshot().iter().map(|alarm| alarm.id).collect();
        assert_eq!(ids, vec![a, c, d]);
    }

    #[test]
    fn seeded_store_continues_after_largest_id() {
        let mut loaded = Alarm::from_spec(41, spec("09:00"));
        loaded.state = AlarmState::Disabled;
        let store = AlarmStore::with_alarms([loaded.clone()]);
        assert_eq!(store.get(41), Some(loaded));
        assert_eq!(store.add(spec("10:00")), 42);
    }

    #[test]
    fn remove_missing_is_not_found() {
        let store = AlarmStore::new();
        assert!(matches!(store.remove(3), Err(AlarmError::NotFound(3))));
        assert!(matches!(
            store.apply(3, |_| Ok(Disposition::Retain)),
            Err(AlarmError::NotFound(3))
        ));
    }

    #[test]
    fn failed_apply_commits_nothing() {
        let store = AlarmStore::new();
        let id = store.add(spec("09:00"));
        let result = store.apply(id, |alarm| {
            alarm.message = "changed".to_string();
            Err(AlarmError::NotFound(id))
        });
        assert!(result.is_err());
        assert_eq!(store.get(id).unwrap().message, "test");
    }

    #[test]
    fn apply_can_update_or_delete() {
        let store = AlarmStore::new();
        let id = store.add(spec("09:00"));
        let applied = store
            .apply(id, |alarm| {
                alarm.message = "changed".to_string();
                Ok(Disposition::Retain)
            })
            .unwrap();
        assert_eq!(applied.alarm().message, "changed");
        assert_eq!(store.get(id).unwrap().message, "changed");

        let applied = store.apply(id, |_| Ok(Disposition::Delete)).unwrap();
        assert!(matches!(applied, Applied::Removed(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_adds_are_never_lost() {
        let store = Arc::new(AlarmStore::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..50 {
                        store.add(spec("09:00"));
                        let _ = store.snapshot();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 400);
    }
}
