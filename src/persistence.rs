//! Saving and loading alarms.
//!
//! The engine only sees [`PersistenceGateway`]. Saves run on their own thread
//! ([`SaveWorker`]) so a slow disk never holds up a tick or a user action.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use chrono::NaiveTime;
use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::{
    alarm::{Alarm, AlarmId, AlarmState, MinuteKey, MinuteOfDay, ValidSpec},
    config::always_true,
    error::{AlarmError, PersistenceError, ValidationError},
    store::AlarmStore,
};

/// Durable storage for the alarm list.
pub trait PersistenceGateway: Send + Sync {
    /// Everything saved so far; called once when the engine is built.
    ///
    /// # Errors
    /// If the storage exists but can't be read.
    fn load_all(&self) -> Result<Vec<Alarm>, PersistenceError>;

    /// Replaces whatever was saved with `alarms`.
    ///
    /// # Errors
    /// If the storage can't be written.
    fn save_all(&self, alarms: &[Alarm]) -> Result<(), PersistenceError>;
}

/// Keeps the last save in memory.
#[derive(Debug, Default)]
pub struct MemoryGateway {
    saved: Mutex<(Vec<Alarm>, usize)>,
}

impl MemoryGateway {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts out as if `alarms` had been saved before.
    #[must_use]
    pub fn with_alarms(alarms: Vec<Alarm>) -> Self {
        Self {
            saved: Mutex::new((alarms, 0)),
        }
    }

    #[must_use]
    pub fn saved(&self) -> Vec<Alarm> {
        self.saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .0
            .clone()
    }

    #[must_use]
    pub fn save_count(&self) -> usize {
        self.saved.lock().unwrap_or_else(PoisonError::into_inner).1
    }
}

impl PersistenceGateway for MemoryGateway {
    fn load_all(&self) -> Result<Vec<Alarm>, PersistenceError> {
        Ok(self.saved())
    }

    fn save_all(&self, alarms: &[Alarm]) -> Result<(), PersistenceError> {
        let mut saved = self.saved.lock().unwrap_or_else(PoisonError::into_inner);
        saved.0 = alarms.to_vec();
        saved.1 += 1;
        Ok(())
    }
}

pub const FILE_VERSION: u32 = 1;

/// On-disk layout of the alarm file. Kept apart from [`Alarm`] so the two can
/// change independently.
#[derive(Debug, Serialize, Deserialize)]
struct AlarmFile {
    version: u32,
    #[serde(default)]
    alarms: Vec<StoredAlarm>,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredAlarm {
    id: AlarmId,
    #[serde(with = "toml_datetime_compat")]
    time: NaiveTime,
    message: String,
    sound: String,
    #[serde(default)]
    repeat_daily: bool,
    snooze_minutes: u32,
    #[serde(default = "always_true")]
    enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_fired: Option<MinuteKey>,
}

impl From<&Alarm> for StoredAlarm {
    fn from(alarm: &Alarm) -> Self {
        Self {
            id: alarm.id,
            time: alarm.time(),
            message: alarm.message.clone(),
            sound: alarm.sound.clone(),
            repeat_daily: alarm.repeat_daily,
            snooze_minutes: alarm.snooze_minutes,
            enabled: alarm.state != AlarmState::Disabled,
            last_fired: alarm.last_fired,
        }
    }
}

impl TryFrom<StoredAlarm> for Alarm {
    type Error = ValidationError;

    /// ringing isn't saved, a loaded alarm is either armed or disabled
    fn try_from(stored: StoredAlarm) -> Result<Self, Self::Error> {
        let spec = ValidSpec::new(
            MinuteOfDay::from(stored.time),
            &stored.message,
            stored.sound,
            stored.repeat_daily,
            stored.snooze_minutes,
        )?;
        let mut alarm = Self::from_spec(stored.id, spec);
        if !stored.enabled {
            alarm.state = AlarmState::Disabled;
        }
        alarm.last_fired = stored.last_fired;
        Ok(alarm)
    }
}

/// Alarms in a versioned TOML file.
#[derive(Debug, Clone)]
pub struct TomlFileStore {
    path: PathBuf,
}

impl TomlFileStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> PersistenceError {
        PersistenceError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl PersistenceGateway for TomlFileStore {
    fn load_all(&self) -> Result<Vec<Alarm>, PersistenceError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };
        let file: AlarmFile = toml::from_str(&text).map_err(|source| PersistenceError::Parse {
            path: self.path.clone(),
            source,
        })?;
        if file.version != FILE_VERSION {
            return Err(PersistenceError::UnsupportedVersion(file.version));
        }
        // a hand-edited file can hold records the engine would never have
        // accepted; those are dropped, the rest still load
        let mut seen = HashSet::new();
        let mut alarms = Vec::with_capacity(file.alarms.len());
        for stored in file.alarms {
            let id = stored.id;
            if !seen.insert(id) {
                log::warn!("skipping duplicate alarm {id} in {}", self.path.display());
                continue;
            }
            match Alarm::try_from(stored) {
                Ok(alarm) => alarms.push(alarm),
                Err(e) => log::warn!("skipping alarm {id} in {}: {e}", self.path.display()),
            }
        }
        Ok(alarms)
    }

    fn save_all(&self, alarms: &[Alarm]) -> Result<(), PersistenceError> {
        let file = AlarmFile {
            version: FILE_VERSION,
            alarms: alarms.iter().map(StoredAlarm::from).collect(),
        };
        let text = toml::to_string(&file)?;
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| self.io_error(e))?;
        }
        // write next to the real file then rename, so a crash never leaves half a file
        let tmp = self.path.with_extension("toml.tmp");
        fs::write(&tmp, text).map_err(|e| self.io_error(e))?;
        fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))
    }
}

enum SaveRequest {
    Save,
    Flush(Sender<()>),
    Shutdown,
}

/// Background thread that writes the store through a gateway.
///
/// Requests carry no data: the worker snapshots the store itself when it gets
/// to them, so an older copy can never land on disk after a newer one. A burst
/// of requests turns into a single save.
pub(crate) struct SaveWorker {
    requests: Sender<SaveRequest>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SaveWorker {
    pub(crate) fn spawn(
        store: Arc<AlarmStore>,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> Result<Self, AlarmError> {
        let (requests, incoming) = crossbeam_channel::unbounded();
        let handle = thread::Builder::new()
            .name("alarm-saver".to_string())
            .spawn(move || save_loop(&store, gateway.as_ref(), &incoming))
            .map_err(|source| AlarmError::Spawn {
                name: "save",
                source,
            })?;
        Ok(Self {
            requests,
            handle: Mutex::new(Some(handle)),
        })
    }

    /// Schedules a save of the store as it will be when the worker runs.
    pub(crate) fn request_save(&self) {
        if self.requests.send(SaveRequest::Save).is_err() {
            log::warn!("save worker has stopped, change not persisted");
        }
    }

    /// Blocks until every save requested before this call has been attempted.
    pub(crate) fn flush(&self) {
        let (ack, done) = crossbeam_channel::bounded(1);
        if self.requests.send(SaveRequest::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    /// Performs any outstanding save, then stops the thread. Idempotent.
    pub(crate) fn shutdown(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            let _ = self.requests.send(SaveRequest::Shutdown);
            if handle.join().is_err() {
                log::error!("save worker panicked");
            }
        }
    }
}

fn save_loop(
    store: &AlarmStore,
    gateway: &dyn PersistenceGateway,
    incoming: &Receiver<SaveRequest>,
) {
    while let Ok(first) = incoming.recv() {
        let mut dirty = false;
        let mut acks = Vec::new();
        let mut shutdown = false;
        for request in std::iter::once(first).chain(incoming.try_iter()) {
            match request {
                SaveRequest::Save => dirty = true,
                SaveRequest::Flush(ack) => acks.push(ack),
                SaveRequest::Shutdown => shutdown = true,
            }
        }
        if dirty {
            let alarms = store.snapshot();
            match gateway.save_all(&alarms) {
                Ok(()) => log::debug!("saved {} alarms", alarms.len()),
                Err(e) => log::warn!("couldn't save alarms, keeping them in memory: {e}"),
            }
        }
        for ack in acks {
            let _ = ack.send(());
        }
        if shutdown {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::AlarmSpec;

    fn alarm(id: AlarmId, time: &str) -> Alarm {
        Alarm::from_spec(id, AlarmSpec::new(time, "test").validate().unwrap())
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("alarms.toml"));
        assert!(store.load_all().unwrap().is_empty());
    }

    #[test]
    fn file_store_keeps_what_matters() {
        let dir = tempfile::tempdir().unwrap();
        let store = TomlFileStore::new(dir.path().join("nested").join("alarms.toml"));

        let mut daily = alarm(1, "06:30");
        daily.repeat_daily = true;
        daily.last_fired = Some(MinuteKey {
            day: 738_000,
            minute: daily.minute,
        });
        let mut off = alarm(2, "23:59");
        off.state = AlarmState::Disabled;
        let mut ringing = alarm(5, "12:00");
        ringing.state = AlarmState::Firing;

        store
            .save_all(&[daily.clone(), off.clone(), ringing.clone()])
            .unwrap();
        let loaded = store.load_all().unwrap();

        ringing.state = AlarmState::Armed;
        assert_eq!(loaded, vec![daily, off, ringing]);
    }

    #[test]
    fn skips_records_that_would_fail_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.toml");
        let record = |id, time, message, snooze| {
            format!(
                "[[alarms]]\nid = {id}\ntime = {time}\nmessage = \"{message}\"\n\
                 sound = \"standard\"\nsnooze_minutes = {snooze}\n\n"
            )
        };
        let text = [
            "version = 1\n\n".to_string(),
            record(1, "09:00:00", "fine", 5),
            record(2, "10:00:00", "never snoozes", 0),
            record(3, "11:00:00", "snoozes for days", 5000),
            record(4, "12:00:00", "   ", 5),
            record(1, "13:00:00", "same id again", 5),
            record(6, "14:00:00", "also fine", 1439),
        ]
        .concat();
        fs::write(&path, text).unwrap();

        let loaded = TomlFileStore::new(&path).load_all().unwrap();
        let ids: Vec<_> = loaded.iter().map(|alarm| alarm.id).collect();
        assert_eq!(ids, vec![1, 6]);
        assert_eq!(loaded[0].message, "fine");
        assert_eq!(loaded[0].minute.to_string(), "09:00");
    }

    #[test]
    fn rejects_other_versions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.toml");
        fs::write(&path, "version = 9\n").unwrap();
        assert!(matches!(
            TomlFileStore::new(&path).load_all(),
            Err(PersistenceError::UnsupportedVersion(9))
        ));
    }

    #[test]
    fn rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarms.toml");
        fs::write(&path, "this is not toml [").unwrap();
        assert!(matches!(
            TomlFileStore::new(&path).load_all(),
            Err(PersistenceError::Parse { .. })
        ));
    }

    #[test]
    fn worker_saves_latest_state_on_flush() {
        let store = Arc::new(AlarmStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let worker = SaveWorker::spawn(Arc::clone(&store), gateway.clone()).unwrap();

        store.insert(alarm(1, "09:00"));
        worker.request_save();
        store.insert(alarm(2, "10:00"));
        worker.request_save();
        worker.flush();

        assert_eq!(gateway.saved().len(), 2);
        assert!(gateway.save_count() >= 1);
        worker.shutdown();
        worker.shutdown();
    }

    #[test]
    fn shutdown_performs_pending_save() {
        let store = Arc::new(AlarmStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let worker = SaveWorker::spawn(Arc::clone(&store), gateway.clone()).unwrap();
        store.insert(alarm(1, "09:00"));
        worker.request_save();
        worker.shutdown();
        assert_eq!(gateway.saved().len(), 1);
    }
}
