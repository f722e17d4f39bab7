//! The alarm engine: wires the clock, ticker, evaluator, state machine, store,
//! notifier and persistence together and exposes the operations a front end uses.
//!
//! ```text
//! Ticker ─► snapshot ─► trigger::evaluate ─► machine Fire ─► Notifier::notify
//!                                                  │
//! front end ─► add / snooze / dismiss / ... ───────┴──► SaveWorker ─► PersistenceGateway
//! ```

use std::{sync::Arc, time::Duration};

use crate::{
    alarm::{Alarm, AlarmId, AlarmSpec, MinuteKey},
    clock::{ClockSource, SystemClock},
    communication::{LogNotifier, Notifier},
    error::AlarmError,
    machine::{self, Event},
    persistence::{MemoryGateway, PersistenceGateway, SaveWorker},
    store::{AlarmStore, Applied},
    ticker::Ticker,
    trigger,
};

/// State shared between the ticker thread and callers.
struct Shared {
    store: Arc<AlarmStore>,
    clock: Arc<dyn ClockSource>,
    notifier: Arc<dyn Notifier>,
    saver: SaveWorker,
}

impl Shared {
    fn tick(&self) -> Vec<AlarmId> {
        let key = MinuteKey::from(self.clock.now());
        let due = trigger::evaluate(&self.store.snapshot(), key);
        let mut fired = Vec::with_capacity(due.len());
        for id in due {
            match self.store.apply(id, |alarm| machine::transition(alarm, Event::Fire(key))) {
                Ok(applied) => fired.push(applied.alarm().clone()),
                // removed or changed by the user since the snapshot
                Err(e) => log::debug!("skipping alarm {id}: {e}"),
            }
        }
        if fired.is_empty() {
            return Vec::new();
        }
        for alarm in &fired {
            log::info!("alarm {} fired at {key}: {}", alarm.id, alarm.message);
            if let Err(e) = self.notifier.notify(alarm) {
                log::warn!("couldn't notify alarm {}: {e}", alarm.id);
            }
            // the user may have answered between the commit and notify, in which
            // case their silence went out first and has to be repeated
            let still_ringing = self
                .store
                .get(alarm.id)
                .is_some_and(|now| now.is_firing() && now.last_fired == Some(key));
            if !still_ringing {
                self.silence(alarm.id);
            }
        }
        self.saver.request_save();
        fired.into_iter().map(|alarm| alarm.id).collect()
    }

    fn silence(&self, id: AlarmId) {
        if let Err(e) = self.notifier.silence(id) {
            log::warn!("couldn't silence alarm {id}: {e}");
        }
    }

    /// Runs `event` against alarm `id`, silencing it if it was ringing.
    fn handle(&self, id: AlarmId, event: Event) -> Result<Applied, AlarmError> {
        let mut was_firing = false;
        let applied = self.store.apply(id, |alarm| {
            was_firing = alarm.is_firing();
            machine::transition(alarm, event)
        })?;
        log::debug!("alarm {id}: {event} -> {}", applied.alarm().state);
        if was_firing {
            self.silence(id);
        }
        self.saver.request_save();
        Ok(applied)
    }
}

/// Builds an [`Engine`]. Every part has a default.
#[must_use]
pub struct EngineBuilder {
    clock: Arc<dyn ClockSource>,
    notifier: Arc<dyn Notifier>,
    persistence: Arc<dyn PersistenceGateway>,
    tick_interval: Duration,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            clock: Arc::new(SystemClock),
            notifier: Arc::new(LogNotifier),
            persistence: Arc::new(MemoryGateway::new()),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl EngineBuilder {
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = clock;
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn persistence(mut self, persistence: Arc<dyn PersistenceGateway>) -> Self {
        self.persistence = persistence;
        self
    }

    pub const fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Loads saved alarms and starts the save thread. The ticker isn't started,
    /// see [`Engine::start`].
    ///
    /// A failed load is logged and the engine starts with no alarms.
    ///
    /// # Errors
    /// [`AlarmError::Spawn`] if the save thread can't be created.
    pub fn build(self) -> Result<Engine, AlarmError> {
        let alarms = self.persistence.load_all().unwrap_or_else(|e| {
            log::warn!("couldn't load saved alarms, starting empty: {e}");
            Vec::new()
        });
        log::info!("loaded {} alarms", alarms.len());
        let store = Arc::new(AlarmStore::with_alarms(alarms));
        let saver = SaveWorker::spawn(Arc::clone(&store), self.persistence)?;
        Ok(Engine {
            shared: Arc::new(Shared {
                store,
                clock: self.clock,
                notifier: self.notifier,
                saver,
            }),
            ticker: Ticker::new(self.tick_interval),
        })
    }
}

/// The alarm scheduling and triggering engine.
///
/// All methods take `&self` and may be called from any thread while the ticker
/// runs.
pub struct Engine {
    shared: Arc<Shared>,
    ticker: Ticker,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("alarms", &self.shared.store.len())
            .field("ticker", &self.ticker)
            .finish_non_exhaustive()
    }
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// # Errors
    /// [`AlarmError::Validation`] if `spec` is rejected; nothing is added.
    pub fn add_alarm(&self, spec: AlarmSpec) -> Result<AlarmId, AlarmError> {
        let id = self.shared.store.add(spec.validate()?);
        log::info!("added alarm {id}");
        self.shared.saver.request_save();
        Ok(id)
    }

    /// Replaces an alarm's settings, keeping its id. The alarm is re-armed
    /// (and silenced if it was ringing).
    ///
    /// # Errors
    /// [`AlarmError::Validation`] or [`AlarmError::NotFound`].
    pub fn update_alarm(&self, id: AlarmId, spec: AlarmSpec) -> Result<(), AlarmError> {
        let spec = spec.validate()?;
        let mut was_firing = false;
        self.shared.store.apply(id, |alarm| {
            was_firing = alarm.is_firing();
            alarm.replace_with(spec);
            machine::transition(alarm, Event::Rearm)
        })?;
        log::info!("updated alarm {id}");
        if was_firing {
            self.shared.silence(id);
        }
        self.shared.saver.request_save();
        Ok(())
    }

    /// # Errors
    /// [`AlarmError::NotFound`] if there is no such alarm.
    pub fn remove_alarm(&self, id: AlarmId) -> Result<(), AlarmError> {
        let removed = self.shared.store.remove(id)?;
        log::info!("removed alarm {id}");
        if removed.is_firing() {
            self.shared.silence(id);
        }
        self.shared.saver.request_save();
        Ok(())
    }

    /// Pushes a ringing alarm forward by its snooze minutes.
    ///
    /// # Errors
    /// [`AlarmError::InvalidState`] unless the alarm is firing,
    /// [`AlarmError::NotFound`] if it doesn't exist.
    pub fn snooze_firing(&self, id: AlarmId) -> Result<(), AlarmError> {
        let applied = self.shared.handle(id, Event::Snooze)?;
        log::info!("alarm {id} snoozed until {}", applied.alarm().minute);
        Ok(())
    }

    /// Stops a ringing alarm: daily alarms re-arm, one-shot alarms are deleted.
    ///
    /// # Errors
    /// [`AlarmError::InvalidState`] unless the alarm is firing,
    /// [`AlarmError::NotFound`] if it doesn't exist.
    pub fn dismiss_firing(&self, id: AlarmId) -> Result<(), AlarmError> {
        match self.shared.handle(id, Event::Dismiss)? {
            Applied::Removed(_) => log::info!("alarm {id} dismissed and removed"),
            Applied::Updated(_) => log::info!("alarm {id} dismissed, armed for tomorrow"),
        }
        Ok(())
    }

    /// # Errors
    /// [`AlarmError::InvalidState`] if already disabled,
    /// [`AlarmError::NotFound`] if it doesn't exist.
    pub fn disable_alarm(&self, id: AlarmId) -> Result<(), AlarmError> {
        self.shared.handle(id, Event::Disable).map(drop)
    }

    /// # Errors
    /// [`AlarmError::InvalidState`] unless disabled,
    /// [`AlarmError::NotFound`] if it doesn't exist.
    pub fn enable_alarm(&self, id: AlarmId) -> Result<(), AlarmError> {
        self.shared.handle(id, Event::Enable).map(drop)
    }

    /// Dismisses every ringing alarm. Returns the ids that were dismissed.
    ///
    /// An alarm answered by someone else in the meantime is skipped.
    pub fn dismiss_all(&self) -> Vec<AlarmId> {
        self.firing_alarms()
            .into_iter()
            .filter_map(|alarm| match self.dismiss_firing(alarm.id) {
                Ok(()) => Some(alarm.id),
                Err(e) => {
                    log::debug!("not dismissing alarm {}: {e}", alarm.id);
                    None
                }
            })
            .collect()
    }

    #[must_use]
    pub fn list_alarms(&self) -> Vec<Alarm> {
        self.shared.store.snapshot()
    }

    #[must_use]
    pub fn get_alarm(&self, id: AlarmId) -> Option<Alarm> {
        self.shared.store.get(id)
    }

    /// Alarms currently waiting on the user.
    #[must_use]
    pub fn firing_alarms(&self) -> Vec<Alarm> {
        self.list_alarms()
            .into_iter()
            .filter(Alarm::is_firing)
            .collect()
    }

    /// One evaluation cycle against the clock. Returns the ids that fired.
    ///
    /// This is what the ticker runs; calling it directly is how a front end or a
    /// test drives the engine without the background thread.
    pub fn tick(&self) -> Vec<AlarmId> {
        self.shared.tick()
    }

    /// Starts evaluating in the background. Starting twice is a no-op.
    ///
    /// # Errors
    /// [`AlarmError::Spawn`] if the ticker thread can't be created.
    pub fn start(&self) -> Result<(), AlarmError> {
        let shared = Arc::clone(&self.shared);
        self.ticker.start(move || {
            shared.tick();
        })?;
        log::info!("engine started, ticking every {:?}", self.ticker.interval());
        Ok(())
    }

    /// Stops the ticker; once this returns no tick is running or will run.
    /// Idempotent.
    pub fn stop(&self) {
        if self.ticker.is_running() {
            self.ticker.stop();
            log::info!("engine stopped");
        }
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.ticker.is_running()
    }

    /// Waits until every change made so far has been handed to the gateway.
    pub fn flush(&self) {
        self.shared.saver.flush();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
        self.shared.saver.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::{
        alarm::AlarmState,
        clock::ManualClock,
        error::{NotifierError, PersistenceError},
    };

    #[derive(Default)]
    struct Recorder {
        notified: Mutex<Vec<AlarmId>>,
        silenced: Mutex<Vec<AlarmId>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError> {
            self.notified.lock().unwrap().push(alarm.id);
            Ok(())
        }

        fn silence(&self, id: AlarmId) -> Result<(), NotifierError> {
            self.silenced.lock().unwrap().push(id);
            Ok(())
        }
    }

    struct Broken;

    impl Notifier for Broken {
        fn notify(&self, _alarm: &Alarm) -> Result<(), NotifierError> {
            Err(NotifierError::Unavailable("no sound card".to_string()))
        }
    }

    /// Blocks inside `notify` until the test lets it go.
    struct Gated {
        log: Mutex<Vec<String>>,
        entered: crossbeam_channel::Sender<()>,
        release: crossbeam_channel::Receiver<()>,
    }

    impl Notifier for Gated {
        fn notify(&self, alarm: &Alarm) -> Result<(), NotifierError> {
            let _ = self.entered.send(());
            let _ = self.release.recv();
            self.log.lock().unwrap().push(format!("notify {}", alarm.id));
            Ok(())
        }

        fn silence(&self, id: AlarmId) -> Result<(), NotifierError> {
            self.log.lock().unwrap().push(format!("silence {id}"));
            Ok(())
        }
    }

    struct Unwritable;

    impl PersistenceGateway for Unwritable {
        fn load_all(&self) -> Result<Vec<Alarm>, PersistenceError> {
            Err(PersistenceError::UnsupportedVersion(0))
        }

        fn save_all(&self, _alarms: &[Alarm]) -> Result<(), PersistenceError> {
            Err(PersistenceError::Io {
                path: "/nowhere/alarms.toml".into(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read only"),
            })
        }
    }

    fn engine(clock: &Arc<ManualClock>, notifier: Arc<dyn Notifier>) -> Engine {
        Engine::builder()
            .clock(clock.clone())
            .notifier(notifier)
            .build()
            .unwrap()
    }

    #[test]
    fn rejected_spec_adds_nothing() {
        let clock = Arc::new(ManualClock::at(8, 0));
        let engine = engine(&clock, Arc::new(LogNotifier));
        assert!(matches!(
            engine.add_alarm(AlarmSpec::new("25:00", "x")),
            Err(AlarmError::Validation(_))
        ));
        assert!(engine.list_alarms().is_empty());
    }

    #[test]
    fn notifier_failure_still_fires() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let engine = engine(&clock, Arc::new(Broken));
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        assert_eq!(engine.tick(), vec![id]);
        assert_eq!(engine.get_alarm(id).unwrap().state, AlarmState::Firing);
        assert_eq!(engine.firing_alarms().len(), 1);
    }

    #[test]
    fn removing_a_ringing_alarm_silences_it() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let recorder = Arc::new(Recorder::default());
        let engine = engine(&clock, recorder.clone());
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        engine.tick();
        engine.remove_alarm(id).unwrap();
        assert_eq!(*recorder.silenced.lock().unwrap(), vec![id]);
        assert!(matches!(engine.remove_alarm(id), Err(AlarmError::NotFound(_))));
    }

    #[test]
    fn update_rearms_and_allows_ringing_again() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let recorder = Arc::new(Recorder::default());
        let engine = engine(&clock, recorder.clone());
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        engine.tick();
        engine
            .update_alarm(id, AlarmSpec::new("09:00", "renamed"))
            .unwrap();
        let alarm = engine.get_alarm(id).unwrap();
        assert_eq!(alarm.state, AlarmState::Armed);
        assert_eq!(alarm.message, "renamed");
        assert_eq!(*recorder.silenced.lock().unwrap(), vec![id]);
        assert_eq!(engine.tick(), vec![id]);
        assert!(matches!(
            engine.update_alarm(99, AlarmSpec::new("09:00", "x")),
            Err(AlarmError::NotFound(99))
        ));
    }

    #[test]
    fn disabled_alarms_do_not_fire_until_enabled() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let engine = engine(&clock, Arc::new(LogNotifier));
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        engine.disable_alarm(id).unwrap();
        assert!(engine.tick().is_empty());
        engine.enable_alarm(id).unwrap();
        assert_eq!(engine.tick(), vec![id]);
    }

    #[test]
    fn saves_after_changes_and_reloads() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let gateway = Arc::new(MemoryGateway::new());
        let engine = Engine::builder()
            .clock(clock.clone())
            .persistence(gateway.clone())
            .build()
            .unwrap();
        let first = engine.add_alarm(AlarmSpec::new("10:00", "x")).unwrap();
        engine.add_alarm(AlarmSpec::new("11:00", "y")).unwrap();
        engine.flush();
        assert_eq!(gateway.saved().len(), 2);
        drop(engine);

        let reloaded = Engine::builder()
            .clock(clock)
            .persistence(gateway)
            .build()
            .unwrap();
        assert_eq!(reloaded.list_alarms().len(), 2);
        let next = reloaded.add_alarm(AlarmSpec::new("12:00", "z")).unwrap();
        assert!(next > first + 1);
    }

    #[test]
    fn dismiss_during_notify_still_ends_silenced() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let (entered, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release) = crossbeam_channel::bounded(1);
        let gated = Arc::new(Gated {
            log: Mutex::new(Vec::new()),
            entered,
            release,
        });
        let engine = engine(&clock, gated.clone());
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();

        std::thread::scope(|s| {
            let ticking = s.spawn(|| engine.tick());
            entered_rx.recv().unwrap();
            engine.dismiss_firing(id).unwrap();
            release_tx.send(()).unwrap();
            assert_eq!(ticking.join().unwrap(), vec![id]);
        });

        assert!(engine.list_alarms().is_empty());
        let log = gated.log.lock().unwrap();
        assert_eq!(log.last().map(String::as_str), Some("silence 1"));
        assert!(log.iter().any(|entry| entry == "notify 1"));
    }

    #[test]
    fn answered_alarms_are_not_silenced_twice() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let recorder = Arc::new(Recorder::default());
        let engine = engine(&clock, recorder.clone());
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        engine.tick();
        assert!(recorder.silenced.lock().unwrap().is_empty());
        engine.snooze_firing(id).unwrap();
        assert_eq!(*recorder.silenced.lock().unwrap(), vec![id]);
    }

    #[test]
    fn failing_storage_is_not_fatal() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let engine = Engine::builder()
            .clock(clock)
            .persistence(Arc::new(Unwritable))
            .build()
            .unwrap();
        assert!(engine.list_alarms().is_empty());
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        engine.flush();
        assert_eq!(engine.tick(), vec![id]);
        engine.flush();
        assert_eq!(engine.get_alarm(id).unwrap().state, AlarmState::Firing);
    }

    #[test]
    fn dismiss_all_answers_every_ringing_alarm() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let recorder = Arc::new(Recorder::default());
        let engine = engine(&clock, recorder.clone());
        let once = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        let daily = engine
            .add_alarm(AlarmSpec::new("09:00", "y").repeat_daily(true))
            .unwrap();
        let later = engine.add_alarm(AlarmSpec::new("10:00", "z")).unwrap();
        assert!(engine.dismiss_all().is_empty());
        engine.tick();

        assert_eq!(engine.dismiss_all(), vec![once, daily]);
        assert!(engine.firing_alarms().is_empty());
        assert_eq!(*recorder.silenced.lock().unwrap(), vec![once, daily]);
        let left: Vec<_> = engine.list_alarms().iter().map(|alarm| alarm.id).collect();
        assert_eq!(left, vec![daily, later]);
    }

    #[test]
    fn background_ticker_fires_once() {
        let clock = Arc::new(ManualClock::at(9, 0));
        let recorder = Arc::new(Recorder::default());
        let engine = Engine::builder()
            .clock(clock.clone())
            .notifier(recorder.clone())
            .tick_interval(Duration::from_millis(2))
            .build()
            .unwrap();
        let id = engine.add_alarm(AlarmSpec::new("09:00", "x")).unwrap();
        engine.start().unwrap();
        engine.start().unwrap();
        std::thread::sleep(Duration::from_millis(60));
        engine.stop();
        engine.stop();
        assert!(!engine.is_running());
        assert_eq!(*recorder.notified.lock().unwrap(), vec![id]);
    }
}
