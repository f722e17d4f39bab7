#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use roosty_alarm::{
    clock::ManualClock, communication::Notifier, error::NotifierError,
    persistence::PersistenceGateway, Alarm, AlarmId, Engine,
};

/// Remembers every notify and silence call.
#[derive(Default)]
pub struct Recorder {
    notified: Mutex<Vec<AlarmId>>,
    silenced: Mutex<Vec<AlarmId>>,
}

impl Recorder {
    pub fn notified(&self) -> Vec<AlarmId> {
        self.notified.lock().unwrap().clone()
    }

    pub fn silenced(&self) -> Vec<AlarmId> {
        self.silenced.lock().unwrap().clone()
    }
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

pub fn engine(clock: &Arc<ManualClock>, recorder: &Arc<Recorder>) -> Engine {
    Engine::builder()
        .clock(clock.clone())
        .notifier(recorder.clone())
        .build()
        .unwrap()
}

pub fn engine_with(
    clock: &Arc<ManualClock>,
    recorder: &Arc<Recorder>,
    gateway: Arc<dyn PersistenceGateway>,
) -> Engine {
    Engine::builder()
        .clock(clock.clone())
        .notifier(recorder.clone())
        .persistence(gateway)
        .build()
        .unwrap()
}
