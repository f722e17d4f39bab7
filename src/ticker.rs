//! A background thread that calls back at a fixed cadence.

use std::{
    sync::{Mutex, PoisonError},
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{select, Sender};

use crate::error::AlarmError;

struct Worker {
    // never sent on, dropping it is the stop signal
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs a callback every `interval` on one dedicated thread.
///
/// Callbacks never overlap. If a callback runs longer than `interval` the ticks
/// that came due meanwhile collapse into one, they are not queued up.
pub struct Ticker {
    interval: Duration,
    worker: Mutex<Option<Worker>>,
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("interval", &self.interval)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Ticker {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            worker: Mutex::new(None),
        }
    }

    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Starts calling `callback`. Does nothing if already running.
    ///
    /// # Errors
    /// [`AlarmError::Spawn`] if the thread can't be created.
    pub fn start<F>(&self, mut callback: F) -> Result<(), AlarmError>
    where
        F: FnMut() + Send + 'static,
    {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.is_some() {
            return Ok(());
        }
        let (stop, stopped) = crossbeam_channel::bounded::<()>(0);
        let ticks = crossbeam_channel::tick(self.interval);
        let handle = thread::Builder::new()
            .name("alarm-ticker".to_string())
            .spawn(move || loop {
                let stop_requested = select! {
                    recv(stopped) -> _ => true,
                    recv(ticks) -> _ => false,
                };
                if stop_requested {
                    break;
                }
                callback();
            })
            .map_err(|source| AlarmError::Spawn {
                name: "ticker",
                source,
            })?;
        *worker = Some(Worker { stop, handle });
        Ok(())
    }

    /// Stops the thread, letting a callback that is already running finish.
    ///
    /// Once this returns no callback is running and none will start. Calling it
    /// again (or on a ticker that never started) is a no-op. Must not be called
    /// from inside the callback, that would wait on itself.
    pub fn stop(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(Worker { stop, handle }) = worker {
            drop(stop);
            if handle.join().is_err() {
                log::error!("ticker callback panicked");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}
