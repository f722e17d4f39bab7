#![warn(clippy::pedantic, clippy::nursery, clippy::cargo)]
#![deny(clippy::use_self, rust_2018_idioms)]
#![allow(clippy::multiple_crate_versions, clippy::module_name_repetitions)]

//! An alarm clock engine: keeps a set of alarms, watches the wall clock, and
//! rings each alarm once when its minute comes round.
//!
//! ```no_run
//! use roosty_alarm::{AlarmSpec, Engine};
//!
//! let engine = Engine::builder().build()?;
//! engine.add_alarm(AlarmSpec::new("07:30", "Wake up!").repeat_daily(true))?;
//! engine.start()?;
//! # Ok::<(), roosty_alarm::error::AlarmError>(())
//! ```

pub mod alarm;
pub mod clock;
pub mod communication;
pub mod config;
pub mod engine;
pub mod error;
/// per alarm state transitions
pub mod machine;
pub mod persistence;
#[cfg(feature = "sound")]
pub mod sound;
pub mod store;
pub mod ticker;
pub mod trigger;

pub use alarm::{Alarm, AlarmId, AlarmSpec, AlarmState, MinuteOfDay};
pub use engine::{Engine, EngineBuilder};
