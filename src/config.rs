use std::{collections::HashMap, fmt, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{alarm::AlarmSpec, error::ConfigError};

const APP_NAME: &str = "roosty_alarm";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// chrono format used when showing alarm times
    pub time_format: String,
    /// how often the engine looks at the clock
    pub tick_interval_ms: u64,
    pub default_message: String,
    pub default_snooze_minutes: u32,
    pub default_sound: String,
    /// 0 to 100
    pub volume: f32,
    /// where alarms are saved, defaults to the data dir
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alarms_path: Option<PathBuf>,
    /// sound profiles backed by a file, keyed by profile name
    pub sounds: HashMap<String, Sound>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            time_format: "%l:%M %p".to_string(),
            tick_interval_ms: 1000,
            default_message: "Wake up!".to_string(),
            default_snooze_minutes: 5,
            default_sound: "standard".to_string(),
            volume: 100.0,
            alarms_path: None,
            sounds: HashMap::new(),
        }
    }
}

impl Config {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// If the file can't be read or isn't valid config.
    pub fn load(path: PathBuf) -> Result<Self, ConfigError> {
        let config = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        Ok(toml::from_str(&config)?)
    }

    /// The config at `path`, or the defaults when there is no file yet.
    ///
    /// # Errors
    /// If the file exists but can't be read or parsed.
    pub fn load_or_default(path: PathBuf) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// # Errors
    /// If the config can't be serialized or written.
    pub fn save(&self, path: PathBuf) -> Result<(), ConfigError> {
        let config = toml::to_string(self)?;
        let write_error = |source| ConfigError::Write {
            path: path.clone(),
            source,
        };
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).map_err(write_error)?;
        }
        std::fs::write(&path, config).map_err(write_error)
    }

    fn project_dirs() -> Result<directories::ProjectDirs, ConfigError> {
        directories::ProjectDirs::from("", "", APP_NAME).ok_or(ConfigError::NoProjectDirs)
    }

    /// # Errors
    /// If there is no home directory to put it in.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.config_dir().to_path_buf();
        path.push("config.toml");
        Ok(path)
    }

    /// # Errors
    /// If there is no home directory to put it in.
    pub fn data_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.data_dir().to_path_buf();
        path.push("alarms.toml");
        Ok(path)
    }

    /// # Errors
    /// If there is no home directory to put it in.
    pub fn sounds_path() -> Result<PathBuf, ConfigError> {
        let mut path = Self::project_dirs()?.data_dir().to_path_buf();
        path.push("sounds");
        Ok(path)
    }

    /// `alarms_path` if set, otherwise [`Config::data_path`].
    ///
    /// # Errors
    /// If neither is available.
    pub fn alarms_path(&self) -> Result<PathBuf, ConfigError> {
        self.alarms_path
            .clone()
            .map_or_else(Self::data_path, Ok)
    }

    #[must_use]
    pub fn is_config_present() -> bool {
        Self::config_path().is_ok_and(|path| path.exists())
    }

    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    /// An [`AlarmSpec`] with this config's defaults filling the gaps.
    #[must_use]
    pub fn alarm_spec(
        &self,
        time: impl Into<String>,
        message: Option<String>,
        sound: Option<String>,
        repeat_daily: bool,
        snooze_minutes: Option<u32>,
    ) -> AlarmSpec {
        let message = message
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| self.default_message.clone());
        AlarmSpec::new(time, message)
            .sound(sound.unwrap_or_else(|| self.default_sound.clone()))
            .repeat_daily(repeat_daily)
            .snooze_minutes(snooze_minutes.unwrap_or(self.default_snooze_minutes))
    }
}

#[inline]
#[must_use]
pub const fn always_true() -> bool {
    true
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Sound {
    pub name: String,
    pub path: PathBuf,
}

impl fmt::Display for Sound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}",
            self.name,
            self.path
                .file_name()
                .map_or_else(|| self.path.to_string_lossy(), |name| name.to_string_lossy())
        )
    }
}

impl Sound {
    #[must_use]
    pub const fn new(name: String, path: PathBuf) -> Self {
        Self { name, path }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }
}
