//! Configuration module for the controller settings.
//!
//! Settings come from a `KEY=VALUE` file or from environment variables with
//! the same keys, on top of built-in defaults. Sensor slots left empty are
//! resolved by looking up hwmon devices by name.

use crate::core_logic::ThresholdTable;
use crate::error::ConfigError;
use crate::fan_control::DEFAULT_FAN_PATH;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// System-wide configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pi5-fan-controller/pi5-fan-controller.conf";

/// Root of the hwmon class directory.
pub const HWMON_ROOT: &str = "/sys/class/hwmon";

/// Keys recognized in the configuration file and the environment.
pub const CONFIG_KEYS: [&str; 13] = [
    "FAN_PATH",
    "HWMON0_NAME",
    "HWMON1_NAME",
    "TEMP_HWMON0_PATH",
    "TEMP_HWMON1_PATH",
    "HYSTERESIS",
    "OFF_THRESHOLD",
    "LOW_THRESHOLD",
    "MEDIUM_THRESHOLD",
    "HIGH_THRESHOLD",
    "FULL_THRESHOLD",
    "INTERVAL_SECONDS",
    "DEBUG",
];

/// Controller settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Settings {
    pub fan_path: PathBuf,
    pub hwmon0_name: String,
    pub hwmon1_name: String,
    pub temp_hwmon0_path: Option<PathBuf>,
    pub temp_hwmon1_path: Option<PathBuf>,
    pub hysteresis: f64,
    pub thresholds: ThresholdTable,
    pub interval_seconds: u64,
    pub debug: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            fan_path: PathBuf::from(DEFAULT_FAN_PATH),
            hwmon0_name: "cpu_thermal".to_string(),
            hwmon1_name: "rp1_adc".to_string(),
            temp_hwmon0_path: None,
            temp_hwmon1_path: None,
            hysteresis: 2.0,
            thresholds: ThresholdTable::default(),
            interval_seconds: 15,
            debug: false,
        }
    }
}

impl Settings {
    /// Resolve settings the way the daemon does at startup.
    ///
    /// An explicit file wins; otherwise the system file is used when
    /// readable, and the environment when it is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let default_path = Path::new(DEFAULT_CONFIG_PATH);
        let mut settings = match explicit {
            Some(path) => Self::from_file(path)?,
            None if fs::File::open(default_path).is_ok() => Self::from_file(default_path)?,
            None => Self::from_env()?,
        };

        settings.discover_sensors(Path::new(HWMON_ROOT));
        settings.validate()?;
        Ok(settings)
    }

    /// Parse a `KEY=VALUE` file over the defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = fs::read_to_string(path).map_err(|e| {
            ConfigError::ParseError(format!("Failed to read config file: {}", e))
        })?;

        Self::from_pairs(parse_key_values(&contents))
    }

    /// Read the recognized keys from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let pairs = CONFIG_KEYS.iter().filter_map(|key| {
            std::env::var(key)
                .ok()
                .map(|value| (key.to_string(), value.trim().to_string()))
        });
        Self::from_pairs(pairs)
    }

    /// Apply key/value pairs over the defaults. Unknown keys are ignored.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            settings.apply(&key, &value)?;
        }
        Ok(settings)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        match key {
            "FAN_PATH" => self.fan_path = PathBuf::from(value),
            "HWMON0_NAME" => self.hwmon0_name = value.to_string(),
            "HWMON1_NAME" => self.hwmon1_name = value.to_string(),
            "TEMP_HWMON0_PATH" => self.temp_hwmon0_path = optional_path(value),
            "TEMP_HWMON1_PATH" => self.temp_hwmon1_path = optional_path(value),
            "HYSTERESIS" => self.hysteresis = parse_number(key, value)?,
            "OFF_THRESHOLD" => self.thresholds.off = parse_number(key, value)?,
            "LOW_THRESHOLD" => self.thresholds.low = parse_number(key, value)?,
            "MEDIUM_THRESHOLD" => self.thresholds.medium = parse_number(key, value)?,
            "HIGH_THRESHOLD" => self.thresholds.high = parse_number(key, value)?,
            "FULL_THRESHOLD" => self.thresholds.full = parse_number(key, value)?,
            "INTERVAL_SECONDS" => self.interval_seconds = parse_number(key, value)?,
            "DEBUG" => self.debug = parse_bool(value),
            _ => {}
        }
        Ok(())
    }

    /// Fill empty sensor slots from hwmon devices matching the slot names.
    pub fn discover_sensors(&mut self, hwmon_root: &Path) {
        if self.temp_hwmon0_path.is_none() {
            self.temp_hwmon0_path = find_hwmon_input(hwmon_root, &self.hwmon0_name);
        }
        if self.temp_hwmon1_path.is_none() {
            self.temp_hwmon1_path = find_hwmon_input(hwmon_root, &self.hwmon1_name);
        }
    }

    /// Sensor slots in configuration order.
    pub fn sensor_slots(&self) -> [Option<PathBuf>; 2] {
        [self.temp_hwmon0_path.clone(), self.temp_hwmon1_path.clone()]
    }

    /// Validate value ranges. Threshold ordering is checked by the control
    /// loop when it initializes.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "interval_seconds must be greater than 0".to_string(),
            ));
        }

        if !self.hysteresis.is_finite() || self.hysteresis < 0.0 {
            return Err(ConfigError::ValidationError(format!(
                "hysteresis ({}) must be a non-negative number",
                self.hysteresis
            )));
        }

        let t = &self.thresholds;
        if [t.off, t.low, t.medium, t.high, t.full]
            .iter()
            .any(|v| !v.is_finite())
        {
            return Err(ConfigError::ValidationError(
                "temperature thresholds must be finite numbers".to_string(),
            ));
        }

        Ok(())
    }
}

/// Split `KEY=VALUE` lines, skipping blanks, comments and incomplete entries.
pub fn parse_key_values(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with(';'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (trim(key), trim(value)))
        .filter(|(key, value)| !key.is_empty() && !value.is_empty())
        .collect()
}

/// Locate `temp1_input` of the hwmon device whose `name` matches.
pub fn find_hwmon_input(hwmon_root: &Path, device_name: &str) -> Option<PathBuf> {
    let mut chips: Vec<PathBuf> = fs::read_dir(hwmon_root)
        .ok()?
        .flatten()
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("hwmon"))
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    chips.sort();

    chips.into_iter().find_map(|chip| {
        let name = fs::read_to_string(chip.join("name")).ok()?;
        let name = name.lines().next().map(trim).unwrap_or_default();
        let input = chip.join("temp1_input");
        (name == device_name && input.exists()).then_some(input)
    })
}

fn trim(s: &str) -> String {
    s.trim_matches(|c| c == ' ' || c == '\t').to_string()
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes")
}
