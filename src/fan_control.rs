//! Fan Control module for the thermal cooling device.
//!
//! The fan is driven through a sysfs file holding a single integer level.
//! Every write is flushed, synced and read back before it counts as applied.

use crate::core_logic::FanLevel;
use crate::error::FanError;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Default cooling device exposed by the Raspberry Pi 5 firmware.
pub const DEFAULT_FAN_PATH: &str = "/sys/class/thermal/cooling_device0/cur_state";

/// Delay between a write and its verification read.
pub const SETTLE_DELAY: Duration = Duration::from_millis(100);

/// Hardware seam for the fan level.
///
/// `read` never fails: unreadable or invalid hardware state reads as OFF.
/// `write` only returns `Ok` once the hardware reports the requested level.
pub trait FanDevice: Send {
    /// Path of the control file, used for diagnostics.
    fn path(&self) -> &Path;

    /// Whether the control file currently exists.
    fn is_present(&self) -> bool;

    /// Read the level the hardware reports.
    fn read(&mut self) -> FanLevel;

    /// Apply `level` and verify that it took effect.
    fn write(&mut self, level: FanLevel) -> Result<(), FanError>;
}

/// Fan driven through a sysfs `cur_state` style file.
pub struct SysfsFan {
    path: PathBuf,
    settle_delay: Duration,
    /// Last level confirmed by a read or a verified write.
    last_known: Option<FanLevel>,
}

impl SysfsFan {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            settle_delay: SETTLE_DELAY,
            last_known: None,
        }
    }

    /// Override the settle delay (tests use zero).
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    pub fn last_known(&self) -> Option<FanLevel> {
        self.last_known
    }

    /// Read and validate the hardware level without the OFF fallback.
    pub fn read_level(&self) -> Result<FanLevel, FanError> {
        if !self.path.exists() {
            return Err(FanError::NotFound {
                path: self.path.clone(),
            });
        }

        let contents = fs::read_to_string(&self.path).map_err(|source| FanError::Read {
            path: self.path.clone(),
            source,
        })?;

        let line = contents.lines().next().unwrap_or("").trim();
        if line.is_empty() {
            return Err(FanError::Empty {
                path: self.path.clone(),
            });
        }

        let value: i64 = line.parse().map_err(|_| FanError::Parse {
            path: self.path.clone(),
            value: line.to_string(),
        })?;

        FanLevel::from_raw(value).ok_or_else(|| FanError::OutOfRange {
            path: self.path.clone(),
            value,
        })
    }

    /// Write the raw level, flush and sync it to the device.
    fn write_raw(&self, level: FanLevel) -> Result<(), FanError> {
        let mut file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.path)
            .map_err(|source| FanError::Open {
                path: self.path.clone(),
                source,
            })?;

        let write_err = |source| FanError::Write {
            path: self.path.clone(),
            source,
        };
        file.write_all(level.as_raw().to_string().as_bytes())
            .map_err(write_err)?;
        file.flush().map_err(write_err)?;

        file.sync_all().map_err(|source| FanError::Sync {
            path: self.path.clone(),
            source,
        })
    }
}

impl FanDevice for SysfsFan {
    fn path(&self) -> &Path {
        &self.path
    }

    fn is_present(&self) -> bool {
        self.path.exists()
    }

    fn read(&mut self) -> FanLevel {
        match self.read_level() {
            Ok(level) => {
                self.last_known = Some(level);
                level
            }
            Err(e) => {
                warn!("{}, assuming OFF", e);
                // Unknown hardware state: never skip the next write.
                self.last_known = None;
                FanLevel::Off
            }
        }
    }

    fn write(&mut self, level: FanLevel) -> Result<(), FanError> {
        if self.last_known == Some(level) {
            return Ok(());
        }

        if !self.path.exists() {
            return Err(FanError::NotFound {
                path: self.path.clone(),
            });
        }

        self.write_raw(level)?;
        std::thread::sleep(self.settle_delay);

        let actual = self.read();
        if actual != level {
            return Err(FanError::VerifyMismatch {
                expected: level,
                actual,
            });
        }

        debug!(path = %self.path.display(), "Fan level {} verified", level);
        Ok(())
    }
}
