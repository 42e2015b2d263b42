//! Temperature acquisition from hwmon style sensor files.
//!
//! Each sensor file holds a single line of milli-Celsius. Readings that
//! cannot be trusted are reported as `SensorReading::Unavailable` and are
//! never replaced with a default value.

use crate::core_logic::format_celsius;
use crate::error::SensorError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Lowest temperature accepted from a sensor, in Celsius.
pub const MIN_PLAUSIBLE_CELSIUS: f64 = -50.0;

/// Highest temperature accepted from a sensor, in Celsius.
pub const MAX_PLAUSIBLE_CELSIUS: f64 = 150.0;

/// Divisor from the raw hwmon unit to Celsius.
const MILLIDEGREE_DIVISOR: f64 = 1000.0;

/// Result of sampling one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorReading {
    /// Validated temperature in Celsius.
    Celsius(f64),
    /// The sensor could not produce a trustworthy value this tick.
    Unavailable,
}

impl SensorReading {
    pub fn celsius(self) -> Option<f64> {
        match self {
            SensorReading::Celsius(value) => Some(value),
            SensorReading::Unavailable => None,
        }
    }
}

/// A single sensor slot.
///
/// An empty path marks the slot as not configured: reading it is silent.
#[derive(Debug, Clone, PartialEq)]
pub struct TemperatureSource {
    path: PathBuf,
}

impl TemperatureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_configured(&self) -> bool {
        !self.path.as_os_str().is_empty()
    }

    /// Sample the sensor. A configured sensor that fails is always reported
    /// at warn; the underlying error for missing or unreadable files is
    /// only logged at debug.
    pub fn read(&self) -> SensorReading {
        if !self.is_configured() {
            return SensorReading::Unavailable;
        }

        match read_celsius(&self.path) {
            Ok(celsius) => SensorReading::Celsius(celsius),
            Err(e @ (SensorError::Parse { .. } | SensorError::OutOfRange { .. })) => {
                warn!("{}", e);
                SensorReading::Unavailable
            }
            Err(e) => {
                warn!("Temperature sensor {} unavailable", self.path.display());
                debug!("{}", e);
                SensorReading::Unavailable
            }
        }
    }
}

/// Read one sensor file and convert it to Celsius.
pub fn read_celsius(path: &Path) -> Result<f64, SensorError> {
    if !path.exists() {
        return Err(SensorError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let contents = fs::read_to_string(path).map_err(|source| SensorError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let line = contents.lines().next().unwrap_or("").trim();
    if line.is_empty() {
        return Err(SensorError::Empty {
            path: path.to_path_buf(),
        });
    }

    parse_millicelsius(path, line)
}

/// Validate a milli-Celsius line and convert it to Celsius.
pub fn parse_millicelsius(path: &Path, text: &str) -> Result<f64, SensorError> {
    let millicelsius: i64 = text.trim().parse().map_err(|_| SensorError::Parse {
        path: path.to_path_buf(),
        value: text.to_string(),
    })?;

    if millicelsius < 0 {
        return Err(SensorError::Negative {
            path: path.to_path_buf(),
            millicelsius,
        });
    }

    let celsius = millicelsius as f64 / MILLIDEGREE_DIVISOR;
    if !(MIN_PLAUSIBLE_CELSIUS..=MAX_PLAUSIBLE_CELSIUS).contains(&celsius) {
        return Err(SensorError::OutOfRange {
            path: path.to_path_buf(),
            celsius,
        });
    }

    Ok(celsius)
}

/// Combines the configured sensor slots into one representative temperature.
#[derive(Debug, Clone, Default)]
pub struct TemperatureAggregator {
    sources: Vec<TemperatureSource>,
}

impl TemperatureAggregator {
    /// Build from sensor slots; `None` and empty paths are kept as
    /// unconfigured slots and skipped when sampling.
    pub fn from_slots<I>(slots: I) -> Self
    where
        I: IntoIterator<Item = Option<PathBuf>>,
    {
        let sources = slots
            .into_iter()
            .map(|slot| TemperatureSource::new(slot.unwrap_or_default()))
            .collect();
        Self { sources }
    }

    pub fn sources(&self) -> &[TemperatureSource] {
        &self.sources
    }

    /// Number of slots with a sensor path.
    pub fn configured_count(&self) -> usize {
        self.sources.iter().filter(|s| s.is_configured()).count()
    }

    /// Read every configured slot and average the valid readings.
    pub fn sample(&self) -> Option<f64> {
        let readings: Vec<SensorReading> = self
            .sources
            .iter()
            .filter(|s| s.is_configured())
            .map(TemperatureSource::read)
            .collect();
        aggregate(&readings)
    }
}

/// Arithmetic mean of the available readings.
///
/// Returns `None` when no reading is usable; the caller skips the tick.
pub fn aggregate(readings: &[SensorReading]) -> Option<f64> {
    let temps: Vec<f64> = readings.iter().filter_map(|r| r.celsius()).collect();
    let failed = readings.len() - temps.len();

    if temps.is_empty() {
        warn!("All temperature sensors failed, cannot read temperature");
        return None;
    }

    if failed > 0 {
        debug!(
            "Using {} sensor(s), {} sensor(s) failed",
            temps.len(),
            failed
        );
    }

    let average = temps.iter().sum::<f64>() / temps.len() as f64;
    debug!(sensors = temps.len(), "Average temperature {}°C", format_celsius(average));
    Some(average)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::io::Write;
    use std::sync::{Arc, Mutex};
    use tempfile::tempdir;

    fn write_sensor(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_read_valid_sensor() {
        let dir = tempdir().unwrap();
        let path = write_sensor(dir.path(), "temp1_input", "54321\n");
        let source = TemperatureSource::new(&path);
        assert_eq!(source.read(), SensorReading::Celsius(54.321));
    }

    #[test]
    fn test_only_first_line_is_used() {
        let dir = tempdir().unwrap();
        let path = write_sensor(dir.path(), "temp1_input", "48000\ngarbage\n");
        assert_eq!(read_celsius(&path).unwrap(), 48.0);
    }

    #[test]
    fn test_missing_sensor_is_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        assert!(matches!(
            read_celsius(&path),
            Err(SensorError::NotFound { .. })
        ));
        assert_eq!(TemperatureSource::new(path).read(), SensorReading::Unavailable);
    }

    #[test]
    fn test_empty_sensor_file() {
        let dir = tempdir().unwrap();
        let path = write_sensor(dir.path(), "temp1_input", "");
        assert!(matches!(read_celsius(&path), Err(SensorError::Empty { .. })));
    }

    #[test]
    fn test_unparsable_sensor_value() {
        let dir = tempdir().unwrap();
        let path = write_sensor(dir.path(), "temp1_input", "hot\n");
        assert!(matches!(read_celsius(&path), Err(SensorError::Parse { .. })));
        assert_eq!(TemperatureSource::new(path).read(), SensorReading::Unavailable);
    }

    #[test]
    fn test_negative_sensor_value_rejected() {
        let result = parse_millicelsius(Path::new("t"), "-5000");
        assert!(matches!(
            result,
            Err(SensorError::Negative {
                millicelsius: -5000,
                ..
            })
        ));
    }

    #[test]
    fn test_implausible_sensor_value_rejected() {
        let result = parse_millicelsius(Path::new("t"), "150001");
        assert!(matches!(result, Err(SensorError::OutOfRange { .. })));
        assert_eq!(parse_millicelsius(Path::new("t"), "150000").unwrap(), 150.0);
        assert_eq!(parse_millicelsius(Path::new("t"), "0").unwrap(), 0.0);
    }

    #[test]
    fn test_unconfigured_slot_is_silent_and_skipped() {
        let source = TemperatureSource::new("");
        assert!(!source.is_configured());
        assert_eq!(source.read(), SensorReading::Unavailable);

        let dir = tempdir().unwrap();
        let path = write_sensor(dir.path(), "temp1_input", "60000");
        let aggregator = TemperatureAggregator::from_slots([Some(path), None]);
        assert_eq!(aggregator.configured_count(), 1);
        assert_eq!(aggregator.sample(), Some(60.0));
    }

    #[test]
    fn test_average_of_two_sensors() {
        let dir = tempdir().unwrap();
        let a = write_sensor(dir.path(), "a", "50000");
        let b = write_sensor(dir.path(), "b", "61000");
        let aggregator = TemperatureAggregator::from_slots([Some(a), Some(b)]);
        assert_eq!(aggregator.sample(), Some(55.5));
    }

    #[test]
    fn test_partial_failure_uses_valid_subset() {
        let dir = tempdir().unwrap();
        let a = write_sensor(dir.path(), "a", "57000");
        let b = dir.path().join("gone");
        let aggregator = TemperatureAggregator::from_slots([Some(a), Some(b)]);
        assert_eq!(aggregator.sample(), Some(57.0));
    }

    #[derive(Clone, Default)]
    struct CapturedLog(Arc<Mutex<Vec<u8>>>);

    impl Write for CapturedLog {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl CapturedLog {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn test_missing_sensor_is_reported_at_info_level() {
        let dir = tempdir().unwrap();
        let good = write_sensor(dir.path(), "a", "50000");
        let missing = dir.path().join("gone");
        let aggregator = TemperatureAggregator::from_slots([Some(good), Some(missing.clone())]);

        let log = CapturedLog::default();
        let writer = log.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();

        let sample = tracing::subscriber::with_default(subscriber, || aggregator.sample());

        assert_eq!(sample, Some(50.0));
        let output = log.contents();
        assert!(output.contains("WARN"), "no warning in: {output}");
        assert!(output.contains(&format!(
            "Temperature sensor {} unavailable",
            missing.display()
        )));
        // Detail stays behind debug
        assert!(!output.contains("does not exist"));
    }

    #[test]
    fn test_total_outage_yields_none() {
        let dir = tempdir().unwrap();
        let aggregator = TemperatureAggregator::from_slots([
            Some(dir.path().join("a")),
            Some(dir.path().join("b")),
        ]);
        assert_eq!(aggregator.sample(), None);
    }

    #[test]
    fn test_no_configured_slots_yields_none() {
        let aggregator = TemperatureAggregator::from_slots([None, Some(PathBuf::new())]);
        assert_eq!(aggregator.configured_count(), 0);
        assert_eq!(aggregator.sample(), None);
        assert_eq!(aggregate(&[]), None);
    }

    proptest! {
        #[test]
        fn prop_unavailable_only_never_numeric(count in 0usize..4) {
            let readings = vec![SensorReading::Unavailable; count];
            prop_assert_eq!(aggregate(&readings), None);
        }

        #[test]
        fn prop_mean_within_reading_bounds(
            values in proptest::collection::vec(0.0f64..150.0, 1..4),
            failures in 0usize..3,
        ) {
            let mut readings: Vec<SensorReading> =
                values.iter().copied().map(SensorReading::Celsius).collect();
            readings.extend(std::iter::repeat(SensorReading::Unavailable).take(failures));

            let mean = aggregate(&readings).unwrap();
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(mean >= min - 1e-9 && mean <= max + 1e-9);
        }
    }
}
