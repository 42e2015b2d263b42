//! Core Logic module implementing the threshold ladder and hysteresis policy.
//!
//! Temperatures map onto five discrete fan levels. Increases are applied
//! immediately; decreases wait until the temperature has fallen a margin
//! below the activation point of the level being abandoned for.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete fan level written to the cooling device.
///
/// The numeric value is the exact integer the hardware file carries, and the
/// ordering between levels is used for the increase/decrease decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum FanLevel {
    #[default]
    Off = 0,
    Low = 1,
    Medium = 2,
    High = 3,
    Full = 4,
}

impl FanLevel {
    /// All levels in ascending order.
    pub const ALL: [FanLevel; 5] = [
        FanLevel::Off,
        FanLevel::Low,
        FanLevel::Medium,
        FanLevel::High,
        FanLevel::Full,
    ];

    /// Convert a raw hardware value into a level, `None` outside [0, 4].
    pub fn from_raw(value: i64) -> Option<Self> {
        match value {
            0 => Some(FanLevel::Off),
            1 => Some(FanLevel::Low),
            2 => Some(FanLevel::Medium),
            3 => Some(FanLevel::High),
            4 => Some(FanLevel::Full),
            _ => None,
        }
    }

    /// The integer written to the hardware file.
    pub fn as_raw(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            FanLevel::Off => "OFF",
            FanLevel::Low => "LOW",
            FanLevel::Medium => "MEDIUM",
            FanLevel::High => "HIGH",
            FanLevel::Full => "FULL",
        }
    }
}

impl fmt::Display for FanLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The five ascending Celsius boundaries of the threshold ladder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThresholdTable {
    pub off: f64,
    pub low: f64,
    pub medium: f64,
    pub high: f64,
    pub full: f64,
}

impl Default for ThresholdTable {
    fn default() -> Self {
        Self {
            off: 53.0,
            low: 54.0,
            medium: 59.0,
            high: 64.0,
            full: 70.0,
        }
    }
}

impl ThresholdTable {
    /// Check that off < low < medium < high < full.
    ///
    /// NaN boundaries fail the comparison and are rejected as well.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let ladder = [self.off, self.low, self.medium, self.high, self.full];
        let ascending = ladder.windows(2).all(|pair| pair[0] < pair[1]);
        if !ascending {
            return Err(ConfigError::ValidationError(format!(
                "Temperature thresholds not in ascending order: off={} low={} medium={} high={} full={}",
                self.off, self.low, self.medium, self.high, self.full
            )));
        }
        Ok(())
    }

    /// Boundary that would trigger the next level above `level`.
    ///
    /// HIGH and FULL share the full boundary.
    pub fn threshold_for(&self, level: FanLevel) -> f64 {
        match level {
            FanLevel::Off => self.low,
            FanLevel::Low => self.medium,
            FanLevel::Medium => self.high,
            FanLevel::High | FanLevel::Full => self.full,
        }
    }
}

/// Stateless speed policy over a threshold ladder and a hysteresis margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpeedPolicy {
    thresholds: ThresholdTable,
    hysteresis: f64,
}

impl SpeedPolicy {
    pub fn new(thresholds: ThresholdTable, hysteresis: f64) -> Self {
        Self {
            thresholds,
            hysteresis,
        }
    }

    pub fn thresholds(&self) -> &ThresholdTable {
        &self.thresholds
    }

    pub fn hysteresis(&self) -> f64 {
        self.hysteresis
    }

    /// Map a temperature onto its band of the ladder.
    ///
    /// Each boundary is inclusive on its upper side: exactly `high` is HIGH.
    pub fn target_for(&self, temperature: f64) -> FanLevel {
        let t = &self.thresholds;
        if temperature >= t.full {
            FanLevel::Full
        } else if temperature >= t.high {
            FanLevel::High
        } else if temperature >= t.medium {
            FanLevel::Medium
        } else if temperature >= t.low {
            FanLevel::Low
        } else {
            FanLevel::Off
        }
    }

    /// Decide whether moving from `current` to `target` is allowed now.
    ///
    /// # Algorithm
    /// - hysteresis <= 0 disables the gate entirely
    /// - increases are always admitted
    /// - a decrease is admitted only once
    ///   `temperature <= threshold_for(target) - hysteresis`
    /// - equal levels are admitted (no-op)
    pub fn admit(&self, temperature: f64, target: FanLevel, current: FanLevel) -> bool {
        if self.hysteresis <= 0.0 {
            return true;
        }

        if target < current {
            let threshold = self.thresholds.threshold_for(target);
            return temperature <= threshold - self.hysteresis;
        }

        true
    }
}

/// Format a Celsius value with at most one decimal, dropping a trailing `.0`.
pub fn format_celsius(value: f64) -> String {
    let text = format!("{:.1}", value);
    match text.strip_suffix(".0") {
        Some(whole) => whole.to_string(),
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn reference_policy() -> SpeedPolicy {
        SpeedPolicy::new(ThresholdTable::default(), 2.0)
    }

    #[test]
    fn test_fan_level_raw_conversion() {
        for level in FanLevel::ALL {
            assert_eq!(FanLevel::from_raw(level.as_raw() as i64), Some(level));
        }
        assert_eq!(FanLevel::from_raw(-1), None);
        assert_eq!(FanLevel::from_raw(5), None);
    }

    #[test]
    fn test_fan_level_ordering() {
        assert!(FanLevel::Off < FanLevel::Low);
        assert!(FanLevel::Low < FanLevel::Medium);
        assert!(FanLevel::Medium < FanLevel::High);
        assert!(FanLevel::High < FanLevel::Full);
        assert_eq!(FanLevel::default(), FanLevel::Off);
    }

    #[test]
    fn test_fan_level_names() {
        assert_eq!(FanLevel::Medium.to_string(), "MEDIUM");
        assert_eq!(FanLevel::Full.name(), "FULL");
    }

    #[test]
    fn test_threshold_validation() {
        assert!(ThresholdTable::default().validate().is_ok());

        let equal = ThresholdTable {
            low: 53.0,
            ..ThresholdTable::default()
        };
        assert!(matches!(
            equal.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let descending = ThresholdTable {
            high: 58.0,
            ..ThresholdTable::default()
        };
        assert!(descending.validate().is_err());

        let nan = ThresholdTable {
            medium: f64::NAN,
            ..ThresholdTable::default()
        };
        assert!(nan.validate().is_err());
    }

    #[test]
    fn test_threshold_for_each_level() {
        let t = ThresholdTable::default();
        assert_eq!(t.threshold_for(FanLevel::Off), 54.0);
        assert_eq!(t.threshold_for(FanLevel::Low), 59.0);
        assert_eq!(t.threshold_for(FanLevel::Medium), 64.0);
        assert_eq!(t.threshold_for(FanLevel::High), 70.0);
        assert_eq!(t.threshold_for(FanLevel::Full), 70.0);
    }

    #[test]
    fn test_target_for_boundaries_inclusive() {
        let policy = reference_policy();
        assert_eq!(policy.target_for(20.0), FanLevel::Off);
        assert_eq!(policy.target_for(53.9), FanLevel::Off);
        assert_eq!(policy.target_for(54.0), FanLevel::Low);
        assert_eq!(policy.target_for(56.0), FanLevel::Low);
        assert_eq!(policy.target_for(59.0), FanLevel::Medium);
        assert_eq!(policy.target_for(64.0), FanLevel::High);
        assert_eq!(policy.target_for(69.99), FanLevel::High);
        assert_eq!(policy.target_for(70.0), FanLevel::Full);
        assert_eq!(policy.target_for(95.0), FanLevel::Full);
    }

    #[test]
    fn test_low_stays_low_at_56() {
        let policy = reference_policy();
        let target = policy.target_for(56.0);
        assert_eq!(target, FanLevel::Low);
        assert!(policy.admit(56.0, target, FanLevel::Low));
    }

    #[test]
    fn test_decrease_held_inside_margin() {
        let policy = reference_policy();
        let target = policy.target_for(57.5);
        assert_eq!(target, FanLevel::Low);
        // 57.5 > 59 - 2
        assert!(!policy.admit(57.5, target, FanLevel::Medium));
    }

    #[test]
    fn test_decrease_admitted_below_margin() {
        let policy = reference_policy();
        let target = policy.target_for(56.9);
        assert_eq!(target, FanLevel::Low);
        assert!(policy.admit(56.9, target, FanLevel::Medium));
        // exactly on the margin is admitted
        assert!(policy.admit(57.0, target, FanLevel::Medium));
    }

    #[test]
    fn test_decrease_uses_target_threshold() {
        // FULL -> OFF compares against the low boundary, not the full one
        let policy = reference_policy();
        assert!(!policy.admit(52.5, FanLevel::Off, FanLevel::Full));
        assert!(policy.admit(52.0, FanLevel::Off, FanLevel::Full));
    }

    #[test]
    fn test_zero_hysteresis_admits_everything() {
        let policy = SpeedPolicy::new(ThresholdTable::default(), 0.0);
        assert!(policy.admit(58.9, FanLevel::Low, FanLevel::Medium));

        let negative = SpeedPolicy::new(ThresholdTable::default(), -1.0);
        assert!(negative.admit(58.9, FanLevel::Off, FanLevel::Full));
    }

    #[test]
    fn test_format_celsius() {
        assert_eq!(format_celsius(53.0), "53");
        assert_eq!(format_celsius(57.5), "57.5");
        assert_eq!(format_celsius(56.94), "56.9");
        assert_eq!(format_celsius(2.0), "2");
    }

    fn level_strategy() -> impl Strategy<Value = FanLevel> {
        prop_oneof![
            Just(FanLevel::Off),
            Just(FanLevel::Low),
            Just(FanLevel::Medium),
            Just(FanLevel::High),
            Just(FanLevel::Full),
        ]
    }

    // Strictly ascending ladders built from a base and four positive gaps.
    fn ladder_strategy() -> impl Strategy<Value = ThresholdTable> {
        (
            0.0f64..80.0,
            0.1f64..10.0,
            0.1f64..10.0,
            0.1f64..10.0,
            0.1f64..10.0,
        )
            .prop_map(|(off, a, b, c, d)| ThresholdTable {
                off,
                low: off + a,
                medium: off + a + b,
                high: off + a + b + c,
                full: off + a + b + c + d,
            })
    }

    // For any ascending ladder, the level picked for a temperature never
    // decreases as the temperature rises.
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_target_is_monotonic(
            ladder in ladder_strategy(),
            a in -50.0f64..150.0,
            b in -50.0f64..150.0,
        ) {
            prop_assert!(ladder.validate().is_ok());
            let policy = SpeedPolicy::new(ladder, 2.0);
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(policy.target_for(lo) <= policy.target_for(hi));
            prop_assert!(FanLevel::ALL.contains(&policy.target_for(lo)));
        }

        #[test]
        fn prop_increase_never_blocked(
            ladder in ladder_strategy(),
            hysteresis in 0.0f64..20.0,
            temperature in -50.0f64..150.0,
            current in level_strategy(),
            target in level_strategy(),
        ) {
            prop_assume!(target > current);
            let policy = SpeedPolicy::new(ladder, hysteresis);
            prop_assert!(policy.admit(temperature, target, current));
        }

        // Inside the band just below a level's own entry threshold, a
        // controller sitting at that level keeps it.
        #[test]
        fn prop_no_chatter_below_entry_threshold(
            ladder in ladder_strategy(),
            hysteresis in 0.2f64..5.0,
            current in level_strategy(),
            fraction in 0.01f64..0.99,
        ) {
            prop_assume!(current != FanLevel::Off);
            let policy = SpeedPolicy::new(ladder, hysteresis);
            let below = FanLevel::from_raw(current.as_raw() as i64 - 1).unwrap();
            let entry = ladder.threshold_for(below);
            let temperature = entry - hysteresis * fraction;

            let target = policy.target_for(temperature);
            let kept = target >= current || !policy.admit(temperature, target, current);
            prop_assert!(kept, "dropped from {} to {} at {}", current, target, temperature);
        }
    }
}
