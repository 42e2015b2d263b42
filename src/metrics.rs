//! Metrics collection for the fan control loop.
//!
//! Tracks tick, transition and failure counts for the shutdown summary.

use crate::core_logic::FanLevel;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Point-in-time view of the loop counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Control loop iterations executed
    pub ticks: u64,
    /// Ticks skipped because no sensor produced a temperature
    pub skipped_ticks: u64,
    /// Decreases deferred by hysteresis
    pub held_decreases: u64,
    /// Verified level changes
    pub transitions: u64,
    /// Verified changes to a higher level
    pub increases: u64,
    /// Verified changes to a lower level
    pub decreases: u64,
    /// Failed writes followed by a hardware re-read
    pub resyncs: u64,
    /// Seconds since the collector was created
    pub uptime_sec: u64,
}

/// Counters owned by the control loop.
#[derive(Debug, Clone)]
pub struct ControlMetrics {
    start_time: Instant,
    ticks: u64,
    skipped_ticks: u64,
    held_decreases: u64,
    increases: u64,
    decreases: u64,
    resyncs: u64,
}

impl ControlMetrics {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            ticks: 0,
            skipped_ticks: 0,
            held_decreases: 0,
            increases: 0,
            decreases: 0,
            resyncs: 0,
        }
    }

    pub fn record_tick(&mut self) {
        self.ticks += 1;
    }

    pub fn record_skipped(&mut self) {
        self.skipped_ticks += 1;
    }

    pub fn record_held(&mut self) {
        self.held_decreases += 1;
    }

    /// Record a verified level change.
    pub fn record_transition(&mut self, from: FanLevel, to: FanLevel) {
        if to > from {
            self.increases += 1;
        } else if to < from {
            self.decreases += 1;
        }
    }

    pub fn record_resync(&mut self) {
        self.resyncs += 1;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            ticks: self.ticks,
            skipped_ticks: self.skipped_ticks,
            held_decreases: self.held_decreases,
            transitions: self.increases + self.decreases,
            increases: self.increases,
            decreases: self.decreases,
            resyncs: self.resyncs,
            uptime_sec: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for ControlMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_metrics_are_zero() {
        let snapshot = ControlMetrics::new().snapshot();
        assert_eq!(snapshot.ticks, 0);
        assert_eq!(snapshot.transitions, 0);
        assert_eq!(snapshot.resyncs, 0);
    }

    #[test]
    fn test_transition_direction() {
        let mut metrics = ControlMetrics::new();
        metrics.record_transition(FanLevel::Off, FanLevel::High);
        metrics.record_transition(FanLevel::High, FanLevel::Low);
        metrics.record_transition(FanLevel::Low, FanLevel::Medium);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.increases, 2);
        assert_eq!(snapshot.decreases, 1);
        assert_eq!(snapshot.transitions, 3);
    }

    #[test]
    fn test_snapshot_serializes() {
        let mut metrics = ControlMetrics::new();
        metrics.record_tick();
        metrics.record_skipped();
        let json = serde_json::to_string(&metrics.snapshot()).unwrap();
        assert!(json.contains("\"skipped_ticks\":1"));
    }
}
