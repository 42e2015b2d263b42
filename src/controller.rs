//! Control loop tying sensors, speed policy and the fan device together.
//!
//! A single worker owns `ControllerState` and ticks on a fixed interval.
//! Cancellation is cooperative: a `StopToken` is checked once per iteration,
//! so a stop request takes effect at the next interval boundary.

use crate::config::Settings;
use crate::core_logic::{format_celsius, FanLevel, SpeedPolicy};
use crate::error::InitError;
use crate::fan_control::FanDevice;
use crate::metrics::{ControlMetrics, MetricsSnapshot};
use crate::temperature::TemperatureAggregator;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Cancellation flag shared between the loop and whoever may stop it.
///
/// Cloning shares the same flag. `stop` is idempotent and safe to call from
/// any thread, before, during or after `run`.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Live controller record. Only the control loop writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControllerState {
    pub current_speed: FanLevel,
    pub running: bool,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No sensor produced a temperature; nothing changed.
    NoTemperature,
    /// The computed level equals the current one.
    Unchanged { temperature: f64, level: FanLevel },
    /// A decrease was deferred by hysteresis.
    Held {
        temperature: f64,
        current: FanLevel,
        target: FanLevel,
    },
    /// The fan moved to a new, verified level.
    Changed {
        temperature: f64,
        from: FanLevel,
        to: FanLevel,
    },
    /// The write failed; state was re-read from hardware.
    Resynced {
        temperature: f64,
        attempted: FanLevel,
        actual: FanLevel,
    },
}

/// The fan control loop.
pub struct ControlLoop<F: FanDevice> {
    policy: SpeedPolicy,
    sensors: TemperatureAggregator,
    fan: F,
    interval: Duration,
    stop: StopToken,
    state: ControllerState,
    initialized: bool,
    metrics: ControlMetrics,
}

impl<F: FanDevice> ControlLoop<F> {
    /// Build a loop from resolved settings. Nothing is validated until
    /// `initialize`.
    pub fn new(settings: &Settings, fan: F, stop: StopToken) -> Self {
        Self {
            policy: SpeedPolicy::new(settings.thresholds, settings.hysteresis),
            sensors: TemperatureAggregator::from_slots(settings.sensor_slots()),
            fan,
            interval: Duration::from_secs(settings.interval_seconds),
            stop,
            state: ControllerState {
                current_speed: FanLevel::Off,
                running: false,
            },
            initialized: false,
            metrics: ControlMetrics::new(),
        }
    }

    /// Override the tick interval.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn policy(&self) -> &SpeedPolicy {
        &self.policy
    }

    pub fn fan(&self) -> &F {
        &self.fan
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Handle for stopping the loop from another thread.
    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    /// Request termination at the next interval boundary.
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Validate the setup and seed the current speed from hardware.
    pub fn initialize(&mut self) -> Result<(), InitError> {
        if !self.fan.is_present() {
            return Err(InitError::FanPathMissing(self.fan.path().to_path_buf()));
        }

        if self.sensors.configured_count() == 0 {
            return Err(InitError::NoTemperatureSensors);
        }

        self.state.current_speed = self.fan.read();

        let thresholds = self.policy.thresholds();
        thresholds.validate().map_err(InitError::Thresholds)?;

        info!(
            "Fan controller initialized: current speed {} ({}), thresholds OFF<{}°C LOW<{}°C MEDIUM<{}°C HIGH<{}°C FULL>={}°C, hysteresis={}°C",
            self.state.current_speed,
            self.state.current_speed.as_raw(),
            format_celsius(thresholds.off),
            format_celsius(thresholds.low),
            format_celsius(thresholds.medium),
            format_celsius(thresholds.high),
            format_celsius(thresholds.full),
            format_celsius(self.policy.hysteresis()),
        );
        for source in self.sensors.sources().iter().filter(|s| s.is_configured()) {
            debug!("Temperature sensor: {}", source.path().display());
        }

        self.initialized = true;
        Ok(())
    }

    /// Run one iteration of the control loop.
    pub fn tick(&mut self) -> TickOutcome {
        self.metrics.record_tick();

        let temperature = match self.sensors.sample() {
            Some(t) => t,
            None => {
                debug!("Failed to read temperature, skipping this cycle");
                self.metrics.record_skipped();
                return TickOutcome::NoTemperature;
            }
        };

        let current = self.state.current_speed;
        let target = self.policy.target_for(temperature);

        if !self.policy.admit(temperature, target, current) {
            debug!("T:{}°C S:{}", format_celsius(temperature), current);
            self.metrics.record_held();
            return TickOutcome::Held {
                temperature,
                current,
                target,
            };
        }

        if target == current {
            debug!("T:{}°C S:{}", format_celsius(temperature), current);
            return TickOutcome::Unchanged {
                temperature,
                level: current,
            };
        }

        match self.fan.write(target) {
            Ok(()) => {
                info!("T:{}°C S:{} -> {}", format_celsius(temperature), current, target);
                self.state.current_speed = target;
                self.metrics.record_transition(current, target);
                TickOutcome::Changed {
                    temperature,
                    from: current,
                    to: target,
                }
            }
            Err(e) => {
                warn!("Failed to set fan speed {}: {}", target, e);
                let actual = self.fan.read();
                self.state.current_speed = actual;
                self.metrics.record_resync();
                warn!("Fan speed resynchronized from hardware: {}", actual);
                TickOutcome::Resynced {
                    temperature,
                    attempted: target,
                    actual,
                }
            }
        }
    }

    /// Tick on the configured interval until stopped.
    ///
    /// Blocks the calling thread. Returns immediately if the loop was never
    /// initialized or a stop was already requested.
    pub fn run(&mut self) {
        if !self.initialized {
            error!("Control loop started before successful initialization");
            return;
        }

        if self.stop.is_stopped() {
            info!("Stop requested before the control loop started");
            return;
        }

        self.state.running = true;
        info!(
            interval_secs = self.interval.as_secs_f64(),
            "Fan control loop running"
        );

        while !self.stop.is_stopped() {
            self.tick();
            std::thread::sleep(self.interval);
        }

        self.state.running = false;
        info!("Fan control loop stopped");
    }
}
