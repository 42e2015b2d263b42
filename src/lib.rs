//! Pi5 Fan Controller core library.
//!
//! Sensors are averaged into one temperature, mapped onto five fan levels
//! and applied to the cooling device with write-verify and resync on
//! failure. The binary adds configuration loading, logging and signals.

pub mod config;
pub mod controller;
pub mod core_logic;
pub mod error;
pub mod fan_control;
pub mod logging;
pub mod metrics;
pub mod temperature;
