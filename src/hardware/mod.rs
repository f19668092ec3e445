//!
//! Physical hardware representations and handling
//!

pub mod error;
pub mod math;

use std::f64::consts::{SQRT_2, TAU};
use std::path::Path;
use std::time::Duration;

use getset::{CopyGetters, Setters};
use serde::{Deserialize, Serialize};

use error::ConfigError;

/// Distance between the two spool axes on the original machine, in inches.
pub const DEFAULT_WIDTH: f64 = 41.232;
/// Cable paid out by one full spool rotation, in inches.
pub const DEFAULT_INCH_PER_ROTATION: f64 = 2.37578;
/// 200 full steps with 8 microsteps.
pub const DEFAULT_STEPS_PER_ROTATION: u32 = 200 * 8;
/// Cruising spool speed.
pub const DEFAULT_ROTATIONS_PER_MINUTE: f64 = 320.;
/// Fraction of the cable speed the dominant grid axis may use.
const SLOW_FACTOR: f64 = 0.9;

///
/// A container for the physical constants of the machine layout, fixed for the
/// lifetime of the process. All lengths are in inches, all speeds in inches per
/// second. All fields have an associated getter and setter.
///
/// # Fields:
/// - `width`: The horizontal distance between the two spool axes
/// - `spool_radius`: The effective radius of each spool
/// - `steps_per_inch`: Motor steps per inch of cable
/// - `max_grid_speed`: The speed of the dominant axis of any straight-line move
/// - `max_cable_speed`: The per-cable rate cap of the motor driver
/// - `min_height`: The smallest permissible baseline-relative height of a target
/// - `max_height`: The largest permissible baseline-relative height of a target, if any
/// - `min_payout`: The smallest permissible total payout of either cable
/// - `control_period_ms`: The period of the host's control tick
/// - `enable_settle_ms`: The wait after powering the motors, for torque to settle
/// - `disable_settle_ms`: The wait before cutting motor power
///
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, CopyGetters, Setters)]
#[getset(get_copy = "pub", set = "pub")]
#[serde(default, deny_unknown_fields)]
pub struct MachineConfig {
    width: f64,
    spool_radius: f64,
    steps_per_inch: f64,
    max_grid_speed: f64,
    max_cable_speed: f64,
    min_height: f64,
    max_height: Option<f64>,
    min_payout: f64,
    control_period_ms: u64,
    enable_settle_ms: u64,
    disable_settle_ms: u64,
}

impl Default for MachineConfig {
    fn default() -> Self {
        MachineConfig::from_motor(
            DEFAULT_WIDTH,
            DEFAULT_INCH_PER_ROTATION,
            DEFAULT_STEPS_PER_ROTATION,
            DEFAULT_ROTATIONS_PER_MINUTE,
        )
    }
}

impl MachineConfig {
    ///
    /// Builds a configuration from the spool and stepper parameters. The safety
    /// envelope and timing fields take their default values.
    ///
    /// # Parameters:
    /// - `width`: The distance between the spool axes
    /// - `inch_per_rotation`: The cable paid out per spool rotation
    /// - `steps_per_rotation`: Motor steps per spool rotation, microsteps included
    /// - `rotations_per_minute`: The cruising spool speed
    ///
    /// # Returns:
    /// - A new `MachineConfig` instance
    ///
    pub fn from_motor(width: f64, inch_per_rotation: f64, steps_per_rotation: u32, rotations_per_minute: f64) -> MachineConfig {
        let max_cable_speed = rotations_per_minute / 60. * inch_per_rotation;

        MachineConfig {
            width,
            spool_radius: inch_per_rotation / TAU,
            steps_per_inch: steps_per_rotation as f64 / inch_per_rotation,
            max_grid_speed: SLOW_FACTOR / SQRT_2 * max_cable_speed,
            max_cable_speed,
            min_height: 6.,
            max_height: None,
            min_payout: 1.,
            control_period_ms: 100,
            enable_settle_ms: 100,
            disable_settle_ms: 50,
        }
    }

    ///
    /// Parses and validates a JSON configuration. Missing fields take their
    /// default values.
    ///
    /// # Parameters:
    /// - `json`: The configuration text
    ///
    /// # Returns:
    /// - A validated `MachineConfig`
    /// - A `ConfigError` explaining why the configuration was rejected
    ///
    pub fn from_json(json: &str) -> Result<MachineConfig, ConfigError> {
        let config: MachineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    ///
    /// Reads, parses and validates a JSON configuration file.
    ///
    pub fn load(path: impl AsRef<Path>) -> Result<MachineConfig, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;

        MachineConfig::from_json(&json)
    }

    ///
    /// Checks that every constant describes a buildable machine.
    ///
    /// # Returns:
    /// - Void if the configuration is usable
    /// - A `ConfigError::Invalid` naming the first offending field
    ///
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("width", self.width),
            ("spool_radius", self.spool_radius),
            ("steps_per_inch", self.steps_per_inch),
            ("max_grid_speed", self.max_grid_speed),
            ("max_cable_speed", self.max_cable_speed),
        ];
        for (field, value) in positive {
            if !(value.is_finite() && value > 0.) {
                return Err(ConfigError::Invalid { field, reason: format!("must be finite and positive, got {}", value) });
            }
        }

        if !(self.min_height.is_finite() && self.min_height >= 0.) {
            return Err(ConfigError::Invalid { field: "min_height", reason: format!("must be finite and non-negative, got {}", self.min_height) });
        }

        if !(self.min_payout.is_finite() && self.min_payout >= 0.) {
            return Err(ConfigError::Invalid { field: "min_payout", reason: format!("must be finite and non-negative, got {}", self.min_payout) });
        }

        if self.spool_radius >= self.width / 2. {
            return Err(ConfigError::Invalid { field: "spool_radius", reason: format!("spools of radius {} overlap across a {} inch baseline", self.spool_radius, self.width) });
        }

        if self.max_grid_speed > self.max_cable_speed {
            return Err(ConfigError::Invalid { field: "max_grid_speed", reason: format!("{} exceeds the cable speed cap {}", self.max_grid_speed, self.max_cable_speed) });
        }

        if let Some(max_height) = self.max_height {
            if !(max_height.is_finite() && max_height > self.min_height) {
                return Err(ConfigError::Invalid { field: "max_height", reason: format!("must be above min_height {}, got {}", self.min_height, max_height) });
            }
        }

        if self.control_period_ms == 0 {
            return Err(ConfigError::Invalid { field: "control_period_ms", reason: "must be at least 1".to_owned() });
        }

        Ok(())
    }

    pub fn control_period(&self) -> Duration {
        Duration::from_millis(self.control_period_ms)
    }

    pub fn enable_settle(&self) -> Duration {
        Duration::from_millis(self.enable_settle_ms)
    }

    pub fn disable_settle(&self) -> Duration {
        Duration::from_millis(self.disable_settle_ms)
    }
}
