//!
//! An in-memory stepper pair, used by tests and by the simulation host in
//! place of real motors
//!

use std::sync::Arc;
use std::time::Duration;

use tracing::trace;

use super::MotorDriver;
use super::error::DriverError;
use crate::hardware::MachineConfig;
use crate::hardware::math::{steps_from_total, total_from_steps};
use crate::lengths::{Steps, StringSpeed, TotalLengths};

/// A cable with distance to go never crawls slower than this, so a segment
/// whose Jacobian rate vanishes for one cable still finishes.
const CREEP_STEPS_PER_SECOND: f64 = 50.;

///
/// A simulated pair of steppers in run-speed-to-position mode: each motor walks
/// toward its absolute target at the magnitude of its commanded rate.
///
/// The counters are kept in motor frame, so the right motor counts negative for
/// payout, just as the physical one winds the other way.
///
/// # Fields:
/// - `config`: The machine constants, for steps per inch and the rate cap
/// - `position`: The current motor step counters, left then right
/// - `target`: The absolute motor step targets
/// - `rate`: The commanded step rate magnitudes, steps per second
/// - `carry`: Fractional steps accumulated between whole steps
/// - `powered`: Whether the outputs are on
/// - `fault`: A fault to report, and how many motion commands succeed before it
///
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    config: Arc<MachineConfig>,
    position: [i64; 2],
    target: [i64; 2],
    rate: [f64; 2],
    carry: [f64; 2],
    powered: bool,
    fault: Option<(usize, String)>,
}

impl SimulatedDriver {
    ///
    /// Creates an unpowered driver with both counters at zero.
    ///
    pub fn new(config: Arc<MachineConfig>) -> SimulatedDriver {
        SimulatedDriver { config, position: [0; 2], target: [0; 2], rate: [0.; 2], carry: [0.; 2], powered: false, fault: None }
    }

    ///
    /// Makes the next `drive_to` or `drive_at_rate` fail with the given fault.
    ///
    pub fn inject_fault(&mut self, reason: &str) {
        self.inject_fault_after(0, reason);
    }

    ///
    /// Lets `commands` motion commands through, then fails the next one with
    /// the given fault.
    ///
    pub fn inject_fault_after(&mut self, commands: usize, reason: &str) {
        self.fault = Some((commands, reason.to_owned()));
    }

    ///
    /// # Returns:
    /// - The commanded rates, in inches per second, as magnitudes
    ///
    pub fn commanded_rate(&self) -> StringSpeed {
        let steps_per_inch = self.config.steps_per_inch();
        StringSpeed::new(self.rate[0] / steps_per_inch, self.rate[1] / steps_per_inch)
    }

    ///
    /// Runs both motors for the given amount of time. Unpowered motors hold still.
    ///
    /// # Parameters:
    /// - `elapsed`: The simulated time step
    ///
    pub fn advance(&mut self, elapsed: Duration) {
        if !self.powered {
            return;
        }

        for motor in 0..2 {
            let remaining = self.target[motor] - self.position[motor];
            if remaining == 0 {
                self.carry[motor] = 0.;
                continue;
            }

            self.carry[motor] += self.rate[motor].max(CREEP_STEPS_PER_SECOND) * elapsed.as_secs_f64();
            let whole = self.carry[motor].floor();
            self.carry[motor] -= whole;

            let step = (whole as i64).min(remaining.abs());
            self.position[motor] += step * remaining.signum();
        }

        trace!("simulated motors at {:?}, target {:?}", self.position, self.target);
    }

    fn take_fault(&mut self) -> Result<(), DriverError> {
        match self.fault.take() {
            Some((0, reason)) => Err(DriverError::Fault(reason)),
            Some((commands, reason)) => {
                self.fault = Some((commands - 1, reason));
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn to_motor_frame(&self, total: TotalLengths) -> Result<[i64; 2], DriverError> {
        // i64 step counts round-trip exactly through f64 only below 2^53
        const LIMIT: f64 = (1u64 << 53) as f64;

        for inches in [total.left, total.right] {
            let steps = (inches * self.config.steps_per_inch()).abs();
            if !(steps < LIMIT) {
                return Err(DriverError::StepOverflow { inches });
            }
        }

        let steps = steps_from_total(total, &self.config);
        Ok([steps.left, -steps.right])
    }
}

impl MotorDriver for SimulatedDriver {
    fn drive_to(&mut self, target: TotalLengths) -> Result<(), DriverError> {
        if !self.powered {
            return Err(DriverError::NotPowered);
        }
        self.take_fault()?;

        self.target = self.to_motor_frame(target)?;
        Ok(())
    }

    fn drive_at_rate(&mut self, rate: StringSpeed) -> Result<(), DriverError> {
        if !self.powered {
            return Err(DriverError::NotPowered);
        }
        self.take_fault()?;

        let steps_per_inch = self.config.steps_per_inch();
        let cap = self.config.max_cable_speed() * steps_per_inch;
        self.rate = [
            (rate.left * steps_per_inch).abs().min(cap),
            (rate.right * steps_per_inch).abs().min(cap),
        ];
        Ok(())
    }

    fn current_lengths(&self) -> TotalLengths {
        total_from_steps(self.current_steps(), &self.config)
    }

    fn current_steps(&self) -> Steps {
        Steps::new(self.position[0], -self.position[1])
    }

    fn still_moving(&self) -> bool {
        self.position != self.target
    }

    fn zero(&mut self, reference: TotalLengths) -> Result<(), DriverError> {
        self.position = self.to_motor_frame(reference)?;
        self.target = self.position;
        self.rate = [0.; 2];
        self.carry = [0.; 2];
        Ok(())
    }

    fn set_power(&mut self, on: bool) {
        self.powered = on;
    }

    fn is_powered(&self) -> bool {
        self.powered
    }
}
