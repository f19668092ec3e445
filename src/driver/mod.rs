//!
//! The motor driver interface consumed by the controller, its power
//! sequencing, and an in-memory implementation
//!

pub mod error;
pub mod power;
pub mod sim;

use error::DriverError;

use crate::lengths::{Steps, StringSpeed, TotalLengths};

///
/// The trait for every motor driver to implement. All lengths are total cable
/// payout in inches and all rates are inches per second; converting to steps
/// and reversing the right motor's winding sense is the driver's job.
///
/// # Functions:
/// - `drive_to`: Commands an absolute payout per cable
/// - `drive_at_rate`: Sets the per-cable rate used to approach the absolute target
/// - `current_lengths`: Reads back the payout the motors currently hold
/// - `current_steps`: Reads back the raw step counters, both counting positive for payout
/// - `still_moving`: True while either cable has distance remaining
/// - `zero`: Declares the current physical state as the given payout, without moving
/// - `set_power`: Switches the motor outputs, immediately. Use `power::enable`/`power::disable` for settled transitions
/// - `is_powered`: Whether the motor outputs are on
///
pub trait MotorDriver {
    fn drive_to(&mut self, target: TotalLengths) -> Result<(), DriverError>;
    fn drive_at_rate(&mut self, rate: StringSpeed) -> Result<(), DriverError>;

    fn current_lengths(&self) -> TotalLengths;
    fn current_steps(&self) -> Steps;
    fn still_moving(&self) -> bool;

    fn zero(&mut self, reference: TotalLengths) -> Result<(), DriverError>;

    fn set_power(&mut self, on: bool);
    fn is_powered(&self) -> bool;
}
