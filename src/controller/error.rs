use thiserror::Error;

use crate::driver::error::DriverError;
use crate::hardware::error::GeometryError;

///
/// All errors emitted from the controller. Whatever the variant, the operation
/// that returned it changed nothing: calibration, destination, driver target
/// and driver rate are as they were. The one exception is a driver that
/// refuses to take back its previous target after a failed move, which is
/// logged as a warning.
///
/// - `Geometry`: The requested lengths or point are physically impossible
/// - `Busy`: A calibration was requested while a segment is being tracked
/// - `OutOfRange`: The requested point or lengths fall outside the configured safe envelope
///     Parameters:
///     - `reason`: Which limit was crossed, and by what
/// - `Uncalibrated`: Nothing can be read or moved before the first hard calibration
/// - `Driver`: The motor driver refused a command
///
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControlError {
    #[error("Impossible geometry: {}", .0)]
    Geometry(#[from] GeometryError),

    #[error("The positioner is moving; wait for the segment to finish before calibrating.")]
    Busy,

    #[error("Outside the safe envelope: {}", .reason)]
    OutOfRange { reason: String },

    #[error("The positioner has not been calibrated yet.")]
    Uncalibrated,

    #[error("Motor driver error: {}", .0)]
    Driver(#[from] DriverError),
}
