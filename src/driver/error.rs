use thiserror::Error;

///
/// All errors emitted by a motor driver.
///
/// - `NotPowered`: A motion command arrived while the motors were unpowered
/// - `StepOverflow`: A commanded payout does not fit the driver's step counter
///     Parameters:
///     - `inches`: The offending payout
/// - `Fault`: Anything the hardware reported, passed through verbatim
///
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("The motors are not powered; enable them before commanding motion.")]
    NotPowered,

    #[error("A payout of {} inches does not fit the step counter.", .inches)]
    StepOverflow { inches: f64 },

    #[error("Motor driver fault: {}", .0)]
    Fault(String),
}
