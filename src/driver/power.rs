//!
//! Settled motor power transitions. The waits are tokio sleeps, so the control
//! loop keeps running while torque settles.
//!

use std::time::Duration;

use tracing::{debug, warn};

use super::MotorDriver;

///
/// Powers the motors and waits for torque to settle. Does nothing if they are
/// already powered.
///
/// # Parameters:
/// - `driver`: The motor driver
/// - `settle`: How long to wait after switching on
///
pub async fn enable<D: MotorDriver>(driver: &mut D, settle: Duration) {
    if driver.is_powered() {
        return;
    }

    driver.set_power(true);
    debug!("motors enabled, settling for {:?}", settle);
    tokio::time::sleep(settle).await;
}

///
/// Waits for the last steps to settle, then cuts motor power. Does nothing if
/// they are already unpowered.
///
pub async fn disable<D: MotorDriver>(driver: &mut D, settle: Duration) {
    if !driver.is_powered() {
        return;
    }

    tokio::time::sleep(settle).await;
    driver.set_power(false);
    debug!("motors disabled");
}

///
/// Scoped motor power. Acquiring it powers the motors; unless `hold` is called,
/// power is cut again when the guard goes out of scope, so an early return or
/// `?` never leaves the motors energised without a segment to run.
///
/// # Fields:
/// - `driver`: The powered driver
/// - `armed`: Whether dropping the guard cuts power
///
pub struct PowerGuard<'d, D: MotorDriver> {
    driver: &'d mut D,
    armed: bool,
}

impl<'d, D: MotorDriver> PowerGuard<'d, D> {
    ///
    /// Powers the motors and waits for them to settle. A guard taken on motors
    /// that were already powered never cuts power on drop.
    ///
    pub async fn acquire(driver: &'d mut D, settle: Duration) -> PowerGuard<'d, D> {
        let armed = !driver.is_powered();
        enable(driver, settle).await;

        PowerGuard { driver, armed }
    }

    pub fn driver(&mut self) -> &mut D {
        &mut *self.driver
    }

    ///
    /// Keeps the motors powered past the end of the scope. Whoever calls this
    /// becomes responsible for `disable`.
    ///
    pub fn hold(mut self) {
        self.armed = false;
    }
}

impl<D: MotorDriver> Drop for PowerGuard<'_, D> {
    fn drop(&mut self) {
        if self.armed && self.driver.is_powered() {
            warn!("motion command abandoned, cutting motor power");
            self.driver.set_power(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::driver::sim::SimulatedDriver;
    use crate::hardware::MachineConfig;
    use crate::lengths::TotalLengths;

    fn driver() -> SimulatedDriver {
        SimulatedDriver::new(Arc::new(MachineConfig::default()))
    }

    #[tokio::test(start_paused = true)]
    async fn enable_waits_for_settle() {
        let mut driver = driver();
        let start = tokio::time::Instant::now();

        enable(&mut driver, Duration::from_millis(100)).await;

        assert!(driver.is_powered());
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn enable_when_powered_is_instant() {
        let mut driver = driver();
        driver.set_power(true);
        let start = tokio::time::Instant::now();

        enable(&mut driver, Duration::from_millis(100)).await;
        assert!(start.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn disable_waits_before_cutting() {
        let mut driver = driver();
        driver.set_power(true);
        let start = tokio::time::Instant::now();

        disable(&mut driver, Duration::from_millis(50)).await;

        assert!(!driver.is_powered());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_guard_cuts_power() {
        let mut driver = driver();
        {
            let mut guard = PowerGuard::acquire(&mut driver, Duration::ZERO).await;
            assert!(guard.driver().is_powered());
        }
        assert!(!driver.is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn held_guard_keeps_power() {
        let mut driver = driver();
        let mut guard = PowerGuard::acquire(&mut driver, Duration::ZERO).await;
        guard.driver().drive_to(TotalLengths::new(1., 1.)).unwrap();
        guard.hold();

        assert!(driver.is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn guard_on_powered_driver_does_not_cut() {
        let mut driver = driver();
        driver.set_power(true);
        drop(PowerGuard::acquire(&mut driver, Duration::ZERO).await);

        assert!(driver.is_powered());
    }
}
