//!
//! Straight-line trajectory control: calibration, destinations, and the per-tick
//! cable speed updates that keep the tracked point on a straight line
//!

pub mod error;

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, trace, warn};

use crate::driver::MotorDriver;
use crate::driver::power::{self, PowerGuard};
use crate::hardware::MachineConfig;
use crate::hardware::math::true_from_position;
use crate::kinematics::StringState;
use crate::lengths::*;
use error::ControlError;

/// Below this many inches a move has nowhere to go.
const MIN_SEGMENT: f64 = 1e-9;

///
/// A controller shared between tasks. Every call, reads included, goes through
/// the one lock, so the calibration and the trajectory are always consistent.
///
pub type SharedController<D> = Arc<Mutex<Controller<D>>>;

///
/// What the controller is doing.
///
/// - `Idle`: No destination pending; calibration is allowed
/// - `Tracking`: Moving toward `destination` along the fixed Cartesian `bearing`
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TrackState {
    Idle,
    Tracking { destination: Position, bearing: GridSpeed },
}

impl TrackState {
    pub fn is_tracking(&self) -> bool {
        matches!(self, TrackState::Tracking { .. })
    }
}

///
/// The single owner of one physical positioner: its calibration, its current
/// segment and its motor driver. Calls are expected from one control task; wrap
/// it with `into_shared` to reach it from several.
///
/// # Fields:
/// - `config`: The machine constants
/// - `state`: The commanded cable configuration, `None` until the first hard calibration
/// - `track`: The current segment, if any
/// - `driver`: The motor driver executing the segments
///
pub struct Controller<D: MotorDriver> {
    config: Arc<MachineConfig>,
    state: Option<StringState>,
    track: TrackState,
    driver: D,
}

impl<D: MotorDriver> Controller<D> {
    ///
    /// Creates an uncalibrated, idle controller.
    ///
    /// # Parameters:
    /// - `config`: The machine constants, already validated
    /// - `driver`: The motor driver
    ///
    pub fn new(config: Arc<MachineConfig>, driver: D) -> Controller<D> {
        Controller { config, state: None, track: TrackState::Idle, driver }
    }

    pub fn into_shared(self) -> SharedController<D> {
        Arc::new(Mutex::new(self))
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn track_state(&self) -> TrackState {
        self.track
    }

    pub fn is_calibrated(&self) -> bool {
        self.state.is_some()
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }

    fn calibrated(&self) -> Result<&StringState, ControlError> {
        self.state.as_ref().ok_or(ControlError::Uncalibrated)
    }

    fn check_payout(&self, total: TotalLengths) -> Result<(), ControlError> {
        let min_payout = self.config.min_payout();
        if total.min() < min_payout {
            return Err(ControlError::OutOfRange {
                reason: format!("payout {} leaves less than {} inches on a spool", total, min_payout),
            });
        }

        Ok(())
    }

    fn check_destination(&self, destination: TruePosition) -> Result<(), ControlError> {
        let width = self.config.width();
        if !(destination.x > 0. && destination.x < width) {
            return Err(ControlError::OutOfRange { reason: format!("x {:.4} is not between the spools (0, {})", destination.x, width) });
        }

        let min_height = self.config.min_height();
        if !(destination.y >= min_height) {
            return Err(ControlError::OutOfRange { reason: format!("height {:.4} below the spools is less than the minimum {}", destination.y, min_height) });
        }

        if let Some(max_height) = self.config.max_height() {
            if destination.y > max_height {
                return Err(ControlError::OutOfRange { reason: format!("height {:.4} below the spools is more than the maximum {}", destination.y, max_height) });
            }
        }

        Ok(())
    }

    ///
    /// Shared tail of both calibrations: range check, then bring the driver's
    /// counters in line, then commit.
    ///
    fn commit_calibration(&mut self, candidate: StringState) -> Result<Position, ControlError> {
        let total = candidate.to_total_lengths();
        self.check_payout(total)?;
        self.driver.zero(total)?;

        let position = candidate.to_position();
        self.state = Some(candidate);
        Ok(position)
    }

    ///
    /// Declares the measured configuration as the new origin. This is also the
    /// first-time calibration.
    ///
    /// # Parameters:
    /// - `measured`: The straight cable lengths from each tangent point to the tracked point
    ///
    /// # Returns:
    /// - The new position, which is `(x, 0)`
    /// - `Busy` while tracking, or a geometry, range or driver error; the calibration is unchanged
    ///
    pub fn calibrate_hard(&mut self, measured: Tangential) -> Result<Position, ControlError> {
        if self.track.is_tracking() {
            warn!("hard calibration to {} refused while tracking", measured);
            return Err(ControlError::Busy);
        }

        let candidate = match &self.state {
            Some(state) => {
                let mut candidate = state.clone();
                candidate.hard_zero(measured).map(|_| candidate)
            }
            None => StringState::new_by_tangential(measured, Arc::clone(&self.config)),
        };

        let result = candidate.map_err(ControlError::from).and_then(|candidate| {
            let origin_offset = candidate.origin_offset();
            self.commit_calibration(candidate).map(|position| (position, origin_offset))
        });

        match result {
            Ok((position, origin_offset)) => {
                info!("hard calibration to {}: {}, origin {:.4} inches below the spools", measured, position, origin_offset);
                Ok(position)
            }
            Err(err) => {
                warn!("hard calibration to {} rejected: {}", measured, err);
                Err(err)
            }
        }
    }

    ///
    /// Corrects drift against a physical remeasurement, keeping the origin.
    ///
    /// # Parameters:
    /// - `measured`: The straight cable lengths from each tangent point to the tracked point
    ///
    /// # Returns:
    /// - The corrected position
    /// - `Uncalibrated`, `Busy`, or a geometry, range or driver error; the calibration is unchanged
    ///
    pub fn calibrate_soft(&mut self, measured: Tangential) -> Result<Position, ControlError> {
        if self.track.is_tracking() {
            warn!("soft calibration to {} refused while tracking", measured);
            return Err(ControlError::Busy);
        }

        let mut candidate = self.calibrated()?.clone();
        let result = candidate.soft_zero(measured).map_err(ControlError::from).and_then(|_| self.commit_calibration(candidate));

        match &result {
            Ok(position) => info!("soft calibration to {}: {}", measured, position),
            Err(err) => warn!("soft calibration to {} rejected: {}", measured, err),
        }
        result
    }

    ///
    /// Starts a straight-line segment toward the destination, superseding any
    /// segment in flight. The bearing is scaled so the dominant axis moves at
    /// the grid speed limit and the other proportionally slower.
    ///
    /// Powers the motors first if needed, waiting for them to settle.
    ///
    /// # Parameters:
    /// - `destination`: The target point, relative to the user's origin
    ///
    /// # Returns:
    /// - The new track state; `Idle` if already at the destination
    /// - `Uncalibrated`, or a range, geometry or driver error; nothing is changed
    ///
    pub async fn move_to(&mut self, destination: Position) -> Result<TrackState, ControlError> {
        let commanded = self.calibrated()?;
        let true_destination = true_from_position(destination, commanded.origin_offset());
        self.check_destination(true_destination)?;

        let mut target = commanded.clone();
        target.set_target(destination)?;
        let total = target.to_total_lengths();
        self.check_payout(total)?;

        // Mid-segment the commanded state is the old destination, so start from where the cables are.
        let start = match self.track {
            TrackState::Idle => commanded.clone(),
            TrackState::Tracking { .. } => commanded.observe(self.driver.current_lengths()).unwrap_or_else(|err| {
                warn!("read-back unusable ({}), bearing from the commanded position", err);
                commanded.clone()
            }),
        };

        let delta = true_destination - start.to_true_position();
        if delta.max_abs() < MIN_SEGMENT && !self.track.is_tracking() {
            return Ok(TrackState::Idle);
        }

        let bearing: GridSpeed = if delta.max_abs() < MIN_SEGMENT {
            GridSpeed::new(0., 0.)
        } else {
            (delta * (self.config.max_grid_speed() / delta.max_abs())).cast()
        };
        let speed = start.get_speed(bearing);

        let previous = commanded.to_total_lengths();
        let mut guard = PowerGuard::acquire(&mut self.driver, self.config.enable_settle()).await;
        guard.driver().drive_to(total)?;
        if let Err(err) = guard.driver().drive_at_rate(speed) {
            // The driver holds the commanded payout, so putting it back restores the old segment.
            if let Err(restore) = guard.driver().drive_to(previous) {
                warn!("could not restore the previous target {}: {}", previous, restore);
            }
            return Err(err.into());
        }
        guard.hold();

        self.state = Some(target);
        self.track = TrackState::Tracking { destination, bearing };
        info!("tracking to {} along {}, cables at {}", destination, bearing, speed);

        Ok(self.track)
    }

    ///
    /// Moves by a Cartesian offset from the commanded position. Mid-segment the
    /// commanded position is the current destination.
    ///
    pub async fn shift(&mut self, delta: Position) -> Result<TrackState, ControlError> {
        let destination = self.calibrated()?.to_position() + delta;
        self.move_to(destination).await
    }

    ///
    /// One control tick. While tracking, recomputes the cable speeds from the
    /// read-back position, since the Jacobian changes along the segment, and
    /// hands them to the driver. Once neither cable has distance left, powers
    /// down and goes idle.
    ///
    /// # Returns:
    /// - The track state after the tick
    /// - A geometry or driver error; the segment carries on and the next tick retries
    ///
    pub async fn tick(&mut self) -> Result<TrackState, ControlError> {
        let TrackState::Tracking { destination, bearing } = self.track else {
            return Ok(TrackState::Idle);
        };

        if !self.driver.still_moving() {
            power::disable(&mut self.driver, self.config.disable_settle()).await;
            self.track = TrackState::Idle;
            info!("arrived at {}", destination);
            return Ok(self.track);
        }

        let observed = self.calibrated()?.observe(self.driver.current_lengths())?;
        let speed = observed.get_speed(bearing);
        trace!("at {}, cables at {}", observed.to_position(), speed);
        self.driver.drive_at_rate(speed)?;

        Ok(self.track)
    }

    ///
    /// # Returns:
    /// - The commanded position; mid-segment, that is the destination
    ///
    pub fn current_position(&self) -> Result<Position, ControlError> {
        Ok(self.calibrated()?.to_position())
    }

    ///
    /// # Returns:
    /// - The commanded tangential lengths; mid-segment, those of the destination
    ///
    pub fn current_tangential(&self) -> Result<Tangential, ControlError> {
        Ok(self.calibrated()?.to_tangential())
    }

    ///
    /// # Returns:
    /// - The position estimated from the driver's read-back, good to the approximate payout inverse
    ///
    pub fn observed_position(&self) -> Result<Position, ControlError> {
        Ok(self.calibrated()?.observe(self.driver.current_lengths())?.to_position())
    }

    pub fn origin_offset(&self) -> Result<f64, ControlError> {
        Ok(self.calibrated()?.origin_offset())
    }

    ///
    /// # Returns:
    /// - The total payout the driver reports, arc included
    ///
    pub fn current_lengths(&self) -> TotalLengths {
        self.driver.current_lengths()
    }

    ///
    /// # Returns:
    /// - The raw step counters the driver reports
    ///
    pub fn current_steps(&self) -> Steps {
        self.driver.current_steps()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::driver::sim::SimulatedDriver;
    use crate::hardware::error::GeometryError;

    fn controller() -> Controller<SimulatedDriver> {
        let config = Arc::new(MachineConfig::default());
        Controller::new(Arc::clone(&config), SimulatedDriver::new(config))
    }

    fn calibrated() -> Controller<SimulatedDriver> {
        let mut controller = controller();
        controller.calibrate_hard(Tangential::new(30., 30.)).unwrap();
        controller
    }

    async fn run_to_idle(controller: &mut Controller<SimulatedDriver>) -> usize {
        let period = controller.config().control_period();
        let mut ticks = 0;
        while controller.tick().await.unwrap().is_tracking() {
            controller.driver_mut().advance(period);
            ticks += 1;
            assert!(ticks < 10_000, "segment never finished");
        }
        ticks
    }

    #[test]
    fn reads_before_calibration_fail() {
        let controller = controller();

        assert_eq!(controller.current_position(), Err(ControlError::Uncalibrated));
        assert_eq!(controller.current_tangential(), Err(ControlError::Uncalibrated));
        assert_eq!(controller.origin_offset(), Err(ControlError::Uncalibrated));
    }

    #[test]
    fn soft_calibration_needs_hard_first() {
        let mut controller = controller();
        assert_eq!(controller.calibrate_soft(Tangential::new(30., 30.)), Err(ControlError::Uncalibrated));
    }

    #[tokio::test(start_paused = true)]
    async fn move_before_calibration_fails() {
        let mut controller = controller();
        assert_eq!(controller.move_to(Position::new(10., 5.)).await, Err(ControlError::Uncalibrated));
        assert!(!controller.driver().is_powered());
    }

    #[test]
    fn hard_calibration_syncs_driver() {
        let controller = calibrated();
        let expected = controller.state.as_ref().unwrap().to_total_lengths();
        let reported = controller.current_lengths();

        assert!((expected.left - reported.left).abs() < 1e-3);
        assert!((expected.right - reported.right).abs() < 1e-3);
        assert!(!controller.driver().still_moving());
    }

    #[test]
    fn rejected_calibration_keeps_everything() {
        let mut controller = calibrated();
        let position = controller.current_position().unwrap();
        let steps = controller.current_steps();

        let err = controller.calibrate_hard(Tangential::new(5., 5.)).unwrap_err();
        assert!(matches!(err, ControlError::Geometry(GeometryError::TriangleInequality { .. })));

        assert_eq!(controller.current_position().unwrap(), position);
        assert_eq!(controller.current_steps(), steps);
    }

    #[test]
    fn short_payout_is_out_of_range() {
        let mut config = MachineConfig::default();
        config.set_min_payout(35.);
        let config = Arc::new(config);
        let mut controller = Controller::new(Arc::clone(&config), SimulatedDriver::new(config));

        assert!(matches!(controller.calibrate_hard(Tangential::new(30., 30.)), Err(ControlError::OutOfRange { .. })));
        assert!(!controller.is_calibrated());
    }

    #[tokio::test(start_paused = true)]
    async fn calibration_while_tracking_is_busy() {
        let mut controller = calibrated();
        controller.move_to(Position::new(10., 5.)).await.unwrap();
        let origin_offset = controller.origin_offset().unwrap();

        assert_eq!(controller.calibrate_hard(Tangential::new(40., 40.)), Err(ControlError::Busy));
        assert_eq!(controller.calibrate_soft(Tangential::new(40., 40.)), Err(ControlError::Busy));
        assert_eq!(controller.origin_offset().unwrap().to_bits(), origin_offset.to_bits());
    }

    #[tokio::test(start_paused = true)]
    async fn bearing_is_scaled_to_dominant_axis() {
        let mut controller = calibrated();
        let start = controller.current_position().unwrap();

        let track = controller.move_to(Position::new(10., 5.)).await.unwrap();
        let TrackState::Tracking { bearing, .. } = track else {
            panic!("expected tracking, got {:?}", track);
        };

        let limit = controller.config().max_grid_speed();
        assert!((bearing.max_abs() - limit).abs() < 1e-9);
        assert!((bearing.x - -limit).abs() < 1e-9);
        let delta = Position::new(10., 5.) - start;
        assert!((bearing.y / bearing.x - delta.y / delta.x).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_speeds_follow_payout_direction() {
        let mut controller = calibrated();
        controller.move_to(Position::new(10., 5.)).await.unwrap();

        let TrackState::Tracking { bearing, .. } = controller.track_state() else {
            panic!("expected tracking");
        };
        let start = StringState::new_by_tangential(Tangential::new(30., 30.), Arc::new(MachineConfig::default())).unwrap();
        let speed = start.get_speed(bearing);

        // Moving left and down: the left cable shortens, the right one lengthens.
        assert!(speed.left < 0.);
        assert!(speed.right > 0.);

        let rate = controller.driver().commanded_rate();
        assert!((rate.left - speed.left.abs()).abs() < 1e-9);
        assert!((rate.right - speed.right.abs().min(controller.config().max_cable_speed())).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn segment_completes_and_powers_down() {
        let mut controller = calibrated();
        controller.move_to(Position::new(10., 5.)).await.unwrap();
        assert!(controller.driver().is_powered());

        run_to_idle(&mut controller).await;

        assert_eq!(controller.track_state(), TrackState::Idle);
        assert!(!controller.driver().is_powered());

        let position = controller.current_position().unwrap();
        assert!((position.x - 10.).abs() < 1e-9);
        assert!((position.y - 5.).abs() < 1e-9);

        let expected = controller.state.as_ref().unwrap().to_total_lengths();
        let reported = controller.current_lengths();
        assert!((expected.left - reported.left).abs() < 1e-3);
        assert!((expected.right - reported.right).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn every_tick_refreshes_cable_rates() {
        let mut controller = calibrated();
        let track = controller.move_to(Position::new(10., 5.)).await.unwrap();
        let TrackState::Tracking { bearing, .. } = track else {
            panic!("expected tracking, got {:?}", track);
        };
        let initial = controller.driver().commanded_rate();
        let cap = controller.config().max_cable_speed();

        for _ in 0..5 {
            controller.driver_mut().advance(Duration::from_millis(100));
            assert!(controller.tick().await.unwrap().is_tracking());

            let observed = controller.calibrated().unwrap().observe(controller.current_lengths()).unwrap();
            let expected = observed.get_speed(bearing).map(|rate| rate.abs().min(cap));
            let rate = controller.driver().commanded_rate();
            assert!((rate.left - expected.left).abs() < 1e-9);
            assert!((rate.right - expected.right).abs() < 1e-9);
        }

        let rate = controller.driver().commanded_rate();
        assert!((rate.left - initial.left).abs() > 1e-3 || (rate.right - initial.right).abs() > 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn refused_target_keeps_segment_rate() {
        let mut controller = calibrated();
        controller.move_to(Position::new(10., 5.)).await.unwrap();
        controller.driver_mut().advance(Duration::from_millis(100));
        controller.tick().await.unwrap();

        let track = controller.track_state();
        let rate = controller.driver().commanded_rate();
        controller.driver_mut().inject_fault("stalled");

        assert!(matches!(controller.move_to(Position::new(30., 10.)).await, Err(ControlError::Driver(_))));
        assert_eq!(controller.track_state(), track);
        assert_eq!(controller.driver().commanded_rate(), rate);
        assert!(controller.driver().is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn refused_rate_restores_previous_target() {
        let mut controller = calibrated();
        controller.move_to(Position::new(10., 5.)).await.unwrap();
        controller.driver_mut().advance(Duration::from_millis(100));
        controller.tick().await.unwrap();

        let rate = controller.driver().commanded_rate();
        controller.driver_mut().inject_fault_after(1, "stalled");

        assert!(matches!(controller.move_to(Position::new(30., 10.)).await, Err(ControlError::Driver(_))));
        assert_eq!(controller.driver().commanded_rate(), rate);

        run_to_idle(&mut controller).await;
        let position = controller.current_position().unwrap();
        assert!((position.x - 10.).abs() < 1e-9);
        let expected = controller.state.as_ref().unwrap().to_total_lengths();
        let reported = controller.current_lengths();
        assert!((expected.left - reported.left).abs() < 1e-3);
        assert!((expected.right - reported.right).abs() < 1e-3);
    }

    #[tokio::test(start_paused = true)]
    async fn new_destination_supersedes() {
        let mut controller = calibrated();
        controller.move_to(Position::new(10., 5.)).await.unwrap();
        for _ in 0..3 {
            controller.driver_mut().advance(Duration::from_millis(100));
            controller.tick().await.unwrap();
        }

        let track = controller.move_to(Position::new(30., 10.)).await.unwrap();
        assert!(matches!(track, TrackState::Tracking { destination, .. } if destination == Position::new(30., 10.)));

        run_to_idle(&mut controller).await;
        let position = controller.current_position().unwrap();
        assert!((position.x - 30.).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_length_move_stays_idle() {
        let mut controller = calibrated();
        let here = controller.current_position().unwrap();

        assert_eq!(controller.move_to(here).await, Ok(TrackState::Idle));
        assert!(!controller.driver().is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn destinations_outside_envelope_are_rejected() {
        let mut controller = calibrated();
        let origin_offset = controller.origin_offset().unwrap();
        let width = controller.config().width();

        for destination in [
            Position::new(-1., 5.),
            Position::new(width + 1., 5.),
            Position::new(10., 5. - origin_offset),
            Position::new(f64::NAN, 5.),
        ] {
            assert!(matches!(controller.move_to(destination).await, Err(ControlError::OutOfRange { .. })), "{}", destination);
        }

        assert_eq!(controller.track_state(), TrackState::Idle);
        assert!(!controller.driver().is_powered());
    }

    #[tokio::test(start_paused = true)]
    async fn max_height_is_enforced() {
        let mut config = MachineConfig::default();
        config.set_max_height(Some(25.));
        let config = Arc::new(config);
        let mut controller = Controller::new(Arc::clone(&config), SimulatedDriver::new(config));
        controller.calibrate_hard(Tangential::new(30., 30.)).unwrap();

        assert!(matches!(controller.move_to(Position::new(20., 10.)).await, Err(ControlError::OutOfRange { .. })));
        assert!(controller.move_to(Position::new(20., 2.)).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn driver_fault_cuts_power_and_keeps_state() {
        let mut controller = calibrated();
        let position = controller.current_position().unwrap();
        controller.driver_mut().inject_fault("stalled");

        let err = controller.move_to(Position::new(10., 5.)).await.unwrap_err();
        assert!(matches!(err, ControlError::Driver(_)));

        assert!(!controller.driver().is_powered());
        assert_eq!(controller.track_state(), TrackState::Idle);
        assert_eq!(controller.current_position().unwrap(), position);
    }

    #[tokio::test(start_paused = true)]
    async fn shift_moves_relative() {
        let mut controller = calibrated();
        let start = controller.current_position().unwrap();

        controller.shift(Position::new(-2., 3.)).await.unwrap();
        run_to_idle(&mut controller).await;

        let end = controller.current_position().unwrap();
        assert!((end.x - (start.x - 2.)).abs() < 1e-9);
        assert!((end.y - 3.).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn soft_calibration_after_segment() {
        let mut controller = calibrated();
        let origin_offset = controller.origin_offset().unwrap();
        controller.move_to(Position::new(15., 8.)).await.unwrap();
        run_to_idle(&mut controller).await;

        let measured = controller.current_tangential().unwrap();
        let corrected = Tangential::new(measured.left + 0.1, measured.right - 0.1);
        controller.calibrate_soft(corrected).unwrap();

        assert_eq!(controller.origin_offset().unwrap().to_bits(), origin_offset.to_bits());
        let tangential = controller.current_tangential().unwrap();
        assert!((tangential.left - corrected.left).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn shared_controller_serialises_calls() {
        let shared = calibrated().into_shared();

        let mover = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move { shared.lock().await.move_to(Position::new(12., 6.)).await })
        };
        mover.await.unwrap().unwrap();

        let mut controller = shared.lock().await;
        assert!(controller.track_state().is_tracking());
        run_to_idle(&mut controller).await;
        assert_eq!(controller.track_state(), TrackState::Idle);
    }
}
