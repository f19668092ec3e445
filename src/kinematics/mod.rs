//!
//! The tracked configuration of the cables and its calibration
//!

use std::sync::Arc;

use nalgebra::{Matrix2, Vector2};
use tracing::debug;

use crate::hardware::MachineConfig;
use crate::hardware::error::{GeometryError, Side};
use crate::hardware::math::*;
use crate::lengths::*;

///
/// Every representation of one configuration, derived together so that a
/// `StringState` can only ever hold a physically valid one.
///
#[derive(Debug, Clone, Copy, PartialEq)]
struct Resolved {
    radial: Radial,
    tangential: Tangential,
    true_position: TruePosition,
    total: TotalLengths,
}

impl Resolved {
    fn from_radial(radial: Radial, config: &MachineConfig) -> Result<Resolved, GeometryError> {
        let true_position = true_position_from_radial(radial, config)?;
        if true_position.y <= 0. {
            return Err(GeometryError::Degenerate);
        }

        let tangential = tangential_from_radial(radial, config)?;
        // A cable with no straight run has no defined direction, and the Jacobian divides by its length
        let radius = config.spool_radius();
        for (side, length, value) in [(Side::Left, tangential.left, radial.left), (Side::Right, tangential.right, radial.right)] {
            if !(length > 0.) {
                return Err(GeometryError::InsideSpool { side, radial: value, radius });
            }
        }

        let total = total_lengths(true_position, radial, tangential, config)?;

        Ok(Resolved { radial, tangential, true_position, total })
    }
}

///
/// A structure representing the real world cables: where the tracked point is
/// and where the user's origin lies.
///
/// # Fields:
/// - `current`: The radial lengths of the current configuration, with every derived representation
/// - `origin_offset`: The baseline-relative height of the user's origin, in inches
/// - `config`: The machine constants
///
#[derive(Debug, Clone)]
pub struct StringState {
    current: Resolved,
    origin_offset: f64,
    config: Arc<MachineConfig>,
}

impl StringState {
    ///
    /// Initialises a new state by radial lengths, declaring the point they reach
    /// as the origin.
    ///
    /// # Parameters:
    /// - `radial`: The distance from each spool axis to the point
    /// - `config`: The machine constants
    ///
    /// # Returns:
    /// - A new `StringState` instance whose position is `(x, 0)`
    /// - A `GeometryError` if the lengths cannot reach a point below the baseline
    ///
    pub fn new_by_radial(radial: Radial, config: Arc<MachineConfig>) -> Result<StringState, GeometryError> {
        let current = Resolved::from_radial(radial, &config)?;
        let origin_offset = current.true_position.y;

        Ok(StringState { current, origin_offset, config })
    }

    ///
    /// Initialises a new state from measured tangential lengths, declaring the
    /// point they reach as the origin. This is the first-time calibration.
    ///
    /// # Parameters:
    /// - `tangential`: The straight cable length from each tangent point to the point
    /// - `config`: The machine constants
    ///
    pub fn new_by_tangential(tangential: Tangential, config: Arc<MachineConfig>) -> Result<StringState, GeometryError> {
        let radial = radial_from_tangential(tangential, &config)?;
        StringState::new_by_radial(radial, config)
    }

    ///
    /// Re-derives the cables for a new destination in one step, keeping the
    /// origin. Intermediate points are the motor driver's business.
    ///
    /// # Parameters:
    /// - `position`: The destination, relative to the user's origin
    ///
    /// # Returns:
    /// - Void if the destination is reachable; the state is updated
    /// - A `GeometryError` if not; the state is unchanged
    ///
    pub fn set_target(&mut self, position: Position) -> Result<(), GeometryError> {
        let true_position = true_from_position(position, self.origin_offset);
        // Heron's height is unsigned, a point above the baseline would resolve to its mirror image
        if !(true_position.y > 0.) {
            return Err(GeometryError::Degenerate);
        }

        let radial = radial_from_true_position(true_position, &self.config);
        self.current = Resolved::from_radial(radial, &self.config)?;
        Ok(())
    }

    ///
    /// Corrects drift against a physical remeasurement. The origin is kept, so
    /// the reported position moves to wherever the measured cables put it.
    ///
    pub fn soft_zero(&mut self, measured: Tangential) -> Result<(), GeometryError> {
        let radial = radial_from_tangential(measured, &self.config)?;
        self.current = Resolved::from_radial(radial, &self.config)?;
        debug!("soft zero to {}, origin offset kept at {:.4}", self.current.radial, self.origin_offset);
        Ok(())
    }

    ///
    /// Declares the measured configuration as the new origin.
    ///
    pub fn hard_zero(&mut self, measured: Tangential) -> Result<(), GeometryError> {
        let radial = radial_from_tangential(measured, &self.config)?;
        let current = Resolved::from_radial(radial, &self.config)?;

        self.origin_offset = current.true_position.y;
        self.current = current;
        debug!("hard zero to {}, origin offset now {:.4}", self.current.radial, self.origin_offset);
        Ok(())
    }

    ///
    /// Estimates the configuration the motor driver actually holds from its
    /// reported payout, through the approximate payout inverse. The origin is
    /// carried over unchanged.
    ///
    /// # Parameters:
    /// - `lengths`: The driver's current total payout
    ///
    /// # Returns:
    /// - A new `StringState` for the observed configuration
    /// - A `GeometryError` if the estimate is not a valid configuration
    ///
    pub fn observe(&self, lengths: TotalLengths) -> Result<StringState, GeometryError> {
        let tangential = approx_tangential_from_total(lengths, &self.config);
        let radial = radial_from_tangential(tangential, &self.config)?;
        let current = Resolved::from_radial(radial, &self.config)?;

        Ok(StringState { current, origin_offset: self.origin_offset, config: Arc::clone(&self.config) })
    }

    pub fn origin_offset(&self) -> f64 {
        self.origin_offset
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    pub fn to_radial(&self) -> Radial {
        self.current.radial
    }

    pub fn to_tangential(&self) -> Tangential {
        self.current.tangential
    }

    ///
    /// # Returns:
    /// - The tracked point with x from the left spool axis and y down from the baseline
    ///
    pub fn to_true_position(&self) -> TruePosition {
        self.current.true_position
    }

    ///
    /// # Returns:
    /// - The tracked point relative to the user's origin
    ///
    pub fn to_position(&self) -> Position {
        position_from_true(self.current.true_position, self.origin_offset)
    }

    ///
    /// # Returns:
    /// - The physical cable payout the motor driver must hold for this configuration
    ///
    pub fn to_total_lengths(&self) -> TotalLengths {
        self.current.total
    }

    ///
    /// The velocity Jacobian at the current point: the matrix taking a
    /// Cartesian velocity to the rate of change of each tangential length.
    /// Rows are the left and right cables, columns the x and y components.
    ///
    pub fn jacobian(&self) -> Matrix2<f64> {
        let TruePosition { x, y, .. } = self.current.true_position;
        let Tangential { left, right, .. } = self.current.tangential;
        let width = self.config.width();

        Matrix2::new(
            x / left, y / left,
            (x - width) / right, y / right,
        )
    }

    ///
    /// Computes the per-cable rates that move the tracked point along the
    /// bearing, at the current point only. The Jacobian varies with position,
    /// so this has to be recomputed every control tick.
    ///
    /// # Parameters:
    /// - `bearing`: The desired Cartesian velocity
    ///
    /// # Returns:
    /// - The rate of change of each cable, in inches per second
    ///
    pub fn get_speed(&self, bearing: GridSpeed) -> StringSpeed {
        let TruePosition { x, y, .. } = self.current.true_position;
        let tangential = self.current.tangential;
        let rate_factor = x * bearing.x + y * bearing.y;

        StringSpeed::new(
            rate_factor / tangential.left,
            (rate_factor - self.config.width() * bearing.x) / tangential.right,
        )
    }

    ///
    /// Inverts the Jacobian: the Cartesian velocity realised by the given
    /// cable rates at the current point.
    ///
    /// # Returns:
    /// - The velocity of the tracked point
    /// - `GeometryError::Degenerate` where the Jacobian is singular
    ///
    pub fn grid_speed(&self, speed: StringSpeed) -> Result<GridSpeed, GeometryError> {
        let inverse = self.jacobian().try_inverse().ok_or(GeometryError::Degenerate)?;
        let velocity = inverse * Vector2::new(speed.left, speed.right);

        Ok(GridSpeed::new(velocity.x, velocity.y))
    }
}
