//!
//! Conversions between the coordinate representations of the positioner.
//!
//! Every function is pure. The ones that can be asked for a physically
//! impossible configuration return a `GeometryError` instead of a NaN.
//!

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::hardware::MachineConfig;
use crate::hardware::error::{GeometryError, Side};
use crate::lengths::*;

fn check_lengths<K>(pair: &StringPair<K>) -> Result<(), GeometryError> {
    if !pair.is_finite() || pair.left < 0. || pair.right < 0. {
        return Err(GeometryError::NegativeLength { left: pair.left, right: pair.right });
    }

    Ok(())
}

///
/// Converts tangential lengths into radial lengths, closing the right triangle
/// formed with the spool radius.
///
/// # Parameters:
/// - `tangential`: The distance from each tangent point to the tracked point
/// - `config`: The machine constants
///
/// # Returns:
/// - The distance from each spool axis to the tracked point
/// - A `GeometryError` if a length is negative or not finite
///
pub fn radial_from_tangential(tangential: Tangential, config: &MachineConfig) -> Result<Radial, GeometryError> {
    check_lengths(&tangential)?;
    let radius = config.spool_radius();

    Ok(Radial::new(tangential.left.hypot(radius), tangential.right.hypot(radius)))
}

///
/// Converts radial lengths into tangential lengths.
///
/// # Returns:
/// - The distance from each tangent point to the tracked point
/// - `GeometryError::InsideSpool` if either radial is shorter than the spool radius
///
pub fn tangential_from_radial(radial: Radial, config: &MachineConfig) -> Result<Tangential, GeometryError> {
    check_lengths(&radial)?;
    let radius = config.spool_radius();

    for (side, value) in [(Side::Left, radial.left), (Side::Right, radial.right)] {
        if value < radius {
            return Err(GeometryError::InsideSpool { side, radial: value, radius });
        }
    }

    Ok(Tangential::new(
        f64::sqrt(f64::powi(radial.left, 2) - f64::powi(radius, 2)),
        f64::sqrt(f64::powi(radial.right, 2) - f64::powi(radius, 2)),
    ))
}

///
/// Converts a baseline-relative point into radial lengths. The point may be
/// anywhere in the plane, so this never fails.
///
pub fn radial_from_true_position(position: TruePosition, config: &MachineConfig) -> Radial {
    let left = f64::sqrt(f64::powi(position.x, 2) + f64::powi(position.y, 2));
    let right = f64::sqrt(f64::powi(config.width() - position.x, 2) + f64::powi(position.y, 2));

    Radial::new(left, right)
}

///
/// Uses Heron's formula to find the height of the triangle formed by the two
/// radial lengths and the baseline, which is the vertical distance of the
/// tracked point from the spool axes.
///
/// # Returns:
/// - The height, in inches. Zero when the point lies on the baseline
/// - `GeometryError::TriangleInequality` when the three sides cannot meet
///
pub fn find_offset(radial: Radial, config: &MachineConfig) -> Result<f64, GeometryError> {
    check_lengths(&radial)?;
    let width = config.width();

    let semi_perimeter = (radial.left + radial.right + width) / 2.;
    let factors = [semi_perimeter - radial.left, semi_perimeter - radial.right, semi_perimeter - width];

    if factors.iter().any(|factor| *factor < 0.) {
        return Err(GeometryError::TriangleInequality { left: radial.left, right: radial.right, width });
    }

    let area = f64::sqrt(semi_perimeter * factors[0] * factors[1] * factors[2]);
    Ok(2. * area / width)
}

///
/// Converts radial lengths into a baseline-relative point. The horizontal
/// component comes from the law of cosines, which agrees with
/// `sqrt(left² - offset²)` for every point right of the left axis and keeps its
/// sign for points beyond it.
///
/// # Returns:
/// - The point, with x from the left spool axis and y down from the baseline
/// - A `GeometryError` if the lengths cannot form a triangle with the baseline
///
pub fn true_position_from_radial(radial: Radial, config: &MachineConfig) -> Result<TruePosition, GeometryError> {
    let offset = find_offset(radial, config)?;
    let width = config.width();
    let x = (f64::powi(width, 2) + f64::powi(radial.left, 2) - f64::powi(radial.right, 2)) / (2. * width);

    Ok(TruePosition::new(x, offset))
}

///
/// Moves a baseline-relative point into the user's frame.
///
pub fn position_from_true(position: TruePosition, origin_offset: f64) -> Position {
    Position::new(position.x, position.y - origin_offset)
}

///
/// Moves a point in the user's frame onto the baseline-relative frame.
///
pub fn true_from_position(position: Position, origin_offset: f64) -> TruePosition {
    TruePosition::new(position.x, position.y + origin_offset)
}

///
/// Computes the physical cable payout for a point: the tangential length plus
/// the arc of cable still wound on the spool past its horizontal tangent.
///
/// Per side, the vertical angle is the angle between the radial line and the
/// vertical, the tangent-radial angle is the angle between the radial line and
/// the spool radius at the departure point. Their difference, subtracted from a
/// right angle, is the extra wrap.
///
/// # Parameters:
/// - `position`: The baseline-relative point
/// - `radial`: The radial lengths to that point
/// - `tangential`: The tangential lengths to that point
/// - `config`: The machine constants
///
/// # Returns:
/// - The total payout per cable
/// - `GeometryError::InsideSpool` if a radial length is inside the spool
///
pub fn total_lengths(position: TruePosition, radial: Radial, tangential: Tangential, config: &MachineConfig) -> Result<TotalLengths, GeometryError> {
    let radius = config.spool_radius();
    for (side, value) in [(Side::Left, radial.left), (Side::Right, radial.right)] {
        if value < radius {
            return Err(GeometryError::InsideSpool { side, radial: value, radius });
        }
    }

    let vertical = Angle::new(
        f64::atan(position.x / position.y),
        f64::atan((config.width() - position.x) / position.y),
    );
    let tangent_radial = Angle::new(f64::acos(radius / radial.left), f64::acos(radius / radial.right));
    let offset = Angle::new(FRAC_PI_2, FRAC_PI_2) - (tangent_radial - vertical);

    let arc = offset.to_arc_length(radius);
    Ok(tangential.cast::<TotalLengthsKind>() + arc.cast())
}

///
/// The worst-case error of `approx_tangential_from_total`, in inches.
///
pub fn approx_inverse_bound(config: &MachineConfig) -> f64 {
    config.spool_radius() * FRAC_PI_4
}

///
/// An APPROXIMATE inverse of `total_lengths`, subtracting a fixed quarter-turn
/// arc from each payout. No closed-form inverse is available, so the result is
/// only good to within `approx_inverse_bound` per cable, for any point more than
/// one spool radius below the baseline. Use it for read-back estimates, never
/// for calibration.
///
pub fn approx_tangential_from_total(total: TotalLengths, config: &MachineConfig) -> Tangential {
    let arc = approx_inverse_bound(config);
    Tangential::new(total.left - arc, total.right - arc)
}

///
/// Converts cable payout into motor steps, rounding to the nearest step.
///
pub fn steps_from_total(total: TotalLengths, config: &MachineConfig) -> Steps {
    let steps_per_inch = config.steps_per_inch();
    Steps::new(
        (total.left * steps_per_inch).round() as i64,
        (total.right * steps_per_inch).round() as i64,
    )
}

///
/// Converts motor steps into cable payout.
///
pub fn total_from_steps(steps: Steps, config: &MachineConfig) -> TotalLengths {
    let steps_per_inch = config.steps_per_inch();
    TotalLengths::new(steps.left as f64 / steps_per_inch, steps.right as f64 / steps_per_inch)
}
