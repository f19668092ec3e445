//!
//! Value pairs for every coordinate representation of the positioner.
//!
//! There are two families. A *grid pair* is a Cartesian `(x, y)` in inches, a
//! *string pair* is a per-cable `(left, right)` quantity. Each concrete type is
//! the generic pair tagged with a kind marker, so a `Radial` can never be handed
//! to a function expecting a `Tangential`, while the arithmetic is written once.
//!

use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, Mul, Neg, Sub};

///
/// A marker naming what a pair represents. Only used at the type level and for
/// formatted output.
///
pub trait PairKind {
    const NAME: &'static str;
}

macro_rules! pair_kind {
    ($($(#[$doc:meta])* $kind:ident => $name:literal),* $(,)?) => {
        $(
            $(#[$doc])*
            #[derive(Debug, Clone, Copy, PartialEq)]
            pub enum $kind {}

            impl PairKind for $kind {
                const NAME: &'static str = $name;
            }
        )*
    };
}

pair_kind! {
    /// Target point, relative to the user-calibrated origin
    PositionKind => "Position",
    /// Point relative to the baseline through both spool axes, x from the left axis
    TruePositionKind => "TruePosition",
    /// Cartesian rate of change, inches per second
    GridSpeedKind => "GridSpeed",
    /// Spool axis to point
    RadialKind => "Radial",
    /// Cable tangent point to point
    TangentialKind => "Tangential",
    /// Cable still wound between the horizontal tangent and the departure angle
    ArcLengthKind => "ArcLength",
    /// Intermediate angles, radians
    AngleKind => "Angle",
    /// Physical cable payout commanded to the driver
    TotalLengthsKind => "TotalLengths",
    /// Per-cable rate of change, inches per second
    StringSpeedKind => "StringSpeed",
}

///
/// A Cartesian pair of values, in inches (or inches per second).
///
/// # Fields:
/// - `x`: Horizontal component, growing rightwards
/// - `y`: Vertical component, growing downwards away from the baseline
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridPair<K> {
    pub x: f64,
    pub y: f64,
    kind: PhantomData<K>,
}

///
/// A per-cable pair of values.
///
/// # Fields:
/// - `left`: The quantity for the left spool
/// - `right`: The quantity for the right spool
///
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StringPair<K> {
    pub left: f64,
    pub right: f64,
    kind: PhantomData<K>,
}

pub type Position = GridPair<PositionKind>;
pub type TruePosition = GridPair<TruePositionKind>;
pub type GridSpeed = GridPair<GridSpeedKind>;

pub type Radial = StringPair<RadialKind>;
pub type Tangential = StringPair<TangentialKind>;
pub type ArcLength = StringPair<ArcLengthKind>;
pub type Angle = StringPair<AngleKind>;
pub type TotalLengths = StringPair<TotalLengthsKind>;
pub type StringSpeed = StringPair<StringSpeedKind>;

impl<K> GridPair<K> {
    pub const fn new(x: f64, y: f64) -> Self {
        GridPair { x, y, kind: PhantomData }
    }

    ///
    /// Reinterprets the components as another kind of grid pair. Used where a
    /// conversion is a pure relabelling, e.g. a position delta becoming a speed.
    ///
    pub fn cast<T>(self) -> GridPair<T> {
        GridPair::new(self.x, self.y)
    }

    ///
    /// # Returns:
    /// - The larger of `|x|` and `|y|`
    ///
    pub fn max_abs(&self) -> f64 {
        self.x.abs().max(self.y.abs())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl<K> StringPair<K> {
    pub const fn new(left: f64, right: f64) -> Self {
        StringPair { left, right, kind: PhantomData }
    }

    pub fn cast<T>(self) -> StringPair<T> {
        StringPair::new(self.left, self.right)
    }

    ///
    /// Applies a function to both sides, keeping the kind.
    ///
    pub fn map(self, f: impl Fn(f64) -> f64) -> Self {
        StringPair::new(f(self.left), f(self.right))
    }

    pub fn is_finite(&self) -> bool {
        self.left.is_finite() && self.right.is_finite()
    }

    ///
    /// # Returns:
    /// - The smaller of the two sides
    ///
    pub fn min(&self) -> f64 {
        self.left.min(self.right)
    }
}

impl Angle {
    ///
    /// Converts a pair of angles, in radians, into the arc they subtend on a
    /// spool of the given radius.
    ///
    pub fn to_arc_length(self, radius: f64) -> ArcLength {
        ArcLength::new(self.left * radius, self.right * radius)
    }
}

impl<K> Add for GridPair<K> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        GridPair::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl<K> Sub for GridPair<K> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        GridPair::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl<K> Neg for GridPair<K> {
    type Output = Self;

    fn neg(self) -> Self {
        GridPair::new(-self.x, -self.y)
    }
}

impl<K> Mul<f64> for GridPair<K> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        GridPair::new(self.x * rhs, self.y * rhs)
    }
}

impl<K> Mul<GridPair<K>> for f64 {
    type Output = GridPair<K>;

    fn mul(self, rhs: GridPair<K>) -> GridPair<K> {
        rhs * self
    }
}

impl<K> Add for StringPair<K> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        StringPair::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl<K> Sub for StringPair<K> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        StringPair::new(self.left - rhs.left, self.right - rhs.right)
    }
}

impl<K> Neg for StringPair<K> {
    type Output = Self;

    fn neg(self) -> Self {
        StringPair::new(-self.left, -self.right)
    }
}

impl<K> Mul<f64> for StringPair<K> {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self {
        StringPair::new(self.left * rhs, self.right * rhs)
    }
}

impl<K> Mul<StringPair<K>> for f64 {
    type Output = StringPair<K>;

    fn mul(self, rhs: StringPair<K>) -> StringPair<K> {
        rhs * self
    }
}

impl<K: PairKind> fmt::Display for GridPair<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({:.4}, {:.4})", K::NAME, self.x, self.y)
    }
}

impl<K: PairKind> fmt::Display for StringPair<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: ({:.4}, {:.4})", K::NAME, self.left, self.right)
    }
}

///
/// Integer motor steps per cable, as counted by the motor driver. Both sides
/// count positive for payout; the right motor's opposite winding sense is only
/// applied at the driver boundary.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Steps {
    pub left: i64,
    pub right: i64,
}

impl Steps {
    pub const fn new(left: i64, right: i64) -> Self {
        Steps { left, right }
    }
}

impl Add for Steps {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Steps::new(self.left + rhs.left, self.right + rhs.right)
    }
}

impl Sub for Steps {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Steps::new(self.left - rhs.left, self.right - rhs.right)
    }
}

impl fmt::Display for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Steps: ({}, {})", self.left, self.right)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_arithmetic_is_component_wise() {
        let a = Position::new(1.5, -2.0);
        let b = Position::new(0.5, 4.0);

        assert_eq!(a + b, Position::new(2.0, 2.0));
        assert_eq!(a - b, Position::new(1.0, -6.0));
        assert_eq!(2.0 * a, Position::new(3.0, -4.0));
        assert_eq!(-b, Position::new(-0.5, -4.0));
    }

    #[test]
    fn string_arithmetic_is_component_wise() {
        let a = Radial::new(10.0, 12.0);
        let b = Radial::new(1.0, 2.0);

        assert_eq!(a - b, Radial::new(9.0, 10.0));
        assert_eq!(a + b, Radial::new(11.0, 14.0));
        assert_eq!(a * 0.5, Radial::new(5.0, 6.0));
        assert_eq!(b.map(|v| v * v), Radial::new(1.0, 4.0));
    }

    #[test]
    fn max_abs_picks_dominant_axis() {
        assert_eq!(Position::new(-7.0, 3.0).max_abs(), 7.0);
        assert_eq!(Position::new(1.0, -3.0).max_abs(), 3.0);
    }

    #[test]
    fn angle_to_arc_scales_by_radius() {
        let arc = Angle::new(std::f64::consts::PI, 0.5).to_arc_length(2.0);
        assert_eq!(arc, ArcLength::new(2.0 * std::f64::consts::PI, 1.0));
    }

    #[test]
    fn display_names_the_kind() {
        assert_eq!(Tangential::new(1.0, 2.5).to_string(), "Tangential: (1.0000, 2.5000)");
        assert_eq!(TruePosition::new(0.0, 3.0).to_string(), "TruePosition: (0.0000, 3.0000)");
        assert_eq!(Steps::new(-4, 9).to_string(), "Steps: (-4, 9)");
    }

    #[test]
    fn steps_arithmetic() {
        assert_eq!(Steps::new(10, -3) - Steps::new(4, 4), Steps::new(6, -7));
        assert_eq!(Steps::new(1, 1) + Steps::new(2, 3), Steps::new(3, 4));
    }
}
