use std::fmt;

use thiserror::Error;

///
/// Which spool a per-cable quantity belongs to.
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Left => write!(f, "left"),
            Side::Right => write!(f, "right"),
        }
    }
}

///
/// All errors emitted by the geometry conversions. Each one means the requested
/// lengths or point cannot physically exist with the configured spools; none of
/// them are ever clamped away.
///
/// - `TriangleInequality`: Two radial lengths and the baseline cannot form a triangle
///     Parameters:
///     - `left`, `right`: The radial lengths, in inches
///     - `width`: The baseline width, in inches
/// - `InsideSpool`: A radial length is not longer than the spool radius, so no straight cable run exists
///     Parameters:
///     - `side`: The offending cable
///     - `radial`: The radial length
///     - `radius`: The spool radius
/// - `NegativeLength`: A length was negative or not a finite number
/// - `Degenerate`: The point lies on the baseline, where height and the velocity Jacobian vanish
///
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("Cable lengths {:.4} and {:.4} cannot meet across a {:.4} inch baseline.", .left, .right, .width)]
    TriangleInequality { left: f64, right: f64, width: f64 },

    #[error("The {} radial length {:.4} is inside the spool radius {:.4}.", .side, .radial, .radius)]
    InsideSpool { side: Side, radial: f64, radius: f64 },

    #[error("Lengths must be finite and non-negative, got ({}, {}).", .left, .right)]
    NegativeLength { left: f64, right: f64 },

    #[error("The point lies on the baseline between the spools.")]
    Degenerate,
}

///
/// All errors emitted while loading or validating a machine configuration.
///
/// - `Parse`: The configuration was not valid JSON, or had unknown fields
/// - `Io`: The configuration file could not be read
/// - `Invalid`: A field holds a physically meaningless value
///     Parameters:
///     - `field`: The field name
///     - `reason`: What was wrong with it
///
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Could not parse the machine configuration: {}", .0)]
    Parse(#[from] serde_json::Error),

    #[error("Could not read the machine configuration at {}: {}", .path, .source)]
    Io { path: String, source: std::io::Error },

    #[error("Invalid machine configuration field `{}`: {}", .field, .reason)]
    Invalid { field: &'static str, reason: String },
}
