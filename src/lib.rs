//!
//! Kinematics and trajectory control for a two-cable planar positioner: a point
//! hung from two motor-driven spools on a horizontal baseline, moved in straight
//! lines by paying out cable.
//!

pub mod controller;
pub mod driver;
pub mod hardware;
pub mod kinematics;
pub mod lengths;
