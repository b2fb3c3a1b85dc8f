pub mod config;
pub mod controller;
pub mod error;
pub mod logging;
pub mod position;

pub use config::MachineConfig;
pub use controller::{Gantry, MoveOptions, MoveOutcome, MoveTarget};
pub use error::GantryError;
pub use position::{Axis, AxisLimits, Limits, Position};
