use thiserror::Error;

use crate::position::Axis;

#[derive(Debug, Error)]
pub enum GantryError {
    #[error("not connected to the machine")]
    NotConnected,

    #[error("stage has not been homed; home the gantry before moving")]
    NotHomed,

    #[error("{axis} coordinate {value} is out of range [{min}, {max}]")]
    OutOfRange {
        axis: Axis,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("speed fraction {fraction} is outside (0, 1] of the maximum feed rate {max_feed_rate} mm/min")]
    InvalidSpeed { fraction: f64, max_feed_rate: u32 },

    #[error("no parsable position report after {attempts} queries")]
    ProtocolParse { attempts: u32 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
