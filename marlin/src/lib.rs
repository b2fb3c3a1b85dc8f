pub mod command;
pub mod report;

pub use command::Command;
pub use report::PositionReport;

/// Token the firmware echoes back once every queued move has finished.
pub const MOVE_DONE_TOKEN: &str = "FinishedMoving";
