use std::fmt;

/// G-code commands understood by Marlin-family motion firmware. Each value
/// renders as exactly one protocol line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `G0` linear move with an explicit feed rate in mm/min.
    LinearMove {
        x: f64,
        y: f64,
        z: f64,
        feed_rate: u32,
    },
    /// `G1 F` feed rate change without motion.
    SetFeedRate { feed_rate: u32 },
    /// `G28` home all axes.
    HomeAll,
    /// `M114` report the current position.
    ReportPosition,
    /// `M400` wait until the planner queue is empty.
    FinishMoves,
    /// `M118 E1` echo a token back over the serial link.
    Echo { token: String },
    /// `M17` energize the steppers.
    EnableSteppers,
    /// `M18` release the steppers.
    DisableSteppers,
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::LinearMove { x, y, z, feed_rate } => {
                write!(f, "G0 X{} Y{} Z{} F{}", x, y, z, feed_rate)
            }
            Command::SetFeedRate { feed_rate } => write!(f, "G1 F{}", feed_rate),
            Command::HomeAll => write!(f, "G28 X Y Z"),
            Command::ReportPosition => write!(f, "M114"),
            Command::FinishMoves => write!(f, "M400"),
            Command::Echo { token } => write!(f, "M118 E1 {}", token),
            Command::EnableSteppers => write!(f, "M17"),
            Command::DisableSteppers => write!(f, "M18"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_move_renders_all_axes_and_feed() {
        let command = Command::LinearMove {
            x: 50.0,
            y: 50.5,
            z: 0.0,
            feed_rate: 8000,
        };

        assert_eq!(command.to_string(), "G0 X50 Y50.5 Z0 F8000");
    }

    #[test]
    fn set_feed_rate_renders_g1() {
        let command = Command::SetFeedRate { feed_rate: 10000 };

        assert_eq!(command.to_string(), "G1 F10000");
    }

    #[test]
    fn echo_carries_the_token() {
        let command = Command::Echo {
            token: "FinishedMoving".to_string(),
        };

        assert_eq!(command.to_string(), "M118 E1 FinishedMoving");
    }

    #[test]
    fn fixed_commands_render_expected_lines() {
        assert_eq!(Command::HomeAll.to_string(), "G28 X Y Z");
        assert_eq!(Command::ReportPosition.to_string(), "M114");
        assert_eq!(Command::FinishMoves.to_string(), "M400");
        assert_eq!(Command::EnableSteppers.to_string(), "M17");
        assert_eq!(Command::DisableSteppers.to_string(), "M18");
    }
}
