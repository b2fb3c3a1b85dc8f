use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReportError {
    #[error("line does not carry a position report")]
    NotAReport,

    #[error("missing {axis} field in position report")]
    MissingAxis { axis: char },

    #[error("malformed {axis} value {value:?} in position report")]
    BadValue { axis: char, value: String },
}

/// Parsed `M114` response line, e.g.
/// `X:12.00 Y:5.25 Z:0.40 E:0.00 Count X:960 Y:420 Z:160`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionReport {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl PositionReport {
    pub fn parse(line: &str) -> Result<Self, ReportError> {
        if !line.starts_with("X:") {
            return Err(ReportError::NotAReport);
        }

        Ok(Self {
            x: field(line, 'X')?,
            y: field(line, 'Y')?,
            z: field(line, 'Z')?,
        })
    }
}

/// Extracts the value between the first `<axis>:` marker and the next field
/// separator. Later `Count` fields reuse the axis letters, so only the first
/// occurrence counts.
fn field(line: &str, axis: char) -> Result<f64, ReportError> {
    let marker = format!("{}:", axis);
    let start = line
        .find(&marker)
        .ok_or(ReportError::MissingAxis { axis })?
        + marker.len();

    let token = line[start..].split_whitespace().next().unwrap_or("");

    token.parse().map_err(|_| ReportError::BadValue {
        axis,
        value: token.to_string(),
    })
}

/// Bare acknowledgement lines the firmware interleaves with real replies.
pub fn is_ack(line: &str) -> bool {
    line == "ok"
}

/// Matches the `echo:<token>` reply produced by an `M118 E1` request.
pub fn is_echo(line: &str, token: &str) -> bool {
    line.strip_prefix("echo:")
        .is_some_and(|rest| rest.trim() == token)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_report_with_trailing_fields() {
        let line = "X:12.00 Y:5.25 Z:0.40 E:0.00 Count X:960 Y:420 Z:160";

        let report = PositionReport::parse(line).unwrap();

        assert_eq!(
            report,
            PositionReport {
                x: 12.0,
                y: 5.25,
                z: 0.4
            }
        );
    }

    #[test]
    fn rejects_lines_that_are_not_reports() {
        assert_eq!(PositionReport::parse("ok"), Err(ReportError::NotAReport));
        assert_eq!(
            PositionReport::parse("echo:busy: processing"),
            Err(ReportError::NotAReport)
        );
    }

    #[test]
    fn missing_axis_is_reported() {
        assert_eq!(
            PositionReport::parse("X:1.0 Y:2.0"),
            Err(ReportError::MissingAxis { axis: 'Z' })
        );
    }

    #[test]
    fn malformed_value_is_reported() {
        assert!(matches!(
            PositionReport::parse("X:abc Y:2.0 Z:3.0"),
            Err(ReportError::BadValue { axis: 'X', .. })
        ));
    }

    #[test]
    fn ack_lines_are_classified() {
        assert!(is_ack("ok"));
        assert!(!is_ack("X:0.00 Y:0.00 Z:0.00"));
    }

    #[test]
    fn echo_lines_match_their_token() {
        assert!(is_echo("echo:FinishedMoving", "FinishedMoving"));
        assert!(!is_echo("echo:busy: processing", "FinishedMoving"));
        assert!(!is_echo("FinishedMoving", "FinishedMoving"));
    }
}
