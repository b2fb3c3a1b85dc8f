use std::io;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, trace};

/// How long a drain pass waits for bytes already in flight. Kept near zero so
/// `read_available_lines` never stalls on a silent firmware.
const DRAIN_DEADLINE: Duration = Duration::from_millis(2);

/// A line-oriented duplex channel to motion firmware.
#[async_trait]
pub trait LineChannel: Send {
    /// Writes one command line, appending the newline terminator.
    async fn write_line(&mut self, line: &str) -> io::Result<()>;

    /// Returns every complete line already buffered on the channel, trimmed,
    /// without blocking for data that has not arrived yet.
    async fn read_available_lines(&mut self) -> io::Result<Vec<String>>;
}

pub struct SerialLineChannel {
    stream: SerialStream,
    pending: Vec<u8>,
}

impl SerialLineChannel {
    pub fn open(port: &str, baud_rate: u32) -> io::Result<Self> {
        let stream = tokio_serial::new(port, baud_rate)
            .timeout(DRAIN_DEADLINE)
            .open_native_async()
            .map_err(io::Error::other)?;

        debug!("Opened serial port {} at {} baud", port, baud_rate);

        Ok(Self {
            stream,
            pending: Vec::new(),
        })
    }
}

#[async_trait]
impl LineChannel for SerialLineChannel {
    async fn write_line(&mut self, line: &str) -> io::Result<()> {
        trace!("TX: {}", line);
        self.stream.write_all(format!("{}\n", line).as_bytes()).await?;
        self.stream.flush().await
    }

    async fn read_available_lines(&mut self) -> io::Result<Vec<String>> {
        let mut buf = [0u8; 512];

        loop {
            match tokio::time::timeout(DRAIN_DEADLINE, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => self.pending.extend_from_slice(&buf[..n]),
                Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => break,
                Ok(Err(e)) => return Err(e),
                // No more bytes within the drain deadline.
                Err(_) => break,
            }
        }

        let lines = take_complete_lines(&mut self.pending);
        for line in &lines {
            trace!("RX: {}", line);
        }

        Ok(lines)
    }
}

/// Splits complete lines off the front of `pending`, leaving any trailing
/// partial line in the buffer until the rest of it arrives.
fn take_complete_lines(pending: &mut Vec<u8>) -> Vec<String> {
    let mut lines = Vec::new();

    while let Some(at) = pending.iter().position(|&b| b == b'\n') {
        let raw: Vec<u8> = pending.drain(..=at).collect();
        let line = String::from_utf8_lossy(&raw).trim().to_string();
        if !line.is_empty() {
            lines.push(line);
        }
    }

    lines
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_lines_are_split_and_trimmed() {
        let mut pending = b"ok\r\nX:1.00 Y:2.00 Z:3.00\n".to_vec();

        let lines = take_complete_lines(&mut pending);

        assert_eq!(lines, vec!["ok", "X:1.00 Y:2.00 Z:3.00"]);
        assert!(pending.is_empty());
    }

    #[test]
    fn partial_line_stays_buffered() {
        let mut pending = b"ok\nX:1.0".to_vec();

        let lines = take_complete_lines(&mut pending);

        assert_eq!(lines, vec!["ok"]);
        assert_eq!(pending, b"X:1.0");
    }

    #[test]
    fn blank_lines_are_dropped() {
        let mut pending = b"\n\nok\n".to_vec();

        assert_eq!(take_complete_lines(&mut pending), vec!["ok"]);
    }
}
