use std::time::Instant;

use marlin::{Command, MOVE_DONE_TOKEN, PositionReport, report};
use tracing::{debug, info, warn};
use utilities::line_channel::{LineChannel, SerialLineChannel};

use crate::{
    config::MachineConfig,
    error::GantryError,
    position::{Axis, Position},
};

/// Per-axis absolute target; `None` keeps the current value of that axis.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MoveTarget {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

impl MoveTarget {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x: Some(x),
            y: Some(y),
            z: Some(z),
        }
    }

    pub fn x(value: f64) -> Self {
        Self {
            x: Some(value),
            ..Self::default()
        }
    }

    pub fn y(value: f64) -> Self {
        Self {
            y: Some(value),
            ..Self::default()
        }
    }

    pub fn z(value: f64) -> Self {
        Self {
            z: Some(value),
            ..Self::default()
        }
    }
}

impl From<Position> for MoveTarget {
    fn from(position: Position) -> Self {
        Self::new(position.x, position.y, position.z)
    }
}

/// Options applied to a single `move_to`/`move_relative` call.
#[derive(Debug, Clone, Copy, Default)]
pub struct MoveOptions {
    /// Raise-move-lower collision avoidance; `None` uses the machine
    /// profile's default.
    pub zhop: Option<bool>,

    /// One-shot feed rate override in mm/min.
    pub feed_rate: Option<u32>,
}

/// Outcome of a confirmed-completion move. `NotReached` means the firmware
/// never confirmed arrival within the timeout; callers decide whether to
/// retry or re-home.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum MoveOutcome {
    Reached,
    NotReached,
}

impl MoveOutcome {
    pub fn reached(self) -> bool {
        matches!(self, MoveOutcome::Reached)
    }
}

pub struct Gantry<C> {
    channel: Option<C>,
    config: MachineConfig,
    position: Option<Position>,
    target: Option<Position>,
    speed_fraction: f64,
    in_motion: bool,
}

impl Gantry<SerialLineChannel> {
    /// Opens the serial port and connects to the machine behind it.
    pub async fn open(port: &str, config: MachineConfig) -> Result<Self, GantryError> {
        let channel = SerialLineChannel::open(port, config.baud_rate)?;
        Self::connect(channel, config).await
    }
}

impl<C: LineChannel> Gantry<C> {
    /// Connects over an already-opened channel and takes the machine's first
    /// position report. A report equal to the power-on default (every axis at
    /// its maximum) is not a real position and is discarded as unknown.
    pub async fn connect(channel: C, config: MachineConfig) -> Result<Self, GantryError> {
        let mut gantry = Self {
            channel: Some(channel),
            config,
            position: None,
            target: None,
            speed_fraction: 1.0,
            in_motion: false,
        };

        gantry.update().await?;

        if gantry.position == Some(gantry.config.limits.power_on_report()) {
            debug!("Machine reports its power-on position; treating the stage as unhomed");
            gantry.position = None;
        }

        info!("Connected");
        Ok(gantry)
    }

    /// Releases the transport. Later operations fail with `NotConnected`.
    pub fn disconnect(&mut self) {
        self.channel = None;
        info!("Disconnected");
    }

    pub fn is_connected(&self) -> bool {
        self.channel.is_some()
    }

    pub fn position(&self) -> Option<Position> {
        self.position
    }

    pub fn is_homed(&self) -> bool {
        self.position.is_some()
    }

    pub fn is_moving(&self) -> bool {
        self.in_motion
    }

    pub fn config(&self) -> &MachineConfig {
        &self.config
    }

    /// Current speed as a fraction of the maximum feed rate.
    pub fn speed(&self) -> f64 {
        self.speed_fraction
    }

    /// Commanded feed rate in mm/min.
    pub fn feed_rate(&self) -> u32 {
        (self.speed_fraction * self.config.max_feed_rate as f64) as u32
    }

    /// Sets the speed fraction and immediately pushes the matching feed rate
    /// to the firmware.
    pub async fn set_speed(&mut self, fraction: f64) -> Result<(), GantryError> {
        if !(fraction > 0.0 && fraction <= 1.0) {
            return Err(GantryError::InvalidSpeed {
                fraction,
                max_feed_rate: self.config.max_feed_rate,
            });
        }

        self.speed_fraction = fraction;
        let feed_rate = self.feed_rate();
        self.exchange(Command::SetFeedRate { feed_rate }).await?;

        debug!("Feed rate set to {} mm/min", feed_rate);
        Ok(())
    }

    /// Sets the speed as an absolute feed rate in mm/min.
    pub async fn set_feed_rate(&mut self, feed_rate: f64) -> Result<(), GantryError> {
        let fraction = feed_rate / self.config.max_feed_rate as f64;

        if !(feed_rate > 0.0 && feed_rate <= self.config.max_feed_rate as f64) {
            return Err(GantryError::InvalidSpeed {
                fraction,
                max_feed_rate: self.config.max_feed_rate,
            });
        }

        self.set_speed(fraction).await
    }

    pub async fn enable_steppers(&mut self) -> Result<(), GantryError> {
        self.exchange(Command::EnableSteppers).await?;
        Ok(())
    }

    pub async fn disable_steppers(&mut self) -> Result<(), GantryError> {
        self.exchange(Command::DisableSteppers).await?;
        Ok(())
    }

    /// Homes all axes, then adopts the machine's post-home report as ground
    /// truth. The only operation allowed while the position is unknown.
    ///
    /// Homing takes tens of seconds and the firmware answers position queries
    /// with busy lines until it finishes, so the wait for the post-home
    /// report runs on its own wall-clock deadline. Each query attempt inside
    /// it is still bounded by the parse retry budget.
    pub async fn home(&mut self) -> Result<(), GantryError> {
        info!("Homing all axes");
        self.exchange(Command::HomeAll).await?;

        let deadline = Instant::now() + self.config.homing_timeout();
        loop {
            match self.update().await {
                Ok(()) => {
                    self.in_motion = false;
                    return Ok(());
                }
                Err(GantryError::ProtocolParse { .. }) if Instant::now() < deadline => {}
                Err(e) => return Err(e),
            }
        }
    }

    /// Re-queries the firmware for its position. The query is re-sent a
    /// bounded number of times before giving up with `ProtocolParse`.
    pub async fn update(&mut self) -> Result<(), GantryError> {
        let retries = self.config.query_retries;

        for _ in 0..retries {
            let lines = self.exchange(Command::ReportPosition).await?;
            for line in lines {
                if let Ok(report) = PositionReport::parse(&line) {
                    self.position = Some(Position::new(report.x, report.y, report.z));
                    return Ok(());
                }
            }
        }

        warn!("No parsable position report after {} queries", retries);
        Err(GantryError::ProtocolParse { attempts: retries })
    }

    /// Resolves `None` coordinates to the current axis value and checks the
    /// result against the travel limits. Pure precondition check; no I/O.
    pub fn premove(&self, target: MoveTarget) -> Result<Position, GantryError> {
        let current = self.position.ok_or(GantryError::NotHomed)?;

        let resolved = Position::new(
            target.x.unwrap_or(current.x),
            target.y.unwrap_or(current.y),
            target.z.unwrap_or(current.z),
        );

        for axis in [Axis::X, Axis::Y, Axis::Z] {
            let limits = self.config.limits.axis(axis);
            let value = resolved.axis(axis);
            if !limits.contains(value) {
                return Err(GantryError::OutOfRange {
                    axis,
                    value,
                    min: limits.min,
                    max: limits.max,
                });
            }
        }

        Ok(resolved)
    }

    /// Moves to an absolute target, optionally hopping the z axis above both
    /// endpoints so the head clears anything standing in the work area.
    pub async fn move_to(
        &mut self,
        target: MoveTarget,
        options: MoveOptions,
    ) -> Result<MoveOutcome, GantryError> {
        let resolved = self.premove(target)?;
        let current = self.position.ok_or(GantryError::NotHomed)?;
        let feed_rate = self.resolve_feed_rate(options.feed_rate)?;

        let mut zhop = options.zhop.unwrap_or(self.config.zhop_default);
        if resolved.x == current.x && resolved.y == current.y {
            // No lateral travel, nothing to clear.
            zhop = false;
        }

        if !zhop {
            return self.move_direct(resolved, feed_rate).await;
        }

        let ceiling =
            (current.z.max(resolved.z) + self.config.zhop_height).min(self.config.limits.z.max);
        debug!("Z-hop via ceiling {:.3}", ceiling);

        for leg in [
            Position::new(current.x, current.y, ceiling),
            Position::new(resolved.x, resolved.y, ceiling),
            resolved,
        ] {
            let leg = self.premove(MoveTarget::from(leg))?;
            let outcome = self.move_direct(leg, feed_rate).await?;
            if !outcome.reached() {
                warn!("Aborting z-hop sequence; leg to {:?} was not confirmed", leg);
                return Ok(MoveOutcome::NotReached);
            }
        }

        Ok(MoveOutcome::Reached)
    }

    /// Moves by an offset from the current position.
    pub async fn move_relative(
        &mut self,
        dx: f64,
        dy: f64,
        dz: f64,
        options: MoveOptions,
    ) -> Result<MoveOutcome, GantryError> {
        let current = self.position.ok_or(GantryError::NotHomed)?;

        self.move_to(
            MoveTarget::new(current.x + dx, current.y + dy, current.z + dz),
            options,
        )
        .await
    }

    fn resolve_feed_rate(&self, feed_override: Option<u32>) -> Result<u32, GantryError> {
        match feed_override {
            None => Ok(self.feed_rate()),
            Some(feed) if feed == 0 || feed > self.config.max_feed_rate => {
                Err(GantryError::InvalidSpeed {
                    fraction: feed as f64 / self.config.max_feed_rate as f64,
                    max_feed_rate: self.config.max_feed_rate,
                })
            }
            Some(feed) => Ok(feed),
        }
    }

    /// Issues one primitive linear move and blocks until the firmware
    /// confirms completion or the timeout elapses.
    async fn move_direct(
        &mut self,
        target: Position,
        feed_rate: u32,
    ) -> Result<MoveOutcome, GantryError> {
        if self.position == Some(target) {
            // Already there, nothing to send.
            return Ok(MoveOutcome::Reached);
        }

        self.target = Some(target);
        debug!(
            "Moving to X{} Y{} Z{} at F{}",
            target.x, target.y, target.z, feed_rate
        );
        self.exchange(Command::LinearMove {
            x: target.x,
            y: target.y,
            z: target.z,
            feed_rate,
        })
        .await?;

        self.wait_for_completion().await
    }

    /// Requests a completion echo from the firmware and polls until the
    /// refreshed position lands within tolerance of the target, or the
    /// per-move timeout elapses.
    async fn wait_for_completion(&mut self) -> Result<MoveOutcome, GantryError> {
        self.in_motion = true;
        let timeout = self.config.move_timeout();
        let interval = self.config.polling_interval();
        let tolerance = self.config.position_tolerance;

        {
            let channel = self.channel()?;
            channel.write_line(&Command::FinishMoves.to_string()).await?;
            channel
                .write_line(
                    &Command::Echo {
                        token: MOVE_DONE_TOKEN.to_string(),
                    }
                    .to_string(),
                )
                .await?;
        }

        let start = Instant::now();
        let mut reached = false;

        'poll: while start.elapsed() < timeout {
            tokio::time::sleep(interval).await;

            let lines = self.channel()?.read_available_lines().await?;
            for line in lines {
                if report::is_echo(&line, MOVE_DONE_TOKEN) {
                    self.update().await?;
                    if let (Some(position), Some(target)) = (self.position, self.target) {
                        if position.distance_to(&target) < tolerance {
                            reached = true;
                            break 'poll;
                        }
                    }
                }
            }
        }

        self.in_motion = !reached;
        self.update().await?;

        if reached {
            Ok(MoveOutcome::Reached)
        } else {
            warn!("Move not confirmed within {:?}", timeout);
            Ok(MoveOutcome::NotReached)
        }
    }

    /// Sends one command, waits the settle delay, and drains whatever the
    /// firmware has answered so far. Bare `ok` acknowledgements are dropped.
    async fn exchange(&mut self, command: Command) -> Result<Vec<String>, GantryError> {
        let interval = self.config.polling_interval();

        let channel = self.channel()?;
        channel.write_line(&command.to_string()).await?;
        tokio::time::sleep(interval).await;
        let lines = channel.read_available_lines().await?;

        Ok(lines.into_iter().filter(|line| !report::is_ack(line)).collect())
    }

    fn channel(&mut self) -> Result<&mut C, GantryError> {
        self.channel.as_mut().ok_or(GantryError::NotConnected)
    }
}
