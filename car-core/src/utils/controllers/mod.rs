//! Motor driver abstraction for the Pi car.
//!
//! - `l298n`: one H-bridge channel built from `embedded-hal` output lines.
//! - `motion`: directions, sides and the validated speed type.
//!
//! `Car` owns both channels and the commanded state. It is built once at
//! start-up and shared with the HTTP layer as `SharedCar`.

pub mod l298n;
pub mod motion;
#[cfg(test)]
pub(crate) mod testing;

use std::{
    fmt,
    sync::{Arc, Mutex},
};

pub use l298n::HBridge;
pub use motion::{
    CarState, Direction, MotorState, Side, SpeedPercent, SpeedReading, SpeedTarget,
    DEFAULT_SPEED,
};

/// Car shared between connection tasks. Each command holds the lock for
/// its full duration so direction and duty writes never interleave.
pub type SharedCar = Arc<Mutex<Car>>;

/// Reasons a speed value from a request is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SpeedError {
    #[error("Missing speed parameter")]
    Missing,
    #[error("Invalid speed value")]
    NotAnInteger,
    #[error("Request body must be a JSON object")]
    MalformedBody,
    #[error("Speed must be between 0 and 100")]
    OutOfRange(i64),
}

/// Errors raised by the motor driver.
#[derive(Debug, thiserror::Error)]
pub enum CarError {
    #[error("{0}")]
    InvalidSpeed(SpeedError),
    #[error("Invalid direction: {0:?}")]
    InvalidDirection(String),
    #[error("GPIO unavailable: {0}")]
    HardwareUnavailable(String),
    #[error("GPIO write failed on {motor} {line} line: {reason}")]
    Hardware {
        motor: &'static str,
        line: &'static str,
        reason: String,
    },
}

impl CarError {
    fn shut_down() -> Self {
        CarError::HardwareUnavailable("motor driver has been shut down".into())
    }

    pub(crate) fn line<E: fmt::Debug>(
        motor: &'static str,
        line: &'static str,
        error: E,
    ) -> Self {
        CarError::Hardware {
            motor,
            line,
            reason: format!("{error:?}"),
        }
    }
}

/// Output lines behind a single motor.
///
/// Implemented by [`HBridge`] for any `embedded-hal` pins; tests and the
/// simulator plug in their own lines underneath.
pub trait GpioPort: Send {
    /// Set direction lines and duty. `Stopped` drops both lines and the duty.
    ///
    /// On error the port must be left stopped, never half-applied.
    fn drive(
        &mut self,
        direction: Direction,
        speed: SpeedPercent,
    ) -> Result<(), CarError>;

    /// Change only the duty cycle of a running motor.
    fn set_duty(
        &mut self,
        speed: SpeedPercent,
    ) -> Result<(), CarError>;

    fn coast(&mut self) -> Result<(), CarError> {
        self.drive(Direction::Stopped, SpeedPercent::ZERO)
    }
}

/// Motion commands accepted by [`Car::execute_command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarCommand {
    Forward { speed: Option<i64> },
    Backward { speed: Option<i64> },
    RotateClockwise,
    RotateAnticlockwise,
    Stop,
    SetSpeed { target: SpeedTarget, speed: i64 },
}

impl fmt::Display for CarCommand {
    /// Human readable action reported back to the client.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CarCommand::Forward { .. } => f.write_str("moving forward"),
            CarCommand::Backward { .. } => f.write_str("moving backward"),
            CarCommand::RotateClockwise => f.write_str("rotating clockwise"),
            CarCommand::RotateAnticlockwise => f.write_str("rotating anticlockwise"),
            CarCommand::Stop => f.write_str("stopped"),
            CarCommand::SetSpeed {
                target: SpeedTarget::Both,
                speed,
            } => write!(f, "speed set to {speed}%"),
            CarCommand::SetSpeed {
                target: SpeedTarget::Left,
                speed,
            } => write!(f, "left speed set to {speed}%"),
            CarCommand::SetSpeed {
                target: SpeedTarget::Right,
                speed,
            } => write!(f, "right speed set to {speed}%"),
        }
    }
}

/// The car: two motor channels plus their commanded state.
///
/// Rotation convention: clockwise (seen from above) drives the left side
/// forward and the right side backward.
pub struct Car {
    left: Option<Box<dyn GpioPort>>,
    right: Option<Box<dyn GpioPort>>,
    state: CarState,
}

impl Car {
    /// Take ownership of both channels and force them to a stop.
    pub fn new(
        left: impl GpioPort + 'static,
        right: impl GpioPort + 'static,
    ) -> Result<Self, CarError> {
        let mut car = Car {
            left: Some(Box::new(left)),
            right: Some(Box::new(right)),
            state: CarState::default(),
        };
        car.stop_all()?;
        tracing::info!(default_speed = car.state.default_speed.get(), "motor driver ready");
        Ok(car)
    }

    /// Wrap a car for sharing with the HTTP server.
    pub fn into_shared(self) -> SharedCar {
        Arc::new(Mutex::new(self))
    }

    pub fn state(&self) -> CarState {
        self.state
    }

    /// `true` once [`Car::shutdown`] has released the lines.
    pub fn is_shut_down(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    fn port(
        &mut self,
        side: Side,
    ) -> Result<&mut (dyn GpioPort + 'static), CarError> {
        let port = match side {
            Side::Left => self.left.as_deref_mut(),
            Side::Right => self.right.as_deref_mut(),
        };
        port.ok_or_else(CarError::shut_down)
    }

    fn drive_side(
        &mut self,
        side: Side,
        direction: Direction,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        let result = self.port(side)?.drive(direction, speed);
        let motor = self.state.motor_mut(side);
        motor.speed = speed;
        motor.direction = match result {
            Ok(()) => direction,
            Err(_) => Direction::Stopped,
        };
        result
    }

    /// Drive one motor. `speed` is validated before any pin is touched.
    pub fn set_motor(
        &mut self,
        side: Side,
        direction: Direction,
        speed: i64,
    ) -> Result<(), CarError> {
        let speed = SpeedPercent::new(speed)?;
        self.drive_side(side, direction, speed)
    }

    /// Drive both motors; if either fails the whole car is stopped.
    fn drive_pair(
        &mut self,
        left: Direction,
        right: Direction,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        let result = self
            .drive_side(Side::Left, left, speed)
            .and_then(|()| self.drive_side(Side::Right, right, speed));
        if result.is_err() {
            let _ = self.stop_all();
        }
        result
    }

    fn speed_or_default(
        &self,
        speed: Option<i64>,
    ) -> Result<SpeedPercent, CarError> {
        speed.map_or(Ok(self.state.default_speed), SpeedPercent::new)
    }

    pub fn move_forward(
        &mut self,
        speed: Option<i64>,
    ) -> Result<(), CarError> {
        let speed = self.speed_or_default(speed)?;
        tracing::info!(speed = speed.get(), "forward");
        self.drive_pair(Direction::Forward, Direction::Forward, speed)
    }

    pub fn move_backward(
        &mut self,
        speed: Option<i64>,
    ) -> Result<(), CarError> {
        let speed = self.speed_or_default(speed)?;
        tracing::info!(speed = speed.get(), "backward");
        self.drive_pair(Direction::Backward, Direction::Backward, speed)
    }

    pub fn rotate_clockwise(&mut self) -> Result<(), CarError> {
        let speed = self.state.default_speed;
        tracing::info!(speed = speed.get(), "rotate clockwise");
        self.drive_pair(Direction::Forward, Direction::Backward, speed)
    }

    pub fn rotate_anticlockwise(&mut self) -> Result<(), CarError> {
        let speed = self.state.default_speed;
        tracing::info!(speed = speed.get(), "rotate anticlockwise");
        self.drive_pair(Direction::Backward, Direction::Forward, speed)
    }

    /// Stop both motors. Stored speeds are kept for the next command.
    pub fn stop_all(&mut self) -> Result<(), CarError> {
        let mut first_error = None;
        for side in [Side::Left, Side::Right] {
            let result = self.port(side).and_then(|port| port.coast());
            self.state.motor_mut(side).direction = Direction::Stopped;
            if let Err(error) = result {
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Change speed without touching direction.
    ///
    /// Running motors pick up the new duty immediately; stopped motors keep
    /// a zero duty until the next direction command. `Both` also replaces
    /// the default speed.
    pub fn set_speed(
        &mut self,
        target: SpeedTarget,
        speed: i64,
    ) -> Result<(), CarError> {
        let speed = SpeedPercent::new(speed)?;
        if self.is_shut_down() {
            return Err(CarError::shut_down());
        }
        tracing::info!(
            ?target,
            from = self.state.default_speed.get(),
            to = speed.get(),
            "speed changed"
        );
        for &side in target.sides() {
            let motor = *self.state.motor(side);
            if motor.direction != Direction::Stopped {
                if let Err(error) = self.port(side)?.set_duty(speed) {
                    let _ = self.drive_side(side, Direction::Stopped, motor.speed);
                    return Err(error);
                }
            }
            self.state.motor_mut(side).speed = speed;
        }
        if target == SpeedTarget::Both {
            self.state.default_speed = speed;
        }
        Ok(())
    }

    pub fn get_speed(&self) -> SpeedReading {
        SpeedReading {
            left: self.state.left.speed.get(),
            right: self.state.right.speed.get(),
        }
    }

    /// Run a parsed command.
    pub fn execute_command(
        &mut self,
        command: CarCommand,
    ) -> Result<(), CarError> {
        match command {
            CarCommand::Forward { speed } => self.move_forward(speed),
            CarCommand::Backward { speed } => self.move_backward(speed),
            CarCommand::RotateClockwise => self.rotate_clockwise(),
            CarCommand::RotateAnticlockwise => self.rotate_anticlockwise(),
            CarCommand::Stop => {
                tracing::info!("stop");
                self.stop_all()
            }
            CarCommand::SetSpeed { target, speed } => self.set_speed(target, speed),
        }
    }

    /// Stop both motors and release their lines.
    ///
    /// Only the first call touches the hardware; later calls and the `Drop`
    /// impl are no-ops.
    pub fn shutdown(&mut self) -> Result<(), CarError> {
        if self.is_shut_down() {
            return Ok(());
        }
        let stopped = self.stop_all();
        self.left = None;
        self.right = None;
        match &stopped {
            Ok(()) => tracing::info!("motors stopped, GPIO released"),
            Err(error) => tracing::error!(%error, "GPIO released after failed stop"),
        }
        stopped
    }
}

impl Drop for Car {
    fn drop(&mut self) {
        if !self.is_shut_down() {
            tracing::warn!("car dropped without explicit shutdown");
            let _ = self.shutdown();
        }
    }
}
