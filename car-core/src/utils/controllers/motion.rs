//! Motion vocabulary shared by the motor driver and the dispatcher.

use core::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use super::{CarError, SpeedError};

/// Speed used by movement commands until `/speed/set` changes it.
pub const DEFAULT_SPEED: SpeedPercent = SpeedPercent(100);

/// Rotation sense of a single motor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Forward,
    Backward,
    #[default]
    Stopped,
}

impl FromStr for Direction {
    type Err = CarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Direction::Forward),
            "backward" => Ok(Direction::Backward),
            "stop" | "stopped" => Ok(Direction::Stopped),
            _ => Err(CarError::InvalidDirection(s.to_owned())),
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
            Direction::Stopped => "stopped",
        })
    }
}

/// One side of the car. Each side is one L298N channel driving two wheels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Left,
    Right,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Side::Left => "left",
            Side::Right => "right",
        })
    }
}

/// Motors addressed by a speed change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedTarget {
    Both,
    Left,
    Right,
}

impl SpeedTarget {
    pub fn sides(self) -> &'static [Side] {
        match self {
            SpeedTarget::Both => &[Side::Left, Side::Right],
            SpeedTarget::Left => &[Side::Left],
            SpeedTarget::Right => &[Side::Right],
        }
    }
}

/// Motor speed as a percentage of full PWM duty. Always within `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SpeedPercent(u8);

impl SpeedPercent {
    pub const ZERO: SpeedPercent = SpeedPercent(0);
    pub const FULL: SpeedPercent = SpeedPercent(100);

    /// Validate a raw request value.
    pub fn new(percent: i64) -> Result<Self, CarError> {
        if (0..=100).contains(&percent) {
            Ok(SpeedPercent(percent as u8))
        } else {
            Err(CarError::InvalidSpeed(SpeedError::OutOfRange(percent)))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for SpeedPercent {
    type Error = CarError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        SpeedPercent::new(value)
    }
}

impl fmt::Display for SpeedPercent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Commanded state of one motor.
///
/// `speed` is remembered while the motor is stopped, so a later direction
/// command resumes at the same duty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MotorState {
    pub direction: Direction,
    pub speed: SpeedPercent,
}

impl Default for MotorState {
    fn default() -> Self {
        MotorState {
            direction: Direction::Stopped,
            speed: DEFAULT_SPEED,
        }
    }
}

/// Both motors plus the speed used when a command does not carry one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CarState {
    pub left: MotorState,
    pub right: MotorState,
    pub default_speed: SpeedPercent,
}

impl Default for CarState {
    fn default() -> Self {
        CarState {
            left: MotorState::default(),
            right: MotorState::default(),
            default_speed: DEFAULT_SPEED,
        }
    }
}

impl CarState {
    pub fn motor(&self, side: Side) -> &MotorState {
        match side {
            Side::Left => &self.left,
            Side::Right => &self.right,
        }
    }

    pub fn motor_mut(&mut self, side: Side) -> &mut MotorState {
        match side {
            Side::Left => &mut self.left,
            Side::Right => &mut self.right,
        }
    }
}

/// Speeds reported by `/speed/get`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpeedReading {
    pub left: u8,
    pub right: u8,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn speed_percent_bounds() {
        assert_eq!(SpeedPercent::new(0).unwrap().get(), 0);
        assert_eq!(SpeedPercent::new(100).unwrap().get(), 100);
        assert!(matches!(
            SpeedPercent::new(101),
            Err(CarError::InvalidSpeed(SpeedError::OutOfRange(101)))
        ));
        assert!(matches!(
            SpeedPercent::try_from(-1),
            Err(CarError::InvalidSpeed(SpeedError::OutOfRange(-1)))
        ));
    }

    #[test]
    fn direction_parses_case_insensitively() {
        assert_eq!("Forward".parse::<Direction>().unwrap(), Direction::Forward);
        assert_eq!(" backward ".parse::<Direction>().unwrap(), Direction::Backward);
        assert_eq!("stop".parse::<Direction>().unwrap(), Direction::Stopped);
        assert!(matches!(
            "sideways".parse::<Direction>(),
            Err(CarError::InvalidDirection(d)) if d == "sideways"
        ));
    }

    #[test]
    fn speed_target_sides() {
        assert_eq!(SpeedTarget::Both.sides(), &[Side::Left, Side::Right]);
        assert_eq!(SpeedTarget::Right.sides(), &[Side::Right]);
    }

    #[test]
    fn state_serializes_speeds_as_numbers() {
        let json = serde_json::to_value(CarState::default()).unwrap();
        assert_eq!(json["default_speed"], 100);
        assert_eq!(json["left"]["direction"], "stopped");
    }
}
