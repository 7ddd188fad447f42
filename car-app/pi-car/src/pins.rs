//! BCM pin numbers for the L298N wiring.

/// Left wheels: IN1, IN2, ENA.
pub const LEFT_FORWARD: u8 = 23;
pub const LEFT_BACKWARD: u8 = 24;
pub const LEFT_ENABLE: u8 = 5;

/// Right wheels: IN3, IN4, ENB.
pub const RIGHT_FORWARD: u8 = 22;
pub const RIGHT_BACKWARD: u8 = 27;
pub const RIGHT_ENABLE: u8 = 6;

/// Software PWM frequency on the enable pins.
pub const PWM_FREQUENCY_HZ: f64 = 1000.0;
