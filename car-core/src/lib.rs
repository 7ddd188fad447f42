//! Core motor control and REST dispatch for an L298N-driven Raspberry Pi car.
//!
//! The hardware binary lives in `car-app/pi-car`.

pub mod utils;
