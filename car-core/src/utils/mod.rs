//! Utility re-exports for the Pi car.
//!
//! - `connection`: HTTP router, request dispatch and the JSON envelope
//! - `controllers`: the L298N motor driver abstraction and car state

pub mod connection;
pub mod controllers;

pub use connection::server::run as serve;
pub use controllers::{Car, CarError, GpioPort, SharedCar};
