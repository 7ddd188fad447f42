//! Output lines behind the two H-bridge channels.
//!
//! `open_board` claims the Raspberry Pi pins through `rppal`; `simulated`
//! builds lines that only log, for running the server off-board.

use std::{convert::Infallible, fmt};

use car_core::utils::{CarError, controllers::HBridge};
use embedded_hal::{
    digital::{self, OutputPin},
    pwm::{self, SetDutyCycle},
};
use rppal::gpio::{self as rpi, Gpio};

use crate::pins;

/// Direction line on a Raspberry Pi GPIO pin.
pub struct PiLine(rpi::OutputPin);

impl digital::ErrorType for PiLine {
    type Error = Infallible;
}

impl OutputPin for PiLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low();
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high();
        Ok(())
    }
}

/// Software PWM could not be reprogrammed.
#[derive(Debug)]
pub struct PwmFault(rpi::Error);

impl fmt::Display for PwmFault {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "software PWM: {}", self.0)
    }
}

impl std::error::Error for PwmFault {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.0)
    }
}

impl pwm::Error for PwmFault {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

/// Software PWM on an enable pin. Duty is expressed directly in percent.
pub struct PiPwm {
    pin: rpi::OutputPin,
    frequency: f64,
}

impl pwm::ErrorType for PiPwm {
    type Error = PwmFault;
}

impl SetDutyCycle for PiPwm {
    fn max_duty_cycle(&self) -> u16 {
        100
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        self.pin
            .set_pwm_frequency(self.frequency, f64::from(duty) / 100.0)
            .map_err(PwmFault)
    }
}

impl Drop for PiPwm {
    fn drop(&mut self) {
        if let Err(error) = self.pin.clear_pwm() {
            tracing::warn!(?error, "failed to stop software PWM");
        }
    }
}

pub type PiBridge = HBridge<PiLine, PiLine, PiPwm>;

fn unavailable(error: rpi::Error) -> CarError {
    CarError::HardwareUnavailable(error.to_string())
}

/// Claim the L298N pins, all driven low. Pins are reset when dropped.
pub fn open_board(pwm_frequency: f64) -> Result<(PiBridge, PiBridge), CarError> {
    let gpio = Gpio::new().map_err(unavailable)?;
    let output = |bcm: u8| -> Result<rpi::OutputPin, CarError> {
        Ok(gpio.get(bcm).map_err(unavailable)?.into_output_low())
    };
    let pwm = |bcm: u8| -> Result<PiPwm, CarError> {
        Ok(PiPwm {
            pin: output(bcm)?,
            frequency: pwm_frequency,
        })
    };

    let left = HBridge::new(
        "left",
        PiLine(output(pins::LEFT_FORWARD)?),
        PiLine(output(pins::LEFT_BACKWARD)?),
        pwm(pins::LEFT_ENABLE)?,
    );
    let right = HBridge::new(
        "right",
        PiLine(output(pins::RIGHT_FORWARD)?),
        PiLine(output(pins::RIGHT_BACKWARD)?),
        pwm(pins::RIGHT_ENABLE)?,
    );
    tracing::info!(pwm_frequency, "GPIO initialised");
    Ok((left, right))
}

/// Direction line that logs its level.
pub struct LoggedLine(&'static str);

impl digital::ErrorType for LoggedLine {
    type Error = Infallible;
}

impl OutputPin for LoggedLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        tracing::info!(line = self.0, "LOW");
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        tracing::info!(line = self.0, "HIGH");
        Ok(())
    }
}

/// Enable line that logs its duty.
pub struct LoggedPwm(&'static str);

impl pwm::ErrorType for LoggedPwm {
    type Error = Infallible;
}

impl SetDutyCycle for LoggedPwm {
    fn max_duty_cycle(&self) -> u16 {
        100
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        tracing::info!(line = self.0, duty, "PWM");
        Ok(())
    }
}

pub type SimBridge = HBridge<LoggedLine, LoggedLine, LoggedPwm>;

pub fn simulated() -> (SimBridge, SimBridge) {
    tracing::warn!("simulation mode, no GPIO is driven");
    (
        HBridge::new(
            "left",
            LoggedLine("IN1"),
            LoggedLine("IN2"),
            LoggedPwm("ENA"),
        ),
        HBridge::new(
            "right",
            LoggedLine("IN3"),
            LoggedLine("IN4"),
            LoggedPwm("ENB"),
        ),
    )
}
