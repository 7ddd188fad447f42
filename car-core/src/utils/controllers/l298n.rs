//! One channel of an L298N dual H-bridge.
//!
//! | IN1 | IN2 | EN  | Motor                          |
//! |-----|-----|-----|--------------------------------|
//! | 1   | 0   | PWM | Forward (speed = duty cycle)   |
//! | 0   | 1   | PWM | Backward (speed = duty cycle)  |
//! | 0   | 0   | 0   | Stopped (free-running)         |
//!
//! IN1 and IN2 are never driven high together; both are pulled low before
//! the new direction line is raised.

use embedded_hal::{digital::OutputPin, pwm::SetDutyCycle};

use super::{
    motion::{Direction, SpeedPercent},
    CarError, GpioPort,
};

/// Direction lines plus enable (PWM) line of one motor channel.
pub struct HBridge<FWD, BWD, EN> {
    name: &'static str,
    forward: FWD,
    backward: BWD,
    enable: EN,
}

impl<FWD, BWD, EN> HBridge<FWD, BWD, EN>
where
    FWD: OutputPin,
    BWD: OutputPin,
    EN: SetDutyCycle,
{
    /// Wrap already-configured output lines. `name` labels log lines and errors.
    pub fn new(
        name: &'static str,
        forward: FWD,
        backward: BWD,
        enable: EN,
    ) -> Self {
        HBridge {
            name,
            forward,
            backward,
            enable,
        }
    }

    fn apply(
        &mut self,
        direction: Direction,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        let name = self.name;
        self.forward
            .set_low()
            .map_err(|e| CarError::line(name, "forward", e))?;
        self.backward
            .set_low()
            .map_err(|e| CarError::line(name, "backward", e))?;

        match direction {
            Direction::Stopped => self.write_duty(SpeedPercent::ZERO),
            Direction::Forward => {
                self.write_duty(speed)?;
                self.forward
                    .set_high()
                    .map_err(|e| CarError::line(name, "forward", e))
            }
            Direction::Backward => {
                self.write_duty(speed)?;
                self.backward
                    .set_high()
                    .map_err(|e| CarError::line(name, "backward", e))
            }
        }
    }

    fn write_duty(
        &mut self,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        let name = self.name;
        self.enable
            .set_duty_cycle_percent(speed.get())
            .map_err(|e| CarError::line(name, "enable", e))
    }
}

impl<FWD, BWD, EN> GpioPort for HBridge<FWD, BWD, EN>
where
    FWD: OutputPin + Send,
    BWD: OutputPin + Send,
    EN: SetDutyCycle + Send,
{
    fn drive(
        &mut self,
        direction: Direction,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        tracing::debug!(motor = self.name, %direction, speed = speed.get(), "driving motor");
        let result = self.apply(direction, speed);
        if let Err(error) = &result {
            tracing::error!(motor = self.name, %error, "pin write failed, stopping motor");
            // Best effort: whatever lines still respond end up low.
            let _ = self.forward.set_low();
            let _ = self.backward.set_low();
            let _ = self.enable.set_duty_cycle_fully_off();
        }
        result
    }

    fn set_duty(
        &mut self,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        tracing::debug!(motor = self.name, speed = speed.get(), "changing duty cycle");
        self.write_duty(speed)
    }
}
