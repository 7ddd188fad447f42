//! In-memory output lines used by the unit tests.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU16, AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
};

use embedded_hal::{
    digital::{self, OutputPin},
    pwm::{self, SetDutyCycle},
};

use super::{
    motion::{Direction, SpeedPercent},
    CarError, GpioPort, HBridge,
};

const FAKE_MAX_DUTY: u16 = 1000;

#[derive(Debug)]
pub(crate) struct FakeFault;

impl digital::Error for FakeFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

impl pwm::Error for FakeFault {
    fn kind(&self) -> pwm::ErrorKind {
        pwm::ErrorKind::Other
    }
}

#[derive(Debug, Default)]
struct LineState {
    high: AtomicBool,
    fail_raise: AtomicBool,
}

#[derive(Debug, Default)]
struct PairState {
    raised: AtomicU8,
    overlapped: AtomicBool,
}

/// Output line that remembers its level. Lines created by [`FakeLine::pair`]
/// also record whether they were ever high at the same time.
#[derive(Debug, Clone)]
pub(crate) struct FakeLine {
    line: Arc<LineState>,
    pair: Arc<PairState>,
}

impl FakeLine {
    pub(crate) fn pair() -> (FakeLine, FakeLine) {
        let pair = Arc::new(PairState::default());
        let line = |pair: &Arc<PairState>| FakeLine {
            line: Arc::default(),
            pair: Arc::clone(pair),
        };
        (line(&pair), line(&pair))
    }

    pub(crate) fn is_high(&self) -> bool {
        self.line.high.load(Ordering::SeqCst)
    }

    pub(crate) fn fail_raise(
        &self,
        fail: bool,
    ) {
        self.line.fail_raise.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.pair.overlapped.load(Ordering::SeqCst)
    }
}

impl digital::ErrorType for FakeLine {
    type Error = FakeFault;
}

impl OutputPin for FakeLine {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        if self.line.high.swap(false, Ordering::SeqCst) {
            self.pair.raised.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        if self.line.fail_raise.load(Ordering::SeqCst) {
            return Err(FakeFault);
        }
        if !self.line.high.swap(true, Ordering::SeqCst)
            && self.pair.raised.fetch_add(1, Ordering::SeqCst) >= 1
        {
            self.pair.overlapped.store(true, Ordering::SeqCst);
        }
        Ok(())
    }
}

/// PWM output that stores the last duty written.
#[derive(Debug, Clone, Default)]
pub(crate) struct FakePwm {
    duty: Arc<AtomicU16>,
    fail: Arc<AtomicBool>,
}

impl FakePwm {
    pub(crate) fn percent(&self) -> u8 {
        (u32::from(self.duty.load(Ordering::SeqCst)) * 100 / u32::from(FAKE_MAX_DUTY)) as u8
    }

    /// Reject every non-zero duty; switching off still works.
    pub(crate) fn fail_writes(
        &self,
        fail: bool,
    ) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

impl pwm::ErrorType for FakePwm {
    type Error = FakeFault;
}

impl SetDutyCycle for FakePwm {
    fn max_duty_cycle(&self) -> u16 {
        FAKE_MAX_DUTY
    }

    fn set_duty_cycle(
        &mut self,
        duty: u16,
    ) -> Result<(), Self::Error> {
        if duty != 0 && self.fail.load(Ordering::SeqCst) {
            return Err(FakeFault);
        }
        self.duty.store(duty, Ordering::SeqCst);
        Ok(())
    }
}

/// Observer for one fake motor channel.
pub(crate) struct FakeBridge {
    name: &'static str,
    forward: FakeLine,
    backward: FakeLine,
    enable: FakePwm,
    releases: Arc<AtomicUsize>,
}

impl FakeBridge {
    pub(crate) fn new(name: &'static str) -> Self {
        let (forward, backward) = FakeLine::pair();
        FakeBridge {
            name,
            forward,
            backward,
            enable: FakePwm::default(),
            releases: Arc::default(),
        }
    }

    /// Port to hand to a `Car`. Dropping it counts as releasing the lines.
    pub(crate) fn port(&self) -> FakePort {
        FakePort {
            bridge: HBridge::new(
                self.name,
                self.forward.clone(),
                self.backward.clone(),
                self.enable.clone(),
            ),
            releases: Arc::clone(&self.releases),
        }
    }

    pub(crate) fn forward_high(&self) -> bool {
        self.forward.is_high()
    }

    pub(crate) fn backward_high(&self) -> bool {
        self.backward.is_high()
    }

    pub(crate) fn percent(&self) -> u8 {
        self.enable.percent()
    }

    pub(crate) fn is_idle(&self) -> bool {
        !self.forward_high() && !self.backward_high() && self.percent() == 0
    }

    pub(crate) fn fail_raise(
        &self,
        fail: bool,
    ) {
        self.forward.fail_raise(fail);
        self.backward.fail_raise(fail);
    }

    pub(crate) fn fail_duty(
        &self,
        fail: bool,
    ) {
        self.enable.fail_writes(fail);
    }

    pub(crate) fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn overlapped(&self) -> bool {
        self.forward.overlapped()
    }
}

pub(crate) struct FakePort {
    bridge: HBridge<FakeLine, FakeLine, FakePwm>,
    releases: Arc<AtomicUsize>,
}

impl GpioPort for FakePort {
    fn drive(
        &mut self,
        direction: Direction,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        self.bridge.drive(direction, speed)
    }

    fn set_duty(
        &mut self,
        speed: SpeedPercent,
    ) -> Result<(), CarError> {
        self.bridge.set_duty(speed)
    }
}

impl Drop for FakePort {
    fn drop(&mut self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}
