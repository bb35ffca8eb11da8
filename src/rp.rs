//! RP2040 bindings for the line primitive and the clock.

use embassy_rp::gpio::{Flex, Pull};
use embassy_time::Instant;

use crate::initiator::Clock;
use crate::line::{CecLine, LineLevel};

/// CEC GPIO switched between pulled-up input and driven-low output.
pub struct FlexCecLine<'d> {
    pin: Flex<'d>,
}

impl<'d> FlexCecLine<'d> {
    pub fn new(mut pin: Flex<'d>) -> Self {
        pin.set_pull(Pull::Up);
        pin.set_low();
        let mut line = Self { pin };
        line.release();
        line
    }
}

impl CecLine for FlexCecLine<'_> {
    fn release(&mut self) {
        self.pin.set_as_input();
    }

    fn assert(&mut self) {
        // Output latch is already low, so switching direction drives 0.
        self.pin.set_low();
        self.pin.set_as_output();
    }

    fn sample(&mut self) -> LineLevel {
        if self.pin.is_high() {
            LineLevel::High
        } else {
            LineLevel::Low
        }
    }
}

/// Uptime from the embassy time driver.
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ms(&self) -> u64 {
        Instant::now().as_millis()
    }
}
