//! Bit engine: turns the start condition and logical bits into timed pulses.

use embedded_hal::delay::DelayNs;

use crate::line::{CecLine, LineLevel};

/// Receivers have this long after the EOM bit to pull the line low.
pub const ACK_WINDOW_US: u32 = 2000;
const ACK_POLL_INTERVAL_US: u32 = 10;

/// Low phase followed by high phase, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse {
    pub low_us: u32,
    pub high_us: u32,
}

impl Pulse {
    pub const START: Pulse = Pulse {
        low_us: 3700,
        high_us: 800,
    };
    pub const ZERO: Pulse = Pulse {
        low_us: 1500,
        high_us: 900,
    };
    pub const ONE: Pulse = Pulse {
        low_us: 600,
        high_us: 1800,
    };

    pub const fn for_bit(bit: bool) -> Pulse {
        if bit {
            Pulse::ONE
        } else {
            Pulse::ZERO
        }
    }

    pub const fn period_us(&self) -> u32 {
        self.low_us + self.high_us
    }
}

/// Drives pulses onto a [`CecLine`] using busy-waits.
///
/// The low phase of every pulse runs with interrupts masked so that
/// nothing stretches the pulse between `assert` and `release`.
pub struct BitEngine<L, D> {
    line: L,
    delay: D,
}

impl<L: CecLine, D: DelayNs> BitEngine<L, D> {
    pub fn new(mut line: L, delay: D) -> Self {
        line.release();
        Self { line, delay }
    }

    pub fn send_start(&mut self) {
        self.pulse(Pulse::START);
    }

    pub fn send_bit(&mut self, bit: bool) {
        self.pulse(Pulse::for_bit(bit));
    }

    /// Polls for a receiver holding the line low.
    ///
    /// Returns `true` (ACK) on the first low sample, `false` (NACK) if the
    /// line stays high for the whole window.
    pub fn wait_ack(&mut self) -> bool {
        self.line.release();
        let mut waited_us = 0;
        loop {
            if self.line.sample().is_low() {
                return true;
            }
            if waited_us >= ACK_WINDOW_US {
                return false;
            }
            self.delay.delay_us(ACK_POLL_INTERVAL_US);
            waited_us += ACK_POLL_INTERVAL_US;
        }
    }

    pub fn sample(&mut self) -> LineLevel {
        self.line.sample()
    }

    pub fn pause_ms(&mut self, ms: u32) {
        self.delay.delay_ms(ms);
    }

    fn pulse(&mut self, pulse: Pulse) {
        let Self { line, delay } = self;
        critical_section::with(|_| {
            line.assert();
            delay.delay_us(pulse.low_us);
            line.release();
        });
        delay.delay_us(pulse.high_us);
    }
}
