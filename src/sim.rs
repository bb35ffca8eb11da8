//! Simulated CEC bus for host tests.
//!
//! One virtual time base drives the line, the delay and the clock. The bus
//! decodes the transmitter's waveform back into blocks and EOM bits and
//! plays the receiver: after each block it pulls the line low for the
//! next sample if the configured policy says that block is acknowledged.

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;

use crate::bit::Pulse;
use crate::initiator::Clock;
use crate::line::{CecLine, LineLevel};

/// Low phases at or above this are start bits.
const START_THRESHOLD_US: u32 = 3000;
/// Low phases at or above this (and below a start bit) are logical 0.
const ZERO_THRESHOLD_US: u32 = 1050;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SentFrame {
    pub blocks: Vec<u8>,
    pub eoms: Vec<bool>,
    /// Blocks the simulated receiver acknowledged.
    pub acked: usize,
}

impl SentFrame {
    pub fn dest(&self) -> Option<u8> {
        self.blocks.first().map(|header| header & 0x0f)
    }
}

struct State {
    now_ns: u64,
    driven_low: bool,
    held_low: bool,
    asserted_at_ns: u64,
    released_at_ns: Option<u64>,
    open_low_us: Option<u32>,
    pulses: Vec<Pulse>,
    bits: Vec<bool>,
    frames: Vec<SentFrame>,
    ack_pending: bool,
    ack_mask: u16,
    nack_block: Option<usize>,
    asserts: usize,
    samples: usize,
}

impl State {
    fn close_pulse(&mut self) {
        if let (Some(released), Some(low_us)) = (self.released_at_ns.take(), self.open_low_us.take())
        {
            let high_us = ((self.now_ns - released) / 1000) as u32;
            self.pulses.push(Pulse { low_us, high_us });
        }
    }

    fn decode(&mut self, low_us: u32) {
        if low_us >= START_THRESHOLD_US {
            self.bits.clear();
            self.frames.push(SentFrame::default());
            return;
        }
        self.bits.push(low_us < ZERO_THRESHOLD_US);
        if self.bits.len() < 9 {
            return;
        }
        let byte = self.bits[..8]
            .iter()
            .fold(0u8, |acc, bit| (acc << 1) | u8::from(*bit));
        let eom = self.bits[8];
        self.bits.clear();

        let ack_mask = self.ack_mask;
        let nack_block = self.nack_block;
        let Some(frame) = self.frames.last_mut() else {
            return;
        };
        let index = frame.blocks.len();
        frame.blocks.push(byte);
        frame.eoms.push(eom);
        let dest_acks = frame
            .dest()
            .map_or(false, |dest| ack_mask & (1u16 << dest) != 0);
        self.ack_pending = dest_acks && nack_block != Some(index);
    }
}

/// Handle to the simulated bus; `line`, `delay` and `clock` share it.
#[derive(Clone)]
pub struct SimBus {
    state: Rc<RefCell<State>>,
}

impl SimBus {
    /// Every destination acknowledges every block.
    pub fn new() -> Self {
        Self {
            state: Rc::new(RefCell::new(State {
                now_ns: 0,
                driven_low: false,
                held_low: false,
                asserted_at_ns: 0,
                released_at_ns: None,
                open_low_us: None,
                pulses: Vec::new(),
                bits: Vec::new(),
                frames: Vec::new(),
                ack_pending: false,
                ack_mask: 0xFFFF,
                nack_block: None,
                asserts: 0,
                samples: 0,
            })),
        }
    }

    pub fn line(&self) -> SimLine {
        SimLine(self.clone())
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.clone())
    }

    pub fn clock(&self) -> SimClock {
        SimClock(self.clone())
    }

    /// Only these destinations acknowledge.
    pub fn ack_only(&self, dests: &[u8]) {
        self.state.borrow_mut().ack_mask = dests.iter().fold(0, |mask, d| mask | (1u16 << d));
    }

    /// The block at `index` of every frame goes unacknowledged.
    pub fn nack_block(&self, index: usize) {
        self.state.borrow_mut().nack_block = Some(index);
    }

    /// Another device holds the line low.
    pub fn hold_low(&self, held: bool) {
        self.state.borrow_mut().held_low = held;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.state.borrow_mut().now_ns += ms * 1_000_000;
    }

    pub fn now_us(&self) -> u64 {
        self.state.borrow().now_ns / 1000
    }

    pub fn frames(&self) -> Vec<SentFrame> {
        self.state.borrow().frames.clone()
    }

    pub fn pulses(&self) -> Vec<Pulse> {
        self.state.borrow().pulses.clone()
    }

    pub fn assert_count(&self) -> usize {
        self.state.borrow().asserts
    }

    pub fn sample_count(&self) -> usize {
        self.state.borrow().samples
    }

    /// Nothing has driven or even looked at the line.
    pub fn untouched(&self) -> bool {
        self.assert_count() == 0 && self.sample_count() == 0
    }
}

pub struct SimLine(SimBus);

impl CecLine for SimLine {
    fn release(&mut self) {
        let mut guard = self.0.state.borrow_mut();
        let state = &mut *guard;
        if !state.driven_low {
            return;
        }
        state.driven_low = false;
        let low_us = ((state.now_ns - state.asserted_at_ns) / 1000) as u32;
        state.open_low_us = Some(low_us);
        state.released_at_ns = Some(state.now_ns);
        state.decode(low_us);
    }

    fn assert(&mut self) {
        let mut guard = self.0.state.borrow_mut();
        let state = &mut *guard;
        state.close_pulse();
        state.asserts += 1;
        state.driven_low = true;
        state.asserted_at_ns = state.now_ns;
    }

    fn sample(&mut self) -> LineLevel {
        let mut guard = self.0.state.borrow_mut();
        let state = &mut *guard;
        state.close_pulse();
        state.samples += 1;
        if state.driven_low || state.held_low {
            return LineLevel::Low;
        }
        if state.ack_pending {
            state.ack_pending = false;
            if let Some(frame) = state.frames.last_mut() {
                frame.acked += 1;
            }
            return LineLevel::Low;
        }
        LineLevel::High
    }
}

pub struct SimDelay(SimBus);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.state.borrow_mut().now_ns += u64::from(ns);
    }
}

pub struct SimClock(SimBus);

impl Clock for SimClock {
    fn now_ms(&self) -> u64 {
        self.0.state.borrow().now_ns / 1_000_000
    }
}
