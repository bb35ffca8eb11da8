//! Line I/O primitive for the single CEC wire.
//!
//! CEC is a wired-OR open-drain bus: a transmitter yields the line by
//! releasing it (input with pull-up), and any device may pull it low.
//! Releasing is also how a transmitter lets a receiver ACK.

/// Level observed on the CEC line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LineLevel {
    High,
    Low,
}

impl LineLevel {
    pub fn is_low(self) -> bool {
        self == LineLevel::Low
    }
}

/// Exclusive handle to the CEC GPIO. None of the operations can fail.
pub trait CecLine {
    /// Input with pull-up enabled; the bus floats high unless someone drives it.
    fn release(&mut self);

    /// Output, driven to logic 0.
    fn assert(&mut self);

    /// Current level on the wire.
    fn sample(&mut self) -> LineLevel;
}

impl<T: CecLine + ?Sized> CecLine for &mut T {
    fn release(&mut self) {
        T::release(self)
    }

    fn assert(&mut self) {
        T::assert(self)
    }

    fn sample(&mut self) -> LineLevel {
        T::sample(self)
    }
}
