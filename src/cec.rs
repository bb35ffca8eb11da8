use core::iter::once;

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::bit::BitEngine;
use crate::cec_types::CecOpCode;
use crate::line::CecLine;

/// Header plus opcode plus operands.
pub const MAX_CEC_BLOCKS: usize = 16;
const MAX_CEC_OPERANDS: usize = MAX_CEC_BLOCKS - 2;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LogicalAddress(pub u8);

impl LogicalAddress {
    pub const TV: LogicalAddress = LogicalAddress(0);
    pub const PLAYBACK_1: LogicalAddress = LogicalAddress(4);
    pub const BROADCAST: LogicalAddress = LogicalAddress(15);
}

/// Position in the HDMI topology, e.g. `0x1000` is 1.0.0.0.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhysicalAddress(pub u16);

impl PhysicalAddress {
    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CecFrame {
    pub initiator: LogicalAddress,
    pub dest: LogicalAddress,
    pub opcode: Option<u8>,
    pub operands: Vec<u8, MAX_CEC_OPERANDS>,
}

impl CecFrame {
    /// Header-only frame probing whether `dest` is occupied.
    pub fn polling(initiator: LogicalAddress, dest: LogicalAddress) -> CecFrame {
        CecFrame {
            initiator,
            dest,
            opcode: None,
            operands: Vec::new(),
        }
    }

    pub fn command(
        initiator: LogicalAddress,
        dest: LogicalAddress,
        opcode: CecOpCode,
        operands: &[u8],
    ) -> Result<CecFrame, CecSendError> {
        Ok(CecFrame {
            initiator,
            dest,
            opcode: Some(opcode.into()),
            operands: Vec::from_slice(operands).map_err(|_| CecSendError::InvalidLength)?,
        })
    }

    /// Splits raw blocks into header, opcode and operands.
    pub fn from_bytes(bytes: &[u8]) -> Result<CecFrame, CecSendError> {
        let (&header, rest) = bytes.split_first().ok_or(CecSendError::InvalidLength)?;
        if bytes.len() > MAX_CEC_BLOCKS {
            return Err(CecSendError::InvalidLength);
        }
        Ok(CecFrame {
            initiator: LogicalAddress(header >> 4),
            dest: LogicalAddress(header & 0x0f),
            opcode: rest.first().copied(),
            operands: Vec::from_slice(rest.get(1..).unwrap_or_default())
                .map_err(|_| CecSendError::InvalidLength)?,
        })
    }

    /// Only the low nibble of each address is used.
    pub fn header(&self) -> u8 {
        ((self.initiator.0 & 0x0f) << 4) | (self.dest.0 & 0x0f)
    }

    pub fn block_count(&self) -> usize {
        1 + self.opcode.iter().count() + self.operands.len()
    }

    /// Blocks in wire order.
    pub fn blocks(&self) -> impl Iterator<Item = u8> + '_ {
        once(self.header()).chain(
            self.opcode
                .iter()
                .copied()
                .chain(self.operands.iter().copied()),
        )
    }

    pub fn opcode_name(&self) -> Option<&'static str> {
        self.opcode.and_then(CecOpCode::name_of)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CecSendError {
    /// Line was low when the frame was about to start.
    BusBusy,
    /// No ACK after the block at this index; later blocks were not sent.
    NotAcknowledged { block: usize },
    /// Zero or more than sixteen blocks.
    InvalidLength,
}

/// Owns the bus for the duration of every send.
pub struct CecTransmitter<L, D> {
    engine: BitEngine<L, D>,
}

impl<L: CecLine, D: DelayNs> CecTransmitter<L, D> {
    pub fn new(line: L, delay: D) -> Self {
        Self {
            engine: BitEngine::new(line, delay),
        }
    }

    pub fn send_bytes(&mut self, bytes: &[u8]) -> Result<(), CecSendError> {
        let frame = CecFrame::from_bytes(bytes)?;
        self.send(&frame)
    }

    pub fn send(&mut self, frame: &CecFrame) -> Result<(), CecSendError> {
        if self.engine.sample().is_low() {
            warn!("Bus busy, cannot send");
            return Err(CecSendError::BusBusy);
        }

        let total_blocks = frame.block_count();
        debug!(
            "Sending {} -> {} {} ({} blocks)",
            frame.initiator.0,
            frame.dest.0,
            frame.opcode_name().unwrap_or("-"),
            total_blocks
        );

        self.engine.send_start();
        for (idx, payload) in frame.blocks().enumerate() {
            let eom = idx == total_blocks - 1;
            trace!("Sending block {:x}: {:x} is EOM: {}", idx, payload, eom);
            for bit_idx in 0..=7 {
                self.engine.send_bit(((payload >> (7 - bit_idx)) & 1) == 1);
            }
            self.engine.send_bit(eom);
            if !self.engine.wait_ack() {
                info!("No ACK for block {}", idx);
                return Err(CecSendError::NotAcknowledged { block: idx });
            }
        }
        Ok(())
    }

    pub fn pause_ms(&mut self, ms: u32) {
        self.engine.pause_ms(ms);
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::bit::Pulse;
    use crate::sim::SimBus;

    #[test]
    fn test_from_bytes_splits_blocks() {
        let frame = CecFrame::from_bytes(&[0x4F, 0x82, 0x10, 0x00]).unwrap();
        assert_eq!(frame.initiator, LogicalAddress(4));
        assert_eq!(frame.dest, LogicalAddress::BROADCAST);
        assert_eq!(frame.opcode, Some(0x82));
        assert_eq!(frame.operands.as_slice(), &[0x10, 0x00]);
        assert_eq!(frame.opcode_name(), Some("ACTIVE_SOURCE"));

        let polling = CecFrame::from_bytes(&[0x40]).unwrap();
        assert_eq!(polling, CecFrame::polling(LogicalAddress(4), LogicalAddress::TV));
        assert_eq!(polling.block_count(), 1);
    }

    #[test]
    fn test_from_bytes_rejects_bad_lengths() {
        assert_eq!(CecFrame::from_bytes(&[]), Err(CecSendError::InvalidLength));
        assert_eq!(
            CecFrame::from_bytes(&[0u8; MAX_CEC_BLOCKS + 1]),
            Err(CecSendError::InvalidLength)
        );
        assert!(CecFrame::from_bytes(&[0u8; MAX_CEC_BLOCKS]).is_ok());
    }

    #[test]
    fn test_addresses() {
        assert_eq!(PhysicalAddress(0x1000).to_bytes(), [0x10, 0x00]);
        assert_eq!(PhysicalAddress(0x2100).to_bytes(), [0x21, 0x00]);
    }

    #[test]
    fn test_header_keeps_address_nibbles() {
        let frame = CecFrame::polling(LogicalAddress(0x14), LogicalAddress(0x20));
        assert_eq!(frame.header(), 0x40);

        let bus = SimBus::new();
        let mut tx = CecTransmitter::new(bus.line(), bus.delay());
        let standby = CecFrame::command(
            LogicalAddress(0xF4),
            LogicalAddress::BROADCAST,
            CecOpCode::STANDBY,
            &[],
        )
        .unwrap();
        assert_eq!(tx.send(&standby), Ok(()));
        assert_eq!(bus.frames()[0].blocks, vec![0x4F, 0x36]);
    }

    #[test]
    fn test_send_all_acked() {
        let bus = SimBus::new();
        let mut tx = CecTransmitter::new(bus.line(), bus.delay());

        assert_eq!(tx.send_bytes(&[0x40, 0x8F]), Ok(()));

        let frames = bus.frames();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].blocks, vec![0x40, 0x8F]);
        assert_eq!(frames[0].eoms, vec![false, true]);
        assert_eq!(frames[0].acked, 2);
    }

    #[test]
    fn test_send_stops_at_first_nack() {
        let bus = SimBus::new();
        bus.nack_block(1);
        let mut tx = CecTransmitter::new(bus.line(), bus.delay());

        assert_eq!(
            tx.send_bytes(&[0x4F, 0x82, 0x10, 0x00]),
            Err(CecSendError::NotAcknowledged { block: 1 })
        );
        assert_eq!(bus.frames()[0].blocks, vec![0x4F, 0x82]);
    }

    #[test]
    fn test_polling_absent_device() {
        let bus = SimBus::new();
        bus.ack_only(&[0]);
        let mut tx = CecTransmitter::new(bus.line(), bus.delay());

        assert_eq!(
            tx.send(&CecFrame::polling(LogicalAddress(4), LogicalAddress(3))),
            Err(CecSendError::NotAcknowledged { block: 0 })
        );
        assert_eq!(
            tx.send(&CecFrame::polling(LogicalAddress(4), LogicalAddress::TV)),
            Ok(())
        );
    }

    #[test]
    fn test_busy_bus_is_untouched() {
        let bus = SimBus::new();
        bus.hold_low(true);
        let mut tx = CecTransmitter::new(bus.line(), bus.delay());

        assert_eq!(tx.send_bytes(&[0x4F, 0x36]), Err(CecSendError::BusBusy));
        assert_eq!(bus.assert_count(), 0);
    }

    #[test]
    fn test_invalid_length_is_untouched() {
        let bus = SimBus::new();
        let mut tx = CecTransmitter::new(bus.line(), bus.delay());

        assert_eq!(tx.send_bytes(&[]), Err(CecSendError::InvalidLength));
        assert_eq!(tx.send_bytes(&[0u8; 17]), Err(CecSendError::InvalidLength));
        assert_eq!(bus.assert_count(), 0);
        assert_eq!(bus.sample_count(), 0);
    }

    proptest! {
        #[test]
        fn prop_blocks_bits_and_eoms(bytes in proptest::collection::vec(any::<u8>(), 1..=MAX_CEC_BLOCKS)) {
            let bus = SimBus::new();
            let mut tx = CecTransmitter::new(bus.line(), bus.delay());

            prop_assert_eq!(tx.send_bytes(&bytes), Ok(()));

            let frames = bus.frames();
            prop_assert_eq!(frames.len(), 1);
            // Decoded MSB-first, so this checks bit order too.
            prop_assert_eq!(&frames[0].blocks, &bytes);
            prop_assert_eq!(frames[0].eoms.len(), bytes.len());
            prop_assert_eq!(frames[0].eoms.iter().filter(|eom| **eom).count(), 1);
            prop_assert_eq!(frames[0].eoms.last().copied(), Some(true));
        }

        #[test]
        fn prop_pulse_periods(bytes in proptest::collection::vec(any::<u8>(), 1..=MAX_CEC_BLOCKS)) {
            let bus = SimBus::new();
            let mut tx = CecTransmitter::new(bus.line(), bus.delay());
            tx.send_bytes(&bytes).unwrap();

            let pulses = bus.pulses();
            prop_assert_eq!(pulses.len(), 1 + 9 * bytes.len());
            prop_assert_eq!(pulses[0], Pulse::START);
            for pulse in &pulses[1..] {
                prop_assert_eq!(pulse.period_us(), 2400);
                prop_assert!(*pulse == Pulse::ZERO || *pulse == Pulse::ONE);
            }
        }
    }
}
