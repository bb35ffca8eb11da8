//! Initiator configuration.

use crate::cec::{LogicalAddress, PhysicalAddress};

/// Identity on the bus plus the timing knobs of the command layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct InitiatorConfig {
    /// Header initiator nibble for everything we send.
    pub local_address: LogicalAddress,
    /// Announced in Active Source.
    pub physical_address: PhysicalAddress,
    /// Minimum spacing between mutating verbs.
    pub cooldown_ms: u64,
    /// Pause after each polling frame during a scan.
    pub scan_pause_ms: u32,
    /// Reported by `VERSION`.
    pub firmware_id: &'static str,
}

impl Default for InitiatorConfig {
    fn default() -> Self {
        Self {
            local_address: LogicalAddress::PLAYBACK_1,
            physical_address: PhysicalAddress(0x1000),
            cooldown_ms: 2000,
            scan_pause_ms: 100,
            firmware_id: "CEC_MODULE_V1.0",
        }
    }
}
