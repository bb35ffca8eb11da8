//! Command layer: high-level verbs realized as CEC frames.
//!
//! The [`Initiator`] owns the transmitter and the initiator state (local
//! address and the time of the last mutating verb). Mutating verbs
//! (power on, power off, raw frames) share one cooldown so that a
//! misbehaving companion cannot toggle the sink in a loop.

use embedded_hal::delay::DelayNs;

use crate::cec::{CecFrame, CecSendError, CecTransmitter, LogicalAddress};
use crate::cec_types::CecOpCode;
use crate::config::InitiatorConfig;
use crate::line::CecLine;

/// Monotonic millisecond time source.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

/// What the command layer is about to do, for a status LED or similar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Activity {
    Scan,
    PowerOn,
    PowerOff,
}

impl Activity {
    pub fn blink_count(self) -> u8 {
        match self {
            Activity::Scan => 2,
            Activity::PowerOn => 3,
            Activity::PowerOff => 1,
        }
    }
}

pub trait Indicator {
    fn signal(&mut self, activity: Activity);
}

pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn signal(&mut self, _activity: Activity) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CommandError {
    Send(CecSendError),
    /// Cooldown since the last mutating verb has not elapsed; bus untouched.
    RateLimited,
    /// Raw request whose hex argument did not decode; bus untouched.
    InvalidHex,
}

impl From<CecSendError> for CommandError {
    fn from(err: CecSendError) -> Self {
        CommandError::Send(err)
    }
}

/// Destinations that answered a scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ScanReport {
    found: u16,
}

impl ScanReport {
    fn insert(&mut self, addr: LogicalAddress) {
        self.found |= 1u16 << addr.0;
    }

    pub fn contains(&self, addr: LogicalAddress) -> bool {
        addr.0 < 16 && self.found & (1u16 << addr.0) != 0
    }

    pub fn any_found(&self) -> bool {
        self.found != 0
    }

    pub fn count(&self) -> usize {
        self.found.count_ones() as usize
    }
}

pub struct Initiator<L, D, C, I = NoIndicator> {
    tx: CecTransmitter<L, D>,
    clock: C,
    indicator: I,
    config: InitiatorConfig,
    last_mutating_ms: Option<u64>,
}

impl<L: CecLine, D: DelayNs, C: Clock> Initiator<L, D, C, NoIndicator> {
    pub fn new(tx: CecTransmitter<L, D>, clock: C, config: InitiatorConfig) -> Self {
        Self {
            tx,
            clock,
            indicator: NoIndicator,
            config,
            last_mutating_ms: None,
        }
    }
}

impl<L: CecLine, D: DelayNs, C: Clock, I: Indicator> Initiator<L, D, C, I> {
    pub fn with_indicator<J: Indicator>(self, indicator: J) -> Initiator<L, D, C, J> {
        Initiator {
            tx: self.tx,
            clock: self.clock,
            indicator,
            config: self.config,
            last_mutating_ms: self.last_mutating_ms,
        }
    }

    pub fn config(&self) -> &InitiatorConfig {
        &self.config
    }

    pub fn local_address(&self) -> LogicalAddress {
        self.config.local_address
    }

    /// Polls every logical address except our own and the broadcast address.
    pub fn scan(&mut self) -> ScanReport {
        info!("Scanning for devices");
        self.indicator.signal(Activity::Scan);

        let local = self.config.local_address;
        let mut report = ScanReport::default();
        for dest in (0..=14).map(LogicalAddress).filter(|dest| *dest != local) {
            match self.tx.send(&CecFrame::polling(local, dest)) {
                Ok(()) => {
                    info!("Device found at logical address {}", dest.0);
                    report.insert(dest);
                }
                Err(CecSendError::NotAcknowledged { .. }) => {}
                Err(err) => warn!("Polling {} failed: {}", dest.0, err),
            }
            self.tx.pause_ms(self.config.scan_pause_ms);
        }

        if !report.any_found() {
            info!("No devices found");
        }
        report
    }

    /// Broadcasts Active Source with our physical address.
    pub fn power_on(&mut self) -> Result<(), CommandError> {
        let frame = CecFrame::command(
            self.config.local_address,
            LogicalAddress::BROADCAST,
            CecOpCode::ACTIVE_SOURCE,
            &self.config.physical_address.to_bytes(),
        )?;
        self.send_mutating(&frame, Activity::PowerOn)
    }

    /// Broadcasts Standby.
    pub fn power_off(&mut self) -> Result<(), CommandError> {
        let frame = CecFrame::command(
            self.config.local_address,
            LogicalAddress::BROADCAST,
            CecOpCode::STANDBY,
            &[],
        )?;
        self.send_mutating(&frame, Activity::PowerOff)
    }

    /// Asks the TV for its power status. The report itself is not read back.
    pub fn query_power(&mut self) -> Result<(), CommandError> {
        let frame = CecFrame::command(
            self.config.local_address,
            LogicalAddress::TV,
            CecOpCode::GIVE_DEVICE_POWER_STATUS,
            &[],
        )?;
        self.tx.send(&frame)?;
        Ok(())
    }

    /// Sends `bytes` verbatim, header included.
    ///
    /// The cooldown is checked before the length, so an empty or
    /// over-long request still counts as a mutating verb.
    pub fn send_raw(&mut self, bytes: &[u8]) -> Result<(), CommandError> {
        self.admit_mutating()?;
        self.tx.send_bytes(bytes)?;
        Ok(())
    }

    /// Raw request that failed to parse. It goes through the cooldown like
    /// any raw send, then fails without touching the bus.
    pub fn reject_raw(&mut self) -> CommandError {
        match self.admit_mutating() {
            Ok(()) => CommandError::InvalidHex,
            Err(err) => err,
        }
    }

    pub fn indicator_mut(&mut self) -> &mut I {
        &mut self.indicator
    }

    fn send_mutating(&mut self, frame: &CecFrame, activity: Activity) -> Result<(), CommandError> {
        self.admit_mutating()?;
        self.indicator.signal(activity);
        self.tx.send(frame)?;
        Ok(())
    }

    /// Checks the cooldown and, when it has elapsed, restarts it.
    fn admit_mutating(&mut self) -> Result<(), CommandError> {
        let now = self.clock.now_ms();
        if let Some(last) = self.last_mutating_ms {
            if now < last.saturating_add(self.config.cooldown_ms) {
                warn!("Rate limited, {} ms since last command", now.saturating_sub(last));
                return Err(CommandError::RateLimited);
            }
        }
        self.last_mutating_ms = Some(self.last_mutating_ms.map_or(now, |last| last.max(now)));
        Ok(())
    }
}
