#![cfg_attr(not(test), no_std)]

// This mod MUST go first, so that the others see its macros.
mod fmt;

mod bit;
mod cec;
pub mod cec_types;
pub mod command;
pub mod config;
pub mod dispatch;
pub mod initiator;
pub mod line;
#[cfg(feature = "firmware")]
pub mod rp;
#[cfg(test)]
mod sim;

pub use bit::{BitEngine, Pulse, ACK_WINDOW_US};
pub use cec::CecFrame;
pub use cec::CecSendError;
pub use cec::CecTransmitter;
pub use cec::LogicalAddress;
pub use cec::PhysicalAddress;
pub use cec::MAX_CEC_BLOCKS;

pub use command::{Response, Verb};
pub use config::InitiatorConfig;
pub use dispatch::{dispatch, Port, Transport};
pub use initiator::{Activity, Clock, CommandError, Indicator, Initiator, ScanReport};
pub use line::{CecLine, LineLevel};
