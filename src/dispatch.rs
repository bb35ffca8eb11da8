//! Line assembly and verb dispatch for the two text transports.

use core::fmt::Write;

use embedded_hal::delay::DelayNs;
use heapless::String;

use crate::cec::LogicalAddress;
use crate::command::{Outcome, ParseError, Response, Verb};
use crate::initiator::{Clock, Indicator, Initiator};
use crate::line::CecLine;

/// Longest command line kept; the rest of an over-long line is dropped.
pub const MAX_LINE_LEN: usize = 255;

pub const PROMPT: &str = "> ";
pub const READY_LINE: &str = "CEC_MODULE_READY\n";

pub type LineString = String<MAX_LINE_LEN>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Transport {
    /// USB-CDC debug console.
    Console,
    /// UART to the companion device.
    Companion,
}

impl Transport {
    pub fn name(self) -> &'static str {
        match self {
            Transport::Console => "USB",
            Transport::Companion => "COMPANION",
        }
    }

    /// The console echoes typed characters and prompts after each reply.
    pub fn is_interactive(self) -> bool {
        self == Transport::Console
    }

    /// Written once when the transport comes up.
    pub fn ready_line(self) -> Option<&'static str> {
        match self {
            Transport::Console => None,
            Transport::Companion => Some(READY_LINE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Non-printable, or a terminator with nothing buffered.
    Ignored,
    /// Printable byte appended to the line.
    Stored(u8),
    /// Printable byte past the line limit, discarded.
    Overflow,
    /// Terminator reached; the buffered line is handed out.
    Line(LineString),
}

/// Accumulates printable ASCII until CR or LF.
#[derive(Debug, Default)]
pub struct LineBuffer {
    line: LineString,
    truncated: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, byte: u8) -> Feed {
        match byte {
            b'\r' | b'\n' => {
                if self.line.is_empty() {
                    return Feed::Ignored;
                }
                if self.truncated {
                    warn!("Line longer than {} bytes truncated", MAX_LINE_LEN);
                    self.truncated = false;
                }
                Feed::Line(core::mem::take(&mut self.line))
            }
            32..=126 => match self.line.push(char::from(byte)) {
                Ok(()) => Feed::Stored(byte),
                Err(()) => {
                    self.truncated = true;
                    Feed::Overflow
                }
            },
            _ => Feed::Ignored,
        }
    }
}

/// Parses one line and runs it against the initiator.
pub fn dispatch<L, D, C, I>(initiator: &mut Initiator<L, D, C, I>, line: &str) -> Response
where
    L: CecLine,
    D: DelayNs,
    C: Clock,
    I: Indicator,
{
    match Verb::parse(line) {
        Ok(verb) => execute(initiator, &verb),
        Err(ParseError::InvalidHex) => {
            let err = initiator.reject_raw();
            info!("Invalid command format: {}", err);
            Response::Custom(Outcome::Failed)
        }
        Err(ParseError::UnknownVerb) => Response::UnknownCommand,
    }
}

pub fn execute<L, D, C, I>(initiator: &mut Initiator<L, D, C, I>, verb: &Verb) -> Response
where
    L: CecLine,
    D: DelayNs,
    C: Clock,
    I: Indicator,
{
    match verb {
        Verb::Scan => {
            let report = initiator.scan();
            info!(
                "Scan found {} device(s), TV present: {}",
                report.count(),
                report.contains(LogicalAddress::TV)
            );
            Response::ScanResult {
                devices_found: report.any_found(),
            }
        }
        Verb::PowerOn => Response::PowerOn(Outcome::from_ok(initiator.power_on().is_ok())),
        Verb::PowerOff => Response::PowerOff(Outcome::from_ok(initiator.power_off().is_ok())),
        Verb::QueryPower => Response::Status(Outcome::from_ok(initiator.query_power().is_ok())),
        Verb::Raw(bytes) => Response::Custom(Outcome::from_ok(initiator.send_raw(bytes).is_ok())),
        Verb::Help => Response::Help,
        Verb::Version => Response::Version(initiator.config().firmware_id),
    }
}

/// One transport's receive side: its own line buffer plus its reply rules.
pub struct Port {
    transport: Transport,
    buffer: LineBuffer,
}

impl Port {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            buffer: LineBuffer::new(),
        }
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Feeds received bytes, running every completed line, and writes what
    /// goes back on this transport (echo, reply lines, prompt) to `out`.
    ///
    /// All bytes are consumed even if `out` fills up; the first write
    /// error is returned once they are.
    pub fn receive<L, D, C, I, W>(
        &mut self,
        bytes: &[u8],
        initiator: &mut Initiator<L, D, C, I>,
        out: &mut W,
    ) -> core::fmt::Result
    where
        L: CecLine,
        D: DelayNs,
        C: Clock,
        I: Indicator,
        W: Write,
    {
        let mut result = Ok(());
        for &byte in bytes {
            let written = match self.buffer.feed(byte) {
                Feed::Stored(byte) if self.transport.is_interactive() => {
                    out.write_char(char::from(byte))
                }
                Feed::Line(line) => {
                    info!("[{}] Received command: {}", self.transport.name(), line.as_str());
                    let response = dispatch(initiator, &line);
                    self.reply(response, out)
                }
                _ => Ok(()),
            };
            result = result.and(written);
        }
        result
    }

    fn reply<W: Write>(&self, response: Response, out: &mut W) -> core::fmt::Result {
        debug!("[{}] Response: {}", self.transport.name(), response);
        if self.transport.is_interactive() {
            out.write_str("\n")?;
        }
        writeln!(out, "{}", response)?;
        if self.transport.is_interactive() {
            out.write_str(PROMPT)?;
        }
        Ok(())
    }
}
