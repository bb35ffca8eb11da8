//! Text command grammar.
//!
//! ```text
//! line     := verb [":" argument]
//! verb     := SCAN | POWER_ON | ON | POWER_OFF | OFF | STATUS | CUSTOM | HELP | VERSION
//! argument := hex-string   (CUSTOM only)
//! ```
//!
//! Verbs match case-insensitively. Replies are `TAG:RESULT` lines.

use core::fmt;

use heapless::Vec;

use crate::cec::MAX_CEC_BLOCKS;

/// Longest `CUSTOM:` argument, two hex digits per block.
pub const MAX_HEX_LEN: usize = MAX_CEC_BLOCKS * 2;

pub const HELP_TEXT: &str = "COMMANDS: SCAN, POWER_ON, POWER_OFF, STATUS, CUSTOM:xxxx, HELP, VERSION";

pub type RawBytes = Vec<u8, MAX_CEC_BLOCKS>;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Verb {
    Scan,
    PowerOn,
    PowerOff,
    QueryPower,
    Raw(RawBytes),
    Help,
    Version,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ParseError {
    UnknownVerb,
    /// `CUSTOM:` argument with odd length, too long, or not hex.
    InvalidHex,
}

impl Verb {
    pub fn parse(line: &str) -> Result<Verb, ParseError> {
        let (token, argument) = match line.split_once(':') {
            Some((token, argument)) => (token, Some(argument)),
            None => (line, None),
        };

        let verb = match (Keyword::lookup(token), argument) {
            (Some(Keyword::Custom), Some(hex)) => Verb::Raw(decode_hex(hex)?),
            (_, Some(_)) | (Some(Keyword::Custom), None) | (None, None) => {
                return Err(ParseError::UnknownVerb)
            }
            (Some(Keyword::Scan), None) => Verb::Scan,
            (Some(Keyword::PowerOn), None) => Verb::PowerOn,
            (Some(Keyword::PowerOff), None) => Verb::PowerOff,
            (Some(Keyword::Status), None) => Verb::QueryPower,
            (Some(Keyword::Help), None) => Verb::Help,
            (Some(Keyword::Version), None) => Verb::Version,
        };
        Ok(verb)
    }
}

#[derive(Clone, Copy)]
enum Keyword {
    Scan,
    PowerOn,
    PowerOff,
    Status,
    Custom,
    Help,
    Version,
}

impl Keyword {
    const TABLE: [(&'static str, Keyword); 9] = [
        ("SCAN", Keyword::Scan),
        ("POWER_ON", Keyword::PowerOn),
        ("ON", Keyword::PowerOn),
        ("POWER_OFF", Keyword::PowerOff),
        ("OFF", Keyword::PowerOff),
        ("STATUS", Keyword::Status),
        ("CUSTOM", Keyword::Custom),
        ("HELP", Keyword::Help),
        ("VERSION", Keyword::Version),
    ];

    fn lookup(token: &str) -> Option<Keyword> {
        Self::TABLE
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(token))
            .map(|(_, keyword)| *keyword)
    }
}

/// Decodes a string of hex digit pairs, either case.
pub fn decode_hex(hex: &str) -> Result<RawBytes, ParseError> {
    let digits = hex.as_bytes();
    if digits.len() % 2 != 0 || digits.len() > MAX_HEX_LEN {
        return Err(ParseError::InvalidHex);
    }
    let mut bytes = RawBytes::new();
    for pair in digits.chunks_exact(2) {
        let byte = (hex_value(pair[0])? << 4) | hex_value(pair[1])?;
        bytes.push(byte).map_err(|_| ParseError::InvalidHex)?;
    }
    Ok(bytes)
}

fn hex_value(digit: u8) -> Result<u8, ParseError> {
    char::from(digit)
        .to_digit(16)
        .map(|value| value as u8)
        .ok_or(ParseError::InvalidHex)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Outcome {
    Success,
    Failed,
}

impl Outcome {
    pub fn from_ok(ok: bool) -> Outcome {
        if ok {
            Outcome::Success
        } else {
            Outcome::Failed
        }
    }
}

/// Reply to one command line; `Display` renders the wire text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Response {
    ScanResult { devices_found: bool },
    PowerOn(Outcome),
    PowerOff(Outcome),
    Status(Outcome),
    Custom(Outcome),
    Help,
    Version(&'static str),
    UnknownCommand,
}

impl Response {
    pub fn tag(&self) -> &'static str {
        match self {
            Response::ScanResult { .. } => "SCAN_RESULT",
            Response::PowerOn(_) => "POWER_ON",
            Response::PowerOff(_) => "POWER_OFF",
            Response::Status(_) => "STATUS",
            Response::Custom(_) => "CUSTOM",
            Response::Help => "COMMANDS",
            Response::Version(_) => "VERSION",
            Response::UnknownCommand => "ERROR",
        }
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result = match self {
            Response::ScanResult {
                devices_found: true,
            } => "DEVICES_FOUND",
            Response::ScanResult {
                devices_found: false,
            } => "NO_DEVICES",
            Response::Status(Outcome::Success) => "REQUEST_SENT",
            Response::PowerOn(Outcome::Success)
            | Response::PowerOff(Outcome::Success)
            | Response::Custom(Outcome::Success) => "SUCCESS",
            Response::PowerOn(Outcome::Failed)
            | Response::PowerOff(Outcome::Failed)
            | Response::Status(Outcome::Failed)
            | Response::Custom(Outcome::Failed) => "FAILED",
            Response::Help => return f.write_str(HELP_TEXT),
            Response::Version(id) => id,
            Response::UnknownCommand => "UNKNOWN_COMMAND",
        };
        write!(f, "{}:{}", self.tag(), result)
    }
}
