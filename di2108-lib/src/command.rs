//! ASCII command framing and echo correlation.
//!
//! Outgoing frames are `<verb> <arg> <arg> ...\r`. The instrument answers
//! every command except `start` by echoing the line, optionally followed by
//! a payload (`info 1 2108`), in bulk packets of the active [`PacketSize`].
//!
//! Echo framing: packets are accumulated until the terminal packet, which is
//! the first one that is either shorter than the packet size (a short USB
//! transfer) or ends in a NUL byte. The assembled text is stripped of NUL,
//! CR and surrounding whitespace and must then begin with the command line
//! that was sent; whatever follows is the payload.

use crate::constants::{COMMAND_TERMINATOR, COMMAND_TIMEOUT, DEC_MAX, DEC_MIN, ECHO_SENTINEL, INFO_SELECTOR_MAX, SRATE_MIN};
use crate::error::{Error, Result};
use crate::types::{FilterMode, FilterTarget, LedColor, PacketSize, ScanListEntry, ScanMode, check_port_mask};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// Every verb the DI-2108 understands, with typed arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Info(u8),
    Ps(PacketSize),
    Start(ScanMode),
    Stop,
    Slist(ScanListEntry),
    Srate(u16),
    Filter { target: FilterTarget, mode: FilterMode },
    Dec(u16),
    Ffl(u16),
    Led(LedColor),
    Dout(u8),
    Endo(u8),
    Din,
    Reset,
}

impl Command {
    pub fn verb(&self) -> &'static str {
        match self {
            Command::Info(_) => "info",
            Command::Ps(_) => "ps",
            Command::Start(_) => "start",
            Command::Stop => "stop",
            Command::Slist(_) => "slist",
            Command::Srate(_) => "srate",
            Command::Filter { .. } => "filter",
            Command::Dec(_) => "dec",
            Command::Ffl(_) => "ffl",
            Command::Led(_) => "led",
            Command::Dout(_) => "dout",
            Command::Endo(_) => "endo",
            Command::Din => "din",
            Command::Reset => "reset",
        }
    }

    /// Argument tokens, including the trailing-space padding some verbs
    /// need before the firmware accepts them.
    pub fn args(&self) -> Vec<String> {
        match *self {
            Command::Info(0) => vec!["0 ".to_string()],
            Command::Info(selector) => vec![selector.to_string()],
            Command::Ps(size) => vec![format!("{} ", size.index())],
            Command::Start(mode) => vec![u8::from(mode).to_string()],
            // Sent as "stop "
            Command::Stop => vec![String::new()],
            Command::Slist(entry) => vec![entry.position.to_string(), entry.channel.config_word().to_string()],
            Command::Srate(divisor) => vec![divisor.to_string()],
            Command::Filter { target, mode } => vec![target.to_string(), format!("{} ", u8::from(mode))],
            Command::Dec(count) => vec![format!("{count} ")],
            Command::Ffl(factor) => vec![factor.to_string()],
            Command::Led(color) => vec![u8::from(color).to_string()],
            Command::Dout(mask) => vec![mask.to_string()],
            Command::Endo(mask) => vec![mask.to_string()],
            Command::Din => Vec::new(),
            Command::Reset => vec!["1".to_string()],
        }
    }

    /// Reject arguments outside their documented ranges.
    pub fn validate(&self) -> Result<()> {
        match *self {
            Command::Info(selector) if selector > INFO_SELECTOR_MAX => Err(Error::config(format!(
                "info selector {selector} is out of range 0-{INFO_SELECTOR_MAX}"
            ))),
            Command::Srate(divisor) if divisor < SRATE_MIN => Err(Error::config(format!(
                "srate {divisor} is below the minimum divisor {SRATE_MIN}"
            ))),
            Command::Dec(count) if !(DEC_MIN..=DEC_MAX).contains(&count) => Err(Error::config(format!(
                "dec {count} is out of range {DEC_MIN}-{DEC_MAX}"
            ))),
            Command::Ffl(0) => Err(Error::config("ffl factor must be at least 1")),
            Command::Filter {
                target: FilterTarget::Channel(index),
                ..
            } if index > 7 => Err(Error::config(format!("filter channel {index} is out of range 0-7"))),
            Command::Slist(entry) => ScanListEntry::new(entry.position, entry.channel).map(|_| ()),
            Command::Dout(mask) => check_port_mask("dout", mask),
            Command::Endo(mask) => check_port_mask("endo", mask),
            _ => Ok(()),
        }
    }

    /// False only for `start`, which the instrument never acknowledges.
    pub fn expects_echo(&self) -> bool {
        !matches!(self, Command::Start(_))
    }

    /// The command line without its terminator.
    pub fn line(&self) -> String {
        join_tokens(self.verb(), &self.args())
    }

    /// The text an echo must begin with.
    pub fn echo_prefix(&self) -> String {
        self.line().trim_end().to_string()
    }

    /// Validate and frame the command for the wire.
    pub fn encode(&self) -> Result<Bytes> {
        self.validate()?;
        encode(self.verb(), &self.args())
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.line().trim_end())
    }
}

fn join_tokens<S: AsRef<str>>(verb: &str, args: &[S]) -> String {
    let mut line = String::from(verb);
    for arg in args {
        line.push(' ');
        line.push_str(arg.as_ref());
    }
    line
}

/// Join `verb` and `args` with single spaces and append the terminator.
pub fn encode<S: AsRef<str>>(verb: &str, args: &[S]) -> Result<Bytes> {
    if verb.is_empty() {
        return Err(Error::config("command verb is empty"));
    }
    let line = join_tokens(verb, args);
    if !line.is_ascii() || line.bytes().any(|b| b == COMMAND_TERMINATOR) {
        return Err(Error::config(format!(
            "command {line:?} must be ASCII without carriage returns"
        )));
    }

    let mut frame = BytesMut::with_capacity(line.len() + 1);
    frame.put_slice(line.as_bytes());
    frame.put_u8(COMMAND_TERMINATOR);
    Ok(frame.freeze())
}

/// True when `chunk` ends a response read in `packet_size` units.
pub fn is_terminal_packet(chunk: &[u8], packet_size: PacketSize) -> bool {
    chunk.len() < packet_size.bytes() || chunk.last() == Some(&ECHO_SENTINEL)
}

/// Collects echo packets until the terminal one arrives.
#[derive(Debug)]
pub struct EchoAssembler {
    packet_size: PacketSize,
    buffer: BytesMut,
    packets: usize,
    complete: bool,
}

impl EchoAssembler {
    pub fn new(packet_size: PacketSize) -> Self {
        Self {
            packet_size,
            buffer: BytesMut::with_capacity(packet_size.bytes()),
            packets: 0,
            complete: false,
        }
    }

    /// Append one packet. Returns true once the response is complete;
    /// packets pushed after that are ignored.
    pub fn push(&mut self, chunk: &[u8]) -> bool {
        if self.complete {
            return true;
        }
        self.buffer.extend_from_slice(chunk);
        self.packets += 1;
        self.complete = is_terminal_packet(chunk, self.packet_size);
        self.complete
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn packets(&self) -> usize {
        self.packets
    }

    /// Raw bytes gathered so far
    pub fn raw(&self) -> &[u8] {
        &self.buffer
    }

    /// Clean up the echo and, when `expected_prefix` is given, check that the
    /// response starts with it and return only the remainder.
    pub fn finish(self, expected_prefix: Option<&str>) -> Result<String> {
        let text = std::str::from_utf8(&self.buffer)
            .ok()
            .filter(|text| text.is_ascii())
            .ok_or_else(|| Error::ProtocolMismatch {
                expected: expected_prefix.unwrap_or_default().to_string(),
                actual: String::from_utf8_lossy(&self.buffer).into_owned(),
            })?;
        let text = trim_echo(text);

        match expected_prefix {
            None => Ok(text.to_string()),
            Some(prefix) => {
                let prefix = prefix.trim_end();
                // The echo must end at a token boundary: "srate 10000" is not
                // an echo of "srate 1000".
                let rest = text
                    .strip_prefix(prefix)
                    .filter(|rest| rest.is_empty() || rest.starts_with(is_echo_separator));
                match rest {
                    Some(rest) => Ok(trim_echo(rest).to_string()),
                    None => Err(Error::ProtocolMismatch {
                        expected: prefix.to_string(),
                        actual: text.to_string(),
                    }),
                }
            }
        }
    }
}

fn is_echo_separator(c: char) -> bool {
    c == '\0' || c.is_ascii_whitespace()
}

fn trim_echo(text: &str) -> &str {
    text.trim_matches(is_echo_separator)
}

/// Assemble `raw_chunks` read in `packet_size` units into echo text.
///
/// Chunks after the terminal one are ignored. A sequence without a terminal
/// chunk is reported as a timeout, since on the wire the read deadline
/// would expire waiting for it.
pub fn decode_echo<C: AsRef<[u8]>>(
    raw_chunks: &[C],
    expected_prefix: Option<&str>,
    packet_size: PacketSize,
) -> Result<String> {
    let mut assembler = EchoAssembler::new(packet_size);
    for chunk in raw_chunks {
        if assembler.push(chunk.as_ref()) {
            return assembler.finish(expected_prefix);
        }
    }
    Err(Error::Timeout {
        operation: "command echo",
        timeout: COMMAND_TIMEOUT,
    })
}
