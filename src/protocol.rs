//! Line protocol spoken between a parent process and an interactive session.
//!
//! Wire format (UTF-8, one message per `\n`-terminated line, strictly request then reply):
//! - Server greeting: `READY`, written once after the model has loaded.
//! - Request: a path to infer, the token `exit`, or an empty line (ignored).
//! - Reply: the result path, or `ERROR: <message>` when inference failed.
//!
//! There is no pipelining: the server reads the next request only after the previous
//! reply has been written and flushed.

use std::fmt;
use std::io::{self, Write};
use std::path::PathBuf;

pub const HANDSHAKE: &str = "READY";

/// Ends the session without a reply. Case-sensitive, no surrounding whitespace.
pub const EXIT_TOKEN: &str = "exit";

pub const ERROR_PREFIX: &str = "ERROR:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Exit,
    Blank,
    Infer(&'a str),
}

impl<'a> Request<'a> {
    /// Parse one line with its terminator already removed.
    pub fn parse(line: &'a str) -> Self {
        match line {
            EXIT_TOKEN => Self::Exit,
            "" => Self::Blank,
            path => Self::Infer(path),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    Result(PathBuf),
    Error(String),
}

impl Reply {
    pub fn parse(line: &str) -> Self {
        match line.strip_prefix(ERROR_PREFIX) {
            Some(message) => Self::Error(message.trim_start().to_string()),
            None => Self::Result(PathBuf::from(line)),
        }
    }

    /// Write the reply as one line and flush it.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "{self}")?;
        w.flush()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Result(path) => f.write_str(&single_line(&path.to_string_lossy())),
            Self::Error(message) => write!(f, "{ERROR_PREFIX} {}", single_line(message)),
        }
    }
}

pub fn write_handshake<W: Write>(w: &mut W) -> io::Result<()> {
    writeln!(w, "{HANDSHAKE}")?;
    w.flush()
}

/// Drop the trailing `\n` and an optional `\r` before it.
pub fn strip_line_ending(buf: &mut Vec<u8>) {
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
}

// A reply must never span lines, or the peer loses request/reply alignment.
fn single_line(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
