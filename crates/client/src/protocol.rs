//! fsavd wire protocol.
//!
//! Wire format: ASCII lines, tab-separated fields, newline-terminated.
//! - Greeting (server): `DBVERSION ...`
//! - Requests (client): `PROTOCOL\t9`, `CONFIGURE\t<NAME>\t<VALUE>`, `SCAN\t<path>`
//! - Terminal reply (server): `OK ...`
//!
//! Fields are not escaped; values must not contain tabs or newlines.

use std::fmt;

use fsav_core::OptionValue;

/// Protocol version proposed during negotiation.
pub const PROTOCOL_VERSION: u32 = 9;

const GREETING: &str = "DBVERSION";
const OK: &str = "OK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    Protocol(u32),
    Configure { name: &'a str, value: OptionValue },
    Scan(&'a str),
}

impl fmt::Display for Request<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Protocol(version) => write!(f, "PROTOCOL\t{version}"),
            Self::Configure { name, value } => write!(f, "CONFIGURE\t{name}\t{value}"),
            Self::Scan(path) => write!(f, "SCAN\t{path}"),
        }
    }
}

#[must_use]
pub fn is_greeting(line: &str) -> bool {
    line.starts_with(GREETING)
}

/// A line starting with `OK` ends every command's reply.
#[must_use]
pub fn is_ok(line: &str) -> bool {
    line.starts_with(OK)
}
