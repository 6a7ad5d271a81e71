//! Core types for talking to fsavd: scan options, result parsing, errors.
//! No I/O, no async dependencies.

pub mod config;
pub mod error;
pub mod result;

pub use config::{Config, OptionValue};
pub use error::{ClientError, Result};
pub use result::{parse_line, Detection, DetectionKind, ScanResult};
