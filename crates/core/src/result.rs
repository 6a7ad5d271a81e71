//! Scan result model and fsavd result-line parsing.
//!
//! A result line has eight tab-separated fields:
//! `status, path, signature, <ignored>, n1, n2, n3, n4`
//! where `status` is `INFECTED`/`SUSPECTED`, optionally prefixed (`MIME_INFECTED`).

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static RESULT_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?P<status>\S*?_?(?:INFECTED|SUSPECTED))\t(?P<path>[^\t]+)\t(?P<sig>[^\t]+)\t[^\t]+\t\d+\t\d+\t\d+\t\d+$",
    )
    .expect("result line pattern should compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Infected,
    Suspected,
}

/// One matched result line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Detection {
    pub status: String,
    pub kind: DetectionKind,
    /// Archive member that triggered the verdict; `None` when fsavd reported the scanned path itself.
    pub archive_item: Option<String>,
    pub signature: String,
    pub raw: String,
}

/// Parse a single response line against the path that was requested.
///
/// Returns `None` for anything that is not a result line (blank lines, chatter).
#[must_use]
pub fn parse_line(line: &str, requested: &str) -> Option<Detection> {
    let caps = RESULT_LINE.captures(line)?;
    let status = &caps["status"];
    let path = &caps["path"];

    let kind = if status.ends_with("SUSPECTED") {
        DetectionKind::Suspected
    } else {
        DetectionKind::Infected
    };

    Some(Detection {
        status: status.to_string(),
        kind,
        archive_item: (path != requested).then(|| path.to_string()),
        signature: caps["sig"].to_string(),
        raw: line.to_string(),
    })
}

/// Outcome of one `SCAN` command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    pub filename: String,
    pub infected: bool,
    /// Every matched line, in the order fsavd sent them.
    pub detections: Vec<Detection>,
}

impl ScanResult {
    #[must_use]
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            infected: false,
            detections: Vec::new(),
        }
    }

    /// Feed one response line. Returns `true` if the line was a result line.
    pub fn absorb(&mut self, line: &str) -> bool {
        let Some(detection) = parse_line(line, &self.filename) else {
            return false;
        };
        self.infected = true;
        self.detections.push(detection);
        true
    }

    /// The most recent detection; the scalar accessors below report this one.
    #[must_use]
    pub fn last(&self) -> Option<&Detection> {
        self.detections.last()
    }

    #[must_use]
    pub fn status(&self) -> &str {
        self.last().map_or("", |d| d.status.as_str())
    }

    #[must_use]
    pub fn signature(&self) -> &str {
        self.last().map_or("", |d| d.signature.as_str())
    }

    #[must_use]
    pub fn archive_item(&self) -> &str {
        self.last()
            .and_then(|d| d.archive_item.as_deref())
            .unwrap_or("")
    }

    #[must_use]
    pub fn raw(&self) -> &str {
        self.last().map_or("", |d| d.raw.as_str())
    }
}
