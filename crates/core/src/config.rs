//! Scan options sent to fsavd with `CONFIGURE` before scanning.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Value of a single scan option as it goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionValue {
    Flag(bool),
    Number(u32),
}

impl OptionValue {
    /// Wire rendering: flags as `0`/`1`, numbers as decimal text.
    #[must_use]
    pub fn render(self) -> String {
        match self {
            Self::Flag(on) => render_flag(on).to_string(),
            Self::Number(n) => n.to_string(),
        }
    }
}

const fn render_flag(on: bool) -> &'static str {
    if on {
        "1"
    } else {
        "0"
    }
}

impl fmt::Display for OptionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::Flag(on) => f.write_str(render_flag(on)),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// fsavd scan options.
///
/// Missing keys in a TOML table fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub mime: bool,
    pub riskware: bool,
    pub stop_on_first: bool,
    /// Server-side per-file scan timeout in seconds.
    pub timeout: u32,
    pub archive: bool,
}

impl Config {
    /// Options in the order they are sent. The order never changes between runs.
    #[must_use]
    pub const fn options(&self) -> [(&'static str, OptionValue); 5] {
        [
            ("MIME", OptionValue::Flag(self.mime)),
            ("RISKWARE", OptionValue::Flag(self.riskware)),
            ("STOPONFIRST", OptionValue::Flag(self.stop_on_first)),
            ("TIMEOUT", OptionValue::Number(self.timeout)),
            ("ARCHIVE", OptionValue::Flag(self.archive)),
        ]
    }

    /// Load options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid options table.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| eyre::eyre!("failed to read {}: {e}", path.display()))?;

        toml::from_str(&content).map_err(|e| eyre::eyre!("failed to parse {}: {e}", path.display()))
    }

    /// Load from `~/.config/fsav/config.toml` when present, defaults otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load_default() -> crate::Result<Self> {
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mime: true,
            riskware: true,
            stop_on_first: true,
            timeout: 60,
            archive: true,
        }
    }
}

#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|p| p.join(".config").join("fsav").join("config.toml"))
}
