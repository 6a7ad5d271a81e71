//! CLI argument parsing.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

fn positive_secs(s: &str) -> Result<u64, String> {
    let val: u64 = s.parse().map_err(|e| format!("{e}"))?;
    if val == 0 {
        Err("timeout must be at least 1 second".to_string())
    } else {
        Ok(val)
    }
}

#[derive(Parser)]
#[command(name = "fsav-scan", about = "Scan files through a running fsavd")]
pub struct Cli {
    /// fsavd unix socket
    #[arg(short = 'S', long, env = "FSAV_SOCKET", default_value = fsav_client::DEFAULT_SOCKET)]
    pub socket: PathBuf,

    /// Connect timeout in seconds
    #[arg(long, default_value = "5", value_parser = positive_secs)]
    pub connect_timeout: u64,

    /// Per-line read/write timeout in seconds
    #[arg(long, default_value = "30", value_parser = positive_secs)]
    pub cmd_timeout: u64,

    /// Extra connect attempts after a timeout (negative means none)
    #[arg(long, default_value = "0", allow_negative_numbers = true)]
    pub retries: i32,

    /// Pause between connect attempts in milliseconds
    #[arg(long, default_value = "1000")]
    pub retry_sleep: u64,

    /// TOML file with scan options (default: ~/.config/fsav/config.toml)
    #[arg(short, long, env = "FSAV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Print one JSON object per file
    #[arg(long)]
    pub json: bool,

    /// Files to scan, as paths visible to fsavd
    #[arg(required = true)]
    pub files: Vec<String>,
}

impl Cli {
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout)
    }

    #[must_use]
    pub const fn cmd_timeout(&self) -> Duration {
        Duration::from_secs(self.cmd_timeout)
    }

    #[must_use]
    pub const fn retry_sleep(&self) -> Duration {
        Duration::from_millis(self.retry_sleep)
    }
}
