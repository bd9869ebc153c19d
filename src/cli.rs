use clap::Parser;
use std::time::Duration;

/// Terminal latency and packet-loss monitor for a set of hosts
#[derive(Parser, Debug, Clone)]
#[command(name = "pingmon")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Hosts to monitor (IPv4 address or hostname); may be empty
    pub targets: Vec<String>,

    /// Display refresh interval in seconds
    #[arg(short = 'd', long = "refresh", default_value = "1.0")]
    pub refresh: f64,

    /// History retention window in seconds (0 = keep all history)
    #[arg(short = 'r', long = "retention", default_value = "300")]
    pub retention: f64,

    /// Probe interval in seconds
    #[arg(short = 'i', long = "interval", default_value = "5.0")]
    pub interval: f64,

    /// Probe timeout in seconds
    #[arg(short = 't', long = "timeout", default_value = "2.0")]
    pub timeout: f64,

    /// Number of probes to send per target (0 = infinite)
    #[arg(short = 'c', long = "count", default_value = "0")]
    pub count: u64,

    /// Disable TUI (line-oriented output)
    #[arg(long = "no-tui")]
    pub no_tui: bool,

    /// Output a JSON summary when done (batch mode, requires -c)
    #[arg(long = "json")]
    pub json: bool,
}

impl Args {
    /// Get display refresh interval as Duration
    pub fn refresh_duration(&self) -> Duration {
        Duration::from_secs_f64(self.refresh)
    }

    /// Get history retention window as Duration
    pub fn retention_duration(&self) -> Duration {
        Duration::from_secs_f64(self.retention)
    }

    /// Get probe interval as Duration
    pub fn interval_duration(&self) -> Duration {
        Duration::from_secs_f64(self.interval)
    }

    /// Get probe timeout as Duration
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs_f64(self.timeout)
    }

    /// Validate arguments
    pub fn validate(&self) -> Result<(), String> {
        if self.json && self.count == 0 {
            return Err("--json requires -c to be set".into());
        }

        if self.refresh <= 0.0 {
            return Err("Refresh interval must be positive".into());
        }

        if self.retention < 0.0 {
            return Err("Retention window cannot be negative".into());
        }

        if self.interval <= 0.0 {
            return Err("Probe interval must be positive".into());
        }

        if self.timeout <= 0.0 {
            return Err("Timeout must be positive".into());
        }

        Ok(())
    }
}
