use crate::cli::Args;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Runtime settings derived from CLI args.
///
/// Immutable after construction; monitors and the display share clones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// How often the display re-reads the histories
    #[serde(with = "duration_serde")]
    pub refresh_interval: Duration,
    /// Maximum age of a probe outcome before eviction (zero = keep all)
    #[serde(with = "duration_serde")]
    pub retention: Duration,
    /// Pacing between probe cycles
    #[serde(with = "duration_serde")]
    pub probe_interval: Duration,
    /// Deadline for a single echo exchange
    #[serde(with = "duration_serde")]
    pub probe_timeout: Duration,
    /// Probes to send per target (None = run until cancelled)
    pub count: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(1),
            retention: Duration::from_secs(300),
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            count: None,
        }
    }
}

impl From<&Args> for Settings {
    fn from(args: &Args) -> Self {
        Self {
            refresh_interval: args.refresh_duration(),
            retention: args.retention_duration(),
            probe_interval: args.interval_duration(),
            probe_timeout: args.timeout_duration(),
            count: if args.count == 0 { None } else { Some(args.count) },
        }
    }
}

/// Serde helper for Duration
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        duration.as_secs_f64().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Ok(Duration::from_secs_f64(secs))
    }
}
