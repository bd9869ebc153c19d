use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

/// Classified failure of a single echo exchange
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("address resolution failed: {0}")]
    Resolve(String),
    #[error("opening probe socket failed: {0}")]
    Socket(String),
    #[error("sending echo request failed: {0}")]
    Send(String),
    #[error("no reply before the timeout deadline")]
    Timeout,
    #[error("receiving reply failed: {0}")]
    Recv(String),
    #[error("unexpected reply: {0}")]
    UnexpectedReply(String),
}

/// Result of a single probe.
///
/// Exactly one of {rtt present, dropped, error without rtt or drop}
/// characterizes the outcome; rtt is only meaningful on success.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub sent_at: DateTime<Utc>,
    #[serde(with = "opt_ms_serde")]
    pub rtt: Option<Duration>,
    pub dropped: bool,
    pub error: Option<ProbeError>,
}

impl ProbeOutcome {
    /// Reply received before the deadline
    pub fn success(sent_at: DateTime<Utc>, rtt: Duration) -> Self {
        Self {
            sent_at,
            rtt: Some(rtt),
            dropped: false,
            error: None,
        }
    }

    /// No valid reply before the deadline - ordinary packet loss
    pub fn dropped(sent_at: DateTime<Utc>, error: ProbeError) -> Self {
        Self {
            sent_at,
            rtt: None,
            dropped: true,
            error: Some(error),
        }
    }

    /// The exchange failed before or outside the reply wait (resolution,
    /// socket, send, or an unexpected reply type)
    pub fn failed(sent_at: DateTime<Utc>, error: ProbeError) -> Self {
        Self {
            sent_at,
            rtt: None,
            dropped: false,
            error: Some(error),
        }
    }

    /// Round-trip latency in milliseconds, sub-millisecond precision
    pub fn latency_ms(&self) -> Option<f64> {
        self.rtt.map(|rtt| rtt.as_secs_f64() * 1000.0)
    }
}

/// Per-address probe history: a time-ordered window of outcomes plus
/// lifetime counters.
///
/// One instance per monitored address, guarded by that address's own lock.
/// The monitor loop is the only writer; the display reads snapshots under
/// the same lock.
#[derive(Debug, Default)]
pub struct History {
    /// Outcomes oldest-first; append-only except for head eviction
    entries: VecDeque<ProbeOutcome>,
    /// Completed attempts (success or drop); never decremented
    attempted: u64,
    /// Drops; never decremented
    dropped: u64,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one probe outcome.
    ///
    /// An attempt is counted when the probe completed: it either measured a
    /// latency or timed out. Resolution/send/parse failures touch neither
    /// counter, so protocol noise cannot dilute the loss rate.
    pub fn append(&mut self, outcome: ProbeOutcome) {
        if outcome.rtt.is_some() || outcome.dropped {
            self.attempted += 1;
        }
        if outcome.dropped {
            self.dropped += 1;
        }
        self.entries.push_back(outcome);
    }

    /// Drop entries older than the retention window.
    ///
    /// Entries are time-ordered, so this pops from the front until the first
    /// retained outcome - O(evicted), not O(history). A zero retention
    /// disables eviction entirely. Counters are lifetime aggregates and are
    /// never adjusted here.
    pub fn evict_expired(&mut self, now: DateTime<Utc>, retention: Duration) {
        if retention.is_zero() {
            return;
        }
        let Ok(window) = TimeDelta::from_std(retention) else {
            // Window exceeds the representable range; nothing can be too old
            return;
        };
        let cutoff = now - window;
        while self.entries.front().is_some_and(|e| e.sent_at < cutoff) {
            self.entries.pop_front();
        }
    }

    /// Most recent outcome, if any probe has completed
    pub fn latest(&self) -> Option<&ProbeOutcome> {
        self.entries.back()
    }

    /// Retained outcomes, oldest first
    pub fn entries(&self) -> impl Iterator<Item = &ProbeOutcome> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Lifetime completed attempts
    pub fn attempted(&self) -> u64 {
        self.attempted
    }

    /// Lifetime drops
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Lifetime loss percentage; None until the first completed attempt
    pub fn loss_pct(&self) -> Option<f64> {
        if self.attempted == 0 {
            None
        } else {
            Some(self.dropped as f64 / self.attempted as f64 * 100.0)
        }
    }

    /// Point-in-time view for rendering. Must be taken under the same lock
    /// as writes to avoid torn reads.
    pub fn snapshot(&self) -> Snapshot {
        let mut min_ms: Option<f64> = None;
        let mut max_ms: Option<f64> = None;
        let mut sum_ms = 0.0;
        let mut samples = 0u64;
        for entry in &self.entries {
            if let Some(ms) = entry.latency_ms() {
                min_ms = Some(min_ms.map_or(ms, |m: f64| m.min(ms)));
                max_ms = Some(max_ms.map_or(ms, |m: f64| m.max(ms)));
                sum_ms += ms;
                samples += 1;
            }
        }

        Snapshot {
            latest: self.entries.back().cloned(),
            attempted: self.attempted,
            dropped: self.dropped,
            loss_pct: self.loss_pct(),
            last_latency_ms: self
                .entries
                .iter()
                .rev()
                .find_map(|e| e.latency_ms()),
            window_len: self.entries.len(),
            window_min_ms: min_ms,
            window_avg_ms: (samples > 0).then(|| sum_ms / samples as f64),
            window_max_ms: max_ms,
        }
    }
}

/// A consistent read of one address's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub latest: Option<ProbeOutcome>,
    pub attempted: u64,
    pub dropped: u64,
    pub loss_pct: Option<f64>,
    /// Most recent measured latency in the retained window
    pub last_latency_ms: Option<f64>,
    pub window_len: usize,
    pub window_min_ms: Option<f64>,
    pub window_avg_ms: Option<f64>,
    pub window_max_ms: Option<f64>,
}

impl Snapshot {
    /// One display line for the address: latency and loss once at least one
    /// attempt has completed, the bare address before that. A target that
    /// only ever drops still renders, with loss=100.0%.
    pub fn status_line(&self, address: &str) -> String {
        if self.attempted == 0 {
            return address.to_string();
        }
        let latency = match self.last_latency_ms {
            Some(ms) => format!("{:.2}ms", ms),
            None => "-".to_string(),
        };
        let loss = self.loss_pct.unwrap_or(0.0);
        format!("{}: latency={} loss={:.1}%", address, latency, loss)
    }
}

/// Serde helper for Option<Duration> as fractional milliseconds
mod opt_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(rtt: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        rtt.map(|d| d.as_secs_f64() * 1000.0).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let ms = Option::<f64>::deserialize(deserializer)?;
        Ok(ms.map(|ms| Duration::from_secs_f64(ms / 1000.0)))
    }
}
