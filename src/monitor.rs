use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::probe::{get_identifier, probe};
use crate::state::{History, ProbeError};

/// Shared handle to one address's history
pub type HistoryHandle = Arc<Mutex<History>>;

/// Address to history, built once at startup and read-only afterwards.
/// Each history carries its own lock; the map itself needs none.
pub type HistoryMap = Arc<HashMap<String, HistoryHandle>>;

/// Consecutive socket-open failures before a monitor gives up
const MAX_SOCKET_ERRORS: u32 = 5;

/// Per-address probe loop: probe, record under the address's lock, wait for
/// the next tick, forever (or until cancelled / the probe budget is spent).
pub struct Monitor {
    settings: Settings,
    target: String,
    history: HistoryHandle,
    cancel: CancellationToken,
    identifier: u16,
    sequence: u16,
}

impl Monitor {
    pub fn new(
        settings: Settings,
        target: String,
        history: HistoryHandle,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            settings,
            target,
            history,
            cancel,
            identifier: get_identifier(),
            sequence: 0,
        }
    }

    /// Per-monitor sequence counter, so a stale reply from an earlier cycle
    /// never matches the current probe
    fn next_sequence(&mut self) -> u16 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    /// Run the monitor loop
    pub async fn run(mut self) -> Result<()> {
        let mut interval = tokio::time::interval(self.settings.probe_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut socket_errors: u32 = 0;
        let mut sent: u64 = 0;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    break;
                }
                _ = interval.tick() => {
                    if let Some(count) = self.settings.count
                        && sent >= count
                    {
                        break;
                    }

                    // The exchange blocks on the reply socket; run it off
                    // the async executor so no lock or worker is held while
                    // waiting
                    let target = self.target.clone();
                    let identifier = self.identifier;
                    let sequence = self.next_sequence();
                    let timeout = self.settings.probe_timeout;
                    let outcome = tokio::task::spawn_blocking(move || {
                        probe(&target, identifier, sequence, timeout)
                    })
                    .await?;
                    sent += 1;

                    // Transient failures are data; a loop that cannot open a
                    // socket at all cannot make progress
                    match outcome.error {
                        Some(ProbeError::Socket(ref e)) => {
                            socket_errors += 1;
                            eprintln!(
                                "{}: probe socket error ({}/{}): {}",
                                self.target, socket_errors, MAX_SOCKET_ERRORS, e
                            );
                        }
                        _ => socket_errors = 0,
                    }

                    {
                        let mut history = self.history.lock();
                        history.append(outcome);
                        history.evict_expired(Utc::now(), self.settings.retention);
                    }

                    if socket_errors >= MAX_SOCKET_ERRORS {
                        anyhow::bail!(
                            "{}: giving up after {} consecutive socket errors",
                            self.target,
                            socket_errors
                        );
                    }
                }
            }
        }

        Ok(())
    }
}

/// Owns the address-to-history map and starts one monitor per address.
/// Does not loop or sleep itself.
pub struct Coordinator {
    settings: Settings,
    addresses: Vec<String>,
    histories: HistoryMap,
}

impl Coordinator {
    /// Build one empty history per unique target. Duplicate entries collapse
    /// to the first occurrence; input order is preserved for display.
    pub fn new(settings: Settings, targets: &[String]) -> Self {
        let mut addresses = Vec::new();
        let mut map: HashMap<String, HistoryHandle> = HashMap::new();

        for target in targets {
            if map.contains_key(target) {
                eprintln!("Warning: Duplicate target {}, skipping", target);
                continue;
            }
            map.insert(target.clone(), Arc::new(Mutex::new(History::new())));
            addresses.push(target.clone());
        }

        Self {
            settings,
            addresses,
            histories: Arc::new(map),
        }
    }

    /// Monitored addresses in input order
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }

    /// The shared map, for read-only iteration by the display
    pub fn histories(&self) -> HistoryMap {
        self.histories.clone()
    }

    pub fn history(&self, address: &str) -> Option<HistoryHandle> {
        self.histories.get(address).cloned()
    }

    /// Spawn one monitor task per address, all sharing the same settings
    /// and cancellation token
    pub fn spawn_monitors(
        &self,
        cancel: &CancellationToken,
    ) -> Vec<tokio::task::JoinHandle<Result<()>>> {
        let mut handles = Vec::with_capacity(self.addresses.len());
        for address in &self.addresses {
            if let Some(history) = self.histories.get(address) {
                let monitor = Monitor::new(
                    self.settings.clone(),
                    address.clone(),
                    history.clone(),
                    cancel.clone(),
                );
                handles.push(tokio::spawn(monitor.run()));
            }
        }
        handles
    }
}
