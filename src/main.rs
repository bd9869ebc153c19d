use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use pingmon::cli::Args;
use pingmon::config::Settings;
use pingmon::monitor::Coordinator;
use pingmon::probe::check_permissions;
use pingmon::state::Snapshot;
use pingmon::tui::run_tui;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Check permissions early; without a working ICMP socket no monitor can
    // make progress
    if let Err(e) = check_permissions() {
        eprintln!("{}", e);
        std::process::exit(1);
    }

    let settings = Settings::from(&args);
    let coordinator = Coordinator::new(settings.clone(), &args.targets);

    // Cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Setup Ctrl+C handler
    let cancel_clone = cancel.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        cancel_clone.cancel();
    });

    // One monitor task per unique target
    let monitor_handles = coordinator.spawn_monitors(&cancel);

    // Run in appropriate mode
    if args.json {
        run_batch_mode(&coordinator, monitor_handles, cancel).await
    } else if args.no_tui {
        run_streaming_mode(&coordinator, monitor_handles, settings, cancel).await
    } else {
        run_interactive_mode(&coordinator, monitor_handles, settings, cancel).await
    }
}

/// Await every monitor, reporting per-target failures without aborting the
/// rest
async fn join_monitors(handles: Vec<JoinHandle<Result<()>>>) -> Result<()> {
    for handle in handles {
        if let Err(e) = handle.await? {
            eprintln!("Monitor stopped: {:#}", e);
        }
    }
    Ok(())
}

async fn run_interactive_mode(
    coordinator: &Coordinator,
    monitor_handles: Vec<JoinHandle<Result<()>>>,
    settings: Settings,
    cancel: CancellationToken,
) -> Result<()> {
    run_tui(
        coordinator.histories(),
        coordinator.addresses().to_vec(),
        settings,
        cancel.clone(),
    )
    .await?;

    // Cleanup
    cancel.cancel();
    join_monitors(monitor_handles).await
}

async fn run_streaming_mode(
    coordinator: &Coordinator,
    monitor_handles: Vec<JoinHandle<Result<()>>>,
    settings: Settings,
    cancel: CancellationToken,
) -> Result<()> {
    // End the stream once every monitor has spent its probe budget (with
    // -c) or the token is cancelled
    let all_done = cancel.clone();
    let watcher = tokio::spawn(async move {
        join_monitors(monitor_handles).await.ok();
        all_done.cancel();
    });

    let mut interval = tokio::time::interval(settings.refresh_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                break;
            }
            _ = interval.tick() => {
                for address in coordinator.addresses() {
                    if let Some(history) = coordinator.history(address) {
                        let snapshot = history.lock().snapshot();
                        println!("{}", snapshot.status_line(address));
                    }
                }
            }
        }
    }

    watcher.await?;
    Ok(())
}

/// Per-target summary for JSON output
#[derive(Serialize)]
struct TargetSummary {
    address: String,
    #[serde(flatten)]
    snapshot: Snapshot,
}

async fn run_batch_mode(
    coordinator: &Coordinator,
    monitor_handles: Vec<JoinHandle<Result<()>>>,
    cancel: CancellationToken,
) -> Result<()> {
    // Wait for every monitor to finish its probe budget (or Ctrl+C)
    join_monitors(monitor_handles).await?;
    cancel.cancel();

    let summaries: Vec<TargetSummary> = coordinator
        .addresses()
        .iter()
        .filter_map(|address| {
            coordinator.history(address).map(|history| TargetSummary {
                address: address.clone(),
                snapshot: history.lock().snapshot(),
            })
        })
        .collect();

    serde_json::to_writer_pretty(std::io::stdout(), &summaries)?;
    println!();
    Ok(())
}
