//! transq command-line runner.
//!
//! Submits the given jobs to a managed queue, streams their lifecycle to
//! the terminal and exits once every job is terminal.

use std::collections::HashSet;

use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use transq::{Error, QueueConfig, TaskEvent, TaskQueueManager, detect_version, logging};

#[derive(Parser, Debug)]
#[command(name = "transq", version, about = "Run transcoder jobs through a managed queue")]
struct Cli {
    /// Path to the transcoder binary.
    #[arg(long, default_value = "ffmpeg")]
    binary: String,

    /// Maximum number of concurrently running jobs.
    #[arg(short = 'j', long, default_value_t = 2)]
    jobs: usize,

    /// Priority applied to every submitted job (higher runs first).
    #[arg(short, long, default_value_t = 0)]
    priority: i32,

    /// A job to run: the transcoder argument string, quoted.
    /// Repeat the flag to queue several jobs.
    #[arg(long = "run", required = true)]
    runs: Vec<String>,
}

#[tokio::main]
async fn main() -> transq::Result<()> {
    logging::init();
    let cli = Cli::parse();

    match detect_version(&cli.binary) {
        Some(version) => info!("Using transcoder: {}", version),
        None => warn!("Transcoder binary {:?} not detected; jobs may fail to launch", cli.binary),
    }

    let config = QueueConfig::default()
        .with_binary_path(cli.binary)
        .with_concurrency_limit(cli.jobs);
    let manager = TaskQueueManager::new(config);
    let mut events = manager.subscribe();

    let mut pending: HashSet<String> = HashSet::new();
    for run in &cli.runs {
        let command: Vec<String> = run.split_whitespace().map(str::to_string).collect();
        if command.is_empty() {
            return Err(Error::validation("empty job argument string"));
        }
        pending.insert(manager.submit(command, cli.priority));
    }

    loop {
        tokio::select! {
            _ = signal::ctrl_c() => {
                warn!("Interrupted, cancelling all tasks");
                manager.shutdown();
            }
            event = events.recv() => match event {
                Ok(event) => {
                    match &event {
                        TaskEvent::TaskOutput { chunk, .. } => debug!("{}", chunk),
                        other => info!("{}", other.description()),
                    }
                    if event.terminal_view().is_some()
                        && pending.remove(event.task_id())
                        && pending.is_empty()
                    {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    }

    for view in manager.get_completed() {
        info!(
            "{}: {} ({:.1}%){}",
            view.id,
            view.status,
            view.progress,
            view.error.as_deref().map(|e| format!(" - {}", e)).unwrap_or_default()
        );
    }

    Ok(())
}
