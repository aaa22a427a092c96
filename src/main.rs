//! Blob Sink Driver
//!
//! Feeds JSON-lines records from stdin into a `SinkTask` and drains every
//! buffer on EOF or Ctrl+C. Each line looks like:
//!
//! ```text
//! {"topic":"orders","partition":0,"offset":42,"value":{"id":1},"schemaless":false}
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | SINK_CONFIG | - | TOML file used as the base config |
//! | SINK_STORE_TYPE | azure | in_memory, local_fs, or azure |
//! | SINK_LOCAL_PATH | - | LocalFs root directory |
//! | SINK_ACCOUNT_NAME | - | Storage account |
//! | SINK_FILESYSTEM | - | ADLS filesystem (container) |
//! | SINK_ENDPOINT | - | Endpoint override |
//! | SINK_SAS_TOKEN | - | SAS token (leading '?' stripped) |
//! | SINK_BASE_PATH | kafka-export | Object key prefix |
//! | SINK_FLUSH_MAX_RECORDS | 500 | Records per object |
//! | SINK_COMPRESS_GZIP | false | Gzip objects |
//! | SINK_RETRY_MAX_ATTEMPTS | 3 | Transport retries, also batch redeliveries |
//! | SINK_FLUSH_INTERVAL_MS | 0 | Max buffer age, 0 disables |
//! | SINK_BATCH_SIZE | 100 | Lines per `put` |
//! | RUST_LOG | info | Log filter |
//! | LOG_FORMAT | text | text or json |

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use blob_sink::observability::{init_tracing, LogConfig};
use blob_sink::sink::{build_store, SinkClock, SinkConfig, SinkError, SinkRecord, SinkTask};
use std::process::ExitCode;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_BATCH_SIZE: usize = 100;
const RETRY_BACKOFF: Duration = Duration::from_millis(500);

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(e) = init_tracing(&LogConfig::from_env()) {
        eprintln!("failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("sink stopped: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), SinkError> {
    let config = SinkConfig::from_env()?;
    let batch_size = std::env::var("SINK_BATCH_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n: &usize| *n > 0)
        .unwrap_or(DEFAULT_BATCH_SIZE);

    info!(
        version = SinkTask::version(),
        store = ?config.store_type,
        batch_size,
        "starting blob sink"
    );

    let store = build_store(&config)?;
    let mut task = SinkTask::start(&config, store);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut batch = Vec::with_capacity(batch_size);

    // Ticks deliver whatever is pending so aged buffers flush while stdin is quiet
    let idle_every = if config.flush_interval_ms > 0 {
        config.flush_interval()
    } else {
        Duration::from_secs(3600)
    };
    let mut idle_tick = tokio::time::interval(idle_every);
    idle_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        if line.trim().is_empty() {
                            continue;
                        }
                        match SinkRecord::from_json_line(&line) {
                            Ok(record) => batch.push(record),
                            Err(e) => warn!("skipping malformed line: {}", e),
                        }
                        if batch.len() >= batch_size {
                            deliver(&mut task, std::mem::take(&mut batch), config.retry_max_attempts).await?;
                        }
                    }
                    Ok(None) => {
                        info!("end of input");
                        break;
                    }
                    Err(e) => {
                        error!("stdin read error: {}", e);
                        break;
                    }
                }
            }
            _ = idle_tick.tick(), if config.flush_interval_ms > 0 => {
                // a partial (possibly empty) batch still runs the age check
                deliver(&mut task, std::mem::take(&mut batch), config.retry_max_attempts).await?;
            }
            _ = signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    if !batch.is_empty() {
        deliver(&mut task, batch, config.retry_max_attempts).await?;
    }
    task.stop().await?;

    let stats = task.stats();
    info!(
        records = stats.records_received,
        flushes = stats.total_flushes(),
        bytes = stats.bytes_uploaded,
        "sink shutdown complete"
    );
    Ok(())
}

/// Hand one batch to the task, redelivering after retriable failures
///
/// Records appended before a failure stay buffered in the task, so only
/// the unconsumed tail is redelivered. Each retry first re-attempts the
/// buffers a failed size flush left full.
async fn deliver<C: SinkClock>(
    task: &mut SinkTask<C>,
    mut records: Vec<SinkRecord>,
    max_attempts: u32,
) -> Result<(), SinkError> {
    let mut attempt = 0;
    loop {
        let before = task.stats().records_received;
        let result = if attempt > 0 {
            match task.flush_full().await {
                Ok(()) => task.put(records.clone()).await,
                Err(e) => Err(e),
            }
        } else {
            task.put(records.clone()).await
        };
        match result {
            Ok(()) => return Ok(()),
            Err(e) if e.is_retriable() && attempt < max_attempts => {
                attempt += 1;
                warn!(attempt, max_attempts, "retrying batch after: {}", e);
                let consumed = (task.stats().records_received - before) as usize;
                records.drain(..consumed.min(records.len()));
                tokio::time::sleep(RETRY_BACKOFF).await;
            }
            Err(e) => return Err(e),
        }
    }
}
