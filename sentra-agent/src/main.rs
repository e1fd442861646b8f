// sentra-agent/src/main.rs

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam::channel::bounded;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::flag;

use sentra_agent::pipeline::{Pipeline, PipelineConfig, RetryPolicy};
use sentra_agent::{AgentConfig, DiskSpool, EventFilter, Reader, Router, TcpSender};
use sentra_core::{log_info, log_warn, set_log_level, LogLevel};

/// Depth of the parsed-event channel between routers and the pipeline.
const EVENT_CHANNEL_CAPACITY: usize = 100;

#[derive(Parser)]
#[command(name = "sentra-agent")]
#[command(about = "Sentra host agent - tails logs and ships security events")]
#[command(version)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(long, env = "CONFIG_PATH", default_value = "configs/agent.yaml")]
    config: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = AgentConfig::load(&args.config)
        .with_context(|| format!("loading config from {}", args.config))?;

    if let Some(level) = LogLevel::parse(&config.log_level) {
        set_log_level(level);
    }
    sentra_core::init_from_env();

    log_info!("sentra-agent starting");
    log_info!("agent id: {}", config.agent.id);
    log_info!(
        "target store: {}:{} (collection '{}')",
        config.server.host,
        config.server.port,
        config.collection
    );

    let spool = Arc::new(
        DiskSpool::new(
            &config.spool.directory,
            config.spool.max_segment_bytes,
            config.spool.max_total_bytes,
        )
        .with_context(|| format!("creating spool in {}", config.spool.directory))?,
    );
    log_info!(
        "spool ready: {} ({} events pending)",
        config.spool.directory,
        spool.pending_events()
    );

    let filter = EventFilter::new(&config.filters).context("compiling event filters")?;
    log_info!(
        "filter ready (threshold: '{}')",
        config.filters.severity_threshold
    );

    let sender = TcpSender::new(
        &config.server.host,
        config.server.port,
        config.collection.clone(),
    );

    let (event_tx, event_rx) = bounded(EVENT_CHANNEL_CAPACITY);
    let pipeline = Pipeline::start(
        event_rx,
        Box::new(sender),
        Arc::clone(&spool),
        filter,
        PipelineConfig {
            batch_size: config.agent.batch_size,
            flush_interval: config.agent.flush_interval,
            retry: RetryPolicy {
                max_attempts: config.retry.max_attempts,
                initial_delay: config.retry.initial_delay,
                max_delay: config.retry.max_delay,
            },
        },
    );
    log_info!(
        "pipeline started (batch_size: {}, flush_interval: {:?})",
        config.agent.batch_size,
        config.agent.flush_interval
    );

    let router = Router::new(config.agent.id.clone());
    let mut readers = Vec::new();
    let mut router_handles = Vec::new();

    for source in &config.agent.sources {
        let path = source_path(source);
        let reader = match Reader::spawn(&path) {
            Ok(reader) => reader,
            Err(e) => {
                log_warn!("cannot monitor {} ({}): {}", source, path, e);
                continue;
            }
        };
        router_handles.push(router.spawn(
            source.clone(),
            reader.lines(),
            reader.errors(),
            event_tx.clone(),
        ));
        readers.push(reader);
        log_info!("monitoring {} ({})", source, path);
    }
    // routers hold their own clones
    drop(event_tx);

    if readers.is_empty() {
        log_warn!("no sources could be opened; only the spool drain will run");
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    flag::register(SIGTERM, Arc::clone(&shutdown))?;
    flag::register(SIGINT, Arc::clone(&shutdown))?;
    while !shutdown.load(Ordering::Relaxed) {
        std::thread::sleep(Duration::from_millis(200));
    }

    log_info!("shutting down");
    // stop order: readers first, routers follow their channels, the
    // pipeline flushes once its event channel closes
    for reader in readers {
        reader.stop();
    }
    for handle in router_handles {
        let _ = handle.join();
    }
    let stats = pipeline.join();
    log_info!(
        "stopped: received={} filtered={} sent={} drained={} spilled={} dropped={}",
        stats.received,
        stats.filtered,
        stats.sent,
        stats.drained,
        stats.spilled,
        stats.dropped
    );
    Ok(())
}

/// Map well-known source names onto their usual file paths; anything else
/// is taken as a literal path.
fn source_path(source: &str) -> String {
    match source {
        "auditd" => "/var/log/audit/audit.log".to_string(),
        "syslog" => "/var/log/syslog".to_string(),
        "bash_history" => {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/root".to_string());
            format!("{}/.bash_history", home)
        }
        path => path.to_string(),
    }
}
