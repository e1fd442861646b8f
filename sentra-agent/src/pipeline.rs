// sentra-agent/src/pipeline.rs
// The batching stage: filter, accumulate, flush on size or tick, retry
// with exponential backoff, spill to disk when the store stays down, and
// drain the spool after the next successful send.
//
// Accounting invariant, checked by tests: every received event ends up in
// exactly one of filtered / sent / spool / dropped (plus the in-memory
// batch while running).

use crossbeam::channel::{select, tick, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::event::Event;
use crate::filter::EventFilter;
use crate::sender::BatchSender;
use crate::spool::DiskSpool;
use sentra_core::{log_debug, log_error, log_info, log_warn};

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub batch_size: usize,
    pub flush_interval: Duration,
    pub retry: RetryPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            batch_size: 50,
            flush_interval: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStats {
    pub received: u64,
    pub filtered: u64,
    /// Events delivered straight from the in-memory batch.
    pub sent: u64,
    /// Events replayed out of the spool.
    pub drained: u64,
    /// Events written into the spool (they leave it via `drained`).
    pub spilled: u64,
    /// Events lost because the spool was full.
    pub dropped: u64,
}

pub struct Pipeline {
    handle: JoinHandle<PipelineStats>,
}

impl Pipeline {
    /// Spawn the pipeline thread. It runs until the event channel closes
    /// (readers stopped), flushes the tail best-effort, and reports its
    /// counters.
    pub fn start(
        events: Receiver<Event>,
        sender: Box<dyn BatchSender>,
        spool: Arc<DiskSpool>,
        filter: EventFilter,
        config: PipelineConfig,
    ) -> Pipeline {
        let handle = std::thread::spawn(move || run(events, sender, spool, filter, config));
        Pipeline { handle }
    }

    /// Wait for the final flush and collect the counters.
    pub fn join(self) -> PipelineStats {
        self.handle.join().unwrap_or_default()
    }
}

fn run(
    events: Receiver<Event>,
    mut sender: Box<dyn BatchSender>,
    spool: Arc<DiskSpool>,
    filter: EventFilter,
    config: PipelineConfig,
) -> PipelineStats {
    let mut stats = PipelineStats::default();
    let mut batch: Vec<Event> = Vec::with_capacity(config.batch_size);
    let ticker = tick(config.flush_interval);

    loop {
        select! {
            recv(events) -> msg => match msg {
                Ok(event) => {
                    stats.received += 1;
                    if !filter.matches(&event) {
                        stats.filtered += 1;
                        continue;
                    }
                    batch.push(event);
                    if batch.len() >= config.batch_size {
                        flush(&mut batch, sender.as_mut(), &spool, &config.retry, &mut stats, false);
                    }
                }
                Err(_) => {
                    // producers closed: final flush, no spool drain
                    flush(&mut batch, sender.as_mut(), &spool, &config.retry, &mut stats, true);
                    log_info!(
                        "pipeline stopped: received={} filtered={} sent={} drained={} spilled={} dropped={}",
                        stats.received, stats.filtered, stats.sent,
                        stats.drained, stats.spilled, stats.dropped
                    );
                    return stats;
                }
            },
            recv(ticker) -> _ => {
                if !batch.is_empty() {
                    flush(&mut batch, sender.as_mut(), &spool, &config.retry, &mut stats, false);
                }
            }
        }
    }
}

/// Deliver the batch, retrying with exponential backoff. Exhausted retries
/// spill to disk; a successful delivery triggers one drain pass. During
/// shutdown there is a single attempt and no drain.
fn flush(
    batch: &mut Vec<Event>,
    sender: &mut dyn BatchSender,
    spool: &DiskSpool,
    retry: &RetryPolicy,
    stats: &mut PipelineStats,
    shutting_down: bool,
) {
    if batch.is_empty() {
        return;
    }

    let attempts = if shutting_down {
        1
    } else {
        retry.max_attempts.max(1)
    };
    let mut delay = retry.initial_delay;

    for attempt in 1..=attempts {
        match sender.send(batch) {
            Ok(()) => {
                stats.sent += batch.len() as u64;
                log_debug!("flushed {} events", batch.len());
                batch.clear();
                if !shutting_down {
                    let drained = spool.drain(|spooled| {
                        sender.send(spooled).map_err(|e| e.to_string())
                    });
                    if drained.events_sent > 0 {
                        log_info!("drained {} spooled events", drained.events_sent);
                        stats.drained += drained.events_sent as u64;
                    }
                }
                return;
            }
            Err(e) => {
                log_warn!("batch send failed (attempt {}/{}): {}", attempt, attempts, e);
                if attempt < attempts {
                    std::thread::sleep(delay);
                    delay = (delay * 2).min(retry.max_delay);
                }
            }
        }
    }

    // store unreachable: spill and move on
    match spool.spill(batch) {
        Ok(()) => {
            stats.spilled += batch.len() as u64;
            log_info!("spilled {} events to disk", batch.len());
        }
        Err(e) => {
            stats.dropped += batch.len() as u64;
            log_error!("spill failed, dropping {} events: {}", batch.len(), e);
        }
    }
    batch.clear();
}
