//! Outbox publisher: periodic drain of pending events to the external channel.

use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::channel::EventChannel;
use crate::store::EventOutbox;

/// Publisher configuration.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Fixed delay between the end of one pass and the start of the next.
    pub period: Duration,
    /// How many pending events to fetch per page.
    pub page_size: usize,
    /// Name for logging and the worker thread.
    pub name: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(5),
            page_size: 100,
            name: "outbox-publisher".to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Result of a single drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct DrainStats {
    /// Pages fetched during the pass.
    pub pages: usize,
    /// Events published and marked delivered.
    pub published: u64,
    /// Publish attempts that failed (events left pending).
    pub failed: u64,
}

/// Cumulative statistics of a running publisher.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct PublisherStats {
    pub cycles: u64,
    pub published: u64,
    pub failed: u64,
}

/// Handle to control a running publisher.
#[derive(Debug)]
pub struct PublisherHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<PublisherStats>>,
}

impl PublisherHandle {
    /// Request graceful shutdown and wait for the worker to stop.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Cumulative statistics so far.
    pub fn stats(&self) -> PublisherStats {
        self.stats.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

/// Background publisher that drains the outbox to the external channel.
///
/// Invocations are serialized: a pass runs on a single dedicated thread and
/// the next one starts only after the previous pass and the fixed delay have
/// both completed. Running more than one publisher instance against the same
/// outbox is not coordinated and can duplicate publishes (acceptable under
/// at-least-once semantics).
pub struct OutboxPublisher<O, C> {
    outbox: Arc<O>,
    channel: Arc<C>,
}

impl<O, C> OutboxPublisher<O, C>
where
    O: EventOutbox + 'static,
    C: EventChannel + 'static,
{
    pub fn new(outbox: Arc<O>, channel: Arc<C>) -> Self {
        Self { outbox, channel }
    }

    /// One publisher invocation: drain all currently-pending events.
    ///
    /// Pages through the backlog oldest-first. Each published event is marked
    /// delivered immediately; a failed publish is logged and the event stays
    /// pending for the next invocation. The pass ends when a page comes back
    /// short of `page_size`, or when a full page makes no progress (channel
    /// down) — retrying within the same invocation would spin.
    pub fn run_once(&self, page_size: usize) -> DrainStats {
        let mut stats = DrainStats::default();

        loop {
            let page = match self.outbox.page_undelivered(page_size) {
                Ok(page) => page,
                Err(e) => {
                    error!(error = %e, "failed to page pending outbox events");
                    return stats;
                }
            };
            stats.pages += 1;
            let page_len = page.len();
            let mut delivered_in_page = 0u64;

            for event in page {
                match self.channel.publish(&event.payload) {
                    Ok(()) => match self.outbox.mark_delivered(event.id) {
                        Ok(()) => {
                            delivered_in_page += 1;
                            stats.published += 1;
                        }
                        Err(e) => {
                            // The event went out but stays pending; it will be
                            // republished next cycle (at-least-once).
                            warn!(event_id = %event.id, error = %e, "published but failed to mark delivered");
                            stats.failed += 1;
                        }
                    },
                    Err(e) => {
                        warn!(event_id = %event.id, error = %e, "failed to publish outbox event");
                        stats.failed += 1;
                    }
                }
            }

            if page_len < page_size || delivered_in_page == 0 {
                break;
            }
        }

        debug!(
            pages = stats.pages,
            published = stats.published,
            failed = stats.failed,
            "outbox drain pass finished"
        );
        stats
    }

    /// Spawn the periodic publisher on a dedicated thread.
    ///
    /// Runs a pass immediately, then every `config.period` (fixed delay).
    pub fn spawn(self, config: PublisherConfig) -> PublisherHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(PublisherStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || publisher_loop(self, config, shutdown_rx, stats_clone))
            .expect("failed to spawn outbox publisher thread");

        PublisherHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }
}

fn publisher_loop<O, C>(
    publisher: OutboxPublisher<O, C>,
    config: PublisherConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<PublisherStats>>,
) where
    O: EventOutbox + 'static,
    C: EventChannel + 'static,
{
    info!(publisher = %config.name, "outbox publisher started");

    loop {
        let pass = publisher.run_once(config.page_size);

        if let Ok(mut s) = stats.lock() {
            s.cycles += 1;
            s.published += pass.published;
            s.failed += pass.failed;
        }

        // Fixed delay; the shutdown channel doubles as the timer.
        match shutdown_rx.recv_timeout(config.period) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
        }
    }

    info!(publisher = %config.name, "outbox publisher stopped");
}
