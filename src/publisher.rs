// =============================================================================
// publisher.rs — THE FIXTURE WIRE
// =============================================================================
//
// Match suggestions come off a crossbeam channel and go out two ways:
//
// 1. PUBLISH on a pub/sub channel, for whoever is watching right now.
// 2. ZADD into a sorted set scored by emission time, for whoever shows up
//    after lunch and wants to know what they missed.
//
// Events are drained in batches. A Redis outage costs us the batch in
// flight (counted, logged) but never the engine.
// =============================================================================

use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError};
use portable_atomic::{AtomicU64, Ordering};
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::models::MatchEvent;

const BATCH_SIZE: usize = 50;

pub struct RedisPublisher {
    config: Arc<Config>,
    receiver: Receiver<MatchEvent>,
    shutdown: watch::Receiver<bool>,
    stats: Arc<PublisherStats>,
}

#[derive(Default)]
pub struct PublisherStats {
    pub events_published: AtomicU64,
    pub events_persisted: AtomicU64,
    pub publish_errors: AtomicU64,
    pub batches_sent: AtomicU64,
}

impl PublisherStats {
    pub fn snapshot(&self) -> PublisherSnapshot {
        PublisherSnapshot {
            events_published: self.events_published.load(Ordering::Relaxed),
            events_persisted: self.events_persisted.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PublisherSnapshot {
    pub events_published: u64,
    pub events_persisted: u64,
    pub publish_errors: u64,
    pub batches_sent: u64,
}

/// JSON payload and sorted-set score (unix seconds) for one event.
pub fn encode(event: &MatchEvent) -> Result<(String, f64)> {
    Ok((serde_json::to_string(event)?, event.emitted_at.timestamp() as f64))
}

impl RedisPublisher {
    pub fn new(
        config: Arc<Config>,
        receiver: Receiver<MatchEvent>,
        shutdown: watch::Receiver<bool>,
    ) -> (Self, Arc<PublisherStats>) {
        let stats = Arc::new(PublisherStats::default());
        (Self { config, receiver, shutdown, stats: Arc::clone(&stats) }, stats)
    }

    /// Runs until shutdown, then drains whatever is still queued.
    pub async fn run(self) -> Result<()> {
        info!(
            channel = %self.config.redis_channel,
            sorted_set = %self.config.redis_sorted_set,
            "📡 Publisher starting, brokers will hear about every fixture"
        );

        let client = redis::Client::open(self.config.redis_url.as_str())?;
        let mut con = loop {
            match client.get_multiplexed_async_connection().await {
                Ok(con) => {
                    info!("Redis connection established");
                    break con;
                }
                Err(e) => {
                    warn!(error = %e, "Redis unreachable, retrying in 5 seconds");
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    if *self.shutdown.borrow() {
                        info!("Shutdown during Redis retry, publisher exiting");
                        return Ok(());
                    }
                }
            }
        };

        let mut batch: Vec<MatchEvent> = Vec::with_capacity(BATCH_SIZE);
        loop {
            if *self.shutdown.borrow() {
                batch.clear();
                batch.extend(self.receiver.try_iter());
                if !batch.is_empty() {
                    info!(remaining = batch.len(), "Draining queued match events before shutdown");
                    self.publish_or_count(&mut con, &batch).await;
                }
                info!("Publisher shut down");
                return Ok(());
            }

            batch.clear();
            while batch.len() < BATCH_SIZE {
                match self.receiver.try_recv() {
                    Ok(event) => batch.push(event),
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => {
                        if !batch.is_empty() {
                            self.publish_or_count(&mut con, &batch).await;
                        }
                        info!("Event channel closed, publisher exiting");
                        return Ok(());
                    }
                }
            }

            if batch.is_empty() {
                tokio::time::sleep(Duration::from_millis(100)).await;
                continue;
            }
            self.publish_or_count(&mut con, &batch).await;
        }
    }

    async fn publish_or_count(
        &self,
        con: &mut redis::aio::MultiplexedConnection,
        batch: &[MatchEvent],
    ) {
        if let Err(e) = self.publish_batch(con, batch).await {
            error!(error = %e, batch_size = batch.len(), "Failed to publish match batch");
            self.stats.publish_errors.fetch_add(batch.len() as u64, Ordering::Relaxed);
        }
    }

    async fn publish_batch(
        &self,
        con: &mut redis::aio::MultiplexedConnection,
        batch: &[MatchEvent],
    ) -> Result<()> {
        for event in batch {
            let (json, score) = encode(event)?;

            let _: () = con.publish(&self.config.redis_channel, &json).await?;
            self.stats.events_published.fetch_add(1, Ordering::Relaxed);

            let _: () = con.zadd(&self.config.redis_sorted_set, &json, score).await?;
            self.stats.events_persisted.fetch_add(1, Ordering::Relaxed);

            info!(
                match_id = %event.match_id,
                cargo_id = %event.cargo_id,
                vessel_id = %event.vessel_id,
                score = event.score,
                recommendation = %event.recommendation,
                "🚢 Match published"
            );
        }

        self.stats.batches_sent.fetch_add(1, Ordering::Relaxed);
        debug!(
            batch_size = batch.len(),
            total_published = self.stats.events_published.load(Ordering::Relaxed),
            "Batch published"
        );
        Ok(())
    }
}
