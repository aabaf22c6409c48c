// ═══════════════════════════════════════════════════════════════
// METRICS COLLECTOR - How many emails did we read, and was it worth it
// ═══════════════════════════════════════════════════════════════
//
// Atomic counters for every stage of the pipeline, served as JSON over a
// hand-rolled HTTP responder. One GET, one answer, no framework.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{error, info};

use crate::classifier::EmailLabel;
use crate::dedup::{DedupSnapshot, MessageDeduplicator};
use crate::pipeline::{IngestOutcome, SkipReason};
use crate::publisher::{PublisherSnapshot, PublisherStats};

#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub emails_received: u64,
    pub emails_deduplicated: u64,
    pub emails_unreadable: u64,
    pub skipped_low_confidence: u64,
    pub skipped_unclassified: u64,
    pub skipped_missing_fields: u64,
    pub cargos_created: u64,
    pub vessels_created: u64,
    pub matches_suggested: u64,
    pub uptime_seconds: u64,
    pub emails_per_minute: f64,
    pub dedup: Option<DedupSnapshot>,
    pub publisher: Option<PublisherSnapshot>,
    pub status: String,
}

pub struct MetricsCollector {
    emails_received: AtomicU64,
    emails_deduplicated: AtomicU64,
    emails_unreadable: AtomicU64,
    skipped_low_confidence: AtomicU64,
    skipped_unclassified: AtomicU64,
    skipped_missing_fields: AtomicU64,
    cargos_created: AtomicU64,
    vessels_created: AtomicU64,
    matches_suggested: AtomicU64,
    dedup: Option<Arc<MessageDeduplicator>>,
    publisher: Option<Arc<PublisherStats>>,
    start_time: Instant,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            emails_received: AtomicU64::new(0),
            emails_deduplicated: AtomicU64::new(0),
            emails_unreadable: AtomicU64::new(0),
            skipped_low_confidence: AtomicU64::new(0),
            skipped_unclassified: AtomicU64::new(0),
            skipped_missing_fields: AtomicU64::new(0),
            cargos_created: AtomicU64::new(0),
            vessels_created: AtomicU64::new(0),
            matches_suggested: AtomicU64::new(0),
            dedup: None,
            publisher: None,
            start_time: Instant::now(),
        }
    }

    /// Fold the deduplicator's and the publisher's own counters into every snapshot.
    pub fn with_sources(
        mut self,
        dedup: Arc<MessageDeduplicator>,
        publisher: Arc<PublisherStats>,
    ) -> Self {
        self.dedup = Some(dedup);
        self.publisher = Some(publisher);
        self
    }

    pub fn increment_received(&self) {
        self.emails_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_deduplicated(&self) {
        self.emails_deduplicated.fetch_add(1, Ordering::Relaxed);
    }

    /// Files in the inbox that were not valid email JSON.
    pub fn increment_unreadable(&self) {
        self.emails_unreadable.fetch_add(1, Ordering::Relaxed);
    }

    /// Count whatever the pipeline decided about one email.
    pub fn record(&self, outcome: &IngestOutcome) {
        match outcome {
            IngestOutcome::Ingested { label, events, .. } => {
                match label {
                    EmailLabel::Cargo => self.cargos_created.fetch_add(1, Ordering::Relaxed),
                    _ => self.vessels_created.fetch_add(1, Ordering::Relaxed),
                };
                self.matches_suggested.fetch_add(events.len() as u64, Ordering::Relaxed);
            }
            IngestOutcome::Skipped { reason, .. } => {
                let counter = match reason {
                    SkipReason::LowConfidence { .. } => &self.skipped_low_confidence,
                    SkipReason::Empty | SkipReason::Unclassified => &self.skipped_unclassified,
                    SkipReason::MissingField(_) | SkipReason::InvalidRecord(_) => {
                        &self.skipped_missing_fields
                    }
                };
                counter.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let uptime = self.start_time.elapsed().as_secs();
        let received = self.emails_received.load(Ordering::Relaxed);
        let emails_per_minute = if uptime > 0 {
            (received as f64 / uptime as f64) * 60.0
        } else {
            0.0
        };

        MetricsSnapshot {
            emails_received: received,
            emails_deduplicated: self.emails_deduplicated.load(Ordering::Relaxed),
            emails_unreadable: self.emails_unreadable.load(Ordering::Relaxed),
            skipped_low_confidence: self.skipped_low_confidence.load(Ordering::Relaxed),
            skipped_unclassified: self.skipped_unclassified.load(Ordering::Relaxed),
            skipped_missing_fields: self.skipped_missing_fields.load(Ordering::Relaxed),
            cargos_created: self.cargos_created.load(Ordering::Relaxed),
            vessels_created: self.vessels_created.load(Ordering::Relaxed),
            matches_suggested: self.matches_suggested.load(Ordering::Relaxed),
            uptime_seconds: uptime,
            emails_per_minute,
            dedup: self.dedup.as_ref().map(|d| d.snapshot()),
            publisher: self.publisher.as_ref().map(|p| p.snapshot()),
            status: "operational".to_string(),
        }
    }
}

/// The full HTTP/1.1 response for one snapshot.
pub fn render_response(snapshot: &MetricsSnapshot) -> String {
    let json = serde_json::to_string_pretty(snapshot).unwrap_or_else(|_| "{}".to_string());
    format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nAccess-Control-Allow-Origin: *\r\nContent-Length: {}\r\n\r\n{}",
        json.len(),
        json,
    )
}

/// Answers every connection on `port` with the current snapshot until shutdown.
pub async fn run_metrics_server(
    metrics: Arc<MetricsCollector>,
    port: u16,
    shutdown: &mut watch::Receiver<bool>,
) {
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    let addr = format!("0.0.0.0:{port}");
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server on {}: {}", addr, e);
            return;
        }
    };

    info!("📊 Metrics server listening on http://{}", addr);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                match accept_result {
                    Ok((mut stream, _addr)) => {
                        let response = render_response(&metrics.snapshot());
                        let _ = stream.write_all(response.as_bytes()).await;
                    }
                    Err(e) => {
                        error!("Metrics server accept error: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                info!("Metrics server: shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_outcomes_land_in_the_right_buckets() {
        let m = MetricsCollector::new();
        m.increment_received();
        m.increment_received();
        m.record(&IngestOutcome::Ingested {
            label: EmailLabel::Cargo,
            record_id: Uuid::new_v4(),
            confidence: 0.6,
            events: vec![],
        });
        m.record(&IngestOutcome::Skipped {
            label: EmailLabel::Vessel,
            reason: SkipReason::MissingField("dwt"),
        });
        let s = m.snapshot();
        assert_eq!(s.emails_received, 2);
        assert_eq!(s.cargos_created, 1);
        assert_eq!(s.skipped_missing_fields, 1);
        assert_eq!(s.vessels_created, 0);
    }

    #[test]
    fn test_response_has_matching_content_length() {
        let response = render_response(&MetricsCollector::new().snapshot());
        let (head, body) = response.split_once("\r\n\r\n").unwrap();
        assert!(head.starts_with("HTTP/1.1 200 OK"));
        assert!(head.contains(&format!("Content-Length: {}", body.len())));
        assert!(body.contains("\"status\": \"operational\""));
    }

    #[test]
    fn test_attached_sources_show_up() {
        let dedup = Arc::new(MessageDeduplicator::new(
            100,
            0.01,
            10,
            std::time::Duration::from_secs(60),
        ));
        dedup.check_and_insert("a");
        dedup.check_and_insert("a");
        let m = MetricsCollector::new().with_sources(dedup, Arc::new(PublisherStats::default()));
        let s = m.snapshot();
        assert_eq!(s.dedup.unwrap().repeats, 1);
        assert_eq!(s.publisher.unwrap().events_published, 0);
    }
}
