// =============================================================================
// inbox.rs — THE PIGEONHOLE
// =============================================================================
//
// Whatever actually talks to the mail server (IMAP, a forwarding rule, an
// intern) drops each message into a directory as `<anything>.json`:
//
//     { "subject": "...", "from": "...", "body": "...", "receivedAt": "..." }
//
// This task sweeps that directory on a timer, throws away repeats, and hands
// fresh messages to the processor over a crossbeam channel. Every file it has
// dealt with is renamed so the next sweep does not see it again:
//
//   *.processed  read, whether it was new or a repeat
//   *.rejected   not valid email JSON
//
// If the processor is backed up the file is left alone for the next sweep.
// =============================================================================

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::dedup::MessageDeduplicator;
use crate::metrics::MetricsCollector;
use crate::models::EmailMessage;

/// What one sweep of the inbox did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub forwarded: usize,
    pub repeats: usize,
    pub rejected: usize,
    /// Left in place because the processor queue was full.
    pub deferred: usize,
    /// The processor hung up. Nothing more will be forwarded.
    pub processor_gone: bool,
}

pub struct Inbox {
    dir: PathBuf,
    tx: Sender<EmailMessage>,
    dedup: Arc<MessageDeduplicator>,
    metrics: Arc<MetricsCollector>,
}

impl Inbox {
    pub fn new(
        dir: impl Into<PathBuf>,
        tx: Sender<EmailMessage>,
        dedup: Arc<MessageDeduplicator>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { dir: dir.into(), tx, dedup, metrics }
    }

    /// Sweep once. Files are taken in name order so that collaborators who
    /// name by timestamp get first-in first-out.
    pub async fn sweep(&self) -> Result<SweepReport> {
        let mut report = SweepReport::default();
        let pending = self.pending().await?;
        for (i, path) in pending.iter().enumerate() {
            // Checked before dedup, so a deferred file is not remembered as seen.
            if self.tx.is_full() {
                report.deferred = pending.len() - i;
                warn!(deferred = report.deferred, "Processor queue full, deferring rest of sweep");
                break;
            }

            let raw = match tokio::fs::read_to_string(path).await {
                Ok(raw) => raw,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Could not read inbox file, will retry"
                    );
                    continue;
                }
            };

            let email: EmailMessage = match serde_json::from_str(&raw) {
                Ok(email) => email,
                Err(e) => {
                    warn!(
                        path = %path.display(),
                        error = %e,
                        "Inbox file is not an email, rejecting"
                    );
                    self.metrics.increment_unreadable();
                    retire(path, "rejected").await;
                    report.rejected += 1;
                    continue;
                }
            };

            if !self.dedup.is_new(&email) {
                debug!(path = %path.display(), "Repeat email, not forwarding");
                self.metrics.increment_deduplicated();
                retire(path, "processed").await;
                report.repeats += 1;
                continue;
            }

            match self.tx.try_send(email) {
                Ok(()) => {
                    self.metrics.increment_received();
                    retire(path, "processed").await;
                    report.forwarded += 1;
                }
                // Single producer: nobody else can have filled the queue since the check.
                Err(TrySendError::Full(_)) => {
                    report.deferred = pending.len() - i;
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    report.processor_gone = true;
                    break;
                }
            }
        }
        Ok(report)
    }

    async fn pending(&self) -> Result<Vec<PathBuf>> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .with_context(|| format!("reading inbox {}", self.dir.display()))?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

async fn retire(path: &Path, suffix: &str) {
    let mut target = path.as_os_str().to_owned();
    target.push(".");
    target.push(suffix);
    if let Err(e) = tokio::fs::rename(path, &target).await {
        error!(path = %path.display(), error = %e, "Could not retire inbox file");
    }
}

/// Poll the inbox until shutdown.
pub async fn run(inbox: Inbox, config: Arc<Config>, shutdown: &mut watch::Receiver<bool>) {
    if let Err(e) = tokio::fs::create_dir_all(&inbox.dir).await {
        error!(dir = %inbox.dir.display(), error = %e, "Cannot create inbox directory");
        return;
    }

    let poll_interval = config.inbox_poll_interval;
    info!(
        dir = %inbox.dir.display(),
        poll_interval_secs = poll_interval.as_secs(),
        "📬 Inbox watching for broker emails"
    );

    loop {
        tokio::select! {
            _ = tokio::time::sleep(poll_interval) => {
                match inbox.sweep().await {
                    Ok(report) if report.processor_gone => {
                        warn!("Processor channel closed, inbox stopping");
                        return;
                    }
                    Ok(report) if report != SweepReport::default() => {
                        info!(
                            forwarded = report.forwarded,
                            repeats = report.repeats,
                            rejected = report.rejected,
                            deferred = report.deferred,
                            "Inbox swept"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => error!(error = %e, "Inbox sweep failed"),
                }
            }
            _ = shutdown.changed() => {
                info!("Inbox: shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use uuid::Uuid;

    fn scratch_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("freight-inbox-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn inbox(dir: &Path, capacity: usize) -> (Inbox, crossbeam_channel::Receiver<EmailMessage>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        let dedup = Arc::new(MessageDeduplicator::new(1000, 0.01, 100, Duration::from_secs(3600)));
        (Inbox::new(dir, tx, dedup, Arc::new(MetricsCollector::new())), rx)
    }

    fn drop_email(dir: &Path, name: &str, body: &str) {
        let json = serde_json::json!({
            "subject": "Wheat",
            "from": "desk@broker.example",
            "body": body,
        });
        std::fs::write(dir.join(name), json.to_string()).unwrap();
    }

    #[tokio::test]
    async fn test_sweep_forwards_new_and_drops_repeats() {
        let dir = scratch_dir();
        drop_email(&dir, "001.json", "25,000 mt wheat\nload: Constanta");
        drop_email(&dir, "002.json", "25,000 mt wheat  load: Constanta");
        std::fs::write(dir.join("003.json"), "not json at all").unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let (inbox, rx) = inbox(&dir, 10);
        let report = inbox.sweep().await.unwrap();

        assert_eq!(
            report,
            SweepReport { forwarded: 1, repeats: 1, rejected: 1, ..Default::default() }
        );
        assert_eq!(rx.try_iter().count(), 1);
        assert!(dir.join("001.json.processed").exists());
        assert!(dir.join("003.json.rejected").exists());
        assert!(dir.join("notes.txt").exists());

        let again = inbox.sweep().await.unwrap();
        assert_eq!(again, SweepReport::default());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_full_queue_defers() {
        let dir = scratch_dir();
        drop_email(&dir, "001.json", "25,000 mt wheat");
        drop_email(&dir, "002.json", "30,000 mt barley");

        let (inbox, rx) = inbox(&dir, 1);
        let report = inbox.sweep().await.unwrap();
        assert_eq!((report.forwarded, report.deferred), (1, 1));
        assert!(dir.join("002.json").exists());

        // Once the processor catches up the deferred file goes through, not as a repeat.
        rx.try_recv().unwrap();
        let report = inbox.sweep().await.unwrap();
        assert_eq!(report.forwarded, 1);
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_hung_up_processor_is_reported() {
        let dir = scratch_dir();
        drop_email(&dir, "001.json", "25,000 mt wheat");
        let (inbox, rx) = inbox(&dir, 1);
        drop(rx);
        assert!(inbox.sweep().await.unwrap().processor_gone);
        assert!(dir.join("001.json").exists());
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_directory_is_an_error() {
        let (inbox, _rx) = inbox(Path::new("/definitely/not/a/real/inbox"), 1);
        assert!(inbox.sweep().await.is_err());
    }
}
