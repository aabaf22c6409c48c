// =============================================================================
// dedup.rs — HAVEN'T I READ THIS ONE ALREADY?
// =============================================================================
//
// Brokers forward. Then other brokers forward the forward. A single cargo
// order for 25,000 MT of wheat can land in the inbox six times in an hour,
// and every copy would otherwise become its own cargo record with its own
// shortlist of ships. The desk would think the Black Sea had tripled its
// grain exports overnight.
//
// So every message is fingerprinted (sender, subject, body with whitespace
// squashed) and run past a Bloom filter + LRU pair:
//
// 1. Bloom says "never seen": it is new. Bloom filters do not lie in that
//    direction.
// 2. Bloom says "maybe": ask the LRU, which remembers exact fingerprints.
// 3. The Bloom filter is replaced with an empty one on a timer so it never
//    saturates into saying "maybe" to everything.
// =============================================================================

use bloomfilter::Bloom;
use lru::LruCache;
use parking_lot::RwLock;
use portable_atomic::{AtomicU64, Ordering};
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::models::EmailMessage;

/// Remembers which emails have already been through the pipeline.
pub struct MessageDeduplicator {
    bloom: RwLock<Bloom<String>>,
    /// The exact-answer backstop for Bloom "maybe"s.
    recent: RwLock<LruCache<String, ()>>,
    last_rotation: RwLock<Instant>,
    rotation_interval: Duration,
    expected_items: u64,
    fp_rate: f64,
    stats: DedupStats,
}

#[derive(Default)]
struct DedupStats {
    checks: AtomicU64,
    fresh: AtomicU64,
    repeats: AtomicU64,
    rotations: AtomicU64,
    /// Bloom said "maybe", LRU said "no".
    rescued: AtomicU64,
}

impl MessageDeduplicator {
    pub fn new(
        expected_items: u64,
        fp_rate: f64,
        lru_capacity: usize,
        rotation_interval: Duration,
    ) -> Self {
        info!(
            expected_items = expected_items,
            fp_rate = fp_rate,
            lru_capacity = lru_capacity,
            rotation_secs = rotation_interval.as_secs(),
            "Message deduplicator ready, forwards of forwards will be ignored"
        );

        let capacity = NonZeroUsize::new(lru_capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            bloom: RwLock::new(Bloom::new_for_fp_rate(expected_items as usize, fp_rate)),
            recent: RwLock::new(LruCache::new(capacity)),
            last_rotation: RwLock::new(Instant::now()),
            rotation_interval,
            expected_items,
            fp_rate,
            stats: DedupStats::default(),
        }
    }

    /// `true` the first time an email is seen, `false` for every repeat.
    pub fn is_new(&self, email: &EmailMessage) -> bool {
        self.check_and_insert(&email.fingerprint())
    }

    /// Same as [`is_new`](Self::is_new) for a precomputed fingerprint.
    pub fn check_and_insert(&self, fingerprint: &str) -> bool {
        self.stats.checks.fetch_add(1, Ordering::Relaxed);
        self.maybe_rotate();

        let key = fingerprint.to_string();
        if self.bloom.read().check(&key) {
            let mut recent = self.recent.write();
            if recent.get(&key).is_some() {
                self.stats.repeats.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint_len = key.len(), "Repeat email dropped");
                return false;
            }
            self.stats.rescued.fetch_add(1, Ordering::Relaxed);
            debug!("Bloom false positive, LRU vouches the email is new");
        }

        self.bloom.write().set(&key);
        self.recent.write().put(key, ());
        self.stats.fresh.fetch_add(1, Ordering::Relaxed);
        true
    }

    /// Swap in an empty Bloom filter once the interval has passed. The LRU
    /// stays; it evicts on its own.
    fn maybe_rotate(&self) {
        if self.last_rotation.read().elapsed() < self.rotation_interval {
            return;
        }

        let mut bloom = self.bloom.write();
        let mut last = self.last_rotation.write();
        // Somebody else may have rotated while we waited on the lock.
        if last.elapsed() >= self.rotation_interval {
            *bloom = Bloom::new_for_fp_rate(self.expected_items as usize, self.fp_rate);
            *last = Instant::now();
            self.stats.rotations.fetch_add(1, Ordering::Relaxed);
            info!("Dedup bloom filter rotated");
        }
    }

    pub fn snapshot(&self) -> DedupSnapshot {
        DedupSnapshot {
            checks: self.stats.checks.load(Ordering::Relaxed),
            fresh: self.stats.fresh.load(Ordering::Relaxed),
            repeats: self.stats.repeats.load(Ordering::Relaxed),
            bloom_rotations: self.stats.rotations.load(Ordering::Relaxed),
            bloom_false_positives_rescued: self.stats.rescued.load(Ordering::Relaxed),
            remembered: self.recent.read().len(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DedupSnapshot {
    pub checks: u64,
    pub fresh: u64,
    pub repeats: u64,
    pub bloom_rotations: u64,
    pub bloom_false_positives_rescued: u64,
    pub remembered: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dedup() -> MessageDeduplicator {
        MessageDeduplicator::new(1000, 0.01, 100, Duration::from_secs(3600))
    }

    fn email(body: &str) -> EmailMessage {
        EmailMessage {
            subject: "Wheat 25k".into(),
            from: "desk@broker.example".into(),
            body: body.into(),
            received_at: None,
        }
    }

    #[test]
    fn test_first_sighting_is_new() {
        assert!(dedup().is_new(&email("25,000 mt wheat Constanta / Alexandria")));
    }

    #[test]
    fn test_forward_with_different_spacing_is_a_repeat() {
        let d = dedup();
        assert!(d.is_new(&email("25,000 mt wheat\nConstanta / Alexandria")));
        assert!(!d.is_new(&email("25,000 mt wheat   Constanta /  Alexandria")));
        let s = d.snapshot();
        assert_eq!((s.checks, s.fresh, s.repeats), (2, 1, 1));
    }

    #[test]
    fn test_different_orders_both_pass() {
        let d = dedup();
        assert!(d.is_new(&email("25,000 mt wheat")));
        assert!(d.is_new(&email("30,000 mt barley")));
    }

    #[test]
    fn test_zero_interval_rotates_on_every_check() {
        let d = MessageDeduplicator::new(1000, 0.01, 100, Duration::ZERO);
        assert!(d.check_and_insert("order-1"));
        // An empty bloom says "never seen", so the LRU is never consulted.
        assert!(d.check_and_insert("order-1"));
        assert!(d.snapshot().bloom_rotations >= 2);
    }
}
