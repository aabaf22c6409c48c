// =============================================================================
// config.rs — THE CHARTER PARTY
// =============================================================================
//
// Every knob the engine has, in one struct. Everything reads from the
// environment (prefixed FREIGHT_MATCH_) with a default that works on a
// laptop with a local Redis and a folder called `inbox`.
//
// Defaults were arrived at the way freight rates are: somebody said a number
// with enough confidence and nobody argued.
// =============================================================================

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// All tunables of the engine.
#[derive(Debug, Clone)]
pub struct Config {
    // =========================================================================
    // REDIS
    // =========================================================================

    /// Where match suggestions get announced.
    /// Default: redis://127.0.0.1:6379
    pub redis_url: String,

    /// Pub/sub channel for live match events.
    pub redis_channel: String,

    /// Sorted set keeping every event, scored by emission time, because
    /// pub/sub forgets the moment nobody is listening.
    pub redis_sorted_set: String,

    // =========================================================================
    // INBOX
    // =========================================================================

    /// Directory the email collaborator drops `*.json` messages into.
    pub inbox_dir: PathBuf,

    /// How often to look in it. Default: 5 seconds.
    pub inbox_poll_interval: Duration,

    // =========================================================================
    // MATCHING
    // =========================================================================

    /// Cargo emails scoring below this are not worth a record. Default: 0.25
    pub min_extraction_confidence: f64,

    /// Suggestions below this never reach a broker. Default: 50
    pub min_match_score: u8,

    /// Counterparts scored per anchor. Default: 20
    pub batch_cap: usize,

    /// Suggestions returned when the caller does not say. Default: 10
    pub default_limit: usize,

    /// Year assumed for "10-15 March". Unset means the current year.
    pub reference_year: Option<i32>,

    // =========================================================================
    // DEDUP
    // The same circular arrives from six brokers before lunch.
    // =========================================================================

    /// Expected messages per bloom generation. Default: 100_000
    pub bloom_expected_items: u64,

    /// Target false positive rate. 0.01 means one fresh email in a hundred
    /// could be mistaken for a repeat, which is why the LRU has the final say.
    pub bloom_false_positive_rate: f64,

    /// Bloom rotation period. Default: 3600 seconds.
    pub bloom_rotation_interval: Duration,

    /// Exact fingerprints remembered. Default: 10_000
    pub lru_cache_size: usize,

    // =========================================================================
    // METRICS
    // =========================================================================

    /// Default: 9090
    pub metrics_port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            redis_url: "redis://127.0.0.1:6379".into(),
            redis_channel: "freight:matches".into(),
            redis_sorted_set: "freight:matches:history".into(),
            inbox_dir: PathBuf::from("inbox"),
            inbox_poll_interval: Duration::from_secs(5),
            min_extraction_confidence: 0.25,
            min_match_score: 50,
            batch_cap: 20,
            default_limit: 10,
            reference_year: None,
            bloom_expected_items: 100_000,
            bloom_false_positive_rate: 0.01,
            bloom_rotation_interval: Duration::from_secs(3600),
            lru_cache_size: 10_000,
            metrics_port: 9090,
        }
    }
}

impl Config {
    /// Load from the environment, reading `.env` first if there is one.
    /// Unparseable values fall back to the default rather than failing
    /// startup over a typo.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv();
        let d = Config::default();

        Config {
            redis_url: env_or_default("FREIGHT_MATCH_REDIS_URL", &d.redis_url),
            redis_channel: env_or_default("FREIGHT_MATCH_REDIS_CHANNEL", &d.redis_channel),
            redis_sorted_set: env_or_default("FREIGHT_MATCH_REDIS_SORTED_SET", &d.redis_sorted_set),

            inbox_dir: env::var("FREIGHT_MATCH_INBOX_DIR")
                .map(PathBuf::from)
                .unwrap_or(d.inbox_dir),
            inbox_poll_interval: Duration::from_secs(env_parse(
                "FREIGHT_MATCH_INBOX_POLL_SECS",
                5,
            )),

            min_extraction_confidence: env_parse(
                "FREIGHT_MATCH_MIN_CONFIDENCE",
                d.min_extraction_confidence,
            )
            .clamp(0.0, 1.0),
            min_match_score: env_parse("FREIGHT_MATCH_MIN_SCORE", d.min_match_score).min(100),
            batch_cap: env_parse("FREIGHT_MATCH_BATCH_CAP", d.batch_cap),
            default_limit: env_parse("FREIGHT_MATCH_DEFAULT_LIMIT", d.default_limit).max(1),
            reference_year: env::var("FREIGHT_MATCH_REFERENCE_YEAR")
                .ok()
                .and_then(|y| y.parse().ok()),

            bloom_expected_items: env_parse("FREIGHT_MATCH_BLOOM_ITEMS", d.bloom_expected_items),
            bloom_false_positive_rate: env_parse(
                "FREIGHT_MATCH_BLOOM_FP_RATE",
                d.bloom_false_positive_rate,
            ),
            bloom_rotation_interval: Duration::from_secs(env_parse(
                "FREIGHT_MATCH_BLOOM_ROTATION_SECS",
                3600,
            )),
            lru_cache_size: env_parse("FREIGHT_MATCH_LRU_CACHE_SIZE", d.lru_cache_size),

            metrics_port: env_parse("FREIGHT_MATCH_METRICS_PORT", d.metrics_port),
        }
    }
}

fn env_or_default(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
