// ███████╗██████╗ ███████╗██╗ ██████╗ ██╗  ██╗████████╗
// ██╔════╝██╔══██╗██╔════╝██║██╔════╝ ██║  ██║╚══██╔══╝
// █████╗  ██████╔╝█████╗  ██║██║  ███╗███████║   ██║
// ██╔══╝  ██╔══██╗██╔══╝  ██║██║   ██║██╔══██║   ██║
// ██║     ██║  ██║███████╗██║╚██████╔╝██║  ██║   ██║
// ╚═╝     ╚═╝  ╚═╝╚══════╝╚═╝ ╚═════╝ ╚═╝  ╚═╝   ╚═╝
//
// M A T C H   E N G I N E
//
// Reads the broker emails nobody has time to read and tells you which ship
// should carry which cargo. Tokio for the I/O, a plain thread for the
// regexes, Redis for the shouting.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use freight_match_engine::config::Config;
use freight_match_engine::dedup::MessageDeduplicator;
use freight_match_engine::inbox::{self, Inbox};
use freight_match_engine::metrics::{self, MetricsCollector};
use freight_match_engine::models::{EmailMessage, MatchEvent};
use freight_match_engine::publisher::RedisPublisher;
use freight_match_engine::{
    InMemoryMatchStore, IngestPipeline, MatchService, MatchStore, PatternExtractor,
};

fn print_banner() {
    let banner = r#"

    ╔══════════════════════════════════════════════════════════════════╗
    ║                                                                  ║
    ║              ⚓  FREIGHT MATCH ENGINE  ⚓                         ║
    ║                                                                  ║
    ║   Input:    broker emails (cargo orders, vessel positions)       ║
    ║   Extract:  regex grammars + Aho-Corasick gazetteer              ║
    ║   Score:    tonnage | volume | laycan | route | commodity        ║
    ║   Dedup:    Bloom Filter + LRU Cache Hybrid                      ║
    ║   Output:   Redis pub/sub + sorted set                           ║
    ║                                                                  ║
    ║   "Every cargo deserves a ship. Most ships deserve a cargo."     ║
    ║                                                                  ║
    ╚══════════════════════════════════════════════════════════════════╝

    "#;
    println!("{}", banner);
}

/// The CPU-bound half of the engine. Runs on its own thread so a burst of
/// emails never starves the tokio workers.
fn run_processor(
    pipeline: IngestPipeline,
    emails: Receiver<EmailMessage>,
    events: Sender<MatchEvent>,
    metrics: Arc<MetricsCollector>,
    shutdown: watch::Receiver<bool>,
) {
    loop {
        match emails.recv_timeout(Duration::from_millis(250)) {
            Ok(email) => {
                let outcome = pipeline.process(&email);
                metrics.record(&outcome);
                for event in outcome.events() {
                    match events.try_send(event.clone()) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            warn!(
                                match_id = %event.match_id,
                                "Event queue full, dropping match event"
                            );
                        }
                        Err(TrySendError::Disconnected(_)) => {
                            warn!("Publisher gone, processor stopping");
                            return;
                        }
                    }
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                if *shutdown.borrow() {
                    return;
                }
            }
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
        }
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(true)
        .init();

    print_banner();
    info!("⚓ FREIGHT MATCH ENGINE initializing...");

    let config = Arc::new(Config::from_env());
    info!(
        redis_url = %config.redis_url,
        inbox = %config.inbox_dir.display(),
        min_score = config.min_match_score,
        "✅ Configuration loaded"
    );

    let (email_tx, email_rx) = crossbeam_channel::bounded::<EmailMessage>(1_000);
    let (event_tx, event_rx) = crossbeam_channel::bounded::<MatchEvent>(10_000);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let dedup = Arc::new(MessageDeduplicator::new(
        config.bloom_expected_items,
        config.bloom_false_positive_rate,
        config.lru_cache_size,
        config.bloom_rotation_interval,
    ));

    let (publisher, publisher_stats) =
        RedisPublisher::new(config.clone(), event_rx, shutdown_rx.clone());
    let metrics_collector =
        Arc::new(MetricsCollector::new().with_sources(dedup.clone(), publisher_stats));
    info!("✅ Deduplication and metrics online");

    // ═══════════════════════════════════════════
    // ENGINE
    // ═══════════════════════════════════════════
    let store: Arc<dyn MatchStore> = Arc::new(InMemoryMatchStore::new());
    let service = Arc::new(
        MatchService::new(store)
            .with_min_score(config.min_match_score)
            .with_batch_cap(config.batch_cap)
            .with_default_limit(config.default_limit),
    );
    let extractor = match config.reference_year {
        Some(year) => PatternExtractor::with_reference_year(year),
        None => PatternExtractor::new(),
    };
    let pipeline = IngestPipeline::new(service)
        .with_extractor(extractor)
        .with_min_confidence(config.min_extraction_confidence);

    let processor_metrics = metrics_collector.clone();
    let processor_shutdown = shutdown_rx.clone();
    let processor = thread::Builder::new().name("match-processor".into()).spawn(move || {
        info!("⚙️  Processor: ONLINE");
        run_processor(pipeline, email_rx, event_tx, processor_metrics, processor_shutdown);
        info!("⚙️  Processor: OFFLINE");
    })?;

    // ═══════════════════════════════════════════
    // TASKS
    // ═══════════════════════════════════════════
    let inbox = Inbox::new(config.inbox_dir.clone(), email_tx, dedup, metrics_collector.clone());
    let inbox_config = config.clone();
    let mut inbox_shutdown = shutdown_rx.clone();
    let inbox_handle = tokio::spawn(async move {
        inbox::run(inbox, inbox_config, &mut inbox_shutdown).await;
        info!("📬 Inbox: OFFLINE");
    });

    let publisher_handle = tokio::spawn(async move {
        if let Err(e) = publisher.run().await {
            error!("📤 Redis Publisher error: {}", e);
        }
        info!("📤 Redis Publisher: OFFLINE");
    });

    let metrics_for_server = metrics_collector.clone();
    let metrics_port = config.metrics_port;
    let mut metrics_shutdown = shutdown_rx.clone();
    let metrics_handle = tokio::spawn(async move {
        metrics::run_metrics_server(metrics_for_server, metrics_port, &mut metrics_shutdown).await;
        info!("📊 Metrics server: OFFLINE");
    });

    info!("═══════════════════════════════════════════════════════");
    info!("  🟢 ALL SYSTEMS ONLINE - FREIGHT MATCH ENGINE ACTIVE");
    info!("  📬 Watching {}", config.inbox_dir.display());
    info!("  📤 Publishing to Redis at {}", config.redis_url);
    info!("  📊 Metrics at http://0.0.0.0:{}", config.metrics_port);
    info!("  ⚡ Press Ctrl+C for graceful shutdown");
    info!("═══════════════════════════════════════════════════════");

    match signal::ctrl_c().await {
        Ok(()) => warn!("🛑 Shutdown signal received!"),
        Err(err) => error!("❌ Signal listener error: {}", err),
    }
    let _ = shutdown_tx.send(true);

    info!("⏳ Waiting for tasks to complete (timeout: 10s)...");
    let processor_handle = tokio::task::spawn_blocking(move || processor.join());
    let _ = tokio::time::timeout(Duration::from_secs(10), async {
        let _ = tokio::join!(inbox_handle, processor_handle, publisher_handle, metrics_handle);
    })
    .await;

    info!("⚓ FREIGHT MATCH ENGINE: OFFLINE");
    Ok(())
}
