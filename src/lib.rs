//! Freight match engine.
//!
//! Broker emails in, ranked cargo/vessel pairings out. The library is the
//! whole engine; `main.rs` only wires it to an inbox directory, Redis and a
//! metrics port.
//!
//! ```text
//! inbox ─▶ dedup ─▶ pipeline (normalize, classify, extract) ─▶ store
//!                                                   │
//!                                   matching (score, rank) ─▶ publisher
//! ```

pub mod classifier;
pub mod config;
pub mod dedup;
pub mod error;
pub mod extractor;
pub mod gazetteer;
pub mod geo;
pub mod inbox;
pub mod matching;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod pipeline;
pub mod publisher;
pub mod ranker;
pub mod scorer;
pub mod store;

pub use error::{MatchError, RecordError, Result};
pub use extractor::{ExtractionResult, FieldExtractor, PatternExtractor};
pub use matching::MatchService;
pub use pipeline::{IngestOutcome, IngestPipeline};
pub use store::{InMemoryMatchStore, MatchStore};
