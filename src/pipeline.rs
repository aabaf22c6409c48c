// =============================================================================
// pipeline.rs — FROM INBOX TO SHORTLIST
// =============================================================================
//
// One email in, zero or more match suggestions out:
//
//   normalize -> classify -> extract -> gate on confidence -> build record
//             -> store -> compute matches -> events
//
// Every exit that is not "record created" is a skip with a reason. Skips are
// logged and counted, never raised: a broker email that says "call me" is
// not an error condition.
// =============================================================================

use rayon::prelude::*;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::classifier::{DefaultClassifier, EmailClassifier, EmailLabel};
use crate::error::RecordError;
use crate::extractor::{ExtractionResult, FieldExtractor, PatternExtractor};
use crate::matching::MatchService;
use crate::models::{CargoRecord, EmailMessage, MatchEvent, MatchStatus, VesselRecord};
use crate::normalizer::normalize;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.25;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub enum SkipReason {
    Empty,
    LowConfidence { confidence: f64, threshold: f64 },
    Unclassified,
    MissingField(&'static str),
    InvalidRecord(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Empty => write!(f, "nothing left after normalisation"),
            SkipReason::LowConfidence { confidence, threshold } => {
                write!(f, "extraction confidence {confidence:.2} below {threshold:.2}")
            }
            SkipReason::Unclassified => write!(f, "neither a cargo nor a vessel"),
            SkipReason::MissingField(field) => write!(f, "required field `{field}` missing"),
            SkipReason::InvalidRecord(why) => write!(f, "invalid record: {why}"),
        }
    }
}

impl From<RecordError> for SkipReason {
    fn from(err: RecordError) -> Self {
        match err {
            RecordError::MissingField(field) => SkipReason::MissingField(field),
            RecordError::Invalid(why) => SkipReason::InvalidRecord(why),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub enum IngestOutcome {
    Ingested {
        label: EmailLabel,
        record_id: Uuid,
        confidence: f64,
        /// Freshly suggested matches only. Pairs already decided stay quiet.
        events: Vec<MatchEvent>,
    },
    Skipped {
        label: EmailLabel,
        reason: SkipReason,
    },
}

impl IngestOutcome {
    pub fn events(&self) -> &[MatchEvent] {
        match self {
            IngestOutcome::Ingested { events, .. } => events,
            IngestOutcome::Skipped { .. } => &[],
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, IngestOutcome::Skipped { .. })
    }
}

pub struct IngestPipeline {
    classifier: Box<dyn EmailClassifier>,
    extractor: Box<dyn FieldExtractor>,
    /// Second opinion, merged under the pattern extractor's results.
    fallback: Option<Box<dyn FieldExtractor>>,
    service: Arc<MatchService>,
    min_confidence: f64,
}

impl IngestPipeline {
    pub fn new(service: Arc<MatchService>) -> Self {
        Self {
            classifier: Box::new(DefaultClassifier::default()),
            extractor: Box::new(PatternExtractor::new()),
            fallback: None,
            service,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    pub fn with_classifier(mut self, classifier: impl EmailClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn with_extractor(mut self, extractor: impl FieldExtractor + 'static) -> Self {
        self.extractor = Box::new(extractor);
        self
    }

    pub fn with_fallback_extractor(mut self, extractor: impl FieldExtractor + 'static) -> Self {
        self.fallback = Some(Box::new(extractor));
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence.clamp(0.0, 1.0);
        self
    }

    pub fn service(&self) -> &Arc<MatchService> {
        &self.service
    }

    pub fn process(&self, email: &EmailMessage) -> IngestOutcome {
        let body = normalize(&email.body);
        if body.is_empty() {
            return skip(EmailLabel::Unknown, SkipReason::Empty);
        }

        let classification = self.classifier.classify(&format!("{}\n{}", email.subject, body));
        let label = classification.label;
        if label == EmailLabel::Unknown {
            return skip(label, SkipReason::Unclassified);
        }

        let extraction = self.extract(&body);
        // Confidence is weighted towards cargo orders. A position email is
        // judged on whether it has a dwt and an open port, not on its score.
        if label == EmailLabel::Cargo && extraction.confidence < self.min_confidence {
            return skip(
                label,
                SkipReason::LowConfidence {
                    confidence: extraction.confidence,
                    threshold: self.min_confidence,
                },
            );
        }

        let built = match label {
            EmailLabel::Cargo => CargoRecord::from_extraction(&extraction).map(|cargo| {
                let id = self.service.store().insert_cargo(cargo);
                (id, self.service.compute_matches_for_cargo(id, 0))
            }),
            _ => VesselRecord::from_extraction(&extraction).map(|vessel| {
                let id = self.service.store().insert_vessel(vessel);
                (id, self.service.compute_matches_for_vessel(id, 0))
            }),
        };
        let (record_id, ranked) = match built {
            Ok(pair) => pair,
            Err(err) => return skip(label, err.into()),
        };

        // The record was inserted a line ago, so NotFound here means the store lost it.
        let events: Vec<MatchEvent> = match ranked {
            Ok(ranked) => ranked
                .iter()
                .filter(|m| m.status == MatchStatus::Suggested)
                .map(|m| m.to_event())
                .collect(),
            Err(err) => {
                warn!(record_id = %record_id, error = %err, "Matching failed after ingest");
                Vec::new()
            }
        };

        info!(
            label = %label,
            record_id = %record_id,
            confidence = format!("{:.2}", extraction.confidence),
            suggestions = events.len(),
            "Email ingested"
        );
        IngestOutcome::Ingested { label, record_id, confidence: extraction.confidence, events }
    }

    /// Many emails at once. Order of outcomes follows order of input.
    pub fn process_batch(&self, emails: &[EmailMessage]) -> Vec<IngestOutcome> {
        emails.par_iter().map(|email| self.process(email)).collect()
    }

    fn extract(&self, body: &str) -> ExtractionResult {
        let primary = self.extractor.extract(body);
        match &self.fallback {
            Some(fallback) => ExtractionResult::merge(primary, fallback.extract(body)),
            None => primary,
        }
    }
}

fn skip(label: EmailLabel, reason: SkipReason) -> IngestOutcome {
    debug!(label = %label, reason = %reason, "Email skipped");
    IngestOutcome::Skipped { label, reason }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::Classification;
    use crate::store::{InMemoryMatchStore, MatchStore};

    const CARGO_BODY: &str = "Pls offer suitable vessel for 25,000 mt wheat\n\
                              load: Constanta\n\
                              disch: Alexandria\n\
                              laycan 10-15 March";

    const VESSEL_BODY: &str = "MV SEA BREEZE 32,000 dwt handysize gearless open Varna 1st April";

    fn email(subject: &str, body: &str) -> EmailMessage {
        EmailMessage {
            subject: subject.into(),
            from: "desk@broker.example".into(),
            body: body.into(),
            received_at: None,
        }
    }

    fn pipeline() -> (IngestPipeline, Arc<InMemoryMatchStore>) {
        let store = Arc::new(InMemoryMatchStore::new());
        let service = Arc::new(MatchService::new(store.clone()));
        let extractor = PatternExtractor::with_reference_year(2025);
        let pipeline = IngestPipeline::new(service).with_extractor(extractor);
        (pipeline, store)
    }

    #[test]
    fn test_cargo_email_creates_cargo_and_suggests_waiting_vessel() {
        let (pipeline, store) = pipeline();
        let snug = VesselRecord::new("MV Snug", 27_000.0, "Varna").unwrap();
        let vessel_id = store.insert_vessel(snug);

        let outcome = pipeline.process(&email("Wheat 25k Constanta", CARGO_BODY));
        let IngestOutcome::Ingested { label, record_id, events, .. } = outcome else {
            panic!("expected ingest, got {outcome:?}");
        };
        assert_eq!(label, EmailLabel::Cargo);
        assert_eq!(store.get_cargo(record_id).unwrap().commodity, "wheat");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].vessel_id, vessel_id);
        assert_eq!(events[0].score, 70);
    }

    #[test]
    fn test_vessel_email_matches_open_cargo() {
        let (pipeline, store) = pipeline();
        pipeline.process(&email("Wheat 25k Constanta", CARGO_BODY));

        let outcome = pipeline.process(&email("Position", VESSEL_BODY));
        let IngestOutcome::Ingested { label, record_id, events, .. } = outcome else {
            panic!("expected ingest, got {outcome:?}");
        };
        assert_eq!(label, EmailLabel::Vessel);
        assert_eq!(store.get_vessel(record_id).unwrap().name, "SEA BREEZE");
        assert_eq!(events.len(), 1);
        assert!(events[0].score >= 50);
    }

    #[test]
    fn test_lunch_invitation_is_unclassified() {
        let (pipeline, _) = pipeline();
        let outcome = pipeline.process(&email("Friday", "Lunch on Friday at the usual place?"));
        assert!(matches!(outcome, IngestOutcome::Skipped { reason: SkipReason::Unclassified, .. }));
    }

    #[test]
    fn test_blank_body_is_skipped() {
        let (pipeline, _) = pipeline();
        let outcome = pipeline.process(&email("", "<div>&nbsp;</div>"));
        assert!(matches!(outcome, IngestOutcome::Skipped { reason: SkipReason::Empty, .. }));
    }

    #[test]
    fn test_threshold_gates_thin_cargo_extractions() {
        let (pipeline, store) = pipeline();
        let pipeline = pipeline.with_min_confidence(0.9);
        let outcome = pipeline.process(&email("", CARGO_BODY));
        assert!(matches!(
            outcome,
            IngestOutcome::Skipped { reason: SkipReason::LowConfidence { .. }, .. }
        ));
        assert_eq!(store.counts(), (0, 0, 0));
    }

    #[test]
    fn test_threshold_does_not_apply_to_positions() {
        let (pipeline, store) = pipeline();
        let pipeline = pipeline.with_min_confidence(0.9);
        assert!(!pipeline.process(&email("", VESSEL_BODY)).is_skipped());
        assert_eq!(store.counts(), (0, 1, 0));
    }

    struct AlwaysCargo;

    impl EmailClassifier for AlwaysCargo {
        fn classify(&self, _: &str) -> Classification {
            Classification { label: EmailLabel::Cargo, confidence: 1.0 }
        }
    }

    #[test]
    fn test_missing_required_field_is_named() {
        let (pipeline, _) = pipeline();
        let pipeline = pipeline.with_classifier(AlwaysCargo);
        let body = "25,000 mt wheat\nload: Constanta\nlaycan 10-15 March";
        let outcome = pipeline.process(&email("", body));
        assert!(matches!(
            outcome,
            IngestOutcome::Skipped { reason: SkipReason::MissingField("dischargePort"), .. }
        ));
    }

    #[test]
    fn test_batch_keeps_input_order() {
        let (pipeline, store) = pipeline();
        let outcomes = pipeline.process_batch(&[
            email("", CARGO_BODY),
            email("", "Lunch on Friday?"),
            email("", VESSEL_BODY),
        ]);
        assert!(!outcomes[0].is_skipped());
        assert!(outcomes[1].is_skipped());
        assert!(!outcomes[2].is_skipped());
        let (cargos, vessels, _) = store.counts();
        assert_eq!((cargos, vessels), (1, 1));
    }
}
