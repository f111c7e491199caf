use crate::config::DEFAULT_MATCH_THRESHOLD;
use crate::db::{CorpusFilter, CorpusSource, CriminalRecord};
use crate::error::RidgeprintError;
use crate::fusion::MatchEngine;
use crate::output::{MatchCandidateScore, MatchOutcome};
use crate::parallel::ScoringPool;
use crate::template::ScanResult;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, info};

/// Identifies a scanned finger against a criminal corpus.
pub struct CriminalMatcher {
    engine: Arc<MatchEngine>,
    pool: ScoringPool,
}

impl CriminalMatcher {
    /// # Errors
    /// Returns `Misconfiguration` if `workers` is 0.
    pub fn new(engine: MatchEngine, workers: usize) -> Result<Self, RidgeprintError> {
        Self::with_shared_engine(Arc::new(engine), workers)
    }

    pub fn with_shared_engine(engine: Arc<MatchEngine>, workers: usize) -> Result<Self, RidgeprintError> {
        Ok(Self { engine, pool: ScoringPool::new(workers)? })
    }

    pub fn engine(&self) -> &MatchEngine {
        &self.engine
    }

    pub fn workers(&self) -> usize {
        self.pool.num_workers().get()
    }

    /// Scores `scan` against every record holding a template for the same finger.
    ///
    /// Records without such a template, or with an unusable one, are skipped
    /// but still counted in `records_checked`. The highest confidence wins;
    /// ties go to the lowest record id. Never fails.
    pub fn identify(&self, scan: &ScanResult, corpus: &[CriminalRecord], threshold: f64) -> MatchOutcome {
        if corpus.is_empty() {
            debug!("Corpus is empty, nothing to identify against");
            return MatchOutcome::database_empty();
        }
        let threshold = effective_threshold(threshold);
        let finger = scan.finger_position;

        let scored = self.pool.run(corpus.len(), |index| {
            let record = &corpus[index];
            let stored = record.template(finger).filter(|t| t.is_usable())?;
            let score = self.engine.score_detailed(&scan.template, stored);
            debug!(
                "Candidate {} ({}) {finger}: confidence {:.4} via {}",
                record.id, record.name, score.confidence, score.path
            );
            Some(MatchCandidateScore {
                criminal_id: record.id,
                criminal_name: record.name.clone(),
                finger_position: finger,
                raw_score: score.raw_score,
                confidence: score.confidence,
                fusion_components: score.components,
                path: score.path,
            })
        });

        let candidates_scored = scored.iter().filter(|c| c.is_some()).count();
        let best = scored.into_iter().flatten().reduce(|best, candidate| {
            if outranks(&candidate, &best) {
                candidate
            } else {
                best
            }
        });

        match best {
            Some(best) if best.confidence >= threshold => {
                info!(
                    "Match found for {finger}: {} {} (confidence {:.4}, {})",
                    best.criminal_id,
                    best.criminal_name,
                    best.confidence,
                    best.grade()
                );
                MatchOutcome::match_found(best, corpus.len(), candidates_scored)
            }
            best => {
                info!(
                    "No match for {finger} among {} record(s), {candidates_scored} scored",
                    corpus.len()
                );
                MatchOutcome::no_match(best, corpus.len(), candidates_scored)
            }
        }
    }

    /// Like [`identify`](Self::identify) over a fresh snapshot of the active records.
    ///
    /// # Errors
    /// Propagates `CorpusUnavailable` from the source.
    pub fn identify_from<S>(&self, scan: &ScanResult, source: &S, threshold: f64) -> Result<MatchOutcome, RidgeprintError>
    where
        S: CorpusSource + ?Sized,
    {
        let corpus = source.snapshot_filtered(&CorpusFilter { active_only: true, finger: None })?;
        Ok(self.identify(scan, &corpus, threshold))
    }
}

impl std::fmt::Debug for CriminalMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CriminalMatcher").field("engine", &self.engine).field("pool", &self.pool).finish()
    }
}

/// Non-finite thresholds fall back to the default; finite ones are clamped to [0,1].
pub fn effective_threshold(threshold: f64) -> f64 {
    if threshold.is_finite() {
        threshold.clamp(0.0, 1.0)
    } else {
        DEFAULT_MATCH_THRESHOLD
    }
}

fn outranks(candidate: &MatchCandidateScore, incumbent: &MatchCandidateScore) -> bool {
    match candidate.confidence.total_cmp(&incumbent.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => candidate.criminal_id < incumbent.criminal_id,
    }
}
