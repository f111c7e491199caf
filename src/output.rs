use crate::db::CriminalId;
use crate::fusion::{FusionComponents, FusionPath};
use crate::template::FingerPosition;
use std::fmt;

/// Sub-threshold confidence above which the best candidate is still reported.
pub const PARTIAL_MATCH_FLOOR: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    MatchFound,
    NoMatch,
    ScanFailed,
    DatabaseEmpty,
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStatus::MatchFound => "match_found",
            MatchStatus::NoMatch => "no_match",
            MatchStatus::ScanFailed => "scan_failed",
            MatchStatus::DatabaseEmpty => "database_empty",
        })
    }
}

/// Operator-facing bucket for a match confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchGrade {
    Poor,
    Fair,
    Good,
    VeryGood,
    Excellent,
}

impl MatchGrade {
    pub fn from_confidence(confidence: f64) -> Self {
        match confidence {
            c if c >= 0.95 => MatchGrade::Excellent,
            c if c >= 0.85 => MatchGrade::VeryGood,
            c if c >= 0.75 => MatchGrade::Good,
            c if c >= 0.65 => MatchGrade::Fair,
            _ => MatchGrade::Poor,
        }
    }
}

impl fmt::Display for MatchGrade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchGrade::Poor => "Poor",
            MatchGrade::Fair => "Fair",
            MatchGrade::Good => "Good",
            MatchGrade::VeryGood => "Very good",
            MatchGrade::Excellent => "Excellent",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerificationLevel {
    High,
    Medium,
}

impl VerificationLevel {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence > 0.9 {
            VerificationLevel::High
        } else {
            VerificationLevel::Medium
        }
    }
}

impl fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            VerificationLevel::High => "HIGH",
            VerificationLevel::Medium => "MEDIUM",
        })
    }
}

/// Score of the scanned finger against one corpus record.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchCandidateScore {
    pub criminal_id: CriminalId,
    pub criminal_name: String,
    pub finger_position: FingerPosition,
    pub raw_score: f64,
    /// Fused confidence in [0,1].
    pub confidence: f64,
    pub fusion_components: FusionComponents,
    pub path: FusionPath,
}

impl MatchCandidateScore {
    pub fn grade(&self) -> MatchGrade {
        MatchGrade::from_confidence(self.confidence)
    }

    pub fn verification_level(&self) -> VerificationLevel {
        VerificationLevel::from_confidence(self.confidence)
    }
}

/// Result of one identification.
///
/// `best` is present exactly when `status` is `MatchFound`; `highest_partial`
/// is only ever set when there is no match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome {
    pub status: MatchStatus,
    pub best: Option<MatchCandidateScore>,
    /// Records iterated, including those skipped for lack of a template.
    pub records_checked: usize,
    /// Records that produced a score.
    pub candidates_scored: usize,
    pub highest_partial: Option<MatchCandidateScore>,
}

impl MatchOutcome {
    pub fn database_empty() -> Self {
        Self {
            status: MatchStatus::DatabaseEmpty,
            best: None,
            records_checked: 0,
            candidates_scored: 0,
            highest_partial: None,
        }
    }

    pub fn scan_failed() -> Self {
        Self { status: MatchStatus::ScanFailed, ..Self::database_empty() }
    }

    pub fn match_found(best: MatchCandidateScore, records_checked: usize, candidates_scored: usize) -> Self {
        Self {
            status: MatchStatus::MatchFound,
            best: Some(best),
            records_checked,
            candidates_scored,
            highest_partial: None,
        }
    }

    /// The runner-up is kept only above [`PARTIAL_MATCH_FLOOR`].
    pub fn no_match(
        highest: Option<MatchCandidateScore>,
        records_checked: usize,
        candidates_scored: usize,
    ) -> Self {
        Self {
            status: MatchStatus::NoMatch,
            best: None,
            records_checked,
            candidates_scored,
            highest_partial: highest.filter(|c| c.confidence > PARTIAL_MATCH_FLOOR),
        }
    }

    pub fn is_match(&self) -> bool {
        self.status == MatchStatus::MatchFound
    }
}
