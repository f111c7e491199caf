use core::fmt;

use crate::output::{MatchCandidateScore, MatchOutcome, MatchStatus};
use crate::session::SessionReport;
use crate::template::ScanResult;

fn candidate_line(candidate: &MatchCandidateScore) -> String {
    format!(
        "{} {} ({:.4}, {}, {})",
        candidate.criminal_id,
        candidate.criminal_name,
        candidate.confidence,
        candidate.grade(),
        candidate.verification_level()
    )
}

fn components_line(candidate: &MatchCandidateScore) -> String {
    let components = &candidate.fusion_components;
    match components.nbis_score {
        Some(nbis) => format!("{} nbis={nbis:.4} base={:.4}", candidate.path, components.base_score),
        None => format!("{} base={:.4}", candidate.path, components.base_score),
    }
}

impl fmt::Display for ScanResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            ".-[ {} (capture) ]-\n\
            |\n\
            | provider = {}\n\
            | quality  = {:.3} ({})\n\
            | nfiq     = {}\n\
            | minutiae = {}\n\
            | image    = {}x{} @ {} dpi\n\
            | template = {} ({} bytes)\n\
            | live     = {}\n\
            | duration = {:?}\n\
            `----\n",
            self.finger_position,
            self.provider_id,
            self.quality_score,
            self.quality_rating(),
            self.secondary_quality_metric.map_or("none".to_string(), |class| class.to_string()),
            self.minutiae_count,
            self.image_dimensions.0,
            self.image_dimensions.1,
            self.image_dpi,
            self.template_kind(),
            self.template.data.len(),
            self.live_finger_detected,
            self.capture_duration,
        )
    }
}

impl fmt::Display for MatchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            ".-[ {} ]-\n\
            |\n\
            | checked  = {}\n\
            | scored   = {}\n",
            self.status, self.records_checked, self.candidates_scored
        )?;
        if let Some(best) = &self.best {
            writeln!(f, "| match    = {}", candidate_line(best))?;
            writeln!(f, "| finger   = {}", best.finger_position)?;
            writeln!(f, "| path     = {}", components_line(best))?;
        }
        if let Some(partial) = &self.highest_partial {
            writeln!(f, "| partial  = {}", candidate_line(partial))?;
        }
        f.write_str("`----\n")
    }
}

impl fmt::Display for SessionReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            ".-[ ten-finger session ({}) ]-\n\
            |\n\
            | attempts = {}\n\
            | match    = {}\n\
            |\n",
            self.final_state,
            self.attempts.len(),
            self.any_match
        )?;
        for attempt in &self.attempts {
            let finger = attempt.request.finger_position;
            match (&attempt.failure, attempt.outcome.status) {
                (Some(failure), _) => writeln!(f, "| {finger:<12} = scan_failed: {failure}")?,
                (None, MatchStatus::MatchFound) => match &attempt.outcome.best {
                    Some(best) => writeln!(f, "| {finger:<12} = match_found: {}", candidate_line(best))?,
                    None => writeln!(f, "| {finger:<12} = match_found")?,
                },
                (None, status) => writeln!(f, "| {finger:<12} = {status} ({} checked)", attempt.outcome.records_checked)?,
            }
        }
        f.write_str("`----\n")
    }
}
