//! Confidence calculation over verdict history

use crate::domain::SentinelVerdict;
use crate::events::ConfidenceLevel;

/// A weighted summary of recent sentinel scores
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confidence {
    pub score: u8,
    pub level: ConfidenceLevel,
}

impl Confidence {
    /// Starting confidence before any verdicts arrive
    pub fn initial() -> Self {
        Self {
            score: 100,
            level: ConfidenceLevel::Healthy,
        }
    }

    /// Classify a score: healthy at 85+, warning at 70+, error below
    pub fn classify(score: u8) -> ConfidenceLevel {
        if score >= 85 {
            ConfidenceLevel::Healthy
        } else if score >= 70 {
            ConfidenceLevel::Warning
        } else {
            ConfidenceLevel::Error
        }
    }
}

/// Weighted average of all verdict scores, newer verdicts weighing more
/// (weight = position + 1)
pub fn calculate_confidence(verdicts: &[SentinelVerdict]) -> Confidence {
    if verdicts.is_empty() {
        return Confidence::initial();
    }

    let mut weighted_sum = 0f64;
    let mut weight_total = 0f64;
    for (position, verdict) in verdicts.iter().enumerate() {
        let weight = (position + 1) as f64;
        weighted_sum += verdict.quality_score as f64 * weight;
        weight_total += weight;
    }

    let score = (weighted_sum / weight_total).round() as u8;
    Confidence {
        score,
        level: Confidence::classify(score),
    }
}
