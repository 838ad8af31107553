//! Score composition
//!
//! Sub-scores are combined with tunable [`ScoreWeights`], then shifted by a
//! category adjustment that favours primary sources over commentary.

use serde::{Deserialize, Serialize};

use super::heuristics::round1;
use crate::types::{SourceCategory, SourceScores};

/// Relative weight of each sub-score in the total. Normalised on use, so
/// they need not sum to one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    #[serde(default = "default_weight")]
    pub authenticity: f32,
    #[serde(default = "default_weight")]
    pub reliability: f32,
    #[serde(default = "default_weight")]
    pub relevance: f32,
    #[serde(default = "default_weight")]
    pub currency: f32,
}

fn default_weight() -> f32 {
    0.25
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            authenticity: default_weight(),
            reliability: default_weight(),
            relevance: default_weight(),
            currency: default_weight(),
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f32 {
        self.authenticity + self.reliability + self.relevance + self.currency
    }

    /// Weighted mean of the four sub-scores.
    pub fn combine(
        &self,
        authenticity: f32,
        reliability: f32,
        relevance: f32,
        currency: f32,
    ) -> f32 {
        let sum = self.sum();
        if sum <= 0.0 || !sum.is_finite() {
            return (authenticity + reliability + relevance + currency) / 4.0;
        }
        (authenticity * self.authenticity
            + reliability * self.reliability
            + relevance * self.relevance
            + currency * self.currency)
            / sum
    }
}

/// Minimum relevance per category.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CategoryFloors {
    #[serde(default = "default_consulting_min_relevance")]
    pub consulting_min_relevance: f32,
    #[serde(default = "default_institutional_min_relevance")]
    pub institutional_min_relevance: f32,
    #[serde(default = "default_general_media_min_relevance")]
    pub general_media_min_relevance: f32,
}

fn default_consulting_min_relevance() -> f32 {
    7.0
}

fn default_institutional_min_relevance() -> f32 {
    5.5
}

fn default_general_media_min_relevance() -> f32 {
    8.5
}

impl Default for CategoryFloors {
    fn default() -> Self {
        Self {
            consulting_min_relevance: default_consulting_min_relevance(),
            institutional_min_relevance: default_institutional_min_relevance(),
            general_media_min_relevance: default_general_media_min_relevance(),
        }
    }
}

/// Inputs to the category adjustment for one source.
#[derive(Debug, Clone, Copy)]
pub struct CategoryProfile {
    pub category: SourceCategory,
    pub methodological: bool,
    pub consulting_priority: u8,
}

/// Bonus or penalty applied to the weighted total.
pub fn category_adjustment(
    profile: &CategoryProfile,
    relevance: f32,
    floors: &CategoryFloors,
) -> f32 {
    if profile.methodological {
        return 1.0;
    }
    match profile.category {
        SourceCategory::Consulting => {
            let relevant = relevance >= floors.consulting_min_relevance;
            match (profile.consulting_priority, relevant) {
                (2, true) => 0.3,
                (2, false) | (1, false) => -0.75,
                (1, true) => 0.0,
                (_, true) => -0.25,
                (_, false) => -1.0,
            }
        }
        SourceCategory::Institutional | SourceCategory::Academic => 0.5,
        SourceCategory::GeneralMedia => {
            if relevance < floors.general_media_min_relevance {
                -1.25
            } else {
                -0.5
            }
        }
        SourceCategory::Other => 0.0,
    }
}

/// Assemble clamped scores with the weighted, adjusted total.
pub fn compose_scores(
    weights: &ScoreWeights,
    authenticity: f32,
    reliability: f32,
    relevance: f32,
    currency: f32,
    adjustment: f32,
) -> SourceScores {
    let clamp = |v: f32| if v.is_finite() { v.clamp(0.0, 10.0) } else { 0.0 };
    let (authenticity, reliability, relevance, currency) = (
        clamp(authenticity),
        clamp(reliability),
        clamp(relevance),
        clamp(currency),
    );
    let total = weights.combine(authenticity, reliability, relevance, currency) + adjustment;

    SourceScores {
        authenticity,
        reliability,
        relevance,
        currency,
        total: round1(clamp(total)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(category: SourceCategory, priority: u8) -> CategoryProfile {
        CategoryProfile {
            category,
            methodological: false,
            consulting_priority: priority,
        }
    }

    #[test]
    fn test_default_weights_are_mean() {
        let w = ScoreWeights::default();
        assert!((w.combine(8.0, 6.0, 4.0, 2.0) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_weights_are_normalised() {
        let w = ScoreWeights {
            authenticity: 1.0,
            reliability: 1.0,
            relevance: 2.0,
            currency: 0.0,
        };
        assert!((w.combine(4.0, 4.0, 10.0, 0.0) - 7.0).abs() < 1e-6);

        let zero = ScoreWeights {
            authenticity: 0.0,
            reliability: 0.0,
            relevance: 0.0,
            currency: 0.0,
        };
        assert!((zero.combine(4.0, 4.0, 4.0, 4.0) - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_category_adjustments() {
        let floors = CategoryFloors::default();
        let adjust = |category, tier, relevance| {
            category_adjustment(&profile(category, tier), relevance, &floors)
        };
        assert_eq!(adjust(SourceCategory::Consulting, 2, 8.0), 0.3);
        assert_eq!(adjust(SourceCategory::Consulting, 2, 5.0), -0.75);
        assert_eq!(adjust(SourceCategory::Consulting, 0, 9.0), -0.25);
        assert_eq!(adjust(SourceCategory::Consulting, 0, 3.0), -1.0);
        assert_eq!(adjust(SourceCategory::Academic, 0, 3.0), 0.5);
        assert_eq!(adjust(SourceCategory::GeneralMedia, 0, 9.0), -0.5);
        assert_eq!(adjust(SourceCategory::GeneralMedia, 0, 6.0), -1.25);

        let methodological = CategoryProfile {
            methodological: true,
            ..profile(SourceCategory::Consulting, 0)
        };
        assert_eq!(category_adjustment(&methodological, 1.0, &floors), 1.0);
    }

    #[test]
    fn test_compose_scores_clamps() {
        let scores = compose_scores(&ScoreWeights::default(), 12.0, 10.0, 10.0, 10.0, 1.0);
        assert_eq!(scores.authenticity, 10.0);
        assert_eq!(scores.total, 10.0);
        assert!(scores.is_valid());

        let low = compose_scores(&ScoreWeights::default(), 0.0, 0.0, f32::NAN, 0.0, -1.0);
        assert_eq!(low.relevance, 0.0);
        assert_eq!(low.total, 0.0);
    }
}
