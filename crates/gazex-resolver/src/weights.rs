//! Weight vector for the confidence-scoring formula.

use serde::{Deserialize, Serialize};

use gazex_common::ScoringConfig;

/// The three-component weight vector. Weights sum to 1.0; name
/// dominates so an exact-name candidate survives even a wrong hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringWeights {
    /// Name match (exact vs. substring vs. miss).
    pub name: f64,
    /// Type-hint agreement via the translation table.
    pub type_code: f64,
    /// Log-scaled population relative to same-name peers.
    pub population: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            name:       0.60,
            type_code:  0.25,
            population: 0.15,
        }
    }
}

impl From<&ScoringConfig> for ScoringWeights {
    fn from(cfg: &ScoringConfig) -> Self {
        Self {
            name: cfg.name_weight,
            type_code: cfg.type_weight,
            population: cfg.population_weight,
        }
    }
}

impl ScoringWeights {
    /// Validate that all weights sum to ~1.0
    pub fn validate(&self) -> bool {
        let sum = self.name + self.type_code + self.population;
        (sum - 1.0).abs() < 1e-6
    }

    /// Renormalise weights so they sum to 1.0
    pub fn normalise(&mut self) {
        let sum = self.name + self.type_code + self.population;
        if sum > 0.0 {
            self.name       /= sum;
            self.type_code  /= sum;
            self.population /= sum;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ScoringWeights::default();
        assert!(w.validate(), "Default weights must sum to 1.0");
    }

    #[test]
    fn test_normalise_restores_sum() {
        let mut w = ScoringWeights::default();
        w.name += 0.10; // deliberately break sum
        assert!(!w.validate());
        w.normalise();
        assert!(w.validate());
    }

    #[test]
    fn test_from_config() {
        let w = ScoringWeights::from(&ScoringConfig::default());
        assert!(w.validate());
        assert!(w.name > w.type_code && w.type_code > w.population);
    }
}
