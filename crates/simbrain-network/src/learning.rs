//! Synapse learning rules.

use crate::{NetworkError, Result};
use serde::{Deserialize, Serialize};

/// Activations a learning rule may read for one synapse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningContext {
    pub source_activation: f64,
    pub target_activation: f64,
    /// Mean activation over the sources of the target's fan-in
    pub mean_target_input: f64,
}

/// Plasticity rule carried by a synapse
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum SynapseRule {
    /// Fixed weight
    #[default]
    Static,
    /// `w += lr * src * tgt`
    Hebbian { learning_rate: f64 },
    /// `w += lr * (src * tgt - tgt * mean(fan-in sources))`
    SubtractiveNormalization { learning_rate: f64 },
    /// `w += lr * tgt * (src - tgt * w)`
    Oja { learning_rate: f64 },
}

const RULE_NAMES: [&str; 4] = [
    "StaticSynapseRule",
    "HebbianRule",
    "SubtractiveNormalizationRule",
    "OjaRule",
];

impl SynapseRule {
    pub const DEFAULT_LEARNING_RATE: f64 = 1.0;

    pub fn from_name(name: &str) -> Result<Self> {
        let learning_rate = Self::DEFAULT_LEARNING_RATE;
        match name {
            "StaticSynapseRule" => Ok(SynapseRule::Static),
            "HebbianRule" => Ok(SynapseRule::Hebbian { learning_rate }),
            "SubtractiveNormalizationRule" => {
                Ok(SynapseRule::SubtractiveNormalization { learning_rate })
            }
            "OjaRule" => Ok(SynapseRule::Oja { learning_rate }),
            other => Err(NetworkError::UnknownLearningRule(other.to_string())),
        }
    }

    pub fn names() -> &'static [&'static str] {
        &RULE_NAMES
    }

    pub fn name(&self) -> &'static str {
        match self {
            SynapseRule::Static => "StaticSynapseRule",
            SynapseRule::Hebbian { .. } => "HebbianRule",
            SynapseRule::SubtractiveNormalization { .. } => "SubtractiveNormalizationRule",
            SynapseRule::Oja { .. } => "OjaRule",
        }
    }

    pub fn is_static(&self) -> bool {
        matches!(self, SynapseRule::Static)
    }

    /// Whether the rule reads [`LearningContext::mean_target_input`]
    pub fn needs_mean_input(&self) -> bool {
        matches!(self, SynapseRule::SubtractiveNormalization { .. })
    }

    /// New (unclipped) strength
    pub fn apply(&self, strength: f64, ctx: &LearningContext) -> f64 {
        let input = ctx.source_activation;
        let output = ctx.target_activation;
        match *self {
            SynapseRule::Static => strength,
            SynapseRule::Hebbian { learning_rate } => strength + learning_rate * input * output,
            SynapseRule::SubtractiveNormalization { learning_rate } => {
                strength
                    + learning_rate * (output * input - output * ctx.mean_target_input)
            }
            SynapseRule::Oja { learning_rate } => {
                strength + learning_rate * output * (input - output * strength)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(source: f64, target: f64, mean: f64) -> LearningContext {
        LearningContext {
            source_activation: source,
            target_activation: target,
            mean_target_input: mean,
        }
    }

    #[test]
    fn test_hebbian() {
        let rule = SynapseRule::Hebbian { learning_rate: 1.0 };
        assert_eq!(rule.apply(0.0, &ctx(1.0, 1.0, 0.0)), 1.0);
        assert_eq!(rule.apply(0.5, &ctx(1.0, 0.0, 0.0)), 0.5);
    }

    #[test]
    fn test_subtractive_normalization_balances() {
        let rule = SynapseRule::SubtractiveNormalization { learning_rate: 0.5 };
        // Source at the mean of its siblings: no change
        assert_eq!(rule.apply(0.2, &ctx(0.4, 1.0, 0.4)), 0.2);
        // Above the mean: potentiation
        assert!(rule.apply(0.2, &ctx(1.0, 1.0, 0.5)) > 0.2);
    }

    #[test]
    fn test_oja_decays_large_weights() {
        let rule = SynapseRule::Oja { learning_rate: 0.1 };
        assert!(rule.apply(2.0, &ctx(0.0, 1.0, 0.0)) < 2.0);
    }

    #[test]
    fn test_static_is_fixed() {
        assert_eq!(SynapseRule::Static.apply(0.3, &ctx(1.0, 1.0, 1.0)), 0.3);
        assert!(SynapseRule::default().is_static());
    }

    #[test]
    fn test_registry() {
        for name in SynapseRule::names() {
            assert_eq!(SynapseRule::from_name(name).unwrap().name(), *name);
        }
        assert!(matches!(
            SynapseRule::from_name("Backprop"),
            Err(NetworkError::UnknownLearningRule(_))
        ));
    }
}
