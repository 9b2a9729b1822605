//! Synapses: weighted directed edges between two neurons.

use crate::ids::{GroupId, NeuronId, SynapseId};
use crate::learning::{LearningContext, SynapseRule};
use crate::rules::Bounds;
use crate::{NetworkError, Result};
use rand::rngs::StdRng;

#[derive(Debug, Clone)]
pub struct Synapse {
    id: SynapseId,
    label: String,
    source: NeuronId,
    target: NeuronId,
    strength: f64,
    bounds: Bounds,
    increment: f64,
    send_weighted_input: bool,
    clamped: bool,
    rule: SynapseRule,
    parent_group: Option<GroupId>,
}

impl Synapse {
    pub(crate) fn new(id: SynapseId, source: NeuronId, target: NeuronId, strength: f64) -> Self {
        Self {
            id,
            label: String::new(),
            source,
            target,
            strength,
            bounds: Bounds::default(),
            increment: 0.1,
            send_weighted_input: true,
            clamped: false,
            rule: SynapseRule::Static,
            parent_group: None,
        }
    }

    pub fn id(&self) -> SynapseId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    pub fn source(&self) -> NeuronId {
        self.source
    }

    pub fn target(&self) -> NeuronId {
        self.target
    }

    pub fn strength(&self) -> f64 {
        self.strength
    }

    /// External write; not clipped
    pub fn set_strength(&mut self, strength: f64) {
        self.strength = strength;
    }

    /// Contribution to the target's weighted input
    pub fn value(&self, source_activation: f64) -> f64 {
        self.strength * source_activation
    }

    pub fn bounds(&self) -> Bounds {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Bounds) -> Result<()> {
        bounds.validate()?;
        self.bounds = bounds;
        Ok(())
    }

    pub fn upper_bound(&self) -> f64 {
        self.bounds.upper
    }

    pub fn lower_bound(&self) -> f64 {
        self.bounds.lower
    }

    pub fn clip_strength(&mut self) {
        self.strength = self.bounds.clip(self.strength);
    }

    pub fn increment(&self) -> f64 {
        self.increment
    }

    pub fn set_increment(&mut self, increment: f64) {
        self.increment = increment;
    }

    pub fn increment_strength(&mut self) {
        self.strength = self.bounds.clip(self.strength + self.increment);
    }

    pub fn decrement_strength(&mut self) {
        self.strength = self.bounds.clip(self.strength - self.increment);
    }

    pub fn randomize(&mut self, rng: &mut StdRng) {
        self.strength = self.bounds.random(rng);
    }

    pub fn sends_weighted_input(&self) -> bool {
        self.send_weighted_input
    }

    pub fn set_send_weighted_input(&mut self, send: bool) {
        self.send_weighted_input = send;
    }

    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    /// Frozen synapses skip learning
    pub fn set_clamped(&mut self, clamped: bool) {
        self.clamped = clamped;
    }

    pub fn rule(&self) -> &SynapseRule {
        &self.rule
    }

    pub fn set_rule(&mut self, rule: SynapseRule) {
        self.rule = rule;
    }

    pub fn parent_group(&self) -> Option<GroupId> {
        self.parent_group
    }

    pub(crate) fn set_parent_group(&mut self, group: Option<GroupId>) {
        self.parent_group = group;
    }

    /// Apply the learning rule. Clipping is left to the caller.
    pub fn update(&mut self, ctx: &LearningContext) -> Result<()> {
        if self.clamped {
            return Ok(());
        }
        let strength = self.rule.apply(self.strength, ctx);
        if !strength.is_finite() {
            return Err(NetworkError::NonFiniteStrength {
                synapse: self.id,
                value: strength,
            });
        }
        self.strength = strength;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn hebbian() -> Synapse {
        let mut s = Synapse::new(SynapseId(1), NeuronId(1), NeuronId(2), 0.0);
        s.set_rule(SynapseRule::Hebbian { learning_rate: 1.0 });
        s
    }

    const ACTIVE: LearningContext = LearningContext {
        source_activation: 1.0,
        target_activation: 1.0,
        mean_target_input: 1.0,
    };

    #[test]
    fn test_hebbian_update_then_clip() {
        let mut s = hebbian();
        s.set_bounds(Bounds { lower: -0.5, upper: 0.5 }).unwrap();
        s.update(&ACTIVE).unwrap();
        assert_eq!(s.strength(), 1.0);
        s.clip_strength();
        assert_eq!(s.strength(), 0.5);
    }

    #[test]
    fn test_clamped_synapse_does_not_learn() {
        let mut s = hebbian();
        s.set_clamped(true);
        s.update(&ACTIVE).unwrap();
        assert_eq!(s.strength(), 0.0);
    }

    #[test]
    fn test_non_finite_learning_fails() {
        let mut s = hebbian();
        s.set_rule(SynapseRule::Hebbian {
            learning_rate: f64::INFINITY,
        });
        assert!(matches!(
            s.update(&ACTIVE),
            Err(NetworkError::NonFiniteStrength { .. })
        ));
        assert_eq!(s.strength(), 0.0);
    }

    #[test]
    fn test_value_and_increment() {
        let mut s = Synapse::new(SynapseId(1), NeuronId(1), NeuronId(2), 0.5);
        assert_eq!(s.value(2.0), 1.0);
        s.set_strength(0.95);
        s.increment_strength();
        assert_eq!(s.strength(), 1.0);
    }

    #[test]
    fn test_randomize_within_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut s = hebbian();
        for _ in 0..20 {
            s.randomize(&mut rng);
            assert!(s.bounds().contains(s.strength()));
        }
    }

    #[test]
    fn test_rejects_inverted_bounds() {
        let mut s = hebbian();
        assert!(s.set_bounds(Bounds { lower: 1.0, upper: 0.0 }).is_err());
        assert_eq!(s.bounds(), Bounds::default());
    }
}
