//! Neurons: graph nodes holding activation state and an update rule.

use crate::ids::{GroupId, NeuronId, SynapseId};
use crate::rules::{Bounds, NeuronRule, UpdateContext};
use crate::{NetworkError, Result};
use rand::rngs::StdRng;
use simbrain_core::{Location, Time, TimeType};

/// Upper bound reported for rules without bounds. Every current rule is
/// bounded; the default is kept for unbounded rules added later.
pub const DEFAULT_UPPER_BOUND: f64 = 1.0;
/// Lower bound reported for rules without bounds
pub const DEFAULT_LOWER_BOUND: f64 = -1.0;

/// A node of the network.
///
/// Fan lists hold synapse ids; the synapses themselves live in the owning
/// network's arena. Changes that affect network-level indexes (priority,
/// rule, location, label) go through [`crate::Network`] so that the
/// priority index and listeners stay in sync.
#[derive(Debug, Clone)]
pub struct Neuron {
    id: NeuronId,
    label: String,
    activation: f64,
    buffer: f64,
    input_value: f64,
    aux_value: f64,
    target_value: f64,
    fan_in: Vec<SynapseId>,
    fan_out: Vec<SynapseId>,
    clamped: bool,
    update_priority: i32,
    temp_ignore_update: bool,
    rule: NeuronRule,
    location: Location,
    parent_group: Option<GroupId>,
}

impl Neuron {
    pub(crate) fn new(id: NeuronId, rule: NeuronRule) -> Self {
        Self {
            id,
            label: String::new(),
            activation: 0.0,
            buffer: 0.0,
            input_value: 0.0,
            aux_value: 0.0,
            target_value: 0.0,
            fan_in: Vec::new(),
            fan_out: Vec::new(),
            clamped: false,
            update_priority: 0,
            temp_ignore_update: false,
            rule,
            location: Location::default(),
            parent_group: None,
        }
    }

    pub fn id(&self) -> NeuronId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    // ------------------------------------------------------------------------
    // Activation
    // ------------------------------------------------------------------------

    pub fn activation(&self) -> f64 {
        self.activation
    }

    pub fn buffer(&self) -> f64 {
        self.buffer
    }

    /// Write the activation unless the neuron is clamped.
    ///
    /// A pending forced write makes this call a no-op once and clears the flag.
    pub fn set_activation(&mut self, value: f64) {
        if self.clamped || self.temp_ignore_update {
            self.temp_ignore_update = false;
            return;
        }
        self.activation = value;
    }

    /// Write the activation regardless of clamping; the next
    /// [`set_activation`](Self::set_activation) is ignored.
    pub fn force_set_activation(&mut self, value: f64) {
        self.temp_ignore_update = true;
        self.activation = value;
    }

    /// Whether a forced write is waiting to shadow the next normal write
    pub fn ignores_next_update(&self) -> bool {
        self.temp_ignore_update
    }

    /// Run the update rule and stage its value in the buffer.
    ///
    /// Clamped neurons are skipped. Generators receive no upstream input.
    pub fn update(
        &mut self,
        weighted_input: f64,
        time: Time,
        time_step: f64,
        rng: &mut StdRng,
    ) -> Result<()> {
        if self.clamped {
            return Ok(());
        }
        let ctx = UpdateContext {
            weighted_input: if self.is_generator() { 0.0 } else { weighted_input },
            activation: self.activation,
            time,
            time_step,
        };
        let value = self.rule.compute(&ctx, rng);
        if !value.is_finite() {
            return Err(NetworkError::NonFiniteActivation {
                neuron: self.id,
                value,
            });
        }
        self.buffer = value;
        Ok(())
    }

    /// Move the staged buffer into the activation
    pub fn commit(&mut self) {
        let staged = self.buffer;
        self.set_activation(staged);
    }

    /// Zero activation and buffer
    pub fn clear(&mut self) {
        self.activation = 0.0;
        self.buffer = 0.0;
    }

    pub fn increment_activation(&mut self) {
        if self.activation < self.upper_bound() {
            let step = self.rule.as_rule().increment();
            self.activation = (self.activation + step).min(self.upper_bound());
        }
    }

    pub fn decrement_activation(&mut self) {
        if self.activation > self.lower_bound() {
            let step = self.rule.as_rule().increment();
            self.activation = (self.activation - step).max(self.lower_bound());
        }
    }

    pub fn random_value(&self, rng: &mut StdRng) -> f64 {
        self.bounds().random(rng)
    }

    // ------------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------------

    pub fn input_value(&self) -> f64 {
        self.input_value
    }

    /// External input added to the weighted sum
    pub fn set_input_value(&mut self, value: f64) {
        self.input_value = value;
    }

    pub fn aux_value(&self) -> f64 {
        self.aux_value
    }

    pub fn set_aux_value(&mut self, value: f64) {
        self.aux_value = value;
    }

    pub fn target_value(&self) -> f64 {
        self.target_value
    }

    pub fn set_target_value(&mut self, value: f64) {
        self.target_value = value;
    }

    // ------------------------------------------------------------------------
    // Topology
    // ------------------------------------------------------------------------

    /// Incoming synapses; empty for activity generators
    pub fn fan_in(&self) -> &[SynapseId] {
        if self.is_generator() {
            &[]
        } else {
            &self.fan_in
        }
    }

    pub fn fan_out(&self) -> &[SynapseId] {
        &self.fan_out
    }

    /// All incoming synapses, including those a generator ignores
    pub(crate) fn incoming(&self) -> &[SynapseId] {
        &self.fan_in
    }

    pub(crate) fn add_source(&mut self, synapse: SynapseId) {
        self.fan_in.push(synapse);
    }

    pub(crate) fn add_target(&mut self, synapse: SynapseId) {
        self.fan_out.push(synapse);
    }

    pub(crate) fn remove_source(&mut self, synapse: SynapseId) {
        self.fan_in.retain(|s| *s != synapse);
    }

    pub(crate) fn remove_target(&mut self, synapse: SynapseId) {
        self.fan_out.retain(|s| *s != synapse);
    }

    pub fn is_connected(&self, synapse: SynapseId) -> bool {
        self.fan_in.contains(&synapse) || self.fan_out.contains(&synapse)
    }

    // ------------------------------------------------------------------------
    // Control
    // ------------------------------------------------------------------------

    pub fn is_clamped(&self) -> bool {
        self.clamped
    }

    pub fn set_clamped(&mut self, clamped: bool) {
        self.clamped = clamped;
    }

    pub fn update_priority(&self) -> i32 {
        self.update_priority
    }

    pub(crate) fn set_update_priority(&mut self, priority: i32) {
        self.update_priority = priority;
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub(crate) fn set_location(&mut self, location: Location) {
        self.location = location;
    }

    pub fn parent_group(&self) -> Option<GroupId> {
        self.parent_group
    }

    pub(crate) fn set_parent_group(&mut self, group: Option<GroupId>) {
        self.parent_group = group;
    }

    // ------------------------------------------------------------------------
    // Update rule
    // ------------------------------------------------------------------------

    pub fn rule(&self) -> &NeuronRule {
        &self.rule
    }

    pub(crate) fn rule_mut(&mut self) -> &mut NeuronRule {
        &mut self.rule
    }

    /// Replace the update rule, carrying bounds over between bounded rules.
    /// Returns the previous rule.
    pub(crate) fn replace_rule(&mut self, mut rule: NeuronRule) -> NeuronRule {
        if let (Some(old), Some(new)) = (self.rule.bounds(), rule.as_rule_mut().bounds_mut()) {
            *new = old;
        }
        std::mem::replace(&mut self.rule, rule)
    }

    pub fn time_type(&self) -> TimeType {
        self.rule.time_type()
    }

    pub fn is_generator(&self) -> bool {
        self.rule.is_generator()
    }

    /// Rule bounds. An unbounded rule would report `[-1, 1]`; none of the
    /// current rules is unbounded.
    pub fn bounds(&self) -> Bounds {
        self.rule.bounds().unwrap_or(Bounds {
            lower: DEFAULT_LOWER_BOUND,
            upper: DEFAULT_UPPER_BOUND,
        })
    }

    pub fn upper_bound(&self) -> f64 {
        self.bounds().upper
    }

    pub fn lower_bound(&self) -> f64 {
        self.bounds().lower
    }

    /// No-op unless the rule is bounded
    pub fn set_upper_bound(&mut self, upper: f64) {
        if let Some(bounds) = self.rule.as_rule_mut().bounds_mut() {
            bounds.upper = upper;
        }
    }

    /// No-op unless the rule is bounded
    pub fn set_lower_bound(&mut self, lower: f64) {
        if let Some(bounds) = self.rule.as_rule_mut().bounds_mut() {
            bounds.lower = lower;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{IntegrateAndFireRule, LinearRule, RandomRule};
    use rand::SeedableRng;

    fn neuron() -> Neuron {
        Neuron::new(NeuronId(1), NeuronRule::default())
    }

    #[test]
    fn test_clamped_neuron_ignores_updates_and_writes() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut n = neuron();
        n.force_set_activation(0.3);
        n.set_clamped(true);

        for _ in 0..5 {
            n.update(1.0, 0.0, 0.1, &mut rng).unwrap();
            n.commit();
            n.set_activation(0.9);
        }
        assert_eq!(n.activation(), 0.3);
    }

    #[test]
    fn test_forced_write_shadows_one_normal_write() {
        let mut n = neuron();
        n.force_set_activation(0.7);
        assert!(n.ignores_next_update());

        n.set_activation(0.1);
        assert_eq!(n.activation(), 0.7);
        assert!(!n.ignores_next_update());

        n.set_activation(0.1);
        assert_eq!(n.activation(), 0.1);
    }

    #[test]
    fn test_update_stages_into_buffer() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut n = neuron();
        n.update(0.4, 0.0, 0.1, &mut rng).unwrap();
        assert_eq!(n.buffer(), 0.4);
        assert_eq!(n.activation(), 0.0);
        n.commit();
        assert_eq!(n.activation(), 0.4);
    }

    #[test]
    fn test_non_finite_update_fails() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut n = Neuron::new(
            NeuronId(4),
            NeuronRule::IntegrateAndFire(IntegrateAndFireRule {
                time_constant: 0.0,
                threshold: f64::INFINITY,
                ..Default::default()
            }),
        );
        let err = n.update(1.0, 0.0, 0.1, &mut rng).unwrap_err();
        assert!(matches!(err, NetworkError::NonFiniteActivation { neuron, .. } if neuron == NeuronId(4)));
        assert_eq!(n.buffer(), 0.0);
    }

    #[test]
    fn test_bounds_carry_over_between_rules() {
        let mut n = neuron();
        n.set_upper_bound(5.0);
        n.set_lower_bound(-5.0);
        assert_eq!(n.upper_bound(), 5.0);

        let old = n.replace_rule(NeuronRule::Random(RandomRule::default()));
        assert_eq!(old.name(), "LinearRule");
        assert_eq!(n.bounds(), Bounds { lower: -5.0, upper: 5.0 });
        assert!(n.is_generator());
    }

    #[test]
    fn test_generator_hides_fan_in() {
        let mut n = neuron();
        n.add_source(SynapseId(1));
        assert_eq!(n.fan_in(), &[SynapseId(1)]);

        n.replace_rule(NeuronRule::Random(RandomRule::default()));
        assert!(n.fan_in().is_empty());
        assert_eq!(n.incoming(), &[SynapseId(1)]);

        n.replace_rule(NeuronRule::Linear(LinearRule::default()));
        assert_eq!(n.fan_in(), &[SynapseId(1)]);
    }

    #[test]
    fn test_increment_respects_bounds() {
        let mut n = neuron();
        n.force_set_activation(0.95);
        n.increment_activation();
        assert_eq!(n.activation(), 1.0);
        n.increment_activation();
        assert_eq!(n.activation(), 1.0);

        n.force_set_activation(-0.95);
        n.decrement_activation();
        assert_eq!(n.activation(), -1.0);
    }
}
