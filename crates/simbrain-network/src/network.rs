//! The network arena: owns every neuron, synapse and group and keeps the
//! cross references between them consistent.
//!
//! All structural edits take `&mut self`, so an edit can never overlap a tick.
//! Use [`crate::SharedNetwork`] when a driver thread and an editor share one
//! network.

use crate::connect::{ConnectTarget, ConnectionSpec};
use crate::control::RunControl;
use crate::event::{Listeners, NetworkEvent, NetworkListener};
use crate::group::{Group, GroupDynamics, GroupKind, GroupMember};
use crate::ids::{GroupId, IdSequence, ListenerId, NeuronId, SynapseId};
use crate::learning::SynapseRule;
use crate::neuron::Neuron;
use crate::rules::{Bounds, NeuronRule};
use crate::synapse::Synapse;
use crate::{NetworkError, Result};
use log::{debug, warn};
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use simbrain_core::{Location, Time, TimeType};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

// ============================================================================
// PARAMETERS
// ============================================================================

/// When neuron writes become visible within a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateMode {
    /// Every neuron reads last tick's activations; all commit together
    #[default]
    Buffered,
    /// Each neuron commits right after its update, in priority order
    Immediate,
}

/// Which activations learning rules read during the synapse pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlasticityView {
    /// Activations committed earlier in the same tick
    #[default]
    Committed,
    /// Activations as they were when the tick started
    PreviousTick,
}

/// Network-wide settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkParams {
    /// Time added per tick when any rule is continuous
    pub time_step: f64,
    pub update_mode: UpdateMode,
    pub plasticity_view: PlasticityView,
    /// Seed for the network's random generator
    pub rng_seed: u64,
}

impl Default for NetworkParams {
    fn default() -> Self {
        Self {
            time_step: 0.1,
            update_mode: UpdateMode::Buffered,
            plasticity_view: PlasticityView::Committed,
            rng_seed: 12345,
        }
    }
}

impl NetworkParams {
    pub fn validate(&self) -> Result<()> {
        if !self.time_step.is_finite() || self.time_step <= 0.0 {
            return Err(NetworkError::InvalidParameter(format!(
                "time step must be positive, got {}",
                self.time_step
            )));
        }
        Ok(())
    }
}

// ============================================================================
// NETWORK
// ============================================================================

#[derive(Debug)]
pub struct Network {
    pub(crate) params: NetworkParams,
    ids: IdSequence,
    pub(crate) neurons: BTreeMap<NeuronId, Neuron>,
    pub(crate) synapses: BTreeMap<SynapseId, Synapse>,
    pub(crate) groups: BTreeMap<GroupId, Group>,
    /// `(priority, id)`: ascending priority, ties in insertion order
    pub(crate) priority_index: BTreeSet<(i32, NeuronId)>,
    pub(crate) time: Time,
    pub(crate) tick: u64,
    pub(crate) rng: StdRng,
    pub(crate) run_control: RunControl,
    listeners: Listeners,
}

impl Default for Network {
    fn default() -> Self {
        Self::build(NetworkParams::default())
    }
}

impl Network {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(params: NetworkParams) -> Result<Self> {
        params.validate()?;
        Ok(Self::build(params))
    }

    fn build(params: NetworkParams) -> Self {
        let rng = StdRng::seed_from_u64(params.rng_seed);
        Self {
            params,
            ids: IdSequence::default(),
            neurons: BTreeMap::new(),
            synapses: BTreeMap::new(),
            groups: BTreeMap::new(),
            priority_index: BTreeSet::new(),
            time: 0.0,
            tick: 0,
            rng,
            run_control: RunControl::new(),
            listeners: Listeners::default(),
        }
    }

    pub fn params(&self) -> &NetworkParams {
        &self.params
    }

    pub fn set_update_mode(&mut self, mode: UpdateMode) {
        self.params.update_mode = mode;
    }

    pub fn set_plasticity_view(&mut self, view: PlasticityView) {
        self.params.plasticity_view = view;
    }

    pub fn set_time_step(&mut self, time_step: f64) -> Result<()> {
        let params = NetworkParams {
            time_step,
            ..self.params.clone()
        };
        params.validate()?;
        self.params = params;
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Lookup
    // ------------------------------------------------------------------------

    pub fn neuron(&self, id: NeuronId) -> Option<&Neuron> {
        self.neurons.get(&id)
    }

    /// Direct access to neuron state. Edits made here do not notify listeners.
    pub fn neuron_mut(&mut self, id: NeuronId) -> Option<&mut Neuron> {
        self.neurons.get_mut(&id)
    }

    pub fn synapse(&self, id: SynapseId) -> Option<&Synapse> {
        self.synapses.get(&id)
    }

    /// Direct access to synapse state. Edits made here do not notify listeners.
    pub fn synapse_mut(&mut self, id: SynapseId) -> Option<&mut Synapse> {
        self.synapses.get_mut(&id)
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub(crate) fn neuron_ref(&self, id: NeuronId) -> Result<&Neuron> {
        self.neurons.get(&id).ok_or(NetworkError::NeuronNotFound(id))
    }

    fn neuron_entry(&mut self, id: NeuronId) -> Result<&mut Neuron> {
        self.neurons
            .get_mut(&id)
            .ok_or(NetworkError::NeuronNotFound(id))
    }

    fn synapse_ref(&self, id: SynapseId) -> Result<&Synapse> {
        self.synapses.get(&id).ok_or(NetworkError::SynapseNotFound(id))
    }

    fn synapse_entry(&mut self, id: SynapseId) -> Result<&mut Synapse> {
        self.synapses
            .get_mut(&id)
            .ok_or(NetworkError::SynapseNotFound(id))
    }

    fn group_ref(&self, id: GroupId) -> Result<&Group> {
        self.groups.get(&id).ok_or(NetworkError::GroupNotFound(id))
    }

    /// Neuron ids in insertion order
    pub fn neuron_ids(&self) -> Vec<NeuronId> {
        self.neurons.keys().copied().collect()
    }

    /// Synapse ids in insertion order
    pub fn synapse_ids(&self) -> Vec<SynapseId> {
        self.synapses.keys().copied().collect()
    }

    pub fn group_ids(&self) -> Vec<GroupId> {
        self.groups.keys().copied().collect()
    }

    /// Neuron ids in evaluation order
    pub fn update_order(&self) -> Vec<NeuronId> {
        self.priority_index.iter().map(|(_, id)| *id).collect()
    }

    pub fn neuron_count(&self) -> usize {
        self.neurons.len()
    }

    pub fn synapse_count(&self) -> usize {
        self.synapses.len()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    // ------------------------------------------------------------------------
    // Neurons
    // ------------------------------------------------------------------------

    pub fn add_neuron(&mut self, rule: NeuronRule) -> NeuronId {
        self.add_neuron_at(rule, Location::default())
    }

    pub fn add_neuron_at(&mut self, rule: NeuronRule, location: Location) -> NeuronId {
        let id = self.ids.next_neuron();
        let mut neuron = Neuron::new(id, rule);
        neuron.set_location(location);
        self.priority_index.insert((neuron.update_priority(), id));
        self.neurons.insert(id, neuron);
        debug!("Added {}", id);
        self.notify(NetworkEvent::NeuronAdded(id));
        id
    }

    /// Remove a neuron together with every synapse touching it
    pub fn remove_neuron(&mut self, id: NeuronId) -> Result<()> {
        let neuron = self.neuron_ref(id)?;
        let mut incident: Vec<SynapseId> = neuron
            .incoming()
            .iter()
            .chain(neuron.fan_out())
            .copied()
            .collect();
        // Self connections appear in both lists
        incident.sort();
        incident.dedup();
        for synapse in &incident {
            self.remove_synapse(*synapse)?;
        }

        let neuron = self
            .neurons
            .remove(&id)
            .ok_or(NetworkError::NeuronNotFound(id))?;
        self.priority_index.remove(&(neuron.update_priority(), id));
        debug!("Removed {} and {} incident synapse(s)", id, incident.len());
        self.notify(NetworkEvent::NeuronRemoved(id));

        if let Some(group) = neuron.parent_group() {
            self.detach_member(group, GroupMember::Neuron(id));
        }
        Ok(())
    }

    /// Swap the update rule; bounds carry over between bounded rules
    pub fn set_update_rule(&mut self, id: NeuronId, rule: NeuronRule) -> Result<()> {
        let new_rule = rule.name();
        let old = self.neuron_entry(id)?.replace_rule(rule);
        self.notify(NetworkEvent::NeuronTypeChanged {
            neuron: id,
            old_rule: old.name(),
            new_rule,
        });
        Ok(())
    }

    /// Swap the update rule for a default-configured rule named in the registry
    pub fn set_update_rule_by_name(&mut self, id: NeuronId, name: &str) -> Result<()> {
        let rule = NeuronRule::from_name(name)?;
        self.set_update_rule(id, rule)
    }

    /// Edit the parameters of a neuron's current rule in place. Switching to
    /// another rule kind goes through [`Network::set_update_rule`].
    pub fn edit_update_rule<R>(
        &mut self,
        id: NeuronId,
        edit: impl FnOnce(&mut NeuronRule) -> R,
    ) -> Result<R> {
        let neuron = self.neuron_entry(id)?;
        let mut rule = neuron.rule().clone();
        let result = edit(&mut rule);
        if rule.name() != neuron.rule().name() {
            return Err(NetworkError::InvalidParameter(format!(
                "{} cannot switch from {} to {} in place",
                id,
                neuron.rule().name(),
                rule.name()
            )));
        }
        *neuron.rule_mut() = rule;
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(result)
    }

    pub fn set_update_priority(&mut self, id: NeuronId, priority: i32) -> Result<()> {
        let neuron = self.neuron_entry(id)?;
        let old = neuron.update_priority();
        neuron.set_update_priority(priority);
        self.priority_index.remove(&(old, id));
        self.priority_index.insert((priority, id));
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(())
    }

    pub fn set_clamped(&mut self, id: NeuronId, clamped: bool) -> Result<()> {
        self.neuron_entry(id)?.set_clamped(clamped);
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(())
    }

    /// Normal write: dropped for clamped neurons and after a forced write
    pub fn set_activation(&mut self, id: NeuronId, value: f64) -> Result<()> {
        self.neuron_entry(id)?.set_activation(value);
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(())
    }

    /// External injection that bypasses clamping
    pub fn force_set_activation(&mut self, id: NeuronId, value: f64) -> Result<()> {
        self.neuron_entry(id)?.force_set_activation(value);
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(())
    }

    pub fn set_input_value(&mut self, id: NeuronId, value: f64) -> Result<()> {
        self.neuron_entry(id)?.set_input_value(value);
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(())
    }

    /// Set the activation to a random value within the neuron's bounds
    pub fn randomize_neuron(&mut self, id: NeuronId) -> Result<()> {
        let neuron = self
            .neurons
            .get_mut(&id)
            .ok_or(NetworkError::NeuronNotFound(id))?;
        let value = neuron.random_value(&mut self.rng);
        neuron.force_set_activation(value);
        self.notify(NetworkEvent::NeuronChanged(id));
        Ok(())
    }

    pub fn set_location(&mut self, id: NeuronId, location: Location) -> Result<()> {
        self.neuron_entry(id)?.set_location(location);
        self.notify(NetworkEvent::NeuronMoved(id));
        Ok(())
    }

    pub fn set_label(&mut self, id: NeuronId, label: &str) -> Result<()> {
        self.neuron_entry(id)?.set_label(label);
        self.notify(NetworkEvent::NeuronLabelChanged(id));
        Ok(())
    }

    /// Zero every neuron's activation and buffer
    pub fn clear_activations(&mut self) {
        let ids = self.neuron_ids();
        for id in ids {
            if let Some(neuron) = self.neurons.get_mut(&id) {
                neuron.clear();
            }
            self.notify(NetworkEvent::NeuronChanged(id));
        }
    }

    // ------------------------------------------------------------------------
    // Synapses
    // ------------------------------------------------------------------------

    /// Connect `source` to `target` with a static synapse
    pub fn add_synapse(
        &mut self,
        source: NeuronId,
        target: NeuronId,
        strength: f64,
    ) -> Result<SynapseId> {
        self.neuron_ref(source)?;
        self.neuron_ref(target)?;
        let id = self.insert_synapse(source, target, strength);
        debug!("Added {} ({} -> {})", id, source, target);
        Ok(id)
    }

    /// Both endpoints must exist
    fn insert_synapse(&mut self, source: NeuronId, target: NeuronId, strength: f64) -> SynapseId {
        let id = self.ids.next_synapse();
        self.synapses
            .insert(id, Synapse::new(id, source, target, strength));
        if let Some(neuron) = self.neurons.get_mut(&source) {
            neuron.add_target(id);
        }
        if let Some(neuron) = self.neurons.get_mut(&target) {
            neuron.add_source(id);
        }
        self.notify(NetworkEvent::SynapseAdded(id));
        id
    }

    /// Remove a synapse from the network and from both endpoint fan lists
    pub fn remove_synapse(&mut self, id: SynapseId) -> Result<()> {
        let synapse = self
            .synapses
            .remove(&id)
            .ok_or(NetworkError::SynapseNotFound(id))?;
        if let Some(neuron) = self.neurons.get_mut(&synapse.source()) {
            neuron.remove_target(id);
        }
        if let Some(neuron) = self.neurons.get_mut(&synapse.target()) {
            neuron.remove_source(id);
        }
        debug!("Removed {}", id);
        self.notify(NetworkEvent::SynapseRemoved(id));

        if let Some(group) = synapse.parent_group() {
            self.detach_member(group, GroupMember::Synapse(id));
        }
        Ok(())
    }

    pub fn set_learning_rule(&mut self, id: SynapseId, rule: SynapseRule) -> Result<()> {
        self.synapse_entry(id)?.set_rule(rule);
        self.notify(NetworkEvent::SynapseChanged(id));
        Ok(())
    }

    pub fn set_learning_rule_by_name(&mut self, id: SynapseId, name: &str) -> Result<()> {
        let rule = SynapseRule::from_name(name)?;
        self.set_learning_rule(id, rule)
    }

    /// External write; not clipped until the synapse next learns
    pub fn set_strength(&mut self, id: SynapseId, strength: f64) -> Result<()> {
        self.synapse_entry(id)?.set_strength(strength);
        self.notify(NetworkEvent::SynapseChanged(id));
        Ok(())
    }

    pub fn set_synapse_bounds(&mut self, id: SynapseId, bounds: Bounds) -> Result<()> {
        self.synapse_entry(id)?.set_bounds(bounds)?;
        self.notify(NetworkEvent::SynapseChanged(id));
        Ok(())
    }

    pub fn randomize_synapse(&mut self, id: SynapseId) -> Result<()> {
        let synapse = self
            .synapses
            .get_mut(&id)
            .ok_or(NetworkError::SynapseNotFound(id))?;
        synapse.randomize(&mut self.rng);
        self.notify(NetworkEvent::SynapseChanged(id));
        Ok(())
    }

    /// Create synapses between two neuron sets according to `spec`
    pub fn connect(
        &mut self,
        sources: &[NeuronId],
        targets: &[NeuronId],
        spec: &ConnectionSpec,
    ) -> Result<Vec<SynapseId>> {
        spec.weight.validate()?;
        if let Some(bounds) = spec.bounds {
            bounds.validate()?;
        }
        if let ConnectTarget::Group(group) = spec.target {
            let group = self.group_ref(group)?;
            if !matches!(group.kind(), GroupKind::Synapse) {
                return Err(NetworkError::GroupKindMismatch {
                    group: group.id(),
                    kind: group.kind().name(),
                    member: "synapses".to_string(),
                });
            }
        }
        let located = |ids: &[NeuronId]| -> Result<Vec<(NeuronId, Location)>> {
            ids.iter()
                .map(|id| self.neuron_ref(*id).map(|n| (*id, n.location())))
                .collect()
        };
        let source_locations = located(sources)?;
        let target_locations = located(targets)?;
        let pairs = spec
            .connector
            .pairs(&source_locations, &target_locations, &mut self.rng)?;

        let mut created = Vec::with_capacity(pairs.len());
        for (source, target) in pairs {
            let strength = spec.weight.sample(&mut self.rng);
            let id = self.insert_synapse(source, target, strength);
            if let Some(synapse) = self.synapses.get_mut(&id) {
                synapse.set_rule(spec.learning_rule.clone());
                if let Some(bounds) = spec.bounds {
                    synapse.set_bounds(bounds)?;
                }
            }
            if let ConnectTarget::Group(group) = spec.target {
                self.attach(group, GroupMember::Synapse(id));
            }
            created.push(id);
        }
        debug!(
            "{} created {} synapse(s) from {} source(s) to {} target(s)",
            spec.connector.name(),
            created.len(),
            sources.len(),
            targets.len()
        );
        if let ConnectTarget::Group(group) = spec.target {
            self.notify(NetworkEvent::GroupChanged(group));
        }
        Ok(created)
    }

    // ------------------------------------------------------------------------
    // Groups
    // ------------------------------------------------------------------------

    pub fn add_neuron_group(
        &mut self,
        label: &str,
        members: &[NeuronId],
        dynamics: GroupDynamics,
    ) -> Result<GroupId> {
        validate_dynamics(&dynamics)?;
        let members: Vec<GroupMember> = members.iter().map(|id| GroupMember::Neuron(*id)).collect();
        self.create_group(label, GroupKind::Neuron(dynamics), &members)
    }

    pub fn add_synapse_group(&mut self, label: &str, members: &[SynapseId]) -> Result<GroupId> {
        let members: Vec<GroupMember> = members.iter().map(|id| GroupMember::Synapse(*id)).collect();
        self.create_group(label, GroupKind::Synapse, &members)
    }

    pub fn add_subnetwork(&mut self, label: &str, children: &[GroupId]) -> Result<GroupId> {
        let members: Vec<GroupMember> = children.iter().map(|id| GroupMember::Group(*id)).collect();
        self.create_group(label, GroupKind::Subnetwork, &members)
    }

    fn create_group(
        &mut self,
        label: &str,
        kind: GroupKind,
        members: &[GroupMember],
    ) -> Result<GroupId> {
        let mut seen = HashSet::new();
        for member in members {
            if !seen.insert(*member) {
                return Err(NetworkError::InvalidParameter(format!(
                    "{} listed twice",
                    member
                )));
            }
            self.check_free(*member)?;
        }

        let id = self.ids.next_group();
        let group = Group::new(id, label, kind);
        for member in members {
            if !group.accepts(*member) {
                return Err(NetworkError::GroupKindMismatch {
                    group: id,
                    kind: group.kind().name(),
                    member: member.to_string(),
                });
            }
        }
        self.groups.insert(id, group);
        for member in members {
            self.attach(id, *member);
        }
        debug!("Added {} \"{}\" with {} member(s)", id, label, members.len());
        self.notify(NetworkEvent::GroupAdded(id));
        Ok(id)
    }

    /// Add an ungrouped entity to a group of the matching kind
    pub fn add_to_group(&mut self, group: GroupId, member: GroupMember) -> Result<()> {
        self.check_attachable(group, member)?;
        self.check_free(member)?;
        self.attach(group, member);
        self.notify(NetworkEvent::GroupChanged(group));
        Ok(())
    }

    /// Take `member` out of `group`; the member itself stays in the network.
    /// The group is deleted if this empties it and it deletes when empty.
    pub fn remove_from_group(&mut self, group: GroupId, member: GroupMember) -> Result<()> {
        if !self.group_ref(group)?.contains(member) {
            return Err(NetworkError::InvalidParameter(format!(
                "{} is not a member of {}",
                member, group
            )));
        }
        self.set_member_parent(member, None);
        self.detach_member(group, member);
        Ok(())
    }

    /// Move a group under a subnetwork, or make it top level with `None`
    pub fn set_group_parent(&mut self, child: GroupId, parent: Option<GroupId>) -> Result<()> {
        let old = self.group_ref(child)?.parent();
        if old == parent {
            return Ok(());
        }
        if let Some(parent) = parent {
            self.check_attachable(parent, GroupMember::Group(child))?;
        }
        if let Some(old) = old {
            if let Some(group) = self.groups.get_mut(&old) {
                group.remove(GroupMember::Group(child));
            }
        }
        self.set_member_parent(GroupMember::Group(child), None);
        if let Some(parent) = parent {
            self.attach(parent, GroupMember::Group(child));
            self.notify(NetworkEvent::GroupChanged(parent));
        }
        // Run the cascade only after the child is re-homed so a new ancestor
        // is never seen empty
        if let Some(old) = old {
            self.member_removed(old);
        }
        self.notify(NetworkEvent::GroupChanged(child));
        Ok(())
    }

    pub fn set_delete_when_empty(&mut self, group: GroupId, delete: bool) -> Result<()> {
        self.groups
            .get_mut(&group)
            .ok_or(NetworkError::GroupNotFound(group))?
            .set_delete_when_empty(delete);
        self.notify(NetworkEvent::GroupChanged(group));
        Ok(())
    }

    pub fn set_group_dynamics(&mut self, group: GroupId, dynamics: GroupDynamics) -> Result<()> {
        validate_dynamics(&dynamics)?;
        let entry = self
            .groups
            .get_mut(&group)
            .ok_or(NetworkError::GroupNotFound(group))?;
        if !entry.set_dynamics(dynamics) {
            return Err(NetworkError::GroupKindMismatch {
                group,
                kind: entry.kind().name(),
                member: "dynamics".to_string(),
            });
        }
        self.notify(NetworkEvent::GroupChanged(group));
        Ok(())
    }

    pub fn set_group_label(&mut self, group: GroupId, label: &str) -> Result<()> {
        self.groups
            .get_mut(&group)
            .ok_or(NetworkError::GroupNotFound(group))?
            .set_label(label);
        self.notify(NetworkEvent::GroupChanged(group));
        Ok(())
    }

    /// Delete a group with everything it holds: member neurons (and their
    /// synapses), member synapses and child groups.
    pub fn remove_group(&mut self, id: GroupId) -> Result<()> {
        let parent = self.group_ref(id)?.parent();

        // Children before parents
        let mut subtree = Vec::new();
        let mut stack = vec![id];
        while let Some(gid) = stack.pop() {
            if let Some(group) = self.groups.get(&gid) {
                stack.extend(group.children().iter().copied());
                subtree.push(gid);
            }
        }
        subtree.reverse();

        // Take the whole subtree out first so member removal cannot cascade into it
        let removed: Vec<Group> = subtree
            .iter()
            .filter_map(|gid| self.groups.remove(gid))
            .collect();
        for group in &removed {
            for synapse in group.synapses() {
                if self.synapses.contains_key(synapse) {
                    self.remove_synapse(*synapse)?;
                }
            }
            for neuron in group.neurons() {
                if self.neurons.contains_key(neuron) {
                    self.remove_neuron(*neuron)?;
                }
            }
            debug!("Removed {}", group);
            self.notify(NetworkEvent::GroupRemoved(group.id()));
        }

        if let Some(parent) = parent {
            self.detach_member(parent, GroupMember::Group(id));
        }
        Ok(())
    }

    fn check_free(&self, member: GroupMember) -> Result<()> {
        let parent = match member {
            GroupMember::Neuron(id) => self.neuron_ref(id)?.parent_group(),
            GroupMember::Synapse(id) => self.synapse_ref(id)?.parent_group(),
            GroupMember::Group(id) => self.group_ref(id)?.parent(),
        };
        match parent {
            Some(group) => Err(NetworkError::AlreadyGrouped {
                member: member.to_string(),
                group,
            }),
            None => Ok(()),
        }
    }

    /// Kind match and, for child groups, no cycles
    fn check_attachable(&self, group: GroupId, member: GroupMember) -> Result<()> {
        let entry = self.group_ref(group)?;
        if !entry.accepts(member) {
            return Err(NetworkError::GroupKindMismatch {
                group,
                kind: entry.kind().name(),
                member: member.to_string(),
            });
        }
        if let GroupMember::Group(child) = member {
            self.group_ref(child)?;
            let mut ancestor = Some(group);
            while let Some(current) = ancestor {
                if current == child {
                    return Err(NetworkError::InvalidParameter(format!(
                        "{} cannot be nested inside itself",
                        child
                    )));
                }
                ancestor = self.groups.get(&current).and_then(Group::parent);
            }
        }
        Ok(())
    }

    /// Link both sides of a membership; callers validate first
    fn attach(&mut self, group: GroupId, member: GroupMember) {
        if let Some(entry) = self.groups.get_mut(&group) {
            entry.push(member);
        }
        self.set_member_parent(member, Some(group));
    }

    fn set_member_parent(&mut self, member: GroupMember, parent: Option<GroupId>) {
        match member {
            GroupMember::Neuron(id) => {
                if let Some(neuron) = self.neurons.get_mut(&id) {
                    neuron.set_parent_group(parent);
                }
            }
            GroupMember::Synapse(id) => {
                if let Some(synapse) = self.synapses.get_mut(&id) {
                    synapse.set_parent_group(parent);
                }
            }
            GroupMember::Group(id) => {
                if let Some(group) = self.groups.get_mut(&id) {
                    group.set_parent(parent);
                }
            }
        }
    }

    fn detach_member(&mut self, group: GroupId, member: GroupMember) {
        let removed = self
            .groups
            .get_mut(&group)
            .map_or(false, |entry| entry.remove(member));
        if removed {
            self.member_removed(group);
        }
    }

    /// Delete-when-empty cascade, walking up the parent chain
    fn member_removed(&mut self, group: GroupId) {
        let mut current = Some(group);
        while let Some(id) = current {
            let Some(entry) = self.groups.get(&id) else {
                break;
            };
            if !(entry.is_empty() && entry.delete_when_empty()) {
                self.notify(NetworkEvent::GroupChanged(id));
                break;
            }
            let parent = entry.parent();
            self.groups.remove(&id);
            debug!("Removed empty {}", id);
            self.notify(NetworkEvent::GroupRemoved(id));
            if let Some(parent) = parent {
                if let Some(entry) = self.groups.get_mut(&parent) {
                    entry.remove(GroupMember::Group(id));
                }
            }
            current = parent;
        }
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    /// `sum(strength * source activation)` over the fan-in plus the external input
    pub fn weighted_input(&self, id: NeuronId) -> Result<f64> {
        self.neuron_ref(id)?;
        Ok(weighted_input_of(&self.neurons, &self.synapses, id))
    }

    /// The synapse's contribution to its target's weighted input
    pub fn synapse_value(&self, id: SynapseId) -> Result<f64> {
        let synapse = self.synapse_ref(id)?;
        let source = self.neuron_ref(synapse.source())?;
        Ok(synapse.value(source.activation()))
    }

    fn fan_in_synapses(&self, id: NeuronId) -> Result<impl Iterator<Item = &Synapse>> {
        let neuron = self.neuron_ref(id)?;
        Ok(neuron
            .fan_in()
            .iter()
            .filter_map(|sid| self.synapses.get(sid)))
    }

    fn source_activation(&self, synapse: &Synapse) -> f64 {
        self.neurons
            .get(&synapse.source())
            .map_or(0.0, Neuron::activation)
    }

    pub fn summed_incoming_weights(&self, id: NeuronId) -> Result<f64> {
        Ok(self.fan_in_synapses(id)?.map(Synapse::strength).sum())
    }

    /// Sum of source activations, ignoring strengths
    pub fn total_input(&self, id: NeuronId) -> Result<f64> {
        Ok(self
            .fan_in_synapses(id)?
            .map(|s| self.source_activation(s))
            .sum())
    }

    pub fn average_input(&self, id: NeuronId) -> Result<f64> {
        let count = self.fan_in_synapses(id)?.count();
        if count == 0 {
            return Ok(0.0);
        }
        Ok(self.total_input(id)? / count as f64)
    }

    /// Sources whose activation exceeds `threshold`
    pub fn number_of_active_inputs(&self, id: NeuronId, threshold: f64) -> Result<usize> {
        Ok(self
            .fan_in_synapses(id)?
            .filter(|s| self.source_activation(s) > threshold)
            .count())
    }

    pub fn activations(&self, ids: &[NeuronId]) -> Result<Array1<f64>> {
        ids.iter()
            .map(|id| self.neuron_ref(*id).map(Neuron::activation))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from)
    }

    /// `m[[i, j]]`: summed strength from `sources[i]` to `targets[j]`
    pub fn weight_matrix(&self, sources: &[NeuronId], targets: &[NeuronId]) -> Result<Array2<f64>> {
        let columns: HashMap<NeuronId, usize> = targets
            .iter()
            .enumerate()
            .map(|(j, id)| (*id, j))
            .collect();
        for id in targets {
            self.neuron_ref(*id)?;
        }
        let mut matrix = Array2::zeros((sources.len(), targets.len()));
        for (i, id) in sources.iter().enumerate() {
            for sid in self.neuron_ref(*id)?.fan_out() {
                if let Some(synapse) = self.synapses.get(sid) {
                    if let Some(&j) = columns.get(&synapse.target()) {
                        matrix[[i, j]] += synapse.strength();
                    }
                }
            }
        }
        Ok(matrix)
    }

    pub fn time(&self) -> Time {
        self.time
    }

    pub fn tick_count(&self) -> u64 {
        self.tick
    }

    /// Continuous as soon as any neuron's rule is continuous
    pub fn time_type(&self) -> TimeType {
        self.neurons
            .values()
            .fold(TimeType::Discrete, |acc, n| acc.combine(n.time_type()))
    }

    /// Verify the cross references between arena entries
    pub fn check_invariants(&self) -> Result<()> {
        let violation = |msg: String| -> Result<()> { Err(NetworkError::InvariantViolation(msg)) };

        for (id, synapse) in &self.synapses {
            let (Some(source), Some(target)) = (
                self.neurons.get(&synapse.source()),
                self.neurons.get(&synapse.target()),
            ) else {
                return violation(format!("{} references a removed neuron", id));
            };
            if !source.fan_out().contains(id) || !target.incoming().contains(id) {
                return violation(format!("{} missing from an endpoint fan list", id));
            }
        }
        for (id, neuron) in &self.neurons {
            for sid in neuron.incoming() {
                if self.synapses.get(sid).map(Synapse::target) != Some(*id) {
                    return violation(format!("{} lists stray incoming {}", id, sid));
                }
            }
            for sid in neuron.fan_out() {
                if self.synapses.get(sid).map(Synapse::source) != Some(*id) {
                    return violation(format!("{} lists stray outgoing {}", id, sid));
                }
            }
            if !self.priority_index.contains(&(neuron.update_priority(), *id)) {
                return violation(format!("{} missing from the priority index", id));
            }
        }
        if self.priority_index.len() != self.neurons.len() {
            return violation("priority index holds removed neurons".to_string());
        }

        for (gid, group) in &self.groups {
            for neuron in group.neurons() {
                if self.neurons.get(neuron).and_then(Neuron::parent_group) != Some(*gid) {
                    return violation(format!("{} member {} points elsewhere", gid, neuron));
                }
            }
            for synapse in group.synapses() {
                if self.synapses.get(synapse).and_then(Synapse::parent_group) != Some(*gid) {
                    return violation(format!("{} member {} points elsewhere", gid, synapse));
                }
            }
            for child in group.children() {
                if self.groups.get(child).and_then(Group::parent) != Some(*gid) {
                    return violation(format!("{} child {} points elsewhere", gid, child));
                }
            }
            if let Some(parent) = group.parent() {
                if !self
                    .groups
                    .get(&parent)
                    .map_or(false, |p| p.contains(GroupMember::Group(*gid)))
                {
                    return violation(format!("{} not listed by its parent {}", gid, parent));
                }
            }
        }
        for (id, neuron) in &self.neurons {
            if let Some(gid) = neuron.parent_group() {
                if !self
                    .groups
                    .get(&gid)
                    .map_or(false, |g| g.contains(GroupMember::Neuron(*id)))
                {
                    return violation(format!("{} not listed by {}", id, gid));
                }
            }
        }
        for (id, synapse) in &self.synapses {
            if let Some(gid) = synapse.parent_group() {
                if !self
                    .groups
                    .get(&gid)
                    .map_or(false, |g| g.contains(GroupMember::Synapse(*id)))
                {
                    return violation(format!("{} not listed by {}", id, gid));
                }
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Listeners and run control
    // ------------------------------------------------------------------------

    pub fn add_listener(&mut self, listener: impl NetworkListener + 'static) -> ListenerId {
        let id = self.ids.next_listener();
        self.listeners.add(id, Box::new(listener));
        id
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        let removed = self.listeners.remove(id);
        if !removed {
            warn!("{} was not registered", id);
        }
        removed
    }

    pub(crate) fn notify(&mut self, event: NetworkEvent) {
        self.listeners.fire(event);
    }

    /// Handle for stopping [`Network::run`] from elsewhere
    pub fn run_control(&self) -> RunControl {
        self.run_control.clone()
    }

    pub fn set_running(&self, running: bool) {
        self.run_control.set_running(running);
    }

    pub fn is_running(&self) -> bool {
        self.run_control.is_running()
    }
}

/// Weighted input of `id` from the given arena state
pub(crate) fn weighted_input_of(
    neurons: &BTreeMap<NeuronId, Neuron>,
    synapses: &BTreeMap<SynapseId, Synapse>,
    id: NeuronId,
) -> f64 {
    let Some(neuron) = neurons.get(&id) else {
        return 0.0;
    };
    let upstream: f64 = neuron
        .fan_in()
        .iter()
        .filter_map(|sid| synapses.get(sid))
        .filter(|s| s.sends_weighted_input())
        .map(|s| {
            let activation = neurons.get(&s.source()).map_or(0.0, Neuron::activation);
            s.value(activation)
        })
        .sum();
    upstream + neuron.input_value()
}

fn validate_dynamics(dynamics: &GroupDynamics) -> Result<()> {
    if let Some((_, win, lose)) = dynamics.competition() {
        if !win.is_finite() || !lose.is_finite() {
            return Err(NetworkError::InvalidParameter(format!(
                "competition values must be finite, got win {} lose {}",
                win, lose
            )));
        }
    }
    Ok(())
}
