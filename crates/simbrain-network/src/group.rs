//! Groups of neurons, synapses or other groups.
//!
//! A group's member lists are the authoritative side of membership; every
//! member points back through its `parent_group`. The network keeps both
//! sides in step and deletes groups that become empty when they are marked
//! `delete_when_empty`.

use crate::ids::{GroupId, NeuronId, SynapseId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// How a neuron group drives its members
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum GroupDynamics {
    /// Members are scheduled individually like loose neurons
    #[default]
    Independent,
    /// The member with the largest weighted input wins
    WinnerTakeAll { win_value: f64, lose_value: f64 },
    /// The `k` members with the largest weighted inputs win
    Kwta { k: usize, win_value: f64, lose_value: f64 },
}

impl GroupDynamics {
    pub fn is_independent(&self) -> bool {
        matches!(self, GroupDynamics::Independent)
    }

    /// `(k, win, lose)` for competitive dynamics
    pub fn competition(&self) -> Option<(usize, f64, f64)> {
        match *self {
            GroupDynamics::Independent => None,
            GroupDynamics::WinnerTakeAll {
                win_value,
                lose_value,
            } => Some((1, win_value, lose_value)),
            GroupDynamics::Kwta {
                k,
                win_value,
                lose_value,
            } => Some((k, win_value, lose_value)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupKind {
    Neuron(GroupDynamics),
    Synapse,
    Subnetwork,
}

impl GroupKind {
    pub fn name(&self) -> &'static str {
        match self {
            GroupKind::Neuron(_) => "neuron",
            GroupKind::Synapse => "synapse",
            GroupKind::Subnetwork => "subnetwork",
        }
    }
}

/// Anything a group can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupMember {
    Neuron(NeuronId),
    Synapse(SynapseId),
    Group(GroupId),
}

impl fmt::Display for GroupMember {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GroupMember::Neuron(id) => write!(f, "{}", id),
            GroupMember::Synapse(id) => write!(f, "{}", id),
            GroupMember::Group(id) => write!(f, "{}", id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Group {
    id: GroupId,
    label: String,
    kind: GroupKind,
    parent: Option<GroupId>,
    delete_when_empty: bool,
    neurons: Vec<NeuronId>,
    synapses: Vec<SynapseId>,
    children: Vec<GroupId>,
}

impl Group {
    pub(crate) fn new(id: GroupId, label: &str, kind: GroupKind) -> Self {
        Self {
            id,
            label: label.to_string(),
            kind,
            parent: None,
            delete_when_empty: true,
            neurons: Vec::new(),
            synapses: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn id(&self) -> GroupId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn set_label(&mut self, label: &str) {
        self.label = label.to_string();
    }

    pub fn kind(&self) -> &GroupKind {
        &self.kind
    }

    pub fn dynamics(&self) -> Option<GroupDynamics> {
        match self.kind {
            GroupKind::Neuron(dynamics) => Some(dynamics),
            _ => None,
        }
    }

    pub(crate) fn set_dynamics(&mut self, dynamics: GroupDynamics) -> bool {
        match &mut self.kind {
            GroupKind::Neuron(current) => {
                *current = dynamics;
                true
            }
            _ => false,
        }
    }

    /// Neuron group whose members are driven by the group, not individually
    pub fn is_competitive(&self) -> bool {
        matches!(self.kind, GroupKind::Neuron(d) if !d.is_independent())
    }

    pub fn parent(&self) -> Option<GroupId> {
        self.parent
    }

    pub(crate) fn set_parent(&mut self, parent: Option<GroupId>) {
        self.parent = parent;
    }

    pub fn delete_when_empty(&self) -> bool {
        self.delete_when_empty
    }

    pub(crate) fn set_delete_when_empty(&mut self, delete: bool) {
        self.delete_when_empty = delete;
    }

    pub fn neurons(&self) -> &[NeuronId] {
        &self.neurons
    }

    pub fn synapses(&self) -> &[SynapseId] {
        &self.synapses
    }

    pub fn children(&self) -> &[GroupId] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.neurons.len() + self.synapses.len() + self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, member: GroupMember) -> bool {
        match member {
            GroupMember::Neuron(id) => self.neurons.contains(&id),
            GroupMember::Synapse(id) => self.synapses.contains(&id),
            GroupMember::Group(id) => self.children.contains(&id),
        }
    }

    /// Whether this kind of group may hold `member`
    pub fn accepts(&self, member: GroupMember) -> bool {
        matches!(
            (&self.kind, member),
            (GroupKind::Neuron(_), GroupMember::Neuron(_))
                | (GroupKind::Synapse, GroupMember::Synapse(_))
                | (GroupKind::Subnetwork, GroupMember::Group(_))
        )
    }

    pub(crate) fn push(&mut self, member: GroupMember) {
        match member {
            GroupMember::Neuron(id) => self.neurons.push(id),
            GroupMember::Synapse(id) => self.synapses.push(id),
            GroupMember::Group(id) => self.children.push(id),
        }
    }

    /// Remove `member`; returns whether it was present
    pub(crate) fn remove(&mut self, member: GroupMember) -> bool {
        let before = self.len();
        match member {
            GroupMember::Neuron(id) => self.neurons.retain(|n| *n != id),
            GroupMember::Synapse(id) => self.synapses.retain(|s| *s != id),
            GroupMember::Group(id) => self.children.retain(|g| *g != id),
        }
        self.len() != before
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} group {} \"{}\" with {} member(s)",
            self.kind.name(),
            self.id,
            self.label,
            self.len()
        )
    }
}

/// Pick the `k` strongest candidates. Ties go to the earlier id.
pub fn select_winners(inputs: &[(NeuronId, f64)], k: usize) -> Vec<NeuronId> {
    let mut ranked: Vec<(NeuronId, f64)> = inputs.to_vec();
    ranked.sort_by(|a, b| match b.1.total_cmp(&a.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
    ranked.into_iter().take(k).map(|(id, _)| id).collect()
}
