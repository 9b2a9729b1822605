//! Stable handles into the network arena.
//!
//! Ids are handed out by a per-network [`IdSequence`], start at 1 and never
//! get reused, so comparing two ids of the same kind also compares their
//! insertion order.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Neuron handle, displayed as `Neuron_<n>`
    NeuronId,
    "Neuron"
);
entity_id!(
    /// Synapse handle, displayed as `Synapse_<n>`
    SynapseId,
    "Synapse"
);
entity_id!(
    /// Group handle, displayed as `Group_<n>`
    GroupId,
    "Group"
);
entity_id!(
    /// Listener registration handle
    ListenerId,
    "Listener"
);

/// Per-network id counters
#[derive(Debug, Clone, Default)]
pub struct IdSequence {
    neurons: u64,
    synapses: u64,
    groups: u64,
    listeners: u64,
}

impl IdSequence {
    pub fn next_neuron(&mut self) -> NeuronId {
        self.neurons += 1;
        NeuronId(self.neurons)
    }

    pub fn next_synapse(&mut self) -> SynapseId {
        self.synapses += 1;
        SynapseId(self.synapses)
    }

    pub fn next_group(&mut self) -> GroupId {
        self.groups += 1;
        GroupId(self.groups)
    }

    pub fn next_listener(&mut self) -> ListenerId {
        self.listeners += 1;
        ListenerId(self.listeners)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_sequential_per_kind() {
        let mut ids = IdSequence::default();
        assert_eq!(ids.next_neuron(), NeuronId(1));
        assert_eq!(ids.next_neuron(), NeuronId(2));
        assert_eq!(ids.next_synapse(), SynapseId(1));
        assert_eq!(ids.next_group(), GroupId(1));
    }

    #[test]
    fn test_sequences_are_independent() {
        let mut a = IdSequence::default();
        let mut b = IdSequence::default();
        a.next_neuron();
        a.next_neuron();
        assert_eq!(b.next_neuron(), NeuronId(1));
    }

    #[test]
    fn test_display() {
        assert_eq!(NeuronId(3).to_string(), "Neuron_3");
        assert_eq!(SynapseId(7).to_string(), "Synapse_7");
        assert_eq!(GroupId(1).to_string(), "Group_1");
    }
}
