//! # Simbrain-RS: Simbrain Network Core Revival
//!
//! Revival of the simulation core of Simbrain (http://www.simbrain.net/),
//! a Java desktop kit for building and running neural networks.
//!
//! Simbrain models a network as a directed graph of stateful neurons joined by
//! weighted synapses. Each neuron carries one pluggable update rule, each
//! synapse one pluggable learning rule, and the network evaluates the whole
//! graph in discrete ticks. The desktop editor, worlds and plots are left out;
//! this crate is the engine they drove.
//!
//! Key features:
//! - Arena-owned neurons, synapses and groups addressed by stable ids
//! - Closed set of update and learning rules with a name registry
//! - Priority-ordered scheduling with buffered or immediate commits
//! - Connection strategies (one-to-one, all-to-all, sparse)
//! - Groups with delete-when-empty cascades and competitive dynamics
//! - Structural and per-tick notifications for external listeners
//!
//! ```rust
//! use simbrain_network::{Network, NeuronRule};
//!
//! let mut network = Network::new();
//! let source = network.add_neuron(NeuronRule::default());
//! let target = network.add_neuron(NeuronRule::default());
//! network.add_synapse(source, target, 0.5).unwrap();
//!
//! network.force_set_activation(source, 1.0).unwrap();
//! network.set_clamped(source, true).unwrap();
//! network.step().unwrap();
//!
//! assert_eq!(network.neuron(target).unwrap().activation(), 0.5);
//! ```

use thiserror::Error;

pub mod blueprint;
pub mod connect;
pub mod control;
pub mod event;
pub mod group;
pub mod ids;
pub mod learning;
pub mod network;
pub mod neuron;
pub mod rules;
mod scheduler;
pub mod synapse;

pub use blueprint::{BuiltNetwork, NetworkBlueprint};
pub use connect::{ConnectTarget, ConnectionSpec, Connector, WeightInit};
pub use control::{RunControl, SharedNetwork};
pub use event::{EventLog, NetworkEvent, NetworkListener};
pub use group::{Group, GroupDynamics, GroupKind, GroupMember};
pub use ids::{GroupId, ListenerId, NeuronId, SynapseId};
pub use learning::SynapseRule;
pub use network::{Network, NetworkParams, PlasticityView, UpdateMode};
pub use neuron::Neuron;
pub use rules::{Bounds, NeuronRule, UpdateRule};
pub use synapse::Synapse;

pub use simbrain_core::{Activation, Location, Time, TimeType};

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("Unknown neuron update rule: {0}")]
    UnknownRuleKind(String),
    #[error("Unknown synapse learning rule: {0}")]
    UnknownLearningRule(String),
    #[error("Neuron not found: {0}")]
    NeuronNotFound(NeuronId),
    #[error("Synapse not found: {0}")]
    SynapseNotFound(SynapseId),
    #[error("Group not found: {0}")]
    GroupNotFound(GroupId),
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("Connection error: {0}")]
    ConnectionError(String),
    #[error("{group} is a {kind} group and cannot hold {member}")]
    GroupKindMismatch {
        group: GroupId,
        kind: &'static str,
        member: String,
    },
    #[error("{member} already belongs to {group}")]
    AlreadyGrouped { member: String, group: GroupId },
    #[error("Update of {neuron} produced a non-finite activation ({value})")]
    NonFiniteActivation { neuron: NeuronId, value: f64 },
    #[error("Learning on {synapse} produced a non-finite strength ({value})")]
    NonFiniteStrength { synapse: SynapseId, value: f64 },
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),
    #[error("Blueprint error: {0}")]
    Blueprint(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, NetworkError>;
