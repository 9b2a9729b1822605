//! JSON network descriptions.
//!
//! A blueprint names neurons and groups so that synapses and connection
//! strategies can refer to them. Rules are given either by registry name
//! (`"SigmoidalRule"`) or in full (`{"Sigmoidal": {"slope": 4.0}}`).
//!
//! ```json
//! {
//!   "params": { "update_mode": "Buffered" },
//!   "neurons": [
//!     { "name": "in", "activation": 1.0, "clamped": true },
//!     { "name": "out", "rule": "SigmoidalRule" }
//!   ],
//!   "synapses": [ { "source": "in", "target": "out", "strength": 0.5 } ]
//! }
//! ```

use crate::connect::{ConnectTarget, ConnectionSpec, Connector, WeightInit};
use crate::group::{GroupDynamics, GroupKind};
use crate::ids::{GroupId, NeuronId};
use crate::learning::SynapseRule;
use crate::network::{Network, NetworkParams};
use crate::rules::{Bounds, NeuronRule};
use crate::{NetworkError, Result};
use log::info;
use serde::{Deserialize, Serialize};
use simbrain_core::Location;
use std::collections::HashMap;
use std::path::Path;

/// Update rule by registry name or with explicit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleSpec {
    Full(NeuronRule),
    Named(String),
}

impl Default for RuleSpec {
    fn default() -> Self {
        RuleSpec::Named("LinearRule".to_string())
    }
}

impl RuleSpec {
    pub fn resolve(&self) -> Result<NeuronRule> {
        match self {
            RuleSpec::Named(name) => NeuronRule::from_name(name),
            RuleSpec::Full(rule) => Ok(rule.clone()),
        }
    }
}

/// Learning rule by registry name or with explicit parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LearningSpec {
    /// Tried first so unit variants such as `"Static"` parse as rules
    Full(SynapseRule),
    Named(String),
}

impl Default for LearningSpec {
    fn default() -> Self {
        LearningSpec::Full(SynapseRule::Static)
    }
}

impl LearningSpec {
    pub fn resolve(&self) -> Result<SynapseRule> {
        match self {
            LearningSpec::Named(name) => SynapseRule::from_name(name),
            LearningSpec::Full(rule) => Ok(rule.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronSpec {
    pub name: String,
    #[serde(default)]
    pub rule: RuleSpec,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub clamped: bool,
    /// Initial activation, written even when clamped
    #[serde(default)]
    pub activation: Option<f64>,
    /// Constant external input
    #[serde(default)]
    pub input: f64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NeuronGroupSpec {
    pub name: String,
    pub members: Vec<String>,
    #[serde(default)]
    pub dynamics: GroupDynamics,
    #[serde(default = "default_true")]
    pub delete_when_empty: bool,
}

fn default_strength() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynapseSpec {
    pub source: String,
    pub target: String,
    #[serde(default = "default_strength")]
    pub strength: f64,
    #[serde(default)]
    pub learning_rule: LearningSpec,
    #[serde(default)]
    pub bounds: Option<Bounds>,
}

/// A connection strategy applied between named neurons or neuron groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionBlueprint {
    pub from: Vec<String>,
    pub to: Vec<String>,
    #[serde(default)]
    pub connector: Connector,
    #[serde(default)]
    pub weight: WeightInit,
    #[serde(default)]
    pub learning_rule: LearningSpec,
    #[serde(default)]
    pub bounds: Option<Bounds>,
    /// Synapse group to collect the new synapses in, created on first use
    #[serde(default)]
    pub synapse_group: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkBlueprint {
    pub params: NetworkParams,
    pub neurons: Vec<NeuronSpec>,
    pub groups: Vec<NeuronGroupSpec>,
    pub synapses: Vec<SynapseSpec>,
    pub connections: Vec<ConnectionBlueprint>,
}

/// A built network plus the ids behind the blueprint's names
#[derive(Debug)]
pub struct BuiltNetwork {
    pub network: Network,
    pub neurons: HashMap<String, NeuronId>,
    pub groups: HashMap<String, GroupId>,
}

impl BuiltNetwork {
    pub fn neuron(&self, name: &str) -> Result<NeuronId> {
        self.neurons
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::Blueprint(format!("no neuron named \"{}\"", name)))
    }

    pub fn group(&self, name: &str) -> Result<GroupId> {
        self.groups
            .get(name)
            .copied()
            .ok_or_else(|| NetworkError::Blueprint(format!("no group named \"{}\"", name)))
    }

    /// Neurons behind a neuron or group name; group members keep their order
    pub fn resolve(&self, name: &str) -> Result<Vec<NeuronId>> {
        if let Some(group) = self.groups.get(name) {
            return Ok(self
                .network
                .group(*group)
                .map(|g| g.neurons().to_vec())
                .unwrap_or_default());
        }
        self.neuron(name).map(|id| vec![id])
    }

    fn resolve_all(&self, names: &[String]) -> Result<Vec<NeuronId>> {
        let mut ids = Vec::new();
        for name in names {
            ids.extend(self.resolve(name)?);
        }
        Ok(ids)
    }
}

impl NetworkBlueprint {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn build(&self) -> Result<BuiltNetwork> {
        let network = Network::with_params(self.params.clone())?;
        let mut built = BuiltNetwork {
            network,
            neurons: HashMap::new(),
            groups: HashMap::new(),
        };

        for spec in &self.neurons {
            if built.neurons.contains_key(&spec.name) {
                return Err(NetworkError::Blueprint(format!(
                    "neuron name \"{}\" used twice",
                    spec.name
                )));
            }
            let net = &mut built.network;
            let id = net.add_neuron_at(spec.rule.resolve()?, spec.location);
            net.set_label(id, &spec.name)?;
            if spec.priority != 0 {
                net.set_update_priority(id, spec.priority)?;
            }
            if let Some(activation) = spec.activation {
                net.force_set_activation(id, activation)?;
            }
            if spec.input != 0.0 {
                net.set_input_value(id, spec.input)?;
            }
            if spec.clamped {
                net.set_clamped(id, true)?;
            }
            built.neurons.insert(spec.name.clone(), id);
        }

        for spec in &self.groups {
            self.check_group_name(&built, &spec.name)?;
            let members = spec
                .members
                .iter()
                .map(|name| built.neuron(name))
                .collect::<Result<Vec<_>>>()?;
            let id = built
                .network
                .add_neuron_group(&spec.name, &members, spec.dynamics)?;
            if !spec.delete_when_empty {
                built.network.set_delete_when_empty(id, false)?;
            }
            built.groups.insert(spec.name.clone(), id);
        }

        for spec in &self.synapses {
            let source = built.neuron(&spec.source)?;
            let target = built.neuron(&spec.target)?;
            let net = &mut built.network;
            let id = net.add_synapse(source, target, spec.strength)?;
            net.set_learning_rule(id, spec.learning_rule.resolve()?)?;
            if let Some(bounds) = spec.bounds {
                net.set_synapse_bounds(id, bounds)?;
            }
        }

        for spec in &self.connections {
            let sources = built.resolve_all(&spec.from)?;
            let targets = built.resolve_all(&spec.to)?;
            let target = match &spec.synapse_group {
                None => ConnectTarget::Loose,
                Some(name) => ConnectTarget::Group(self.synapse_group(&mut built, name)?),
            };
            let connection = ConnectionSpec {
                connector: spec.connector.clone(),
                weight: spec.weight.clone(),
                learning_rule: spec.learning_rule.resolve()?,
                bounds: spec.bounds,
                target,
            };
            built.network.connect(&sources, &targets, &connection)?;
        }

        info!(
            "Built network: {} neuron(s), {} synapse(s), {} group(s)",
            built.network.neuron_count(),
            built.network.synapse_count(),
            built.network.group_count()
        );
        Ok(built)
    }

    fn check_group_name(&self, built: &BuiltNetwork, name: &str) -> Result<()> {
        if built.groups.contains_key(name) || built.neurons.contains_key(name) {
            return Err(NetworkError::Blueprint(format!(
                "group name \"{}\" already in use",
                name
            )));
        }
        Ok(())
    }

    /// Existing synapse group called `name`, or a new one
    fn synapse_group(&self, built: &mut BuiltNetwork, name: &str) -> Result<GroupId> {
        if let Some(id) = built.groups.get(name) {
            let is_synapse_group = built
                .network
                .group(*id)
                .map_or(false, |g| matches!(g.kind(), GroupKind::Synapse));
            if !is_synapse_group {
                return Err(NetworkError::Blueprint(format!(
                    "\"{}\" is not a synapse group",
                    name
                )));
            }
            return Ok(*id);
        }
        self.check_group_name(built, name)?;
        let id = built.network.add_synapse_group(name, &[])?;
        built.groups.insert(name.to_string(), id);
        Ok(id)
    }
}
