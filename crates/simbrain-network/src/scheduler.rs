//! Tick evaluation.
//!
//! One tick runs, in order: the neuron pass over the priority index, the
//! competitive group pass (in buffered mode its inputs are gathered before the
//! neuron pass commits), the synapse pass (loose synapses, then synapse
//! groups), the time advance and a single `Updated` notification. An error
//! aborts the tick where it happened; work already committed stays.

use crate::event::NetworkEvent;
use crate::group::{select_winners, GroupKind};
use crate::ids::{GroupId, NeuronId, SynapseId};
use crate::learning::LearningContext;
use crate::network::{weighted_input_of, Network, PlasticityView, UpdateMode};
use crate::{NetworkError, Result};
use log::{info, trace};
use rayon::prelude::*;
use simbrain_core::TimeType;
use std::collections::HashMap;

/// Activations frozen at the start of a tick
type Snapshot = HashMap<NeuronId, f64>;

impl Network {
    /// Run one tick
    pub fn step(&mut self) -> Result<()> {
        let snapshot = match self.params.plasticity_view {
            PlasticityView::PreviousTick => Some(
                self.neurons
                    .iter()
                    .map(|(id, n)| (*id, n.activation()))
                    .collect::<Snapshot>(),
            ),
            PlasticityView::Committed => None,
        };

        let order = self.scheduled_neurons();
        let competitive: Vec<GroupId> = self
            .groups
            .values()
            .filter(|g| g.is_competitive())
            .map(|g| g.id())
            .collect();
        // Buffered competitors read the same pre-commit state as the neuron pass
        let gathered: Option<Vec<_>> = match self.params.update_mode {
            UpdateMode::Buffered => Some(
                competitive
                    .iter()
                    .map(|group| self.competition_inputs(*group))
                    .collect(),
            ),
            UpdateMode::Immediate => None,
        };

        self.update_neurons(&order)?;

        let inputs: Vec<Vec<(NeuronId, f64)>> = match gathered {
            Some(inputs) => inputs,
            None => competitive
                .iter()
                .map(|group| self.competition_inputs(*group))
                .collect(),
        };
        for (group, inputs) in competitive.iter().zip(&inputs) {
            self.compete(*group, inputs)?;
        }

        let loose: Vec<SynapseId> = self
            .synapses
            .values()
            .filter(|s| s.parent_group().is_none())
            .map(|s| s.id())
            .collect();
        for id in loose {
            self.learn(id, snapshot.as_ref())?;
        }
        let grouped: Vec<SynapseId> = self
            .groups
            .values()
            .filter(|g| matches!(g.kind(), GroupKind::Synapse))
            .flat_map(|g| g.synapses().iter().copied())
            .collect();
        for id in grouped {
            self.learn(id, snapshot.as_ref())?;
        }

        self.time += match self.time_type() {
            TimeType::Continuous => self.params.time_step,
            TimeType::Discrete => 1.0,
        };
        self.tick += 1;
        trace!("Tick {} complete at t={}", self.tick, self.time);
        self.notify(NetworkEvent::Updated {
            tick: self.tick,
            time: self.time,
        });
        Ok(())
    }

    /// Step until stopped through the run control or until `max_ticks` have
    /// run. Returns the number of completed ticks.
    pub fn run(&mut self, max_ticks: Option<u64>) -> Result<u64> {
        self.run_control.set_running(true);
        info!("Network run started at t={}", self.time);
        let mut completed = 0;
        while self.run_control.is_running() && max_ticks.map_or(true, |max| completed < max) {
            if let Err(err) = self.step() {
                self.run_control.stop();
                return Err(err);
            }
            completed += 1;
        }
        self.run_control.stop();
        info!("Network run stopped after {} tick(s) at t={}", completed, self.time);
        Ok(completed)
    }

    /// Update a single group outside the tick: learning for synapse groups,
    /// dynamics or member updates for neuron groups, children in order for
    /// subnetworks.
    pub fn update_group(&mut self, id: GroupId) -> Result<()> {
        let group = self
            .groups
            .get(&id)
            .ok_or(NetworkError::GroupNotFound(id))?;
        let kind = group.kind().clone();
        let competitive = group.is_competitive();
        let mut neurons = group.neurons().to_vec();
        let synapses = group.synapses().to_vec();
        let mut children = group.children().to_vec();
        match kind {
            GroupKind::Synapse => {
                for synapse in synapses {
                    self.learn(synapse, None)?;
                }
            }
            GroupKind::Neuron(_) if competitive => {
                let inputs = self.competition_inputs(id);
                self.compete(id, &inputs)?;
            }
            GroupKind::Neuron(_) => {
                neurons.sort_by_key(|n| {
                    self.neurons
                        .get(n)
                        .map_or(0, |neuron| neuron.update_priority())
                });
                self.update_neurons(&neurons)?;
            }
            GroupKind::Subnetwork => {
                children.sort();
                for child in children {
                    self.update_group(child)?;
                }
            }
        }
        self.notify(NetworkEvent::GroupChanged(id));
        Ok(())
    }

    /// Apply the learning rule of one synapse, then clip it to its bounds
    pub fn update_synapse(&mut self, id: SynapseId) -> Result<()> {
        self.learn(id, None)?;
        self.notify(NetworkEvent::SynapseChanged(id));
        Ok(())
    }

    /// Priority order without members of competitive groups
    fn scheduled_neurons(&self) -> Vec<NeuronId> {
        self.priority_index
            .iter()
            .map(|(_, id)| *id)
            .filter(|id| {
                let driven = self
                    .neurons
                    .get(id)
                    .and_then(|n| n.parent_group())
                    .and_then(|g| self.groups.get(&g))
                    .map_or(false, |g| g.is_competitive());
                !driven
            })
            .collect()
    }

    fn update_neurons(&mut self, order: &[NeuronId]) -> Result<()> {
        let time = self.time;
        let time_step = self.params.time_step;
        match self.params.update_mode {
            UpdateMode::Buffered => {
                let inputs: Vec<f64> = {
                    let neurons = &self.neurons;
                    let synapses = &self.synapses;
                    order
                        .par_iter()
                        .map(|id| weighted_input_of(neurons, synapses, *id))
                        .collect()
                };
                for (id, input) in order.iter().zip(inputs) {
                    let neuron = self
                        .neurons
                        .get_mut(id)
                        .ok_or(NetworkError::NeuronNotFound(*id))?;
                    neuron.update(input, time, time_step, &mut self.rng)?;
                }
                for id in order {
                    if let Some(neuron) = self.neurons.get_mut(id) {
                        neuron.commit();
                    }
                }
            }
            UpdateMode::Immediate => {
                for id in order {
                    let input = weighted_input_of(&self.neurons, &self.synapses, *id);
                    let neuron = self
                        .neurons
                        .get_mut(id)
                        .ok_or(NetworkError::NeuronNotFound(*id))?;
                    neuron.update(input, time, time_step, &mut self.rng)?;
                    neuron.commit();
                }
            }
        }
        Ok(())
    }

    /// Weighted input of every member of a group, in member order
    fn competition_inputs(&self, id: GroupId) -> Vec<(NeuronId, f64)> {
        let Some(group) = self.groups.get(&id) else {
            return Vec::new();
        };
        let neurons = &self.neurons;
        let synapses = &self.synapses;
        group
            .neurons()
            .par_iter()
            .map(|n| (*n, weighted_input_of(neurons, synapses, *n)))
            .collect()
    }

    /// Winner-take-all / k-winners-take-all over the given member inputs
    fn compete(&mut self, id: GroupId, inputs: &[(NeuronId, f64)]) -> Result<()> {
        let group = self
            .groups
            .get(&id)
            .ok_or(NetworkError::GroupNotFound(id))?;
        let Some((k, win, lose)) = group.dynamics().and_then(|d| d.competition()) else {
            return Ok(());
        };
        let winners = select_winners(inputs, k);
        for (member, _) in inputs {
            if let Some(neuron) = self.neurons.get_mut(member) {
                neuron.set_activation(if winners.contains(member) { win } else { lose });
            }
        }
        Ok(())
    }

    fn learn(&mut self, id: SynapseId, snapshot: Option<&Snapshot>) -> Result<()> {
        let synapse = self
            .synapses
            .get(&id)
            .ok_or(NetworkError::SynapseNotFound(id))?;
        if synapse.is_clamped() {
            return Ok(());
        }
        let activation = |neuron: NeuronId| -> f64 {
            snapshot
                .and_then(|s| s.get(&neuron).copied())
                .or_else(|| self.neurons.get(&neuron).map(|n| n.activation()))
                .unwrap_or(0.0)
        };
        let mean_target_input = if synapse.rule().needs_mean_input() {
            let sources: Vec<f64> = self
                .neurons
                .get(&synapse.target())
                .map(|t| t.fan_in().to_vec())
                .unwrap_or_default()
                .iter()
                .filter_map(|sid| self.synapses.get(sid))
                .map(|s| activation(s.source()))
                .collect();
            if sources.is_empty() {
                0.0
            } else {
                sources.iter().sum::<f64>() / sources.len() as f64
            }
        } else {
            0.0
        };
        let ctx = LearningContext {
            source_activation: activation(synapse.source()),
            target_activation: activation(synapse.target()),
            mean_target_input,
        };

        let synapse = self
            .synapses
            .get_mut(&id)
            .ok_or(NetworkError::SynapseNotFound(id))?;
        synapse.update(&ctx)?;
        synapse.clip_strength();
        Ok(())
    }
}
