//! End-to-end behaviour of the network core.

use simbrain_network::{
    Bounds, ConnectionSpec, Connector, EventLog, GroupDynamics, GroupMember, Location, Network,
    NetworkError, NetworkEvent, NetworkParams, NeuronId, NeuronRule, PlasticityView,
    SynapseRule, UpdateMode, WeightInit,
};
use std::collections::HashSet;

fn network(mode: UpdateMode) -> Network {
    Network::with_params(NetworkParams {
        update_mode: mode,
        ..Default::default()
    })
    .unwrap()
}

fn layer(net: &mut Network, n: usize, y: f64) -> Vec<NeuronId> {
    (0..n)
        .map(|i| net.add_neuron_at(NeuronRule::default(), Location::new(i as f64 * 20.0, y)))
        .collect()
}

#[test]
fn test_clamped_neurons_never_change() {
    let mut net = Network::new();
    let driver = net.add_neuron(NeuronRule::default());
    let clamped = net.add_neuron(NeuronRule::default());
    net.add_synapse(driver, clamped, 1.0).unwrap();
    net.force_set_activation(clamped, 0.25).unwrap();
    net.set_clamped(clamped, true).unwrap();

    for i in 0..10 {
        net.force_set_activation(driver, if i % 2 == 0 { 1.0 } else { -1.0 }).unwrap();
        net.set_activation(clamped, 0.9).unwrap();
        net.step().unwrap();
        assert_eq!(net.neuron(clamped).unwrap().activation(), 0.25);
    }
}

#[test]
fn test_synapse_strengths_stay_within_bounds() {
    let mut net = Network::new();
    let inputs = layer(&mut net, 3, 0.0);
    let outputs = layer(&mut net, 3, 50.0);
    let spec = ConnectionSpec::new(Connector::AllToAll {
        allow_self_connections: false,
    })
    .with_weight(WeightInit::Uniform { min: -1.0, max: 1.0 })
    .with_learning_rule(SynapseRule::Hebbian { learning_rate: 0.7 })
    .with_bounds(Bounds::new(-0.4, 0.6).unwrap());
    let synapses = net.connect(&inputs, &outputs, &spec).unwrap();
    for id in &inputs {
        net.force_set_activation(*id, 1.0).unwrap();
        net.set_clamped(*id, true).unwrap();
    }

    for _ in 0..5 {
        net.step().unwrap();
        for sid in &synapses {
            let s = net.synapse(*sid).unwrap();
            assert!(s.bounds().contains(s.strength()), "{} = {}", sid, s.strength());
        }
    }
}

#[test]
fn test_one_to_one_equal_sizes_uses_each_neuron_once() {
    let mut net = Network::new();
    let sources = layer(&mut net, 6, 0.0);
    let targets = layer(&mut net, 6, 100.0);
    let created = net
        .connect(
            &sources,
            &targets,
            &ConnectionSpec::new(Connector::OneToOne { bidirectional: false }),
        )
        .unwrap();

    assert_eq!(created.len(), 6);
    let used_sources: HashSet<_> = created
        .iter()
        .map(|s| net.synapse(*s).unwrap().source())
        .collect();
    let used_targets: HashSet<_> = created
        .iter()
        .map(|s| net.synapse(*s).unwrap().target())
        .collect();
    assert_eq!(used_sources, sources.iter().copied().collect());
    assert_eq!(used_targets, targets.iter().copied().collect());
}

#[test]
fn test_one_to_one_unequal_sizes_pairs_the_shorter_set() {
    let mut net = Network::new();
    let sources = layer(&mut net, 4, 0.0);
    let targets = layer(&mut net, 7, 100.0);
    let created = net
        .connect(
            &sources,
            &targets,
            &ConnectionSpec::new(Connector::OneToOne { bidirectional: false }),
        )
        .unwrap();

    assert_eq!(created.len(), 4);
    let endpoints: HashSet<_> = created
        .iter()
        .flat_map(|s| {
            let s = net.synapse(*s).unwrap();
            [s.source(), s.target()]
        })
        .collect();
    assert_eq!(endpoints.len(), 8);
}

#[test]
fn test_removing_a_neuron_removes_its_synapses_everywhere() {
    let mut net = Network::new();
    let hub = net.add_neuron(NeuronRule::default());
    let others = layer(&mut net, 3, 10.0);
    for other in &others {
        net.add_synapse(hub, *other, 0.5).unwrap();
        net.add_synapse(*other, hub, 0.5).unwrap();
    }
    net.add_synapse(others[0], others[1], 0.5).unwrap();

    net.remove_neuron(hub).unwrap();
    assert_eq!(net.synapse_count(), 1);
    for other in &others {
        let neuron = net.neuron(*other).unwrap();
        for sid in neuron.fan_in().iter().chain(neuron.fan_out()) {
            let s = net.synapse(*sid).unwrap();
            assert_ne!(s.source(), hub);
            assert_ne!(s.target(), hub);
        }
    }
    net.check_invariants().unwrap();
}

/// A (priority 1) feeds B (priority 2); A is driven by a clamped source.
fn priority_pair(mode: UpdateMode) -> (Network, NeuronId, NeuronId) {
    let mut net = network(mode);
    let source = net.add_neuron(NeuronRule::default());
    let b = net.add_neuron(NeuronRule::default());
    let a = net.add_neuron(NeuronRule::default());
    net.set_update_priority(source, 0).unwrap();
    net.set_update_priority(a, 1).unwrap();
    net.set_update_priority(b, 2).unwrap();
    net.add_synapse(source, a, 1.0).unwrap();
    net.add_synapse(a, b, 1.0).unwrap();
    net.force_set_activation(source, 0.8).unwrap();
    net.set_clamped(source, true).unwrap();
    (net, a, b)
}

#[test]
fn test_buffered_mode_reads_previous_tick() {
    let (mut net, a, b) = priority_pair(UpdateMode::Buffered);
    net.step().unwrap();
    assert_eq!(net.neuron(a).unwrap().activation(), 0.8);
    assert_eq!(net.neuron(b).unwrap().activation(), 0.0);
    net.step().unwrap();
    assert_eq!(net.neuron(b).unwrap().activation(), 0.8);
}

#[test]
fn test_immediate_mode_reads_fresh_values() {
    let (mut net, a, b) = priority_pair(UpdateMode::Immediate);
    net.step().unwrap();
    assert_eq!(net.neuron(a).unwrap().activation(), 0.8);
    assert_eq!(net.neuron(b).unwrap().activation(), 0.8);
}

/// s1 -> a -> w1 and s2 -> w2, with {w1, w2} winner-take-all.
/// `a` only turns on during the first tick.
fn competitive_relay(mode: UpdateMode) -> (Network, NeuronId, NeuronId, NeuronId) {
    let mut net = network(mode);
    let s1 = net.add_neuron(NeuronRule::default());
    let s2 = net.add_neuron(NeuronRule::default());
    let a = net.add_neuron(NeuronRule::default());
    let w1 = net.add_neuron(NeuronRule::default());
    let w2 = net.add_neuron(NeuronRule::default());
    net.add_synapse(s1, a, 1.0).unwrap();
    net.add_synapse(a, w1, 1.0).unwrap();
    net.add_synapse(s2, w2, 0.3).unwrap();
    for source in [s1, s2] {
        net.force_set_activation(source, 1.0).unwrap();
        net.set_clamped(source, true).unwrap();
    }
    net.add_neuron_group(
        "winners",
        &[w1, w2],
        GroupDynamics::WinnerTakeAll {
            win_value: 1.0,
            lose_value: 0.0,
        },
    )
    .unwrap();
    (net, a, w1, w2)
}

#[test]
fn test_buffered_competition_reads_previous_tick() {
    let (mut net, a, w1, w2) = competitive_relay(UpdateMode::Buffered);
    net.step().unwrap();
    assert_eq!(net.neuron(a).unwrap().activation(), 1.0);
    let winners = (
        net.neuron(w1).unwrap().activation(),
        net.neuron(w2).unwrap().activation(),
    );
    assert_eq!(winners, (0.0, 1.0));

    // Next tick sees the committed relay
    net.step().unwrap();
    assert_eq!(net.neuron(w1).unwrap().activation(), 1.0);
    assert_eq!(net.neuron(w2).unwrap().activation(), 0.0);
}

#[test]
fn test_immediate_competition_reads_fresh_values() {
    let (mut net, _, w1, w2) = competitive_relay(UpdateMode::Immediate);
    net.step().unwrap();
    let winners = (
        net.neuron(w1).unwrap().activation(),
        net.neuron(w2).unwrap().activation(),
    );
    assert_eq!(winners, (1.0, 0.0));
}

#[test]
fn test_linear_pass_through() {
    let mut net = Network::new();
    let source = net.add_neuron(NeuronRule::default());
    let target = net.add_neuron(NeuronRule::default());
    net.add_synapse(source, target, 0.5).unwrap();
    net.force_set_activation(source, 1.0).unwrap();
    net.set_clamped(source, true).unwrap();

    net.step().unwrap();
    assert_eq!(net.neuron(target).unwrap().activation(), 0.5);
}

#[test]
fn test_hebbian_update_then_clip() {
    let mut net = Network::new();
    let source = net.add_neuron(NeuronRule::default());
    let target = net.add_neuron(NeuronRule::default());
    let s = net.add_synapse(source, target, 0.0).unwrap();
    net.set_learning_rule_by_name(s, "HebbianRule").unwrap();
    net.set_synapse_bounds(s, Bounds::new(-0.3, 0.3).unwrap())
        .unwrap();
    for id in [source, target] {
        net.force_set_activation(id, 1.0).unwrap();
        net.set_clamped(id, true).unwrap();
    }

    // Pre-clip value from the rule itself
    let mut unclipped = net.synapse(s).unwrap().clone();
    unclipped
        .update(&simbrain_network::learning::LearningContext {
            source_activation: 1.0,
            target_activation: 1.0,
            mean_target_input: 1.0,
        })
        .unwrap();
    assert_eq!(unclipped.strength(), 1.0);

    net.update_synapse(s).unwrap();
    assert_eq!(net.synapse(s).unwrap().strength(), 0.3);
}

#[test]
fn test_emptied_group_cascades_to_parent_subnetwork() {
    let mut net = Network::new();
    let a = net.add_neuron(NeuronRule::default());
    let b = net.add_neuron(NeuronRule::default());
    let s = net.add_synapse(a, b, 0.5).unwrap();
    let weights = net.add_synapse_group("weights", &[s]).unwrap();
    let sub = net.add_subnetwork("sub", &[weights]).unwrap();
    let log = EventLog::new();
    net.add_listener(log.clone());

    net.remove_synapse(s).unwrap();
    assert!(net.group(weights).is_none());
    assert!(net.group(sub).is_none());
    assert_eq!(
        log.events(),
        vec![
            NetworkEvent::SynapseRemoved(s),
            NetworkEvent::GroupRemoved(weights),
            NetworkEvent::GroupRemoved(sub),
        ]
    );
    net.check_invariants().unwrap();
}

#[test]
fn test_cascade_stops_at_a_parent_that_keeps_itself() {
    let mut net = Network::new();
    let a = net.add_neuron(NeuronRule::default());
    let b = net.add_neuron(NeuronRule::default());
    let layer = net
        .add_neuron_group("layer", &[a], GroupDynamics::Independent)
        .unwrap();
    let other = net
        .add_neuron_group("other", &[b], GroupDynamics::Independent)
        .unwrap();
    let sub = net.add_subnetwork("sub", &[layer]).unwrap();
    let top = net.add_subnetwork("top", &[sub, other]).unwrap();
    net.set_delete_when_empty(sub, false).unwrap();

    net.remove_neuron(a).unwrap();
    assert!(net.group(layer).is_none());
    assert!(net.group(sub).unwrap().is_empty());
    assert!(net.group(top).is_some());

    net.remove_from_group(top, GroupMember::Group(sub)).unwrap();
    assert!(net.group(sub).is_some());
    assert_eq!(net.group(top).unwrap().children(), &[other]);
    net.check_invariants().unwrap();
}

#[test]
fn test_failing_rule_aborts_tick_without_rollback() {
    let mut net = network(UpdateMode::Immediate);
    let first = net.add_neuron(NeuronRule::default());
    let broken = net.add_neuron(NeuronRule::from_name("IntegrateAndFireRule").unwrap());
    net.set_input_value(first, 0.4).unwrap();
    net.edit_update_rule(broken, |rule| {
        if let NeuronRule::IntegrateAndFire(rule) = rule {
            rule.time_constant = 0.0;
            rule.threshold = f64::INFINITY;
        }
    })
    .unwrap();
    let log = EventLog::new();
    net.add_listener(log.clone());

    let err = net.step().unwrap_err();
    assert!(matches!(err, NetworkError::NonFiniteActivation { neuron, .. } if neuron == broken));
    // Committed before the failure and not rolled back
    assert_eq!(net.neuron(first).unwrap().activation(), 0.4);
    assert_eq!(net.tick_count(), 0);
    assert_eq!(net.time(), 0.0);
    assert!(log.is_empty());
}

#[test]
fn test_plasticity_view_selects_activations_seen_by_learning() {
    let run = |view: PlasticityView| {
        let mut net = Network::with_params(NetworkParams {
            plasticity_view: view,
            ..Default::default()
        })
        .unwrap();
        let source = net.add_neuron(NeuronRule::default());
        let target = net.add_neuron(NeuronRule::default());
        let s = net.add_synapse(source, target, 0.5).unwrap();
        net.set_learning_rule(s, SynapseRule::Hebbian { learning_rate: 0.1 })
            .unwrap();
        net.force_set_activation(source, 1.0).unwrap();
        net.set_clamped(source, true).unwrap();
        net.step().unwrap();
        net.synapse(s).unwrap().strength()
    };

    // Committed: target already at 0.5 when learning runs
    assert!((run(PlasticityView::Committed) - 0.55).abs() < 1e-12);
    // Previous tick: target still at 0
    assert_eq!(run(PlasticityView::PreviousTick), 0.5);
}

#[test]
fn test_unknown_rule_names_are_rejected() {
    let mut net = Network::new();
    let n = net.add_neuron(NeuronRule::default());
    let m = net.add_neuron(NeuronRule::default());
    let s = net.add_synapse(n, m, 0.1).unwrap();
    assert!(matches!(
        net.set_update_rule_by_name(n, "Perceptron"),
        Err(NetworkError::UnknownRuleKind(_))
    ));
    assert!(matches!(
        net.set_learning_rule_by_name(s, "Backprop"),
        Err(NetworkError::UnknownLearningRule(_))
    ));
}

#[test]
fn test_removed_ids_are_never_reused() {
    let mut net = Network::new();
    let a = net.add_neuron(NeuronRule::default());
    net.remove_neuron(a).unwrap();
    let b = net.add_neuron(NeuronRule::default());
    assert_ne!(a, b);
    assert!(matches!(
        net.set_clamped(a, true),
        Err(NetworkError::NeuronNotFound(id)) if id == a
    ));
}
