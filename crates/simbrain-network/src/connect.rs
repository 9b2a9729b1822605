//! Connection strategies: decide which neuron pairs receive synapses.
//!
//! Strategies only compute pairs. [`crate::Network::connect`] turns the pairs
//! into synapses and registers them loose or in a synapse group.

use crate::ids::{GroupId, NeuronId};
use crate::learning::SynapseRule;
use crate::rules::Bounds;
use crate::{NetworkError, Result};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};
use simbrain_core::{Extent, Location};

// ============================================================================
// CONNECTORS
// ============================================================================

/// Connectivity pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Connector {
    /// Geometric pairing of the two sets; the longer set's excess stays unconnected
    OneToOne { bidirectional: bool },
    /// Every source to every target
    AllToAll { allow_self_connections: bool },
    /// Each pair connected with probability `density`
    Sparse {
        density: f64,
        allow_self_connections: bool,
    },
}

impl Default for Connector {
    fn default() -> Self {
        Connector::AllToAll {
            allow_self_connections: false,
        }
    }
}

impl Connector {
    pub fn name(&self) -> &'static str {
        match self {
            Connector::OneToOne { .. } => "OneToOne",
            Connector::AllToAll { .. } => "AllToAll",
            Connector::Sparse { .. } => "Sparse",
        }
    }

    /// Source/target pairs to connect, in creation order
    pub fn pairs(
        &self,
        sources: &[(NeuronId, Location)],
        targets: &[(NeuronId, Location)],
        rng: &mut StdRng,
    ) -> Result<Vec<(NeuronId, NeuronId)>> {
        match *self {
            Connector::OneToOne { bidirectional } => Ok(one_to_one(sources, targets, bidirectional)),
            Connector::AllToAll {
                allow_self_connections,
            } => Ok(sources
                .iter()
                .flat_map(|(src, _)| targets.iter().map(move |(tgt, _)| (*src, *tgt)))
                .filter(|(src, tgt)| allow_self_connections || src != tgt)
                .collect()),
            Connector::Sparse {
                density,
                allow_self_connections,
            } => {
                if !(0.0..=1.0).contains(&density) {
                    return Err(NetworkError::ConnectionError(format!(
                        "sparse density {} outside [0, 1]",
                        density
                    )));
                }
                let mut pairs = Vec::new();
                for (src, _) in sources {
                    for (tgt, _) in targets {
                        if !allow_self_connections && src == tgt {
                            continue;
                        }
                        if rng.gen_bool(density) {
                            pairs.push((*src, *tgt));
                        }
                    }
                }
                Ok(pairs)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Orientation {
    XOrder,
    XReverse,
    YOrder,
    YReverse,
}

fn sorted(neurons: &[(NeuronId, Location)], orientation: Orientation) -> Vec<NeuronId> {
    let mut ordered = neurons.to_vec();
    // Stable sort keeps insertion order among equal coordinates
    ordered.sort_by(|(_, a), (_, b)| match orientation {
        Orientation::XOrder => a.x.total_cmp(&b.x),
        Orientation::XReverse => b.x.total_cmp(&a.x),
        Orientation::YOrder => a.y.total_cmp(&b.y),
        Orientation::YReverse => b.y.total_cmp(&a.y),
    });
    ordered.into_iter().map(|(id, _)| id).collect()
}

/// Sort orders for source and target so pairs follow the layout.
///
/// Each set is sorted along its longer axis. When the sets disagree, the
/// relative position of their midpoints picks the direction of each sort.
fn orientations(source: &Extent, target: &Extent) -> (Orientation, Orientation) {
    let src_mid = source.midpoint();
    let tgt_mid = target.midpoint();
    match (source.is_horizontal(), target.is_horizontal()) {
        (true, true) => (Orientation::XOrder, Orientation::XOrder),
        (false, false) => (Orientation::YOrder, Orientation::YOrder),
        (true, false) => {
            let src = if src_mid.x > tgt_mid.x {
                Orientation::XReverse
            } else {
                Orientation::XOrder
            };
            let tgt = if src_mid.y > tgt_mid.y {
                Orientation::YOrder
            } else {
                Orientation::YReverse
            };
            (src, tgt)
        }
        (false, true) => {
            let src = if src_mid.y > tgt_mid.y {
                Orientation::YReverse
            } else {
                Orientation::YOrder
            };
            let tgt = if src_mid.x > tgt_mid.x {
                Orientation::XOrder
            } else {
                Orientation::XReverse
            };
            (src, tgt)
        }
    }
}

fn one_to_one(
    sources: &[(NeuronId, Location)],
    targets: &[(NeuronId, Location)],
    bidirectional: bool,
) -> Vec<(NeuronId, NeuronId)> {
    let (Some(src_extent), Some(tgt_extent)) = (
        Extent::of(sources.iter().map(|(_, l)| *l)),
        Extent::of(targets.iter().map(|(_, l)| *l)),
    ) else {
        return Vec::new();
    };
    let (src_order, tgt_order) = orientations(&src_extent, &tgt_extent);
    let src = sorted(sources, src_order);
    let tgt = sorted(targets, tgt_order);

    let mut pairs = Vec::with_capacity(src.len().min(tgt.len()) * if bidirectional { 2 } else { 1 });
    for (s, t) in src.into_iter().zip(tgt) {
        pairs.push((s, t));
        if bidirectional {
            pairs.push((t, s));
        }
    }
    pairs
}

// ============================================================================
// WEIGHTS AND DESTINATION
// ============================================================================

/// Initial strength of newly created synapses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    Constant(f64),
    Uniform { min: f64, max: f64 },
}

impl Default for WeightInit {
    fn default() -> Self {
        WeightInit::Constant(1.0)
    }
}

impl WeightInit {
    pub fn validate(&self) -> Result<()> {
        match *self {
            WeightInit::Constant(w) if !w.is_finite() => Err(NetworkError::InvalidParameter(
                format!("constant weight {} is not finite", w),
            )),
            WeightInit::Uniform { min, max } => Bounds::new(min, max).map(|_| ()),
            WeightInit::Constant(_) => Ok(()),
        }
    }

    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        match *self {
            WeightInit::Constant(w) => w,
            WeightInit::Uniform { min, max } => Bounds {
                lower: min,
                upper: max,
            }
            .random(rng),
        }
    }
}

/// Where created synapses are registered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectTarget {
    /// Directly in the network
    #[default]
    Loose,
    /// As members of an existing synapse group
    Group(GroupId),
}

/// Everything [`crate::Network::connect`] needs besides the two neuron sets
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionSpec {
    pub connector: Connector,
    pub weight: WeightInit,
    pub learning_rule: SynapseRule,
    /// Strength bounds for new synapses; synapse defaults when `None`
    pub bounds: Option<Bounds>,
    pub target: ConnectTarget,
}

impl ConnectionSpec {
    pub fn new(connector: Connector) -> Self {
        Self {
            connector,
            ..Default::default()
        }
    }

    pub fn with_weight(mut self, weight: WeightInit) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_learning_rule(mut self, rule: SynapseRule) -> Self {
        self.learning_rule = rule;
        self
    }

    pub fn with_bounds(mut self, bounds: Bounds) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn in_group(mut self, group: GroupId) -> Self {
        self.target = ConnectTarget::Group(group);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use std::collections::HashSet;

    fn row(start: u64, n: usize, y: f64) -> Vec<(NeuronId, Location)> {
        (0..n)
            .map(|i| (NeuronId(start + i as u64), Location::new(i as f64 * 10.0, y)))
            .collect()
    }

    fn column(start: u64, n: usize, x: f64) -> Vec<(NeuronId, Location)> {
        (0..n)
            .map(|i| (NeuronId(start + i as u64), Location::new(x, i as f64 * 10.0)))
            .collect()
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11)
    }

    #[test]
    fn test_one_to_one_equal_rows() {
        let sources = row(1, 4, 0.0);
        let targets = row(5, 4, 100.0);
        let pairs = Connector::OneToOne { bidirectional: false }
            .pairs(&sources, &targets, &mut rng())
            .unwrap();

        assert_eq!(pairs.len(), 4);
        assert_eq!(pairs[0], (NeuronId(1), NeuronId(5)));
        assert_eq!(pairs[3], (NeuronId(4), NeuronId(8)));
    }

    #[test]
    fn test_one_to_one_follows_layout_not_list_order() {
        let sources = row(1, 3, 0.0);
        // Targets inserted right to left
        let targets: Vec<_> = (0..3)
            .map(|i| (NeuronId(10 + i), Location::new(20.0 - i as f64 * 10.0, 50.0)))
            .collect();
        let pairs = Connector::OneToOne { bidirectional: false }
            .pairs(&sources, &targets, &mut rng())
            .unwrap();
        assert_eq!(pairs[0], (NeuronId(1), NeuronId(12)));
        assert_eq!(pairs[2], (NeuronId(3), NeuronId(10)));
    }

    #[test]
    fn test_one_to_one_unequal_sizes() {
        let sources = row(1, 5, 0.0);
        let targets = row(10, 3, 50.0);
        let pairs = Connector::OneToOne { bidirectional: false }
            .pairs(&sources, &targets, &mut rng())
            .unwrap();

        assert_eq!(pairs.len(), 3);
        let srcs: HashSet<_> = pairs.iter().map(|p| p.0).collect();
        let tgts: HashSet<_> = pairs.iter().map(|p| p.1).collect();
        assert_eq!(srcs.len(), 3);
        assert_eq!(tgts.len(), 3);
    }

    #[test]
    fn test_one_to_one_perpendicular_sets() {
        // Horizontal source beside a vertical target
        let sources = row(1, 3, 100.0);
        let targets = column(10, 3, 200.0);
        let pairs = Connector::OneToOne { bidirectional: false }
            .pairs(&sources, &targets, &mut rng())
            .unwrap();
        // Source left of the target: ascending x. Source at larger y: ascending y.
        assert_eq!(pairs[0], (NeuronId(1), NeuronId(10)));
        assert_eq!(pairs[2], (NeuronId(3), NeuronId(12)));
    }

    #[test]
    fn test_one_to_one_bidirectional() {
        let pairs = Connector::OneToOne { bidirectional: true }
            .pairs(&row(1, 2, 0.0), &row(3, 2, 10.0), &mut rng())
            .unwrap();
        assert_eq!(
            pairs,
            vec![
                (NeuronId(1), NeuronId(3)),
                (NeuronId(3), NeuronId(1)),
                (NeuronId(2), NeuronId(4)),
                (NeuronId(4), NeuronId(2)),
            ]
        );
    }

    #[test]
    fn test_one_to_one_empty_side() {
        let pairs = Connector::OneToOne { bidirectional: false }
            .pairs(&row(1, 3, 0.0), &[], &mut rng())
            .unwrap();
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_all_to_all_self_connections() {
        let set = row(1, 3, 0.0);
        let without = Connector::AllToAll {
            allow_self_connections: false,
        }
        .pairs(&set, &set, &mut rng())
        .unwrap();
        assert_eq!(without.len(), 6);

        let with = Connector::AllToAll {
            allow_self_connections: true,
        }
        .pairs(&set, &set, &mut rng())
        .unwrap();
        assert_eq!(with.len(), 9);
    }

    #[test]
    fn test_sparse_density_extremes() {
        let sources = row(1, 4, 0.0);
        let targets = row(5, 4, 10.0);
        let full = Connector::Sparse {
            density: 1.0,
            allow_self_connections: false,
        };
        assert_eq!(full.pairs(&sources, &targets, &mut rng()).unwrap().len(), 16);

        let none = Connector::Sparse {
            density: 0.0,
            allow_self_connections: false,
        };
        assert!(none.pairs(&sources, &targets, &mut rng()).unwrap().is_empty());

        let bad = Connector::Sparse {
            density: 1.5,
            allow_self_connections: false,
        };
        assert!(matches!(
            bad.pairs(&sources, &targets, &mut rng()),
            Err(NetworkError::ConnectionError(_))
        ));
    }

    #[test]
    fn test_weight_init() {
        let mut rng = rng();
        assert_eq!(WeightInit::Constant(0.3).sample(&mut rng), 0.3);
        let uniform = WeightInit::Uniform { min: -0.2, max: 0.2 };
        for _ in 0..20 {
            let w = uniform.sample(&mut rng);
            assert!((-0.2..=0.2).contains(&w));
        }
        assert!(WeightInit::Uniform { min: 1.0, max: 0.0 }.validate().is_err());
        assert!(WeightInit::Constant(f64::NAN).validate().is_err());
    }
}
