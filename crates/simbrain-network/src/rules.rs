//! Neuron update rules.
//!
//! A rule turns a neuron's weighted input into its next activation. Rules
//! never write the activation themselves; the neuron stages the returned
//! value into its buffer and the scheduler decides when it is committed.

use crate::{NetworkError, Result};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};
use simbrain_core::{Time, TimeType};

// ============================================================================
// BOUNDS
// ============================================================================

/// Closed clipping interval `[lower, upper]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub lower: f64,
    pub upper: f64,
}

impl Default for Bounds {
    fn default() -> Self {
        Self {
            lower: -1.0,
            upper: 1.0,
        }
    }
}

impl Bounds {
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let bounds = Self { lower, upper };
        bounds.validate()?;
        Ok(bounds)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.lower.is_finite() || !self.upper.is_finite() || self.lower > self.upper {
            return Err(NetworkError::InvalidParameter(format!(
                "bounds [{}, {}] are not an ordered finite interval",
                self.lower, self.upper
            )));
        }
        Ok(())
    }

    pub fn clip(&self, value: f64) -> f64 {
        if value > self.upper {
            self.upper
        } else if value < self.lower {
            self.lower
        } else {
            value
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }

    /// Uniform sample in the interval
    pub fn random(&self, rng: &mut StdRng) -> f64 {
        if self.upper <= self.lower {
            return self.lower;
        }
        rng.gen_range(self.lower..=self.upper)
    }

    pub fn midpoint(&self) -> f64 {
        (self.lower + self.upper) / 2.0
    }
}

// ============================================================================
// UPDATE CONTRACT
// ============================================================================

/// Everything a rule may read while computing a neuron's next value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateContext {
    /// Sum of incoming synapse values plus the external input
    pub weighted_input: f64,
    /// Currently committed activation of the neuron
    pub activation: f64,
    /// Network time at the start of the tick
    pub time: Time,
    /// Integration step for continuous rules
    pub time_step: f64,
}

/// Capability interface shared by all neuron update rules
pub trait UpdateRule {
    /// Registry name of the rule
    fn name(&self) -> &'static str;

    fn time_type(&self) -> TimeType {
        TimeType::Discrete
    }

    /// Bounds of a bounded rule, `None` otherwise
    fn bounds(&self) -> Option<Bounds> {
        None
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        None
    }

    /// Activity generators produce values without reading upstream state
    fn is_generator(&self) -> bool {
        false
    }

    /// Step used when nudging the activation by hand
    fn increment(&self) -> f64 {
        0.1
    }

    /// Compute the value to stage into the neuron's buffer
    fn compute(&mut self, ctx: &UpdateContext, rng: &mut StdRng) -> f64;
}

// ============================================================================
// RULES
// ============================================================================

/// `a = slope * (input + bias)`, optionally clipped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearRule {
    pub slope: f64,
    pub bias: f64,
    pub clipping: bool,
    pub bounds: Bounds,
    pub increment: f64,
}

impl Default for LinearRule {
    fn default() -> Self {
        Self {
            slope: 1.0,
            bias: 0.0,
            clipping: true,
            bounds: Bounds::default(),
            increment: 0.1,
        }
    }
}

impl UpdateRule for LinearRule {
    fn name(&self) -> &'static str {
        "LinearRule"
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        Some(&mut self.bounds)
    }

    fn increment(&self) -> f64 {
        self.increment
    }

    fn compute(&mut self, ctx: &UpdateContext, _rng: &mut StdRng) -> f64 {
        let value = self.slope * (ctx.weighted_input + self.bias);
        if self.clipping {
            self.bounds.clip(value)
        } else {
            value
        }
    }
}

/// Upper bound when `input + bias` exceeds the threshold, lower bound otherwise
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BinaryRule {
    pub threshold: f64,
    pub bias: f64,
    pub bounds: Bounds,
}

impl Default for BinaryRule {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            bias: 0.0,
            bounds: Bounds {
                lower: 0.0,
                upper: 1.0,
            },
        }
    }
}

impl UpdateRule for BinaryRule {
    fn name(&self) -> &'static str {
        "BinaryRule"
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        Some(&mut self.bounds)
    }

    fn increment(&self) -> f64 {
        self.bounds.upper - self.bounds.lower
    }

    fn compute(&mut self, ctx: &UpdateContext, _rng: &mut StdRng) -> f64 {
        if ctx.weighted_input + self.bias > self.threshold {
            self.bounds.upper
        } else {
            self.bounds.lower
        }
    }
}

/// Logistic squashing between the bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SigmoidalRule {
    pub slope: f64,
    pub bias: f64,
    pub bounds: Bounds,
}

impl Default for SigmoidalRule {
    fn default() -> Self {
        Self {
            slope: 1.0,
            bias: 0.0,
            bounds: Bounds {
                lower: 0.0,
                upper: 1.0,
            },
        }
    }
}

impl UpdateRule for SigmoidalRule {
    fn name(&self) -> &'static str {
        "SigmoidalRule"
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        Some(&mut self.bounds)
    }

    fn compute(&mut self, ctx: &UpdateContext, _rng: &mut StdRng) -> f64 {
        let range = self.bounds.upper - self.bounds.lower;
        let x = self.slope * (ctx.weighted_input + self.bias);
        self.bounds.lower + range / (1.0 + (-x).exp())
    }
}

/// Gaussian noise source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseParams {
    pub mean: f64,
    pub std: f64,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self { mean: 0.0, std: 1.0 }
    }
}

impl NoiseParams {
    pub fn sample(&self, rng: &mut StdRng) -> f64 {
        match Normal::new(self.mean, self.std) {
            Ok(normal) => normal.sample(rng),
            // Negative or NaN std: degrade to the mean
            Err(_) => self.mean,
        }
    }
}

/// Leaky integrate-and-fire
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrateAndFireRule {
    pub resistance: f64,
    pub time_constant: f64,
    pub threshold: f64,
    pub reset_potential: f64,
    pub resting_potential: f64,
    pub add_noise: bool,
    pub noise: NoiseParams,
    pub clipping: bool,
    pub bounds: Bounds,
    #[serde(skip)]
    pub(crate) has_spiked: bool,
}

impl Default for IntegrateAndFireRule {
    fn default() -> Self {
        Self {
            resistance: 1.0,
            time_constant: 1.0,
            threshold: 2.0,
            reset_potential: 0.1,
            resting_potential: 0.5,
            add_noise: false,
            noise: NoiseParams::default(),
            clipping: false,
            bounds: Bounds::default(),
            has_spiked: false,
        }
    }
}

impl IntegrateAndFireRule {
    /// Whether the last update crossed the threshold
    pub fn has_spiked(&self) -> bool {
        self.has_spiked
    }
}

impl UpdateRule for IntegrateAndFireRule {
    fn name(&self) -> &'static str {
        "IntegrateAndFireRule"
    }

    fn time_type(&self) -> TimeType {
        TimeType::Continuous
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        Some(&mut self.bounds)
    }

    fn compute(&mut self, ctx: &UpdateContext, rng: &mut StdRng) -> f64 {
        let mut input = ctx.weighted_input;
        if self.add_noise {
            input += self.noise.sample(rng);
        }

        let mut v = ctx.activation
            + ctx.time_step / self.time_constant
                * (self.resting_potential - ctx.activation + self.resistance * input);

        if v > self.threshold {
            self.has_spiked = true;
            v = self.reset_potential;
        } else {
            self.has_spiked = false;
        }

        if self.clipping {
            v = self.bounds.clip(v);
        }
        v
    }
}

/// Sine wave between the bounds, driven by network time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinusoidalRule {
    pub frequency: f64,
    pub phase: f64,
    pub bounds: Bounds,
}

impl Default for SinusoidalRule {
    fn default() -> Self {
        Self {
            frequency: 0.1,
            phase: 0.0,
            bounds: Bounds::default(),
        }
    }
}

impl UpdateRule for SinusoidalRule {
    fn name(&self) -> &'static str {
        "SinusoidalRule"
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        Some(&mut self.bounds)
    }

    fn is_generator(&self) -> bool {
        true
    }

    fn compute(&mut self, ctx: &UpdateContext, _rng: &mut StdRng) -> f64 {
        let amplitude = (self.bounds.upper - self.bounds.lower) / 2.0;
        amplitude * (self.frequency * ctx.time + self.phase).sin() + self.bounds.midpoint()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RandomDistribution {
    Uniform,
    Gaussian(NoiseParams),
}

/// Independent random draw each tick
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomRule {
    pub distribution: RandomDistribution,
    pub clipping: bool,
    pub bounds: Bounds,
}

impl Default for RandomRule {
    fn default() -> Self {
        Self {
            distribution: RandomDistribution::Uniform,
            clipping: true,
            bounds: Bounds::default(),
        }
    }
}

impl UpdateRule for RandomRule {
    fn name(&self) -> &'static str {
        "RandomRule"
    }

    fn bounds(&self) -> Option<Bounds> {
        Some(self.bounds)
    }

    fn bounds_mut(&mut self) -> Option<&mut Bounds> {
        Some(&mut self.bounds)
    }

    fn is_generator(&self) -> bool {
        true
    }

    fn compute(&mut self, _ctx: &UpdateContext, rng: &mut StdRng) -> f64 {
        let value = match self.distribution {
            RandomDistribution::Uniform => self.bounds.random(rng),
            RandomDistribution::Gaussian(noise) => noise.sample(rng),
        };
        if self.clipping {
            self.bounds.clip(value)
        } else {
            value
        }
    }
}

// ============================================================================
// RULE REGISTRY
// ============================================================================

/// The update rule carried by a neuron
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NeuronRule {
    Linear(LinearRule),
    Binary(BinaryRule),
    Sigmoidal(SigmoidalRule),
    IntegrateAndFire(IntegrateAndFireRule),
    Sinusoidal(SinusoidalRule),
    Random(RandomRule),
}

impl Default for NeuronRule {
    fn default() -> Self {
        NeuronRule::Linear(LinearRule::default())
    }
}

const RULE_NAMES: [&str; 6] = [
    "LinearRule",
    "BinaryRule",
    "SigmoidalRule",
    "IntegrateAndFireRule",
    "SinusoidalRule",
    "RandomRule",
];

impl NeuronRule {
    /// Build a rule with default parameters from its registry name
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "LinearRule" => Ok(NeuronRule::Linear(LinearRule::default())),
            "BinaryRule" => Ok(NeuronRule::Binary(BinaryRule::default())),
            "SigmoidalRule" => Ok(NeuronRule::Sigmoidal(SigmoidalRule::default())),
            "IntegrateAndFireRule" => {
                Ok(NeuronRule::IntegrateAndFire(IntegrateAndFireRule::default()))
            }
            "SinusoidalRule" => Ok(NeuronRule::Sinusoidal(SinusoidalRule::default())),
            "RandomRule" => Ok(NeuronRule::Random(RandomRule::default())),
            other => Err(NetworkError::UnknownRuleKind(other.to_string())),
        }
    }

    /// All registry names
    pub fn names() -> &'static [&'static str] {
        &RULE_NAMES
    }

    pub fn as_rule(&self) -> &dyn UpdateRule {
        match self {
            NeuronRule::Linear(r) => r,
            NeuronRule::Binary(r) => r,
            NeuronRule::Sigmoidal(r) => r,
            NeuronRule::IntegrateAndFire(r) => r,
            NeuronRule::Sinusoidal(r) => r,
            NeuronRule::Random(r) => r,
        }
    }

    pub fn as_rule_mut(&mut self) -> &mut dyn UpdateRule {
        match self {
            NeuronRule::Linear(r) => r,
            NeuronRule::Binary(r) => r,
            NeuronRule::Sigmoidal(r) => r,
            NeuronRule::IntegrateAndFire(r) => r,
            NeuronRule::Sinusoidal(r) => r,
            NeuronRule::Random(r) => r,
        }
    }

    pub fn name(&self) -> &'static str {
        self.as_rule().name()
    }

    pub fn time_type(&self) -> TimeType {
        self.as_rule().time_type()
    }

    pub fn bounds(&self) -> Option<Bounds> {
        self.as_rule().bounds()
    }

    pub fn is_bounded(&self) -> bool {
        self.bounds().is_some()
    }

    pub fn is_generator(&self) -> bool {
        self.as_rule().is_generator()
    }

    pub fn compute(&mut self, ctx: &UpdateContext, rng: &mut StdRng) -> f64 {
        self.as_rule_mut().compute(ctx, rng)
    }
}
