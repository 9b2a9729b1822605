//! # Simbrain Core
//!
//! Shared types and utilities for the Simbrain network revival.
//!
//! ## Original System
//!
//! | Component | Original Language | Era | Status |
//! |-----------|------------------|-----|--------|
//! | Simbrain network core | Java (Swing + Piccolo2D) | 2005-2014 | Desktop-only |
//!
//! Only the simulation core is revived. Everything here is plain data that the
//! network engine, the CLI and any external logger share.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

/// Simulation time (ticks for discrete networks, time units for continuous ones)
pub type Time = f64;

/// Scalar state value of a neuron
pub type Activation = f64;

/// Whether an update rule advances in discrete steps or integrates continuous time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TimeType {
    /// One tick advances time by one unit
    #[default]
    Discrete,
    /// One tick advances time by the network time step
    Continuous,
}

impl TimeType {
    /// Combine the time types of several rules: continuous wins.
    pub fn combine(self, other: TimeType) -> TimeType {
        match (self, other) {
            (TimeType::Discrete, TimeType::Discrete) => TimeType::Discrete,
            _ => TimeType::Continuous,
        }
    }
}

// ============================================================================
// LOCATIONS
// ============================================================================

/// 2-D layout coordinates stored on the model
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Location {
    pub x: f64,
    pub y: f64,
}

impl Location {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned bounding box of a set of locations
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Extent {
    /// Bounding box of `points`, `None` when empty.
    pub fn of<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = Location>,
    {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut extent = Self {
            min_x: first.x,
            max_x: first.x,
            min_y: first.y,
            max_y: first.y,
        };
        for p in iter {
            extent.min_x = extent.min_x.min(p.x);
            extent.max_x = extent.max_x.max(p.x);
            extent.min_y = extent.min_y.min(p.y);
            extent.max_y = extent.max_y.max(p.y);
        }
        Some(extent)
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    /// Midpoint of the box (not the centroid of the points)
    pub fn midpoint(&self) -> Location {
        Location::new(
            (self.min_x + self.max_x) / 2.0,
            (self.min_y + self.max_y) / 2.0,
        )
    }

    /// True when the points spread further along x than along y
    pub fn is_horizontal(&self) -> bool {
        self.width() > self.height()
    }
}

// ============================================================================
// RECORDING
// ============================================================================

/// Time series data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeSeries {
    /// Time points
    pub time: Vec<Time>,
    /// Values at each time point
    pub values: Vec<f64>,
    /// Variable name
    pub name: String,
}

impl TimeSeries {
    pub fn new(name: &str) -> Self {
        Self {
            time: Vec::new(),
            values: Vec::new(),
            name: name.to_string(),
        }
    }

    pub fn push(&mut self, t: Time, v: f64) {
        self.time.push(t);
        self.values.push(v);
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }

    pub fn last(&self) -> Option<(Time, f64)> {
        Some((*self.time.last()?, *self.values.last()?))
    }

    pub fn values_array(&self) -> Array1<f64> {
        Array1::from_vec(self.values.clone())
    }
}

/// Parameters for an external driver loop
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunParams {
    /// Number of ticks to run
    pub ticks: u64,
    /// Record every `record_interval` ticks (0 disables recording)
    pub record_interval: u64,
}

impl Default for RunParams {
    fn default() -> Self {
        Self {
            ticks: 100,
            record_interval: 1,
        }
    }
}

impl RunParams {
    /// Whether the state after `tick` (1-based) should be recorded
    pub fn should_record(&self, tick: u64) -> bool {
        self.record_interval != 0 && tick % self.record_interval == 0
    }
}
