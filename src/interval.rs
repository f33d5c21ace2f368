//! Interval ("box") propagation through the network.
//!
//! Pure interval arithmetic: a cheap, sound over-approximation of the
//! outputs reachable from a box of inputs. The explication loop uses it to
//! skip MILP solves: when the box already proves that no other class can
//! outscore the predicted one, the freed feature is irrelevant and the
//! solver is never consulted. A positive answer is always inconclusive.

use crate::network::{Activation, Layer, Network};
use serde::{Deserialize, Serialize};

/// A closed real interval with `lo <= hi`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    /// Lower end.
    pub lo: f64,
    /// Upper end.
    pub hi: f64,
}

impl Interval {
    /// Create an interval. Debug builds assert `lo <= hi`.
    pub fn new(lo: f64, hi: f64) -> Self {
        debug_assert!(lo <= hi, "interval bounds crossed: [{lo}, {hi}]");
        Self { lo, hi }
    }

    /// The degenerate interval `[v, v]`.
    pub fn point(v: f64) -> Self {
        Self { lo: v, hi: v }
    }

    /// Interval width.
    pub fn width(&self) -> f64 {
        self.hi - self.lo
    }

    /// Whether `v` lies inside the interval.
    pub fn contains(&self, v: f64) -> bool {
        self.lo <= v && v <= self.hi
    }

    /// Image of the interval under ReLU.
    pub fn relu(self) -> Self {
        Self {
            lo: self.lo.max(0.0),
            hi: self.hi.max(0.0),
        }
    }
}

/// Per-feature input intervals, derived from training-data column ranges.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureDomains {
    intervals: Vec<Interval>,
}

impl FeatureDomains {
    /// Wrap per-feature intervals.
    pub fn new(intervals: Vec<Interval>) -> Self {
        Self { intervals }
    }

    /// Number of features.
    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    /// Whether there are no features.
    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Domain of feature `i`.
    pub fn get(&self, i: usize) -> Interval {
        self.intervals[i]
    }

    /// All domains in column order.
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }
}

/// Bounds of a layer's affine map over an input box.
///
/// Splits the weight matrix into its positive and negative parts so each
/// output bound takes the matching end of every input interval.
pub fn affine_bounds(layer: &Layer, input: &[Interval]) -> Vec<Interval> {
    debug_assert_eq!(input.len(), layer.input_size());
    layer
        .weights
        .iter()
        .zip(&layer.biases)
        .map(|(row, bias)| {
            let mut lo = *bias;
            let mut hi = *bias;
            for (w, x) in row.iter().zip(input) {
                if *w >= 0.0 {
                    lo += w * x.lo;
                    hi += w * x.hi;
                } else {
                    lo += w * x.hi;
                    hi += w * x.lo;
                }
            }
            Interval::new(lo, hi)
        })
        .collect()
}

/// Propagate an input box through the whole network, yielding per-class
/// output intervals.
///
/// # Panics
///
/// Panics if `input` does not match the network's input width. Shapes are
/// validated when the [`Network`] is built, so propagation itself cannot
/// fail.
pub fn propagate(network: &Network, input: &[Interval]) -> Vec<Interval> {
    assert_eq!(
        input.len(),
        network.input_size(),
        "input box width mismatch: expected {}, got {}",
        network.input_size(),
        input.len()
    );
    let mut bounds = input.to_vec();
    for layer in network.layers() {
        bounds = affine_bounds(layer, &bounds);
        if layer.activation == Activation::Relu {
            for b in &mut bounds {
                *b = b.relu();
            }
        }
    }
    bounds
}

/// Input box for the current fixture set: freed features widen to their
/// domain, fixed features stay at the concrete value.
pub fn relax_to_domains(x: &[f64], domains: &FeatureDomains, relax: &[bool]) -> Vec<Interval> {
    debug_assert_eq!(x.len(), domains.len());
    debug_assert_eq!(x.len(), relax.len());
    x.iter()
        .zip(relax)
        .enumerate()
        .map(|(i, (&value, &freed))| {
            if freed {
                domains.get(i)
            } else {
                Interval::point(value)
            }
        })
        .collect()
}

/// Whether the box admits a potential counter-example to class `predicted`.
///
/// Returns `true` ("a counter-example might exist") iff any other class can
/// reach a value above the predicted class's guaranteed minimum. `false` is
/// a proof: no input inside the box flips the prediction.
pub fn box_has_solution(bounds: &[Interval], network: &Network, predicted: usize) -> bool {
    let outputs = propagate(network, bounds);
    let floor = outputs[predicted].lo;
    outputs
        .iter()
        .enumerate()
        .any(|(class, interval)| class != predicted && interval.hi > floor)
}
