//! Plain data shared by every reader and consumer: sparse features, samples
//! and labeled, weighted observations.

use std::ops::Deref;

/// A single nonzero coordinate of a sparse vector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feature {
    pub key: u32,
    pub value: f64,
}

impl Feature {
    pub fn new(key: u32, value: f64) -> Self {
        Feature { key, value }
    }
}

/// An immutable sparse vector. Iteration follows the order the features were
/// given in, which keeps floating point sums reproducible within a pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sample(Box<[Feature]>);

impl Sample {
    pub fn features(&self) -> &[Feature] {
        &self.0
    }

    /// Largest key in the sample, if any.
    pub fn max_key(&self) -> Option<u32> {
        self.0.iter().map(|f| f.key).max()
    }
}

impl Deref for Sample {
    type Target = [Feature];

    fn deref(&self) -> &[Feature] {
        &self.0
    }
}

impl From<Vec<Feature>> for Sample {
    fn from(features: Vec<Feature>) -> Self {
        Sample(features.into_boxed_slice())
    }
}

/// One training instance: features, a binary label and a sample weight.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub x: Sample,
    pub y: u8,
    pub w: f64,
}

impl Observation {
    pub fn new(x: impl Into<Sample>, y: u8, w: f64) -> Self {
        Observation { x: x.into(), y, w }
    }
}
