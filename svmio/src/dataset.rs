//! In-memory cache of parsed observations, plus the row-access trait shared by
//! every dataset backend.

use std::borrow::Cow;
use std::fmt;

use crate::sample::{Feature, Observation};

/// Read-only, random access to labeled rows.
///
/// Implementations must be safe to share across the worker threads that
/// shard over their rows.
pub trait Examples: Sync {
    fn nrows(&self) -> usize;

    fn features(&self, i: usize) -> Cow<'_, [Feature]>;

    fn label(&self, i: usize) -> u8;

    fn sample_weight(&self, i: usize) -> f64;

    /// Sum of all sample weights (the row count for unweighted data).
    fn weight_sum(&self) -> f64;

    /// Total number of stored features.
    fn nnz(&self) -> usize;

    /// Largest feature index present, `None` if there are no features.
    fn max_feature(&self) -> Option<u32>;

    fn stats(&self) -> DatasetStats {
        DatasetStats {
            nrows: self.nrows(),
            ncols: self.max_feature().map_or(0, |m| m as usize + 1),
            nnz: self.nnz(),
            weight_sum: self.weight_sum(),
        }
    }
}

/// Summary shape of a dataset, for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetStats {
    pub nrows: usize,
    pub ncols: usize,
    pub nnz: usize,
    pub weight_sum: f64,
}

impl fmt::Display for DatasetStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<10}{}", "rows", self.nrows)?;
        writeln!(f, "{:<10}{}", "cols", self.ncols)?;
        writeln!(f, "{:<10}{}", "nonzero", self.nnz)?;
        write!(f, "{:<10}{}", "weights", self.weight_sum)
    }
}

/// A growable store of observations. Aggregates are maintained on every
/// `add` and never recomputed, so `weight_sum` is always the sum of the
/// contained weights and `nnz` the sum of their lengths.
#[derive(Debug, Default)]
pub struct Dataset {
    data: Vec<Observation>,
    weight_sum: f64,
    nnz: usize,
    max_feature: Option<u32>,
    feature_names: Vec<String>,
}

impl Dataset {
    pub fn with_capacity(capacity: usize) -> Self {
        Dataset {
            data: Vec::with_capacity(capacity),
            ..Default::default()
        }
    }

    pub fn add(&mut self, o: Observation) {
        self.weight_sum += o.w;
        self.nnz += o.x.len();
        if let Some(k) = o.x.max_key() {
            self.max_feature = Some(self.max_feature.map_or(k, |m| m.max(k)));
        }
        self.data.push(o);
    }

    pub fn row(&self, i: usize) -> &Observation {
        &self.data[i]
    }

    pub fn observations(&self) -> &[Observation] {
        &self.data
    }

    pub fn into_observations(self) -> Vec<Observation> {
        self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn set_feature_names(&mut self, names: Vec<String>) {
        self.feature_names = names;
    }
}

impl Examples for Dataset {
    fn nrows(&self) -> usize {
        self.data.len()
    }

    fn features(&self, i: usize) -> Cow<'_, [Feature]> {
        Cow::Borrowed(self.data[i].x.features())
    }

    fn label(&self, i: usize) -> u8 {
        self.data[i].y
    }

    fn sample_weight(&self, i: usize) -> f64 {
        self.data[i].w
    }

    fn weight_sum(&self) -> f64 {
        self.weight_sum
    }

    fn nnz(&self) -> usize {
        self.nnz
    }

    fn max_feature(&self) -> Option<u32> {
        self.max_feature
    }
}

impl Extend<Observation> for Dataset {
    fn extend<T: IntoIterator<Item = Observation>>(&mut self, iter: T) {
        for o in iter {
            self.add(o)
        }
    }
}
