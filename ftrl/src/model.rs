//! The FTRL-Proximal model: prediction and the per-sample update, against a
//! weight store shared by every training shard.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use svmio::Feature;

use crate::error::{Error, Result};
use crate::link::Activation;
use crate::loss::{clip, logloss};
use crate::params::Params;
use crate::report::DecisionSummary;
use crate::weights::{WeightKeeper, WeightStore};

#[derive(Debug)]
pub struct Ftrl {
    params: Params,
    activation: Activation,
    weights: WeightStore,
}

impl Ftrl {
    /// Validates `params` and starts from an empty sparse store.
    pub fn new(params: Params) -> Result<Self> {
        params.validate()?;
        Ok(Ftrl {
            params,
            activation: params.activation,
            weights: WeightStore::default(),
        })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn weights(&self) -> &WeightStore {
        &self.weights
    }

    /// Moves the weights into a dense store over keys `0..capacity`. Needs
    /// exclusive access, so it only ever happens between epochs.
    pub fn densify(&mut self, capacity: usize) -> Result<()> {
        self.weights.densify(capacity)
    }

    fn score(&self, x: &[Feature]) -> f64 {
        x.iter()
            .map(|f| self.weights.materialized_weight(f.key, &self.params) * f.value)
            .sum()
    }

    /// Prediction for sample `x`; unseen features contribute nothing.
    pub fn predict(&self, x: &[Feature]) -> f64 {
        self.activation.apply(self.score(x))
    }

    /// One FTRL-Proximal step for every feature of `x`, given the prediction
    /// `p` made for it.
    pub fn update(&self, x: &[Feature], p: f64, y: u8, sample_weight: f64) -> Result<()> {
        let g = clip(sample_weight * (p - f64::from(y)), self.params.grad_clip);
        for f in x {
            let gi = g * f.value;
            self.weights
                .get_or_insert(f.key, |state| state.update(gi, &self.params))?;
        }
        Ok(())
    }

    /// Predicts, updates and returns the weighted log-loss of the prediction.
    pub fn fit(&self, x: &[Feature], y: u8, sample_weight: f64) -> Result<f64> {
        let p = self.predict(x);
        self.update(x, p, y, sample_weight)?;
        Ok(logloss(p, y, sample_weight))
    }

    /// Upper confidence bound of the score of `x`. Features without any
    /// gradient history are skipped.
    pub fn estimate_ucb(&self, x: &[Feature]) -> f64 {
        let bound: f64 = x
            .iter()
            .filter_map(|f| {
                let n = self.weights.with_entry(f.key, |s| s.n)?;
                if n > 0.0 {
                    Some(f.value / n.sqrt())
                } else {
                    None
                }
            })
            .sum();
        self.params.alpha * bound
    }

    pub fn materialized_weight(&self, key: u32) -> f64 {
        self.weights.materialized_weight(key, &self.params)
    }

    pub fn nonzero_weights(&self) -> BTreeMap<u32, f64> {
        let mut nonzero = BTreeMap::new();
        self.weights.for_each(|k, s| {
            let w = s.materialize(&self.params);
            if w != 0.0 {
                nonzero.insert(k, w);
            }
        });
        nonzero
    }

    /// The `k` nonzero weights of largest magnitude, strongest first.
    pub fn strongest_weights(&self, k: usize) -> Vec<(u32, f64)> {
        let mut weights: Vec<_> = self.nonzero_weights().into_iter().collect();
        weights.sort_by(|a, b| {
            b.1.abs()
                .partial_cmp(&a.1.abs())
                .unwrap_or(Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        weights.truncate(k);
        weights
    }

    pub fn decision_summary(&self) -> DecisionSummary {
        DecisionSummary {
            params: self.params,
            weights: self.weights.summary(&self.params),
        }
    }

    /// Writes one `index:weight` line for every index in `0..=max_index`.
    pub fn write_weights(&self, out: &mut impl Write, max_index: u32) -> std::io::Result<()> {
        for k in 0..=max_index {
            writeln!(out, "{}:{:.6}", k, self.materialized_weight(k))?;
        }
        out.flush()
    }

    pub fn save(&self, path: &Path, max_index: u32) -> Result<()> {
        let file = File::create(path).map_err(|e| Error::io(path, e))?;
        self.write_weights(&mut BufWriter::new(file), max_index)
            .map_err(|e| Error::io(path, e))?;
        info!("saved model to {:?}", path);
        Ok(())
    }
}
