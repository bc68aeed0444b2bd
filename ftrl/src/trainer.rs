//! Epoch orchestration: rows are cut into contiguous shards and every shard
//! trains against the one shared model in parallel.
//!
//! Cross-shard updates of the same feature interleave in no fixed order, so
//! runs are only reproducible when shards touch disjoint features (or with a
//! single worker). Per-shard statistics are always reduced in shard order.

use std::ops::Range;
use std::time::Instant;

use log::{debug, info};
use rayon::prelude::*;
use svmio::Examples;

use crate::error::Result;
use crate::model::Ftrl;
use crate::report::{EpochSummary, LogReporter, Reporter, Validation};

/// Splits `0..nrows` into `workers` contiguous ranges of near-equal size.
/// The last range absorbs the remainder; ranges may be empty.
pub fn shards(nrows: usize, workers: usize) -> Vec<Range<usize>> {
    let workers = workers.max(1);
    let size = nrows / workers;
    (0..workers)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == workers { nrows } else { start + size };
            start..end
        })
        .collect()
}

#[derive(Debug, Default, Clone, Copy)]
struct ShardStats {
    loss_sum: f64,
    weight_sum: f64,
    prediction_sum: f64,
    rows: usize,
}

impl ShardStats {
    fn merge(mut self, other: ShardStats) -> ShardStats {
        self.loss_sum += other.loss_sum;
        self.weight_sum += other.weight_sum;
        self.prediction_sum += other.prediction_sum;
        self.rows += other.rows;
        self
    }

    fn mean_loss(&self) -> f64 {
        ratio(self.loss_sum, self.weight_sum)
    }
}

fn ratio(sum: f64, weight: f64) -> f64 {
    if weight == 0.0 {
        0.0
    } else {
        sum / weight
    }
}

pub struct Trainer<'a> {
    model: Ftrl,
    train: &'a dyn Examples,
    valid: Option<&'a dyn Examples>,
    workers: usize,
    dense_weights: bool,
    reporter: Box<dyn Reporter + 'a>,
}

impl<'a> Trainer<'a> {
    pub fn new(model: Ftrl, train: &'a dyn Examples) -> Self {
        Trainer {
            model,
            train,
            valid: None,
            workers: rayon::current_num_threads(),
            dense_weights: true,
            reporter: Box::new(LogReporter),
        }
    }

    pub fn validation(mut self, valid: &'a dyn Examples) -> Self {
        self.valid = Some(valid);
        self
    }

    /// Number of shards per epoch.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Whether to move the weights into a dense store, sized by the largest
    /// feature of the data, before the first epoch.
    pub fn dense_weights(mut self, dense: bool) -> Self {
        self.dense_weights = dense;
        self
    }

    pub fn reporter(mut self, reporter: impl Reporter + 'a) -> Self {
        self.reporter = Box::new(reporter);
        self
    }

    pub fn model(&self) -> &Ftrl {
        &self.model
    }

    pub fn into_model(self) -> Ftrl {
        self.model
    }

    /// Runs every epoch, returning their summaries in order. Stops at the
    /// first update error.
    pub fn run(&mut self) -> Result<Vec<EpochSummary>> {
        if self.dense_weights {
            let max_feature = self
                .train
                .max_feature()
                .into_iter()
                .chain(self.valid.and_then(|v| v.max_feature()))
                .max();
            let capacity = max_feature.map_or(0, |m| m as usize + 1);
            self.model.densify(capacity)?;
            debug!("dense weight store with {} slots", capacity);
        }

        let epochs = self.model.params().epochs;
        info!(
            "training {} for {} epochs on {} rows with {} workers",
            self.model.params(),
            epochs,
            self.train.nrows(),
            self.workers
        );
        let mut summaries = Vec::with_capacity(epochs);
        for epoch in 1..=epochs {
            let start = Instant::now();
            let stats = self.train_epoch()?;
            let train_time = start.elapsed();
            let validation = self.valid.map(|valid| {
                let start = Instant::now();
                let v = validate(&self.model, valid, self.workers);
                (v, start.elapsed())
            });
            let summary = EpochSummary {
                epoch,
                train_loss: stats.mean_loss(),
                train_time,
                validation,
            };
            self.reporter.epoch(&summary);
            summaries.push(summary);
        }
        self.reporter.decision(&self.model.decision_summary());
        Ok(summaries)
    }

    fn train_epoch(&self) -> Result<ShardStats> {
        let model = &self.model;
        let train = self.train;
        let per_shard = shards(train.nrows(), self.workers)
            .into_par_iter()
            .map(|rows| {
                let mut stats = ShardStats::default();
                for i in rows {
                    let w = train.sample_weight(i);
                    stats.loss_sum += model.fit(&train.features(i), train.label(i), w)?;
                    stats.weight_sum += w;
                    stats.rows += 1;
                }
                Ok(stats)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(per_shard
            .into_iter()
            .fold(ShardStats::default(), ShardStats::merge))
    }

    /// Scores the validation set with the current model, if there is one.
    pub fn validate(&self) -> Option<Validation> {
        self.valid.map(|v| validate(&self.model, v, self.workers))
    }
}

/// Weighted log-loss and mean prediction of `model` over `data`. Never
/// changes the model.
pub fn validate(model: &Ftrl, data: &dyn Examples, workers: usize) -> Validation {
    let per_shard: Vec<ShardStats> = shards(data.nrows(), workers)
        .into_par_iter()
        .map(|rows| {
            let mut stats = ShardStats::default();
            for i in rows {
                let w = data.sample_weight(i);
                let p = model.predict(&data.features(i));
                stats.loss_sum += crate::loss::logloss(p, data.label(i), w);
                stats.prediction_sum += p * w;
                stats.weight_sum += w;
                stats.rows += 1;
            }
            stats
        })
        .collect();
    let total = per_shard
        .into_iter()
        .fold(ShardStats::default(), ShardStats::merge);
    Validation {
        loss: total.mean_loss(),
        avg_prediction: ratio(total.prediction_sum, total.weight_sum),
    }
}

/// Predictions for every row of `data`, in row order.
pub fn predict_batch(model: &Ftrl, data: &dyn Examples) -> Vec<f64> {
    (0..data.nrows())
        .into_par_iter()
        .map(|i| model.predict(&data.features(i)))
        .collect()
}
