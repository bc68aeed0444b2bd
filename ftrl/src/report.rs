//! Training summaries and where they go.

use std::fmt;
use std::time::Duration;

use log::info;

use crate::params::Params;
use crate::weights::WeightSummary;

/// Validation results for one pass over the validation set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validation {
    pub loss: f64,
    /// Weighted mean prediction.
    pub avg_prediction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EpochSummary {
    /// 1-based.
    pub epoch: usize,
    pub train_loss: f64,
    pub train_time: Duration,
    pub validation: Option<(Validation, Duration)>,
}

impl fmt::Display for EpochSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.validation {
            Some((v, valid_time)) => write!(
                f,
                "#{:02}. tr.loss={:.6} val.loss={:.6} avg(pCTR)={:.6} \
                 time{{train:{:.0?}, val:{:.0?}}}",
                self.epoch, self.train_loss, v.loss, v.avg_prediction, self.train_time, valid_time
            ),
            None => write!(
                f,
                "#{:02}. tr.loss={:.6} time{{train:{:.0?}}}",
                self.epoch, self.train_loss, self.train_time
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecisionSummary {
    pub params: Params,
    pub weights: WeightSummary,
}

impl fmt::Display for DecisionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<17}{}", "Decision summary", ":::::")?;
        writeln!(f, "{}", self.params)?;
        writeln!(f, "{:<17}{}", "weights count", self.weights.count)?;
        writeln!(f, "{:<17}{}", "count nonzero", self.weights.nonzero)?;
        writeln!(f, "{:<17}{}", "min weight", self.weights.min)?;
        write!(f, "{:<17}{}", "max weight", self.weights.max)
    }
}

/// Receives summaries as training progresses.
pub trait Reporter: Send {
    fn epoch(&mut self, summary: &EpochSummary);

    fn decision(&mut self, _summary: &DecisionSummary) {}
}

/// Writes every summary to the log at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl Reporter for LogReporter {
    fn epoch(&mut self, summary: &EpochSummary) {
        info!("{}", summary);
    }

    fn decision(&mut self, summary: &DecisionSummary) {
        for line in summary.to_string().lines() {
            info!("{}", line);
        }
    }
}
