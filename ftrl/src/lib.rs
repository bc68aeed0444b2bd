//! `ftrl` trains sparse linear models with FTRL-Proximal (McMahan et al.,
//! "Ad Click Prediction: a View from the Trenches"), sharding every epoch
//! over worker threads that update one shared, per-feature-locked weight
//! store.
//!
//! Data comes in through [`svmio`]; anything implementing
//! [`svmio::Examples`] can be trained on.

mod error;
mod hasher;
pub mod link;
pub mod loss;
mod model;
mod params;
pub mod report;
pub mod trainer;
pub mod weights;

pub use error::{Error, Result};
pub use link::Activation;
pub use model::Ftrl;
pub use params::Params;
pub use report::{DecisionSummary, EpochSummary, LogReporter, Reporter, Validation};
pub use trainer::{predict_batch, shards, validate, Trainer};
pub use weights::{WeightKeeper, WeightState, WeightStore};
