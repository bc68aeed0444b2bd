//! # `svmio` - sparse svmlight input
//!
//! Reading labeled, weighted svmlight files into memory, either as a cache of
//! observations filled by a concurrent parsing pipeline ([`Ingest`]) or as a
//! compressed sparse row matrix ([`CsrDataset`]). Both expose their rows
//! through [`Examples`].

mod csr_dataset;
mod dataset;
mod error;
mod ingest;
pub mod matrix;
mod sample;
pub mod scanner;
pub mod svmlight;

pub use csr_dataset::CsrDataset;
pub use dataset::{Dataset, DatasetStats, Examples};
pub use error::{Error, Result};
pub use ingest::{read_feature_names, Ingest};
pub use matrix::{CooMatrix, CsrMatrix};
pub use sample::{Feature, Observation, Sample};
