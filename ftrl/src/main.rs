//! Command-line trainer: reads svmlight training (and optionally validation)
//! data, fits an FTRL-Proximal model and optionally dumps its weights.

use std::error::Error;
use std::path::PathBuf;

use env_logger::Env;
use log::info;
use structopt::clap::arg_enum;
use structopt::StructOpt;

use ftrl::{Activation, Ftrl, Params, Trainer, WeightKeeper};
use svmio::{CsrDataset, Examples, Ingest};

arg_enum! {

#[derive(Debug, Clone, Copy)]
enum Backend {
    Cache,
    Csr
}

}

/// Trains a sparse logistic (or linear, or log-linear) model with
/// FTRL-Proximal.
///
/// Data files are svmlight: one `<label> <feature>:<value> ...` per line,
/// labels 0 or 1, features u32 indices. Weights files hold one non-negative
/// sample weight per line, matching the data file line by line; without one
/// every sample weighs 1. Feature-names files hold one name per line, in
/// feature index order, and are only used for reporting.
///
/// Training shards each epoch over rayon's thread pool; use `--workers` or
/// the `RAYON_NUM_THREADS` env variable to control thread count. Logging is
/// controlled with `RUST_LOG` (default `info`).
#[derive(Debug, StructOpt)]
#[structopt(name = "ftrl", about = "FTRL-Proximal trainer for svmlight data.")]
struct Opt {
    /// Training set, in svmlight format.
    #[structopt(long)]
    train: PathBuf,

    /// Sample weights of the training set; uniform weights when absent or
    /// empty.
    #[structopt(long)]
    train_weights: Option<PathBuf>,

    /// Feature names of the training set.
    #[structopt(long)]
    train_features: Option<PathBuf>,

    /// Read at most this many training rows (0 reads all of them).
    #[structopt(long, default_value = "0")]
    train_rows: usize,

    /// Number of training rows to preallocate room for.
    #[structopt(long, default_value = "0")]
    train_alloc: usize,

    /// Validation set, scored after every epoch but never trained on.
    #[structopt(long)]
    valid: Option<PathBuf>,

    #[structopt(long)]
    valid_weights: Option<PathBuf>,

    #[structopt(long)]
    valid_features: Option<PathBuf>,

    #[structopt(long, default_value = "0")]
    valid_rows: usize,

    #[structopt(long, default_value = "0")]
    valid_alloc: usize,

    #[structopt(long, default_value = "0.15")]
    alpha: f64,

    #[structopt(long, default_value = "1.0")]
    beta: f64,

    /// L1 regularization.
    #[structopt(long, default_value = "0.5")]
    l1: f64,

    /// L2 regularization.
    #[structopt(long, default_value = "1.0")]
    l2: f64,

    /// Bound on the absolute gradient of a sample.
    #[structopt(long, default_value = "1000")]
    clip: f64,

    /// Accepted but not used: training always runs every epoch.
    #[structopt(long, default_value = "1e-4")]
    tol: f64,

    /// Accepted but not used.
    #[structopt(long, default_value = "0")]
    dropout: f64,

    #[structopt(long, default_value = "10")]
    epochs: usize,

    /// Link function: sigmoid, identity or exponential (or b, g, p).
    #[structopt(long, default_value = "sigmoid")]
    activation: Activation,

    /// Write the learned weights here, one `index:weight` line per feature.
    #[structopt(long)]
    model: Option<PathBuf>,

    /// Keep rows as parsed observations (cache) or in one CSR matrix (csr).
    #[structopt(
        long,
        default_value = "cache",
        possible_values = &Backend::variants(),
        case_insensitive = true
    )]
    backend: Backend,

    /// With the csr backend, ignore feature values (every value is 1).
    #[structopt(long)]
    binary: bool,

    /// Keep the hash map weight store instead of switching to a dense array
    /// once the number of features is known.
    #[structopt(long)]
    sparse_weights: bool,

    /// Worker threads for parsing and training.
    #[structopt(long)]
    workers: Option<usize>,

    /// Report this many of the strongest weights after training.
    #[structopt(long, default_value = "0")]
    top: usize,
}

/// One input set and how to read it.
struct Input {
    data: PathBuf,
    weights: PathBuf,
    features: PathBuf,
    rows: usize,
    alloc: usize,
}

struct Loaded {
    examples: Box<dyn Examples>,
    feature_names: Vec<String>,
}

fn load(input: &Input, backend: Backend, binary: bool) -> Result<Loaded, Box<dyn Error>> {
    let max_rows = if input.rows == 0 { None } else { Some(input.rows) };
    let loaded = match backend {
        Backend::Cache => {
            let mut ingest = Ingest::new(&input.data)
                .weights(&input.weights)
                .feature_names(&input.features)
                .prealloc(input.alloc);
            if let Some(max) = max_rows {
                ingest = ingest.max_rows(max);
            }
            let dataset = ingest.read()?;
            let feature_names = dataset.feature_names().to_vec();
            Loaded {
                examples: Box::new(dataset),
                feature_names,
            }
        }
        Backend::Csr => {
            let mut dataset = CsrDataset::from_svm_file(&input.data, max_rows, binary)?;
            if !input.weights.as_os_str().is_empty() {
                dataset.load_sample_weights(&input.weights)?;
            }
            if !input.features.as_os_str().is_empty() {
                dataset.load_feature_names(&input.features)?;
            }
            dataset.cache_rows();
            info!(
                "{:?}: sparsity {:.6}, mean target {:.6}",
                input.data,
                dataset.sparsity(),
                dataset.mean_target()
            );
            let feature_names = dataset.feature_names().to_vec();
            Loaded {
                examples: Box::new(dataset),
                feature_names,
            }
        }
    };
    info!("{:?}\n{}", input.data, loaded.examples.stats());
    Ok(loaded)
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let opt = Opt::from_args();

    let params = Params {
        alpha: opt.alpha,
        beta: opt.beta,
        lambda1: opt.l1,
        lambda2: opt.l2,
        grad_clip: opt.clip,
        dropout: opt.dropout,
        tol: opt.tol,
        epochs: opt.epochs,
        activation: opt.activation,
    };
    let model = Ftrl::new(params)?;

    if let Some(workers) = opt.workers {
        rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .build_global()?;
    }

    let train = load(
        &Input {
            data: opt.train.clone(),
            weights: opt.train_weights.clone().unwrap_or_default(),
            features: opt.train_features.clone().unwrap_or_default(),
            rows: opt.train_rows,
            alloc: opt.train_alloc,
        },
        opt.backend,
        opt.binary,
    )?;
    let valid = match &opt.valid {
        Some(path) => Some(load(
            &Input {
                data: path.clone(),
                weights: opt.valid_weights.clone().unwrap_or_default(),
                features: opt.valid_features.clone().unwrap_or_default(),
                rows: opt.valid_rows,
                alloc: opt.valid_alloc,
            },
            opt.backend,
            opt.binary,
        )?),
        None => None,
    };

    let mut trainer =
        Trainer::new(model, train.examples.as_ref()).dense_weights(!opt.sparse_weights);
    if let Some(valid) = &valid {
        trainer = trainer.validation(valid.examples.as_ref());
    }
    trainer.run()?;
    let model = trainer.into_model();

    for (rank, (key, w)) in model.strongest_weights(opt.top).into_iter().enumerate() {
        let name = train
            .feature_names
            .get(key as usize)
            .map_or("", String::as_str);
        info!("{:>4}. {:>10} {:<24} {:.6}", rank + 1, key, name, w);
    }

    if let Some(path) = &opt.model {
        let max_index = model
            .weights()
            .max_key()
            .into_iter()
            .chain(train.examples.max_feature())
            .chain(valid.as_ref().and_then(|v| v.examples.max_feature()))
            .max()
            .unwrap_or(0);
        model.save(path, max_index)?;
    }
    Ok(())
}
