//! Concurrent ingestion of a data file and its parallel weights file into a
//! [`Dataset`].
//!
//! The pipeline has three stages connected by bounded queues:
//!
//!   1. one scanner (the calling thread) walks both files in lockstep, so
//!      line i of the data is always paired with line i of the weights;
//!   2. a pool of parser workers turns raw line pairs into observations;
//!   3. one consumer appends observations to the dataset.
//!
//! A full queue blocks its producer, which bounds memory no matter how large
//! the input. Observations reach the dataset in whatever order the workers
//! finish them.
//!
//! The scanner hands out slices of the memory-mapped files rather than owned
//! lines, which is why the stages run in a `std::thread::scope`.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::panic;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Instant;

use crossbeam_channel::{bounded, Receiver, Sender};
use log::{debug, info, warn};

use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::sample::Observation;
use crate::scanner::MappedFile;
use crate::svmlight;

/// Queue capacity, per parser worker.
const QUEUE_DEPTH: usize = 4;

/// Rows between progress messages.
const PROGRESS_EVERY: usize = 1_000_000;

/// One unparsed line pair. `line` is 1-based.
struct RawLine<'a> {
    line: usize,
    data: &'a [u8],
    weight: Option<&'a [u8]>,
}

/// Reader configuration for one svmlight data file, its optional weights
/// file and its optional feature-names file.
#[derive(Debug, Clone)]
pub struct Ingest {
    data: PathBuf,
    weights: Option<PathBuf>,
    feature_names: Option<PathBuf>,
    max_rows: Option<usize>,
    prealloc: usize,
    workers: usize,
}

impl Ingest {
    pub fn new(data: impl Into<PathBuf>) -> Self {
        Ingest {
            data: data.into(),
            weights: None,
            feature_names: None,
            max_rows: None,
            prealloc: 0,
            workers: rayon::current_num_threads(),
        }
    }

    /// An empty path means no weights file (every weight is 1).
    pub fn weights(mut self, path: impl Into<PathBuf>) -> Self {
        self.weights = nonempty(path.into());
        self
    }

    pub fn feature_names(mut self, path: impl Into<PathBuf>) -> Self {
        self.feature_names = nonempty(path.into());
        self
    }

    /// Read at most `n` lines of the data file.
    pub fn max_rows(mut self, n: usize) -> Self {
        self.max_rows = Some(n);
        self
    }

    /// Number of observations to reserve room for up front.
    pub fn prealloc(mut self, n: usize) -> Self {
        self.prealloc = n;
        self
    }

    /// Number of parser workers; at least one is always used.
    pub fn workers(mut self, n: usize) -> Self {
        self.workers = n.max(1);
        self
    }

    pub fn read(&self) -> Result<Dataset> {
        let mut dataset = Dataset::with_capacity(self.prealloc);
        self.fill(&mut dataset)?;
        Ok(dataset)
    }

    /// Appends every observation to `dataset`, returning the number of lines
    /// scanned. On any I/O or parse error `dataset` is left as it was.
    pub fn read_into(&self, dataset: &mut Dataset) -> Result<usize> {
        let mut staged = Dataset::with_capacity(self.prealloc);
        let nlines = self.fill(&mut staged)?;
        if !staged.feature_names().is_empty() {
            dataset.set_feature_names(staged.feature_names().to_vec());
        }
        dataset.extend(staged.into_observations());
        Ok(nlines)
    }

    /// Reads into a dataset that is thrown away on error.
    fn fill(&self, dataset: &mut Dataset) -> Result<usize> {
        let start = Instant::now();
        let data = MappedFile::open(&self.data)?;
        let weights = match &self.weights {
            Some(path) => Some(MappedFile::open(path)?),
            None => None,
        };
        let names = match &self.feature_names {
            Some(path) => Some(read_feature_names(path)?),
            None => None,
        };

        let nlines = self.run_pipeline(&data, weights.as_ref(), dataset)?;
        if let Some(names) = names {
            dataset.set_feature_names(names);
        }
        info!(
            "read {} rows from {:?} in {:.0?}",
            dataset.observations().len(),
            self.data,
            start.elapsed()
        );
        Ok(nlines)
    }

    fn run_pipeline(
        &self,
        data: &MappedFile,
        weights: Option<&MappedFile>,
        dataset: &mut Dataset,
    ) -> Result<usize> {
        let depth = QUEUE_DEPTH * self.workers;
        let (raw_tx, raw_rx) = bounded::<RawLine<'_>>(depth);
        let (obs_tx, obs_rx) = bounded::<Result<Observation>>(depth);

        thread::scope(|s| {
            for _ in 0..self.workers {
                let raw_rx = raw_rx.clone();
                let obs_tx = obs_tx.clone();
                s.spawn(move || parse_worker(raw_rx, obs_tx));
            }
            // the workers own the remaining endpoints, so the queues close
            // once the scanner and then the workers are done
            drop(raw_rx);
            drop(obs_tx);

            let consumer = s.spawn(move || consume(obs_rx, dataset));
            let scanned = self.scan(data, weights, raw_tx);
            let consumed = consumer
                .join()
                .unwrap_or_else(|payload| panic::resume_unwind(payload));
            // a parse error stops the consumer, which in turn stops the
            // scanner; report the root cause
            consumed?;
            scanned
        })
    }

    /// Pushes line pairs until the data runs out or `max_rows` is reached.
    fn scan<'a>(
        &self,
        data: &'a MappedFile,
        weights: Option<&'a MappedFile>,
        out: Sender<RawLine<'a>>,
    ) -> Result<usize> {
        let mut weight_lines = weights.map(|w| w.lines());
        let mut nlines = 0;
        for (i, bytes) in data.lines().enumerate() {
            if self.max_rows.map_or(false, |max| i >= max) {
                break;
            }
            let line = i + 1;
            let weight = match weight_lines.as_mut() {
                Some(lines) => Some(lines.next().ok_or(Error::MissingWeight { line })?),
                None => None,
            };
            if out.send(RawLine { line, data: bytes, weight }).is_err() {
                debug!("scanner stopped at line {}, consumer hung up", line);
                break;
            }
            nlines = line;
            if nlines % PROGRESS_EVERY == 0 {
                info!("scanned {} rows of {:?}", nlines, data.path());
            }
        }
        if self.max_rows.is_none() {
            if let Some(extra) = weight_lines.map(|lines| lines.count()) {
                if extra > 0 {
                    warn!("{} weights beyond the last data line were ignored", extra);
                }
            }
        }
        Ok(nlines)
    }
}

fn parse_worker(input: Receiver<RawLine<'_>>, output: Sender<Result<Observation>>) {
    for raw in input {
        let parsed = svmlight::parse_observation(raw.line, raw.data, raw.weight);
        if output.send(parsed).is_err() {
            break;
        }
    }
}

fn consume(input: Receiver<Result<Observation>>, dataset: &mut Dataset) -> Result<()> {
    for (n, parsed) in input.into_iter().enumerate() {
        dataset.add(parsed?);
        if (n + 1) % PROGRESS_EVERY == 0 {
            info!("cached {} rows", n + 1);
        }
    }
    Ok(())
}

/// One feature name per line, in feature index order.
pub fn read_feature_names(path: &Path) -> Result<Vec<String>> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    BufReader::new(file)
        .lines()
        .map(|line| line.map(|l| l.trim_end().to_owned()))
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|e| Error::io(path, e))
}

fn nonempty(path: PathBuf) -> Option<PathBuf> {
    if path.as_os_str().is_empty() {
        None
    } else {
        Some(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Examples;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn sorted_keys(d: &Dataset) -> Vec<Vec<u32>> {
        let mut rows: Vec<Vec<u32>> = d
            .observations()
            .iter()
            .map(|o| o.x.iter().map(|f| f.key).collect())
            .collect();
        rows.sort();
        rows
    }

    #[test]
    fn reads_data_with_weights() {
        let data = file("1 1:1.0 3:2.0\n0 2:1.0\n");
        let weights = file("2.0\n1.0\n");
        let d = Ingest::new(data.path())
            .weights(weights.path())
            .workers(3)
            .read()
            .unwrap();
        assert_eq!(d.nrows(), 2);
        assert_eq!(d.weight_sum(), 3.0);
        assert_eq!(d.nnz(), 3);
        assert_eq!(d.max_feature(), Some(3));
        // pairing survives the unordered output queue
        for o in d.observations() {
            match o.y {
                1 => assert_eq!(o.w, 2.0),
                _ => assert_eq!(o.w, 1.0),
            }
        }
    }

    #[test]
    fn missing_weights_file_means_unit_weights() {
        let data = file("1 1:1\n0 2:1\n1 3:1\n");
        let d = Ingest::new(data.path()).weights("").read().unwrap();
        assert_eq!(d.nrows(), 3);
        assert_eq!(d.weight_sum(), d.nrows() as f64);
    }

    #[test]
    fn max_rows_keeps_every_queued_line() {
        let mut contents = String::new();
        for i in 0..1000 {
            contents.push_str(&format!("{} {}:1\n", i % 2, i));
        }
        let data = file(&contents);
        let d = Ingest::new(data.path())
            .max_rows(777)
            .workers(4)
            .read()
            .unwrap();
        assert_eq!(d.nrows(), 777);
        let expected: Vec<Vec<u32>> = (0..777).map(|i| vec![i]).collect();
        assert_eq!(sorted_keys(&d), expected);
    }

    #[test]
    fn parse_error_aborts_read() {
        let mut contents = String::new();
        for i in 0..500 {
            contents.push_str(&format!("1 {}:1\n", i));
        }
        contents.push_str("1 oops:1\n");
        let data = file(&contents);
        match Ingest::new(data.path()).workers(2).read() {
            Err(Error::Parse { line: 501, .. }) => {}
            other => panic!("unexpected {:?}", other.map(|d| d.nrows())),
        }
    }

    #[test]
    fn failed_read_into_leaves_dataset_untouched() {
        let good = file("1 1:1\n0 2:1\n");
        let ingest = Ingest::new(good.path()).weights("");
        let mut d = Dataset::default();
        ingest.read_into(&mut d).unwrap();

        let mut contents = String::new();
        for i in 0..500 {
            contents.push_str(&format!("1 {}:1\n", i));
        }
        contents.push_str("1 oops:1\n");
        let bad = file(&contents);
        assert!(Ingest::new(bad.path()).workers(2).read_into(&mut d).is_err());
        assert_eq!(d.nrows(), 2);
        assert_eq!(d.weight_sum(), 2.0);
        assert_eq!(d.nnz(), 2);
        assert_eq!(d.max_feature(), Some(2));
    }

    #[test]
    fn short_weights_file_is_fatal() {
        let data = file("1 1:1\n0 2:1\n");
        let weights = file("1.0\n");
        match Ingest::new(data.path()).weights(weights.path()).read() {
            Err(Error::MissingWeight { line: 2 }) => {}
            other => panic!("unexpected {:?}", other.map(|d| d.nrows())),
        }
    }

    #[test]
    fn unreadable_data_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let result = Ingest::new(dir.path().join("missing.svm")).read();
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn loads_feature_names() {
        let data = file("1 0:1 1:1\n");
        let names = file("clicks\nimpressions\n");
        let d = Ingest::new(data.path())
            .feature_names(names.path())
            .read()
            .unwrap();
        assert_eq!(d.feature_names(), &["clicks".to_owned(), "impressions".to_owned()][..]);
    }

    #[test]
    fn read_into_appends() {
        let data = file("1 1:1\n");
        let ingest = Ingest::new(data.path());
        let mut d = Dataset::default();
        assert_eq!(ingest.read_into(&mut d).unwrap(), 1);
        assert_eq!(ingest.read_into(&mut d).unwrap(), 1);
        assert_eq!(d.nrows(), 2);
        assert_eq!(d.weight_sum(), 2.0);
    }
}
