//! A labeled dataset stored as one compressed sparse row matrix, as an
//! alternative to the per-observation cache.

use std::borrow::Cow;
use std::path::Path;
use std::time::Instant;

use log::{info, warn};

use crate::dataset::Examples;
use crate::error::{Error, Result};
use crate::ingest::read_feature_names;
use crate::matrix::{CooMatrix, CsrMatrix};
use crate::sample::Feature;
use crate::scanner::MappedFile;
use crate::svmlight;

#[derive(Debug, Clone)]
pub struct CsrDataset {
    labels: Vec<u8>,
    weights: Option<Vec<f64>>,
    matrix: CsrMatrix,
    feature_names: Vec<String>,
    max_feature: Option<u32>,
}

impl CsrDataset {
    pub fn new(labels: Vec<u8>, matrix: CsrMatrix) -> Self {
        assert_eq!(labels.len(), matrix.nrows(), "one label per row");
        let max_feature = matrix.indices().iter().copied().max();
        CsrDataset {
            labels,
            weights: None,
            matrix,
            feature_names: vec![],
            max_feature,
        }
    }

    /// Reads an svmlight file sequentially, keeping at most `max_rows` rows.
    pub fn from_svm_file(path: &Path, max_rows: Option<usize>, binary: bool) -> Result<Self> {
        let start = Instant::now();
        let file = MappedFile::open(path)?;
        let mut coo = CooMatrix::new(binary);
        let mut labels = vec![];
        let limit = max_rows.unwrap_or(usize::MAX);
        for (i, bytes) in file.lines().take(limit).enumerate() {
            let features = svmlight::parse(i + 1, bytes)?;
            labels.push(features.target()?);
            for feature in features {
                let Feature { key, value } = feature?;
                // a present token counts as 1 in binary mode, even `k:0`
                coo.set(i, key, if binary { 1.0 } else { value });
            }
        }
        coo.reserve_rows(labels.len());
        let matrix = CsrMatrix::from_coo(&coo);
        info!(
            "read {} rows, {} nonzeros from {:?} in {:.0?}",
            labels.len(),
            matrix.nnz(),
            path,
            start.elapsed()
        );
        Ok(Self::new(labels, matrix))
    }

    /// One weight per line. A file with fewer weights than rows is an error;
    /// extra lines are ignored.
    pub fn load_sample_weights(&mut self, path: &Path) -> Result<()> {
        let file = MappedFile::open(path)?;
        let mut lines = file.lines();
        let weights = (0..self.labels.len())
            .map(|i| {
                let line = i + 1;
                let bytes = lines.next().ok_or(Error::MissingWeight { line })?;
                svmlight::parse_weight(line, bytes)
            })
            .collect::<Result<Vec<_>>>()?;
        let extra = lines.count();
        if extra > 0 {
            warn!("{} weights beyond the last row of the data were ignored", extra);
        }
        self.weights = Some(weights);
        Ok(())
    }

    pub fn load_feature_names(&mut self, path: &Path) -> Result<()> {
        self.feature_names = read_feature_names(path)?;
        Ok(())
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn cache_rows(&mut self) {
        self.matrix.cache_rows()
    }

    pub fn matrix(&self) -> &CsrMatrix {
        &self.matrix
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Fraction of the `rows x cols` cells that are empty.
    pub fn sparsity(&self) -> f64 {
        let (rows, cols) = self.matrix.shape();
        let cells = rows as f64 * cols as f64;
        if cells == 0.0 {
            return 1.0;
        }
        1.0 - self.matrix.nnz() as f64 / cells
    }

    /// Weighted fraction of positive labels, 0 for an empty dataset.
    pub fn mean_target(&self) -> f64 {
        let total = self.weight_sum();
        if total == 0.0 {
            return 0.0;
        }
        let positive: f64 = (0..self.nrows())
            .filter(|&i| self.labels[i] == 1)
            .map(|i| self.sample_weight(i))
            .sum();
        positive / total
    }
}

impl Examples for CsrDataset {
    fn nrows(&self) -> usize {
        self.labels.len()
    }

    fn features(&self, i: usize) -> Cow<'_, [Feature]> {
        self.matrix.row(i)
    }

    fn label(&self, i: usize) -> u8 {
        self.labels[i]
    }

    fn sample_weight(&self, i: usize) -> f64 {
        self.weights.as_ref().map_or(1.0, |w| w[i])
    }

    fn weight_sum(&self) -> f64 {
        match &self.weights {
            Some(w) => w.iter().sum(),
            None => self.labels.len() as f64,
        }
    }

    fn nnz(&self) -> usize {
        self.matrix.nnz()
    }

    fn max_feature(&self) -> Option<u32> {
        self.max_feature
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::Ingest;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn file(contents: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn reads_svm_file() {
        let data = file("1 1:1.0 3:2.0\n0 2:1.0\n0\n");
        let d = CsrDataset::from_svm_file(data.path(), None, false).unwrap();
        assert_eq!(d.nrows(), 3);
        assert_eq!(d.matrix().indptr(), &[0, 2, 3, 3]);
        assert_eq!(d.max_feature(), Some(3));
        assert_eq!(d.weight_sum(), 3.0);
        assert_eq!(d.labels(), &[1, 0, 0]);
        assert_eq!(&*d.features(0), &[Feature::new(1, 1.0), Feature::new(3, 2.0)][..]);
    }

    #[test]
    fn agrees_with_observation_cache() {
        let mut contents = String::new();
        for i in 0..50u32 {
            contents.push_str(&format!("{} {}:{} {}:0.5\n", i % 2, i, i + 1, i + 100));
        }
        let data = file(&contents);
        let cache = Ingest::new(data.path()).workers(1).read().unwrap();
        let mut csr = CsrDataset::from_svm_file(data.path(), None, false).unwrap();
        csr.cache_rows();
        assert_eq!(csr.stats(), cache.stats());
        for i in 0..cache.nrows() {
            assert_eq!(csr.features(i), cache.features(i));
            assert_eq!(csr.label(i), cache.label(i));
        }
    }

    #[test]
    fn max_rows_and_binary() {
        let data = file("1 1:3.0\n0 2:4.0\n1 3:5.0\n");
        let d = CsrDataset::from_svm_file(data.path(), Some(2), true).unwrap();
        assert_eq!(d.nrows(), 2);
        assert_eq!(&*d.features(1), &[Feature::new(2, 1.0)][..]);
    }

    #[test]
    fn binary_keeps_explicit_zeros() {
        let data = file("1 1:0 2:3\n");
        let binary = CsrDataset::from_svm_file(data.path(), None, true).unwrap();
        assert!(binary.matrix().is_binary());
        assert_eq!(binary.nnz(), 2);
        assert_eq!(
            &*binary.features(0),
            &[Feature::new(1, 1.0), Feature::new(2, 1.0)][..]
        );
        let cache = Ingest::new(data.path()).read().unwrap();
        assert_eq!(binary.nnz(), cache.nnz());

        let valued = CsrDataset::from_svm_file(data.path(), None, false).unwrap();
        assert!(!valued.matrix().is_binary());
        assert_eq!(&*valued.features(0), &[Feature::new(2, 3.0)][..]);
    }

    #[test]
    fn sample_weights() {
        let data = file("1 1:1\n0 2:1\n1 3:1\n");
        let mut d = CsrDataset::from_svm_file(data.path(), None, false).unwrap();
        let weights = file("2\n1\n1\n9\n");
        d.load_sample_weights(weights.path()).unwrap();
        assert_eq!(d.weight_sum(), 4.0);
        assert_eq!(d.sample_weight(0), 2.0);
        assert!((d.mean_target() - 0.75).abs() < 1e-12);

        let short = file("1\n");
        assert!(matches!(
            d.load_sample_weights(short.path()),
            Err(Error::MissingWeight { line: 2 })
        ));
    }

    #[test]
    fn sparsity_of_diagonal() {
        let data = file("1 0:1\n0 1:1\n1 2:1\n0 3:1\n");
        let d = CsrDataset::from_svm_file(data.path(), None, false).unwrap();
        assert!((d.sparsity() - 0.75).abs() < 1e-12);
        assert!((d.mean_target() - 0.5).abs() < 1e-12);
    }
}
