//! Coordinate-list and compressed-sparse-row matrices.
//!
//! A `CooMatrix` is the cheap append-only builder; `CsrMatrix::from_coo`
//! compresses it with a counting sort over rows. Binary matrices store no
//! values at all and every stored entry reads back as 1.

use std::borrow::Cow;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Instant;

use byte_slice_cast::{AsByteSlice, IntoByteVec};
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::sample::{Feature, Sample};

/// Unordered `(row, col, value)` triplets.
#[derive(Debug, Clone, Default)]
pub struct CooMatrix {
    rows: Vec<usize>,
    cols: Vec<u32>,
    vals: Vec<f64>,
    binary: bool,
    nrows: usize,
    ncols: usize,
}

impl CooMatrix {
    pub fn new(binary: bool) -> Self {
        CooMatrix {
            binary,
            ..Default::default()
        }
    }

    /// Stores `v` at `(i, j)`. Explicit zeros are not stored.
    pub fn set(&mut self, i: usize, j: u32, v: f64) {
        if v == 0.0 {
            return;
        }
        self.rows.push(i);
        self.cols.push(j);
        if !self.binary {
            self.vals.push(v);
        }
        self.nrows = self.nrows.max(i + 1);
        self.ncols = self.ncols.max(j as usize + 1);
    }

    /// Makes sure the matrix has at least `n` rows, so trailing rows without
    /// any entry still count.
    pub fn reserve_rows(&mut self, n: usize) {
        self.nrows = self.nrows.max(n);
    }

    /// Permutes the stored entries. Compressing afterwards yields the same
    /// rows, possibly with their entries in another order.
    pub fn shuffle(&mut self, seed: u64) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut perm: Vec<usize> = (0..self.nnz()).collect();
        perm.shuffle(&mut rng);
        self.rows = perm.iter().map(|&p| self.rows[p]).collect();
        self.cols = perm.iter().map(|&p| self.cols[p]).collect();
        if !self.binary {
            self.vals = perm.iter().map(|&p| self.vals[p]).collect();
        }
    }

    /// `(rows, cols)`
    pub fn shape(&self) -> (usize, usize) {
        (self.nrows, self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.rows.len()
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }
}

/// Compressed sparse rows: row `i` owns `indices[indptr[i]..indptr[i + 1]]`
/// (and the same range of `data` unless the matrix is binary).
#[derive(Debug, Clone)]
pub struct CsrMatrix {
    indptr: Vec<usize>,
    indices: Vec<u32>,
    data: Vec<f64>,
    binary: bool,
    ncols: usize,
    cache: Option<Vec<Sample>>,
}

impl CsrMatrix {
    pub fn from_coo(coo: &CooMatrix) -> Self {
        let nrows = coo.nrows;
        let nnz = coo.nnz();
        let mut indptr = vec![0usize; nrows + 1];
        let mut indices = vec![0u32; nnz];
        let mut data = if coo.binary { vec![] } else { vec![0f64; nnz] };

        for &r in &coo.rows {
            indptr[r] += 1;
        }

        // exclusive prefix sum: indptr[i] becomes the start of row i
        let mut cumsum = 0;
        for count in indptr.iter_mut() {
            let c = *count;
            *count = cumsum;
            cumsum += c;
        }

        // scatter, bumping each row's start as it fills; afterwards
        // indptr[i] holds the end of row i, which is the start of row i + 1
        for (e, &r) in coo.rows.iter().enumerate() {
            let dest = indptr[r];
            indices[dest] = coo.cols[e];
            if !coo.binary {
                data[dest] = coo.vals[e];
            }
            indptr[r] += 1;
        }

        // shift the ends back into starts
        let mut last = 0;
        for ptr in indptr.iter_mut().take(nrows) {
            std::mem::swap(ptr, &mut last);
        }
        indptr[nrows] = nnz;

        CsrMatrix {
            indptr,
            indices,
            data,
            binary: coo.binary,
            ncols: coo.ncols,
            cache: None,
        }
    }

    pub fn build_row(&self, i: usize) -> Sample {
        Sample::from(self.row_features(i))
    }

    fn row_features(&self, i: usize) -> Vec<Feature> {
        let (l, r) = (self.indptr[i], self.indptr[i + 1]);
        let keys = &self.indices[l..r];
        if self.binary {
            keys.iter().map(|&k| Feature::new(k, 1.0)).collect()
        } else {
            keys.iter()
                .zip(&self.data[l..r])
                .map(|(&k, &v)| Feature::new(k, v))
                .collect()
        }
    }

    /// Materializes every row up front, in parallel over contiguous chunks of
    /// rows.
    pub fn cache_rows(&mut self) {
        let start = Instant::now();
        let nrows = self.nrows();
        let mut cache = vec![Sample::default(); nrows];
        let chunk = (nrows / rayon::current_num_threads()).max(1);
        {
            let this = &*self;
            cache
                .par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(c, rows)| {
                    for (offset, slot) in rows.iter_mut().enumerate() {
                        *slot = this.build_row(c * chunk + offset);
                    }
                });
        }
        self.cache = Some(cache);
        debug!("cached {} csr rows in {:.0?}", nrows, start.elapsed());
    }

    pub fn is_cached(&self) -> bool {
        self.cache.is_some()
    }

    /// Row `i`, borrowed from the cache when rows were cached.
    pub fn row(&self, i: usize) -> Cow<'_, [Feature]> {
        match &self.cache {
            Some(cache) => Cow::Borrowed(cache[i].features()),
            None => Cow::Owned(self.row_features(i)),
        }
    }

    pub fn indptr(&self) -> &[usize] {
        &self.indptr
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Stored values; empty for binary matrices.
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn nrows(&self) -> usize {
        self.indptr.len() - 1
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.nrows(), self.ncols)
    }

    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Writes `<base>.indptr.bin` (u64), `<base>.indices.bin` (u32) and,
    /// unless binary, `<base>.data.bin` (f64) as flat native-endian arrays,
    /// loadable with an appropriately-typed `np.fromfile`.
    pub fn write_bins(&self, base: &Path) -> Result<Vec<PathBuf>> {
        let mut written = vec![];
        let indptr: Vec<u64> = self.indptr.iter().map(|&p| p as u64).collect();
        written.push(write_bin(base, "indptr.bin", &indptr.into_byte_vec())?);
        written.push(write_bin(base, "indices.bin", self.indices.as_byte_slice())?);
        if !self.binary {
            written.push(write_bin(base, "data.bin", self.data.as_byte_slice())?);
        }
        Ok(written)
    }
}

fn write_bin(base: &Path, suffix: &str, bytes: &[u8]) -> Result<PathBuf> {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    let path = PathBuf::from(name);
    File::create(&path)
        .and_then(|mut f| f.write_all(bytes))
        .map_err(|e| Error::io(&path, e))?;
    Ok(path)
}
