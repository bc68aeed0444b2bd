//! Per-feature FTRL-Proximal state and the concurrent stores that hold it.
//!
//! Every entry lives behind its own lock, so shards training in parallel only
//! contend when they touch the same feature. Entries are created lazily with
//! all-zero state on a feature's first update and are never removed.

use std::sync::atomic::{AtomicUsize, Ordering};

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock, RwLockWriteGuard};

use crate::error::{Error, Result};
use crate::hasher::BuildKeyHasher;
use crate::params::Params;

/// Accumulators of one coordinate. `w` caches the last materialized weight
/// and is always a function of `(z, n)`.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightState {
    /// Sum of squared gradients.
    pub n: f64,
    /// Adjusted gradient sum.
    pub z: f64,
    pub w: f64,
}

impl WeightState {
    /// Recomputes (and caches) the weight from the accumulators.
    pub fn materialize(&mut self, params: &Params) -> f64 {
        self.w = weight_of(self.z, self.n, params);
        self.w
    }

    /// Applies gradient `gi` for this coordinate. The weight entering the
    /// update is the one implied by the state before it.
    pub fn update(&mut self, gi: f64, params: &Params) {
        let w_pre = self.materialize(params);
        let gi2 = gi * gi;
        let sigma = ((self.n + gi2).sqrt() - self.n.sqrt()) / params.alpha;
        self.z += gi - sigma * w_pre;
        self.n += gi2;
    }
}

/// The FTRL-Proximal closed form for the weight of a coordinate.
pub fn weight_of(z: f64, n: f64, params: &Params) -> f64 {
    if z.abs() <= params.lambda1 {
        return 0.0;
    }
    let sign = if z < 0.0 { -1.0 } else { 1.0 };
    (sign * params.lambda1 - z) / ((params.beta + n.sqrt()) / params.alpha + params.lambda2)
}

/// Aggregate view of materialized weights. `min` and `max` start from zero.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeightSummary {
    pub count: usize,
    pub nonzero: usize,
    pub min: f64,
    pub max: f64,
}

/// A store of weight states shared by concurrent readers and writers.
pub trait WeightKeeper: Sync {
    /// Runs `f` on the entry for `key` under its lock, if the entry exists.
    fn with_entry<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Option<R>;

    /// Runs `f` on the entry for `key` under its lock, creating a zero entry
    /// first when there is none.
    fn get_or_insert<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Result<R>;

    /// Visits every entry, in no particular order.
    fn for_each(&self, f: impl FnMut(u32, &mut WeightState));

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, key: u32) -> Option<WeightState> {
        self.with_entry(key, |s| *s)
    }

    /// The current weight of `key`, 0 for features never updated.
    fn materialized_weight(&self, key: u32, params: &Params) -> f64 {
        self.with_entry(key, |s| s.materialize(params))
            .unwrap_or(0.0)
    }

    fn max_key(&self) -> Option<u32> {
        let mut max = None;
        self.for_each(|k, _| max = Some(max.map_or(k, |m: u32| m.max(k))));
        max
    }

    fn summary(&self, params: &Params) -> WeightSummary {
        let mut summary = WeightSummary::default();
        self.for_each(|_, s| {
            let w = s.materialize(params);
            summary.count += 1;
            if w != 0.0 {
                summary.nonzero += 1;
            }
            summary.min = summary.min.min(w);
            summary.max = summary.max.max(w);
        });
        summary
    }
}

/// Hash map store for an unknown or huge key space. Steady-state updates take
/// the map's read lock and one entry lock; only new keys take the write lock.
#[derive(Debug, Default)]
pub struct SparseWeights {
    map: RwLock<HashMap<u32, Mutex<WeightState>, BuildKeyHasher>>,
}

impl SparseWeights {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_entries(self) -> impl Iterator<Item = (u32, WeightState)> {
        self.map
            .into_inner()
            .into_iter()
            .map(|(k, state)| (k, state.into_inner()))
    }
}

impl WeightKeeper for SparseWeights {
    fn with_entry<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Option<R> {
        let map = self.map.read();
        map.get(&key).map(|entry| f(&mut entry.lock()))
    }

    fn get_or_insert<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Result<R> {
        {
            let map = self.map.read();
            if let Some(entry) = map.get(&key) {
                return Ok(f(&mut entry.lock()));
            }
        }
        let mut map = self.map.write();
        // another writer may have inserted it between the two locks
        map.entry(key).or_insert_with(Default::default);
        let map = RwLockWriteGuard::downgrade(map);
        let entry = &map[&key];
        let r = f(&mut entry.lock());
        Ok(r)
    }

    fn for_each(&self, mut f: impl FnMut(u32, &mut WeightState)) {
        let map = self.map.read();
        for (&k, entry) in map.iter() {
            f(k, &mut entry.lock());
        }
    }

    fn len(&self) -> usize {
        self.map.read().len()
    }
}

/// Array store for a key space of known size. No map lock; keys at or beyond
/// the capacity can't be inserted.
#[derive(Debug, Default)]
pub struct DenseWeights {
    slots: Vec<Mutex<Option<WeightState>>>,
    len: AtomicUsize,
}

impl DenseWeights {
    pub fn with_capacity(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, Default::default);
        DenseWeights {
            slots,
            len: AtomicUsize::new(0),
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Extends the key space to `capacity`. Never shrinks.
    pub fn grow(&mut self, capacity: usize) {
        if capacity > self.slots.len() {
            self.slots.resize_with(capacity, Default::default);
        }
    }

    fn from_entries(capacity: usize, entries: impl Iterator<Item = (u32, WeightState)>) -> Self {
        let mut dense = Self::with_capacity(capacity);
        let mut len = 0;
        for (k, state) in entries {
            *dense.slots[k as usize].get_mut() = Some(state);
            len += 1;
        }
        *dense.len.get_mut() = len;
        dense
    }
}

impl WeightKeeper for DenseWeights {
    fn with_entry<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Option<R> {
        let mut slot = self.slots.get(key as usize)?.lock();
        slot.as_mut().map(f)
    }

    fn get_or_insert<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Result<R> {
        let slot = self.slots.get(key as usize).ok_or(Error::KeyOutOfRange {
            key,
            capacity: self.slots.len(),
        })?;
        let mut slot = slot.lock();
        if slot.is_none() {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        Ok(f(slot.get_or_insert_with(Default::default)))
    }

    fn for_each(&self, mut f: impl FnMut(u32, &mut WeightState)) {
        for (k, slot) in self.slots.iter().enumerate() {
            if let Some(state) = slot.lock().as_mut() {
                f(k as u32, state);
            }
        }
    }

    fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }
}

/// The store a model trains against: sparse until the key space is known,
/// then optionally dense.
#[derive(Debug)]
pub enum WeightStore {
    Sparse(SparseWeights),
    Dense(DenseWeights),
}

impl Default for WeightStore {
    fn default() -> Self {
        WeightStore::Sparse(SparseWeights::new())
    }
}

impl WeightStore {
    /// Switches to a dense store covering keys `0..capacity`, keeping every
    /// entry. Fails, leaving the store untouched, if an existing key doesn't
    /// fit.
    pub fn densify(&mut self, capacity: usize) -> Result<()> {
        match self {
            WeightStore::Dense(dense) => {
                dense.grow(capacity);
                Ok(())
            }
            WeightStore::Sparse(sparse) => {
                if let Some(key) = sparse.max_key() {
                    if key as usize >= capacity {
                        return Err(Error::KeyOutOfRange { key, capacity });
                    }
                }
                let sparse = std::mem::take(sparse);
                *self = WeightStore::Dense(DenseWeights::from_entries(
                    capacity,
                    sparse.into_entries(),
                ));
                Ok(())
            }
        }
    }

    pub fn is_dense(&self) -> bool {
        matches!(self, WeightStore::Dense(_))
    }
}

impl WeightKeeper for WeightStore {
    fn with_entry<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Option<R> {
        match self {
            WeightStore::Sparse(s) => s.with_entry(key, f),
            WeightStore::Dense(d) => d.with_entry(key, f),
        }
    }

    fn get_or_insert<R>(&self, key: u32, f: impl FnOnce(&mut WeightState) -> R) -> Result<R> {
        match self {
            WeightStore::Sparse(s) => s.get_or_insert(key, f),
            WeightStore::Dense(d) => d.get_or_insert(key, f),
        }
    }

    fn for_each(&self, f: impl FnMut(u32, &mut WeightState)) {
        match self {
            WeightStore::Sparse(s) => s.for_each(f),
            WeightStore::Dense(d) => d.for_each(f),
        }
    }

    fn len(&self) -> usize {
        match self {
            WeightStore::Sparse(s) => s.len(),
            WeightStore::Dense(d) => d.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayon::prelude::*;

    fn params(alpha: f64, beta: f64, l1: f64, l2: f64) -> Params {
        Params {
            alpha,
            beta,
            lambda1: l1,
            lambda2: l2,
            ..Default::default()
        }
    }

    #[test]
    fn l1_zeroes_small_accumulators() {
        let p = params(0.1, 1.0, 0.5, 1.0);
        assert_eq!(weight_of(0.5, 0.25, &p), 0.0);
        assert_eq!(weight_of(-0.5, 9.0, &p), 0.0);
        // (0.5 - (-1)) / ((1 + 1) / 0.1 + 1)
        assert!((weight_of(-1.0, 1.0, &p) - 0.5 / 21.0).abs() < 1e-12);
        assert!((weight_of(-2.0, 4.0, &p) - 1.5 / 31.0).abs() < 1e-12);
        assert!(weight_of(3.0, 4.0, &p) < 0.0);
    }

    #[test]
    fn update_uses_pre_update_weight() {
        let p = params(1.0, 1.0, 0.0, 0.0);
        let mut s = WeightState::default();
        s.update(1.0, &p);
        assert_eq!((s.z, s.n), (1.0, 1.0));
        s.update(1.0, &p);
        let expected_z = 2.0 + 0.5 * (2f64.sqrt() - 1.0);
        assert!((s.z - expected_z).abs() < 1e-12);
        assert_eq!(s.n, 2.0);
        // the cached weight is the one used by the second update
        assert_eq!(s.w, -0.5);
    }

    #[test]
    fn materialize_is_idempotent() {
        let p = params(0.1, 1.0, 0.5, 1.0);
        let mut s = WeightState { n: 4.0, z: -2.0, w: 0.0 };
        let a = s.materialize(&p);
        let b = s.materialize(&p);
        assert_eq!(a, b);
        assert_eq!(s.w, a);
    }

    fn exercise(store: &impl WeightKeeper) {
        assert!(store.is_empty());
        assert_eq!(store.get(3), None);
        assert_eq!(store.materialized_weight(3, &Params::default()), 0.0);
        store.get_or_insert(3, |s| s.z = -2.0).unwrap();
        store.get_or_insert(3, |s| s.n = 4.0).unwrap();
        store.get_or_insert(1, |_| ()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(3), Some(WeightState { n: 4.0, z: -2.0, w: 0.0 }));
        assert_eq!(store.max_key(), Some(3));

        let p = params(0.1, 1.0, 0.5, 1.0);
        let summary = store.summary(&p);
        assert_eq!(summary.count, 2);
        assert_eq!(summary.nonzero, 1);
        assert_eq!(summary.min, 0.0);
        assert!((summary.max - 1.5 / 31.0).abs() < 1e-12);
    }

    #[test]
    fn sparse_store() {
        exercise(&SparseWeights::new());
    }

    #[test]
    fn dense_store() {
        let dense = DenseWeights::with_capacity(4);
        exercise(&dense);
        assert!(matches!(
            dense.get_or_insert(4, |_| ()),
            Err(Error::KeyOutOfRange { key: 4, capacity: 4 })
        ));
        assert_eq!(dense.get(4), None);
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = SparseWeights::new();
        (0..10_000u32).into_par_iter().for_each(|i| {
            store.get_or_insert(i % 17, |s| s.n += 1.0).unwrap();
        });
        assert_eq!(store.len(), 17);
        let total: f64 = (0..17).map(|k| store.get(k).unwrap().n).sum();
        assert_eq!(total, 10_000.0);
    }

    #[test]
    fn densify_keeps_entries() {
        let mut store = WeightStore::default();
        store.get_or_insert(2, |s| s.z = 1.5).unwrap();
        store.get_or_insert(7, |s| s.n = 3.0).unwrap();

        assert!(matches!(
            store.densify(5),
            Err(Error::KeyOutOfRange { key: 7, capacity: 5 })
        ));
        assert!(!store.is_dense());
        assert_eq!(store.len(), 2);

        store.densify(8).unwrap();
        assert!(store.is_dense());
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(2).unwrap().z, 1.5);
        assert_eq!(store.get(7).unwrap().n, 3.0);
        assert!(store.get_or_insert(8, |_| ()).is_err());

        store.densify(20).unwrap();
        store.get_or_insert(19, |_| ()).unwrap();
        assert_eq!(store.len(), 3);
    }
}
