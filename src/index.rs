//! Exact similarity index for k-nearest-neighbor queries.
//!
//! Vectors are grouped by dimensionality. Each group is a slab holding all of
//! its vectors in one flat array, `[v1_d1, v1_d2, ..., v2_d1, v2_d2, ...]`,
//! next to a parallel array of norms and a parallel array of `(key, version)`
//! slot owners. A query walks one contiguous slab with a vectorized dot
//! product, selects the best `k` scores in linear time and sorts only those,
//! so nothing is re-normalized and `k = n - 1` costs one `O(n log n)` sort.
//!
//! The index never owns entries. The store mutates it in the same call that
//! mutates its map; every hit carries the version it was indexed at so the
//! store can detect a stale slot.

use crate::error::{Result, VemcacheError};
use crate::vector::{self, Vector};
use std::cmp::Ordering;
use std::collections::HashMap;

/// A single ranked KNN result.
#[derive(Debug, Clone, PartialEq)]
pub struct Hit {
    pub key: String,
    pub version: u64,
    pub score: f64,
}

#[derive(Debug)]
struct SlotOwner {
    key: String,
    version: u64,
}

#[derive(Debug)]
struct Slab {
    dim: usize,
    data: Vec<f64>,
    norms: Vec<f64>,
    owners: Vec<SlotOwner>,
}

impl Slab {
    fn new(dim: usize) -> Self {
        Slab { dim, data: Vec::new(), norms: Vec::new(), owners: Vec::new() }
    }

    fn len(&self) -> usize {
        self.owners.len()
    }

    fn vector(&self, slot: usize) -> &[f64] {
        let start = slot * self.dim;
        &self.data[start..start + self.dim]
    }

    fn push(&mut self, key: String, version: u64, vector: &Vector) -> usize {
        self.data.extend_from_slice(vector.components());
        self.norms.push(vector.norm());
        self.owners.push(SlotOwner { key, version });
        self.owners.len() - 1
    }

    fn overwrite(&mut self, slot: usize, version: u64, vector: &Vector) {
        let start = slot * self.dim;
        self.data[start..start + self.dim].copy_from_slice(vector.components());
        self.norms[slot] = vector.norm();
        self.owners[slot].version = version;
    }

    /// Removes `slot` by moving the last slot into it.
    /// Returns the key of the moved slot, if any slot moved.
    fn swap_remove(&mut self, slot: usize) -> Option<&str> {
        let last = self.owners.len() - 1;
        if slot != last {
            let (head, tail) = self.data.split_at_mut(last * self.dim);
            head[slot * self.dim..(slot + 1) * self.dim].copy_from_slice(&tail[..self.dim]);
        }
        self.data.truncate(last * self.dim);
        self.norms.swap_remove(slot);
        self.owners.swap_remove(slot);

        if slot != last {
            Some(self.owners[slot].key.as_str())
        } else {
            None
        }
    }
}

/// Key position inside the index: slab dimension and slot number.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Position {
    dim: usize,
    slot: usize,
}

#[derive(Debug, Default)]
pub struct SimilarityIndex {
    slabs: HashMap<usize, Slab>,
    positions: HashMap<String, Position>,
}

impl SimilarityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.positions.contains_key(key)
    }

    /// Number of distinct dimensionalities currently indexed.
    pub fn slab_count(&self) -> usize {
        self.slabs.len()
    }

    /// Indexes `vector` under `key`, replacing any previous slot for that key.
    pub fn upsert(&mut self, key: &str, version: u64, vector: &Vector) {
        if let Some(pos) = self.positions.get(key).copied() {
            if pos.dim == vector.dim() {
                if let Some(slab) = self.slabs.get_mut(&pos.dim) {
                    slab.overwrite(pos.slot, version, vector);
                    return;
                }
            }
            self.remove(key);
        }

        let dim = vector.dim();
        let slab = self.slabs.entry(dim).or_insert_with(|| Slab::new(dim));
        let slot = slab.push(key.to_string(), version, vector);
        self.positions.insert(key.to_string(), Position { dim, slot });
    }

    /// Drops the slot for `key`. Returns false if the key was not indexed.
    pub fn remove(&mut self, key: &str) -> bool {
        let Some(pos) = self.positions.remove(key) else {
            return false;
        };
        let Some(slab) = self.slabs.get_mut(&pos.dim) else {
            return false;
        };

        if let Some(moved) = slab.swap_remove(pos.slot) {
            if let Some(moved_pos) = self.positions.get_mut(moved) {
                moved_pos.slot = pos.slot;
            }
        }
        if slab.len() == 0 {
            self.slabs.remove(&pos.dim);
        }
        true
    }

    #[cfg(test)]
    pub(crate) fn clear(&mut self) {
        self.slabs.clear();
        self.positions.clear();
    }

    /// Returns the `k` entries most similar to `origin`, best first.
    ///
    /// Only entries with the origin's dimensionality are candidates. The
    /// origin itself is never returned. Ties on score are broken by key,
    /// ascending.
    pub fn query(&self, origin: &str, k: usize) -> Result<Vec<Hit>> {
        if k == 0 {
            return Err(VemcacheError::invalid("k must be a positive integer"));
        }
        let pos = self
            .positions
            .get(origin)
            .ok_or_else(|| VemcacheError::NotFound(origin.to_string()))?;
        let slab = self.slabs.get(&pos.dim).ok_or_else(|| {
            VemcacheError::Internal(format!("index slab for dimension {} is missing", pos.dim))
        })?;

        let query = slab.vector(pos.slot);
        let query_norm = slab.norms[pos.slot];
        let capacity = k.min(slab.len().saturating_sub(1));

        if capacity == 0 {
            return Ok(Vec::new());
        }

        // (score, slot) for every candidate
        let mut best: Vec<(f64, usize)> = (0..slab.len())
            .filter(|&slot| slot != pos.slot)
            .map(|slot| {
                let score = vector::cosine_with_norms(
                    query,
                    slab.vector(slot),
                    query_norm,
                    slab.norms[slot],
                );
                (score, slot)
            })
            .collect();

        let by_rank = |a: &(f64, usize), b: &(f64, usize)| {
            rank(a.0, &slab.owners[a.1].key, b.0, &slab.owners[b.1].key)
        };
        if capacity < best.len() {
            best.select_nth_unstable_by(capacity - 1, by_rank);
            best.truncate(capacity);
        }
        best.sort_unstable_by(by_rank);

        Ok(best
            .into_iter()
            .map(|(score, slot)| Hit {
                key: slab.owners[slot].key.clone(),
                version: slab.owners[slot].version,
                score,
            })
            .collect())
    }
}

/// Orders candidates best-first: higher score, then smaller key.
fn rank(score_a: f64, key_a: &str, score_b: f64, key_b: &str) -> Ordering {
    score_b.total_cmp(&score_a).then_with(|| key_a.cmp(key_b))
}
