//! The database module
//! Provide the keyed vector store and keep the similarity index in step with it

use crate::error::{Result, VemcacheError};
use crate::index::SimilarityIndex;
use crate::vector::Vector;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use uuid::Uuid;

/// A stored vector and the version it was written at.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    pub vector: Vector,
    pub version: u64,
}

/// Result of an insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// In-memory vector cache.
///
/// Owns every entry and the similarity index built over them. All mutation
/// goes through `&mut self` methods that update the map and the index
/// together, so a reader holding `&self` always sees both in the same state.
#[derive(Debug, Default)]
pub struct Vemcache {
    entries: HashMap<String, Entry>,
    index: SimilarityIndex,
    last_version: u64,
}

impl Vemcache {
    /// Creates an empty store.
    ///
    /// # Examples
    ///
    /// ```
    /// use vemcache::Vemcache;
    ///
    /// let db = Vemcache::new();
    /// assert_eq!(db.len(), 0);
    /// ```
    pub fn new() -> Vemcache {
        Vemcache::default()
    }

    /// Inserts a vector, or fully replaces the vector already stored under `key`.
    ///
    /// Every call assigns a new version to the entry. Different keys may hold
    /// vectors of different dimensions.
    ///
    /// # Examples
    ///
    /// ```
    /// use vemcache::{Upsert, Vector, Vemcache};
    ///
    /// let mut db = Vemcache::new();
    /// let v = Vector::new(vec![3.0, 4.0]).unwrap();
    /// assert_eq!(db.insert("vec1".to_string(), v.clone()).unwrap(), Upsert::Inserted);
    /// assert_eq!(db.insert("vec1".to_string(), v).unwrap(), Upsert::Updated);
    /// assert_eq!(db.len(), 1);
    /// ```
    pub fn insert(&mut self, key: String, vector: Vector) -> Result<Upsert> {
        validate_key(&key)?;

        self.last_version += 1;
        let version = self.last_version;

        self.index.upsert(&key, version, &vector);
        let previous = self.entries.insert(key, Entry { vector, version });

        Ok(match previous {
            Some(_) => Upsert::Updated,
            None => Upsert::Inserted,
        })
    }

    /// Inserts a vector under a freshly generated UUID v4 key and returns the key.
    pub fn insert_with_uuid(&mut self, vector: Vector) -> Result<String> {
        let mut key = Uuid::new_v4().to_string();
        while self.entries.contains_key(&key) {
            key = Uuid::new_v4().to_string();
        }
        self.insert(key.clone(), vector)?;
        Ok(key)
    }

    /// Retrieves the vector stored under `key`.
    ///
    /// # Examples
    ///
    /// ```
    /// use vemcache::{Vector, Vemcache};
    ///
    /// let mut db = Vemcache::new();
    /// db.insert("vec1".to_string(), Vector::new(vec![3.0, 4.0]).unwrap()).unwrap();
    ///
    /// assert_eq!(db.get("vec1").unwrap().components(), &[3.0, 4.0]);
    /// assert!(db.get("vec2").is_err());
    /// ```
    pub fn get(&self, key: &str) -> Result<&Vector> {
        self.entry(key).map(|e| &e.vector)
    }

    pub fn entry(&self, key: &str) -> Result<&Entry> {
        self.entries
            .get(key)
            .ok_or_else(|| VemcacheError::NotFound(key.to_string()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Deletes the entry for `key` and drops it from the similarity index.
    ///
    /// Returns the removed vector.
    pub fn remove(&mut self, key: &str) -> Result<Vector> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| VemcacheError::NotFound(key.to_string()))?;

        if !self.index.remove(key) {
            tracing::error!(key, "removed entry had no index slot");
        }
        Ok(entry.vector)
    }

    /// Returns the number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Read-only view of the similarity index.
    pub fn index(&self) -> &SimilarityIndex {
        &self.index
    }

    /// Finds the `k` entries most similar to the entry stored under `origin`.
    ///
    /// Results are `(key, cosine similarity)` pairs, best first, ties broken by
    /// key. The origin is never part of its own result, and only entries with
    /// the origin's dimension are comparable.
    ///
    /// # Errors
    ///
    /// * `InvalidArgument` if `k` is zero
    /// * `NotFound` if `origin` is absent
    /// * `Internal` if the index disagrees with the store
    ///
    /// # Examples
    ///
    /// ```
    /// use vemcache::{Vector, Vemcache};
    ///
    /// let mut db = Vemcache::new();
    /// db.insert("A".to_string(), Vector::new(vec![1.0, 0.0]).unwrap()).unwrap();
    /// db.insert("B".to_string(), Vector::new(vec![0.0, 1.0]).unwrap()).unwrap();
    /// db.insert("C".to_string(), Vector::new(vec![1.0, 1.0]).unwrap()).unwrap();
    ///
    /// let results = db.knn("A", 2).unwrap();
    /// assert_eq!(results[0].0, "C");
    /// assert_eq!(results[1].0, "B");
    /// ```
    pub fn knn(&self, origin: &str, k: usize) -> Result<Vec<(String, f64)>> {
        if k == 0 {
            return Err(VemcacheError::invalid("k must be a positive integer"));
        }
        if !self.entries.contains_key(origin) {
            return Err(VemcacheError::NotFound(origin.to_string()));
        }

        let hits = self.index.query(origin, k).map_err(|e| match e {
            VemcacheError::NotFound(key) => {
                VemcacheError::Internal(format!("entry '{}' is missing from the index", key))
            }
            other => other,
        })?;

        hits.into_iter()
            .map(|hit| match self.entries.get(&hit.key) {
                Some(entry) if entry.version == hit.version => Ok((hit.key, hit.score)),
                Some(entry) => Err(VemcacheError::Internal(format!(
                    "stale index slot for '{}': version {} != {}",
                    hit.key, hit.version, entry.version
                ))),
                None => Err(VemcacheError::Internal(format!(
                    "index references missing entry '{}'",
                    hit.key
                ))),
            })
            .collect()
    }

    /// Copies every entry out of the store, ordered by key.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            vectors: self
                .entries
                .iter()
                .map(|(k, e)| (k.clone(), e.vector.clone()))
                .collect(),
        }
    }

    /// Builds a store holding every vector of `snapshot`.
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self> {
        let mut db = Vemcache::new();
        for (key, vector) in snapshot.vectors {
            db.insert(key, vector)?;
        }
        Ok(db)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(VemcacheError::invalid("key must not be empty"));
    }
    // Same separator set as the request tokenizer
    if key.bytes().any(|b| b.is_ascii_whitespace()) {
        return Err(VemcacheError::invalid("key must not contain ASCII whitespace"));
    }
    Ok(())
}

/// Owned copy of the store contents, used for dumps and preloading.
///
/// Serialized as a map from key to component array, e.g.
/// `{"vector0": [0.5, -0.25]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    pub vectors: BTreeMap<String, Vector>,
}

/// On-disk encoding, picked from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotFormat {
    Json,
    Bincode,
}

impl SnapshotFormat {
    /// `.json` files are JSON, anything else is bincode.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => SnapshotFormat::Json,
            _ => SnapshotFormat::Bincode,
        }
    }
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Writes the snapshot to `path` using buffered I/O.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use vemcache::{Vector, Vemcache};
    ///
    /// let mut db = Vemcache::new();
    /// db.insert("vec1".to_string(), Vector::new(vec![1.0, 2.0, 3.0]).unwrap()).unwrap();
    /// db.snapshot().save("vemcache_dump.json").unwrap();
    /// ```
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);

        match SnapshotFormat::from_path(path) {
            SnapshotFormat::Json => serde_json::to_writer(&mut writer, self)?,
            SnapshotFormat::Bincode => bincode::serialize_into(&mut writer, self)?,
        }
        writer.flush()?;
        Ok(())
    }

    /// Loads a snapshot previously written by [`save`](Snapshot::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);

        let snapshot = match SnapshotFormat::from_path(path) {
            SnapshotFormat::Json => serde_json::from_reader(reader)?,
            SnapshotFormat::Bincode => bincode::deserialize_from(reader)?,
        };
        Ok(snapshot)
    }
}
