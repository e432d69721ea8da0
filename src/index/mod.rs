// Vector index module
// Exact nearest-neighbour search over fixed-dimension vectors with parallel payload records


use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::embeddings::Vector;
use crate::{RagError, Result};

const INDEX_FILE: &str = "index.json";
const RECORDS_PREFIX: &str = "records-";

/// Document index shared between the ingest path and query answering
pub type SharedIndex = Arc<RwLock<VectorIndex>>;

/// Payload stored alongside each vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Record {
    /// The chunk text or cached answer this vector stands for
    pub text: String,
    /// Optional caller-defined metadata
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Record {
    #[inline]
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: BTreeMap::new(),
        }
    }

    #[inline]
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl From<String> for Record {
    #[inline]
    fn from(text: String) -> Self {
        Self::new(text)
    }
}

impl From<&str> for Record {
    #[inline]
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// One nearest-neighbour match
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    /// Insertion position of the matched entry
    pub position: usize,
    /// Squared Euclidean distance to the query; smaller is closer
    pub distance: f32,
    pub record: Record,
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredIndex {
    /// Names the records file written alongside these vectors
    generation: u64,
    dimension: usize,
    vectors: Vec<Vector>,
}

#[derive(Debug, Serialize)]
struct StoredIndexRef<'a> {
    generation: u64,
    dimension: usize,
    vectors: &'a [Vector],
}

/// Append-only flat vector index persisted under a single directory.
///
/// `vectors[i]` and `records[i]` always describe the same entry. The
/// dimension is fixed by the first vector that initializes the index. Every
/// mutation is written through to disk before returning; callers serialize
/// mutations, the index does no locking of its own.
///
/// On disk the records live in `records-<generation>.json` and `index.json`
/// names the generation it pairs with. Replacing `index.json` is the commit
/// point, so a write that fails halfway leaves the previous generation
/// readable and the in-memory state untouched.
#[derive(Debug)]
pub struct VectorIndex {
    dir: PathBuf,
    generation: u64,
    dimension: Option<usize>,
    vectors: Vec<Vector>,
    records: Vec<Record>,
}

impl VectorIndex {
    /// Open the index stored in `dir`, creating the directory if needed.
    ///
    /// Missing files give an empty, uninitialized index.
    #[inline]
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let mut index = Self {
            dir: dir.as_ref().to_path_buf(),
            generation: 0,
            dimension: None,
            vectors: Vec::new(),
            records: Vec::new(),
        };
        fs::create_dir_all(&index.dir)?;
        index.restore()?;
        Ok(index)
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether a dimension has been established
    #[inline]
    pub fn is_initialized(&self) -> bool {
        self.dimension.is_some()
    }

    #[inline]
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    #[inline]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Replace the whole index with `vectors` and `records` in one step.
    ///
    /// Nothing changes if validation fails. An empty set leaves the index
    /// uninitialized with no persisted files.
    #[inline]
    pub fn create_index(&mut self, vectors: Vec<Vector>, records: Vec<Record>) -> Result<()> {
        if vectors.len() != records.len() {
            return Err(RagError::CountMismatch {
                vectors: vectors.len(),
                records: records.len(),
            });
        }

        let Some(dimension) = vectors.first().map(Vec::len) else {
            return self.reset();
        };

        if let Some(bad) = vectors.iter().find(|v| v.len() != dimension) {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let generation = self.generation + 1;
        self.write_snapshot(generation, dimension, &vectors, &records)?;

        self.generation = generation;
        self.dimension = Some(dimension);
        self.vectors = vectors;
        self.records = records;

        info!(
            "Created index at {} with {} entries ({} dimensions)",
            self.dir.display(),
            self.records.len(),
            dimension
        );
        Ok(())
    }

    /// Append one entry, initializing the index from this vector if needed
    #[inline]
    pub fn add(&mut self, vector: Vector, record: Record) -> Result<()> {
        let initializing = self.dimension.is_none();
        match self.dimension {
            Some(expected) if expected != vector.len() => {
                return Err(RagError::DimensionMismatch {
                    expected,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => {
                if vector.is_empty() {
                    return Err(RagError::DimensionMismatch {
                        expected: 1,
                        actual: 0,
                    });
                }
                debug!(
                    "Initializing index at {} with {} dimensions",
                    self.dir.display(),
                    vector.len()
                );
                self.dimension = Some(vector.len());
            }
        }

        self.vectors.push(vector);
        self.records.push(record);
        if let Err(e) = self.persist() {
            self.vectors.pop();
            self.records.pop();
            if initializing {
                self.dimension = None;
            }
            return Err(e);
        }
        Ok(())
    }

    /// Return up to `k` records nearest to `query`, closest first.
    ///
    /// Equal distances keep insertion order. An uninitialized or empty index
    /// yields no hits.
    #[inline]
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
        let Some(dimension) = self.dimension else {
            return Ok(Vec::new());
        };
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }
        if query.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(position, vector)| (position, squared_euclidean(query, vector)))
            .collect();
        // stable: ties stay in insertion order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(position, distance)| SearchHit {
                position,
                distance,
                record: self.records[position].clone(),
            })
            .collect())
    }

    /// Write the index and its records to disk as a new generation
    #[inline]
    pub fn persist(&mut self) -> Result<()> {
        let Some(dimension) = self.dimension else {
            debug!("Skipping persist of uninitialized index");
            return Ok(());
        };

        if self.vectors.len() != self.records.len() {
            return Err(RagError::CorruptIndex(format!(
                "{} vectors but {} records in memory",
                self.vectors.len(),
                self.records.len()
            )));
        }

        let generation = self.generation + 1;
        self.write_snapshot(generation, dimension, &self.vectors, &self.records)?;
        self.generation = generation;
        Ok(())
    }

    fn write_snapshot(
        &self,
        generation: u64,
        dimension: usize,
        vectors: &[Vector],
        records: &[Record],
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;
        write_atomically(
            &self.dir.join(records_file(generation)),
            &serde_json::to_vec(records)?,
        )?;
        let stored = StoredIndexRef {
            generation,
            dimension,
            vectors,
        };
        write_atomically(&self.dir.join(INDEX_FILE), &serde_json::to_vec(&stored)?)?;
        self.remove_stale_records(Some(generation));

        debug!(
            "Persisted {} entries to {} (generation {})",
            records.len(),
            self.dir.display(),
            generation
        );
        Ok(())
    }

    /// Best-effort removal of records files other than `keep`
    fn remove_stale_records(&self, keep: Option<u64>) {
        let keep_name = keep.map(records_file);
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return;
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(RECORDS_PREFIX) || keep_name.as_deref() == Some(&*name) {
                continue;
            }
            if let Err(e) = fs::remove_file(entry.path()) {
                warn!("Failed to remove stale {}: {}", name, e);
            }
        }
    }

    /// Reload state from disk, discarding anything in memory.
    ///
    /// If either file is missing the index comes back empty and uninitialized.
    #[inline]
    pub fn restore(&mut self) -> Result<()> {
        self.generation = 0;
        self.dimension = None;
        self.vectors.clear();
        self.records.clear();

        let index_path = self.dir.join(INDEX_FILE);
        if !index_path.exists() {
            debug!("No persisted index at {}", self.dir.display());
            return Ok(());
        }

        let stored: StoredIndex = serde_json::from_slice(&fs::read(&index_path)?)
            .map_err(|e| RagError::CorruptIndex(format!("{}: {}", index_path.display(), e)))?;
        let records_path = self.dir.join(records_file(stored.generation));
        if !records_path.exists() {
            warn!(
                "Index at {} has no records for generation {}",
                self.dir.display(),
                stored.generation
            );
            return Ok(());
        }
        let records: Vec<Record> = serde_json::from_slice(&fs::read(&records_path)?)
            .map_err(|e| RagError::CorruptIndex(format!("{}: {}", records_path.display(), e)))?;

        if stored.vectors.len() != records.len() {
            return Err(RagError::CorruptIndex(format!(
                "{} holds {} vectors but {} records",
                self.dir.display(),
                stored.vectors.len(),
                records.len()
            )));
        }
        if stored.vectors.iter().any(|v| v.len() != stored.dimension) {
            return Err(RagError::CorruptIndex(format!(
                "{} holds vectors that are not {}-dimensional",
                self.dir.display(),
                stored.dimension
            )));
        }

        self.generation = stored.generation;
        self.dimension = Some(stored.dimension);
        self.vectors = stored.vectors;
        self.records = records;

        info!(
            "Restored {} entries from {}",
            self.records.len(),
            self.dir.display()
        );
        Ok(())
    }

    /// Clear memory and delete persisted files. Safe to call repeatedly.
    #[inline]
    pub fn reset(&mut self) -> Result<()> {
        self.generation = 0;
        self.dimension = None;
        self.vectors.clear();
        self.records.clear();

        match fs::remove_file(self.dir.join(INDEX_FILE)) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", INDEX_FILE, e);
                return Err(e.into());
            }
        }
        self.remove_stale_records(None);

        info!("Reset index at {}", self.dir.display());
        Ok(())
    }
}

/// Squared Euclidean distance between two equal-length vectors
#[inline]
pub fn squared_euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

fn records_file(generation: u64) -> String {
    format!("{RECORDS_PREFIX}{generation}.json")
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}
