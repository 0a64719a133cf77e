use serde::{Deserialize, Deserializer};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use ragchat_core::error::{Error, Result};
use ragchat_core::types::{ChunkId, Meta};

use crate::tokenize::tokenize;

/// Sparse vector: `(dimension, weight)` pairs, ascending by dimension.
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub vector: SparseVector,
    pub norm: f64,
}

#[derive(Debug, Clone)]
pub struct ScoredResult<'a> {
    pub chunk_id: &'a str,
    /// Cosine similarity rounded to 6 decimals.
    pub score: f64,
    pub chunk: &'a Chunk,
}

#[derive(Deserialize)]
struct RawIndex {
    #[serde(default)]
    vocabulary: Vec<String>,
    #[serde(default)]
    idf: Vec<f64>,
    #[serde(default)]
    chunks: Vec<RawChunk>,
}

#[derive(Deserialize)]
struct RawChunk {
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default, deserialize_with = "object_or_empty")]
    metadata: Meta,
    #[serde(default)]
    vector: Vec<(usize, f64)>,
    #[serde(default)]
    norm: f64,
}

// Older indexer builds wrote `[]` for chunks without metadata.
fn object_or_empty<'de, D>(deserializer: D) -> std::result::Result<Meta, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::Object(map) => Ok(map),
        _ => Ok(Meta::new()),
    }
}

/// Read-only TF-IDF index produced by the offline indexer.
#[derive(Debug)]
pub struct SemanticIndex {
    vocabulary: Vec<String>,
    lookup: HashMap<String, usize>,
    idf: Vec<f64>,
    chunks: Vec<Chunk>,
}

impl SemanticIndex {
    pub fn load(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::parse(format!("Semantic index not readable: {}: {e}", path.display())))?;
        Self::from_json(&json)
            .map_err(|e| Error::parse(format!("{}: {e}", path.display())))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawIndex = serde_json::from_str(json)
            .map_err(|e| Error::parse(format!("Invalid semantic index payload: {e}")))?;
        Self::from_raw(raw)
    }

    fn from_raw(raw: RawIndex) -> Result<Self> {
        let dims = raw.vocabulary.len();
        if raw.idf.len() != dims {
            return Err(Error::parse(format!(
                "idf has {} entries but the vocabulary has {dims}",
                raw.idf.len()
            )));
        }

        let mut chunks = Vec::with_capacity(raw.chunks.len());
        for c in raw.chunks {
            // Later duplicates of a dimension override earlier ones.
            let mut sorted = BTreeMap::new();
            for (dim, weight) in c.vector {
                if dim >= dims {
                    return Err(Error::parse(format!(
                        "chunk '{}' references dimension {dim} outside a vocabulary of {dims}",
                        c.id
                    )));
                }
                sorted.insert(dim, weight);
            }
            chunks.push(Chunk { id: c.id, text: c.text, metadata: c.metadata, vector: sorted.into_iter().collect(), norm: c.norm });
        }

        let lookup = raw.vocabulary.iter().enumerate().map(|(i, term)| (term.clone(), i)).collect();
        Ok(Self { vocabulary: raw.vocabulary, lookup, idf: raw.idf, chunks })
    }

    pub fn vocabulary(&self) -> &[String] { &self.vocabulary }

    pub fn chunks(&self) -> &[Chunk] { &self.chunks }

    pub fn len(&self) -> usize { self.chunks.len() }

    pub fn is_empty(&self) -> bool { self.chunks.is_empty() }

    /// All chunks with a positive similarity, best first.
    pub fn search(&self, query: &str) -> Vec<ScoredResult<'_>> {
        self.search_with(query, usize::MAX, 0.0)
    }

    /// Cosine-similarity ranking. Ties keep index order. A query sharing no
    /// term with the vocabulary yields an empty list.
    pub fn search_with(&self, query: &str, top_k: usize, min_score: f64) -> Vec<ScoredResult<'_>> {
        let q = self.vectorise(query);
        let q_norm = q.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if q.is_empty() || q_norm == 0.0 {
            return Vec::new();
        }

        let mut results: Vec<ScoredResult<'_>> = self
            .chunks
            .iter()
            .filter(|c| c.norm > 0.0)
            .filter_map(|c| {
                let d = dot(&c.vector, &q);
                if d <= 0.0 {
                    return None;
                }
                let score = round6(d / (c.norm * q_norm));
                (score > min_score).then_some(ScoredResult { chunk_id: &c.id, score, chunk: c })
            })
            .collect();

        results.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        results.truncate(top_k);
        results
    }

    /// TF (share of in-vocabulary tokens) times the index's IDF.
    fn vectorise(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for token in tokenize(text) {
            if let Some(&dim) = self.lookup.get(&token) {
                *counts.entry(dim).or_default() += 1;
            }
        }
        let total: usize = counts.values().sum();
        if total == 0 {
            return Vec::new();
        }
        counts
            .into_iter()
            .map(|(dim, n)| (dim, n as f64 / total as f64 * self.idf[dim]))
            .collect()
    }
}

fn dot(a: &[(usize, f64)], b: &[(usize, f64)]) -> f64 {
    let (mut i, mut j, mut sum) = (0, 0, 0.0);
    while i < a.len() && j < b.len() {
        match a[i].0.cmp(&b[j].0) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                sum += a[i].1 * b[j].1;
                i += 1;
                j += 1;
            }
        }
    }
    sum
}

fn round6(x: f64) -> f64 { (x * 1_000_000.0).round() / 1_000_000.0 }
