use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::chunker::ChunkingConfig;
use super::documents::SourceDocument;
use super::embedder::Embedder;
use super::RetrievalError;

pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;

/// A window of document text plus its embedding. Immutable once the index is built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    /// Position in the whole index; the tie-breaker for equal scores.
    pub ordinal: usize,
    pub document: String,
    /// Position within the parent document.
    pub chunk_index: usize,
    pub text: String,
    pub embedding: Vec<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub ordinal: usize,
    pub document: String,
    pub text: String,
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSummary {
    pub document_count: usize,
    pub chunk_count: usize,
    pub dimension: usize,
    pub embedder_id: String,
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
}

/// Immutable nearest-neighbor index over document chunks.
///
/// Vector norms are computed once at build time so a query costs one dot product per chunk.
#[derive(Debug)]
pub struct RetrievalIndex {
    chunks: Vec<DocumentChunk>,
    norms: Vec<f32>,
    summary: IndexSummary,
}

impl RetrievalIndex {
    pub async fn build(
        documents: &[SourceDocument],
        embedder: &dyn Embedder,
        chunking: ChunkingConfig,
        batch_size: usize,
    ) -> Result<Self, RetrievalError> {
        let mut pending = Vec::new();
        let mut document_count = 0;
        for document in documents.iter().filter(|document| document.has_text()) {
            document_count += 1;
            for (chunk_index, window) in chunking.split(&document.text).into_iter().enumerate() {
                pending.push((document.name.clone(), chunk_index, window.text));
            }
        }

        if pending.is_empty() {
            return Err(RetrievalError::EmptyCorpus);
        }

        let mut embeddings: Vec<Vec<f32>> = Vec::with_capacity(pending.len());
        for batch in pending.chunks(batch_size.max(1)) {
            let texts: Vec<String> = batch.iter().map(|(_, _, text)| text.clone()).collect();
            let vectors = embedder.embed_batch(&texts).await?;
            if vectors.len() != texts.len() {
                return Err(RetrievalError::Embedding(format!(
                    "embedder returned {} vectors for {} inputs",
                    vectors.len(),
                    texts.len()
                )));
            }
            embeddings.extend(vectors);
            debug!(
                event_name = "retrieval.index.batch_embedded",
                embedded = embeddings.len(),
                total = pending.len(),
                "embedded chunk batch"
            );
        }

        let dimension = embeddings.first().map(Vec::len).unwrap_or_default();
        if let Some(bad) = embeddings.iter().find(|vector| vector.len() != dimension) {
            return Err(RetrievalError::DimensionMismatch {
                expected: dimension,
                actual: bad.len(),
            });
        }

        let chunks: Vec<DocumentChunk> = pending
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(ordinal, ((document, chunk_index, text), embedding))| DocumentChunk {
                ordinal,
                document,
                chunk_index,
                text,
                embedding,
            })
            .collect();
        let norms = chunks.iter().map(|chunk| l2_norm(&chunk.embedding)).collect();

        let summary = IndexSummary {
            document_count,
            chunk_count: chunks.len(),
            dimension,
            embedder_id: embedder.embedder_id().to_string(),
            fingerprint: corpus_fingerprint(documents, chunking),
            built_at: Utc::now(),
        };

        Ok(Self { chunks, norms, summary })
    }

    pub fn chunks(&self) -> &[DocumentChunk] {
        &self.chunks
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn summary(&self) -> &IndexSummary {
        &self.summary
    }

    /// Top `k` chunks by descending cosine similarity; equal scores keep chunk order.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        if query.len() != self.summary.dimension {
            return Err(RetrievalError::DimensionMismatch {
                expected: self.summary.dimension,
                actual: query.len(),
            });
        }
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_norm = l2_norm(query);
        let mut scored: Vec<(usize, f32)> = self
            .chunks
            .iter()
            .zip(&self.norms)
            .map(|(chunk, norm)| {
                let dot: f32 = chunk.embedding.iter().zip(query).map(|(a, b)| a * b).sum();
                let score =
                    if *norm == 0.0 || query_norm == 0.0 { 0.0 } else { dot / (norm * query_norm) };
                (chunk.ordinal, score)
            })
            .collect();

        scored.sort_by(|left, right| right.1.total_cmp(&left.1).then(left.0.cmp(&right.0)));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(ordinal, score)| {
                let chunk = &self.chunks[ordinal];
                ScoredChunk {
                    ordinal,
                    document: chunk.document.clone(),
                    text: chunk.text.clone(),
                    score,
                }
            })
            .collect())
    }
}

fn l2_norm(vector: &[f32]) -> f32 {
    vector.iter().map(|value| value * value).sum::<f32>().sqrt()
}

fn corpus_fingerprint(documents: &[SourceDocument], chunking: ChunkingConfig) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(&(chunking.chunk_size() as u64).to_le_bytes());
    hasher.update(&(chunking.chunk_overlap() as u64).to_le_bytes());
    for document in documents {
        hasher.update(document.name.as_bytes());
        hasher.update(&[0]);
        hasher.update(document.text.as_bytes());
        hasher.update(&[0]);
    }
    hasher.finalize().to_hex().to_string()
}
