use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::chunker::ChunkingConfig;
use super::documents::SourceDocument;
use super::embedder::Embedder;
use super::index::{IndexSummary, RetrievalIndex, ScoredChunk, DEFAULT_EMBED_BATCH_SIZE};
use super::RetrievalError;

/// Owns the current [`RetrievalIndex`].
///
/// A rebuild builds the replacement with no lock held and swaps it in under a brief write
/// lock. Queries clone the `Arc` under a read lock, so they see either the old index or the new
/// one in full.
///
/// Every rebuild takes a generation number when it is requested. A build that finishes after a
/// newer one has been installed is dropped instead of swapped in.
pub struct KnowledgeBase {
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    batch_size: usize,
    generations: AtomicU64,
    current: RwLock<Option<Installed>>,
}

struct Installed {
    generation: u64,
    index: Arc<RetrievalIndex>,
}

impl KnowledgeBase {
    pub fn new(embedder: Arc<dyn Embedder>, chunking: ChunkingConfig) -> Self {
        Self {
            embedder,
            chunking,
            batch_size: DEFAULT_EMBED_BATCH_SIZE,
            generations: AtomicU64::new(0),
            current: RwLock::new(None),
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub async fn rebuild(&self, documents: &[SourceDocument]) -> Result<IndexSummary, RetrievalError> {
        self.build_and_swap(self.next_generation(), documents).await
    }

    /// Runs [`KnowledgeBase::rebuild`] on its own task. The generation is taken before the task
    /// starts, so of two spawned rebuilds the later request always wins.
    pub fn spawn_rebuild(
        self: &Arc<Self>,
        documents: Vec<SourceDocument>,
    ) -> JoinHandle<Result<IndexSummary, RetrievalError>> {
        let generation = self.next_generation();
        let knowledge_base = Arc::clone(self);
        tokio::spawn(async move { knowledge_base.build_and_swap(generation, &documents).await })
    }

    fn next_generation(&self) -> u64 {
        self.generations.fetch_add(1, Ordering::SeqCst) + 1
    }

    async fn build_and_swap(
        &self,
        generation: u64,
        documents: &[SourceDocument],
    ) -> Result<IndexSummary, RetrievalError> {
        let built = match RetrievalIndex::build(
            documents,
            self.embedder.as_ref(),
            self.chunking,
            self.batch_size,
        )
        .await
        {
            Ok(index) => index,
            Err(error) => {
                warn!(
                    event_name = "retrieval.index.build_failed",
                    error = %error,
                    "knowledge base rebuild failed; keeping previous index"
                );
                return Err(error);
            }
        };

        let summary = built.summary().clone();
        {
            let mut current = self.current.write().await;
            if current.as_ref().is_some_and(|installed| installed.generation > generation) {
                info!(
                    event_name = "retrieval.index.superseded",
                    generation,
                    fingerprint = %summary.fingerprint,
                    "discarding index build older than the installed one"
                );
                return Err(RetrievalError::Superseded { generation });
            }
            *current = Some(Installed { generation, index: Arc::new(built) });
        }

        info!(
            event_name = "retrieval.index.swapped",
            generation,
            documents = summary.document_count,
            chunks = summary.chunk_count,
            dimension = summary.dimension,
            fingerprint = %summary.fingerprint,
            "knowledge base index ready"
        );
        Ok(summary)
    }

    pub async fn snapshot(&self) -> Option<Arc<RetrievalIndex>> {
        self.current.read().await.as_ref().map(|installed| Arc::clone(&installed.index))
    }

    pub async fn is_ready(&self) -> bool {
        self.current.read().await.is_some()
    }

    pub async fn summary(&self) -> Option<IndexSummary> {
        self.snapshot().await.map(|index| index.summary().clone())
    }

    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, RetrievalError> {
        let index = self.snapshot().await.ok_or(RetrievalError::NotReady)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut vectors = self.embedder.embed_batch(&[text.to_owned()]).await?;
        let query = vectors
            .pop()
            .ok_or_else(|| RetrievalError::Embedding("embedder returned no query vector".into()))?;
        index.search(&query, k)
    }
}
