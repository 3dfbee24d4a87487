use maitre_agent::build_embedder;
use maitre_core::retrieval::{load_documents, KnowledgeBase, RetrievalError};

use crate::commands::{load_config, runtime, CommandResult, EXIT_CONFIG, EXIT_RETRIEVAL};

/// Builds the knowledge base from the configured directory and reports what was indexed.
pub fn run() -> CommandResult {
    let config = match load_config("index") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let chunking = match config.knowledge_base.chunking() {
        Ok(chunking) => chunking,
        Err(error) => {
            return CommandResult::failure(
                "index",
                "config_validation",
                error.to_string(),
                EXIT_CONFIG,
            )
        }
    };
    let runtime = match runtime("index") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let documents = load_documents(&config.knowledge_base.documents_dir)?;
        let embedder = build_embedder(&config.embedding)?;
        let knowledge_base =
            KnowledgeBase::new(embedder, chunking).with_batch_size(config.embedding.batch_size);
        Ok::<_, RetrievalError>(knowledge_base.rebuild(&documents).await?)
    });

    match result {
        Ok(summary) => CommandResult::success(
            "index",
            format!(
                "indexed {} documents into {} chunks (dimension {}, embedder {}, fingerprint {})",
                summary.document_count,
                summary.chunk_count,
                summary.dimension,
                summary.embedder_id,
                summary.fingerprint
            ),
        ),
        Err(error) => {
            CommandResult::failure("index", "retrieval", error.to_string(), EXIT_RETRIEVAL)
        }
    }
}
