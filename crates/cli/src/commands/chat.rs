use std::sync::Arc;

use maitre_agent::{
    build_embedder, build_generator, BookingOrchestrator, HeuristicIntentParser,
    OrchestratorError, RetrievalAugmentedAnswerer, SessionContext,
};
use maitre_core::retrieval::KnowledgeBase;
use tracing::warn;

use crate::commands::{
    documents_or_empty, ledger_failure, load_config, open_ledger, runtime, CommandResult,
    EXIT_COLLABORATOR, EXIT_CONFIG, EXIT_INVALID_INPUT, EXIT_RETRIEVAL,
};

/// One chat turn against the configured ledger and knowledge base.
pub fn run(message: &str) -> CommandResult {
    if message.trim().is_empty() {
        return CommandResult::failure(
            "chat",
            "invalid_input",
            "message must not be empty",
            EXIT_INVALID_INPUT,
        );
    }

    let config = match load_config("chat") {
        Ok(config) => config,
        Err(result) => return result,
    };
    let runtime = match runtime("chat") {
        Ok(runtime) => runtime,
        Err(result) => return result,
    };

    let result = runtime.block_on(async {
        let (pool, ledger) = open_ledger(&config).await?;

        let chunking = config
            .knowledge_base
            .chunking()
            .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG))?;
        let embedder = build_embedder(&config.embedding)
            .map_err(|error| ("retrieval", error.to_string(), EXIT_RETRIEVAL))?;
        let knowledge_base = Arc::new(
            KnowledgeBase::new(embedder, chunking).with_batch_size(config.embedding.batch_size),
        );
        let documents = documents_or_empty(&config);
        if let Err(error) = knowledge_base.rebuild(&documents).await {
            warn!(
                event_name = "cli.chat.index_unavailable",
                error = %error,
                "continuing without a knowledge base"
            );
        }

        let generator = build_generator(&config.llm)
            .map_err(|error| ("collaborator", error.to_string(), EXIT_COLLABORATOR))?;
        let answerer =
            RetrievalAugmentedAnswerer::new(knowledge_base, generator, config.knowledge_base.top_k)
                .map_err(|error| ("collaborator", error.to_string(), EXIT_COLLABORATOR))?;
        let parser = HeuristicIntentParser::new(
            config.reservations.service_slots.clone(),
            config.reservations.default_slot,
        );
        let orchestrator = BookingOrchestrator::new(Arc::new(parser), ledger, Arc::new(answerer));

        let mut session = SessionContext::new();
        let outcome = orchestrator
            .handle_message(&mut session, message)
            .await
            .map_err(|OrchestratorError::Ledger(error)| ledger_failure(error));
        pool.close().await;
        outcome
    });

    match result {
        Ok(outcome) => CommandResult::success("chat", outcome.reply()),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("chat", error_class, message, exit_code)
        }
    }
}
