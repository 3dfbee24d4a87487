use std::sync::Arc;

use maitre_agent::{
    build_embedder, build_generator, AnswerError, BookingOrchestrator, GenerationError,
    HeuristicIntentParser, RetrievalAugmentedAnswerer,
};
use maitre_core::config::{AppConfig, ConfigError};
use maitre_core::retrieval::{load_documents, KnowledgeBase, RetrievalError, SourceDocument};
use maitre_db::{
    connect_with_settings, migrations, CapacityLedger, DbPool, SqlReservationRepository,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub orchestrator: Arc<BookingOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("embedding provider setup failed: {0}")]
    Embedder(#[source] RetrievalError),
    #[error("answer provider setup failed: {0}")]
    Generator(#[source] GenerationError),
    #[error("answerer setup failed: {0}")]
    Answerer(#[source] AnswerError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let documents = initial_documents(&config);
    let policy = config.capacity.resolve_policy_with_documents(&documents)?;
    info!(
        event_name = "system.bootstrap.capacity_policy",
        correlation_id = "bootstrap",
        max_capacity = policy.max_capacity,
        granularity = policy.granularity.as_str(),
        "capacity policy resolved"
    );
    let ledger =
        CapacityLedger::new(Arc::new(SqlReservationRepository::new(db_pool.clone())), policy);

    let embedder = build_embedder(&config.embedding).map_err(BootstrapError::Embedder)?;
    let knowledge_base = Arc::new(
        KnowledgeBase::new(embedder, config.knowledge_base.chunking()?)
            .with_batch_size(config.embedding.batch_size),
    );
    if !documents.is_empty() {
        // The handle is dropped; the rebuild logs its own outcome.
        let _build = knowledge_base.spawn_rebuild(documents);
    }

    let generator = build_generator(&config.llm).map_err(BootstrapError::Generator)?;
    let answerer = RetrievalAugmentedAnswerer::new(
        Arc::clone(&knowledge_base),
        generator,
        config.knowledge_base.top_k,
    )
    .map_err(BootstrapError::Answerer)?;
    let parser = HeuristicIntentParser::new(
        config.reservations.service_slots.clone(),
        config.reservations.default_slot,
    );
    let orchestrator =
        Arc::new(BookingOrchestrator::new(Arc::new(parser), ledger, Arc::new(answerer)));

    Ok(Application { config, db_pool, knowledge_base, orchestrator })
}

/// Missing or unreadable documents leave the knowledge base unbuilt; chat still books tables.
fn initial_documents(config: &AppConfig) -> Vec<SourceDocument> {
    match load_documents(&config.knowledge_base.documents_dir) {
        Ok(documents) => documents,
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.documents_unavailable",
                correlation_id = "bootstrap",
                documents_dir = %config.knowledge_base.documents_dir.display(),
                error = %error,
                "knowledge base documents could not be loaded"
            );
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};

    use maitre_core::capacity::DEFAULT_MAX_CAPACITY;
    use maitre_core::config::{AppConfig, ConfigOverrides, LoadOptions};
    use crate::bootstrap::{bootstrap_with_config, Application};

    fn overrides(dir: &Path, documents_dir: PathBuf) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(format!("sqlite://{}", dir.join("maitre.db").display())),
                documents_dir: Some(documents_dir),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    async fn bootstrap(options: LoadOptions) -> Application {
        let config = AppConfig::load(options).expect("config should load");
        bootstrap_with_config(config).await.expect("bootstrap should succeed")
    }

    #[tokio::test]
    async fn bootstrap_migrates_and_reads_capacity_from_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("policy.txt"), "Seating policy\nMax Capacity: 80\n")
            .expect("write policy");

        let app = bootstrap(overrides(dir.path(), dir.path().to_path_buf())).await;

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'reservation'",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("reservation table");
        assert_eq!(table_count, 1);
        assert_eq!(app.orchestrator.ledger().policy().max_capacity, 80);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn bootstrap_tolerates_missing_documents_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap(overrides(dir.path(), dir.path().join("absent"))).await;

        assert!(!app.knowledge_base.is_ready().await);
        assert_eq!(app.orchestrator.ledger().policy().max_capacity, DEFAULT_MAX_CAPACITY);
        app.db_pool.close().await;
    }
}
