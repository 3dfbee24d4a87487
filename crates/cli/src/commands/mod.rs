pub mod book;
pub mod chat;
pub mod config;
pub mod doctor;
pub mod index;
pub mod migrate;
pub mod reservations;

use maitre_core::config::{AppConfig, LoadOptions};
use maitre_core::retrieval::{load_documents, SourceDocument};
use maitre_db::{
    connect_with_settings, migrations, CapacityLedger, DbPool, LedgerError,
    SqlReservationRepository,
};
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Runtime;

pub const EXIT_CONFIG: u8 = 2;
pub const EXIT_RUNTIME: u8 = 3;
pub const EXIT_DB_CONNECT: u8 = 4;
pub const EXIT_MIGRATION: u8 = 5;
pub const EXIT_INVALID_INPUT: u8 = 6;
pub const EXIT_STORAGE: u8 = 7;
pub const EXIT_RETRIEVAL: u8 = 8;
pub const EXIT_NOT_FOUND: u8 = 9;
pub const EXIT_CAPACITY: u8 = 10;
pub const EXIT_COLLABORATOR: u8 = 11;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome {
    command: String,
    status: String,
    error_class: Option<String>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "ok".to_string(),
            error_class: None,
            message: message.into(),
        };
        Self { exit_code: 0, output: serialize_payload(payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command: command.to_string(),
            status: "error".to_string(),
            error_class: Some(error_class.to_string()),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(payload) }
    }
}

/// Failure carried out of an async block: `(error_class, message, exit_code)`.
pub(crate) type Failure = (&'static str, String, u8);

pub(crate) fn load_config(command: &str) -> Result<AppConfig, CommandResult> {
    AppConfig::load(LoadOptions::default()).map_err(|error| {
        CommandResult::failure(
            command,
            "config_validation",
            format!("configuration issue: {error}"),
            EXIT_CONFIG,
        )
    })
}

pub(crate) fn runtime(command: &str) -> Result<Runtime, CommandResult> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|error| {
        CommandResult::failure(
            command,
            "runtime_init",
            format!("failed to initialize async runtime: {error}"),
            EXIT_RUNTIME,
        )
    })
}

pub(crate) async fn open_pool(config: &AppConfig) -> Result<DbPool, Failure> {
    let pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(|error| ("db_connectivity", error.to_string(), EXIT_DB_CONNECT))?;
    migrations::run_pending(&pool)
        .await
        .map_err(|error| ("migration", error.to_string(), EXIT_MIGRATION))?;
    Ok(pool)
}

/// Documents are optional for every command except `index`; a missing directory reads as empty.
pub(crate) fn documents_or_empty(config: &AppConfig) -> Vec<SourceDocument> {
    load_documents(&config.knowledge_base.documents_dir).unwrap_or_default()
}

pub(crate) async fn open_ledger(config: &AppConfig) -> Result<(DbPool, CapacityLedger), Failure> {
    let pool = open_pool(config).await?;
    let policy = config
        .capacity
        .resolve_policy_with_documents(&documents_or_empty(config))
        .map_err(|error| ("config_validation", error.to_string(), EXIT_CONFIG))?;
    let ledger = CapacityLedger::new(Arc::new(SqlReservationRepository::new(pool.clone())), policy);
    Ok((pool, ledger))
}

pub(crate) fn ledger_error_class(error: &LedgerError) -> (&'static str, u8) {
    match error {
        LedgerError::NotFound(_) => ("not_found", EXIT_NOT_FOUND),
        LedgerError::Domain(_) => ("invalid_input", EXIT_INVALID_INPUT),
        LedgerError::Storage(_) => ("storage", EXIT_STORAGE),
    }
}

pub(crate) fn ledger_failure(error: LedgerError) -> Failure {
    let (error_class, exit_code) = ledger_error_class(&error);
    (error_class, error.to_string(), exit_code)
}

fn serialize_payload(payload: CommandOutcome) -> String {
    serde_json::to_string(&payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
