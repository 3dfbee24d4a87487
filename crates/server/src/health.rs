use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use maitre_core::retrieval::KnowledgeBase;
use maitre_db::DbPool;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub knowledge_base: Arc<KnowledgeBase>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub knowledge_base: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

/// 503 only when the database is unreachable; an unbuilt index still serves bookings.
pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let knowledge_base = knowledge_base_check(&state.knowledge_base).await;
    let database_ready = database.status == "ready";
    let ready = database_ready && knowledge_base.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "maitre-server runtime initialized".to_string(),
        },
        database,
        knowledge_base,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if database_ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

async fn knowledge_base_check(knowledge_base: &KnowledgeBase) -> HealthCheck {
    match knowledge_base.summary().await {
        Some(summary) => HealthCheck {
            status: "ready",
            detail: format!(
                "{} chunks from {} documents",
                summary.chunk_count, summary.document_count
            ),
        },
        None => HealthCheck {
            status: "not_ready",
            detail: "knowledge base not initialized".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::StatusCode, Json};
    use maitre_core::retrieval::{ChunkingConfig, HashingEmbedder, KnowledgeBase, SourceDocument};
    use maitre_db::connect_with_settings;

    use crate::health::{health, HealthState};

    fn knowledge_base() -> Arc<KnowledgeBase> {
        Arc::new(KnowledgeBase::new(Arc::new(HashingEmbedder::default()), ChunkingConfig::default()))
    }

    #[tokio::test]
    async fn health_is_ready_with_database_and_index() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        let kb = knowledge_base();
        kb.rebuild(&SourceDocument::from_texts(["Open daily from 5 PM."])).await.expect("build");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), knowledge_base: kb })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.knowledge_base.detail, "1 chunks from 1 documents");

        pool.close().await;
    }

    #[tokio::test]
    async fn unbuilt_index_degrades_without_failing_the_probe() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool.clone(), knowledge_base: knowledge_base() }))
                .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.knowledge_base.status, "not_ready");
        assert_eq!(payload.database.status, "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn closed_database_is_service_unavailable() {
        let pool = connect_with_settings("sqlite::memory:", 1, 5).await.expect("pool should connect");
        pool.close().await;

        let (status, Json(payload)) =
            health(State(HealthState { db_pool: pool, knowledge_base: knowledge_base() })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.database.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }
}
