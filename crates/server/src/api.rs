//! JSON API: chat turns, knowledge base administration and reservation administration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use maitre_agent::{BookingOrchestrator, OrchestratorError, TurnOutcome};
use maitre_core::domain::reservation::{
    Reservation, ReservationFilter, ReservationId, ReservationStatus,
};
use maitre_core::errors::{ApplicationError, InterfaceError};
use maitre_core::retrieval::{load_documents, IndexSummary, KnowledgeBase, RetrievalError};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::sessions::SessionStore;

#[derive(Clone)]
pub struct ApiState {
    pub orchestrator: Arc<BookingOrchestrator>,
    pub knowledge_base: Arc<KnowledgeBase>,
    pub documents_dir: PathBuf,
    pub sessions: Arc<SessionStore>,
}

impl ApiState {
    pub fn new(
        orchestrator: Arc<BookingOrchestrator>,
        knowledge_base: Arc<KnowledgeBase>,
        documents_dir: PathBuf,
        session_idle: Duration,
    ) -> Self {
        Self {
            orchestrator,
            knowledge_base,
            documents_dir,
            sessions: Arc::new(SessionStore::new(session_idle)),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    pub message: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: Option<Uuid>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub session_id: Uuid,
    /// User turns in this session so far, including this one.
    pub turn_number: usize,
    pub reply: String,
    #[serde(flatten)]
    pub turn: TurnOutcome,
}

#[derive(Debug, Serialize)]
pub struct RebuildAccepted {
    pub status: &'static str,
    pub document_count: usize,
}

#[derive(Debug, Serialize)]
pub struct IndexStatus {
    pub ready: bool,
    pub chunk_count: usize,
    pub summary: Option<IndexSummary>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/chat", post(chat))
        .route("/api/v1/chat/{session_id}", delete(end_session))
        .route("/api/v1/admin/index", get(index_status))
        .route("/api/v1/admin/index/rebuild", post(rebuild_index))
        .route("/api/v1/reservations", get(list_reservations))
        .route("/api/v1/reservations/{id}/status", post(update_reservation_status))
        .with_state(state)
}

async fn chat(
    State(state): State<ApiState>,
    Json(request): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    let correlation_id = Uuid::new_v4().to_string();
    let message = request.message.trim();
    if message.is_empty() {
        return Err(api_error(InterfaceError::BadRequest {
            message: "message must not be empty".to_string(),
            correlation_id,
        }));
    }

    let mut session = state.sessions.checkout(request.session_id).await;
    let result = state.orchestrator.handle_message(&mut session, message).await;
    let session_id = session.id;
    let turn_number = session.turns();
    drop(session);
    state.sessions.touch(session_id).await;

    let turn = result.map_err(|OrchestratorError::Ledger(error)| {
        application_error(ApplicationError::from(error), &correlation_id)
    })?;
    Ok(Json(ChatResponse { session_id, turn_number, reply: turn.reply(), turn }))
}

async fn end_session(
    State(state): State<ApiState>,
    Path(session_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    if state.sessions.end(session_id).await {
        let remaining = state.sessions.len().await;
        info!(
            event_name = "server.session.ended",
            correlation_id = %session_id,
            remaining,
            "chat session ended"
        );
        return Ok(StatusCode::NO_CONTENT);
    }
    Err(api_error(InterfaceError::NotFound {
        message: format!("chat session {session_id}"),
        correlation_id: Uuid::new_v4().to_string(),
    }))
}

async fn index_status(State(state): State<ApiState>) -> Json<IndexStatus> {
    let summary = state.knowledge_base.summary().await;
    Json(IndexStatus {
        ready: summary.is_some(),
        chunk_count: summary.as_ref().map_or(0, |summary| summary.chunk_count),
        summary,
    })
}

async fn rebuild_index(
    State(state): State<ApiState>,
) -> ApiResult<(StatusCode, Json<RebuildAccepted>)> {
    let correlation_id = Uuid::new_v4().to_string();
    let documents = load_documents(&state.documents_dir)
        .map_err(|error| application_error(error.into(), &correlation_id))?;
    if !documents.iter().any(|document| document.has_text()) {
        return Err(application_error(RetrievalError::EmptyCorpus.into(), &correlation_id));
    }

    let document_count = documents.len();
    info!(
        event_name = "server.index.rebuild_requested",
        correlation_id = %correlation_id,
        document_count,
        "knowledge base rebuild requested"
    );
    // The task logs its own failure and keeps the previous index.
    let _build = state.knowledge_base.spawn_rebuild(documents);

    Ok((StatusCode::ACCEPTED, Json(RebuildAccepted { status: "accepted", document_count })))
}

async fn list_reservations(
    State(state): State<ApiState>,
    Query(filter): Query<ReservationFilter>,
) -> ApiResult<Json<Vec<Reservation>>> {
    let correlation_id = Uuid::new_v4().to_string();
    state
        .orchestrator
        .ledger()
        .list_reservations(&filter)
        .await
        .map(Json)
        .map_err(|error| application_error(error.into(), &correlation_id))
}

async fn update_reservation_status(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(request): Json<StatusUpdateRequest>,
) -> ApiResult<Json<Reservation>> {
    let correlation_id = Uuid::new_v4().to_string();
    let status = ReservationStatus::parse(&request.status).ok_or_else(|| {
        api_error(InterfaceError::BadRequest {
            message: format!("unknown reservation status `{}`", request.status),
            correlation_id: correlation_id.clone(),
        })
    })?;

    state
        .orchestrator
        .ledger()
        .update_status(ReservationId(id), status)
        .await
        .map(Json)
        .map_err(|error| application_error(error.into(), &correlation_id))
}

fn application_error(error: ApplicationError, correlation_id: &str) -> (StatusCode, Json<ApiError>) {
    api_error(error.into_interface(correlation_id))
}

fn api_error(error: InterfaceError) -> (StatusCode, Json<ApiError>) {
    let status = match &error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(
        event_name = "server.request.failed",
        correlation_id = %error.correlation_id(),
        status = status.as_u16(),
        error = %error,
        "request failed"
    );

    (
        status,
        Json(ApiError {
            error: error.to_string(),
            message: error.user_message().to_string(),
            correlation_id: error.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::{
        body::{to_bytes, Body},
        http::{header, Method, Request, StatusCode},
        Router,
    };
    use maitre_agent::{
        AnswerGenerator, BookingOrchestrator, GenerationError, HeuristicIntentParser, Persona,
        RetrievalAugmentedAnswerer,
    };
    use maitre_core::capacity::{CapacityGranularity, CapacityPolicy};
    use maitre_core::domain::time_slot::TimeSlot;
    use maitre_core::retrieval::{ChunkingConfig, HashingEmbedder, KnowledgeBase};
    use maitre_db::{CapacityLedger, InMemoryReservationRepository};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::{router, ApiState};

    struct EchoGenerator;

    #[async_trait]
    impl AnswerGenerator for EchoGenerator {
        fn model_id(&self) -> &str {
            "echo"
        }

        async fn generate(&self, _: &str, persona: Persona) -> Result<String, GenerationError> {
            Ok(format!("answered by {}", persona.role()))
        }
    }

    fn app(documents_dir: PathBuf, max_capacity: u32) -> (Router, Arc<KnowledgeBase>) {
        let knowledge_base = Arc::new(KnowledgeBase::new(
            Arc::new(HashingEmbedder::default()),
            ChunkingConfig::default(),
        ));
        let answerer =
            RetrievalAugmentedAnswerer::new(Arc::clone(&knowledge_base), Arc::new(EchoGenerator), 3)
                .expect("answerer");
        let ledger = CapacityLedger::new(
            Arc::new(InMemoryReservationRepository::default()),
            CapacityPolicy::new(max_capacity, CapacityGranularity::PerSlot),
        );
        let parser = HeuristicIntentParser::new(
            (17..=21).map(TimeSlot::on_the_hour).collect(),
            TimeSlot::on_the_hour(19),
        );
        let orchestrator =
            Arc::new(BookingOrchestrator::new(Arc::new(parser), ledger, Arc::new(answerer)));

        let state = ApiState::new(
            orchestrator,
            Arc::clone(&knowledge_base),
            documents_dir,
            Duration::from_secs(60),
        );
        (router(state), knowledge_base)
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        let response = app
            .clone()
            .oneshot(builder.body(body).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    #[tokio::test]
    async fn chat_books_a_table_and_keeps_the_session() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _) = app(dir.path().to_path_buf(), 50);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(json!({ "message": "I'd like to book a table for 4 on 2030-07-04" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["kind"], "reservation");
        assert_eq!(body["reservation"]["party_size"], 4);
        assert_eq!(body["reservation"]["date"], "2030-07-04");
        let reply = body["reply"].as_str().expect("reply");
        assert!(reply.starts_with("Reservation #1"));
        assert!(reply.contains("knowledge base not initialized"));

        let session_id = body["session_id"].as_str().expect("session id").to_string();
        let (_, second) = send(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(json!({ "session_id": session_id, "message": "What is on the menu?" })),
        )
        .await;
        assert_eq!(second["session_id"], session_id);
        assert_eq!(second["kind"], "inquiry");
        assert_eq!(second["turn_number"], 2);

        let uri = format!("/api/v1/chat/{session_id}");
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, restarted) = send(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(json!({ "session_id": session_id, "message": "Are you open late?" })),
        )
        .await;
        assert_eq!(restarted["turn_number"], 1);
    }

    #[tokio::test]
    async fn empty_chat_message_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _) = app(dir.path().to_path_buf(), 50);

        let (status, body) =
            send(&app, Method::POST, "/api/v1/chat", Some(json!({ "message": "   " }))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["correlation_id"].as_str().is_some_and(|id| !id.is_empty()));
    }

    #[tokio::test]
    async fn rebuild_is_accepted_and_index_becomes_ready() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("menu.md"), "# Menu\nMargherita pizza, vegan options.")
            .expect("write");
        let (app, knowledge_base) = app(dir.path().to_path_buf(), 50);

        let (status, body) = send(&app, Method::POST, "/api/v1/admin/index/rebuild", None).await;
        assert_eq!(status, StatusCode::ACCEPTED);
        assert_eq!(body["document_count"], 1);

        for _ in 0..100 {
            if knowledge_base.is_ready().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }

        let (status, body) = send(&app, Method::GET, "/api/v1/admin/index", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);
        assert_eq!(body["chunk_count"], 1);

        let (_, answer) = send(
            &app,
            Method::POST,
            "/api/v1/chat",
            Some(json!({ "message": "Do you have vegan options?" })),
        )
        .await;
        assert_eq!(answer["reply"], "answered by Customer Support");
    }

    #[tokio::test]
    async fn rebuild_without_documents_is_a_bad_request() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _) = app(dir.path().to_path_buf(), 50);

        let (status, _) = send(&app, Method::POST, "/api/v1/admin/index/rebuild", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reservations_can_be_listed_and_cancelled() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _) = app(dir.path().to_path_buf(), 50);

        for message in ["reserve for 2 on 2030-06-01 at 6pm", "reserve for 5 on 2030-06-01 at 8pm"] {
            send(&app, Method::POST, "/api/v1/chat", Some(json!({ "message": message }))).await;
        }

        let (status, listed) =
            send(&app, Method::GET, "/api/v1/reservations?date=2030-06-01", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(listed.as_array().map(Vec::len), Some(2));

        let (status, filtered) = send(
            &app,
            Method::GET,
            "/api/v1/reservations?date=2030-06-01&time_slot=8:00%20PM",
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(filtered[0]["party_size"], 5);

        let (status, updated) = send(
            &app,
            Method::POST,
            "/api/v1/reservations/1/status",
            Some(json!({ "status": "cancelled" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["status"], "cancelled");

        let (status, _) = send(
            &app,
            Method::POST,
            "/api/v1/reservations/1/status",
            Some(json!({ "status": "confirmed" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_reservation_is_not_found() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (app, _) = app(dir.path().to_path_buf(), 50);

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/v1/reservations/99/status",
            Some(json!({ "status": "confirmed" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "The requested record does not exist.");
    }
}
