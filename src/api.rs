//! HTTP boundary (C10): a thin axum router translating the four documented
//! endpoints into calls on the application context. No business logic
//! lives here beyond request/response (de)serialization.

use crate::config::AppConfig;
use crate::embedder::Embedder;
use crate::generator::Generator;
use crate::retrieval::call_rag_flow;
use crate::store::KnowledgeStore;
use crate::types::FileMeta;
use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<KnowledgeStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn Generator>,
    pub config: Arc<AppConfig>,
}

impl AppState {
    pub fn new(
        store: Arc<KnowledgeStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn Generator>,
        config: Arc<AppConfig>,
    ) -> Self {
        Self {
            store,
            embedder,
            generator,
            config,
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/chat", post(chat_handler))
        .route("/doc", get(list_docs_handler).post(add_doc_handler))
        .route("/doc/{file_id}", delete(delete_doc_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    response: String,
}

async fn chat_handler(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Json<ChatResponse> {
    let result = call_rag_flow(
        &state.store,
        state.embedder.as_ref(),
        state.generator.as_ref(),
        &state.config.retrieval,
        &request.text,
    )
    .await;

    let response = match result {
        Ok(text) => text,
        Err(e) => {
            error!(error = %e, "chat request failed");
            format!("error: {e}")
        }
    };
    Json(ChatResponse { response })
}

#[derive(Debug, Serialize)]
struct ListDocsResponse {
    docs: Vec<FileMeta>,
}

async fn list_docs_handler(State(state): State<AppState>) -> Json<ListDocsResponse> {
    Json(ListDocsResponse {
        docs: state.store.list_files().await,
    })
}

#[derive(Debug, Deserialize)]
struct AddDocRequest {
    name: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl StatusResponse {
    fn ok() -> Self {
        Self {
            status: "ok",
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            status: "error",
            message: Some(message.into()),
        }
    }
}

async fn add_doc_handler(
    State(state): State<AppState>,
    Json(request): Json<AddDocRequest>,
) -> Json<StatusResponse> {
    match state.store.add_file(&request.name, &request.content).await {
        Ok(_) => Json(StatusResponse::ok()),
        Err(e) => {
            error!(error = %e, "add_doc failed");
            Json(StatusResponse::error(e.to_string()))
        }
    }
}

async fn delete_doc_handler(
    State(state): State<AppState>,
    Path(file_id): Path<String>,
) -> Json<StatusResponse> {
    match state.store.delete_file(&file_id).await {
        Ok(()) => Json(StatusResponse::ok()),
        Err(e) => {
            error!(error = %e, "delete_doc failed");
            Json(StatusResponse::error(e.to_string()))
        }
    }
}
