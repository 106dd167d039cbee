//! Route handlers. Thin by design: validate, call the service, map the
//! result into the wire shape (camelCase JSON).

use axum::Json;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use lexrag::LexError;
use lexrag::services::{AnalyzeRequest, IndexRequest};
use lexrag::verify::TrustLabel;

use crate::error::ApiError;
use crate::state::AppState;

/// User attribution header until real authentication fronts the service.
const USER_HEADER: &str = "x-user-id";
const DEFAULT_USER: &str = "default-user";

pub fn router(state: AppState) -> axum::Router {
    axum::Router::new()
        .route("/v1/index", post(index_document))
        .route("/v1/analyze", post(analyze_document))
        .route("/v1/history/{document_id}", get(query_history))
        .route("/v1/health", get(health))
        .route("/metrics", get(metrics))
        .route("/admin/cache/clear", post(clear_cache))
        .with_state(state)
}

// ── POST /v1/index ─────────────────────────────────────────────────────

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexBody {
    document_id: Uuid,
    filename: String,
    chunks_created: usize,
    status: String,
}

async fn index_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<IndexBody>, ApiError> {
    let user_id = user_of(&headers);

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| LexError::validation(format!("invalid multipart body: {err}")))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .ok_or_else(|| LexError::validation("file part carries no filename"))?
                .to_string();
            let bytes = field
                .bytes()
                .await
                .map_err(|err| LexError::validation(format!("unreadable file part: {err}")))?;
            upload = Some((filename, bytes.to_vec()));
        }
    }
    let (filename, bytes) =
        upload.ok_or_else(|| LexError::validation("multipart field 'file' is required"))?;

    let outcome = state
        .indexer
        .index(IndexRequest {
            user_id,
            filename,
            bytes,
        })
        .await?;

    Ok(Json(IndexBody {
        document_id: outcome.document_id,
        filename: outcome.filename,
        chunks_created: outcome.chunks_created,
        status: outcome.status,
    }))
}

// ── POST /v1/analyze ───────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeBody {
    file_id: Uuid,
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeReply {
    answer: String,
    citations: Vec<CitationBody>,
    confidence: f32,
    trust_label: TrustLabel,
    request_id: String,
    unsupported_claims: Vec<String>,
    metadata: AnalyzeMetadataBody,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CitationBody {
    section_id: String,
    content: String,
    confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    chunk_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeMetadataBody {
    latency_ms: u64,
    tokens_used: u64,
    chunks_retrieved: usize,
    model_version: String,
    pii_entities_anonymized: usize,
}

async fn analyze_document(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<AnalyzeReply>, ApiError> {
    let response = state
        .analyze
        .analyze(AnalyzeRequest {
            file_id: body.file_id,
            query: body.query,
            top_k: body.top_k,
        })
        .await?;

    Ok(Json(AnalyzeReply {
        answer: response.answer,
        citations: response
            .citations
            .into_iter()
            .map(|c| CitationBody {
                section_id: c.section_id,
                content: c.content,
                confidence: c.confidence,
                chunk_id: c.chunk_id,
            })
            .collect(),
        confidence: response.confidence,
        trust_label: response.trust_label,
        request_id: response.request_id,
        unsupported_claims: response.unsupported_claims,
        metadata: AnalyzeMetadataBody {
            latency_ms: response.metadata.latency_ms,
            tokens_used: response.metadata.tokens_used,
            chunks_retrieved: response.metadata.chunks_retrieved,
            model_version: response.metadata.model_version,
            pii_entities_anonymized: response.metadata.pii_entities_anonymized,
        },
    }))
}

// ── GET /v1/history/{document_id} ──────────────────────────────────────

#[derive(Deserialize)]
struct HistoryParams {
    #[serde(default = "default_history_limit")]
    limit: usize,
}

fn default_history_limit() -> usize {
    50
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HistoryEntryBody {
    query_hash: String,
    response_hash: String,
    latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tokens_used: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_version: Option<String>,
    citations_count: usize,
    confidence: f32,
    created_at: chrono::DateTime<Utc>,
}

async fn query_history(
    State(state): State<AppState>,
    Path(document_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<Vec<HistoryEntryBody>>, ApiError> {
    let document_id = Uuid::parse_str(&document_id)
        .map_err(|_| LexError::validation("invalid document ID"))?;

    let entries = state.analyze.history(document_id, params.limit).await?;
    Ok(Json(
        entries
            .into_iter()
            .map(|e| HistoryEntryBody {
                query_hash: e.query_hash,
                response_hash: e.response_hash,
                latency_ms: e.latency_ms,
                tokens_used: e.tokens_used,
                model_version: e.model_version,
                citations_count: e.citations_count,
                confidence: e.confidence,
                created_at: e.created_at,
            })
            .collect(),
    ))
}

// ── GET /v1/health ─────────────────────────────────────────────────────

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    kv: bool,
    vector_store: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

async fn health(State(state): State<AppState>) -> Json<HealthBody> {
    let kv_alive = state.kv.ping().await;
    Json(HealthBody {
        status: if kv_alive { "healthy" } else { "degraded" },
        kv: kv_alive,
        vector_store: "connected",
        timestamp: Utc::now(),
    })
}

// ── GET /metrics ───────────────────────────────────────────────────────

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let pool = state.kv.pool_stats();
    metrics::gauge!("lexrag_kv_pool_max_connections").set(f64::from(pool.max_connections));
    metrics::gauge!("lexrag_kv_pool_in_use_connections").set(f64::from(pool.in_use_connections));
    metrics::gauge!("lexrag_kv_pool_available_connections")
        .set(f64::from(pool.available_connections));

    match &state.prometheus {
        Some(handle) => handle.render(),
        None => String::new(),
    }
}

// ── POST /admin/cache/clear ────────────────────────────────────────────

#[derive(Deserialize)]
struct ClearParams {
    #[serde(default = "default_clear_pattern")]
    pattern: String,
}

fn default_clear_pattern() -> String {
    "*".to_string()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ClearBody {
    cleared_count: usize,
    pattern: String,
}

async fn clear_cache(
    State(state): State<AppState>,
    Query(params): Query<ClearParams>,
) -> Result<Json<ClearBody>, ApiError> {
    if !state.settings.cache_enabled {
        return Err(LexError::validation("cache is disabled").into());
    }
    let cleared_count = state.cache.invalidate(&params.pattern).await;
    tracing::info!(pattern = %params.pattern, cleared_count, "cache cleared by admin");
    Ok(Json(ClearBody {
        cleared_count,
        pattern: params.pattern,
    }))
}

fn user_of(headers: &HeaderMap) -> String {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or(DEFAULT_USER)
        .to_string()
}
