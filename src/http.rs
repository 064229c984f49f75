//! HTTP trigger surface: the send / process endpoints plus site-registry and
//! publish-record CRUD for the UI.

use crate::articles::ArticleStore;
use crate::db::{self, Pool};
use crate::model::{NewSite, PublishStatus, SiteUpdate};
use crate::send::{self, SendError, SendRequest};
use crate::sweep;
use crate::wordpress::WordPressService;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool,
    pub articles: Arc<dyn ArticleStore>,
    pub wordpress: Arc<dyn WordPressService>,
    pub due_batch_limit: i64,
}

/// Generic API response wrapper; mirrors the `{ success, data?, error? }`
/// envelope the UI consumes.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: message.into(),
        }
    }
}

fn internal_error(err: anyhow::Error) -> Response {
    error!(?err, "request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("内部错误，请稍后重试")),
    )
        .into_response()
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/send-to-wordpress", post(send_to_wordpress))
        .route("/api/process-scheduled-posts", post(process_scheduled_posts))
        .route("/api/sites", get(list_sites).post(create_site))
        .route(
            "/api/sites/{id}",
            get(get_site).put(update_site).delete(delete_site),
        )
        .route("/api/publish-records", get(list_records))
        .route("/api/publish-records/{id}", delete(delete_record))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> impl IntoResponse {
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

async fn send_to_wordpress(
    State(state): State<AppState>,
    Json(req): Json<SendRequest>,
) -> Response {
    match send::send_to_sites(
        &state.pool,
        state.articles.as_ref(),
        state.wordpress.as_ref(),
        &req,
        Utc::now(),
    )
    .await
    {
        Ok(resp) => (StatusCode::OK, Json(ApiResponse::success(resp))).into_response(),
        Err(SendError::Invalid(message)) => {
            (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response()
        }
        Err(err @ SendError::Upstream(_)) => {
            (StatusCode::BAD_GATEWAY, Json(ErrorResponse::new(err.to_string()))).into_response()
        }
        Err(SendError::Internal(err)) => internal_error(err),
    }
}

async fn process_scheduled_posts(State(state): State<AppState>) -> Response {
    match sweep::process_due(
        &state.pool,
        state.articles.as_ref(),
        state.wordpress.as_ref(),
        Utc::now(),
        state.due_batch_limit,
    )
    .await
    {
        Ok(report) => (StatusCode::OK, Json(ApiResponse::success(report))).into_response(),
        Err(err) => internal_error(err),
    }
}

// ---------------------------------------------------------------------------
// Site registry
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListSitesQuery {
    #[serde(default)]
    active: Option<bool>,
}

async fn list_sites(State(state): State<AppState>, Query(q): Query<ListSitesQuery>) -> Response {
    match db::list_sites(&state.pool, q.active.unwrap_or(false)).await {
        Ok(sites) => (StatusCode::OK, Json(ApiResponse::success(sites))).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn create_site(State(state): State<AppState>, Json(site): Json<NewSite>) -> Response {
    for (value, message) in [
        (&site.name, "name 不能为空"),
        (&site.url, "url 不能为空"),
        (&site.username, "username 不能为空"),
        (&site.app_password, "appPassword 不能为空"),
    ] {
        if value.trim().is_empty() {
            return (StatusCode::BAD_REQUEST, Json(ErrorResponse::new(message))).into_response();
        }
    }
    match db::create_site(&state.pool, &site).await {
        Ok(id) => match db::get_site(&state.pool, id).await {
            Ok(Some(created)) => {
                (StatusCode::CREATED, Json(ApiResponse::success(created))).into_response()
            }
            Ok(None) => internal_error(anyhow::anyhow!("created site {id} not found")),
            Err(err) => internal_error(err),
        },
        Err(err) => internal_error(err),
    }
}

async fn get_site(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match db::get_site(&state.pool, id).await {
        Ok(Some(site)) => (StatusCode::OK, Json(ApiResponse::success(site))).into_response(),
        Ok(None) => (StatusCode::NOT_FOUND, Json(ErrorResponse::new("站点不存在"))).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn update_site(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(update): Json<SiteUpdate>,
) -> Response {
    match db::update_site(&state.pool, id, &update).await {
        Ok(true) => match db::get_site(&state.pool, id).await {
            Ok(Some(site)) => (StatusCode::OK, Json(ApiResponse::success(site))).into_response(),
            Ok(None) => {
                (StatusCode::NOT_FOUND, Json(ErrorResponse::new("站点不存在"))).into_response()
            }
            Err(err) => internal_error(err),
        },
        Ok(false) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new("站点不存在"))).into_response()
        }
        Err(err) => internal_error(err),
    }
}

async fn delete_site(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match db::delete_site(&state.pool, id).await {
        Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
        Ok(false) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new("站点不存在"))).into_response()
        }
        Err(err) => internal_error(err),
    }
}

// ---------------------------------------------------------------------------
// Publish records
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ListRecordsQuery {
    #[serde(default)]
    article_id: Option<i64>,
}

async fn list_records(
    State(state): State<AppState>,
    Query(q): Query<ListRecordsQuery>,
) -> Response {
    let result = match q.article_id {
        Some(article_id) => db::list_records_for_article(&state.pool, article_id).await,
        None => db::list_recent_records(&state.pool, 100).await,
    };
    match result {
        Ok(records) => (StatusCode::OK, Json(ApiResponse::success(records))).into_response(),
        Err(err) => internal_error(err),
    }
}

async fn delete_record(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match db::get_record(&state.pool, id).await {
        Ok(None) => {
            (StatusCode::NOT_FOUND, Json(ErrorResponse::new("记录不存在"))).into_response()
        }
        Ok(Some(record)) if record.status != PublishStatus::Scheduled => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new("仅可删除待发布状态的记录")),
        )
            .into_response(),
        Ok(Some(record)) => match db::delete_record(&state.pool, record.id).await {
            // The record may have been claimed between the read and the
            // conditional delete; treat that as the same conflict.
            Ok(true) => (StatusCode::OK, Json(ApiResponse::success(()))).into_response(),
            Ok(false) => (
                StatusCode::CONFLICT,
                Json(ErrorResponse::new("仅可删除待发布状态的记录")),
            )
                .into_response(),
            Err(err) => internal_error(err),
        },
        Err(err) => internal_error(err),
    }
}
