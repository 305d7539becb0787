//! `molar serve`: the HTTP surface over the engine's operations.
//!
//! Every route delegates to a core operation; the handlers only translate
//! between JSON and engine types, and map [`PlanError`] onto status codes.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use molar_core::PlanError;
use molar_core::catalog::TomlCatalog;
use molar_core::coordinator::{self, CompletionOutcome};
use molar_core::items::{self, ItemPatch, NewItem};
use molar_core::lifecycle;
use molar_core::service::{self, NewPlan};
use molar_db::models::{PlanItem, PlanPriority, TreatmentPlan};
use molar_db::queries::items::PlanProgress;

// ---------------------------------------------------------------------------
// State and error type
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct AppState {
    pool: PgPool,
    catalog: Arc<TomlCatalog>,
}

pub struct AppError {
    status: StatusCode,
    message: String,
}

impl From<PlanError> for AppError {
    fn from(err: PlanError) -> Self {
        let status = match &err {
            PlanError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PlanError::NotFound { .. } => StatusCode::NOT_FOUND,
            PlanError::InvalidTransition { .. }
            | PlanError::PlanLocked { .. }
            | PlanError::ConcurrentModification { .. }
            | PlanError::EpisodeLinkConflict { .. } => StatusCode::CONFLICT,
            PlanError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let body = serde_json::json!({ "error": self.message });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ListPlansParams {
    pub patient: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePlanRequest {
    pub patient_id: Uuid,
    pub practitioner_id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<PlanPriority>,
    #[serde(default)]
    pub internal_notes: String,
}

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub plan_id: Uuid,
    pub service_id: Uuid,
    pub material_id: Option<Uuid>,
    #[serde(default)]
    pub notes: String,
    pub estimated_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct EditItemRequest {
    /// The item version this edit is based on.
    pub version: i32,
    pub notes: Option<String>,
    pub estimated_date: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ReasonRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LinkEpisodeRequest {
    pub episode_id: Uuid,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ProgressResponse {
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub total: i64,
    pub percent_complete: u8,
}

impl From<PlanProgress> for ProgressResponse {
    fn from(p: PlanProgress) -> Self {
        Self {
            pending: p.pending,
            in_progress: p.in_progress,
            completed: p.completed,
            total: p.total,
            percent_complete: p.percent_complete(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PlanSummaryResponse {
    #[serde(flatten)]
    pub plan: TreatmentPlan,
    pub progress: ProgressResponse,
}

#[derive(Debug, Serialize)]
pub struct PlanDetailResponse {
    #[serde(flatten)]
    pub plan: TreatmentPlan,
    pub progress: ProgressResponse,
    pub items: Vec<PlanItem>,
}

#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub item: PlanItem,
    pub plan: TreatmentPlan,
    pub progress: ProgressResponse,
}

impl From<CompletionOutcome> for CompletionResponse {
    fn from(outcome: CompletionOutcome) -> Self {
        Self {
            item: outcome.item,
            plan: outcome.plan,
            progress: outcome.progress.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(pool: PgPool, catalog: TomlCatalog) -> Router {
    let state = AppState {
        pool,
        catalog: Arc::new(catalog),
    };

    Router::new()
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/{id}", get(get_plan_detail))
        .route("/api/plans/{id}/present", post(present_plan))
        .route("/api/plans/{id}/accept", post(accept_plan))
        .route("/api/plans/{id}/reject", post(reject_plan))
        .route("/api/plans/{id}/cancel", post(cancel_plan))
        .route("/api/items", post(add_item))
        .route("/api/items/{id}", axum::routing::patch(edit_item).delete(remove_item))
        .route("/api/items/{id}/complete", post(complete_item))
        .route("/api/items/{id}/episode", post(link_episode))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub async fn run_serve(pool: PgPool, catalog: TomlCatalog, bind: &str, port: u16) -> Result<()> {
    let app = build_router(pool, catalog);
    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    tracing::info!("molar serve listening on http://{addr}");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    tracing::info!("molar serve shut down");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install Ctrl+C handler");
}

// ---------------------------------------------------------------------------
// Plan handlers
// ---------------------------------------------------------------------------

async fn list_plans(
    State(state): State<AppState>,
    Query(params): Query<ListPlansParams>,
) -> Result<Json<Vec<PlanSummaryResponse>>, AppError> {
    let plans = service::list_plans(&state.pool, params.patient).await?;

    let mut results = Vec::with_capacity(plans.len());
    for plan in plans {
        let progress = service::plan_progress(&state.pool, plan.id).await?;
        results.push(PlanSummaryResponse {
            plan,
            progress: progress.into(),
        });
    }

    Ok(Json(results))
}

async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> Result<(StatusCode, Json<TreatmentPlan>), AppError> {
    let plan = service::create_plan(
        &state.pool,
        NewPlan {
            patient_id: req.patient_id,
            practitioner_id: req.practitioner_id,
            title: req.title,
            description: req.description,
            priority: req.priority.unwrap_or(PlanPriority::Medium),
            internal_notes: req.internal_notes,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(plan)))
}

async fn get_plan_detail(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PlanDetailResponse>, AppError> {
    let (plan, items) = service::get_plan_with_items(&state.pool, id).await?;
    let progress = service::plan_progress(&state.pool, id).await?;

    Ok(Json(PlanDetailResponse {
        plan,
        progress: progress.into(),
        items,
    }))
}

async fn present_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TreatmentPlan>, AppError> {
    Ok(Json(lifecycle::present(&state.pool, id).await?))
}

async fn accept_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TreatmentPlan>, AppError> {
    Ok(Json(lifecycle::accept(&state.pool, id).await?))
}

async fn reject_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<TreatmentPlan>, AppError> {
    Ok(Json(
        lifecycle::reject(&state.pool, id, req.reason.as_deref()).await?,
    ))
}

async fn cancel_plan(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReasonRequest>,
) -> Result<Json<TreatmentPlan>, AppError> {
    Ok(Json(
        lifecycle::cancel(&state.pool, id, req.reason.as_deref().unwrap_or_default()).await?,
    ))
}

// ---------------------------------------------------------------------------
// Item handlers
// ---------------------------------------------------------------------------

async fn add_item(
    State(state): State<AppState>,
    Json(req): Json<AddItemRequest>,
) -> Result<(StatusCode, Json<PlanItem>), AppError> {
    let item = items::add_item(
        &state.pool,
        state.catalog.as_ref(),
        req.plan_id,
        NewItem {
            service_id: req.service_id,
            material_id: req.material_id,
            notes: req.notes,
            estimated_date: req.estimated_date,
        },
    )
    .await?;

    Ok((StatusCode::CREATED, Json(item)))
}

async fn edit_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<EditItemRequest>,
) -> Result<Json<PlanItem>, AppError> {
    let item = items::edit_item(
        &state.pool,
        id,
        req.version,
        ItemPatch {
            notes: req.notes,
            estimated_date: req.estimated_date,
        },
    )
    .await?;

    Ok(Json(item))
}

async fn remove_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    items::remove_item(&state.pool, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn complete_item(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CompletionResponse>, AppError> {
    let outcome = coordinator::complete_item_manually(&state.pool, id).await?;
    Ok(Json(outcome.into()))
}

async fn link_episode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<LinkEpisodeRequest>,
) -> Result<Json<CompletionResponse>, AppError> {
    let outcome =
        coordinator::link_episode_to_item(&state.pool, id, req.episode_id, req.date).await?;
    Ok(Json(outcome.into()))
}
