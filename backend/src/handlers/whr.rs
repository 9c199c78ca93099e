//! Warehouse receipt HTTP handlers

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::services::whr::{
    ClassifyWhrInput, CreateWhrInput, ListWhrQuery, UpdateStatusInput, UpdateWhrInput, WhrService,
};
use crate::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Deserialize)]
pub struct StatsQuery {
    pub days: Option<i64>,
}

/// Register a new WHR
pub async fn create_whr(
    State(state): State<AppState>,
    Json(input): Json<CreateWhrInput>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.create(input).await {
        Ok(whr) => (
            StatusCode::CREATED,
            Json(serde_json::json!({
                "whr": &whr,
                "calculated_metrics": {
                    "whr_number": whr.whr_number,
                    "volume_cubic_feet": whr.volume,
                    "volume_weight": whr.volume_weight,
                    "estimated_arrival_cr": whr.estimated_arrival_cr,
                }
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// List WHRs with filters and pagination
pub async fn list_whrs(
    State(state): State<AppState>,
    Query(query): Query<ListWhrQuery>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.list(query).await {
        Ok(page) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "whr_list": page.items,
                "pagination": page.pagination,
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Get a WHR with its tracking trail
pub async fn get_whr(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.get(id).await {
        Ok(detail) => (StatusCode::OK, Json(detail)).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Partial update of a WHR
pub async fn update_whr(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateWhrInput>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.update(id, input).await {
        Ok(whr) => (StatusCode::OK, Json(serde_json::json!({ "whr": whr }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Classify a WHR as AWB or BL
pub async fn classify_whr(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ClassifyWhrInput>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.classify(id, input).await {
        Ok(whr) => (StatusCode::OK, Json(serde_json::json!({ "whr": whr }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Mark the consignee notification as sent
pub async fn mark_email_sent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.mark_notified(id).await {
        Ok(whr) => (StatusCode::OK, Json(serde_json::json!({ "whr": whr }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Trigger the consignee notification. Delivery is out of scope; the
/// endpoint records the notification the same way `email-sent` does.
pub async fn send_email(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.mark_notified(id).await {
        Ok(whr) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "whr": &whr,
                "email": { "recipient": whr.consignee.email, "queued": true }
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Update shipment status
pub async fn update_whr_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateStatusInput>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.update_status(id, input.status).await {
        Ok(whr) => (StatusCode::OK, Json(serde_json::json!({ "whr": whr }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Delete a WHR
pub async fn delete_whr(State(state): State<AppState>, Path(id): Path<Uuid>) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.delete(id).await {
        Ok(whr) => (
            StatusCode::OK,
            Json(serde_json::json!({ "deleted": true, "whr": whr })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Aggregate statistics over a recent window (default 30 days)
pub async fn get_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.stats(query.days.unwrap_or(30)).await {
        Ok(stats) => (StatusCode::OK, Json(serde_json::json!({ "stats": stats }))).into_response(),
        Err(e) => e.into_response(),
    }
}

/// Quick search over WHR fields
pub async fn search_whrs(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.search(&query.q).await {
        Ok(results) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "results": &results,
                "count": results.len(),
                "search_term": query.q.trim(),
            })),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// CSV export of the whole collection
pub async fn export_whrs(State(state): State<AppState>) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.export_csv().await {
        Ok(csv_data) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"whr-export.csv\"",
                ),
            ],
            csv_data,
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// Public tracking lookup (unauthenticated)
pub async fn public_tracking(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> impl IntoResponse {
    let service = WhrService::new(state.repo.clone());

    match service.public_track(&token).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => e.into_response(),
    }
}
