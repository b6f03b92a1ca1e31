// HTTP request handlers
use crate::application::control_service::SweepError;
use crate::application::error::ControlError;
use crate::domain::group::Group;
use crate::domain::history::{HistoricalData, TimeRange};
use crate::domain::point::Point;
use crate::domain::settings::SystemSettings;
use crate::domain::timestamp::{format_timestamp, parse_timestamp};
use crate::presentation::app_state::AppState;
use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

type ApiResult<T> = Result<Json<T>, ControlError>;

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub start_time: Option<String>,
    pub end_time: Option<String>,
}

#[derive(Deserialize)]
pub struct ValueBody {
    pub value: f64,
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ControlError> {
    match raw {
        None | Some("") => Ok(None),
        Some(raw) => parse_timestamp(raw)
            .map(Some)
            .ok_or_else(|| ControlError::validation(format!("{name} is not an ISO-8601 timestamp: {raw}"))),
    }
}

fn deleted(kind: &str, id: &str) -> Json<Value> {
    Json(json!({
        "status": "success",
        "message": format!("{kind} {id} deleted"),
    }))
}

/// Health check endpoint
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "app": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

// ---- control points ---------------------------------------------------

pub async fn list_points(State(state): State<Arc<AppState>>) -> Json<Vec<Point>> {
    Json(state.service.list_points().await)
}

pub async fn get_point(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult<Point> {
    Ok(Json(state.service.get_point(&id).await?))
}

pub async fn create_point(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Point>, JsonRejection>,
) -> Result<(StatusCode, Json<Point>), ControlError> {
    let Json(point) = payload?;
    let created = state.service.create_point(point).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_point(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Point>, JsonRejection>,
) -> ApiResult<Point> {
    let Json(point) = payload?;
    Ok(Json(state.service.update_point(&id, point).await?))
}

pub async fn set_value(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ValueBody>, JsonRejection>,
) -> ApiResult<Point> {
    let Json(body) = payload?;
    Ok(Json(state.service.set_value(&id, body.value).await?))
}

pub async fn delete_point(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    state.service.delete_point(&id).await?;
    Ok(deleted("Control point", &id))
}

pub async fn get_history(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<HistoricalData> {
    let Query(query) = query?;
    let range = TimeRange::new(
        parse_bound("start_time", query.start_time.as_deref())?,
        parse_bound("end_time", query.end_time.as_deref())?,
    );
    Ok(Json(state.service.get_history(&id, range).await?))
}

// ---- control groups ---------------------------------------------------

pub async fn list_groups(State(state): State<Arc<AppState>>) -> Json<Vec<Group>> {
    Json(state.service.list_groups().await)
}

pub async fn get_group(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult<Group> {
    Ok(Json(state.service.get_group(&id).await?))
}

pub async fn create_group(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Group>, JsonRejection>,
) -> Result<(StatusCode, Json<Group>), ControlError> {
    let Json(group) = payload?;
    let created = state.service.create_group(group).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn update_group(
    Path(id): Path<String>,
    State(state): State<Arc<AppState>>,
    payload: Result<Json<Group>, JsonRejection>,
) -> ApiResult<Group> {
    let Json(group) = payload?;
    Ok(Json(state.service.update_group(&id, group).await?))
}

pub async fn delete_group(Path(id): Path<String>, State(state): State<Arc<AppState>>) -> ApiResult<Value> {
    state.service.delete_group(&id).await?;
    Ok(deleted("Control group", &id))
}

// ---- settings and simulation ------------------------------------------

pub async fn get_settings(State(state): State<Arc<AppState>>) -> Json<SystemSettings> {
    Json(state.service.get_settings().await)
}

pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SystemSettings>, JsonRejection>,
) -> ApiResult<SystemSettings> {
    let Json(settings) = payload?;
    Ok(Json(state.service.update_settings(settings).await?))
}

/// Run one sweep now, through the same path as the scheduler.
pub async fn simulate(State(state): State<Arc<AppState>>) -> Result<Json<Value>, SweepError> {
    let summary = state.service.simulate().await?;
    Ok(Json(json!({
        "status": "success",
        "message": "Simulation completed",
        "advanced": summary.advanced,
        "failed": summary.failed,
        "timestamp": format_timestamp(&summary.timestamp),
    })))
}
