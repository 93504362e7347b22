use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::auth::AuthUser;
use crate::dates;
use crate::error::{AppError, AppResult};
use crate::models::{Log, LogStatus, Team};
use crate::services::{ApprovalService, LogPatch, LogService, NewActivity, NewLog, TeamService};
use crate::store::Store;
use crate::AppState;

#[derive(Deserialize)]
pub struct ActivityForm {
    date: String,
    hours: f64,
    #[serde(default)]
    description: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogForm {
    team_id: String,
    week_number: u32,
    start_date: String,
    end_date: String,
    #[serde(default)]
    activities: Vec<ActivityForm>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPatchForm {
    week_number: Option<u32>,
    start_date: Option<String>,
    end_date: Option<String>,
    activities: Option<Vec<ActivityForm>>,
}

#[derive(Deserialize)]
pub struct TransitionForm {
    status: LogStatus,
    comment: Option<String>,
}

#[derive(Deserialize)]
pub struct CommentForm {
    text: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekQuery {
    team_id: String,
    week_number: u32,
    exclude_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RangeQuery {
    team_id: String,
    start_date: String,
    end_date: String,
    exclude_id: Option<String>,
}

#[derive(Serialize)]
struct CheckResponse {
    taken: bool,
}

fn parse_activities(forms: &[ActivityForm]) -> AppResult<Vec<NewActivity>> {
    forms
        .iter()
        .map(|form| {
            Ok(NewActivity {
                date: dates::parse_calendar_date(&form.date)?,
                hours: form.hours,
                description: form.description.clone(),
            })
        })
        .collect()
}

async fn log_with_team(store: &Store, id: &str) -> AppResult<(Log, Team)> {
    let log = LogService::get_log(store, id).await?;
    let team = TeamService::get_team(store, &log.team_id).await?;
    Ok((log, team))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/logs", post(create_log))
        .route("/logs/mine", get(my_logs))
        .route("/logs/week-exists", get(week_exists))
        .route("/logs/range-overlaps", get(range_overlaps))
        .route("/logs/{id}", get(show_log).put(update_log).delete(delete_log))
        .route("/logs/{id}/submit", post(submit_log))
        .route("/logs/{id}/transition", post(transition_log))
        .route("/logs/{id}/comments", post(comment_log))
}

async fn create_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(form): Json<LogForm>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &form.team_id).await?;
    LogService::ensure_can_author(&team, &user)?;

    let candidate = NewLog {
        team_id: form.team_id,
        week_number: form.week_number,
        start_date: dates::parse_calendar_date(&form.start_date)?,
        end_date: dates::parse_calendar_date(&form.end_date)?,
        activities: parse_activities(&form.activities)?,
        created_by: user.id,
        created_by_name: user.name,
    };

    let log = LogService::create_log(&state.store, candidate).await?;
    Ok((StatusCode::CREATED, Json(log)))
}

async fn my_logs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let logs = LogService::list_author_logs(&state.store, &user.id).await?;
    Ok(Json(logs))
}

async fn week_exists(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<WeekQuery>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &query.team_id).await?;
    LogService::ensure_can_view(&team, &user)?;

    let taken = LogService::is_week_number_exists(
        &state.store,
        query.week_number,
        &query.team_id,
        query.exclude_id.as_deref(),
    )
    .await?;
    Ok(Json(CheckResponse { taken }))
}

async fn range_overlaps(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Query(query): Query<RangeQuery>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &query.team_id).await?;
    LogService::ensure_can_view(&team, &user)?;

    let start = dates::to_storage_instant(dates::parse_calendar_date(&query.start_date)?);
    let end = dates::to_storage_instant(dates::parse_calendar_date(&query.end_date)?);
    let taken = LogService::is_date_range_overlapping(
        &state.store,
        start,
        end,
        &query.team_id,
        query.exclude_id.as_deref(),
    )
    .await?;
    Ok(Json(CheckResponse { taken }))
}

async fn show_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (log, team) = log_with_team(&state.store, &id).await?;
    LogService::ensure_can_view(&team, &user)?;
    Ok(Json(log))
}

async fn update_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(form): Json<LogPatchForm>,
) -> Result<impl IntoResponse, AppError> {
    let patch = LogPatch {
        week_number: form.week_number,
        start_date: form
            .start_date
            .as_deref()
            .map(dates::parse_calendar_date)
            .transpose()?,
        end_date: form
            .end_date
            .as_deref()
            .map(dates::parse_calendar_date)
            .transpose()?,
        activities: form
            .activities
            .as_deref()
            .map(parse_activities)
            .transpose()?,
    };

    let log = LogService::update_log(&state.store, &id, &user, patch).await?;
    Ok(Json(log))
}

async fn delete_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let (_, team) = log_with_team(&state.store, &id).await?;
    LogService::ensure_can_delete(&team, &user)?;
    LogService::delete_log(&state.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn submit_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let log = ApprovalService::submit(&state.store, &id, &user).await?;
    Ok(Json(log))
}

async fn transition_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(form): Json<TransitionForm>,
) -> Result<impl IntoResponse, AppError> {
    let log = ApprovalService::transition(
        &state.store,
        &id,
        &user,
        form.status,
        form.comment.as_deref(),
    )
    .await?;
    Ok(Json(log))
}

async fn comment_log(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(form): Json<CommentForm>,
) -> Result<impl IntoResponse, AppError> {
    let (_, team) = log_with_team(&state.store, &id).await?;
    LogService::ensure_can_view(&team, &user)?;
    let log = ApprovalService::add_comment(&state.store, &id, &user, &form.text).await?;
    Ok(Json(log))
}
