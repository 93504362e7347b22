use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::{Role, TeamRole};
use crate::services::{LogService, TeamService};
use crate::AppState;

#[derive(Deserialize)]
pub struct TeamForm {
    name: String,
}

#[derive(Deserialize)]
pub struct JoinForm {
    code: String,
}

#[derive(Deserialize)]
pub struct RosterQuery {
    role: Option<TeamRole>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/teams", get(list_teams).post(create_team))
        .route("/teams/join", post(join_team))
        .route("/teams/{id}", get(show_team).delete(delete_team))
        .route("/teams/{id}/leave", post(leave_team))
        .route("/teams/{id}/regenerate-codes", post(regenerate_codes))
        .route("/teams/{id}/members/{user_id}", delete(remove_member))
        .route("/teams/{id}/logs", get(team_logs))
        .route("/teams/{id}/summary", get(team_summary))
}

async fn list_teams(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let teams = TeamService::list_for_user(&state.store, &user).await?;
    Ok(Json(teams))
}

async fn create_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(form): Json<TeamForm>,
) -> Result<impl IntoResponse, AppError> {
    if !matches!(user.role, Role::TeamLead | Role::Admin) {
        return Err(AppError::Forbidden(
            "only team leads can create teams".to_string(),
        ));
    }
    let team = TeamService::create_team(&state.store, &form.name, &user.id).await?;
    Ok((StatusCode::CREATED, Json(team)))
}

async fn join_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(form): Json<JoinForm>,
) -> Result<impl IntoResponse, AppError> {
    let joined = TeamService::join_team_by_code(&state.store, &form.code, &user.id).await?;
    Ok(Json(joined))
}

async fn show_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &id).await?;
    LogService::ensure_can_view(&team, &user)?;
    Ok(Json(team))
}

async fn delete_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &id).await?;
    TeamService::ensure_can_manage(&team, &user)?;
    TeamService::delete_team(&state.store, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn leave_team(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    TeamService::leave_team(&state.store, &id, &user).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn regenerate_codes(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &id).await?;
    TeamService::ensure_can_manage(&team, &user)?;
    let team = TeamService::regenerate_codes(&state.store, &id).await?;
    Ok(Json(team))
}

async fn remove_member(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path((team_id, member_id)): Path<(String, String)>,
    Query(query): Query<RosterQuery>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &team_id).await?;
    TeamService::ensure_can_manage(&team, &user)?;

    let role = match query.role {
        Some(role) => role,
        None => team
            .roster_role(&member_id)
            .ok_or_else(|| AppError::not_found("team membership"))?,
    };
    TeamService::remove_team_member(&state.store, &team_id, &member_id, role).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn team_logs(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &id).await?;
    LogService::ensure_can_view(&team, &user)?;
    let logs = LogService::list_team_logs(&state.store, &id).await?;
    Ok(Json(logs))
}

async fn team_summary(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &id).await?;
    LogService::ensure_can_view(&team, &user)?;
    let summary = LogService::team_summary(&state.store, &id).await?;
    Ok(Json(summary))
}
