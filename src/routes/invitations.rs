use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::TeamRole;
use crate::services::{InvitationService, TeamService};
use crate::AppState;

#[derive(Deserialize)]
pub struct InviteForm {
    email: String,
    #[serde(default = "default_role")]
    role: TeamRole,
}

fn default_role() -> TeamRole {
    TeamRole::Member
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/teams/{id}/invitations", post(invite))
        .route("/invitations", get(my_invitations))
        .route("/invitations/{id}", delete(cancel))
        .route("/invitations/{id}/accept", post(accept))
        .route("/invitations/{id}/decline", post(decline))
}

async fn invite(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(team_id): Path<String>,
    Json(form): Json<InviteForm>,
) -> Result<impl IntoResponse, AppError> {
    let team = TeamService::get_team(&state.store, &team_id).await?;
    TeamService::ensure_can_manage(&team, &user)?;
    let invitation =
        InvitationService::invite(&state.store, &team, &form.email, form.role, &user.id).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

async fn my_invitations(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let invitations = InvitationService::list_pending_for_email(&state.store, &user.email).await?;
    Ok(Json(invitations))
}

async fn accept(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let joined = InvitationService::accept(&state.store, &id, &user).await?;
    Ok(Json(joined))
}

async fn decline(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = InvitationService::decline(&state.store, &id, &user).await?;
    Ok(Json(invitation))
}

async fn cancel(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let invitation = InvitationService::get(&state.store, &id).await?;
    let team = TeamService::get_team(&state.store, &invitation.team_id).await?;
    TeamService::ensure_can_manage(&team, &user)?;
    InvitationService::cancel(&state.store, &invitation).await?;
    Ok(StatusCode::NO_CONTENT)
}
