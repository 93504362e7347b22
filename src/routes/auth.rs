use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_sessions::Session;

use crate::auth::{login_user, logout_user, AuthUser};
use crate::error::AppError;
use crate::models::{Role, Team, User};
use crate::services::{teams, JoinedTeam, TeamService, UserService};
use crate::AppState;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupForm {
    name: String,
    email: String,
    role: Role,
    team_name: Option<String>,
    code: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
}

#[derive(Serialize)]
struct SignupResponse {
    user: User,
    #[serde(skip_serializing_if = "Option::is_none")]
    team: Option<Team>,
    #[serde(skip_serializing_if = "Option::is_none")]
    joined: Option<JoinedTeam>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/logout", post(logout))
        .route("/me", get(me))
}

async fn signup(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<SignupForm>,
) -> Result<impl IntoResponse, AppError> {
    if form.role == Role::Admin {
        return Err(AppError::Forbidden(
            "coordinator accounts are provisioned by an administrator".to_string(),
        ));
    }

    // everything that can reject the signup is resolved before the profile is written
    let code = form.code.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let target = match code {
        Some(code) => Some(
            TeamService::find_by_code(&state.store, code)
                .await?
                .ok_or(AppError::InvalidCode)?,
        ),
        None => None,
    };
    let team_name = match form.team_name.as_deref() {
        Some(name) if form.role == Role::TeamLead => Some(teams::validate_name(name)?),
        _ => None,
    };

    let user = UserService::register(&state.store, &form.name, &form.email, form.role).await?;

    let team = match team_name {
        Some(name) => Some(TeamService::create_team(&state.store, name, &user.id).await?),
        None => None,
    };

    let joined = match target {
        Some((joining, role)) => {
            TeamService::join_team_by_id(&state.store, &joining.id, &user.id, role).await?;
            Some(JoinedTeam {
                team_id: joining.id,
                role,
            })
        }
        None => None,
    };

    // team creation and joining both rewrite the profile
    let user = UserService::get(&state.store, &user.id).await?;
    login_user(&session, &user).await?;

    Ok((StatusCode::CREATED, Json(SignupResponse { user, team, joined })))
}

async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(form): Json<LoginForm>,
) -> Result<impl IntoResponse, AppError> {
    let user = UserService::find_by_email(&state.store, &form.email)
        .await?
        .ok_or(AppError::Unauthorized)?;

    login_user(&session, &user).await?;
    tracing::info!(user_id = %user.id, "signed in");
    Ok(Json(user))
}

async fn logout(session: Session) -> Result<impl IntoResponse, AppError> {
    logout_user(&session).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn me(AuthUser(user): AuthUser) -> Json<User> {
    Json(user)
}
