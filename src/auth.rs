use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::AppError;
use crate::models::User;
use crate::AppState;

const USER_ID_KEY: &str = "user_id";

/// The signed-in user, reloaded from the store on every request so role and
/// team changes apply immediately.
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let session = Session::from_request_parts(parts, state)
            .await
            .map_err(|_| AppError::Unauthorized)?;

        let user_id: Option<String> = session.get(USER_ID_KEY).await?;
        let Some(user_id) = user_id else {
            return Err(AppError::Unauthorized);
        };

        match state.store.get::<User>(&user_id).await? {
            Some(user) => Ok(AuthUser(user)),
            None => {
                session.flush().await?;
                Err(AppError::Unauthorized)
            }
        }
    }
}

pub async fn login_user(session: &Session, user: &User) -> Result<(), tower_sessions::session::Error> {
    session.cycle_id().await?;
    session.insert(USER_ID_KEY, &user.id).await
}

pub async fn logout_user(session: &Session) -> Result<(), tower_sessions::session::Error> {
    session.flush().await
}
