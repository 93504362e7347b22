use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::auth::AuthUser;
use crate::error::AppError;
use crate::models::Notification;
use crate::services::NotificationService;
use crate::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationList {
    unread_count: usize,
    notifications: Vec<Notification>,
}

#[derive(Serialize)]
struct MarkedRead {
    updated: usize,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/read-all", post(mark_all_read))
        .route("/notifications/{id}/read", post(mark_read))
}

async fn list_notifications(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let notifications = NotificationService::list_for_user(&state.store, &user.id).await?;
    let unread_count = NotificationService::unread_count(&state.store, &user.id).await?;
    Ok(Json(NotificationList {
        unread_count,
        notifications,
    }))
}

async fn mark_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let notification = NotificationService::mark_read(&state.store, &id, &user.id).await?;
    Ok(Json(notification))
}

async fn mark_all_read(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let updated = NotificationService::mark_all_read(&state.store, &user.id).await?;
    Ok(Json(MarkedRead { updated }))
}
