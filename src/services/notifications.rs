use crate::error::{AppError, AppResult};
use crate::models::Notification;
use crate::store::{Store, StoreTx};

/// Per-user notification records.
pub struct NotificationService;

impl NotificationService {
    /// Append a notification as part of a larger transaction.
    pub async fn create_in(
        tx: &mut StoreTx,
        user_id: &str,
        title: &str,
        message: &str,
        log_id: Option<&str>,
    ) -> AppResult<Notification> {
        let notification = Self::build(user_id, title, message, log_id);
        tx.insert(&notification).await?;
        Ok(notification)
    }

    fn build(user_id: &str, title: &str, message: &str, log_id: Option<&str>) -> Notification {
        Notification::new(
            user_id.to_string(),
            title.to_string(),
            message.to_string(),
            log_id.map(str::to_string),
        )
    }

    /// Newest first.
    pub async fn list_for_user(store: &Store, user_id: &str) -> AppResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> = store.find_by("userId", user_id).await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }

    pub async fn unread_count(store: &Store, user_id: &str) -> AppResult<usize> {
        let notifications: Vec<Notification> = store.find_by("userId", user_id).await?;
        Ok(notifications.iter().filter(|n| !n.read).count())
    }

    /// Only the recipient can mark a notification read.
    pub async fn mark_read(store: &Store, id: &str, user_id: &str) -> AppResult<Notification> {
        let mut notification: Notification = store
            .get(id)
            .await?
            .filter(|n: &Notification| n.user_id == user_id)
            .ok_or_else(|| AppError::not_found("notification"))?;

        if !notification.read {
            notification.read = true;
            store.put(&notification).await?;
        }
        Ok(notification)
    }

    pub async fn mark_all_read(store: &Store, user_id: &str) -> AppResult<usize> {
        let mut tx = store.begin().await?;
        let unread: Vec<Notification> = tx
            .find_by::<Notification>("userId", user_id)
            .await?
            .into_iter()
            .filter(|n| !n.read)
            .collect();

        for mut notification in unread.iter().cloned() {
            notification.read = true;
            tx.put(&notification).await?;
        }
        tx.commit().await?;

        tracing::debug!(user_id, count = unread.len(), "marked notifications read");
        Ok(unread.len())
    }
}
