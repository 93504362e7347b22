use crate::error::{AppError, AppResult};
use crate::models::{Role, User};
use crate::services::with_retry;
use crate::store::Store;

fn validate_profile(name: &str, email: &str) -> AppResult<()> {
    if name.trim().is_empty() {
        return Err(AppError::Validation("name is required".to_string()));
    }
    if name.len() > 100 {
        return Err(AppError::Validation(
            "name must be under 100 characters".to_string(),
        ));
    }
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Err(AppError::Validation("a valid email is required".to_string()));
    }
    Ok(())
}

/// User profiles. Credentials live with the identity provider; this only
/// keeps the profile the rest of the system refers to.
pub struct UserService;

impl UserService {
    pub async fn register(store: &Store, name: &str, email: &str, role: Role) -> AppResult<User> {
        validate_profile(name, email)?;
        let user = User::new(name.trim().to_string(), email.to_string(), role);

        let candidate = &user;
        with_retry(store, "register", move || async move {
            let mut tx = store.begin().await?;
            let taken: Vec<User> = tx.find_by("email", candidate.email.as_str()).await?;
            if !taken.is_empty() {
                return Err(AppError::Conflict("email is already registered".to_string()));
            }
            tx.insert(candidate).await?;
            tx.commit().await?;
            Ok(())
        })
        .await?;

        tracing::info!(user_id = %user.id, role = %user.role, "user registered");
        Ok(user)
    }

    pub async fn get(store: &Store, id: &str) -> AppResult<User> {
        store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("user"))
    }

    pub async fn find_by_email(store: &Store, email: &str) -> AppResult<Option<User>> {
        let mut users: Vec<User> = store
            .find_by("email", email.trim().to_lowercase())
            .await?;
        Ok(users.pop())
    }
}
