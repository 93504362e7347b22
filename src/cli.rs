use crate::models::Role;
use crate::services::UserService;
use crate::store::Store;

/// `create-user <name> <email> <role>`: provision a profile from the shell.
/// Coordinators cannot sign themselves up, so this is how they get in.
pub async fn create_user(
    store: &Store,
    name: &str,
    email: &str,
    role: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let role: Role = serde_json::from_value(serde_json::Value::String(role.to_string()))
        .map_err(|_| format!("Unknown role '{role}'"))?;

    let user = UserService::register(store, name, email, role).await?;

    println!("Created user:");
    println!("  ID: {}", user.id);
    println!("  Name: {}", user.name);
    println!("  Email: {}", user.email);
    println!("  Role: {}", user.role);

    Ok(())
}

/// `promote <email> <role>`: change the role of an existing profile.
pub async fn set_role(store: &Store, email: &str, role: &str) -> Result<(), Box<dyn std::error::Error>> {
    let role: Role = serde_json::from_value(serde_json::Value::String(role.to_string()))
        .map_err(|_| format!("Unknown role '{role}'"))?;

    let Some(mut user) = UserService::find_by_email(store, email).await? else {
        return Err(format!("User with email '{email}' not found").into());
    };
    user.role = role;
    user.updated_at = chrono::Utc::now();
    store.put(&user).await?;

    println!("{} is now {}", user.email, user.role);
    Ok(())
}
