use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[serde(alias = "member")]
    Student,
    TeamLead,
    Guide,
    #[serde(alias = "coordinator")]
    Admin,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Student => write!(f, "student"),
            Role::TeamLead => write!(f, "team_lead"),
            Role::Guide => write!(f, "guide"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub team_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(name: String, email: String, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            email: email.trim().to_lowercase(),
            role,
            team_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn belongs_to(&self, team_id: &str) -> bool {
        self.team_ids.iter().any(|id| id == team_id)
    }
}

impl Document for User {
    const COLLECTION: &'static str = "users";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_accepts_legacy_names() {
        let member: Role = serde_json::from_str("\"member\"").unwrap();
        assert_eq!(member, Role::Student);
        let coordinator: Role = serde_json::from_str("\"coordinator\"").unwrap();
        assert_eq!(coordinator, Role::Admin);
        assert_eq!(serde_json::to_string(&Role::TeamLead).unwrap(), "\"team_lead\"");
    }

    #[test]
    fn role_display_matches_wire_name() {
        for role in [Role::Student, Role::TeamLead, Role::Guide, Role::Admin] {
            let json = serde_json::to_string(&role).unwrap();
            assert_eq!(json, format!("\"{role}\""));
        }
    }

    #[test]
    fn user_serialises_camel_case_fields() {
        let user = User::new("Ada".into(), " Ada@Example.com ".into(), Role::Student);
        assert_eq!(user.email, "ada@example.com");
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("teamIds").is_some());
        assert!(value.get("createdAt").is_some());
    }
}
