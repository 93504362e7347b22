use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::TeamRole;
use crate::store::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Declined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: String,
    pub team_id: String,
    pub invited_email: String,
    pub role: TeamRole,
    pub status: InvitationStatus,
    pub invited_by: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub responded_at: Option<DateTime<Utc>>,
}

impl Invitation {
    pub fn new(team_id: String, invited_email: String, role: TeamRole, invited_by: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            team_id,
            invited_email: invited_email.trim().to_lowercase(),
            role,
            status: InvitationStatus::Pending,
            invited_by,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == InvitationStatus::Pending
    }
}

impl Document for Invitation {
    const COLLECTION: &'static str = "invitations";

    fn id(&self) -> &str {
        &self.id
    }
}
