use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Role;
use crate::store::Document;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogStatus {
    Draft,
    PendingLead,
    PendingGuide,
    Approved,
    FinalApproved,
    NeedsRevision,
}

impl std::fmt::Display for LogStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogStatus::Draft => write!(f, "draft"),
            LogStatus::PendingLead => write!(f, "pending-lead"),
            LogStatus::PendingGuide => write!(f, "pending-guide"),
            LogStatus::Approved => write!(f, "approved"),
            LogStatus::FinalApproved => write!(f, "final-approved"),
            LogStatus::NeedsRevision => write!(f, "needs-revision"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub date: DateTime<Utc>,
    pub hours: f64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub author_id: String,
    pub author_name: String,
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Set on the comment that accompanied a move into `needs-revision`.
    #[serde(default)]
    pub requests_revision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub id: String,
    pub team_id: String,
    pub week_number: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub activities: Vec<Activity>,
    pub status: LogStatus,
    pub created_by: String,
    pub created_by_name: String,
    #[serde(default)]
    pub comments: Vec<Comment>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Log {
    pub fn total_hours(&self) -> f64 {
        self.activities.iter().map(|a| a.hours).sum()
    }

    /// The most recent comment that sent this log back for revision.
    pub fn last_revision_request(&self) -> Option<&Comment> {
        self.comments.iter().rev().find(|c| c.requests_revision)
    }
}

impl Document for Log {
    const COLLECTION: &'static str = "logs";

    fn id(&self) -> &str {
        &self.id
    }
}
