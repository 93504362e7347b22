use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Role;
use crate::store::Document;

/// The roster a user joins a team through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TeamRole {
    Member,
    Guide,
}

impl TeamRole {
    /// The user-level role granted by joining this roster.
    pub fn user_role(self) -> Role {
        match self {
            TeamRole::Member => Role::Student,
            TeamRole::Guide => Role::Guide,
        }
    }
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TeamRole::Member => write!(f, "member"),
            TeamRole::Guide => write!(f, "guide"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Team {
    pub id: String,
    pub name: String,
    pub referral_code: String,
    pub guide_code: String,
    pub leader_id: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    #[serde(default)]
    pub guide_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Team {
    pub fn new(name: String, leader_id: String, referral_code: String, guide_code: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            referral_code,
            guide_code,
            leader_id,
            member_ids: Vec::new(),
            guide_ids: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Leader, member or guide.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.leader_id == user_id || self.roster_role(user_id).is_some()
    }

    pub fn roster_role(&self, user_id: &str) -> Option<TeamRole> {
        if self.member_ids.iter().any(|id| id == user_id) {
            Some(TeamRole::Member)
        } else if self.guide_ids.iter().any(|id| id == user_id) {
            Some(TeamRole::Guide)
        } else {
            None
        }
    }

    pub fn roster_mut(&mut self, role: TeamRole) -> &mut Vec<String> {
        match role {
            TeamRole::Member => &mut self.member_ids,
            TeamRole::Guide => &mut self.guide_ids,
        }
    }

    /// Every user whose `teamIds` may reference this team.
    pub fn participant_ids(&self) -> impl Iterator<Item = &String> {
        std::iter::once(&self.leader_id)
            .chain(self.member_ids.iter())
            .chain(self.guide_ids.iter())
    }
}

impl Document for Team {
    const COLLECTION: &'static str = "teams";

    fn id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roster_role_checks_both_rosters() {
        let mut team = Team::new("T".into(), "lead".into(), "T-1".into(), "T-G-1".into());
        team.member_ids.push("m".into());
        team.guide_ids.push("g".into());

        assert_eq!(team.roster_role("m"), Some(TeamRole::Member));
        assert_eq!(team.roster_role("g"), Some(TeamRole::Guide));
        assert_eq!(team.roster_role("lead"), None);
        assert!(team.is_participant("lead"));
        assert!(!team.is_participant("stranger"));
        assert_eq!(team.participant_ids().count(), 3);
    }
}
