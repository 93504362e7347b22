//! Teams and their rosters.
//!
//! Every roster change touches two documents, the team and the user, and
//! runs as one transaction so neither half is ever visible without the other.

use chrono::Utc;
use rand::Rng;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::models::{Invitation, Log, Role, Team, TeamRole, User};
use crate::services::with_retry;
use crate::store::{Store, StoreTx};

const CODE_PREFIX_LEN: usize = 6;
const CODE_SUFFIX_LEN: usize = 6;
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const MAX_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedTeam {
    pub team_id: String,
    pub role: TeamRole,
}

/// Uppercased alphanumerics of the team name, at most six of them.
pub fn code_prefix(name: &str) -> String {
    let prefix: String = name
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(CODE_PREFIX_LEN)
        .collect::<String>()
        .to_ascii_uppercase();
    if prefix.is_empty() {
        "TEAM".to_string()
    } else {
        prefix
    }
}

/// `(referralCode, guideCode)` as `PREFIX-SUFFIX` and `PREFIX-G-SUFFIX`
/// sharing one random suffix.
pub fn generate_codes(name: &str) -> (String, String) {
    let mut rng = rand::rng();
    let suffix: String = (0..CODE_SUFFIX_LEN)
        .map(|_| CODE_CHARSET[rng.random_range(0..CODE_CHARSET.len())] as char)
        .collect();
    let prefix = code_prefix(name);
    (format!("{prefix}-{suffix}"), format!("{prefix}-G-{suffix}"))
}

fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

async fn code_in_use(tx: &mut StoreTx, code: &str) -> AppResult<bool> {
    let as_referral: Vec<Team> = tx.find_by("referralCode", code).await?;
    if !as_referral.is_empty() {
        return Ok(true);
    }
    let as_guide: Vec<Team> = tx.find_by("guideCode", code).await?;
    Ok(!as_guide.is_empty())
}

async fn unique_codes(tx: &mut StoreTx, name: &str) -> AppResult<(String, String)> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let (referral, guide) = generate_codes(name);
        if !code_in_use(tx, &referral).await? && !code_in_use(tx, &guide).await? {
            return Ok((referral, guide));
        }
        tracing::debug!(%referral, "team code collision, drawing again");
    }
    Err(AppError::Conflict(
        "could not allocate a unique team code".to_string(),
    ))
}

/// Trimmed team name, or `Validation` if it is empty or too long.
pub fn validate_name(name: &str) -> AppResult<&str> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("team name is required".to_string()));
    }
    if name.len() > 100 {
        return Err(AppError::Validation(
            "team name must be under 100 characters".to_string(),
        ));
    }
    Ok(name)
}

pub struct TeamService;

impl TeamService {
    pub async fn create_team(store: &Store, name: &str, leader_id: &str) -> AppResult<Team> {
        let name = validate_name(name)?;
        let team = with_retry(store, "create_team", move || async move {
            let mut tx = store.begin().await?;
            let mut leader: User = tx
                .get(leader_id)
                .await?
                .ok_or_else(|| AppError::not_found("user"))?;

            let (referral, guide) = unique_codes(&mut tx, name).await?;
            let team = Team::new(name.to_string(), leader.id.clone(), referral, guide);
            tx.insert(&team).await?;

            if !leader.belongs_to(&team.id) {
                leader.team_ids.push(team.id.clone());
            }
            leader.updated_at = Utc::now();
            tx.put(&leader).await?;
            tx.commit().await?;
            Ok(team)
        })
        .await?;

        tracing::info!(team_id = %team.id, leader_id, code = %team.referral_code, "team created");
        Ok(team)
    }

    pub async fn get_team(store: &Store, id: &str) -> AppResult<Team> {
        store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("team"))
    }

    /// Teams the user belongs to; admins see every team.
    pub async fn list_for_user(store: &Store, user: &User) -> AppResult<Vec<Team>> {
        if user.is_admin() {
            return Ok(store.list().await?);
        }
        let mut teams = Vec::with_capacity(user.team_ids.len());
        for id in &user.team_ids {
            match store.get::<Team>(id).await? {
                Some(team) => teams.push(team),
                None => tracing::warn!(user_id = %user.id, team_id = %id, "user references a missing team"),
            }
        }
        Ok(teams)
    }

    /// Referral codes admit members, guide codes admit guides.
    pub async fn find_by_code(store: &Store, code: &str) -> AppResult<Option<(Team, TeamRole)>> {
        let code = normalize_code(code);
        if code.is_empty() {
            return Ok(None);
        }
        if let Some(team) = store.find_by::<Team>("referralCode", code.as_str()).await?.pop() {
            return Ok(Some((team, TeamRole::Member)));
        }
        if let Some(team) = store.find_by::<Team>("guideCode", code.as_str()).await?.pop() {
            return Ok(Some((team, TeamRole::Guide)));
        }
        Ok(None)
    }

    pub async fn join_team_by_code(store: &Store, code: &str, user_id: &str) -> AppResult<JoinedTeam> {
        let (team, role) = Self::find_by_code(store, code)
            .await?
            .ok_or(AppError::InvalidCode)?;
        Self::join_team_by_id(store, &team.id, user_id, role).await?;
        Ok(JoinedTeam {
            team_id: team.id,
            role,
        })
    }

    /// Add `user_id` to the team's roster for `role` and the team to the
    /// user's `teamIds`. Joining a team one already belongs to is a no-op.
    pub async fn join_team_by_id(
        store: &Store,
        team_id: &str,
        user_id: &str,
        role: TeamRole,
    ) -> AppResult<()> {
        let joined = with_retry(store, "join_team", move || async move {
            let mut tx = store.begin().await?;
            let mut team: Team = tx
                .get(team_id)
                .await?
                .ok_or_else(|| AppError::not_found("team"))?;
            let mut user: User = tx
                .get(user_id)
                .await?
                .ok_or_else(|| AppError::not_found("user"))?;

            if team.is_participant(user_id) {
                return Ok(false);
            }

            let now = Utc::now();
            team.roster_mut(role).push(user.id.clone());
            team.updated_at = now;
            tx.put(&team).await?;

            if !user.belongs_to(team_id) {
                user.team_ids.push(team.id.clone());
            }
            // leads and admins keep their own role when they join elsewhere
            if !matches!(user.role, Role::Admin | Role::TeamLead) {
                user.role = role.user_role();
            }
            user.updated_at = now;
            tx.put(&user).await?;

            tx.commit().await?;
            Ok(true)
        })
        .await?;

        if joined {
            tracing::info!(team_id, user_id, %role, "user joined team");
        } else {
            tracing::debug!(team_id, user_id, "user already on team, nothing to do");
        }
        Ok(())
    }

    /// Take `user_id` off the team's `role` roster and the team off the
    /// user's `teamIds`. The user must be on that roster; the leader is
    /// never removed.
    pub async fn remove_team_member(
        store: &Store,
        team_id: &str,
        user_id: &str,
        role: TeamRole,
    ) -> AppResult<()> {
        let removed = with_retry(store, "remove_team_member", move || async move {
            let mut tx = store.begin().await?;
            let mut team: Team = tx
                .get(team_id)
                .await?
                .ok_or_else(|| AppError::not_found("team"))?;
            let mut user: User = tx
                .get(user_id)
                .await?
                .ok_or_else(|| AppError::not_found("user"))?;

            if team.leader_id == user_id {
                return Err(AppError::Conflict(
                    "the team lead cannot be removed from their own team".to_string(),
                ));
            }
            match team.roster_role(user_id) {
                Some(current) if current == role => {
                    team.roster_mut(role).retain(|id| id != user_id);
                }
                Some(_) => return Err(AppError::not_found("team membership")),
                // already off the roster; only a dangling teamIds entry is left to clear
                None if user.belongs_to(team_id) => {}
                None => return Ok(false),
            }
            user.team_ids.retain(|id| id != team_id);

            let now = Utc::now();
            team.updated_at = now;
            user.updated_at = now;
            tx.put(&team).await?;
            tx.put(&user).await?;
            tx.commit().await?;
            Ok(true)
        })
        .await?;

        if removed {
            tracing::info!(team_id, user_id, %role, "user removed from team");
        }
        Ok(())
    }

    /// Leave whichever roster the user is on. The leader cannot leave.
    pub async fn leave_team(store: &Store, team_id: &str, user: &User) -> AppResult<()> {
        let team = Self::get_team(store, team_id).await?;
        if team.leader_id == user.id {
            return Err(AppError::Conflict(
                "the team lead cannot leave their own team".to_string(),
            ));
        }
        let role = team
            .roster_role(&user.id)
            .ok_or_else(|| AppError::not_found("team membership"))?;
        Self::remove_team_member(store, team_id, &user.id, role).await
    }

    /// Replace both join codes, invalidating the old ones.
    pub async fn regenerate_codes(store: &Store, team_id: &str) -> AppResult<Team> {
        with_retry(store, "regenerate_codes", move || async move {
            let mut tx = store.begin().await?;
            let mut team: Team = tx
                .get(team_id)
                .await?
                .ok_or_else(|| AppError::not_found("team"))?;
            let (referral, guide) = unique_codes(&mut tx, &team.name).await?;
            team.referral_code = referral;
            team.guide_code = guide;
            team.updated_at = Utc::now();
            tx.put(&team).await?;
            tx.commit().await?;
            Ok(team)
        })
        .await
    }

    /// Delete a team together with its logs and invitations, and drop the
    /// team from every participant's `teamIds`.
    pub async fn delete_team(store: &Store, team_id: &str) -> AppResult<()> {
        let logs_removed = with_retry(store, "delete_team", move || async move {
            let mut tx = store.begin().await?;
            let team: Team = tx
                .get(team_id)
                .await?
                .ok_or_else(|| AppError::not_found("team"))?;

            let logs: Vec<Log> = tx.find_by("teamId", team_id).await?;
            for log in &logs {
                tx.delete::<Log>(&log.id).await?;
            }

            let invitations: Vec<Invitation> = tx.find_by("teamId", team_id).await?;
            for invitation in &invitations {
                tx.delete::<Invitation>(&invitation.id).await?;
            }

            let now = Utc::now();
            for participant in team.participant_ids() {
                let Some(mut user) = tx.get::<User>(participant).await? else {
                    continue;
                };
                user.team_ids.retain(|id| id != team_id);
                user.updated_at = now;
                tx.put(&user).await?;
            }

            tx.delete::<Team>(team_id).await?;
            tx.commit().await?;
            Ok(logs.len())
        })
        .await?;

        tracing::info!(team_id, logs_removed, "team deleted");
        Ok(())
    }

    /// Roster management belongs to the team lead and admins.
    pub fn ensure_can_manage(team: &Team, actor: &User) -> AppResult<()> {
        if team.leader_id == actor.id || actor.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only the team lead can manage this team".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_keeps_six_uppercased_alphanumerics() {
        assert_eq!(code_prefix("Robo Team 2025"), "ROBOTE");
        assert_eq!(code_prefix("ai"), "AI");
        assert_eq!(code_prefix("  --  "), "TEAM");
    }

    #[test]
    fn codes_share_prefix_and_suffix() {
        let (referral, guide) = generate_codes("abcdef ghi");
        let suffix = referral.strip_prefix("ABCDEF-").unwrap();
        assert_eq!(suffix.len(), CODE_SUFFIX_LEN);
        assert!(suffix.bytes().all(|b| CODE_CHARSET.contains(&b)));
        assert_eq!(guide, format!("ABCDEF-G-{suffix}"));
    }

    #[test]
    fn codes_are_normalized_before_lookup() {
        assert_eq!(normalize_code("  abcdef-x7k2qp "), "ABCDEF-X7K2QP");
    }
}
