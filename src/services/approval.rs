//! Log approval pipeline.
//!
//! ```text
//! draft ──author──▶ pending-lead ──lead──▶ pending-guide ──guide──▶ approved ──admin──▶ final-approved
//!                     │    ▲                   │
//!                    lead  └──author──┐       guide
//!                     ▼               │        ▼
//!                  needs-revision ────┴──author──▶ (stage of the last reviewer who sent it back)
//! ```
//!
//! Admins may move a log between any two states.

use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::models::{Comment, Log, LogStatus, Role, Team, User};
use crate::services::notifications::NotificationService;
use crate::services::with_retry;
use crate::store::{Store, StoreTx};

/// Where an author's resubmission lands: back with the guide if a guide (or
/// coordinator) asked for the revision, otherwise with the team lead.
pub fn resubmission_target(log: &Log) -> LogStatus {
    match log.last_revision_request().map(|c| c.role) {
        Some(Role::Guide | Role::Admin) => LogStatus::PendingGuide,
        _ => LogStatus::PendingLead,
    }
}

/// The role table. `routed` is the log's current [`resubmission_target`].
pub fn is_allowed(
    role: Role,
    is_author: bool,
    from: LogStatus,
    to: LogStatus,
    routed: LogStatus,
) -> bool {
    use crate::models::LogStatus::*;

    if role == Role::Admin {
        return true;
    }
    let author = is_author && matches!(role, Role::Student | Role::TeamLead);

    match (from, to) {
        (Draft | NeedsRevision, PendingLead) => author,
        (NeedsRevision, PendingGuide) => author && routed == PendingGuide,
        (PendingLead, PendingGuide | NeedsRevision) => role == Role::TeamLead,
        (PendingGuide, Approved | NeedsRevision) => role == Role::Guide,
        _ => false,
    }
}

// Reviewers act only on their own team's logs.
fn ensure_reviewer_scope(team: &Team, actor: &User, from: LogStatus) -> AppResult<()> {
    let in_scope = match from {
        LogStatus::PendingLead => team.leader_id == actor.id,
        LogStatus::PendingGuide => team.guide_ids.contains(&actor.id),
        _ => true,
    };
    if in_scope {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "reviewer is not assigned to this team".to_string(),
        ))
    }
}

fn comment_from(actor: &User, text: &str, requests_revision: bool) -> Comment {
    Comment {
        author_id: actor.id.clone(),
        author_name: actor.name.clone(),
        role: actor.role,
        text: text.trim().to_string(),
        timestamp: Utc::now(),
        requests_revision,
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

pub struct ApprovalService;

impl ApprovalService {
    /// Move a log to `target` on behalf of `actor`.
    ///
    /// Entering `needs-revision` requires `comment`; the comment is stored with
    /// the status change and the author receives one notification, all in the
    /// same transaction.
    pub async fn transition(
        store: &Store,
        log_id: &str,
        actor: &User,
        target: LogStatus,
        comment: Option<&str>,
    ) -> AppResult<Log> {
        let comment = non_blank(comment);
        let (log, from) = with_retry(store, "transition", || {
            Self::apply(store, log_id, actor, target, comment)
        })
        .await?;

        tracing::info!(
            log_id,
            actor = %actor.id,
            role = %actor.role,
            %from,
            to = %target,
            "log status changed"
        );
        Ok(log)
    }

    async fn apply(
        store: &Store,
        log_id: &str,
        actor: &User,
        target: LogStatus,
        comment: Option<&str>,
    ) -> AppResult<(Log, LogStatus)> {
        let mut tx = store.begin().await?;
        let mut log: Log = tx
            .get(log_id)
            .await?
            .ok_or_else(|| AppError::not_found("log"))?;
        let from = log.status;

        let is_author = log.created_by == actor.id;
        if !is_allowed(actor.role, is_author, from, target, resubmission_target(&log)) {
            return Err(AppError::IllegalTransition {
                role: actor.role,
                from,
                to: target,
            });
        }

        if !actor.is_admin() && matches!(from, LogStatus::PendingLead | LogStatus::PendingGuide) {
            let team = Self::team_of(&mut tx, &log).await?;
            ensure_reviewer_scope(&team, actor, from)?;
        }

        let now = Utc::now();
        if target == LogStatus::NeedsRevision {
            let text = comment.ok_or_else(|| {
                AppError::Validation("a comment is required when requesting revision".to_string())
            })?;
            log.comments.push(comment_from(actor, text, true));
            NotificationService::create_in(
                &mut tx,
                &log.created_by,
                "Log needs revision",
                &format!(
                    "{} requested changes to your week {} log: {}",
                    actor.name, log.week_number, text
                ),
                Some(&log.id),
            )
            .await?;
        } else if let Some(text) = comment {
            log.comments.push(comment_from(actor, text, false));
        }

        log.status = target;
        log.updated_at = now;
        tx.put(&log).await?;
        tx.commit().await?;
        Ok((log, from))
    }

    async fn team_of(tx: &mut StoreTx, log: &Log) -> AppResult<Team> {
        tx.get(&log.team_id)
            .await?
            .ok_or_else(|| AppError::not_found("team"))
    }

    /// Author hands the log in: drafts go to the team lead, revised logs go
    /// back to whoever asked for the revision.
    pub async fn submit(store: &Store, log_id: &str, author: &User) -> AppResult<Log> {
        let log: Log = store
            .get(log_id)
            .await?
            .ok_or_else(|| AppError::not_found("log"))?;

        let target = match log.status {
            LogStatus::Draft => LogStatus::PendingLead,
            LogStatus::NeedsRevision => resubmission_target(&log),
            from => {
                return Err(AppError::IllegalTransition {
                    role: author.role,
                    from,
                    to: LogStatus::PendingLead,
                });
            }
        };

        Self::transition(store, log_id, author, target, None).await
    }

    /// Plain discussion comment; does not change status.
    pub async fn add_comment(
        store: &Store,
        log_id: &str,
        actor: &User,
        text: &str,
    ) -> AppResult<Log> {
        let Some(text) = non_blank(Some(text)) else {
            return Err(AppError::Validation("comment text is required".to_string()));
        };

        with_retry(store, "add_comment", move || async move {
            let mut tx = store.begin().await?;
            let mut log: Log = tx
                .get(log_id)
                .await?
                .ok_or_else(|| AppError::not_found("log"))?;
            log.comments.push(comment_from(actor, text, false));
            log.updated_at = Utc::now();
            tx.put(&log).await?;
            tx.commit().await?;
            Ok(log)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LogStatus::*;

    const ALL: [LogStatus; 6] = [
        Draft,
        PendingLead,
        PendingGuide,
        Approved,
        FinalApproved,
        NeedsRevision,
    ];

    #[test]
    fn guide_cannot_touch_pending_lead() {
        for to in ALL {
            assert!(!is_allowed(Role::Guide, false, PendingLead, to, PendingLead));
        }
    }

    #[test]
    fn admin_may_move_anything_anywhere() {
        for from in ALL {
            for to in ALL {
                assert!(is_allowed(Role::Admin, false, from, to, PendingLead));
            }
        }
    }

    #[test]
    fn author_submits_drafts_only_to_lead() {
        assert!(is_allowed(Role::Student, true, Draft, PendingLead, PendingLead));
        assert!(!is_allowed(Role::Student, true, Draft, PendingGuide, PendingLead));
        assert!(!is_allowed(Role::Student, false, Draft, PendingLead, PendingLead));
        assert!(is_allowed(Role::TeamLead, true, Draft, PendingLead, PendingLead));
    }

    #[test]
    fn resubmission_to_guide_requires_guide_routing() {
        assert!(is_allowed(Role::Student, true, NeedsRevision, PendingGuide, PendingGuide));
        assert!(!is_allowed(Role::Student, true, NeedsRevision, PendingGuide, PendingLead));
        assert!(is_allowed(Role::Student, true, NeedsRevision, PendingLead, PendingGuide));
    }

    #[test]
    fn reviewers_follow_their_stage() {
        assert!(is_allowed(Role::TeamLead, false, PendingLead, PendingGuide, PendingLead));
        assert!(is_allowed(Role::TeamLead, false, PendingLead, NeedsRevision, PendingLead));
        assert!(!is_allowed(Role::TeamLead, false, PendingGuide, Approved, PendingLead));
        assert!(is_allowed(Role::Guide, false, PendingGuide, Approved, PendingLead));
        assert!(is_allowed(Role::Guide, false, PendingGuide, NeedsRevision, PendingLead));
        assert!(!is_allowed(Role::Guide, false, Approved, FinalApproved, PendingLead));
    }

    #[test]
    fn final_approved_is_terminal_for_non_admins() {
        for role in [Role::Student, Role::TeamLead, Role::Guide] {
            for to in ALL {
                assert!(!is_allowed(role, true, FinalApproved, to, PendingLead));
            }
        }
    }
}
