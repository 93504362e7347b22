use chrono::Utc;

use crate::error::{AppError, AppResult};
use crate::models::{Invitation, InvitationStatus, Team, TeamRole, User};
use crate::services::teams::{JoinedTeam, TeamService};
use crate::services::with_retry;
use crate::store::Store;

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn ensure_invitee(invitation: &Invitation, user: &User) -> AppResult<()> {
    if invitation.invited_email == normalize_email(&user.email) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "this invitation was sent to someone else".to_string(),
        ))
    }
}

fn ensure_pending(invitation: &Invitation) -> AppResult<()> {
    if invitation.is_pending() {
        Ok(())
    } else {
        Err(AppError::Conflict(
            "invitation has already been answered".to_string(),
        ))
    }
}

pub struct InvitationService;

impl InvitationService {
    pub async fn invite(
        store: &Store,
        team: &Team,
        email: &str,
        role: TeamRole,
        invited_by: &str,
    ) -> AppResult<Invitation> {
        let email = normalize_email(email);
        if !email.contains('@') {
            return Err(AppError::Validation("a valid email is required".to_string()));
        }

        let existing: Vec<Invitation> = store.find_by("teamId", team.id.as_str()).await?;
        if existing
            .iter()
            .any(|i| i.is_pending() && i.invited_email == email)
        {
            return Err(AppError::Conflict(
                "this email already has a pending invitation".to_string(),
            ));
        }

        let invitation = Invitation::new(team.id.clone(), email, role, invited_by.to_string());
        store.insert(&invitation).await?;
        tracing::info!(invitation_id = %invitation.id, team_id = %team.id, %role, "invitation sent");
        Ok(invitation)
    }

    pub async fn get(store: &Store, id: &str) -> AppResult<Invitation> {
        store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("invitation"))
    }

    pub async fn list_pending_for_email(store: &Store, email: &str) -> AppResult<Vec<Invitation>> {
        let invitations: Vec<Invitation> = store
            .find_by("invitedEmail", normalize_email(email))
            .await?;
        Ok(invitations.into_iter().filter(Invitation::is_pending).collect())
    }

    /// Join the team the invitation is for, then close the invitation. The
    /// join is idempotent, so two racing accepts add the user once and the
    /// slower one is told the invitation was already answered.
    pub async fn accept(store: &Store, id: &str, user: &User) -> AppResult<JoinedTeam> {
        let invitation = Self::get(store, id).await?;
        ensure_invitee(&invitation, user)?;
        ensure_pending(&invitation)?;

        TeamService::join_team_by_id(store, &invitation.team_id, &user.id, invitation.role).await?;
        Self::respond(store, id, InvitationStatus::Accepted).await?;

        Ok(JoinedTeam {
            team_id: invitation.team_id,
            role: invitation.role,
        })
    }

    pub async fn decline(store: &Store, id: &str, user: &User) -> AppResult<Invitation> {
        let invitation = Self::get(store, id).await?;
        ensure_invitee(&invitation, user)?;
        Self::respond(store, id, InvitationStatus::Declined).await
    }

    async fn respond(store: &Store, id: &str, status: InvitationStatus) -> AppResult<Invitation> {
        with_retry(store, "respond_invitation", move || async move {
            let mut tx = store.begin().await?;
            let mut invitation: Invitation = tx
                .get(id)
                .await?
                .ok_or_else(|| AppError::not_found("invitation"))?;
            ensure_pending(&invitation)?;
            invitation.status = status;
            invitation.responded_at = Some(Utc::now());
            tx.put(&invitation).await?;
            tx.commit().await?;
            Ok(invitation)
        })
        .await
    }

    /// Withdraw a pending invitation.
    pub async fn cancel(store: &Store, invitation: &Invitation) -> AppResult<()> {
        ensure_pending(invitation)?;
        if !store.delete::<Invitation>(&invitation.id).await? {
            return Err(AppError::not_found("invitation"));
        }
        tracing::info!(invitation_id = %invitation.id, "invitation cancelled");
        Ok(())
    }
}
