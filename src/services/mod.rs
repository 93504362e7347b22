pub mod approval;
pub mod invitations;
pub mod logs;
pub mod notifications;
pub mod teams;
pub mod users;

pub use approval::ApprovalService;
pub use invitations::InvitationService;
pub use logs::{LogPatch, LogService, NewActivity, NewLog, TeamSummary};
pub use notifications::NotificationService;
pub use teams::{JoinedTeam, TeamService};
pub use users::UserService;

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::AppResult;
use crate::store::Store;

/// Run a read-verify-write transaction body, replaying it from scratch when a
/// concurrent writer invalidated what it read. Replays back off a few
/// milliseconds so the winning writer can commit first.
pub(crate) async fn with_retry<T, F, Fut>(store: &Store, operation: &str, mut body: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    let mut attempt = 1;
    loop {
        match body().await {
            Err(e) if e.is_conflict() && attempt < store.max_attempts() => {
                tracing::debug!(operation, attempt, "transaction conflicted, retrying");
                let jitter = rand::rng().random_range(1..=5);
                tokio::time::sleep(Duration::from_millis(jitter * u64::from(attempt))).await;
                attempt += 1;
            }
            Err(e) if e.is_conflict() => {
                tracing::warn!(operation, attempt, "transaction kept conflicting, giving up");
                return Err(e);
            }
            result => return result,
        }
    }
}
