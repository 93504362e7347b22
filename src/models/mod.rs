pub mod invitation;
pub mod log;
pub mod notification;
pub mod team;
pub mod user;

pub use invitation::{Invitation, InvitationStatus};
pub use log::{Activity, Comment, Log, LogStatus};
pub use notification::Notification;
pub use team::{Team, TeamRole};
pub use user::{Role, User};
