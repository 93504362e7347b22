pub mod auth;
pub mod invitations;
pub mod logs;
pub mod notifications;
pub mod teams;
