//! Seam to whatever presents the portal to a person.

use async_trait::async_trait;
use tracing::{info, warn};

/// User-facing side effects the stores and the HTTP adapter may trigger.
#[async_trait]
pub trait Shell: Send + Sync {
    /// Surface a short error message.
    fn show_error(&self, message: &str);

    /// Ask whether to sign in again after the credential was rejected.
    async fn confirm_relogin(&self, message: &str) -> bool;

    /// Leave the current view for the login entry point, dropping view state.
    fn navigate_to_login(&self);
}

/// Shell without a person in front of it: messages go to the log and every
/// re-login prompt is accepted.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeadlessShell;

#[async_trait]
impl Shell for HeadlessShell {
    fn show_error(&self, message: &str) {
        warn!(%message, "portal error");
    }

    async fn confirm_relogin(&self, message: &str) -> bool {
        info!(%message, "re-login requested; accepting");
        true
    }

    fn navigate_to_login(&self) {
        info!("navigating to login");
    }
}
