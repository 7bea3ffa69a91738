use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::model::user::UserProfile;

/// Refresh the access token once it is this close to expiring.
pub const REFRESH_SKEW_SECS: i64 = 30;

/// Lifecycle of the client session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    #[default]
    Anonymous,
    Authenticated,
    Refreshing,
}

/// Access and refresh credentials issued at login or refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Credentials {
    /// Build credentials from an `expiresIn` (seconds) value relative to `now`.
    #[must_use]
    pub fn issued(
        token: String,
        refresh_token: Option<String>,
        expires_in_secs: Option<i64>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            refresh_token,
            expires_at: expires_in_secs.map(|secs| now + Duration::seconds(secs)),
        }
    }

    /// True when the token expires within [`REFRESH_SKEW_SECS`] of `now`.
    ///
    /// Tokens without a known expiry are never considered stale.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|at| at <= now + Duration::seconds(REFRESH_SKEW_SECS))
    }
}

/// In-memory session snapshot owned by the session store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    state: SessionState,
    credentials: Option<Credentials>,
    user: Option<UserProfile>,
}

impl Session {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn authenticated(credentials: Credentials, user: Option<UserProfile>) -> Self {
        Self {
            state: SessionState::Authenticated,
            credentials: Some(credentials),
            user,
        }
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Derived flag: a token is present.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.credentials.is_some()
    }

    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.credentials.as_ref().map(|c| c.token.as_str())
    }

    #[must_use]
    pub fn refresh_token(&self) -> Option<&str> {
        self.credentials
            .as_ref()
            .and_then(|c| c.refresh_token.as_deref())
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn user_mut(&mut self) -> Option<&mut UserProfile> {
        self.user.as_mut()
    }

    pub fn set_user(&mut self, user: Option<UserProfile>) {
        self.user = user;
    }

    /// Enter `Refreshing`. Only meaningful while authenticated.
    pub fn begin_refresh(&mut self) -> bool {
        if self.state == SessionState::Authenticated {
            self.state = SessionState::Refreshing;
            true
        } else {
            false
        }
    }

    /// Replace both tokens after a successful refresh.
    pub fn replace_credentials(&mut self, credentials: Credentials) {
        self.credentials = Some(credentials);
        self.state = SessionState::Authenticated;
    }

    /// Drop everything and return to `Anonymous`.
    pub fn clear(&mut self) {
        *self = Self::anonymous();
    }
}
