use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use portal_core::model::{
    Credentials, ProfilePatch, Session, SessionState, SettingsPatch, UserProfile, UserSettings,
};
use storage::{Mirror, MirrorKey};

use crate::Clock;
use crate::api::user::{self, ChangePasswordRequest, LoginRequest, RegisterRequest};
use crate::error::{ApiError, SessionError};
use crate::http::ApiClient;
use crate::inflight::InFlight;
use crate::shell::Shell;

#[derive(Default)]
struct SessionSlice {
    session: Session,
    settings: UserSettings,
}

/// Who is signed in, with which credentials and preferences.
///
/// Every change writes through to the mirror. The access token is also
/// published to the HTTP adapter through its shared token cell.
pub struct SessionStore {
    client: Arc<ApiClient>,
    mirror: Mirror,
    shell: Arc<dyn Shell>,
    clock: Clock,
    inflight: InFlight,
    state: Mutex<SessionSlice>,
}

impl SessionStore {
    #[must_use]
    pub fn new(
        client: Arc<ApiClient>,
        mirror: Mirror,
        shell: Arc<dyn Shell>,
        clock: Clock,
        inflight: InFlight,
    ) -> Self {
        Self {
            client,
            mirror,
            shell,
            clock,
            inflight,
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionSlice> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //
    // ─── READS ────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.lock().session.clone()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lock().session.state()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.lock().session.is_authenticated()
    }

    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.lock().session.token().map(str::to_string)
    }

    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.lock().session.user().cloned()
    }

    #[must_use]
    pub fn settings(&self) -> UserSettings {
        self.lock().settings.clone()
    }

    //
    // ─── LOGIN / LOGOUT ───────────────────────────────────────────────────
    //

    /// Sign in and persist the issued credentials and profile.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for blank input (nothing is sent),
    /// or `SessionError::Api` if the server rejects the attempt.
    pub async fn login(&self, username: &str, password: &str) -> Result<UserProfile, SessionError> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::Validation("username and password are required"));
        }

        let request = LoginRequest { username, password };
        let response = self
            .inflight
            .run("login", user::login(&self.client, &request))
            .await?;

        let credentials = Credentials::issued(
            response.token,
            response.refresh_token,
            response.expires_in,
            self.clock.now(),
        );
        let settings: UserSettings = self.mirror.load(MirrorKey::UserSettings).unwrap_or_default();

        self.persist_credentials(&credentials);
        self.mirror.save(MirrorKey::User, &response.user);
        self.client.tokens().set(Some(credentials.token.clone()));
        {
            let mut slice = self.lock();
            slice.session = Session::authenticated(credentials, Some(response.user.clone()));
            slice.settings = settings;
        }

        info!(user = %response.user.username, "signed in");
        Ok(response.user)
    }

    /// Create an account. Does not sign in.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Validation` for missing fields, or
    /// `SessionError::Api` if registration is refused.
    pub async fn register(&self, request: &RegisterRequest) -> Result<(), SessionError> {
        if request.username.trim().is_empty()
            || request.email.trim().is_empty()
            || request.password.is_empty()
        {
            return Err(SessionError::Validation("username, email and password are required"));
        }
        self.inflight
            .run("register", user::register(&self.client, request))
            .await?;
        Ok(())
    }

    /// Drop the session locally, tell the server, then go to the login view.
    ///
    /// Local state and persisted session keys are cleared before the server
    /// is contacted, so a failed server call never leaves credentials behind.
    pub async fn logout(&self) {
        let token = {
            let mut slice = self.lock();
            let token = slice.session.token().map(str::to_string);
            slice.session.clear();
            slice.settings = UserSettings::default();
            token
        };
        self.client.tokens().clear();
        self.inflight.cancel_pending();
        self.mirror.remove_all(&MirrorKey::SESSION_SCOPED);

        if let Some(token) = token {
            if let Err(err) = user::logout(&self.client, &token).await {
                debug!(error = %err, "server-side logout failed; ignoring");
            }
        }

        info!("signed out");
        self.shell.navigate_to_login();
    }

    //
    // ─── TOKEN REFRESH ────────────────────────────────────────────────────
    //

    /// Exchange the refresh token for new credentials.
    ///
    /// Any failure other than cancellation signs the user out.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::NotAuthenticated` when nobody is signed in,
    /// `SessionError::NoRefreshToken` when there is nothing to exchange, or
    /// `SessionError::Api` if the exchange fails.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let refresh_token = {
            let mut slice = self.lock();
            if !slice.session.is_authenticated() {
                return Err(SessionError::NotAuthenticated);
            }
            let token = slice.session.refresh_token().map(str::to_string);
            if token.is_some() {
                slice.session.begin_refresh();
            }
            token
        };

        let Some(refresh_token) = refresh_token else {
            warn!("no refresh token; signing out");
            self.logout().await;
            return Err(SessionError::NoRefreshToken);
        };

        match self
            .inflight
            .run("refresh", user::refresh(&self.client, &refresh_token))
            .await
        {
            Ok(response) => {
                let credentials = Credentials::issued(
                    response.token,
                    response.refresh_token.or(Some(refresh_token)),
                    response.expires_in,
                    self.clock.now(),
                );
                self.persist_credentials(&credentials);
                self.client.tokens().set(Some(credentials.token.clone()));
                self.lock().session.replace_credentials(credentials);
                debug!("access token refreshed");
                Ok(())
            }
            Err(ApiError::Cancelled) => {
                let mut slice = self.lock();
                if let Some(credentials) = slice.session.credentials().cloned() {
                    slice.session.replace_credentials(credentials);
                }
                Err(ApiError::Cancelled.into())
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; signing out");
                self.logout().await;
                Err(err.into())
            }
        }
    }

    /// Refresh if the access token expires within the skew window.
    /// Returns whether a refresh happened.
    ///
    /// # Errors
    ///
    /// See [`SessionStore::refresh`].
    pub async fn ensure_fresh(&self) -> Result<bool, SessionError> {
        let stale = {
            let slice = self.lock();
            slice
                .session
                .credentials()
                .is_some_and(|c| c.is_stale(self.clock.now()))
        };
        if stale {
            self.refresh().await?;
        }
        Ok(stale)
    }

    //
    // ─── STARTUP ──────────────────────────────────────────────────────────
    //

    /// Restore the persisted session. Returns whether a token was found.
    pub fn restore(&self) -> bool {
        let Some(token) = self.mirror.load::<String>(MirrorKey::Token) else {
            return false;
        };
        let credentials = Credentials {
            token,
            refresh_token: self.mirror.load(MirrorKey::RefreshToken),
            expires_at: self.mirror.load::<DateTime<Utc>>(MirrorKey::TokenExpiry),
        };
        let user: Option<UserProfile> = self.mirror.load(MirrorKey::User);
        let settings: UserSettings = self.mirror.load(MirrorKey::UserSettings).unwrap_or_default();

        self.client.tokens().set(Some(credentials.token.clone()));
        let mut slice = self.lock();
        slice.session = Session::authenticated(credentials, user);
        slice.settings = settings;
        true
    }

    /// Restore the persisted session synchronously, then validate it against
    /// the server in the background.
    ///
    /// The session is authenticated as soon as this returns. If validation
    /// gets a business error back the user is signed out; a network failure
    /// keeps the optimistic session. Returns the validation task, if any.
    pub fn initialize_user(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        if !self.restore() {
            return None;
        }
        debug!("session restored; validating in background");
        let store = Arc::clone(self);
        Some(tokio::spawn(async move { store.validate().await }))
    }

    async fn validate(&self) {
        match self
            .inflight
            .run("profile", user::profile(&self.client))
            .await
        {
            Ok(profile) => self.set_user(profile),
            Err(err) if err.is_network() || err.is_cancelled() => {
                warn!(error = %err, "could not validate session; keeping it");
            }
            Err(err) => {
                warn!(error = %err, "stored session rejected; signing out");
                if self.is_authenticated() {
                    self.logout().await;
                }
            }
        }
    }

    //
    // ─── PROFILE / SETTINGS ───────────────────────────────────────────────
    //

    /// # Errors
    ///
    /// Returns `SessionError::Api` if the profile cannot be fetched.
    pub async fn fetch_profile(&self) -> Result<UserProfile, SessionError> {
        let profile = self
            .inflight
            .run("profile", user::profile(&self.client))
            .await?;
        self.set_user(profile.clone());
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Validation` for an empty patch, or
    /// `SessionError::Api` if the server rejects it.
    pub async fn update_profile(&self, patch: &ProfilePatch) -> Result<UserProfile, SessionError> {
        if patch.is_empty() {
            return Err(SessionError::Validation("nothing to update"));
        }
        let profile = self
            .inflight
            .run("profile", user::update_profile(&self.client, patch))
            .await?;
        self.set_user(profile.clone());
        Ok(profile)
    }

    /// # Errors
    ///
    /// Returns `SessionError::Validation` for blank passwords, or
    /// `SessionError::Api` if the change is refused.
    pub async fn change_password(&self, current: &str, new: &str) -> Result<(), SessionError> {
        if current.is_empty() || new.is_empty() {
            return Err(SessionError::Validation("current and new password are required"));
        }
        let request = ChangePasswordRequest {
            current_password: current,
            new_password: new,
        };
        self.inflight
            .run("password", user::change_password(&self.client, &request))
            .await?;
        Ok(())
    }

    /// Merge `patch` into the settings and persist locally, then sync the
    /// result to the server. A failed sync keeps the local settings.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Api` if the server sync fails.
    pub async fn save_settings(&self, patch: SettingsPatch) -> Result<UserSettings, SessionError> {
        let settings = {
            let mut slice = self.lock();
            slice.settings.merge(patch);
            slice.settings.clone()
        };
        self.mirror.save(MirrorKey::UserSettings, &settings);

        if !self.is_authenticated() {
            return Ok(settings);
        }
        self.inflight
            .run("settings", user::update_settings(&self.client, &settings))
            .await?;
        Ok(settings)
    }

    fn set_user(&self, profile: UserProfile) {
        let mut slice = self.lock();
        if !slice.session.is_authenticated() {
            return;
        }
        self.mirror.save(MirrorKey::User, &profile);
        slice.session.set_user(Some(profile));
    }

    fn persist_credentials(&self, credentials: &Credentials) {
        self.mirror.save(MirrorKey::Token, &credentials.token);
        match &credentials.refresh_token {
            Some(token) => self.mirror.save(MirrorKey::RefreshToken, token),
            None => self.mirror.remove(MirrorKey::RefreshToken),
        };
        match &credentials.expires_at {
            Some(at) => self.mirror.save(MirrorKey::TokenExpiry, at),
            None => self.mirror.remove(MirrorKey::TokenExpiry),
        };
    }
}
