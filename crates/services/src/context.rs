use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc::{self, UnboundedReceiver};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use storage::Mirror;

use crate::Clock;
use crate::config::ApiConfig;
use crate::conversion_store::ConversionStore;
use crate::error::ContextError;
use crate::http::{ApiClient, AuthEvent, RELOGIN_PROMPT, ReqwestTransport, SessionTokens, Transport};
use crate::inflight::InFlight;
use crate::learning_store::LearningStore;
use crate::session_store::SessionStore;
use crate::shell::Shell;

/// The portal's stores, built once at startup and shared with every view.
pub struct PortalContext {
    client: Arc<ApiClient>,
    shell: Arc<dyn Shell>,
    session: Arc<SessionStore>,
    learning: Arc<LearningStore>,
    conversion: Arc<ConversionStore>,
    auth_events: Mutex<Option<UnboundedReceiver<AuthEvent>>>,
    shutdown: CancellationToken,
}

impl PortalContext {
    /// Wire the stores over `transport`.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ApiConfig,
        mirror: Mirror,
        shell: Arc<dyn Shell>,
        clock: Clock,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let client = Arc::new(
            ApiClient::new(
                transport,
                config,
                clock.clone(),
                SessionTokens::new(),
                Arc::clone(&shell),
            )
            .with_auth_events(sender),
        );
        let inflight = || InFlight::new(shutdown.child_token());

        let session = Arc::new(SessionStore::new(
            Arc::clone(&client),
            mirror.clone(),
            Arc::clone(&shell),
            clock.clone(),
            inflight(),
        ));
        let learning = Arc::new(LearningStore::new(
            Arc::clone(&client),
            mirror.clone(),
            clock.clone(),
            inflight(),
        ));
        let conversion = Arc::new(ConversionStore::new(
            Arc::clone(&client),
            mirror,
            clock,
            inflight(),
        ));

        Self {
            client,
            shell,
            session,
            learning,
            conversion,
            auth_events: Mutex::new(Some(receiver)),
            shutdown,
        }
    }

    /// Wire the stores over HTTP using `config`.
    ///
    /// # Errors
    ///
    /// Returns `ContextError` if the HTTP client cannot be built.
    pub fn with_reqwest(
        config: ApiConfig,
        mirror: Mirror,
        shell: Arc<dyn Shell>,
        clock: Clock,
    ) -> Result<Self, ContextError> {
        let transport = Arc::new(ReqwestTransport::new(config.timeout)?);
        Ok(Self::new(transport, config, mirror, shell, clock))
    }

    /// Load persisted state into every store and start the auth listener.
    ///
    /// Must run inside a Tokio runtime. Returns the background session
    /// validation task when a stored session was found.
    pub fn start(&self) -> Option<JoinHandle<()>> {
        let receiver = self
            .auth_events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(receiver) = receiver {
            tokio::spawn(run_auth_listener(
                receiver,
                Arc::clone(&self.session),
                Arc::clone(&self.shell),
                self.shutdown.clone(),
            ));
        }

        self.conversion.initialize();
        self.learning.restore();
        let validation = self.session.initialize_user();
        info!(
            authenticated = self.session.is_authenticated(),
            "portal context started"
        );
        validation
    }

    #[must_use]
    pub fn client(&self) -> Arc<ApiClient> {
        Arc::clone(&self.client)
    }

    #[must_use]
    pub fn session(&self) -> Arc<SessionStore> {
        Arc::clone(&self.session)
    }

    #[must_use]
    pub fn learning(&self) -> Arc<LearningStore> {
        Arc::clone(&self.learning)
    }

    #[must_use]
    pub fn conversion(&self) -> Arc<ConversionStore> {
        Arc::clone(&self.conversion)
    }

    /// Cancel the learning and conversion requests a departing view started.
    pub fn cancel_pending(&self) {
        self.learning.cancel_pending();
        self.conversion.cancel_pending();
    }

    /// Cancel all in-flight work and stop the auth listener.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for PortalContext {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Turns rejected-credential events into the re-login flow: ask, then sign
/// out. Events are ignored while nobody is signed in, so the logout call
/// itself cannot start another round.
async fn run_auth_listener(
    mut receiver: UnboundedReceiver<AuthEvent>,
    session: Arc<SessionStore>,
    shell: Arc<dyn Shell>,
    shutdown: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            () = shutdown.cancelled() => break,
            event = receiver.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let AuthEvent::Unauthorized { code } = event;
        if !session.is_authenticated() {
            debug!(code, "credential rejected while signed out; ignoring");
            continue;
        }
        if shell.confirm_relogin(RELOGIN_PROMPT).await && session.is_authenticated() {
            info!(code, "credential rejected; signing out");
            session.logout().await;
        }
    }
    debug!("auth listener stopped");
}
