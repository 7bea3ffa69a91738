use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

use super::classify::{AuthEvent, user_message};
use super::envelope::RawEnvelope;
use super::tokens::SessionTokens;
use super::transport::{Method, Transport, WireRequest, WireResponse};
use super::Endpoint;
use crate::Clock;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::shell::Shell;

#[derive(Debug, Clone)]
enum Bearer {
    Session,
    Explicit(String),
}

/// One call through [`ApiClient::send`].
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    endpoint: Endpoint,
    query: Vec<(String, String)>,
    body: Option<Value>,
    bearer: Bearer,
    quiet: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, endpoint: impl Into<Endpoint>) -> Self {
        Self {
            method,
            endpoint: endpoint.into(),
            query: Vec::new(),
            body: None,
            bearer: Bearer::Session,
            quiet: false,
        }
    }

    /// Attach a JSON body.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Encode` if `body` cannot be serialized.
    pub fn json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|err| ApiError::Encode(err.to_string()))?;
        self.body = Some(value);
        Ok(self)
    }

    #[must_use]
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        self.query.push((key.to_string(), value.to_string()));
        self
    }

    /// Authenticate with `token` instead of the current session token.
    #[must_use]
    pub fn bearer(mut self, token: impl Into<String>) -> Self {
        self.bearer = Bearer::Explicit(token.into());
        self
    }

    /// Failures are only logged. They are neither shown to the user nor
    /// reported as rejected credentials; the caller handles them.
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }
}

/// Sends requests, unwraps the response envelope and classifies failures.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    config: ApiConfig,
    clock: Clock,
    tokens: SessionTokens,
    shell: Arc<dyn Shell>,
    auth_events: Option<UnboundedSender<AuthEvent>>,
}

impl ApiClient {
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        config: ApiConfig,
        clock: Clock,
        tokens: SessionTokens,
        shell: Arc<dyn Shell>,
    ) -> Self {
        Self {
            transport,
            config,
            clock,
            tokens,
            shell,
            auth_events: None,
        }
    }

    /// Report rejected credentials on `sender`.
    #[must_use]
    pub fn with_auth_events(mut self, sender: UnboundedSender<AuthEvent>) -> Self {
        self.auth_events = Some(sender);
        self
    }

    #[must_use]
    pub fn tokens(&self) -> &SessionTokens {
        &self.tokens
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn get<T: DeserializeOwned>(&self, endpoint: impl Into<Endpoint>) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::Get, endpoint)).await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn post<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: impl Into<Endpoint>,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::Post, endpoint).json(body)?)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn put<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: impl Into<Endpoint>,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::Put, endpoint).json(body)?)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn patch<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        endpoint: impl Into<Endpoint>,
        body: &B,
    ) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::Patch, endpoint).json(body)?)
            .await
    }

    /// # Errors
    ///
    /// See [`ApiClient::send`].
    pub async fn delete<T: DeserializeOwned>(&self, endpoint: impl Into<Endpoint>) -> Result<T, ApiError> {
        self.send(ApiRequest::new(Method::Delete, endpoint)).await
    }

    /// Send `request` and return the envelope's `data` decoded as `T`.
    ///
    /// Failures are logged. Unless the request is quiet, they are also shown
    /// through the shell and a rejected credential raises
    /// [`AuthEvent::Unauthorized`].
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Timeout`/`Network` when no response arrived,
    /// `ApiError::Business` for a non-2xx status or non-success envelope code,
    /// and `ApiError::Decode` when the body does not match.
    pub async fn send<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let method = request.method;
        let endpoint = request.endpoint.to_string();
        let quiet = request.quiet;
        let wire = self.resolve(request);
        let credentialed = wire.bearer.is_some();

        debug!(method = method.as_str(), %endpoint, "api request");
        let result = match self.transport.execute(wire).await {
            Ok(response) => self.unwrap(&response),
            Err(err) => Err(ApiError::from(err)),
        };

        if let Err(err) = &result {
            self.report(method, &endpoint, err, credentialed, quiet);
        }
        result
    }

    fn resolve(&self, request: ApiRequest) -> WireRequest {
        let mut url = self.config.url_for(&request.endpoint);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &request.query {
                pairs.append_pair(key, value);
            }
            if request.method == Method::Get {
                pairs.append_pair("_t", &self.clock.now_millis().to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let bearer = match request.bearer {
            Bearer::Session => self.tokens.get(),
            Bearer::Explicit(token) => Some(token),
        };

        WireRequest {
            method: request.method,
            url,
            bearer,
            body: request.body,
        }
    }

    fn unwrap<T: DeserializeOwned>(&self, response: &WireResponse) -> Result<T, ApiError> {
        if !response.is_success() {
            let message = RawEnvelope::parse(&response.body)
                .map(|env| env.message)
                .unwrap_or_default();
            return Err(ApiError::Business {
                code: i64::from(response.status),
                message,
            });
        }
        RawEnvelope::parse(&response.body)?
            .into_outcome(self.config.success_code)?
            .into_result()
    }

    fn report(&self, method: Method, endpoint: &str, err: &ApiError, credentialed: bool, quiet: bool) {
        if err.is_cancelled() {
            return;
        }
        warn!(method = method.as_str(), %endpoint, error = %err, "api request failed");
        if quiet {
            return;
        }

        if err.is_auth() && credentialed {
            if let (Some(sender), Some(code)) = (&self.auth_events, err.code()) {
                if sender.send(AuthEvent::Unauthorized { code }).is_err() {
                    debug!("auth listener gone; dropping unauthorized event");
                }
            }
        }

        if let Some(message) = user_message(err) {
            self.shell.show_error(&message);
        }
    }
}
