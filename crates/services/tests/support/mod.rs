#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::Notify;

use portal_core::time::fixed_clock;
use services::http::{Method, Transport, WireRequest, WireResponse};
use services::{ApiConfig, Clock, PortalContext, Shell, TransportError};
use storage::{InMemoryStore, Mirror};

#[derive(Clone)]
enum Reply {
    Envelope { code: i64, message: String, data: Value },
    Status(u16),
    Offline,
    Timeout,
}

#[derive(Clone)]
struct Route {
    reply: Reply,
    gate: Option<Arc<Notify>>,
}

/// Scripted transport. Replies are sticky per (method, path); unscripted
/// routes behave as if the server were unreachable.
#[derive(Default)]
pub struct StubTransport {
    routes: Mutex<HashMap<(Method, String), Route>>,
    requests: Mutex<Vec<WireRequest>>,
    delivered: Mutex<Vec<(Method, String)>>,
}

impl StubTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn script(&self, method: Method, path: &str, reply: Reply) {
        self.routes.lock().unwrap().insert(
            (method, path.to_string()),
            Route { reply, gate: None },
        );
    }

    pub fn ok(&self, method: Method, path: &str, data: Value) {
        self.script(
            method,
            path,
            Reply::Envelope {
                code: 200,
                message: "success".into(),
                data,
            },
        );
    }

    pub fn business(&self, method: Method, path: &str, code: i64, message: &str) {
        self.script(
            method,
            path,
            Reply::Envelope {
                code,
                message: message.into(),
                data: Value::Null,
            },
        );
    }

    pub fn status(&self, method: Method, path: &str, status: u16) {
        self.script(method, path, Reply::Status(status));
    }

    pub fn offline(&self, method: Method, path: &str) {
        self.script(method, path, Reply::Offline);
    }

    pub fn timeout(&self, method: Method, path: &str) {
        self.script(method, path, Reply::Timeout);
    }

    /// Hold requests to this route until the returned gate is notified.
    pub fn hold(&self, method: Method, path: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        let mut routes = self.routes.lock().unwrap();
        let route = routes
            .entry((method, path.to_string()))
            .or_insert(Route {
                reply: Reply::Offline,
                gate: None,
            });
        route.gate = Some(Arc::clone(&gate));
        gate
    }

    pub fn requests(&self) -> Vec<WireRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn calls(&self, method: Method, path: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.method == method && r.url.path() == path)
            .count()
    }

    /// Requests that got past their route's gate and were answered.
    pub fn delivered(&self, method: Method, path: &str) -> usize {
        self.delivered
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, p)| *m == method && p == path)
            .count()
    }

    pub fn last(&self, method: Method, path: &str) -> Option<WireRequest> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|r| r.method == method && r.url.path() == path)
            .cloned()
    }
}

#[async_trait]
impl Transport for StubTransport {
    async fn execute(&self, request: WireRequest) -> Result<WireResponse, TransportError> {
        let key = (request.method, request.url.path().to_string());
        self.requests.lock().unwrap().push(request);
        let route = self.routes.lock().unwrap().get(&key).cloned();
        let Some(route) = route else {
            return Err(TransportError::Connect("connection refused".into()));
        };
        if let Some(gate) = route.gate {
            gate.notified().await;
        }
        self.delivered.lock().unwrap().push(key);
        match route.reply {
            Reply::Envelope {
                code,
                message,
                data,
            } => Ok(WireResponse {
                status: 200,
                body: json!({
                    "code": code,
                    "message": message,
                    "data": data,
                    "timestamp": 1_700_000_000_000_i64,
                })
                .to_string(),
            }),
            Reply::Status(status) => Ok(WireResponse {
                status,
                body: String::new(),
            }),
            Reply::Offline => Err(TransportError::Connect("connection refused".into())),
            Reply::Timeout => Err(TransportError::Timeout),
        }
    }
}

/// Shell that remembers what it was asked to do.
#[derive(Default)]
pub struct RecordingShell {
    errors: Mutex<Vec<String>>,
    prompts: AtomicUsize,
    navigations: AtomicUsize,
    decline: AtomicBool,
}

impl RecordingShell {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn decline_relogin(&self) {
        self.decline.store(true, Ordering::SeqCst);
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    pub fn navigations(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Shell for RecordingShell {
    fn show_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }

    async fn confirm_relogin(&self, _message: &str) -> bool {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        !self.decline.load(Ordering::SeqCst)
    }

    fn navigate_to_login(&self) {
        self.navigations.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Harness {
    pub transport: Arc<StubTransport>,
    pub shell: Arc<RecordingShell>,
    pub store: InMemoryStore,
    pub clock: Clock,
    pub context: PortalContext,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(InMemoryStore::new())
    }

    /// Build over an existing backend, e.g. one pre-seeded with a session.
    pub fn with_store(store: InMemoryStore) -> Self {
        let transport = StubTransport::new();
        let shell = RecordingShell::new();
        let clock = fixed_clock();
        let config = ApiConfig::from_lookup(|_| None).expect("default config");
        let context = PortalContext::new(
            transport.clone(),
            config,
            Mirror::new(Arc::new(store.clone())),
            shell.clone(),
            clock.clone(),
        );
        Self {
            transport,
            shell,
            store,
            clock,
            context,
        }
    }

    /// A second mirror over the same backend, as a fresh process would see it.
    pub fn reopened_mirror(&self) -> Mirror {
        Mirror::new(Arc::new(self.store.clone()))
    }
}

pub fn user_json() -> Value {
    json!({
        "id": 7,
        "username": "ada",
        "email": "ada@example.com",
        "status": "active"
    })
}

pub fn login_json() -> Value {
    json!({
        "user": user_json(),
        "token": "access-1",
        "refreshToken": "refresh-1",
        "expiresIn": 3600
    })
}

/// Wait until `condition` holds, yielding to other tasks in between.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}
