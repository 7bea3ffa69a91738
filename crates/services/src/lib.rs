#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod context;
pub mod conversion_store;
pub mod error;
pub mod http;
pub mod inflight;
pub mod learning_store;
pub mod outcome;
pub mod session_store;
pub mod shell;

pub use portal_core::Clock;

pub use config::ApiConfig;
pub use context::PortalContext;
pub use conversion_store::ConversionStore;
pub use error::{
    ApiError, ConfigError, ContextError, ConversionError, LearningError, SessionError,
    TransportError,
};
pub use http::{ApiClient, AuthEvent, OfflineTransport, ReqwestTransport, Transport};
pub use inflight::InFlight;
pub use learning_store::{LearningStats, LearningStore, LearningSync};
pub use outcome::Outcome;
pub use session_store::SessionStore;
pub use shell::{HeadlessShell, Shell};
