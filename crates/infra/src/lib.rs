//! Infrastructure layer: backend ports, their implementations, and the
//! wire adapters between backend rows and domain shapes.

pub mod adapters;
pub mod backend;
pub mod config;

pub use backend::{
    AuthBackend, BackendError, HostedBackend, InMemoryBackend, RestBackend, SessionEvent,
    SessionEventBus, SessionEvents, TenantBackend, TenantScope,
};
pub use config::{BackendConfig, Backends, ConfigError, HttpBackendConfig};
