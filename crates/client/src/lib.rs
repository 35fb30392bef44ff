//! `wholesale-client` — session bootstrap and tenant selection for the
//! wholesale app.
//!
//! Two stores share one backend pair: `SessionStore` owns who is signed in,
//! `TenantStore` owns which tenant is active. `Workspace` wires them together
//! and runs the background tasks that keep them in step.

pub mod config;
pub mod error;
pub mod forms;
pub mod session_store;
pub mod storage;
pub mod tenant_store;
pub mod workspace;

pub use config::{ClientConfig, StorageConfig};
pub use error::{ClientError, ONBOARDING_FAILED_MESSAGE};
pub use forms::{CreateTenantForm, FormErrors, LoginForm, LoginRequest, OnboardingRequest};
pub use session_store::{SessionHandle, SessionPhase, SessionSnapshot, SessionStore};
pub use storage::{InMemoryLocalStore, LocalStore, PersistedKey, SqliteLocalStore};
pub use tenant_store::{LoadOutcome, TenantSnapshot, TenantStore};
pub use workspace::{Workspace, WorkspaceTasks};
