//! Wiring of the session and tenant stores for one process.
//!
//! Built once at start-up and shared by reference. The session store never
//! calls into the tenant store; everything that has to happen to tenants
//! because the session changed goes through here or through the reactor
//! task started by `start`.

use std::sync::Arc;

use tokio::task::JoinHandle;

use wholesale_auth::Principal;
use wholesale_core::TenantId;
use wholesale_infra::{AuthBackend, Backends, TenantBackend};
use wholesale_tenants::Tenant;

use crate::error::ClientError;
use crate::forms::CreateTenantForm;
use crate::session_store::{SessionSnapshot, SessionStore};
use crate::storage::LocalStore;
use crate::tenant_store::{LoadOutcome, TenantStore};

pub struct Workspace {
    auth: Arc<dyn AuthBackend>,
    session: Arc<SessionStore>,
    tenants: Arc<TenantStore>,
}

impl Workspace {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        tenant_backend: Arc<dyn TenantBackend>,
        storage: Arc<dyn LocalStore>,
    ) -> Self {
        let session = Arc::new(SessionStore::new(
            auth.clone(),
            tenant_backend.clone(),
            storage.clone(),
        ));
        let tenants = Arc::new(TenantStore::new(tenant_backend, storage, session.handle()));
        Self {
            auth,
            session,
            tenants,
        }
    }

    pub fn from_backends(backends: Backends, storage: Arc<dyn LocalStore>) -> Self {
        Self::new(backends.auth, backends.tenants, storage)
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn tenants(&self) -> &Arc<TenantStore> {
        &self.tenants
    }

    /// Recover the persisted session and, if it is still valid, the active
    /// tenant and tenant list. Tenant load failures are logged; the store
    /// keeps whatever was restored.
    pub async fn boot(&self) -> SessionSnapshot {
        let session = self.session.recover_session().await;
        if session.is_authenticated() {
            self.tenants.restore().await;
            self.sync_tenants().await;
        }
        session
    }

    /// Sign in, then load the tenants of the new principal. If the reactor
    /// already started that load, returns without waiting for it.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        tenant_hint: Option<TenantId>,
    ) -> Result<Principal, ClientError> {
        let principal = self.session.login(email, password, tenant_hint).await?;
        self.sync_tenants().await;
        Ok(principal)
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
        tenant_id: TenantId,
    ) -> Result<Principal, ClientError> {
        self.session.signup(email, password, name, tenant_id).await
    }

    /// Create a tenant and its owner account, then sign the owner in to it.
    pub async fn onboard(&self, form: &CreateTenantForm) -> Result<Principal, ClientError> {
        let request = form.validate()?;

        let tenant = self.tenants.create_tenant(request.draft).await?;
        let email = request.credentials.email().to_string();
        let password = request.credentials.password().to_string();
        self.session
            .signup(&email, &password, &request.owner_name, tenant.id)
            .await?;
        self.login(&email, &password, Some(tenant.id)).await
    }

    pub async fn switch_tenant(&self, id: TenantId) -> Result<Tenant, ClientError> {
        self.tenants.select_tenant(id).await
    }

    /// Forget every tenant, then sign out. Both happen before the first
    /// await, so no observer sees a principal-less active tenant.
    pub async fn logout(&self) {
        self.tenants.clear();
        self.session.logout().await;
    }

    /// Both stores have settled; the UI may render the workspace.
    pub fn is_ready(&self) -> bool {
        !self.session.is_loading() && !self.tenants.is_loading()
    }

    /// Start the background tasks: the backend event pump and the
    /// session-to-tenant reactor. Dropping the returned handle stops both.
    pub fn start(&self) -> WorkspaceTasks {
        let mut events = self.auth.subscribe();
        let session = self.session.clone();
        let pump = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                tracing::debug!(?event, "session event received");
                session.apply_event(event).await;
            }
            tracing::debug!("session event stream ended");
        });

        let mut handle = self.session.handle();
        let tenants = self.tenants.clone();
        let reactor = tokio::spawn(async move {
            while handle.changed().await {
                match tenants.sync_with_session().await {
                    Ok(Some(outcome)) => tracing::debug!(?outcome, "tenants synced with session"),
                    Ok(None) => {}
                    Err(err) => tracing::warn!(error = %err, "tenant sync failed"),
                }
            }
        });

        WorkspaceTasks { pump, reactor }
    }

    async fn sync_tenants(&self) -> Option<LoadOutcome> {
        match self.tenants.sync_with_session().await {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::warn!(error = %err, "tenant load after session change failed");
                None
            }
        }
    }
}

/// Handles of the tasks started by `Workspace::start`.
#[derive(Debug)]
pub struct WorkspaceTasks {
    pump: JoinHandle<()>,
    reactor: JoinHandle<()>,
}

impl WorkspaceTasks {
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for WorkspaceTasks {
    fn drop(&mut self) {
        self.pump.abort();
        self.reactor.abort();
    }
}
