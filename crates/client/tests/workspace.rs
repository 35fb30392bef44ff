//! End-to-end flows through `Workspace` against the in-memory backend.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, oneshot};

use wholesale_auth::{Credentials, Role};
use wholesale_client::{
    ClientError, CreateTenantForm, InMemoryLocalStore, LoadOutcome, LocalStore, PersistedKey,
    Workspace,
};
use wholesale_core::TenantId;
use wholesale_infra::backend::in_memory::{
    DEMO_EMAIL, DEMO_PASSWORD, DEMO_PRINCIPAL, FRUIT_WHOLESALERS, GLOBAL_PRODUCE, MANGO_EXPRESS,
};
use wholesale_infra::{BackendError, InMemoryBackend, TenantBackend, TenantScope};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

fn workspace(backend: &Arc<InMemoryBackend>, storage: &Arc<InMemoryLocalStore>) -> Workspace {
    Workspace::new(backend.clone(), backend.clone(), storage.clone())
}

fn ids(tenants: &[Tenant]) -> Vec<TenantId> {
    tenants.iter().map(|t| t.id).collect()
}

/// No principal, no active tenant.
fn assert_consistent(ws: &Workspace) {
    if ws.session().principal().is_none() {
        assert_eq!(ws.tenants().active_tenant(), None);
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Tenant backend whose first listing blocks until released.
struct GatedTenants {
    inner: Arc<InMemoryBackend>,
    entered: Notify,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl TenantBackend for GatedTenants {
    async fn list_tenants(&self, scope: &TenantScope) -> Result<Vec<Tenant>, BackendError> {
        let gate = self.release.lock().await.take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _ = gate.await;
        }
        self.inner.list_tenants(scope).await
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, BackendError> {
        self.inner.get_tenant(id).await
    }

    async fn insert_tenant(&self, draft: &TenantDraft) -> Result<Tenant, BackendError> {
        self.inner.insert_tenant(draft).await
    }

    async fn patch_tenant(&self, id: TenantId, patch: &TenantPatch) -> Result<Tenant, BackendError> {
        self.inner.patch_tenant(id, patch).await
    }
}

/// Local store whose first active-tenant write blocks until released.
struct GatedStorage {
    inner: InMemoryLocalStore,
    entered: Notify,
    release: Mutex<Option<oneshot::Receiver<()>>>,
}

#[async_trait]
impl LocalStore for GatedStorage {
    async fn get(&self, key: PersistedKey) -> anyhow::Result<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: PersistedKey, value: String) -> anyhow::Result<()> {
        if key == PersistedKey::ActiveTenant {
            let gate = self.release.lock().await.take();
            if let Some(gate) = gate {
                self.entered.notify_one();
                let _ = gate.await;
            }
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, keys: &[PersistedKey]) -> anyhow::Result<()> {
        self.inner.remove(keys).await
    }
}

#[tokio::test]
async fn demo_login_activates_own_tenant() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);

    let boot = ws.boot().await;
    assert!(!boot.is_authenticated());
    assert!(ws.is_ready());
    assert_consistent(&ws);

    let principal = ws.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    assert_eq!(principal.role, Role::Admin);

    let snapshot = ws.tenants().snapshot();
    assert_eq!(ids(&snapshot.tenants), vec![MANGO_EXPRESS, FRUIT_WHOLESALERS, GLOBAL_PRODUCE]);
    assert_eq!(snapshot.active.map(|t| t.name), Some("Mango Express".to_string()));
    assert!(ws.is_ready());
    assert!(storage.contains(PersistedKey::SessionToken));
    assert!(storage.contains(PersistedKey::ActiveTenant));
}

#[tokio::test]
async fn restart_restores_session_and_active_tenant() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());

    let first = workspace(&backend, &storage);
    first.boot().await;
    first.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    first.switch_tenant(FRUIT_WHOLESALERS).await.unwrap();
    drop(first);

    let second = workspace(&backend, &storage);
    let boot = second.boot().await;
    assert!(boot.is_authenticated());
    assert_eq!(boot.principal.map(|p| p.id), Some(DEMO_PRINCIPAL));
    assert_eq!(
        second.tenants().active_tenant().map(|t| t.id),
        Some(FRUIT_WHOLESALERS)
    );
    assert_eq!(second.tenants().tenants().len(), 3);
    assert!(second.is_ready());
}

#[tokio::test]
async fn restart_after_revocation_starts_signed_out() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());

    let first = workspace(&backend, &storage);
    first.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    drop(first);
    backend.revoke_sessions_of(DEMO_PRINCIPAL);

    let second = workspace(&backend, &storage);
    let boot = second.boot().await;
    assert!(!boot.is_authenticated());
    assert!(second.tenants().snapshot().tenants.is_empty());
    assert_consistent(&second);
    assert!(!storage.contains(PersistedKey::SessionToken));
    assert!(!storage.contains(PersistedKey::ActiveTenant));
}

#[tokio::test]
async fn logout_clears_both_stores_and_storage() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);

    ws.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    assert_eq!(backend.session_count(), 1);

    ws.logout().await;
    assert!(!ws.session().is_authenticated());
    assert_eq!(ws.tenants().snapshot(), Default::default());
    assert!(storage.is_empty());
    assert_eq!(backend.session_count(), 0);
    assert_consistent(&ws);

    // A second logout is a no-op.
    ws.logout().await;
    assert!(storage.is_empty());
}

#[tokio::test]
async fn switching_is_limited_to_visible_tenants() {
    let backend = Arc::new(InMemoryBackend::seeded());
    backend.add_user("grace@produce.test", "secret1", "Grace", Role::Staff, GLOBAL_PRODUCE);
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);

    ws.login("grace@produce.test", "secret1", None).await.unwrap();
    assert_eq!(ids(&ws.tenants().tenants()), vec![GLOBAL_PRODUCE]);

    let err = ws.switch_tenant(MANGO_EXPRESS).await.unwrap_err();
    assert_eq!(err, ClientError::UnknownTenant);
    assert_eq!(ws.tenants().active_tenant().map(|t| t.id), Some(GLOBAL_PRODUCE));

    let tenant = ws.switch_tenant(GLOBAL_PRODUCE).await.unwrap();
    assert_eq!(tenant.name, "Global Produce");
}

#[tokio::test]
async fn onboarding_creates_tenant_and_signs_owner_in() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);
    ws.boot().await;

    let form = CreateTenantForm {
        name: "Acme Fruits".into(),
        email: "owner@acme.test".into(),
        password: "secret12".into(),
        owner_name: String::new(),
        primary_color: None,
    };
    let principal = ws.onboard(&form).await.unwrap();
    assert_eq!(principal.email, "owner@acme.test");
    assert_eq!(principal.name, "owner");

    let active = ws.tenants().active_tenant().unwrap();
    assert_eq!(active.name, "Acme Fruits");
    assert_eq!(active.id, principal.tenant_id);
    assert!(active.primary_color.is_some());
    assert!(ws.tenants().tenants().iter().any(|t| t.id == MANGO_EXPRESS));
}

#[tokio::test]
async fn onboarding_reports_form_and_backend_errors() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);

    let mut form = CreateTenantForm {
        name: "X".into(),
        email: "owner@acme.test".into(),
        password: "secret12".into(),
        ..Default::default()
    };
    let err = ws.onboard(&form).await.unwrap_err();
    assert_eq!(
        err.user_message(),
        "Tenant name must be at least 2 characters"
    );

    form.name = "Demo Copy".into();
    form.email = DEMO_EMAIL.into();
    let err = ws.onboard(&form).await.unwrap_err();
    assert_eq!(err, ClientError::EmailTaken);
    assert!(!ws.session().is_authenticated());
    assert_consistent(&ws);
}

#[tokio::test]
async fn stale_tenant_load_never_overwrites_newer_session() {
    let backend = Arc::new(InMemoryBackend::seeded());
    backend.add_user("grace@produce.test", "secret1", "Grace", Role::Staff, GLOBAL_PRODUCE);
    let (release, gate) = oneshot::channel();
    let gated = Arc::new(GatedTenants {
        inner: backend.clone(),
        entered: Notify::new(),
        release: Mutex::new(Some(gate)),
    });
    let ws = Workspace::new(backend.clone(), gated.clone(), Arc::new(InMemoryLocalStore::new()));

    ws.session().login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    let store = ws.tenants().clone();
    let stale = tokio::spawn(async move { store.load_tenants().await });
    gated.entered.notified().await;
    assert!(ws.tenants().is_loading());

    ws.login("grace@produce.test", "secret1", None).await.unwrap();
    release.send(()).unwrap();

    assert_eq!(stale.await.unwrap().unwrap(), LoadOutcome::Discarded);
    let snapshot = ws.tenants().snapshot();
    assert_eq!(ids(&snapshot.tenants), vec![GLOBAL_PRODUCE]);
    assert_eq!(snapshot.active.map(|t| t.id), Some(GLOBAL_PRODUCE));
    assert!(!snapshot.loading);
}

#[tokio::test]
async fn remote_sign_out_clears_tenants() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);
    let tasks = ws.start();

    ws.boot().await;
    ws.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    wait_until(|| ws.tenants().active_tenant().is_some()).await;

    backend.revoke_sessions_of(DEMO_PRINCIPAL);
    wait_until(|| !ws.session().is_authenticated() && ws.tenants().active_tenant().is_none()).await;
    assert!(ws.tenants().tenants().is_empty());
    assert!(!storage.contains(PersistedKey::SessionToken));

    tasks.shutdown();
}

#[tokio::test]
async fn sign_in_elsewhere_loads_tenants() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);
    let _tasks = ws.start();
    ws.boot().await;

    let credentials = Credentials::new(DEMO_EMAIL, DEMO_PASSWORD).unwrap();
    backend.sign_in_elsewhere(&credentials).await.unwrap();

    wait_until(|| ws.tenants().active_tenant().map(|t| t.id) == Some(MANGO_EXPRESS)).await;
    assert_eq!(ws.session().principal().map(|p| p.id), Some(DEMO_PRINCIPAL));
    assert!(storage.contains(PersistedKey::SessionToken));
}

#[tokio::test]
async fn logout_in_flight_never_shows_an_orphaned_tenant() {
    let backend = Arc::new(InMemoryBackend::seeded().with_latency(Duration::from_millis(50)));
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = Arc::new(workspace(&backend, &storage));
    ws.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
    assert!(ws.tenants().active_tenant().is_some());

    let logout = tokio::spawn({
        let ws = ws.clone();
        async move { ws.logout().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(ws.session().principal().is_none());
    assert_consistent(&ws);
    assert!(ws.tenants().tenants().is_empty());

    logout.await.unwrap();
    assert!(storage.is_empty());
}

#[tokio::test]
async fn active_tenant_write_racing_logout_is_removed() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let (release, gate) = oneshot::channel();
    let storage = Arc::new(GatedStorage {
        inner: InMemoryLocalStore::new(),
        entered: Notify::new(),
        release: Mutex::new(Some(gate)),
    });
    let ws = Arc::new(Workspace::new(backend.clone(), backend.clone(), storage.clone()));

    let login = tokio::spawn({
        let ws = ws.clone();
        async move { ws.login(DEMO_EMAIL, DEMO_PASSWORD, None).await }
    });
    storage.entered.notified().await;

    let logout = tokio::spawn({
        let ws = ws.clone();
        async move { ws.logout().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!ws.session().is_authenticated());
    assert_consistent(&ws);

    release.send(()).unwrap();
    login.await.unwrap().unwrap();
    logout.await.unwrap();

    assert!(storage.inner.is_empty());
    assert_eq!(ws.tenants().active_tenant(), None);
}

#[tokio::test]
async fn failed_onboarding_leaves_nothing_to_select() {
    let backend = Arc::new(InMemoryBackend::seeded());
    let storage = Arc::new(InMemoryLocalStore::new());
    let ws = workspace(&backend, &storage);
    ws.boot().await;

    let form = CreateTenantForm {
        name: "Demo Copy".into(),
        email: DEMO_EMAIL.into(),
        password: "secret12".into(),
        ..Default::default()
    };
    assert_eq!(ws.onboard(&form).await, Err(ClientError::EmailTaken));
    assert!(ws.tenants().tenants().is_empty());

    let orphan = ws
        .tenants()
        .login_choices()
        .await
        .unwrap()
        .into_iter()
        .find(|t| t.name == "Demo Copy")
        .unwrap();
    assert_eq!(ws.switch_tenant(orphan.id).await, Err(ClientError::UnknownTenant));
    assert_consistent(&ws);
    assert!(!storage.contains(PersistedKey::ActiveTenant));
}
