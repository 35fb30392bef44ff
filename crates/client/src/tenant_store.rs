//! Tenant store: the tenants visible to the current principal and the single
//! active one.
//!
//! The store reads the session through a `SessionHandle` and never changes
//! it. Every load captures the session epoch before calling the backend and
//! drops its result if the epoch moved in the meantime, so a slow fetch for
//! one principal can never overwrite the tenants of the next.
//!
//! Nothing is visible while signed out, even before `clear` has run: the
//! accessors check the session first.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use wholesale_auth::Principal;
use wholesale_core::{TenantId, entity};
use wholesale_infra::{BackendError, TenantBackend, TenantScope};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

use crate::error::ClientError;
use crate::session_store::SessionHandle;
use crate::storage::{self, LocalStore, PersistedKey};

/// How a `load_tenants` call settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    Loaded,
    /// The principal sees no tenants. Not an error; flagged as a configuration gap.
    NoTenants,
    /// The session changed while the fetch was in flight; nothing was applied.
    Discarded,
    /// Nobody is signed in; the store was cleared.
    SignedOut,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TenantSnapshot {
    pub tenants: Vec<Tenant>,
    pub active: Option<Tenant>,
    pub configuration_gap: bool,
    pub loading: bool,
}

#[derive(Debug, Default)]
struct State {
    tenants: Vec<Tenant>,
    active: Option<Tenant>,
    configuration_gap: bool,
    in_flight: usize,
    // Epoch of the last settled load, and of the one currently running.
    loaded_epoch: Option<u64>,
    loading_epoch: Option<u64>,
}

pub struct TenantStore {
    backend: Arc<dyn TenantBackend>,
    storage: Arc<dyn LocalStore>,
    session: SessionHandle,
    state: RwLock<State>,
}

impl TenantStore {
    pub fn new(
        backend: Arc<dyn TenantBackend>,
        storage: Arc<dyn LocalStore>,
        session: SessionHandle,
    ) -> Self {
        Self {
            backend,
            storage,
            session,
            state: RwLock::new(State::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn active_tenant(&self) -> Option<Tenant> {
        if !self.session.is_authenticated() {
            return None;
        }
        self.read().active.clone()
    }

    pub fn tenants(&self) -> Vec<Tenant> {
        if !self.session.is_authenticated() {
            return Vec::new();
        }
        self.read().tenants.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().in_flight > 0
    }

    /// Signed in, but no tenant is visible to the principal.
    pub fn has_configuration_gap(&self) -> bool {
        self.session.is_authenticated() && self.read().configuration_gap
    }

    pub fn snapshot(&self) -> TenantSnapshot {
        let signed_in = self.session.is_authenticated();
        let state = self.read();
        if !signed_in {
            return TenantSnapshot {
                loading: state.in_flight > 0,
                ..TenantSnapshot::default()
            };
        }
        TenantSnapshot {
            tenants: state.tenants.clone(),
            active: state.active.clone(),
            configuration_gap: state.configuration_gap,
            loading: state.in_flight > 0,
        }
    }

    /// Fetch the tenants visible to the current principal and settle the
    /// active one.
    pub async fn load_tenants(&self) -> Result<LoadOutcome, ClientError> {
        let session = self.session.snapshot();
        let Some(principal) = session.principal else {
            self.clear();
            return Ok(LoadOutcome::SignedOut);
        };
        let epoch = session.epoch;
        let scope = TenantScope::for_principal(&principal);

        {
            let mut state = self.write();
            state.in_flight += 1;
            state.loading_epoch = Some(epoch);
        }
        let fetched = self.backend.list_tenants(&scope).await;

        let (outcome, active_changed, active) = {
            let mut state = self.write();
            state.in_flight -= 1;
            if state.loading_epoch == Some(epoch) {
                state.loading_epoch = None;
            }

            if self.session.epoch() != epoch {
                tracing::debug!(epoch, current = self.session.epoch(), "discarding stale tenant load");
                return Ok(LoadOutcome::Discarded);
            }

            let tenants = match fetched {
                Ok(tenants) => tenants,
                Err(err) => {
                    tracing::warn!(principal = %principal.id, error = %err, "tenant load failed; keeping previous tenants");
                    return Err(err.into());
                }
            };

            state.loaded_epoch = Some(epoch);
            let previous = state.active.clone();
            let outcome = if tenants.is_empty() {
                tracing::warn!(principal = %principal.id, ?scope, "principal has no visible tenants");
                state.tenants.clear();
                state.active = None;
                state.configuration_gap = true;
                LoadOutcome::NoTenants
            } else {
                state.active = pick_active(previous.as_ref(), &principal, &tenants);
                state.tenants = tenants;
                state.configuration_gap = false;
                LoadOutcome::Loaded
            };
            tracing::info!(
                principal = %principal.id,
                tenants = state.tenants.len(),
                active = ?state.active.as_ref().map(|t| t.id),
                "tenants loaded"
            );
            (outcome, state.active != previous, state.active.clone())
        };

        if active_changed {
            self.persist_active(epoch, active.as_ref()).await;
        }
        Ok(outcome)
    }

    /// Make a visible tenant the active one.
    pub async fn select_tenant(&self, id: TenantId) -> Result<Tenant, ClientError> {
        let session = self.session.snapshot();
        if !session.is_authenticated() {
            return Err(ClientError::UnknownTenant);
        }
        let tenant = {
            let mut state = self.write();
            let Some(tenant) = entity::find_by_id(&state.tenants, id).cloned() else {
                return Err(ClientError::UnknownTenant);
            };
            state.active = Some(tenant.clone());
            tenant
        };
        tracing::info!(tenant = %tenant.id, name = %tenant.name, "active tenant selected");
        self.persist_active(session.epoch, Some(&tenant)).await;
        Ok(tenant)
    }

    /// Create a tenant. When signed in it joins the visible set; it is
    /// never selected. While signed out the next load picks it up.
    pub async fn create_tenant(&self, draft: TenantDraft) -> Result<Tenant, ClientError> {
        draft.validate()?;
        let epoch = self.session.epoch();
        let tenant = self.backend.insert_tenant(&draft).await?;
        if self.session.is_authenticated() && self.session.epoch() == epoch {
            let mut state = self.write();
            if entity::find_by_id(&state.tenants, tenant.id).is_none() {
                state.tenants.push(tenant.clone());
            }
            state.configuration_gap = false;
        }
        tracing::info!(tenant = %tenant.id, name = %tenant.name, "tenant created");
        Ok(tenant)
    }

    /// Patch a visible tenant, keeping the active copy in step.
    pub async fn update_tenant(&self, id: TenantId, patch: TenantPatch) -> Result<Tenant, ClientError> {
        patch.validate()?;
        let epoch = self.session.epoch();
        if entity::find_by_id(&self.tenants(), id).is_none() {
            return Err(ClientError::UnknownTenant);
        }

        let updated = self
            .backend
            .patch_tenant(id, &patch)
            .await
            .map_err(|err| match err {
                BackendError::NotFound => ClientError::UnknownTenant,
                other => other.into(),
            })?;

        if self.session.epoch() != epoch {
            return Ok(updated);
        }
        let active_changed = {
            let mut state = self.write();
            if let Some(index) = entity::position_of(&state.tenants, id) {
                state.tenants[index] = updated.clone();
            }
            match state.active.as_mut() {
                Some(active) if active.id == id => {
                    *active = updated.clone();
                    true
                }
                _ => false,
            }
        };
        if active_changed {
            self.persist_active(epoch, Some(&updated)).await;
        }
        tracing::info!(tenant = %id, "tenant updated");
        Ok(updated)
    }

    /// Adopt the persisted active tenant. Boot only, and only when signed in;
    /// the next load drops it if it is no longer visible.
    pub async fn restore(&self) -> Option<Tenant> {
        if !self.session.is_authenticated() {
            return None;
        }
        let tenant: Tenant =
            storage::read_json(self.storage.as_ref(), PersistedKey::ActiveTenant).await?;
        tracing::debug!(tenant = %tenant.id, "restored active tenant");
        self.write().active = Some(tenant.clone());
        Some(tenant)
    }

    /// Bring the store in line with the session. `None` when nothing needed doing.
    pub async fn sync_with_session(&self) -> Result<Option<LoadOutcome>, ClientError> {
        let session = self.session.snapshot();
        if session.is_loading() {
            return Ok(None);
        }
        if !session.is_authenticated() {
            let had_state = {
                let state = self.read();
                !state.tenants.is_empty() || state.active.is_some()
            };
            self.clear();
            return Ok(had_state.then_some(LoadOutcome::SignedOut));
        }
        {
            let state = self.read();
            if state.loaded_epoch == Some(session.epoch) || state.loading_epoch == Some(session.epoch) {
                return Ok(None);
            }
        }
        self.load_tenants().await.map(Some)
    }

    /// Forget every tenant. Persisted keys belong to logout.
    pub fn clear(&self) {
        let mut state = self.write();
        state.tenants.clear();
        state.active = None;
        state.configuration_gap = false;
        state.loaded_epoch = None;
    }

    /// Every tenant on the backend, for the sign-in picker. Leaves the store
    /// untouched.
    pub async fn login_choices(&self) -> Result<Vec<Tenant>, ClientError> {
        Ok(self.backend.list_tenants(&TenantScope::All).await?)
    }

    /// Write the active tenant, unless the session moved on since `epoch`.
    /// The check runs under the session's persist lock, so a logout either
    /// sees this write and removes it, or this write sees the logout.
    async fn persist_active(&self, epoch: u64, tenant: Option<&Tenant>) {
        let _guard = self.session.lock_persist().await;
        if self.session.epoch() != epoch || !self.session.is_authenticated() {
            tracing::debug!(epoch, "session changed; not persisting active tenant");
            return;
        }
        let storage = self.storage.as_ref();
        match tenant {
            Some(tenant) => storage::write_json(storage, PersistedKey::ActiveTenant, tenant).await,
            None => storage::remove_keys(storage, &[PersistedKey::ActiveTenant]).await,
        }
    }
}

/// Default selection after a load: keep a still-visible active tenant
/// (refreshed), else the principal's own tenant, else the first one.
fn pick_active(current: Option<&Tenant>, principal: &Principal, tenants: &[Tenant]) -> Option<Tenant> {
    current
        .and_then(|active| entity::find_by_id(tenants, active.id))
        .or_else(|| entity::find_by_id(tenants, principal.tenant_id))
        .or_else(|| tenants.first())
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wholesale_auth::Role;
    use wholesale_core::PrincipalId;
    use wholesale_infra::InMemoryBackend;
    use wholesale_infra::backend::in_memory::{
        DEMO_EMAIL, DEMO_PASSWORD, FRUIT_WHOLESALERS, GLOBAL_PRODUCE, MANGO_EXPRESS,
    };

    use crate::session_store::SessionStore;
    use crate::storage::InMemoryLocalStore;

    struct Fixture {
        backend: Arc<InMemoryBackend>,
        storage: Arc<InMemoryLocalStore>,
        session: SessionStore,
        tenants: TenantStore,
    }

    fn fixture() -> Fixture {
        let backend = Arc::new(InMemoryBackend::seeded());
        let storage = Arc::new(InMemoryLocalStore::new());
        let session = SessionStore::new(backend.clone(), backend.clone(), storage.clone());
        let tenants = TenantStore::new(backend.clone(), storage.clone(), session.handle());
        Fixture {
            backend,
            storage,
            session,
            tenants,
        }
    }

    fn tenant(id: u128, name: &str) -> Tenant {
        TenantDraft::new(name).unwrap().into_tenant(TenantId::from_u128(id))
    }

    #[test]
    fn default_selection_order() {
        let principal = Principal::owner(PrincipalId::from_u128(1), "a@b.co", "A", TenantId::from_u128(2));
        let list = vec![tenant(1, "One"), tenant(2, "Two"), tenant(3, "Three")];

        // Still-visible active tenant wins, refreshed from the new list.
        let stale = Tenant {
            name: "Old Name".into(),
            ..tenant(3, "Three")
        };
        assert_eq!(pick_active(Some(&stale), &principal, &list), Some(list[2].clone()));

        // Otherwise the principal's own tenant.
        let gone = tenant(9, "Gone");
        assert_eq!(pick_active(Some(&gone), &principal, &list), Some(list[1].clone()));

        // Otherwise the first.
        let outsider = Principal::owner(PrincipalId::from_u128(1), "a@b.co", "A", TenantId::from_u128(7));
        assert_eq!(pick_active(None, &outsider, &list), Some(list[0].clone()));
        assert_eq!(pick_active(None, &outsider, &[]), None);
    }

    #[tokio::test]
    async fn admin_sees_all_tenants_and_owning_tenant_is_active() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();

        assert_eq!(f.tenants.load_tenants().await, Ok(LoadOutcome::Loaded));
        assert_eq!(f.tenants.tenants().len(), 3);
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(MANGO_EXPRESS));
        assert!(f.storage.contains(PersistedKey::ActiveTenant));
        assert!(!f.tenants.is_loading());
    }

    #[tokio::test]
    async fn staff_sees_only_their_tenant() {
        let f = fixture();
        f.backend.add_user("sam@example.com", "secret1", "Sam", Role::Staff, GLOBAL_PRODUCE);
        f.session.login("sam@example.com", "secret1", None).await.unwrap();

        f.tenants.load_tenants().await.unwrap();
        let ids: Vec<_> = f.tenants.tenants().iter().map(|t| t.id).collect();
        assert_eq!(ids, [GLOBAL_PRODUCE]);
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(GLOBAL_PRODUCE));
    }

    #[tokio::test]
    async fn selection_is_stable_across_reloads() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();

        f.tenants.select_tenant(FRUIT_WHOLESALERS).await.unwrap();
        f.tenants.load_tenants().await.unwrap();
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(FRUIT_WHOLESALERS));
    }

    #[tokio::test]
    async fn selecting_an_invisible_tenant_fails_and_keeps_active() {
        let f = fixture();
        f.backend.add_user("sam@example.com", "secret1", "Sam", Role::Manager, GLOBAL_PRODUCE);
        f.session.login("sam@example.com", "secret1", None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();

        assert_eq!(
            f.tenants.select_tenant(MANGO_EXPRESS).await,
            Err(ClientError::UnknownTenant)
        );
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(GLOBAL_PRODUCE));
    }

    #[tokio::test]
    async fn no_visible_tenants_is_a_configuration_gap() {
        let f = fixture();
        let orphan = TenantId::from_u128(77);
        f.backend.add_user("lost@example.com", "secret1", "Lost", Role::Staff, orphan);
        f.session.login("lost@example.com", "secret1", None).await.unwrap();

        assert_eq!(f.tenants.load_tenants().await, Ok(LoadOutcome::NoTenants));
        assert!(f.tenants.has_configuration_gap());
        assert_eq!(f.tenants.active_tenant(), None);
        assert!(f.tenants.tenants().is_empty());
    }

    #[tokio::test]
    async fn outage_leaves_previous_state_untouched() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();
        let before = f.tenants.snapshot();

        f.backend.set_unavailable(true);
        let err = f.tenants.load_tenants().await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(f.tenants.snapshot(), before);
    }

    #[tokio::test]
    async fn load_without_session_clears() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();
        f.session.logout().await;

        assert_eq!(f.tenants.load_tenants().await, Ok(LoadOutcome::SignedOut));
        assert!(f.tenants.tenants().is_empty());
        assert_eq!(f.tenants.active_tenant(), None);
    }

    #[tokio::test]
    async fn nothing_is_visible_once_signed_out() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();

        // Before anyone calls `clear`.
        f.session.logout().await;
        assert_eq!(f.tenants.active_tenant(), None);
        assert!(f.tenants.tenants().is_empty());
        assert_eq!(f.tenants.snapshot(), TenantSnapshot::default());
    }

    #[tokio::test]
    async fn selecting_while_signed_out_fails() {
        let f = fixture();
        f.session.recover_session().await;
        assert_eq!(
            f.tenants.select_tenant(MANGO_EXPRESS).await,
            Err(ClientError::UnknownTenant)
        );
        assert!(f.storage.is_empty());
    }

    #[tokio::test]
    async fn tenants_created_while_signed_out_wait_for_the_next_load() {
        let f = fixture();
        f.session.recover_session().await;
        let created = f
            .tenants
            .create_tenant(TenantDraft::new("Acme Fruits Inc.").unwrap())
            .await
            .unwrap();
        assert!(f.tenants.tenants().is_empty());
        assert_eq!(
            f.tenants.select_tenant(created.id).await,
            Err(ClientError::UnknownTenant)
        );

        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();
        assert!(f.tenants.tenants().contains(&created));
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(MANGO_EXPRESS));
    }

    #[tokio::test]
    async fn created_tenants_join_the_visible_set_without_activation() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();

        let created = f
            .tenants
            .create_tenant(TenantDraft::new("Acme Fruits Inc.").unwrap())
            .await
            .unwrap();
        assert_eq!(
            created.logo.as_deref(),
            Some("https://api.dicebear.com/7.x/initials/svg?seed=Ac")
        );
        assert_eq!(f.tenants.tenants().last(), Some(&created));
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(MANGO_EXPRESS));
        assert!(!f.session.snapshot().principal.is_some_and(|p| p.tenant_id == created.id));
    }

    #[tokio::test]
    async fn short_tenant_names_are_rejected_before_the_backend() {
        let f = fixture();
        let draft = TenantDraft {
            name: "A".into(),
            logo: None,
            primary_color: None,
        };
        let err = f.tenants.create_tenant(draft).await.unwrap_err();
        assert_eq!(err.user_message(), "Tenant name must be at least 2 characters");
        assert_eq!(f.backend.list_tenants(&TenantScope::All).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn updating_the_active_tenant_refreshes_it() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();

        let updated = f
            .tenants
            .update_tenant(MANGO_EXPRESS, TenantPatch::rename("Mango Express Ltd").unwrap())
            .await
            .unwrap();
        assert_eq!(updated.name, "Mango Express Ltd");
        assert_eq!(f.tenants.active_tenant(), Some(updated.clone()));
        assert!(f.tenants.tenants().contains(&updated));

        let persisted: Option<Tenant> =
            storage::read_json(f.storage.as_ref(), PersistedKey::ActiveTenant).await;
        assert_eq!(persisted, Some(updated));
    }

    #[tokio::test]
    async fn updating_an_invisible_tenant_fails() {
        let f = fixture();
        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        f.tenants.load_tenants().await.unwrap();
        assert_eq!(
            f.tenants
                .update_tenant(TenantId::from_u128(404), TenantPatch::rename("Nope").unwrap())
                .await,
            Err(ClientError::UnknownTenant)
        );
    }

    #[tokio::test]
    async fn restore_only_applies_when_signed_in() {
        let f = fixture();
        let saved = tenant(2, "Fruit Wholesalers Inc.");
        storage::write_json(f.storage.as_ref(), PersistedKey::ActiveTenant, &saved).await;

        assert_eq!(f.tenants.restore().await, None);

        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        assert_eq!(f.tenants.restore().await, Some(saved));
        f.tenants.load_tenants().await.unwrap();
        assert_eq!(f.tenants.active_tenant().map(|t| t.id), Some(FRUIT_WHOLESALERS));
    }

    #[tokio::test]
    async fn sync_loads_once_per_epoch_and_clears_on_sign_out() {
        let f = fixture();
        f.session.recover_session().await;
        assert_eq!(f.tenants.sync_with_session().await, Ok(None));

        f.session.login(DEMO_EMAIL, DEMO_PASSWORD, None).await.unwrap();
        assert_eq!(f.tenants.sync_with_session().await, Ok(Some(LoadOutcome::Loaded)));
        assert_eq!(f.tenants.sync_with_session().await, Ok(None));

        f.session.logout().await;
        assert_eq!(
            f.tenants.sync_with_session().await,
            Ok(Some(LoadOutcome::SignedOut))
        );
        assert_eq!(f.tenants.active_tenant(), None);
    }

    #[tokio::test]
    async fn login_choices_list_every_tenant() {
        let f = fixture();
        let names: Vec<_> = f
            .tenants
            .login_choices()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, ["Mango Express", "Fruit Wholesalers Inc.", "Global Produce"]);
        assert!(f.tenants.tenants().is_empty());
    }
}
