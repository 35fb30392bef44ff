//! Session store: owns the signed-in principal.
//!
//! State is published through a `tokio::sync::watch` channel so other
//! components (the tenant store, the UI) can observe it without being able
//! to change it. Two counters guard against races:
//!
//! - `epoch` (public, in the snapshot) moves whenever the principal changes.
//!   Work started under one epoch must not commit under another.
//! - `attempt` (private) moves whenever a login, recovery, or logout starts.
//!   A login only commits if no newer attempt began while it was in flight.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tokio::sync::{Mutex, MutexGuard, watch};

use wholesale_auth::{Credentials, Identity, Principal, SessionToken};
use wholesale_core::{DomainError, TenantId};
use wholesale_infra::{AuthBackend, BackendError, SessionEvent, TenantBackend};

use crate::error::ClientError;
use crate::storage::{self, LocalStore, PersistedKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Boot has not tried to recover a session yet.
    Unresolved,
    /// A recovery or login is in flight.
    Resolving,
    Authenticated,
    Anonymous,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub principal: Option<Principal>,
    pub epoch: u64,
}

impl SessionSnapshot {
    fn initial() -> Self {
        Self {
            phase: SessionPhase::Unresolved,
            principal: None,
            epoch: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.principal.is_some()
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, SessionPhase::Unresolved | SessionPhase::Resolving)
    }
}

/// Read-only view of the session, handed to other stores.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    receiver: watch::Receiver<SessionSnapshot>,
    persist: Arc<Mutex<()>>,
}

impl SessionHandle {
    pub fn snapshot(&self) -> SessionSnapshot {
        self.receiver.borrow().clone()
    }

    pub fn epoch(&self) -> u64 {
        self.receiver.borrow().epoch
    }

    pub fn principal(&self) -> Option<Principal> {
        self.receiver.borrow().principal.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.receiver.borrow().is_authenticated()
    }

    /// Wait for the next change. `false` once the store is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.changed().await.is_ok()
    }

    /// Lock shared with the session store's own key writes. A writer that
    /// checks the epoch under it cannot land after logout's removal.
    pub(crate) async fn lock_persist(&self) -> MutexGuard<'_, ()> {
        self.persist.lock().await
    }
}

pub struct SessionStore {
    auth: Arc<dyn AuthBackend>,
    tenants: Arc<dyn TenantBackend>,
    storage: Arc<dyn LocalStore>,
    state: watch::Sender<SessionSnapshot>,
    token: RwLock<Option<SessionToken>>,
    attempt: AtomicU64,
    // Orders persisted-key writes against logout's removal.
    persist: Arc<Mutex<()>>,
}

impl SessionStore {
    pub fn new(
        auth: Arc<dyn AuthBackend>,
        tenants: Arc<dyn TenantBackend>,
        storage: Arc<dyn LocalStore>,
    ) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::initial());
        Self {
            auth,
            tenants,
            storage,
            state,
            token: RwLock::new(None),
            attempt: AtomicU64::new(0),
            persist: Arc::new(Mutex::new(())),
        }
    }

    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            receiver: self.state.subscribe(),
            persist: self.persist.clone(),
        }
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    pub fn principal(&self) -> Option<Principal> {
        self.state.borrow().principal.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn is_loading(&self) -> bool {
        self.state.borrow().is_loading()
    }

    /// Resume the persisted session, if any. Runs once at boot.
    ///
    /// Never fails: whatever goes wrong, the store settles `Anonymous`.
    pub async fn recover_session(&self) -> SessionSnapshot {
        let attempt = self.begin();
        let storage = self.storage.as_ref();

        let Some(token) = storage::read_json::<SessionToken>(storage, PersistedKey::SessionToken).await
        else {
            tracing::debug!("no persisted session");
            self.settle_if_current(attempt);
            return self.snapshot();
        };
        let cached = storage::read_json::<Principal>(storage, PersistedKey::CachedPrincipal).await;

        match self.resolve_token(&token, cached.as_ref()).await {
            Ok(Some(principal)) => {
                if self.is_current(attempt) {
                    tracing::info!(principal = %principal.id, tenant = %principal.tenant_id, "session recovered");
                    self.set_token(Some(token));
                    self.commit(Some(principal));
                }
            }
            Ok(None) => {
                if self.is_current(attempt) {
                    let _guard = self.persist.lock().await;
                    storage::remove_keys(storage, &PersistedKey::ALL).await;
                    self.settle_if_current(attempt);
                }
            }
            Err(err) => {
                // Keep the persisted token; the next start may reach the backend.
                tracing::warn!(error = %err, "session recovery failed; continuing signed out");
                self.settle_if_current(attempt);
            }
        }
        self.snapshot()
    }

    /// Sign in with email and password.
    ///
    /// `tenant_hint` picks the profile when the account has several. The
    /// active tenant is left to the tenant store.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        tenant_hint: Option<TenantId>,
    ) -> Result<Principal, ClientError> {
        let credentials = Credentials::new(email, password)?;
        let attempt = self.begin();

        let (token, principal) = match self.authenticate(&credentials, tenant_hint).await {
            Ok(resolved) => resolved,
            Err(err) => {
                tracing::info!(error = %err, "login failed");
                self.settle_if_current(attempt);
                return Err(err);
            }
        };

        {
            let guard = self.persist.lock().await;
            if !self.is_current(attempt) {
                drop(guard);
                tracing::info!(principal = %principal.id, "login superseded; discarding its session");
                self.discard_token(&token).await;
                return Err(ClientError::SessionChanged);
            }
            self.set_token(Some(token.clone()));
            self.commit(Some(principal.clone()));

            let storage = self.storage.as_ref();
            storage::write_json(storage, PersistedKey::SessionToken, &token).await;
            storage::write_json(storage, PersistedKey::CachedPrincipal, &principal).await;
        }

        tracing::info!(principal = %principal.id, tenant = %principal.tenant_id, role = %principal.role, "signed in");
        Ok(principal)
    }

    /// Create an account and its owner profile in `tenant_id`. Does not sign in.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
        tenant_id: TenantId,
    ) -> Result<Principal, ClientError> {
        let credentials = Credentials::new(email, password)?;
        let name = match name.trim() {
            "" => credentials
                .email()
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string(),
            name => name.to_string(),
        };
        if name.is_empty() {
            return Err(DomainError::validation("name", "Name is required").into());
        }

        match self.tenants.get_tenant(tenant_id).await {
            Ok(Some(_)) => {}
            Ok(None) | Err(BackendError::NotFound) => return Err(ClientError::TenantNotFound),
            Err(err) => return Err(err.into()),
        }

        let identity = self
            .auth
            .create_account(&credentials)
            .await
            .map_err(signup_error)?;

        let principal = Principal::owner(identity.id, credentials.email(), &name, tenant_id);
        self.auth
            .create_profile(&principal)
            .await
            .map_err(signup_error)?;

        tracing::info!(principal = %principal.id, tenant = %tenant_id, "account created");
        Ok(principal)
    }

    /// Sign out. Clears local state first, then tells the backend.
    ///
    /// Idempotent and infallible; backend failures are logged.
    pub async fn logout(&self) {
        let token = self.clear_local().await;
        if let Some(token) = token {
            if let Err(err) = self.auth.invalidate_session(&token).await {
                tracing::warn!(error = %err, "failed to invalidate session with backend");
            }
            tracing::info!("signed out");
        }
    }

    /// React to a backend-pushed session event.
    pub async fn apply_event(&self, event: SessionEvent) {
        let current = self.current_token();
        match event {
            SessionEvent::SignedOut(Some(token)) if current.as_ref() != Some(&token) => {
                tracing::debug!("ignoring sign-out for a session that is not current");
            }
            SessionEvent::SignedOut(_) => {
                if current.is_some() || self.is_authenticated() {
                    tracing::info!("session ended by backend");
                    self.clear_local().await;
                }
            }
            SessionEvent::SignedIn(token) if current.as_ref() == Some(&token) => {}
            SessionEvent::SignedIn(token) => {
                self.adopt(token).await;
            }
        }
    }

    /// Take over a session opened elsewhere.
    async fn adopt(&self, token: SessionToken) {
        let attempt = self.begin();
        let hint = self.principal();
        match self.resolve_token(&token, hint.as_ref()).await {
            Ok(Some(principal)) => {
                let _guard = self.persist.lock().await;
                if !self.is_current(attempt) {
                    return;
                }
                tracing::info!(principal = %principal.id, "session adopted from backend event");
                self.set_token(Some(token.clone()));
                self.commit(Some(principal.clone()));
                let storage = self.storage.as_ref();
                storage::write_json(storage, PersistedKey::SessionToken, &token).await;
                storage::write_json(storage, PersistedKey::CachedPrincipal, &principal).await;
            }
            Ok(None) => {
                tracing::debug!("signed-in event did not resolve to a profile");
                self.settle_if_current(attempt);
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to resolve signed-in event");
                self.settle_if_current(attempt);
            }
        }
    }

    async fn authenticate(
        &self,
        credentials: &Credentials,
        tenant_hint: Option<TenantId>,
    ) -> Result<(SessionToken, Principal), ClientError> {
        let token = self
            .auth
            .verify_credentials(credentials)
            .await
            .map_err(login_error)?;

        let resolved = async {
            let identity = self
                .auth
                .get_session(&token)
                .await
                .map_err(login_error)?
                .ok_or(ClientError::InvalidCredentials)?;
            let profiles = self
                .auth
                .profiles(&token, identity.id)
                .await
                .map_err(login_error)?;
            choose_profile(&identity, profiles, tenant_hint)
        }
        .await;

        match resolved {
            Ok(principal) => Ok((token, principal)),
            Err(err) => {
                self.discard_token(&token).await;
                Err(err)
            }
        }
    }

    /// Principal behind `token`. `Ok(None)` means the token is dead or no
    /// single profile can be picked for it.
    async fn resolve_token(
        &self,
        token: &SessionToken,
        cached: Option<&Principal>,
    ) -> Result<Option<Principal>, BackendError> {
        let Some(identity) = self.auth.get_session(token).await? else {
            tracing::info!("persisted session is no longer valid");
            return Ok(None);
        };
        let mut profiles = self.auth.profiles(token, identity.id).await?;

        if profiles.len() <= 1 {
            if profiles.is_empty() {
                tracing::warn!(identity = %identity.id, "session has no profile");
            }
            return Ok(profiles.pop());
        }

        let preferred = cached
            .filter(|c| c.id == identity.id)
            .and_then(|c| profiles.iter().position(|p| p.tenant_id == c.tenant_id));
        match preferred {
            Some(index) => Ok(Some(profiles.swap_remove(index))),
            None => {
                tracing::warn!(
                    identity = %identity.id,
                    profiles = profiles.len(),
                    "session matches several profiles and none was cached"
                );
                Ok(None)
            }
        }
    }

    /// Drop the local session. Returns the token that was current.
    async fn clear_local(&self) -> Option<SessionToken> {
        self.begin();
        let token = self.take_token();
        self.commit(None);
        let _guard = self.persist.lock().await;
        storage::remove_keys(self.storage.as_ref(), &PersistedKey::ALL).await;
        token
    }

    async fn discard_token(&self, token: &SessionToken) {
        if let Err(err) = self.auth.invalidate_session(token).await {
            tracing::warn!(error = %err, "failed to invalidate discarded session");
        }
    }

    /// Start a new attempt; marks the store as resolving.
    fn begin(&self) -> u64 {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.send_modify(|s| s.phase = SessionPhase::Resolving);
        attempt
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.attempt.load(Ordering::SeqCst) == attempt
    }

    /// Settle on whatever principal is present, if `attempt` is still the latest.
    fn settle_if_current(&self, attempt: u64) {
        if !self.is_current(attempt) {
            return;
        }
        self.state.send_modify(|s| {
            s.phase = if s.principal.is_some() {
                SessionPhase::Authenticated
            } else {
                SessionPhase::Anonymous
            };
        });
    }

    /// Replace the principal and settle. Bumps the epoch when it changes.
    fn commit(&self, principal: Option<Principal>) {
        self.state.send_modify(|s| {
            if s.principal != principal {
                s.epoch += 1;
            }
            s.phase = if principal.is_some() {
                SessionPhase::Authenticated
            } else {
                SessionPhase::Anonymous
            };
            s.principal = principal;
        });
    }

    fn current_token(&self) -> Option<SessionToken> {
        self.token.read().ok().and_then(|t| t.clone())
    }

    /// The committed token is the one the backend authorizes later calls with.
    fn set_token(&self, token: Option<SessionToken>) {
        self.auth.bind_session(token.as_ref());
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    fn take_token(&self) -> Option<SessionToken> {
        self.auth.bind_session(None);
        self.token.write().ok().and_then(|mut slot| slot.take())
    }
}

fn choose_profile(
    identity: &Identity,
    mut profiles: Vec<Principal>,
    tenant_hint: Option<TenantId>,
) -> Result<Principal, ClientError> {
    if profiles.is_empty() {
        tracing::warn!(identity = %identity.id, "credentials valid but no profile exists");
        return Err(ClientError::ProfileNotFound);
    }
    match tenant_hint {
        Some(tenant) => profiles
            .into_iter()
            .find(|p| p.tenant_id == tenant)
            .ok_or(ClientError::ProfileNotFound),
        None if profiles.len() == 1 => Ok(profiles.remove(0)),
        None => Err(ClientError::TenantRequired),
    }
}

fn login_error(err: BackendError) -> ClientError {
    match err {
        BackendError::Rejected | BackendError::NotFound => ClientError::InvalidCredentials,
        other => other.into(),
    }
}

fn signup_error(err: BackendError) -> ClientError {
    match err {
        BackendError::Conflict(_) => ClientError::EmailTaken,
        BackendError::WeakPassword(reason) => ClientError::WeakPassword(reason),
        other => other.into(),
    }
}
