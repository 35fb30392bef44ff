//! In-memory backend for local development and tests.
//!
//! Mirrors the dashboard's offline demo mode: three seeded tenants and a demo
//! admin account (`admin@example.com` / `password`). Implements both ports so
//! one instance can back a whole workspace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use wholesale_auth::{
    Credentials, Identity, Principal, Role, SessionClaims, SessionToken, validate_claims,
};
use wholesale_core::{PrincipalId, TenantId, entity};
use wholesale_tenants::{BrandColor, Tenant, TenantDraft, TenantPatch};

use super::{
    AuthBackend, BackendError, SessionEvent, SessionEventBus, SessionEvents, TenantBackend,
    TenantScope,
};

pub const DEMO_EMAIL: &str = "admin@example.com";
pub const DEMO_PASSWORD: &str = "password";
pub const DEMO_PRINCIPAL: PrincipalId = PrincipalId::from_u128(0x01);

pub const MANGO_EXPRESS: TenantId = TenantId::from_u128(0x1);
pub const FRUIT_WHOLESALERS: TenantId = TenantId::from_u128(0x2);
pub const GLOBAL_PRODUCE: TenantId = TenantId::from_u128(0x3);

const MIN_PASSWORD_LEN: usize = 6;
const DEFAULT_SESSION_TTL_HOURS: i64 = 12;

#[derive(Debug, Clone)]
struct Account {
    id: PrincipalId,
    email: String,
    password: String,
}

#[derive(Debug, Default)]
struct State {
    accounts: Vec<Account>,
    profiles: Vec<Principal>,
    tenants: Vec<Tenant>,
    sessions: HashMap<String, SessionClaims>,
}

/// In-memory auth + tenant backend.
#[derive(Debug)]
pub struct InMemoryBackend {
    state: RwLock<State>,
    events: SessionEventBus,
    session_ttl: Duration,
    latency: Option<StdDuration>,
    unavailable: AtomicBool,
}

impl InMemoryBackend {
    /// Empty backend: no accounts, no tenants.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
            events: SessionEventBus::new(),
            session_ttl: Duration::hours(DEFAULT_SESSION_TTL_HOURS),
            latency: None,
            unavailable: AtomicBool::new(false),
        }
    }

    /// Backend preloaded with the demo tenants and the demo admin account.
    pub fn seeded() -> Self {
        let backend = Self::new();
        {
            let mut state = backend.state.write().unwrap_or_else(|e| e.into_inner());
            state.tenants = vec![
                seed_tenant(MANGO_EXPRESS, "Mango Express", "ME", "#f59e0b"),
                seed_tenant(FRUIT_WHOLESALERS, "Fruit Wholesalers Inc.", "FW", "#10b981"),
                seed_tenant(GLOBAL_PRODUCE, "Global Produce", "GP", "#3b82f6"),
            ];
            state.accounts.push(Account {
                id: DEMO_PRINCIPAL,
                email: DEMO_EMAIL.to_string(),
                password: DEMO_PASSWORD.to_string(),
            });
            state.profiles.push(Principal {
                id: DEMO_PRINCIPAL,
                email: DEMO_EMAIL.to_string(),
                name: "Admin User".to_string(),
                role: Role::Admin,
                tenant_id: MANGO_EXPRESS,
                avatar: Some("https://api.dicebear.com/7.x/avataaars/svg?seed=admin".to_string()),
            });
        }
        backend
    }

    /// Delay every call, like a real network round-trip.
    pub fn with_latency(mut self, latency: StdDuration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Simulate an outage: every call fails with `Unavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Add an account with a single profile, bypassing the password policy.
    pub fn add_user(&self, email: &str, password: &str, name: &str, role: Role, tenant_id: TenantId) -> Principal {
        let mut state = self.write_state_unchecked();
        let email = email.trim().to_lowercase();
        let existing = state.accounts.iter().find(|a| a.email == email).map(|a| a.id);
        let id = match existing {
            Some(id) => id,
            None => {
                let id = PrincipalId::new();
                state.accounts.push(Account {
                    id,
                    email: email.clone(),
                    password: password.to_string(),
                });
                id
            }
        };
        let profile = Principal {
            id,
            email,
            name: name.to_string(),
            role,
            tenant_id,
            avatar: None,
        };
        state.profiles.push(profile.clone());
        profile
    }

    /// Add a tenant row directly.
    pub fn add_tenant(&self, tenant: Tenant) {
        self.write_state_unchecked().tenants.push(tenant);
    }

    /// Revoke every session of an identity and announce it, as an admin
    /// console or another device would.
    pub fn revoke_sessions_of(&self, identity: PrincipalId) {
        let revoked: Vec<String> = {
            let mut state = self.write_state_unchecked();
            let tokens: Vec<String> = state
                .sessions
                .iter()
                .filter(|(_, claims)| claims.sub == identity)
                .map(|(token, _)| token.clone())
                .collect();
            for token in &tokens {
                state.sessions.remove(token);
            }
            tokens
        };
        for token in revoked {
            self.events.publish(SessionEvent::SignedOut(Some(SessionToken::new(token))));
        }
    }

    /// Open a session from "another tab" and announce it.
    pub async fn sign_in_elsewhere(&self, credentials: &Credentials) -> Result<SessionToken, BackendError> {
        let token = self.verify_credentials(credentials).await?;
        self.events.publish(SessionEvent::SignedIn(token.clone()));
        Ok(token)
    }

    pub fn session_count(&self) -> usize {
        self.read_state_unchecked().sessions.len()
    }

    async fn round_trip(&self) -> Result<(), BackendError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable("in-memory backend marked unavailable"));
        }
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, State>, BackendError> {
        self.state
            .read()
            .map_err(|_| BackendError::unavailable("lock poisoned"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, State>, BackendError> {
        self.state
            .write()
            .map_err(|_| BackendError::unavailable("lock poisoned"))
    }

    // Seeding/admin helpers are infallible; a poisoned lock still holds usable data.
    fn read_state_unchecked(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state_unchecked(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn seed_tenant(id: TenantId, name: &str, initials: &str, color: &str) -> Tenant {
    Tenant {
        id,
        name: name.to_string(),
        logo: Some(format!("https://api.dicebear.com/7.x/initials/svg?seed={initials}")),
        primary_color: BrandColor::parse(color).ok(),
        active: true,
    }
}

fn new_token() -> String {
    format!("dev-{}", Uuid::now_v7().simple())
}

#[async_trait]
impl AuthBackend for InMemoryBackend {
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<SessionToken, BackendError> {
        self.round_trip().await?;
        let mut state = self.write_state()?;
        let account = state
            .accounts
            .iter()
            .find(|a| a.email == credentials.email() && a.password == credentials.password())
            .cloned()
            .ok_or(BackendError::Rejected)?;

        let token = new_token();
        let claims = SessionClaims::issue(account.id, Utc::now(), self.session_ttl);
        state.sessions.insert(token.clone(), claims);
        tracing::debug!(principal_id = %account.id, "dev session issued");
        Ok(SessionToken::new(token))
    }

    async fn get_session(&self, token: &SessionToken) -> Result<Option<Identity>, BackendError> {
        self.round_trip().await?;
        let state = self.read_state()?;
        let Some(claims) = state.sessions.get(token.as_str()) else {
            return Ok(None);
        };
        if let Err(err) = validate_claims(claims, Utc::now()) {
            tracing::debug!(error = %err, "dev session rejected");
            return Ok(None);
        }
        Ok(state
            .accounts
            .iter()
            .find(|a| a.id == claims.sub)
            .map(|a| Identity {
                id: a.id,
                email: a.email.clone(),
            }))
    }

    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), BackendError> {
        self.round_trip().await?;
        let removed = self.write_state()?.sessions.remove(token.as_str()).is_some();
        if removed {
            self.events.publish(SessionEvent::SignedOut(Some(token.clone())));
        }
        Ok(())
    }

    async fn profiles(
        &self,
        _token: &SessionToken,
        identity: PrincipalId,
    ) -> Result<Vec<Principal>, BackendError> {
        self.round_trip().await?;
        Ok(self
            .read_state()?
            .profiles
            .iter()
            .filter(|p| p.id == identity)
            .cloned()
            .collect())
    }

    async fn create_account(&self, credentials: &Credentials) -> Result<Identity, BackendError> {
        self.round_trip().await?;
        if credentials.password().chars().count() < MIN_PASSWORD_LEN {
            return Err(BackendError::WeakPassword(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let mut state = self.write_state()?;
        if state.accounts.iter().any(|a| a.email == credentials.email()) {
            return Err(BackendError::Conflict(format!(
                "account {} already exists",
                credentials.email()
            )));
        }
        let account = Account {
            id: PrincipalId::new(),
            email: credentials.email().to_string(),
            password: credentials.password().to_string(),
        };
        let identity = Identity {
            id: account.id,
            email: account.email.clone(),
        };
        state.accounts.push(account);
        Ok(identity)
    }

    async fn create_profile(&self, profile: &Principal) -> Result<(), BackendError> {
        self.round_trip().await?;
        let mut state = self.write_state()?;
        if !state.accounts.iter().any(|a| a.id == profile.id) {
            return Err(BackendError::NotFound);
        }
        if state
            .profiles
            .iter()
            .any(|p| p.id == profile.id && p.tenant_id == profile.tenant_id)
        {
            return Err(BackendError::Conflict("profile already exists for tenant".into()));
        }
        state.profiles.push(profile.clone());
        Ok(())
    }

    fn subscribe(&self) -> SessionEvents {
        self.events.subscribe()
    }
}

#[async_trait]
impl TenantBackend for InMemoryBackend {
    async fn list_tenants(&self, scope: &TenantScope) -> Result<Vec<Tenant>, BackendError> {
        self.round_trip().await?;
        Ok(self
            .read_state()?
            .tenants
            .iter()
            .filter(|t| scope.includes(t.id))
            .cloned()
            .collect())
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, BackendError> {
        self.round_trip().await?;
        Ok(entity::find_by_id(&self.read_state()?.tenants, id).cloned())
    }

    async fn insert_tenant(&self, draft: &TenantDraft) -> Result<Tenant, BackendError> {
        self.round_trip().await?;
        draft
            .validate()
            .map_err(|e| BackendError::Validation(e.to_string()))?;
        let tenant = draft.clone().into_tenant(TenantId::new());
        self.write_state()?.tenants.push(tenant.clone());
        Ok(tenant)
    }

    async fn patch_tenant(&self, id: TenantId, patch: &TenantPatch) -> Result<Tenant, BackendError> {
        self.round_trip().await?;
        patch
            .validate()
            .map_err(|e| BackendError::Validation(e.to_string()))?;
        let mut state = self.write_state()?;
        let idx = entity::position_of(&state.tenants, id).ok_or(BackendError::NotFound)?;
        state.tenants[idx].apply(patch);
        Ok(state.tenants[idx].clone())
    }
}
