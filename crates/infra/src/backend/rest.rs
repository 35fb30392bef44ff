//! Generic REST backend (token auth, DRF-style endpoints).
//!
//! Endpoints, relative to `base_url`:
//! - `POST /auth/login/`, `GET /auth/session/`, `POST /auth/logout/`
//! - `POST /auth/register/`, `POST /auth/profiles/`, `GET /auth/users/{id}/profiles/`
//! - `GET|POST /tenants/`, `GET|PATCH /tenants/{id}/`

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;

use wholesale_auth::{Credentials, Identity, Principal, SessionToken};
use wholesale_core::{PrincipalId, TenantId};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

use super::http::{self, join};
use super::{AuthBackend, BackendError, SessionEvents, TenantBackend, TenantScope};
use crate::adapters::rest::{
    self as wire, RestCredentials, RestIdentity, RestLoginResponse, RestTenant, RestUser,
};
use crate::config::HttpBackendConfig;

/// REST adapter. Holds the bearer token of the session the client bound, so
/// tenant calls are made on the signed-in user's behalf.
#[derive(Debug)]
pub struct RestBackend {
    client: reqwest::Client,
    base_url: String,
    token: RwLock<Option<SessionToken>>,
}

impl RestBackend {
    pub fn new(config: &HttpBackendConfig) -> Result<Self, BackendError> {
        Ok(Self {
            client: http::client(config.timeout)?,
            base_url: config.base_url.clone(),
            token: RwLock::new(None),
        })
    }

    fn url(&self, path: &str) -> String {
        join(&self.base_url, path)
    }

    fn remember(&self, token: Option<SessionToken>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.token.read().ok().and_then(|t| t.clone()) {
            Some(token) => request.bearer_auth(token.as_str()),
            None => request,
        }
    }
}

#[async_trait]
impl AuthBackend for RestBackend {
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<SessionToken, BackendError> {
        let body = RestCredentials {
            email: credentials.email(),
            password: credentials.password(),
        };
        let response = http::send(self.client.post(self.url("/auth/login/")).json(&body)).await?;
        match response.status() {
            s if s.is_success() => {
                let login: RestLoginResponse = http::json(response).await?;
                let token = SessionToken::new(login.token);
                Ok(token)
            }
            // Wrong pair and unknown email look the same from here on.
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(BackendError::Rejected)
            }
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn get_session(&self, token: &SessionToken) -> Result<Option<Identity>, BackendError> {
        let request = self
            .client
            .get(self.url("/auth/session/"))
            .bearer_auth(token.as_str());
        let response = http::send(request).await?;
        match response.status() {
            s if s.is_success() => {
                let row: RestIdentity = http::json(response).await?;
                let identity = wire::identity_from_wire(row)?;
                Ok(Some(identity))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), BackendError> {
        let request = self
            .client
            .post(self.url("/auth/logout/"))
            .bearer_auth(token.as_str());
        let response = http::send(request).await?;
        let current = self.token.read().ok().and_then(|t| t.clone());
        if current.as_ref() == Some(token) {
            self.remember(None);
        }
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn profiles(
        &self,
        token: &SessionToken,
        identity: PrincipalId,
    ) -> Result<Vec<Principal>, BackendError> {
        let request = self
            .client
            .get(self.url(&format!("/auth/users/{identity}/profiles/")))
            .bearer_auth(token.as_str());
        let response = http::send(request).await?;
        match response.status() {
            s if s.is_success() => {
                let rows: Vec<RestUser> = http::json(response).await?;
                rows.into_iter().map(wire::principal_from_wire).collect()
            }
            StatusCode::NOT_FOUND => Ok(Vec::new()),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn create_account(&self, credentials: &Credentials) -> Result<Identity, BackendError> {
        let body = RestCredentials {
            email: credentials.email(),
            password: credentials.password(),
        };
        let response = http::send(self.client.post(self.url("/auth/register/")).json(&body)).await?;
        match response.status() {
            s if s.is_success() => wire::identity_from_wire(http::json(response).await?),
            StatusCode::CONFLICT => Err(BackendError::Conflict(credentials.email().to_string())),
            StatusCode::BAD_REQUEST => {
                let errors: JsonValue = http::json(response).await?;
                Err(register_error(&errors))
            }
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn create_profile(&self, profile: &Principal) -> Result<(), BackendError> {
        let request = self.authorized(
            self.client
                .post(self.url("/auth/profiles/"))
                .json(&wire::principal_to_wire(profile)),
        );
        let response = http::send(request).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(http::unexpected(response).await)
    }

    fn subscribe(&self) -> SessionEvents {
        // No push channel on this backend.
        SessionEvents::closed()
    }

    fn bind_session(&self, token: Option<&SessionToken>) {
        self.remember(token.cloned());
    }
}

/// DRF reports field errors as `{ "field": ["message", ...] }`.
fn register_error(errors: &JsonValue) -> BackendError {
    let messages = |field: &str| -> Option<String> {
        let list = errors.get(field)?.as_array()?;
        let joined: Vec<&str> = list.iter().filter_map(JsonValue::as_str).collect();
        Some(joined.join("; "))
    };
    if let Some(msg) = messages("password") {
        return BackendError::WeakPassword(msg);
    }
    if let Some(msg) = messages("email") {
        return BackendError::Conflict(msg);
    }
    BackendError::Validation(errors.to_string())
}

#[async_trait]
impl TenantBackend for RestBackend {
    async fn list_tenants(&self, scope: &TenantScope) -> Result<Vec<Tenant>, BackendError> {
        let request = self.client.get(self.url("/tenants/"));
        let request = match scope {
            TenantScope::All => request.query(&[("scope", "all")]),
            TenantScope::Owned(id) => request.query(&[("id", id.to_string())]),
        };
        let response = http::send(self.authorized(request)).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        let rows: Vec<RestTenant> = http::json(response).await?;
        rows.into_iter().map(wire::tenant_from_wire).collect()
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, BackendError> {
        let request = self.authorized(self.client.get(self.url(&format!("/tenants/{id}/"))));
        let response = http::send(request).await?;
        match response.status() {
            s if s.is_success() => Ok(Some(wire::tenant_from_wire(http::json(response).await?)?)),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn insert_tenant(&self, draft: &TenantDraft) -> Result<Tenant, BackendError> {
        let request = self.authorized(
            self.client
                .post(self.url("/tenants/"))
                .json(&wire::draft_to_wire(draft)),
        );
        let response = http::send(request).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        let tenant = wire::tenant_from_wire(http::json(response).await?)?;
        Ok(tenant.with_default_branding())
    }

    async fn patch_tenant(&self, id: TenantId, patch: &TenantPatch) -> Result<Tenant, BackendError> {
        let request = self.authorized(
            self.client
                .patch(self.url(&format!("/tenants/{id}/")))
                .json(&wire::patch_to_wire(patch)),
        );
        let response = http::send(request).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        wire::tenant_from_wire(http::json(response).await?)
    }
}
