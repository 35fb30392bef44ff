//! Hosted backend-as-a-service: a token auth service under `/auth/v1` and
//! PostgREST tables under `/rest/v1`. Every request carries the project
//! `apikey`; table calls also carry the user's bearer token once signed in.

use std::sync::RwLock;

use async_trait::async_trait;
use reqwest::{RequestBuilder, StatusCode};

use wholesale_auth::{Credentials, Identity, Principal, SessionToken};
use wholesale_core::{PrincipalId, TenantId};
use wholesale_tenants::{Tenant, TenantDraft, TenantPatch};

use super::http::{self, join};
use super::{AuthBackend, BackendError, SessionEvents, TenantBackend, TenantScope};
use crate::adapters::hosted::{
    self as wire, HostedAuthUser, HostedCredentials, HostedErrorBody, HostedProfileRow,
    HostedSignupResponse, HostedTenantRow, HostedTokenResponse,
};
use crate::config::HttpBackendConfig;

const TENANT_COLUMNS: &str = "select=*&order=created_at.asc";

#[derive(Debug)]
pub struct HostedBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    token: RwLock<Option<SessionToken>>,
}

impl HostedBackend {
    pub fn new(config: &HttpBackendConfig) -> Result<Self, BackendError> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| BackendError::unavailable("hosted backend requires an api key"))?;
        Ok(Self {
            client: http::client(config.timeout)?,
            base_url: config.base_url.clone(),
            api_key,
            token: RwLock::new(None),
        })
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        let bearer = self
            .token
            .read()
            .ok()
            .and_then(|t| t.clone())
            .map(|t| t.as_str().to_string())
            .unwrap_or_else(|| self.api_key.clone());
        self.client
            .request(method, join(&self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(bearer)
    }

    fn with_token(&self, method: reqwest::Method, path: &str, token: &SessionToken) -> RequestBuilder {
        self.client
            .request(method, join(&self.base_url, path))
            .header("apikey", &self.api_key)
            .bearer_auth(token.as_str())
    }

    fn remember(&self, token: Option<SessionToken>) {
        if let Ok(mut slot) = self.token.write() {
            *slot = token;
        }
    }

    async fn error_body(response: reqwest::Response) -> (StatusCode, HostedErrorBody) {
        let status = response.status();
        let body = response.json::<HostedErrorBody>().await.unwrap_or_default();
        (status, body)
    }
}

#[async_trait]
impl AuthBackend for HostedBackend {
    async fn verify_credentials(&self, credentials: &Credentials) -> Result<SessionToken, BackendError> {
        let body = HostedCredentials {
            email: credentials.email(),
            password: credentials.password(),
        };
        let request = self
            .client
            .post(join(&self.base_url, "/auth/v1/token?grant_type=password"))
            .header("apikey", &self.api_key)
            .json(&body);
        let response = http::send(request).await?;
        match response.status() {
            s if s.is_success() => {
                let grant: HostedTokenResponse = http::json(response).await?;
                tracing::debug!(user = %grant.user.id, "password grant accepted");
                let token = SessionToken::new(grant.access_token);
                Ok(token)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => Err(BackendError::Rejected),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn get_session(&self, token: &SessionToken) -> Result<Option<Identity>, BackendError> {
        let response = http::send(self.with_token(reqwest::Method::GET, "/auth/v1/user", token)).await?;
        match response.status() {
            s if s.is_success() => {
                let user: HostedAuthUser = http::json(response).await?;
                let identity = wire::identity_from_wire(user)?;
                Ok(Some(identity))
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(None),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn invalidate_session(&self, token: &SessionToken) -> Result<(), BackendError> {
        let response =
            http::send(self.with_token(reqwest::Method::POST, "/auth/v1/logout", token)).await?;
        let current = self.token.read().ok().and_then(|t| t.clone());
        if current.as_ref() == Some(token) {
            self.remember(None);
        }
        match response.status() {
            s if s.is_success() => Ok(()),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => Ok(()),
            _ => Err(http::unexpected(response).await),
        }
    }

    async fn profiles(
        &self,
        token: &SessionToken,
        identity: PrincipalId,
    ) -> Result<Vec<Principal>, BackendError> {
        let path = format!("/rest/v1/profiles?id=eq.{identity}&select=*");
        let response = http::send(self.with_token(reqwest::Method::GET, &path, token)).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        let rows: Vec<HostedProfileRow> = http::json(response).await?;
        rows.into_iter().map(wire::principal_from_wire).collect()
    }

    async fn create_account(&self, credentials: &Credentials) -> Result<Identity, BackendError> {
        let body = HostedCredentials {
            email: credentials.email(),
            password: credentials.password(),
        };
        let request = self
            .client
            .post(join(&self.base_url, "/auth/v1/signup"))
            .header("apikey", &self.api_key)
            .json(&body);
        let response = http::send(request).await?;
        if response.status().is_success() {
            let signup: HostedSignupResponse = http::json(response).await?;
            return wire::identity_from_wire(signup.into_user());
        }
        let (status, error) = Self::error_body(response).await;
        Err(signup_error(status, &error))
    }

    async fn create_profile(&self, profile: &Principal) -> Result<(), BackendError> {
        let request = self
            .request(reqwest::Method::POST, "/rest/v1/profiles")
            .header("Prefer", "return=minimal")
            .json(&wire::principal_to_wire(profile));
        let response = http::send(request).await?;
        if response.status().is_success() {
            return Ok(());
        }
        Err(http::unexpected(response).await)
    }

    fn subscribe(&self) -> SessionEvents {
        // Realtime auth events are not wired up for this backend.
        SessionEvents::closed()
    }

    fn bind_session(&self, token: Option<&SessionToken>) {
        self.remember(token.cloned());
    }
}

fn signup_error(status: StatusCode, error: &HostedErrorBody) -> BackendError {
    match error.error_code.as_deref() {
        Some("weak_password") => BackendError::WeakPassword(error.text()),
        Some("user_already_exists") | Some("email_exists") => BackendError::Conflict(error.text()),
        _ if status == StatusCode::CONFLICT => BackendError::Conflict(error.text()),
        _ if status == StatusCode::UNPROCESSABLE_ENTITY || status == StatusCode::BAD_REQUEST => {
            BackendError::Validation(error.text())
        }
        _ => BackendError::unavailable(format!("signup failed with {status}: {}", error.text())),
    }
}

#[async_trait]
impl TenantBackend for HostedBackend {
    async fn list_tenants(&self, scope: &TenantScope) -> Result<Vec<Tenant>, BackendError> {
        let path = match scope {
            TenantScope::All => format!("/rest/v1/tenants?{TENANT_COLUMNS}"),
            TenantScope::Owned(id) => format!("/rest/v1/tenants?id=eq.{id}&{TENANT_COLUMNS}"),
        };
        let response = http::send(self.request(reqwest::Method::GET, &path)).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        let rows: Vec<HostedTenantRow> = http::json(response).await?;
        rows.into_iter().map(wire::tenant_from_wire).collect()
    }

    async fn get_tenant(&self, id: TenantId) -> Result<Option<Tenant>, BackendError> {
        let path = format!("/rest/v1/tenants?id=eq.{id}&select=*");
        let response = http::send(self.request(reqwest::Method::GET, &path)).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        let rows: Vec<HostedTenantRow> = http::json(response).await?;
        rows.into_iter().next().map(wire::tenant_from_wire).transpose()
    }

    async fn insert_tenant(&self, draft: &TenantDraft) -> Result<Tenant, BackendError> {
        let request = self
            .request(reqwest::Method::POST, "/rest/v1/tenants")
            .header("Prefer", "return=representation")
            .json(&wire::draft_to_wire(draft));
        let response = http::send(request).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        let rows: Vec<HostedTenantRow> = http::json(response).await?;
        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| BackendError::decode("insert returned no row"))?;
        wire::tenant_from_wire(row)
    }

    async fn patch_tenant(&self, id: TenantId, patch: &TenantPatch) -> Result<Tenant, BackendError> {
        let request = self
            .request(reqwest::Method::PATCH, &format!("/rest/v1/tenants?id=eq.{id}"))
            .header("Prefer", "return=representation")
            .json(&wire::patch_to_wire(patch));
        let response = http::send(request).await?;
        if !response.status().is_success() {
            return Err(http::unexpected(response).await);
        }
        // PostgREST answers a filter that matched nothing with an empty array.
        let rows: Vec<HostedTenantRow> = http::json(response).await?;
        match rows.into_iter().next() {
            Some(row) => wire::tenant_from_wire(row),
            None => Err(BackendError::NotFound),
        }
    }
}
