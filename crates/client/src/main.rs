use anyhow::Context;

use wholesale_client::{ClientConfig, LoginForm, Workspace};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    wholesale_observability::init();

    let config = ClientConfig::from_env().context("invalid configuration")?;
    let backends = config.backend.build().context("failed to build backend")?;
    let storage = config.storage.open()?;

    let workspace = Workspace::from_backends(backends, storage);
    let tasks = workspace.start();

    let session = workspace.boot().await;
    tracing::info!(phase = ?session.phase, epoch = session.epoch, "session ready");

    if !session.is_authenticated() {
        if let Some(form) = login_form_from_env() {
            let request = form
                .validate(false)
                .map_err(|errors| anyhow::anyhow!("login form rejected: {errors}"))?;
            match workspace
                .login(
                    request.credentials.email(),
                    request.credentials.password(),
                    request.tenant,
                )
                .await
            {
                Ok(principal) => tracing::info!(principal = %principal.id, "signed in"),
                Err(err) => tracing::warn!(error = %err, "{}", err.user_message()),
            }
        }
    }

    let tenants = workspace.tenants().snapshot();
    tracing::info!(
        tenants = tenants.tenants.len(),
        active = ?tenants.active.as_ref().map(|t| &t.name),
        configuration_gap = tenants.configuration_gap,
        ready = workspace.is_ready(),
        "workspace state"
    );

    tasks.shutdown();
    Ok(())
}

fn login_form_from_env() -> Option<LoginForm> {
    let email = std::env::var("WHOLESALE_LOGIN_EMAIL").ok()?;
    let password = std::env::var("WHOLESALE_LOGIN_PASSWORD").unwrap_or_default();
    let tenant = std::env::var("WHOLESALE_LOGIN_TENANT")
        .ok()
        .and_then(|raw| raw.parse().ok());
    Some(LoginForm {
        email,
        password,
        tenant,
    })
}
