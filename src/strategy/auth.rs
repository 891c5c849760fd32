//! Authenticated extraction
//!
//! Establishes a session once per job, then delegates every iteration to the
//! wrapped strategy. The session lives in the job's context, so it survives
//! retries and requeues without logging in again.

use async_trait::async_trait;
use reqwest::Method;

use super::transport::RequestBody;
use super::{Outcome, Strategy, StrategyContext};
use crate::models::{AuthMethod, StrategyKind};
use crate::storage::Credentials;
use crate::utils::error::{CredentialError, FetchError, StrategyError};

pub struct AuthStrategy {
    method: AuthMethod,
    inner: Box<dyn Strategy>,
}

impl AuthStrategy {
    pub fn new(method: AuthMethod, inner: Box<dyn Strategy>) -> Self {
        Self { method, inner }
    }

    async fn authenticate(&self, ctx: &mut StrategyContext) -> Result<(), StrategyError> {
        let credentials = ctx.resolve_credentials().await?;

        match (&self.method, credentials) {
            (AuthMethod::Cookies, Credentials::Cookies { cookies }) => {
                for (name, value) in cookies {
                    ctx.session.set_cookie(name, value);
                }
            }
            (AuthMethod::Bearer, Credentials::Token { token }) => {
                ctx.session.set_header("Authorization", format!("Bearer {token}"));
            }
            (
                AuthMethod::Form {
                    login_url,
                    username_field,
                    password_field,
                    session_cookie,
                },
                Credentials::UsernamePassword { username, password },
            ) => {
                let request = ctx
                    .request(login_url)
                    .with_method(Method::POST)
                    .with_body(RequestBody::Form(vec![
                        (username_field.clone(), username),
                        (password_field.clone(), password),
                    ]))
                    .without_redirects();

                let page = match ctx.fetch_raw(request).await {
                    Ok(page) => page,
                    Err(e) if e.is_transient() || e == FetchError::Cancelled => return Err(e.into()),
                    Err(e) => return Err(CredentialError::LoginFailed(e.to_string()).into()),
                };
                if !(page.is_success() || page.is_redirect()) {
                    return Err(CredentialError::LoginRejected(page.status).into());
                }
                ctx.session.absorb(&page);

                let established = match session_cookie {
                    Some(name) => ctx.session.has_cookie(name),
                    None => !ctx.session.cookies().is_empty(),
                };
                if !established {
                    return Err(CredentialError::NoSessionArtifact(
                        session_cookie
                            .clone()
                            .unwrap_or_else(|| String::from("any cookie")),
                    )
                    .into());
                }
            }
            (method, _) => {
                return Err(CredentialError::MethodMismatch {
                    method: method_name(method),
                    expected: expected_credentials(method),
                }
                .into())
            }
        }

        tracing::info!(job_id = %ctx.job_id, method = method_name(&self.method), "Session established");
        Ok(())
    }
}

fn method_name(method: &AuthMethod) -> &'static str {
    match method {
        AuthMethod::Cookies => "cookies",
        AuthMethod::Form { .. } => "form",
        AuthMethod::Bearer => "bearer",
    }
}

fn expected_credentials(method: &AuthMethod) -> &'static str {
    match method {
        AuthMethod::Cookies => "cookies",
        AuthMethod::Form { .. } => "username/password",
        AuthMethod::Bearer => "token",
    }
}

#[async_trait]
impl Strategy for AuthStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Auth
    }

    async fn execute(&self, ctx: &mut StrategyContext) -> Outcome {
        if !ctx.authenticated {
            if let Err(e) = self.authenticate(ctx).await {
                return Outcome::Failed(e);
            }
            ctx.authenticated = true;
        }
        self.inner.execute(ctx).await
    }
}
