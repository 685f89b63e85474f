//! Identity is owned by Supabase Auth; the server only verifies bearer tokens.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::api::{ApiError, SharedState};
use crate::errors::AuthError;

/// The caller, as resolved from their access token.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthenticatedUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

impl AuthenticatedUser {
    pub fn owns(&self, user_id: &str) -> bool {
        self.id == user_id
    }
}

/// The authenticated caller of a handler, if authentication is enabled.
///
/// Handlers use it to refuse access to another user's board. Without an
/// authenticator every request is anonymous and every check passes.
#[derive(Debug, Clone, Default)]
pub struct Caller(pub Option<AuthenticatedUser>);

impl Caller {
    pub fn authorize(&self, user_id: &str) -> Result<(), ApiError> {
        match &self.0 {
            Some(user) if !user.owns(user_id) => Err(ApiError::Forbidden(
                "Access to another user's board is not allowed".into(),
            )),
            _ => Ok(()),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.0.is_some()
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Caller(parts.extensions.get::<AuthenticatedUser>().cloned()))
    }
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError>;
}

pub type SharedAuthenticator = Arc<dyn Authenticator>;

/// Verifies tokens against `GET {url}/auth/v1/user`.
pub struct SupabaseAuth {
    user_url: String,
    anon_key: String,
    client: reqwest::Client,
}

impl SupabaseAuth {
    pub fn new(url: &str, anon_key: &str) -> Self {
        Self {
            user_url: format!("{}/auth/v1/user", url.trim_end_matches('/')),
            anon_key: anon_key.to_string(),
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Authenticator for SupabaseAuth {
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser, AuthError> {
        let response = self
            .client
            .get(&self.user_url)
            .header("apikey", &self.anon_key)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(AuthError::InvalidToken);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<AuthenticatedUser>().await?)
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    if scheme.eq_ignore_ascii_case("bearer") && !token.is_empty() {
        Some(token)
    } else {
        None
    }
}

/// Middleware: when an authenticator is configured, every request must carry
/// a valid bearer token; the resolved user is stored in request extensions.
pub async fn require_user(
    State(state): State<SharedState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(auth) = state.auth.clone() else {
        return next.run(req).await;
    };

    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string);
    let Some(token) = token else {
        return ApiError::from(AuthError::MissingToken).into_response();
    };

    match auth.authenticate(&token).await {
        Ok(user) => {
            tracing::debug!(user_id = %user.id, "Authenticated request");
            req.extensions_mut().insert(user);
            next.run(req).await
        }
        Err(err) => {
            tracing::warn!(error = %err, "Rejected request token");
            ApiError::from(err).into_response()
        }
    }
}
