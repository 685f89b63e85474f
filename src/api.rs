use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        FromRequest, FromRequestParts, Path, Query, Request, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use boardroom_common::{HistoryQuery, MemberPatch, NewMember, ValidationError};
use serde::Deserialize;

use crate::auth::{Caller, SharedAuthenticator};
use crate::board::Boardroom;
use crate::errors::{AuthError, BoardError, StoreError};

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub board: Boardroom,
    /// `None` disables bearer-token checks.
    pub auth: Option<SharedAuthenticator>,
}

impl AppState {
    pub fn new(board: Boardroom, auth: Option<SharedAuthenticator>) -> Self {
        Self { board, auth }
    }
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AskRequest {
    pub user_id: String,
    pub user_input: String,
}

#[derive(Deserialize)]
pub struct ChainRequest {
    pub user_id: String,
    pub member_id: String,
}

#[derive(Deserialize)]
pub struct HistoryParams {
    pub member_id: Option<String>,
    pub limit: Option<u32>,
}

// ── Error handling ────────────────────────────────────────────────────

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        tracing::error!(error = %err, "Storage failure");
        ApiError::Internal("Storage request failed".into())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::MissingToken | AuthError::InvalidToken => {
                ApiError::Unauthorized(err.to_string())
            }
            other => {
                tracing::error!(error = %other, "Identity provider failure");
                ApiError::BadGateway("Could not verify credentials".into())
            }
        }
    }
}

impl From<BoardError> for ApiError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::MemberNotFound { .. } | BoardError::HistoryNotFound { .. } => {
                ApiError::NotFound(err.to_string())
            }
            BoardError::Invalid(e) => e.into(),
            BoardError::Generation { member_id, source } => {
                tracing::error!(member_id = %member_id, error = %source, "Generation failed");
                ApiError::BadGateway(format!(
                    "Failed to generate a response for member {member_id}"
                ))
            }
            BoardError::Store(e) => e.into(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

fn member_not_found(id: &str) -> ApiError {
    ApiError::NotFound(format!("Member {id} not found"))
}

// ── Extractors ────────────────────────────────────────────────────────

/// `Json` whose rejections render as an [`ApiError`] body.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// `Query` whose rejections render as an [`ApiError`] body.
pub struct ApiQuery<T>(pub T);

impl<S, T> FromRequestParts<S> for ApiQuery<T>
where
    Query<T>: FromRequestParts<S, Rejection = QueryRejection>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

// ── Router ────────────────────────────────────────────────────────────

/// Unauthenticated routes.
pub fn public_router() -> Router<SharedState> {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
}

/// Board routes; the caller wraps these with the auth middleware.
pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/members", post(create_member))
        .route("/api/members/user/{user_id}", get(list_user_members))
        .route(
            "/api/members/{id}",
            get(get_member).put(update_member).delete(delete_member),
        )
        .route("/api/history", post(create_history))
        .route("/api/history/user/{user_id}", get(list_history))
        .route("/api/history/member/{member_id}", post(ask_member))
        .route("/api/history/{id}/chain", post(chain_history))
        .route("/api/pictures", get(list_pictures))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({"message": "hello world"}))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn list_user_members(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    caller.authorize(&user_id)?;
    let members = state.board.store().list_members(&user_id).await?;
    Ok(Json(members))
}

async fn get_member(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let member = state
        .board
        .store()
        .get_member(&id)
        .await?
        .ok_or_else(|| member_not_found(&id))?;
    caller.authorize(&member.user_id)?;
    Ok(Json(member))
}

async fn create_member(
    State(state): State<SharedState>,
    caller: Caller,
    ApiJson(req): ApiJson<NewMember>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()?;
    caller.authorize(&req.user_id)?;
    let member = state.board.store().create_member(req).await?;
    tracing::info!(member_id = %member.id, user_id = %member.user_id, "Member created");
    Ok((StatusCode::CREATED, Json(member)))
}

async fn update_member(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(patch): ApiJson<MemberPatch>,
) -> Result<impl IntoResponse, ApiError> {
    patch.validate()?;
    if caller.is_authenticated() {
        let existing = state
            .board
            .store()
            .get_member(&id)
            .await?
            .ok_or_else(|| member_not_found(&id))?;
        caller.authorize(&existing.user_id)?;
    }
    let member = state
        .board
        .store()
        .update_member(&id, patch)
        .await?
        .ok_or_else(|| member_not_found(&id))?;
    Ok(Json(member))
}

async fn delete_member(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    if caller.is_authenticated() {
        let existing = state
            .board
            .store()
            .get_member(&id)
            .await?
            .ok_or_else(|| member_not_found(&id))?;
        caller.authorize(&existing.user_id)?;
    }
    if !state.board.store().delete_member(&id).await? {
        return Err(member_not_found(&id));
    }
    tracing::info!(member_id = %id, "Member deleted");
    Ok(Json(
        serde_json::json!({"message": "Member deleted successfully"}),
    ))
}

async fn create_history(
    State(state): State<SharedState>,
    caller: Caller,
    ApiJson(req): ApiJson<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    caller.authorize(&req.user_id)?;
    let history = state.board.convene(&req.user_id, &req.user_input).await?;
    Ok(Json(serde_json::json!({
        "message": "History created successfully",
        "history": history,
    })))
}

async fn ask_member(
    State(state): State<SharedState>,
    caller: Caller,
    Path(member_id): Path<String>,
    ApiJson(req): ApiJson<AskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    caller.authorize(&req.user_id)?;
    let record = state
        .board
        .ask_member(&req.user_id, &member_id, &req.user_input)
        .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn chain_history(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ChainRequest>,
) -> Result<impl IntoResponse, ApiError> {
    caller.authorize(&req.user_id)?;
    let record = state.board.chain(&req.user_id, &id, &req.member_id).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn list_history(
    State(state): State<SharedState>,
    caller: Caller,
    Path(user_id): Path<String>,
    ApiQuery(params): ApiQuery<HistoryParams>,
) -> Result<impl IntoResponse, ApiError> {
    caller.authorize(&user_id)?;
    let query = HistoryQuery {
        user_id,
        member_id: params.member_id.filter(|m| !m.is_empty()),
        limit: params.limit,
    };
    let records = state.board.history(&query).await?;
    Ok(Json(records))
}

async fn list_pictures(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let pictures = state.board.store().list_pictures().await?;
    Ok(Json(pictures))
}

// ── Tests ─────────────────────────────────────────────────────────────
