use axum::{extract::State, Json};
use tracing::instrument;
use validator::Validate;

use crate::{
    app_state::AppState,
    error::{ApiError, Result},
    middleware::UserIdentity,
    models::{
        auth::{AuthResponse, SigninRequest, SignupRequest, UserResponse},
        common::MessageResponse,
    },
};

/// POST /api/v1/auth/signup
///
/// Create an account. New accounts start unsubscribed on the free plan.
#[instrument(skip(state, request))]
pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<SignupRequest>,
) -> Result<Json<MessageResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    state.auth_service.signup(request).await?;

    Ok(Json(MessageResponse::new("Signup success! Please signin.")))
}

/// POST /api/v1/auth/signin
#[instrument(skip(state, request))]
pub async fn signin(
    State(state): State<AppState>,
    Json(request): Json<SigninRequest>,
) -> Result<Json<AuthResponse>> {
    request
        .validate()
        .map_err(|e| ApiError::BadRequest(format!("Validation error: {}", e)))?;

    let tokens = state
        .auth_service
        .signin(&request.email, &request.password)
        .await?;

    Ok(Json(AuthResponse {
        token: tokens.token,
        expires_in: tokens.expires_in,
        user: tokens.user.into(),
    }))
}

/// GET /api/v1/auth/me
///
/// Requires: Authorization header with valid access token
#[instrument(skip(state))]
pub async fn get_me(
    State(state): State<AppState>,
    identity: UserIdentity,
) -> Result<Json<UserResponse>> {
    let user = state.auth_service.find_by_id(identity.user_id).await?;

    Ok(Json(user.into()))
}
