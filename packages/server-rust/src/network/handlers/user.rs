//! Signup, login and token check.

use axum::extract::State;
use axum::Json;
use sheetsync_core::messages::{ApiResponse, AuthPayload, LoginRequest, SignupRequest, UserProfile};

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

/// `POST /user/signup`: registers and logs in.
///
/// # Errors
///
/// 400 for invalid input, 409 for a registered e-mail.
pub async fn signup_handler(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, ApiError> {
    let users = state.users.clone();
    // Argon2 hashing blocks for tens of milliseconds.
    let user = tokio::task::spawn_blocking(move || users.signup(&req))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    let token = state.tokens.issue(&user.id)?;
    Ok(Json(ApiResponse::ok("User signed up", AuthPayload { token, user })))
}

/// `POST /user/login`.
///
/// # Errors
///
/// 401 `Login failed` for an unknown e-mail or wrong password.
pub async fn login_handler(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<ApiResponse<AuthPayload>>, ApiError> {
    let users = state.users.clone();
    let user = tokio::task::spawn_blocking(move || users.login(&req.email, &req.password))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;
    let token = state.tokens.issue(&user.id)?;
    Ok(Json(ApiResponse::ok("User logged in", AuthPayload { token, user })))
}

/// `GET /user/check`: echoes the token's user.
pub async fn check_handler(AuthUser(user): AuthUser) -> Json<ApiResponse<UserProfile>> {
    Json(ApiResponse::ok("Authenticated", user))
}
