//! Bearer-token extractor for protected routes.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sheetsync_core::messages::UserProfile;

use crate::error::ApiError;
use crate::network::AppState;

/// The authenticated caller. Rejects with 401 unless the request carries
/// `Authorization: Bearer <token>` for an existing user.
#[derive(Debug, Clone)]
pub struct AuthUser(pub UserProfile);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .ok_or_else(|| ApiError::Unauthorized("missing authorization header".to_string()))?;
        let token = header
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::Unauthorized("expected a bearer token".to_string()))?;

        let user_id = state.tokens.verify(token)?;
        state
            .users
            .get(&user_id)
            .map(AuthUser)
            .ok_or_else(|| ApiError::Unauthorized("user no longer exists".to_string()))
    }
}
