//! Authenticated proxy to the spreadsheet service.

use axum::extract::State;
use axum::Json;
use serde_json::Value;
use sheetsync_core::messages::{ApiResponse, SpreadsheetRequest};
use tracing::debug;

use super::AppState;
use crate::auth::AuthUser;
use crate::error::ApiError;

fn spreadsheet_id(req: &SpreadsheetRequest) -> Result<&str, ApiError> {
    let id = req.spreadsheet_id.trim();
    if id.is_empty() {
        return Err(ApiError::Validation("spreadsheetId must not be blank".to_string()));
    }
    Ok(id)
}

/// `POST /sheets/metadata`.
///
/// # Errors
///
/// 401 without a valid token, 400 for a blank id, 502 if the spreadsheet
/// service fails or no API key is configured.
pub async fn metadata_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SpreadsheetRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let id = spreadsheet_id(&req)?;
    debug!(user_id = %user.id, spreadsheet_id = id, "metadata requested");
    let metadata = state.sheets.metadata(id).await?;
    Ok(Json(ApiResponse::ok("Spreadsheet metadata", metadata)))
}

/// `POST /sheets/sheetdata`: value grid of the requested tab, or the
/// configured default tab.
///
/// # Errors
///
/// Same as [`metadata_handler`].
pub async fn sheet_data_handler(
    State(state): State<AppState>,
    AuthUser(user): AuthUser,
    Json(req): Json<SpreadsheetRequest>,
) -> Result<Json<ApiResponse<Value>>, ApiError> {
    let id = spreadsheet_id(&req)?;
    let sheet = req
        .sheet_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(state.default_sheet_name.as_ref());
    debug!(user_id = %user.id, spreadsheet_id = id, sheet, "values requested");
    let values = state.sheets.values(id, sheet).await?;
    Ok(Json(ApiResponse::ok("Spreadsheet values", values)))
}
