use axum::http::{header, HeaderMap};

use crate::error::{AppError, AppResult};
use crate::services::{DataService, Identity};

/// Pulls the access token out of `Authorization: Bearer <token>`.
pub fn bearer_token(headers: &HeaderMap) -> AppResult<String> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("Missing Authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("Malformed Authorization header".to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim().to_string())
        }
        _ => Err(AppError::Unauthorized(
            "Expected a bearer token".to_string(),
        )),
    }
}

pub async fn authenticate(
    data_service: &dyn DataService,
    headers: &HeaderMap,
) -> AppResult<(String, Identity)> {
    let token = bearer_token(headers)?;
    let identity = data_service.current_identity(&token).await?;
    Ok((token, identity))
}
