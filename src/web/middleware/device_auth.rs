use axum::{
    body::Body as AxumBody,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::db::services::device_service;
use crate::web::{AppState, error::AppError};

/// Device authentication: resolves the bearer token against the device
/// registry. Only assigned devices pass; an unauthenticated device should
/// re-handshake.
pub async fn device_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request<AxumBody>,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?
        .to_string();

    let dev = device_service::authenticate(&state.db, &token)
        .await?
        .ok_or_else(|| AppError::Unauthorized("Unauthorized".to_string()))?;

    req.extensions_mut().insert(dev);
    Ok(next.run(req).await)
}
