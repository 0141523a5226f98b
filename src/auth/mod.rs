use axum::{async_trait, extract::FromRequestParts, http::request::Parts};

use crate::{
    config::AppConfig,
    error::AppError,
    models::{Document, DocumentStatus},
    state::AppState,
};

pub const HOOK_TOKEN_HEADER: &str = "x-hook-token";
pub const CLIENT_TOKEN_HEADER: &str = "x-client-token";

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim().to_string())
}

#[derive(Debug, Clone, Copy)]
pub struct HookAccess;

#[async_trait]
impl FromRequestParts<AppState> for HookAccess {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match state.config.hook_token.as_deref() {
            None => Ok(HookAccess),
            Some(expected) if header_value(parts, HOOK_TOKEN_HEADER).as_deref() == Some(expected) => {
                Ok(HookAccess)
            }
            Some(_) => {
                tracing::warn!("hook request rejected: bad or missing token");
                Err(AppError::unauthorized())
            }
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ClientToken(pub Option<String>);

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ClientToken {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ClientToken(header_value(parts, CLIENT_TOKEN_HEADER)))
    }
}

pub fn authorize_client_read(
    config: &AppConfig,
    token: &ClientToken,
    document: &Document,
) -> Result<(), AppError> {
    let Some(expected) = config.client_read_token.as_deref() else {
        return Ok(());
    };
    if document.status == DocumentStatus::Archive {
        return Ok(());
    }
    if token.0.as_deref() == Some(expected) {
        Ok(())
    } else {
        Err(AppError::unauthorized())
    }
}
