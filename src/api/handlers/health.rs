use super::ApiState;
use crate::GIT_COMMIT_HASH;
use axum::{
    body::Body,
    extract::Extension,
    http::{HeaderMap, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct Health {
    commit: String,
    name: String,
    version: String,
    provider: String,
}

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Identity provider is reachable", body = [Health]),
        (status = 503, description = "Identity provider is unreachable", body = [Health])
    ),
    tag = "health"
)]
// axum handler for health
pub async fn health(method: Method, state: Extension<Arc<ApiState>>) -> impl IntoResponse {
    let reachable = state.workflow().provider_reachable().await;

    let health = Health {
        commit: GIT_COMMIT_HASH.to_string(),
        name: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        provider: if reachable { "ok" } else { "error" }.to_string(),
    };

    let body = if method == Method::GET {
        Json(&health).into_response()
    } else {
        Body::empty().into_response()
    };

    let short_hash = health.commit.get(..7).unwrap_or_default();
    let headers = format!("{}:{}:{}", health.name, health.version, short_hash)
        .parse::<HeaderValue>()
        .map(|x_app| {
            let mut headers = HeaderMap::new();
            headers.insert("x-app", x_app);
            headers
        })
        .unwrap_or_else(|err| {
            error!("Failed to parse X-App header: {}", err);
            HeaderMap::new()
        });

    if reachable {
        debug!("Identity provider is reachable");
        (StatusCode::OK, headers, body)
    } else {
        debug!("Identity provider is unreachable");
        (StatusCode::SERVICE_UNAVAILABLE, headers, body)
    }
}
