//! HTTP surface over an [`AttributeWorkflow`](crate::workflow::AttributeWorkflow).

use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Method, Request, header::CONTENT_TYPE},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, info, info_span, warn};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub(crate) mod handlers;
mod openapi;

pub use handlers::ApiState;
pub use handlers::rate_limit::{
    NoopRateLimiter, RateLimitAction, RateLimitDecision, RateLimiter, WindowRateLimiter,
};
pub use openapi::openapi;

const REQUEST_ID: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct ServerConfig {
    port: u16,
    frontend_base_url: Option<String>,
}

impl ServerConfig {
    #[must_use]
    pub fn new(port: u16) -> Self {
        Self {
            port,
            frontend_base_url: None,
        }
    }

    /// Allow browser calls from this origin (CORS). Without it no CORS layer is installed.
    #[must_use]
    pub fn with_frontend_base_url(mut self, url: Option<String>) -> Self {
        self.frontend_base_url = url.filter(|url| !url.trim().is_empty());
        self
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> Option<&str> {
        self.frontend_base_url.as_deref()
    }
}

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Assemble the served application: documented routes plus request id, tracing,
/// optional CORS and the shared state extension.
#[must_use]
pub fn app(state: Arc<ApiState>, frontend_origin: Option<HeaderValue>) -> Router {
    let (router, _openapi) = router().split_for_parts();
    let app = router.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static(REQUEST_ID),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                REQUEST_ID,
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span))
            .layer(Extension(state)),
    );

    match frontend_origin {
        Some(origin) => app.layer(
            CorsLayer::new()
                .allow_headers([CONTENT_TYPE, HeaderName::from_static(REQUEST_ID)])
                .allow_methods([Method::GET, Method::PUT, Method::POST, Method::DELETE])
                .allow_origin(AllowOrigin::exact(origin)),
        ),
        None => app,
    }
}

/// Start the server
/// # Errors
/// Return error if the frontend URL is invalid or the listener fails
pub async fn serve(config: &ServerConfig, state: Arc<ApiState>) -> Result<()> {
    let frontend_origin = config
        .frontend_base_url()
        .map(frontend_origin)
        .transpose()?;

    let app = app(state, frontend_origin);

    let listener = TcpListener::bind(format!("::0:{}", config.port())).await?;

    info!("Listening on [::]:{}", config.port());

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get(REQUEST_ID)
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");

    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    HeaderValue::from_str(&format!("{}://{host}{port}", parsed.scheme()))
        .context("Failed to build frontend origin header")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn frontend_origin_strips_path() {
        let origin = frontend_origin("https://app.example.com/settings/account").unwrap();
        assert_eq!(origin, "https://app.example.com");

        let origin = frontend_origin("http://localhost:5173/").unwrap();
        assert_eq!(origin, "http://localhost:5173");
    }

    #[test]
    fn frontend_origin_rejects_invalid_url() {
        assert!(frontend_origin("not a url").is_err());
    }

    #[test]
    fn server_config_ignores_blank_frontend_url() {
        let config = ServerConfig::new(8080).with_frontend_base_url(Some("  ".to_string()));
        assert_eq!(config.port(), 8080);
        assert!(config.frontend_base_url().is_none());
    }
}
