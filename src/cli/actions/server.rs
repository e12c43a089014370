use crate::{
    api::{self, ApiState, NoopRateLimiter, RateLimiter, ServerConfig, WindowRateLimiter},
    cli::telemetry,
    provider::{AttributeMap, LogCodeSender, MemoryProvider, MemoryProviderConfig},
    workflow::{AttributeWorkflow, WorkflowConfig},
};
use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub frontend_base_url: Option<String>,
    pub entry_ttl_seconds: u64,
    pub rate_limit_per_minute: u32,
    pub seed_attributes: AttributeMap,
    pub verifiable_attributes: Vec<String>,
    pub code_ttl_seconds: u64,
    pub max_code_attempts: u32,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    debug!("Server args: {:?}", args);

    let provider_config = MemoryProviderConfig::new()
        .with_verifiable_attributes(args.verifiable_attributes)
        .with_code_ttl_seconds(args.code_ttl_seconds)
        .with_max_attempts(args.max_code_attempts);

    info!(
        attributes = args.seed_attributes.len(),
        "Using in-memory identity provider"
    );
    let provider = Arc::new(MemoryProvider::new(
        args.seed_attributes,
        provider_config,
        Arc::new(LogCodeSender),
    ));

    let workflow = Arc::new(AttributeWorkflow::new(
        provider,
        WorkflowConfig::new().with_entry_ttl_seconds(args.entry_ttl_seconds),
    ));

    let rate_limiter: Arc<dyn RateLimiter> = if args.rate_limit_per_minute == 0 {
        Arc::new(NoopRateLimiter)
    } else {
        Arc::new(WindowRateLimiter::per_minute(args.rate_limit_per_minute))
    };

    let config = ServerConfig::new(args.port).with_frontend_base_url(args.frontend_base_url);
    let state = Arc::new(ApiState::new(workflow, rate_limiter));

    let result = api::serve(&config, state).await;

    telemetry::shutdown_tracer();

    result
}
