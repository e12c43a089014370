//! Map parsed CLI arguments to an [`Action`].

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_FRONTEND_BASE_URL, ARG_PORT, provider, workflow};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let frontend_base_url = matches
        .get_one::<String>(ARG_FRONTEND_BASE_URL)
        .cloned()
        .filter(|url| !url.trim().is_empty());

    let workflow_opts = workflow::Options::parse(matches)?;
    let provider_opts = provider::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        frontend_base_url,
        entry_ttl_seconds: workflow_opts.entry_ttl_seconds,
        rate_limit_per_minute: workflow_opts.rate_limit_per_minute,
        seed_attributes: provider_opts.seed_attributes,
        verifiable_attributes: provider_opts.verifiable_attributes,
        code_ttl_seconds: provider_opts.code_ttl_seconds,
        max_code_attempts: provider_opts.max_code_attempts,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_action_from_env() {
        temp_env::with_vars(
            [
                ("VERITY_PORT", Some("9000")),
                ("VERITY_FRONTEND_BASE_URL", Some("")),
                ("VERITY_ENTRY_TTL_SECONDS", Some("60")),
                ("VERITY_RATE_LIMIT_PER_MINUTE", None),
                ("VERITY_SEED_ATTRIBUTES", Some("email=jane@example.com")),
                ("VERITY_VERIFIABLE_ATTRIBUTES", None),
                ("VERITY_CODE_TTL_SECONDS", None),
                ("VERITY_MAX_CODE_ATTEMPTS", Some("3")),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["verity"]);
                let result = handler(&matches);
                assert!(result.is_ok());
                if let Ok(Action::Server(args)) = result {
                    assert_eq!(args.port, 9000);
                    assert_eq!(args.frontend_base_url, None);
                    assert_eq!(args.entry_ttl_seconds, 60);
                    assert_eq!(args.rate_limit_per_minute, 30);
                    assert_eq!(
                        args.seed_attributes.get("email").map(String::as_str),
                        Some("jane@example.com")
                    );
                    assert_eq!(args.max_code_attempts, 3);
                    assert_eq!(args.code_ttl_seconds, 900);
                }
            },
        );
    }
}
