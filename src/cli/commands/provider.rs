use crate::provider::AttributeMap;
use clap::{Arg, ArgAction, ArgMatches, Command, builder::ValueParser};

pub const ARG_SEED_ATTRIBUTE: &str = "seed-attribute";
pub const ARG_VERIFIABLE_ATTRIBUTES: &str = "verifiable-attributes";
pub const ARG_CODE_TTL_SECONDS: &str = "code-ttl-seconds";
pub const ARG_MAX_CODE_ATTEMPTS: &str = "max-code-attempts";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub seed_attributes: AttributeMap,
    pub verifiable_attributes: Vec<String>,
    pub code_ttl_seconds: u64,
    pub max_code_attempts: u32,
}

impl Options {
    /// Parse in-memory provider arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        // Later seeds for the same key win.
        let seed_attributes = matches
            .get_many::<(String, String)>(ARG_SEED_ATTRIBUTE)
            .map(|pairs| pairs.cloned().collect())
            .unwrap_or_default();

        let verifiable_attributes = matches
            .get_many::<String>(ARG_VERIFIABLE_ATTRIBUTES)
            .map(|names| {
                names
                    .map(|name| name.trim().to_string())
                    .filter(|name| !name.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        let code_ttl_seconds = matches
            .get_one::<u64>(ARG_CODE_TTL_SECONDS)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing argument: --{ARG_CODE_TTL_SECONDS}"))?;
        let max_code_attempts = matches
            .get_one::<u32>(ARG_MAX_CODE_ATTEMPTS)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing argument: --{ARG_MAX_CODE_ATTEMPTS}"))?;

        Ok(Self {
            seed_attributes,
            verifiable_attributes,
            code_ttl_seconds,
            max_code_attempts,
        })
    }
}

#[must_use]
pub fn validator_seed_attribute() -> ValueParser {
    ValueParser::from(
        move |pair: &str| -> std::result::Result<(String, String), String> {
            let Some((key, value)) = pair.split_once('=') else {
                return Err("expected key=value".to_string());
            };
            let key = key.trim();
            if key.is_empty() {
                return Err("attribute name must not be empty".to_string());
            }
            Ok((key.to_string(), value.trim().to_string()))
        },
    )
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SEED_ATTRIBUTE)
                .long(ARG_SEED_ATTRIBUTE)
                .help("Initial attribute for the in-memory provider (key=value, repeatable)")
                .env("VERITY_SEED_ATTRIBUTES")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .value_parser(validator_seed_attribute()),
        )
        .arg(
            Arg::new(ARG_VERIFIABLE_ATTRIBUTES)
                .long(ARG_VERIFIABLE_ATTRIBUTES)
                .help("Attributes whose updates require a confirmation code")
                .env("VERITY_VERIFIABLE_ATTRIBUTES")
                .value_delimiter(',')
                .default_values(["email", "phone_number"]),
        )
        .arg(
            Arg::new(ARG_CODE_TTL_SECONDS)
                .long(ARG_CODE_TTL_SECONDS)
                .help("Confirmation code lifetime in seconds")
                .env("VERITY_CODE_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_MAX_CODE_ATTEMPTS)
                .long(ARG_MAX_CODE_ATTEMPTS)
                .help("Wrong codes accepted before a pending update is locked")
                .env("VERITY_MAX_CODE_ATTEMPTS")
                .default_value("5")
                .value_parser(clap::value_parser!(u32)),
        )
}
