use clap::{Arg, ArgMatches, Command};

pub const ARG_ENTRY_TTL_SECONDS: &str = "entry-ttl-seconds";
pub const ARG_RATE_LIMIT_PER_MINUTE: &str = "rate-limit-per-minute";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub entry_ttl_seconds: u64,
    pub rate_limit_per_minute: u32,
}

impl Options {
    /// Parse workflow arguments from matches.
    ///
    /// # Errors
    /// Returns an error if an argument is missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let entry_ttl_seconds = matches
            .get_one::<u64>(ARG_ENTRY_TTL_SECONDS)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing argument: --{ARG_ENTRY_TTL_SECONDS}"))?;
        let rate_limit_per_minute = matches
            .get_one::<u32>(ARG_RATE_LIMIT_PER_MINUTE)
            .copied()
            .ok_or_else(|| anyhow::anyhow!("missing argument: --{ARG_RATE_LIMIT_PER_MINUTE}"))?;

        Ok(Self {
            entry_ttl_seconds,
            rate_limit_per_minute,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ENTRY_TTL_SECONDS)
                .long(ARG_ENTRY_TTL_SECONDS)
                .help("Seconds an untouched verification entry is kept (0 keeps entries forever)")
                .env("VERITY_ENTRY_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_RATE_LIMIT_PER_MINUTE)
                .long(ARG_RATE_LIMIT_PER_MINUTE)
                .help("Mutating requests allowed per client IP and action each minute (0 disables)")
                .env("VERITY_RATE_LIMIT_PER_MINUTE")
                .default_value("30")
                .value_parser(clap::value_parser!(u32)),
        )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        temp_env::with_vars(
            [
                ("VERITY_ENTRY_TTL_SECONDS", None::<&str>),
                ("VERITY_RATE_LIMIT_PER_MINUTE", None::<&str>),
            ],
            || {
                let matches = with_args(Command::new("verity")).get_matches_from(vec!["verity"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.entry_ttl_seconds, 86_400);
                assert_eq!(options.rate_limit_per_minute, 30);
            },
        );
    }

    #[test]
    fn from_env() {
        temp_env::with_vars(
            [
                ("VERITY_ENTRY_TTL_SECONDS", Some("0")),
                ("VERITY_RATE_LIMIT_PER_MINUTE", Some("5")),
            ],
            || {
                let matches = with_args(Command::new("verity")).get_matches_from(vec!["verity"]);
                let options = Options::parse(&matches).unwrap();
                assert_eq!(options.entry_ttl_seconds, 0);
                assert_eq!(options.rate_limit_per_minute, 5);
            },
        );
    }
}
