pub mod logging;
pub mod provider;
pub mod workflow;

use clap::{
    Arg, ColorChoice, Command,
    builder::styling::{AnsiColor, Effects, Styles},
};

pub const ARG_PORT: &str = "port";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("verity")
        .about("Account attribute verification")
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on")
                .default_value("8080")
                .env("VERITY_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed to call the API from a browser (CORS)")
                .env("VERITY_FRONTEND_BASE_URL"),
        );

    let command = workflow::with_args(command);
    let command = provider::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "verity");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("Account attribute verification".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_port_and_frontend() {
        temp_env::with_vars(
            [
                ("VERITY_PORT", None::<&str>),
                ("VERITY_FRONTEND_BASE_URL", None::<&str>),
            ],
            || {
                let matches = new().get_matches_from(vec![
                    "verity",
                    "--port",
                    "9090",
                    "--frontend-base-url",
                    "https://app.verity.dev",
                ]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9090));
                assert_eq!(
                    matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned(),
                    Some("https://app.verity.dev".to_string())
                );
            },
        );
    }

    #[test]
    fn test_port_from_env() {
        temp_env::with_var("VERITY_PORT", Some("7070"), || {
            let matches = new().get_matches_from(vec!["verity"]);
            assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(7070));
        });
    }
}
