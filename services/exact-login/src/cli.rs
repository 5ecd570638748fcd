//! Command-line interface
//!
//! Credentials and tokens come from the environment so they never show up
//! in the process list.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "exact-login")]
#[command(about = "Authorize against Exact Online and print the resulting tokens")]
#[command(version)]
pub struct Cli {
    /// Settings file (TOML); defaults to ./exact-login.toml
    #[arg(long, global = true, env = "EXACT_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Print the authorization URL for the configured client
    Url,
    /// Browser login with EXACT_USER_NAME / EXACT_PASSWORD, print tokens
    Authorize,
    /// Exchange EXACT_REFRESH_TOKEN for new tokens
    Refresh,
    /// Check whether EXACT_ACCESS_TOKEN is accepted; exits 1 if not
    Status,
    /// Print the current division for EXACT_ACCESS_TOKEN
    Division,
    /// Configure and authorize from env, print the division and tokens
    Auto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use clap::error::ErrorKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn config_is_accepted_before_or_after_the_subcommand() {
        let before =
            Cli::try_parse_from(["exact-login", "--config", "/etc/exact.toml", "auto"]).unwrap();
        assert_eq!(before.config, Some(PathBuf::from("/etc/exact.toml")));
        assert_eq!(before.command, Command::Auto);

        let after =
            Cli::try_parse_from(["exact-login", "refresh", "--config", "/etc/exact.toml"]).unwrap();
        assert_eq!(after.config, Some(PathBuf::from("/etc/exact.toml")));
        assert_eq!(after.command, Command::Refresh);
    }

    #[test]
    fn help_is_not_a_parse_failure() {
        let err = Cli::try_parse_from(["exact-login", "--help"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DisplayHelp);
        assert_eq!(err.exit_code(), 0);
    }

    #[test]
    fn subcommand_is_required() {
        let err = Cli::try_parse_from(["exact-login"]).unwrap_err();
        assert!(
            matches!(
                err.kind(),
                ErrorKind::MissingSubcommand | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
            ),
            "got: {:?}",
            err.kind()
        );
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn unknown_subcommand_is_rejected() {
        let err = Cli::try_parse_from(["exact-login", "login"]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
    }
}
