//! Command-line driver for the dockconf configuration engine.

use std::path::PathBuf;

use clap::{Args, ColorChoice, Parser, Subcommand, ValueEnum};
use dockconf_config::Deployment;
use dockconf_telemetry::{DEFAULT_LOG_LEVEL, LogFormat, LoggingConfig, init_logging};

use crate::commands::listing::handle_list;
use crate::commands::secrets::handle_provide;
use crate::commands::values::{handle_delete, handle_generate, handle_get, handle_set};
use crate::context::CliResult;

const DEFAULT_GENERATED_LENGTH: usize = 32;

/// Parses CLI arguments, installs logging and executes the requested command.
/// Returns the process exit code.
#[must_use]
pub fn run() -> i32 {
    let cli = Cli::parse();
    let logging = LoggingConfig {
        level: &cli.global.log_level,
        format: cli.global.log_format.into(),
    };
    if let Err(err) = init_logging(&logging) {
        eprintln!("warning: {err}");
    }

    match dispatch(cli) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("error: {}", err.display_message());
            err.exit_code()
        }
    }
}

pub(crate) fn dispatch(cli: Cli) -> CliResult<()> {
    let global = &cli.global;
    match cli.command {
        Command::Get(args) => handle_get(global, &args),
        Command::Set(args) => handle_set(global, &args),
        Command::Delete(args) => handle_delete(global, &args),
        Command::List(args) => handle_list(global, &args),
        Command::Provide(args) => handle_provide(global, &args),
        Command::Generate(args) => handle_generate(global, &args),
    }
}

#[derive(Parser)]
#[command(
    name = "dockconf",
    about = "Manage layered service configuration and provisioned secrets"
)]
pub(crate) struct Cli {
    #[command(flatten)]
    pub(crate) global: GlobalArgs,
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Args)]
pub(crate) struct GlobalArgs {
    #[arg(long, global = true, help = "Enable operations that modify configuration")]
    pub(crate) root: bool,
    #[arg(
        long,
        global = true,
        help = "Config module: a declaration file or a name looked up in the project directory"
    )]
    pub(crate) module: Option<String>,
    #[arg(long, global = true)]
    pub(crate) env_file: Option<PathBuf>,
    #[arg(long, global = true)]
    pub(crate) secret_file: Option<PathBuf>,
    #[arg(long, global = true)]
    pub(crate) secret_dir: Option<PathBuf>,
    #[arg(long, global = true, default_value = ".")]
    pub(crate) project_dir: PathBuf,
    #[arg(
        long,
        global = true,
        value_enum,
        help = "Override deployment detection (a `.git` directory means development)"
    )]
    pub(crate) deployment: Option<DeploymentArg>,
    #[arg(
        long = "output",
        alias = "format",
        global = true,
        value_enum,
        default_value_t = OutputFormat::Table,
        help = "Select output format for commands that render structured data"
    )]
    pub(crate) output: OutputFormat,
    #[arg(long, global = true, default_value = DEFAULT_LOG_LEVEL)]
    pub(crate) log_level: String,
    #[arg(long, global = true, value_enum, default_value_t = LogFormatArg::Pretty)]
    pub(crate) log_format: LogFormatArg,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Print the value of a config.
    Get(GetArgs),
    /// Store a config value.
    Set(SetArgs),
    /// Remove a stored config value.
    Delete(DeleteArgs),
    /// List every config with its state.
    List(ListArgs),
    /// Write a consumer's secrets into the secret directory.
    Provide(ProvideArgs),
    /// Store a random value in a string config.
    Generate(GenerateArgs),
}

#[derive(Args)]
pub(crate) struct GetArgs {
    pub(crate) name: String,
}

#[derive(Args)]
pub(crate) struct SetArgs {
    pub(crate) name: String,
    #[arg(required_unless_present = "from_file", conflicts_with = "from_file")]
    pub(crate) value: Option<String>,
    #[arg(long, help = "Read the value from a file (one trailing newline is dropped)")]
    pub(crate) from_file: Option<PathBuf>,
    #[arg(long, help = "Fail instead of overwriting an existing value")]
    pub(crate) safe: bool,
}

#[derive(Args)]
pub(crate) struct DeleteArgs {
    pub(crate) name: String,
}

#[derive(Args)]
pub(crate) struct ListArgs {
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    pub(crate) color: ColorChoice,
}

#[derive(Args)]
pub(crate) struct ProvideArgs {
    pub(crate) consumer: String,
}

#[derive(Args)]
pub(crate) struct GenerateArgs {
    pub(crate) name: String,
    #[arg(long, default_value_t = DEFAULT_GENERATED_LENGTH)]
    pub(crate) length: usize,
    #[arg(long, help = "Fail instead of overwriting an existing value")]
    pub(crate) safe: bool,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    #[default]
    Table,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum DeploymentArg {
    Development,
    Production,
}

impl From<DeploymentArg> for Deployment {
    fn from(value: DeploymentArg) -> Self {
        match value {
            DeploymentArg::Development => Self::Development,
            DeploymentArg::Production => Self::Production,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub(crate) enum LogFormatArg {
    Pretty,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Pretty => Self::Pretty,
            LogFormatArg::Json => Self::Json,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("dockconf").chain(args.iter().copied()))
    }

    #[test]
    fn global_flags_are_accepted_after_the_subcommand() -> Result<(), clap::Error> {
        let cli = parse(&["get", "DB_PASSWORD", "--root", "--env-file", "/tmp/.env"])?;
        assert!(cli.global.root);
        assert_eq!(cli.global.env_file, Some(PathBuf::from("/tmp/.env")));
        assert_eq!(cli.global.output, OutputFormat::Table);
        assert!(matches!(cli.command, Command::Get(GetArgs { ref name }) if name == "DB_PASSWORD"));
        Ok(())
    }

    #[test]
    fn set_requires_exactly_one_value_source() {
        assert!(parse(&["set", "A"]).is_err());
        assert!(parse(&["set", "A", "v", "--from-file", "/tmp/v"]).is_err());
        assert!(parse(&["set", "A", "--from-file", "/tmp/v", "--safe"]).is_ok());
        assert!(parse(&["set", "A", "v"]).is_ok());
    }

    #[test]
    fn list_and_generate_defaults() -> Result<(), clap::Error> {
        let cli = parse(&["list", "--output", "json", "--color", "never"])?;
        assert_eq!(cli.global.output, OutputFormat::Json);
        assert!(matches!(
            cli.command,
            Command::List(ListArgs {
                color: ColorChoice::Never
            })
        ));

        let cli = parse(&["generate", "TOKEN"])?;
        assert!(matches!(
            cli.command,
            Command::Generate(GenerateArgs { length: DEFAULT_GENERATED_LENGTH, safe: false, .. })
        ));
        Ok(())
    }

    #[test]
    fn logging_flags_map_onto_telemetry() -> Result<(), clap::Error> {
        let cli = parse(&["--log-format", "json", "--log-level", "debug", "list"])?;
        assert_eq!(LogFormat::from(cli.global.log_format), LogFormat::Json);
        assert_eq!(cli.global.log_level, "debug");
        assert_eq!(
            Deployment::from(DeploymentArg::Development),
            Deployment::Development
        );
        Ok(())
    }
}
