use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Dotenv file to load. Defaults to `.env` in the working directory.
    #[arg(long, global = true)]
    pub env_file: Option<PathBuf>,

    /// Server host. Falls back to POSTGRES_HOST.
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Server port. Falls back to POSTGRES_PORT.
    #[arg(short, long, global = true)]
    pub port: Option<u16>,

    /// Database name. Falls back to POSTGRES_DB.
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// User name. Falls back to POSTGRES_USER.
    #[arg(short, long, global = true)]
    pub user: Option<String>,

    /// Schema whose tables are reported. Falls back to POSTGRES_SCHEMA, then `public`.
    #[arg(short, long, global = true)]
    pub schema: Option<String>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text, global = true)]
    pub format: OutputFormat,

    /// Log every query to stderr.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Test the connection, show the server version and list tables (default).
    Check,
    /// List tables with their row counts.
    Tables,
    /// Create the configured database if it does not exist yet.
    Setup(SetupArgs),
    /// Report which notebooks and visualizations exist, then list tables.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    /// Database to connect to while the target does not exist yet.
    #[arg(long, default_value = "postgres")]
    pub maintenance_db: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Project directory to inspect.
    #[arg(long, default_value = ".")]
    pub dir: PathBuf,

    /// Expected notebook file. Repeat to replace the default list.
    #[arg(long = "notebook")]
    pub notebooks: Vec<String>,

    /// Files at or below this size are reported as not ready.
    #[arg(long, default_value_t = 1000)]
    pub min_size: u64,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_subcommand_parses() {
        let cli = Cli::try_parse_from(["pg-probe"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.format, OutputFormat::Text);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["pg-probe", "tables", "--schema", "staging", "--format", "json"])
                .unwrap();
        assert!(matches!(cli.command, Some(Command::Tables)));
        assert_eq!(cli.schema.as_deref(), Some("staging"));
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn status_collects_repeated_notebooks() {
        let cli = Cli::try_parse_from([
            "pg-probe",
            "status",
            "--notebook",
            "a.ipynb",
            "--notebook",
            "b.ipynb",
        ])
        .unwrap();
        match cli.command {
            Some(Command::Status(args)) => {
                assert_eq!(args.notebooks, vec!["a.ipynb", "b.ipynb"]);
                assert_eq!(args.min_size, 1000);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn invalid_port_is_rejected() {
        assert!(Cli::try_parse_from(["pg-probe", "--port", "not-a-port"]).is_err());
    }
}
