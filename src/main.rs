use std::process::ExitCode;

use clap::Parser;
use pg_probe::ReportError;
use pg_probe::app::{self, cli::Cli};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Logs go to stderr so stdout carries only the report.
    let default_filter = if cli.verbose {
        "pg_probe=debug"
    } else {
        "pg_probe=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match app::run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<ReportError>() {
                Some(report_err) => {
                    eprintln!("\n✗ {}!", report_err.category());
                    eprintln!("Error: {report_err}");
                    let hints = report_err.hints();
                    if !hints.is_empty() {
                        eprintln!("\nPossible issues:");
                        for (i, hint) in hints.iter().enumerate() {
                            eprintln!("{}. {hint}", i + 1);
                        }
                    }
                }
                None => eprintln!("\n✗ Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
