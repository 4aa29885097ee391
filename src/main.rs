use campus_tap::interfaces::cli::{self, Cli};
use campus_tap::telemetry;
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use std::io::{self, Write};
use std::process::ExitCode;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    telemetry::init();
    let cli = Cli::parse();

    let (body, code) = match cli::run(cli).await {
        Ok(body) => (body, ExitCode::SUCCESS),
        Err(e) => {
            tracing::debug!(kind = %e.kind(), "Command failed: {e}");
            (cli::failure(&e), ExitCode::from(2))
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    serde_json::to_writer_pretty(&mut out, &body).into_diagnostic()?;
    writeln!(out).into_diagnostic()?;

    Ok(code)
}
