//! `plist2json` CLI: prints every property list named on the command line as
//! one line of compact JSON.
//!
//! ```sh
//! plist2json Info.plist embedded.mobileprovision.plist
//! ```
//!
//! Inputs that cannot be read or parsed are reported on stderr and skipped;
//! the exit status is 1 if any input failed.

use anyhow::{Context, Result};
use clap::Parser;
use plist2json::{Input, JsonPolicy, convert_all};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(
    name = "plist2json",
    version,
    about = "Print binary or XML property lists as JSON"
)]
struct Cli {
    /// Property list files, converted in the order given
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_max_level(tracing::Level::WARN)
        .with_ansi(io::stderr().is_terminal())
        .with_target(false)
        .without_time()
        .init();

    let inputs: Vec<Input> = cli.files.into_iter().map(Input::from).collect();
    let mut stdout = io::stdout().lock();
    let report = convert_all(&inputs, JsonPolicy::default(), &mut stdout)
        .context("Failed to write to stdout")?;

    if report.is_success() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::FAILURE)
    }
}
