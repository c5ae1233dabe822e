// Entrypoint for the CLI application.
// - No subcommand runs the whole pipeline; a subcommand runs one step.
// - Exit code is 0 only when every step that ran succeeded.

use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use demoqa_cli::pipeline::Pipeline;
use demoqa_cli::ui::{print_summary, TerminalObserver};
use demoqa_cli::{init_logging, ApiClient, Cli, StepContext};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.settings.log_level);

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("Execution failed: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<bool> {
    let api = ApiClient::from_settings(&cli.settings).context("Failed to build HTTP client")?;

    let pipeline = match cli.command {
        Some(command) => Pipeline::single(command.step_name())
            .with_context(|| format!("unknown step {}", command.step_name()))?,
        None => Pipeline::standard(),
    };

    let mut ctx = StepContext::new(&cli.settings, &api);
    let report = pipeline.run(&mut ctx, &mut TerminalObserver::new());
    print_summary(&report);
    Ok(report.is_success())
}
