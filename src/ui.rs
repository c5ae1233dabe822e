// UI layer: shows a spinner while each step talks to the API, prints the
// step's result, and finishes with an execution summary. All terminal
// output lives here; the pipeline only reports through `RunObserver`.

use std::time::Duration;

use crossterm::style::Stylize;
use indicatif::{ProgressBar, ProgressStyle};

use crate::error::StepError;
use crate::pipeline::{RunObserver, RunReport, StepDescriptor, StepReport};

const SEPARATOR_WIDTH: usize = 72;

/// Prints progress for each step to the terminal.
#[derive(Default)]
pub struct TerminalObserver {
    spinner: Option<ProgressBar>,
}

impl TerminalObserver {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunObserver for TerminalObserver {
    fn step_started(&mut self, step: &StepDescriptor) {
        println!("\n{}", "#".repeat(SEPARATOR_WIDTH));
        println!("\nRunning {}...", step.name.bold());

        // `ProgressBar::new_spinner` draws on stderr and hides itself when
        // stderr is not a terminal.
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
            spinner.set_style(style);
        }
        spinner.set_message(format!("{}...", step.name));
        spinner.enable_steady_tick(Duration::from_millis(100));
        self.spinner = Some(spinner);
    }

    fn step_finished(&mut self, report: &StepReport, error: Option<&StepError>) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
        match (&report.outcome, error) {
            (Some(outcome), _) => {
                println!("{} {}", "✓".green(), outcome.message);
                for line in &outcome.details {
                    println!("  {line}");
                }
            }
            (None, Some(err)) => println!("{} {}", "✗".red(), err),
            (None, None) => println!("{} {} failed", "✗".red(), report.step),
        }
    }
}

/// Print the per-step summary and the final verdict.
pub fn print_summary(report: &RunReport) {
    println!("\n{}", "#".repeat(SEPARATOR_WIDTH));
    println!("Execution summary:");
    for step in &report.steps {
        println!("- Step: {}", step.step);
        println!("  Duration: {:.2} seconds", step.duration.as_secs_f64());
        if step.succeeded() {
            println!("  Outcome: {}", "Success".green());
        } else {
            println!("  Outcome: {}", "Failure".red());
        }
    }

    match &report.failure {
        Some(failure) => {
            println!("  Details: {}", failure.source);
            println!("\n{}", format!("Run halted: {failure}").red().bold());
        }
        None if report.is_success() => {
            println!("\n{}", "All DemoQA steps executed successfully.".green().bold());
        }
        None => println!("\nNo steps were run."),
    }
}
