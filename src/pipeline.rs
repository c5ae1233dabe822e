// Step sequencing. The run order is an explicit list of `StepDescriptor`s;
// each step declares what must hold before it runs and what it guarantees
// once it succeeds. The orchestrator checks both and stops at the first
// failure.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::credentials::{PASSWORD_KEY, TOKEN_KEY, USERNAME_KEY, USER_ID_KEY};
use crate::error::{PipelineError, StepError};
use crate::steps::{self, StepContext, StepOutcome};

/// State a step depends on or produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Condition {
    /// Username and password are stored.
    Login,
    UserId,
    Token,
    /// The catalog artifact exists and lists at least one book.
    Catalog,
}

impl Condition {
    pub fn check(self, ctx: &StepContext<'_>) -> Result<(), StepError> {
        match self {
            Condition::Login => ctx.credentials.load()?.require_login().map(|_| ()),
            Condition::UserId => ctx.credentials.load()?.require_user_id().map(|_| ()),
            Condition::Token => ctx.credentials.load()?.require_token().map(|_| ()),
            Condition::Catalog => {
                if ctx.catalog.load()?.is_empty() {
                    return Err(StepError::MissingValue { key: "book catalog" });
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Condition::Login => write!(f, "{USERNAME_KEY}/{PASSWORD_KEY}"),
            Condition::UserId => f.write_str(USER_ID_KEY),
            Condition::Token => f.write_str(TOKEN_KEY),
            Condition::Catalog => f.write_str("book catalog"),
        }
    }
}

pub type StepFn = fn(&mut StepContext<'_>) -> Result<StepOutcome, StepError>;

#[derive(Clone, Copy)]
pub struct StepDescriptor {
    pub name: &'static str,
    pub run: StepFn,
    pub requires: &'static [Condition],
    pub produces: &'static [Condition],
}

impl fmt::Debug for StepDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepDescriptor")
            .field("name", &self.name)
            .field("requires", &self.requires)
            .field("produces", &self.produces)
            .finish()
    }
}

/// The full run, in order.
pub const STANDARD_STEPS: [StepDescriptor; 6] = [
    StepDescriptor {
        name: "create-user",
        run: steps::create_user,
        requires: &[],
        produces: &[Condition::Login, Condition::UserId],
    },
    StepDescriptor {
        name: "generate-token",
        run: steps::generate_token,
        requires: &[Condition::Login, Condition::UserId],
        produces: &[Condition::Token],
    },
    StepDescriptor {
        name: "authorize",
        run: steps::authorize,
        requires: &[Condition::Login, Condition::Token],
        produces: &[],
    },
    StepDescriptor {
        name: "fetch-books",
        run: steps::fetch_books,
        requires: &[],
        produces: &[Condition::Catalog],
    },
    StepDescriptor {
        name: "rent-books",
        run: steps::rent_books,
        requires: &[Condition::UserId, Condition::Token, Condition::Catalog],
        produces: &[],
    },
    StepDescriptor {
        name: "verify-account",
        run: steps::verify_account,
        requires: &[Condition::UserId, Condition::Token],
        produces: &[],
    },
];

/// Hooks for progress display; the orchestrator itself prints nothing.
pub trait RunObserver {
    fn step_started(&mut self, _step: &StepDescriptor) {}
    fn step_finished(&mut self, _report: &StepReport, _error: Option<&StepError>) {}
}

#[derive(Debug, Default)]
pub struct NoopObserver;

impl RunObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct StepReport {
    pub step: &'static str,
    pub duration: Duration,
    /// `None` when the step failed.
    pub outcome: Option<StepOutcome>,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_some()
    }
}

#[derive(Debug)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
    pub failure: Option<PipelineError>,
}

impl RunReport {
    /// True when at least one step ran and none failed.
    pub fn is_success(&self) -> bool {
        self.failure.is_none() && !self.steps.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Pipeline {
    steps: Vec<StepDescriptor>,
}

impl Pipeline {
    pub fn new(steps: Vec<StepDescriptor>) -> Self {
        Pipeline { steps }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_STEPS.to_vec())
    }

    /// A pipeline holding just the named standard step.
    pub fn single(name: &str) -> Option<Self> {
        STANDARD_STEPS
            .iter()
            .find(|step| step.name == name)
            .map(|step| Self::new(vec![*step]))
    }

    pub fn steps(&self) -> &[StepDescriptor] {
        &self.steps
    }

    /// Run every step in order, stopping at the first failure.
    pub fn run(&self, ctx: &mut StepContext<'_>, observer: &mut dyn RunObserver) -> RunReport {
        let mut reports = Vec::with_capacity(self.steps.len());
        for step in &self.steps {
            observer.step_started(step);
            info!(step = step.name, "starting step");

            let start = Instant::now();
            let result = run_step(step, ctx);
            let report = StepReport {
                step: step.name,
                duration: start.elapsed(),
                outcome: result.as_ref().ok().cloned(),
            };
            observer.step_finished(&report, result.as_ref().err());
            reports.push(report);

            if let Err(source) = result {
                warn!(step = step.name, error = %source, "step failed; halting run");
                return RunReport {
                    steps: reports,
                    failure: Some(PipelineError {
                        step: step.name,
                        source,
                    }),
                };
            }
            info!(step = step.name, "step completed");
        }
        RunReport {
            steps: reports,
            failure: None,
        }
    }
}

fn run_step(step: &StepDescriptor, ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    for condition in step.requires {
        condition.check(ctx)?;
    }
    let outcome = (step.run)(ctx)?;
    for condition in step.produces {
        condition.check(ctx)?;
    }
    Ok(outcome)
}
