// Library root
// -----------
// The `demoqa` binary is a thin shell around these modules; the library
// surface exists so the pipeline can be driven against a mock API in tests.
//
// Module responsibilities:
// - `api`: HTTP calls to the bookstore API and the request/response shapes.
// - `config`: CLI flags and `DEMOQA_*` environment settings.
// - `credentials` / `artifact`: the `.env` credential store and the catalog
//   file, both replaced atomically on write.
// - `generate`: signup username/password generation.
// - `steps`: one function per pipeline step.
// - `pipeline`: the ordered step list and the halt-on-failure orchestrator.
// - `ui`: spinners and the execution summary.
pub mod api;
pub mod artifact;
pub mod config;
pub mod credentials;
pub mod error;
pub mod generate;
pub mod pipeline;
pub mod steps;
pub mod ui;

pub use api::{ApiClient, Book, BookstoreApi};
pub use config::{Cli, Settings, StepCommand};
pub use credentials::{CredentialStore, Credentials};
pub use error::{PipelineError, StepError};
pub use pipeline::{Pipeline, RunReport};
pub use steps::StepContext;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides `level`.
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("demoqa_cli={level}")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}
