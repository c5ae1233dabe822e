// Error types shared by every step. Each HTTP-facing variant keeps the
// status code and raw response body of the failing call so the summary
// printed to the user can show exactly what the remote API answered.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Everything a single step can fail with.
#[derive(Error, Debug)]
pub enum StepError {
    /// A local artifact a step depends on does not exist.
    #[error("required file not found: {}", .path.display())]
    MissingFile { path: PathBuf },

    /// A credential field a step depends on is unset.
    #[error("{key} is not set; run the step that produces it first")]
    MissingValue { key: &'static str },

    #[error("signup failed (status {status}): {body}")]
    Signup { status: u16, body: String },

    #[error("token generation failed (status {status}): {body}")]
    Auth { status: u16, body: String },

    #[error("authorization check failed (status {status}): {body}")]
    Authorization { status: u16, body: String },

    #[error("fetching books failed (status {status}): {body}")]
    Fetch { status: u16, body: String },

    #[error("renting {isbn} failed{}: {body}", status_suffix(.status))]
    Rental {
        isbn: String,
        status: Option<u16>,
        body: String,
    },

    #[error("account lookup failed (status {status}): {body}")]
    Account { status: u16, body: String },

    /// The configured base URL cannot address an API path.
    #[error("invalid API URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Connection-level failure: DNS, refused connection, timeout.
    #[error("HTTP request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A local artifact exists but could not be decoded.
    #[error("could not parse {}: {source}", .path.display())]
    Artifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StepError {
    /// HTTP status of the failing call, when there was one.
    pub fn status(&self) -> Option<u16> {
        match self {
            StepError::Signup { status, .. }
            | StepError::Auth { status, .. }
            | StepError::Authorization { status, .. }
            | StepError::Fetch { status, .. }
            | StepError::Account { status, .. } => Some(*status),
            StepError::Rental { status, .. } => *status,
            StepError::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StepError::Io {
            path: path.into(),
            source,
        }
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {code})"),
        None => String::new(),
    }
}

/// A step error tagged with the name of the step that produced it.
#[derive(Error, Debug)]
#[error("step `{step}` failed: {source}")]
pub struct PipelineError {
    pub step: &'static str,
    #[source]
    pub source: StepError,
}
