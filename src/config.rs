// Command-line and environment configuration. Every setting can come from
// a flag or a `DEMOQA_*` environment variable; the resulting `Settings`
// value is passed explicitly to every step instead of each step reading
// files or the environment on its own.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::credentials::Credentials;

pub const DEFAULT_BASE_URL: &str = "https://demoqa.com";
pub const DEFAULT_ENV_FILE: &str = ".env";
pub const DEFAULT_BOOKS_FILE: &str = "test_books.json";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;
pub const DEFAULT_RENT_COUNT: usize = 2;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Debug, Clone, Parser)]
#[command(name = "demoqa")]
#[command(about = "Exercise the DemoQA bookstore API end to end")]
pub struct Cli {
    /// Run a single step instead of the whole pipeline.
    #[command(subcommand)]
    pub command: Option<StepCommand>,

    #[command(flatten)]
    pub settings: Settings,
}

/// One subcommand per step; none means "run them all".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Subcommand)]
pub enum StepCommand {
    /// Sign up a new user and store its credentials.
    CreateUser,
    /// Generate a bearer token for the stored user.
    GenerateToken,
    /// Check that the stored user is authorized.
    Authorize,
    /// Download the book catalog.
    FetchBooks,
    /// Add books from the catalog to the user's collection.
    RentBooks,
    /// Read the user account back.
    VerifyAccount,
}

impl StepCommand {
    /// Name of the pipeline step this subcommand runs.
    pub fn step_name(self) -> &'static str {
        match self {
            StepCommand::CreateUser => "create-user",
            StepCommand::GenerateToken => "generate-token",
            StepCommand::Authorize => "authorize",
            StepCommand::FetchBooks => "fetch-books",
            StepCommand::RentBooks => "rent-books",
            StepCommand::VerifyAccount => "verify-account",
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct Settings {
    /// Base URL of the bookstore API.
    #[arg(long, env = "DEMOQA_BASE_URL", default_value = DEFAULT_BASE_URL, global = true)]
    pub base_url: String,

    /// Credential file shared by all steps.
    #[arg(long, env = "DEMOQA_ENV_FILE", default_value = DEFAULT_ENV_FILE, global = true)]
    pub env_file: PathBuf,

    /// Catalog artifact written by `fetch-books`.
    #[arg(long, env = "DEMOQA_BOOKS_FILE", default_value = DEFAULT_BOOKS_FILE, global = true)]
    pub books_file: PathBuf,

    /// Per-request timeout in seconds.
    #[arg(long, env = "DEMOQA_TIMEOUT_SECS", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    pub timeout_secs: u64,

    /// How many random books to rent when no `--isbn` is given.
    #[arg(long, env = "DEMOQA_RENT_COUNT", default_value_t = DEFAULT_RENT_COUNT, global = true)]
    pub rent_count: usize,

    /// Rent exactly these ISBNs (repeatable or comma separated).
    #[arg(long = "isbn", env = "DEMOQA_RENT_ISBNS", value_delimiter = ',', global = true)]
    pub isbns: Vec<String>,

    /// Username to sign up with; generated when omitted.
    #[arg(long, env = "DEMOQA_SIGNUP_USERNAME", global = true)]
    pub signup_username: Option<String>,

    /// Password to sign up with; generated when omitted.
    #[arg(long, env = "DEMOQA_SIGNUP_PASSWORD", hide_env_values = true, global = true)]
    pub signup_password: Option<String>,

    #[arg(long, env = "DEMOQA_USERNAME", global = true)]
    pub username: Option<String>,

    #[arg(long, env = "DEMOQA_PASSWORD", hide_env_values = true, global = true)]
    pub password: Option<String>,

    #[arg(long, env = "DEMOQA_USER_ID", global = true)]
    pub user_id: Option<String>,

    #[arg(long, env = "DEMOQA_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Log level (error, warn, info, debug, trace). `RUST_LOG` takes precedence.
    #[arg(long, env = "DEMOQA_LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL, global = true)]
    pub log_level: String,
}

/// How the rental step picks books.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IsbnSelection {
    Explicit(Vec<String>),
    Random(usize),
}

impl Settings {
    /// Defaults rooted in `dir`: both artifacts live inside it.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Settings {
            base_url: DEFAULT_BASE_URL.to_string(),
            env_file: dir.join(DEFAULT_ENV_FILE),
            books_file: dir.join(DEFAULT_BOOKS_FILE),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            rent_count: DEFAULT_RENT_COUNT,
            isbns: Vec::new(),
            signup_username: None,
            signup_password: None,
            username: None,
            password: None,
            user_id: None,
            token: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Credentials from flags/environment; the credential file is layered on top.
    pub fn credential_defaults(&self) -> Credentials {
        Credentials {
            username: self.username.clone().unwrap_or_default(),
            password: self.password.clone().unwrap_or_default(),
            user_id: self.user_id.clone().filter(|v| !v.is_empty()),
            token: self.token.clone().filter(|v| !v.is_empty()),
        }
    }

    pub fn isbn_selection(&self) -> IsbnSelection {
        let explicit: Vec<String> = self
            .isbns
            .iter()
            .map(|isbn| isbn.trim().to_string())
            .filter(|isbn| !isbn.is_empty())
            .collect();
        if explicit.is_empty() {
            IsbnSelection::Random(self.rent_count)
        } else {
            IsbnSelection::Explicit(explicit)
        }
    }
}
