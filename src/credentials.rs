// Credential store: a flat `KEY=value` file holding the username, password,
// user id and bearer token shared by all steps.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::artifact::write_atomic;
use crate::error::StepError;

pub const USERNAME_KEY: &str = "DEMOQA_USERNAME";
pub const PASSWORD_KEY: &str = "DEMOQA_PASSWORD";
pub const USER_ID_KEY: &str = "DEMOQA_USER_ID";
pub const TOKEN_KEY: &str = "DEMOQA_TOKEN";

const KNOWN_KEYS: [&str; 4] = [USERNAME_KEY, PASSWORD_KEY, USER_ID_KEY, TOKEN_KEY];

/// The account the steps operate on. Empty strings mean "unset".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub user_id: Option<String>,
    pub token: Option<String>,
}

impl Credentials {
    pub fn require_login(&self) -> Result<(&str, &str), StepError> {
        if self.username.is_empty() {
            return Err(StepError::MissingValue { key: USERNAME_KEY });
        }
        if self.password.is_empty() {
            return Err(StepError::MissingValue { key: PASSWORD_KEY });
        }
        Ok((&self.username, &self.password))
    }

    pub fn require_user_id(&self) -> Result<&str, StepError> {
        self.user_id
            .as_deref()
            .ok_or(StepError::MissingValue { key: USER_ID_KEY })
    }

    pub fn require_token(&self) -> Result<&str, StepError> {
        self.token
            .as_deref()
            .ok_or(StepError::MissingValue { key: TOKEN_KEY })
    }

    fn apply(&mut self, key: &str, value: &str) {
        if value.is_empty() {
            return;
        }
        match key {
            USERNAME_KEY => self.username = value.to_string(),
            PASSWORD_KEY => self.password = value.to_string(),
            USER_ID_KEY => self.user_id = Some(value.to_string()),
            TOKEN_KEY => self.token = Some(value.to_string()),
            _ => {}
        }
    }

    fn value_of(&self, key: &str) -> Option<&str> {
        let value = match key {
            USERNAME_KEY => Some(self.username.as_str()),
            PASSWORD_KEY => Some(self.password.as_str()),
            USER_ID_KEY => self.user_id.as_deref(),
            TOKEN_KEY => self.token.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.is_empty())
    }
}

/// Parse `KEY=value` lines. Blank lines, `#` comments and lines without `=`
/// are skipped. Double-quoted values are unescaped (`\\`, `\"`, `\n`, `\r`);
/// single-quoted values are taken literally; bare values are trimmed.
pub fn parse_env(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), decode_value(value.trim())))
        .collect()
}

fn decode_value(raw: &str) -> String {
    if let Some(quoted) = raw.strip_prefix('"') {
        if let Some(value) = unescape_double_quoted(quoted) {
            return value;
        }
    }
    if raw.len() >= 2 && raw.starts_with('\'') && raw.ends_with('\'') {
        return raw[1..raw.len() - 1].to_string();
    }
    raw.to_string()
}

/// Read up to the closing unescaped `"`; `None` when there is none.
fn unescape_double_quoted(quoted: &str) -> Option<String> {
    let mut value = String::with_capacity(quoted.len());
    let mut chars = quoted.chars();
    while let Some(c) = chars.next() {
        match c {
            '"' => return Some(value),
            '\\' => match chars.next()? {
                'n' => value.push('\n'),
                'r' => value.push('\r'),
                other => value.push(other),
            },
            other => value.push(other),
        }
    }
    None
}

/// Double-quote a value so `decode_value` gives it back unchanged.
fn encode_value(value: &str) -> String {
    let mut encoded = String::with_capacity(value.len() + 2);
    encoded.push('"');
    for c in value.chars() {
        match c {
            '"' => encoded.push_str("\\\""),
            '\\' => encoded.push_str("\\\\"),
            '\n' => encoded.push_str("\\n"),
            '\r' => encoded.push_str("\\r"),
            other => encoded.push(other),
        }
    }
    encoded.push('"');
    encoded
}

/// Owns the path of the credential file. A missing file is a valid
/// starting state: `load` then returns the configured defaults.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
    defaults: Credentials,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>, defaults: Credentials) -> Self {
        CredentialStore {
            path: path.into(),
            defaults,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Credentials, StepError> {
        let mut creds = self.defaults.clone();
        for (key, value) in self.read_pairs()? {
            creds.apply(&key, &value);
        }
        Ok(creds)
    }

    /// Replace the file atomically. Keys this store does not manage are
    /// carried over from the existing file in their original order.
    pub fn save(&self, creds: &Credentials) -> Result<(), StepError> {
        let mut lines: Vec<String> = self
            .read_pairs()?
            .into_iter()
            .filter(|(key, _)| !KNOWN_KEYS.contains(&key.as_str()))
            .map(|(key, value)| format!("{key}={}", encode_value(&value)))
            .collect();
        for key in KNOWN_KEYS {
            if let Some(value) = creds.value_of(key) {
                lines.push(format!("{key}={}", encode_value(value)));
            }
        }

        let mut contents = lines.join("\n");
        contents.push('\n');
        write_atomic(&self.path, contents.as_bytes())?;
        debug!(path = %self.path.display(), "saved credentials");
        Ok(())
    }

    fn read_pairs(&self) -> Result<Vec<(String, String)>, StepError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(parse_env(&contents)),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no credential file yet");
                Ok(Vec::new())
            }
            Err(err) => Err(StepError::io(&self.path, err)),
        }
    }
}
