// API client module: a small blocking HTTP client for the DemoQA bookstore
// API. Request and response shapes mirror the remote schema field for field
// (`userName`, `userID`, `collectionOfIsbns`, ...), since the service is not
// ours to change.
//
// Steps talk to the API through the `BookstoreApi` trait so the pipeline can
// be driven by a mock in tests.

use std::time::Duration;

use reqwest::blocking::{Client, ClientBuilder, RequestBuilder};
use reqwest::header::ACCEPT;
use reqwest::Url;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::Settings;
use crate::error::StepError;

const CREATE_USER_PATH: &str = "/Account/v1/User";
const GENERATE_TOKEN_PATH: &str = "/Account/v1/GenerateToken";
const AUTHORIZED_PATH: &str = "/Account/v1/Authorized";
const BOOKS_PATH: &str = "/BookStore/v1/Books";

/// Payload for signup, token generation and the authorization check.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    #[serde(rename = "userName")]
    pub user_name: String,
    pub password: String,
}

impl LoginRequest {
    pub fn new(user_name: &str, password: &str) -> Self {
        LoginRequest {
            user_name: user_name.to_string(),
            password: password.to_string(),
        }
    }
}

#[derive(Deserialize, Debug)]
struct CreateUserResponse {
    #[serde(rename = "userID")]
    user_id: Option<String>,
    username: Option<String>,
}

/// A successfully created account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedUser {
    pub user_id: String,
    /// Username as echoed back by the API, if it echoed one.
    pub username: Option<String>,
}

#[derive(Deserialize, Debug)]
struct TokenResponse {
    token: Option<String>,
    expires: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthorizationStatus {
    pub status: u16,
    pub authorized: bool,
}

/// A catalog entry. `isbn` and `title` are required; the entry exactly as
/// the API sent it is kept in `raw` and is what gets serialized back out.
#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub isbn: String,
    pub title: String,
    pub author: Option<String>,
    raw: Value,
}

impl Book {
    /// Build a book from a raw catalog entry, or `None` when the entry is
    /// not an object or lacks a string `isbn` and `title`.
    pub fn from_value(value: Value) -> Option<Self> {
        let fields = value.as_object()?;
        let isbn = fields.get("isbn")?.as_str()?.to_string();
        let title = fields.get("title")?.as_str()?.to_string();
        let author = fields
            .get("author")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Book {
            isbn,
            title,
            author,
            raw: value,
        })
    }

    /// Any field of the original record, including ones not modelled here.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.raw.get(key)
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }
}

impl Serialize for Book {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Book {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Book::from_value(value)
            .ok_or_else(|| D::Error::custom("book entry needs a string isbn and title"))
    }
}

/// Decode a catalog body. Accepts the `{"books": [...]}` envelope as well as
/// a bare array; malformed entries are dropped.
pub fn parse_catalog(body: &str) -> Result<Vec<Book>, serde_json::Error> {
    let payload: Value = serde_json::from_str(body)?;
    let entries = match payload {
        Value::Array(entries) => entries,
        Value::Object(mut envelope) => match envelope.remove("books") {
            Some(Value::Array(entries)) => entries,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    };
    Ok(entries.into_iter().filter_map(Book::from_value).collect())
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct IsbnRef {
    pub isbn: String,
}

/// Rental payload for `POST /BookStore/v1/Books`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AddBooksRequest {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "collectionOfIsbns")]
    pub collection_of_isbns: Vec<IsbnRef>,
}

impl AddBooksRequest {
    pub fn new(user_id: &str, isbns: &[String]) -> Self {
        AddBooksRequest {
            user_id: user_id.to_string(),
            collection_of_isbns: isbns
                .iter()
                .map(|isbn| IsbnRef { isbn: isbn.clone() })
                .collect(),
        }
    }

    pub fn isbn_list(&self) -> String {
        self.collection_of_isbns
            .iter()
            .map(|r| r.isbn.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct AddBooksResponse {
    #[serde(default)]
    pub books: Vec<IsbnRef>,
}

/// Account record from `GET /Account/v1/User/{userId}`.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UserAccount {
    #[serde(rename = "userId")]
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub books: Vec<Book>,
}

/// The remote calls the pipeline makes. Implementations map every non-2xx
/// answer to the matching `StepError` variant.
pub trait BookstoreApi {
    fn create_user(&self, login: &LoginRequest) -> Result<CreatedUser, StepError>;
    fn generate_token(&self, login: &LoginRequest) -> Result<IssuedToken, StepError>;
    fn is_authorized(
        &self,
        login: &LoginRequest,
        token: &str,
    ) -> Result<AuthorizationStatus, StepError>;
    fn list_books(&self) -> Result<Vec<Book>, StepError>;
    fn add_books(&self, token: &str, request: &AddBooksRequest)
        -> Result<AddBooksResponse, StepError>;
    fn get_user(&self, user_id: &str, token: &str) -> Result<UserAccount, StepError>;
}

/// Blocking client bound to one base URL.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
}

impl ApiClient {
    /// Build a client with a bounded per-request timeout.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, StepError> {
        let client = client_builder(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn from_settings(settings: &Settings) -> Result<Self, StepError> {
        Self::new(&settings.base_url, settings.timeout())
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        ApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// `/Account/v1/User/{userId}` with the id percent-encoded as a single
    /// path segment.
    fn account_url(&self, user_id: &str) -> Result<Url, StepError> {
        let base = self.url(CREATE_USER_PATH);
        let invalid = |reason: String| StepError::InvalidUrl {
            url: base.clone(),
            reason,
        };
        let mut url = Url::parse(&base).map_err(|err| invalid(err.to_string()))?;
        url.path_segments_mut()
            .map_err(|()| invalid("URL cannot have path segments".to_string()))?
            .push(user_id);
        Ok(url)
    }

    /// Send the request and return status plus raw body. Only
    /// connection-level failures are errors here.
    fn send(&self, method: &str, url: &str, req: RequestBuilder) -> Result<(u16, String), StepError> {
        debug!(%method, %url, "sending request");
        let res = req.header(ACCEPT, "application/json").send()?;
        let status = res.status().as_u16();
        let body = res.text()?;
        debug!(%method, %url, status, "received response");
        Ok((status, body))
    }
}

fn client_builder(timeout: Duration) -> ClientBuilder {
    Client::builder().timeout(timeout)
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

impl BookstoreApi for ApiClient {
    fn create_user(&self, login: &LoginRequest) -> Result<CreatedUser, StepError> {
        let url = self.url(CREATE_USER_PATH);
        let (status, body) = self.send("POST", &url, self.client.post(&url).json(login))?;
        if !is_success(status) {
            return Err(StepError::Signup { status, body });
        }
        match serde_json::from_str::<CreateUserResponse>(&body) {
            Ok(CreateUserResponse {
                user_id: Some(user_id),
                username,
            }) if !user_id.is_empty() => Ok(CreatedUser { user_id, username }),
            _ => Err(StepError::Signup { status, body }),
        }
    }

    fn generate_token(&self, login: &LoginRequest) -> Result<IssuedToken, StepError> {
        let url = self.url(GENERATE_TOKEN_PATH);
        let (status, body) = self.send("POST", &url, self.client.post(&url).json(login))?;
        if !is_success(status) {
            return Err(StepError::Auth { status, body });
        }
        // A wrong password still answers 200, just with a null token.
        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(TokenResponse {
                token: Some(token),
                expires,
            }) if !token.is_empty() => Ok(IssuedToken { token, expires }),
            _ => Err(StepError::Auth { status, body }),
        }
    }

    fn is_authorized(
        &self,
        login: &LoginRequest,
        token: &str,
    ) -> Result<AuthorizationStatus, StepError> {
        let url = self.url(AUTHORIZED_PATH);
        let req = self.client.post(&url).bearer_auth(token).json(login);
        let (status, body) = self.send("POST", &url, req)?;
        if !is_success(status) {
            return Err(StepError::Authorization { status, body });
        }
        match serde_json::from_str::<Value>(&body) {
            Ok(Value::Bool(authorized)) => Ok(AuthorizationStatus { status, authorized }),
            _ => Err(StepError::Authorization { status, body }),
        }
    }

    fn list_books(&self) -> Result<Vec<Book>, StepError> {
        let url = self.url(BOOKS_PATH);
        let (status, body) = self.send("GET", &url, self.client.get(&url))?;
        if !is_success(status) {
            return Err(StepError::Fetch { status, body });
        }
        let books = parse_catalog(&body).map_err(|err| StepError::Fetch {
            status,
            body: format!("response is not valid JSON ({err}): {body}"),
        })?;
        if books.is_empty() {
            return Err(StepError::Fetch {
                status,
                body: format!("no books with a valid ISBN and title: {body}"),
            });
        }
        Ok(books)
    }

    fn add_books(
        &self,
        token: &str,
        request: &AddBooksRequest,
    ) -> Result<AddBooksResponse, StepError> {
        let url = self.url(BOOKS_PATH);
        let req = self.client.post(&url).bearer_auth(token).json(request);
        let (status, body) = self.send("POST", &url, req)?;
        if !is_success(status) {
            return Err(StepError::Rental {
                isbn: request.isbn_list(),
                status: Some(status),
                body,
            });
        }
        match serde_json::from_str(&body) {
            Ok(response) => Ok(response),
            Err(err) => {
                warn!(status, error = %err, %body, "rental accepted but response body is unreadable");
                Ok(AddBooksResponse::default())
            }
        }
    }

    fn get_user(&self, user_id: &str, token: &str) -> Result<UserAccount, StepError> {
        let url = self.account_url(user_id)?;
        let req = self.client.get(url.clone()).bearer_auth(token);
        let (status, body) = self.send("GET", url.as_str(), req)?;
        if !is_success(status) {
            return Err(StepError::Account { status, body });
        }
        serde_json::from_str(&body).map_err(|_| StepError::Account { status, body })
    }
}
