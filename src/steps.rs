// The individual pipeline steps. Each one makes a single API call through
// `StepContext::api` and persists what it learned through the context's
// credential store or catalog artifact. No step reads files or the
// environment on its own.

use std::collections::HashSet;

use rand::seq::IndexedRandom;
use rand::Rng;
use tracing::info;

use crate::api::{AddBooksRequest, Book, BookstoreApi, LoginRequest};
use crate::artifact::CatalogArtifact;
use crate::config::{IsbnSelection, Settings};
use crate::credentials::CredentialStore;
use crate::error::StepError;
use crate::generate::{CredentialGenerator, RandomCredentials};

/// Everything a step may touch.
pub struct StepContext<'a> {
    pub settings: &'a Settings,
    pub api: &'a dyn BookstoreApi,
    pub credentials: CredentialStore,
    pub catalog: CatalogArtifact,
    pub generator: Box<dyn CredentialGenerator + 'a>,
}

impl<'a> StepContext<'a> {
    pub fn new(settings: &'a Settings, api: &'a dyn BookstoreApi) -> Self {
        StepContext {
            settings,
            api,
            credentials: CredentialStore::new(&settings.env_file, settings.credential_defaults()),
            catalog: CatalogArtifact::new(&settings.books_file),
            generator: Box::new(RandomCredentials),
        }
    }

    pub fn with_generator(mut self, generator: impl CredentialGenerator + 'a) -> Self {
        self.generator = Box::new(generator);
        self
    }
}

/// What a successful step reports back to the user.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutcome {
    pub message: String,
    pub details: Vec<String>,
}

impl StepOutcome {
    fn new(message: impl Into<String>) -> Self {
        StepOutcome {
            message: message.into(),
            details: Vec::new(),
        }
    }

    fn with_details(mut self, details: Vec<String>) -> Self {
        self.details = details;
        self
    }
}

/// Sign up a new account and store its username, password and id.
pub fn create_user(ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    let username = match &ctx.settings.signup_username {
        Some(name) => name.clone(),
        None => ctx.generator.username(),
    };
    let password = match &ctx.settings.signup_password {
        Some(password) => password.clone(),
        None => ctx.generator.password(),
    };
    info!(%username, "creating user");

    let created = ctx.api.create_user(&LoginRequest::new(&username, &password))?;

    let mut creds = ctx.credentials.load()?;
    creds.username = created.username.unwrap_or(username);
    creds.password = password;
    creds.user_id = Some(created.user_id.clone());
    // A token belongs to the previous account.
    creds.token = None;
    ctx.credentials.save(&creds)?;

    Ok(StepOutcome::new(format!("created user {}", creds.username)).with_details(vec![
        format!("userID: {}", created.user_id),
        format!("credentials saved to {}", ctx.credentials.path().display()),
    ]))
}

/// Exchange the stored username/password for a bearer token.
pub fn generate_token(ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    let mut creds = ctx.credentials.load()?;
    let (username, password) = creds.require_login()?;
    let issued = ctx.api.generate_token(&LoginRequest::new(username, password))?;

    creds.token = Some(issued.token);
    ctx.credentials.save(&creds)?;

    let mut outcome = StepOutcome::new("retrieved and saved token");
    if let Some(expires) = issued.expires {
        outcome.details.push(format!("expires: {expires}"));
    }
    Ok(outcome)
}

/// Ask the API whether the stored credentials are authorized.
pub fn authorize(ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    let creds = ctx.credentials.load()?;
    let (username, password) = creds.require_login()?;
    let token = creds.require_token()?;

    let check = ctx
        .api
        .is_authorized(&LoginRequest::new(username, password), token)?;
    if !check.authorized {
        return Err(StepError::Authorization {
            status: check.status,
            body: format!("user {username} is not authorized"),
        });
    }
    Ok(StepOutcome::new(format!("user {username} is authorized")))
}

/// Download the catalog and write it to the catalog artifact.
pub fn fetch_books(ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    let books = ctx.api.list_books()?;
    ctx.catalog.save(&books)?;

    let details = books.iter().map(describe_book).collect();
    Ok(StepOutcome::new(format!(
        "saved {} books to {}",
        books.len(),
        ctx.catalog.path().display()
    ))
    .with_details(details))
}

/// Add books from the fetched catalog to the user's collection.
pub fn rent_books(ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    let creds = ctx.credentials.load()?;
    let user_id = creds.require_user_id()?;
    let token = creds.require_token()?;
    let catalog = ctx.catalog.load()?;

    let selected = select_books(&catalog, &ctx.settings.isbn_selection(), &mut rand::rng())?;
    let isbns: Vec<String> = selected.iter().map(|book| book.isbn.clone()).collect();
    let request = AddBooksRequest::new(user_id, &isbns);
    info!(isbns = %request.isbn_list(), "renting books");

    let response = ctx.api.add_books(token, &request)?;
    info!(added = response.books.len(), "rental accepted");

    let details = selected.iter().map(|book| describe_book(book)).collect();
    Ok(StepOutcome::new(format!("rented {} books", selected.len())).with_details(details))
}

/// Read the account back and list what is in its collection.
pub fn verify_account(ctx: &mut StepContext<'_>) -> Result<StepOutcome, StepError> {
    let creds = ctx.credentials.load()?;
    let user_id = creds.require_user_id()?;
    let token = creds.require_token()?;

    let account = ctx.api.get_user(user_id, token)?;
    let details = account.books.iter().map(describe_book).collect();
    Ok(StepOutcome::new(format!(
        "account {} holds {} books",
        account.username,
        account.books.len()
    ))
    .with_details(details))
}

/// Pick the books to rent. Explicit ISBNs must all be present in the
/// catalog; a random selection draws distinct books.
pub fn select_books<'c, R: Rng + ?Sized>(
    catalog: &'c [Book],
    selection: &IsbnSelection,
    rng: &mut R,
) -> Result<Vec<&'c Book>, StepError> {
    match selection {
        IsbnSelection::Explicit(isbns) => {
            let mut seen = HashSet::new();
            isbns
                .iter()
                .filter(|isbn| seen.insert(*isbn))
                .map(|isbn| {
                    catalog
                        .iter()
                        .find(|book| &book.isbn == isbn)
                        .ok_or_else(|| StepError::Rental {
                            isbn: isbn.clone(),
                            status: None,
                            body: "ISBN is not in the fetched catalog".to_string(),
                        })
                })
                .collect()
        }
        IsbnSelection::Random(count) => {
            if *count == 0 || *count > catalog.len() {
                return Err(StepError::Rental {
                    isbn: format!("{count} books"),
                    status: None,
                    body: format!("catalog holds {} books", catalog.len()),
                });
            }
            Ok(catalog.choose_multiple(rng, *count).collect())
        }
    }
}

fn describe_book(book: &Book) -> String {
    let author = book.author.as_deref().map(str::trim).unwrap_or_default();
    let author = if author.is_empty() {
        "<no author provided>"
    } else {
        author
    };
    format!("ISBN: {} | Title: {} | Author: {}", book.isbn, book.title, author)
}
