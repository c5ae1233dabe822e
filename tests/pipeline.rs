// End-to-end pipeline runs against an in-memory bookstore.

use std::cell::{Cell, RefCell};
use std::fs;
use std::path::Path;

use demoqa_cli::api::{
    AddBooksRequest, AddBooksResponse, AuthorizationStatus, Book, BookstoreApi, CreatedUser,
    IssuedToken, LoginRequest, UserAccount,
};
use demoqa_cli::config::Settings;
use demoqa_cli::generate::FixedCredentials;
use demoqa_cli::pipeline::{NoopObserver, Pipeline};
use demoqa_cli::steps::{self, StepContext};
use demoqa_cli::StepError;
use serde_json::json;
use tempfile::tempdir;

/// Scripted API. `fail_*` fields hold a status code the endpoint answers
/// with instead of succeeding.
#[derive(Default)]
struct MockApi {
    catalog: Vec<Book>,
    fail_signup: Option<u16>,
    fail_token: Option<u16>,
    authorized: Option<bool>,
    rejected_isbns: Vec<String>,

    signup_calls: Cell<usize>,
    token_calls: Cell<usize>,
    authorize_calls: Cell<usize>,
    books_calls: Cell<usize>,
    rent_calls: Cell<usize>,
    account_calls: Cell<usize>,
    rented: RefCell<Vec<String>>,
    last_login: RefCell<Option<LoginRequest>>,
}

impl MockApi {
    fn with_catalog(books: serde_json::Value) -> Self {
        MockApi {
            catalog: demoqa_cli::api::parse_catalog(&books.to_string()).unwrap(),
            ..Default::default()
        }
    }

    fn calls(&self) -> [usize; 6] {
        [
            self.signup_calls.get(),
            self.token_calls.get(),
            self.authorize_calls.get(),
            self.books_calls.get(),
            self.rent_calls.get(),
            self.account_calls.get(),
        ]
    }
}

fn bump(counter: &Cell<usize>) {
    counter.set(counter.get() + 1);
}

impl BookstoreApi for MockApi {
    fn create_user(&self, login: &LoginRequest) -> Result<CreatedUser, StepError> {
        bump(&self.signup_calls);
        *self.last_login.borrow_mut() = Some(login.clone());
        if let Some(status) = self.fail_signup {
            return Err(StepError::Signup {
                status,
                body: r#"{"code":"1204","message":"User exists!"}"#.into(),
            });
        }
        Ok(CreatedUser {
            user_id: "u1".into(),
            username: Some(login.user_name.clone()),
        })
    }

    fn generate_token(&self, login: &LoginRequest) -> Result<IssuedToken, StepError> {
        bump(&self.token_calls);
        *self.last_login.borrow_mut() = Some(login.clone());
        if let Some(status) = self.fail_token {
            return Err(StepError::Auth {
                status,
                body: "User authorization failed.".into(),
            });
        }
        Ok(IssuedToken {
            token: format!("token-for-{}", login.user_name),
            expires: Some("2026-10-26T00:00:00.000Z".into()),
        })
    }

    fn is_authorized(
        &self,
        _login: &LoginRequest,
        _token: &str,
    ) -> Result<AuthorizationStatus, StepError> {
        bump(&self.authorize_calls);
        Ok(AuthorizationStatus {
            status: 200,
            authorized: self.authorized.unwrap_or(true),
        })
    }

    fn list_books(&self) -> Result<Vec<Book>, StepError> {
        bump(&self.books_calls);
        Ok(self.catalog.clone())
    }

    fn add_books(
        &self,
        _token: &str,
        request: &AddBooksRequest,
    ) -> Result<AddBooksResponse, StepError> {
        bump(&self.rent_calls);
        for item in &request.collection_of_isbns {
            if self.rejected_isbns.contains(&item.isbn) {
                return Err(StepError::Rental {
                    isbn: item.isbn.clone(),
                    status: Some(400),
                    body: "ISBN already present in the User's Collection!".into(),
                });
            }
        }
        self.rented
            .borrow_mut()
            .extend(request.collection_of_isbns.iter().map(|i| i.isbn.clone()));
        Ok(AddBooksResponse {
            books: request.collection_of_isbns.clone(),
        })
    }

    fn get_user(&self, user_id: &str, _token: &str) -> Result<UserAccount, StepError> {
        bump(&self.account_calls);
        let rented = self.rented.borrow();
        Ok(UserAccount {
            user_id: user_id.to_string(),
            username: "alice".into(),
            books: self
                .catalog
                .iter()
                .filter(|book| rented.contains(&book.isbn))
                .cloned()
                .collect(),
        })
    }
}

fn fixed() -> FixedCredentials {
    FixedCredentials {
        username: "alice".into(),
        password: "Secret1!".into(),
    }
}

fn settings(dir: &Path) -> Settings {
    let mut settings = Settings::in_dir(dir);
    settings.rent_count = 1;
    settings
}

fn one_book_catalog() -> serde_json::Value {
    json!([{ "isbn": "978-1", "title": "T1" }])
}

#[test]
fn full_run_succeeds_and_persists_everything() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi::with_catalog(one_book_catalog());
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    let report = Pipeline::standard().run(&mut ctx, &mut NoopObserver);

    assert!(report.is_success(), "{:?}", report.failure);
    assert_eq!(report.steps.len(), 6);
    assert_eq!(api.calls(), [1, 1, 1, 1, 1, 1]);

    let creds = ctx.credentials.load().unwrap();
    assert_eq!(creds.username, "alice");
    assert_eq!(creds.password, "Secret1!");
    assert_eq!(creds.user_id.as_deref(), Some("u1"));
    assert_eq!(creds.token.as_deref(), Some("token-for-alice"));
    assert_eq!(*api.rented.borrow(), vec!["978-1".to_string()]);

    let verify = report.steps[5].outcome.as_ref().unwrap();
    assert_eq!(verify.message, "account alice holds 1 books");
}

#[test]
fn signup_stores_user_id_and_credentials() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi::default();
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    steps::create_user(&mut ctx).unwrap();

    let creds = ctx.credentials.load().unwrap();
    assert_eq!(creds.user_id.as_deref(), Some("u1"));
    assert_eq!(creds.username, "alice");
    assert_eq!(creds.password, "Secret1!");
    let sent = api.last_login.borrow().clone().unwrap();
    assert_eq!(sent, LoginRequest::new("alice", "Secret1!"));
}

#[test]
fn signup_prefers_configured_credentials_and_clears_stale_token() {
    let dir = tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.signup_username = Some("bob".into());
    fs::write(&settings.env_file, "DEMOQA_TOKEN=old\n").unwrap();
    let api = MockApi::default();
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    steps::create_user(&mut ctx).unwrap();

    let creds = ctx.credentials.load().unwrap();
    assert_eq!(creds.username, "bob");
    assert_eq!(creds.password, "Secret1!");
    assert_eq!(creds.token, None);
}

#[test]
fn token_rejection_halts_the_run() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi {
        fail_token: Some(401),
        ..MockApi::with_catalog(one_book_catalog())
    };
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    let report = Pipeline::standard().run(&mut ctx, &mut NoopObserver);

    assert!(!report.is_success());
    let failure = report.failure.as_ref().unwrap();
    assert_eq!(failure.step, "generate-token");
    assert!(matches!(failure.source, StepError::Auth { status: 401, .. }));
    assert_eq!(failure.source.status(), Some(401));
    assert_eq!(api.calls(), [1, 1, 0, 0, 0, 0]);
    assert_eq!(report.steps.len(), 2);
    assert!(!report.steps[1].succeeded());
}

#[test]
fn signup_failure_stops_before_anything_else() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi {
        fail_signup: Some(406),
        ..Default::default()
    };
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    let report = Pipeline::standard().run(&mut ctx, &mut NoopObserver);

    assert_eq!(report.failure.as_ref().unwrap().step, "create-user");
    assert_eq!(api.calls(), [1, 0, 0, 0, 0, 0]);
    assert!(!settings.env_file.exists());
}

#[test]
fn explicit_false_authorization_halts_the_run() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi {
        authorized: Some(false),
        ..MockApi::with_catalog(one_book_catalog())
    };
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    let report = Pipeline::standard().run(&mut ctx, &mut NoopObserver);

    let failure = report.failure.unwrap();
    assert_eq!(failure.step, "authorize");
    assert!(matches!(failure.source, StepError::Authorization { .. }));
    assert_eq!(api.calls(), [1, 1, 1, 0, 0, 0]);
}

#[test]
fn token_step_refuses_to_run_without_a_user_id() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    fs::write(
        &settings.env_file,
        "DEMOQA_USERNAME=alice\nDEMOQA_PASSWORD=Secret1!\n",
    )
    .unwrap();
    let api = MockApi::default();
    let mut ctx = StepContext::new(&settings, &api);

    let report = Pipeline::single("generate-token")
        .unwrap()
        .run(&mut ctx, &mut NoopObserver);

    let failure = report.failure.unwrap();
    assert!(matches!(
        failure.source,
        StepError::MissingValue { key: "DEMOQA_USER_ID" }
    ));
    assert_eq!(api.token_calls.get(), 0);
}

#[test]
fn environment_defaults_are_overridden_by_the_file() {
    let dir = tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.username = Some("env-user".into());
    settings.password = Some("env-pass".into());
    settings.user_id = Some("env-id".into());
    fs::write(&settings.env_file, "DEMOQA_USERNAME=file-user\n").unwrap();
    let api = MockApi::default();
    let mut ctx = StepContext::new(&settings, &api);

    steps::generate_token(&mut ctx).unwrap();

    let sent = api.last_login.borrow().clone().unwrap();
    assert_eq!(sent, LoginRequest::new("file-user", "env-pass"));
    assert_eq!(
        ctx.credentials.load().unwrap().token.as_deref(),
        Some("token-for-file-user")
    );
}

#[test]
fn fetching_twice_writes_identical_bytes() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi::with_catalog(json!({
        "books": [
            { "isbn": "978-2", "title": "T2", "author": "A", "pages": 200, "website": "http://x" },
            { "isbn": "978-1", "title": "T1" }
        ]
    }));
    let mut ctx = StepContext::new(&settings, &api);

    steps::fetch_books(&mut ctx).unwrap();
    let first = fs::read(&settings.books_file).unwrap();
    steps::fetch_books(&mut ctx).unwrap();
    let second = fs::read(&settings.books_file).unwrap();

    assert_eq!(first, second);
    assert_eq!(api.books_calls.get(), 2);
}

#[test]
fn catalog_artifact_holds_exactly_the_fetched_record_and_rents_it() {
    let dir = tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.isbns = vec!["978-1".into()];
    fs::write(
        &settings.env_file,
        "DEMOQA_USERNAME=alice\nDEMOQA_PASSWORD=Secret1!\nDEMOQA_USER_ID=u1\nDEMOQA_TOKEN=t\n",
    )
    .unwrap();
    let api = MockApi::with_catalog(one_book_catalog());
    let mut ctx = StepContext::new(&settings, &api);

    steps::fetch_books(&mut ctx).unwrap();
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&settings.books_file).unwrap()).unwrap();
    assert_eq!(written, one_book_catalog());

    let outcome = steps::rent_books(&mut ctx).unwrap();
    assert_eq!(outcome.message, "rented 1 books");
    assert_eq!(outcome.details, vec!["ISBN: 978-1 | Title: T1 | Author: <no author provided>"]);
    assert_eq!(*api.rented.borrow(), vec!["978-1".to_string()]);
}

#[test]
fn renting_an_unknown_isbn_fails_without_touching_credentials() {
    let dir = tempdir().unwrap();
    let mut settings = settings(dir.path());
    settings.isbns = vec!["999-9".into()];
    let env = "DEMOQA_USERNAME=alice\nDEMOQA_PASSWORD=Secret1!\nDEMOQA_USER_ID=u1\nDEMOQA_TOKEN=t\n";
    fs::write(&settings.env_file, env).unwrap();
    let api = MockApi::with_catalog(one_book_catalog());
    let mut ctx = StepContext::new(&settings, &api);
    steps::fetch_books(&mut ctx).unwrap();

    let report = Pipeline::single("rent-books")
        .unwrap()
        .run(&mut ctx, &mut NoopObserver);

    let failure = report.failure.unwrap();
    match failure.source {
        StepError::Rental { isbn, status, .. } => {
            assert_eq!(isbn, "999-9");
            assert_eq!(status, None);
        }
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(api.rent_calls.get(), 0);
    assert_eq!(fs::read_to_string(&settings.env_file).unwrap(), env);
}

#[test]
fn remote_rental_rejection_surfaces_status() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    let api = MockApi {
        rejected_isbns: vec!["978-1".into()],
        ..MockApi::with_catalog(one_book_catalog())
    };
    let mut ctx = StepContext::new(&settings, &api).with_generator(fixed());

    let report = Pipeline::standard().run(&mut ctx, &mut NoopObserver);

    let failure = report.failure.unwrap();
    assert_eq!(failure.step, "rent-books");
    assert_eq!(failure.source.status(), Some(400));
    assert_eq!(api.calls(), [1, 1, 1, 1, 1, 0]);
}

#[test]
fn renting_without_a_catalog_is_a_missing_file() {
    let dir = tempdir().unwrap();
    let settings = settings(dir.path());
    fs::write(&settings.env_file, "DEMOQA_USER_ID=u1\nDEMOQA_TOKEN=t\n").unwrap();
    let api = MockApi::default();
    let mut ctx = StepContext::new(&settings, &api);

    let report = Pipeline::single("rent-books")
        .unwrap()
        .run(&mut ctx, &mut NoopObserver);

    assert!(matches!(
        report.failure.unwrap().source,
        StepError::MissingFile { .. }
    ));
    assert_eq!(api.rent_calls.get(), 0);
}
