use crate::config::{Settings, build_app_state};
use crate::mail::MemoryMailer;
use crate::router::create_router;
use crate::schemas::AppState;
use auth::Argon2Hasher;
use axum::http::{HeaderName, HeaderValue, header::AUTHORIZATION};
use axum_test::TestServer;
use migration::{Migrator, MigratorTrait};
use model::entities::user;
use sea_orm::{ActiveModelTrait, Database, DatabaseConnection, Set};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Password accepted by the default policy.
pub const TEST_PASSWORD: &str = "a2d4g6rr";

/// Running test server together with the state behind it.
pub struct TestApp {
    pub server: TestServer,
    pub state: AppState,
    pub mailer: MemoryMailer,
    _tracing: tracing::subscriber::DefaultGuard,
}

/// Create an in-memory SQLite database for testing
pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("Failed to connect to in-memory database");

    Migrator::up(&db, None)
        .await
        .expect("Failed to run migrations");

    db
}

pub fn test_settings() -> Settings {
    Settings {
        secret_key: "test-secret-key-12345".to_string(),
        ..Default::default()
    }
}

/// Create AppState for testing, with a cheap hasher and an in-memory outbox.
pub async fn setup_test_app_state(settings: Settings) -> (AppState, MemoryMailer) {
    let db = setup_test_db().await;
    let hasher = Argon2Hasher::with_params(8, 1, 1).expect("Invalid test hasher parameters");
    let mailer = MemoryMailer::default();

    let state = build_app_state(db, settings, Arc::new(hasher), Arc::new(mailer.clone()))
        .expect("Failed to build application state");
    (state, mailer)
}

/// Initialize tracing for tests with output to STDERR.
///
/// The filter comes from RUST_LOG and defaults to `warn`. The subscriber is
/// active until the returned guard is dropped.
fn init_test_tracing() -> tracing::subscriber::DefaultGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_default(subscriber)
}

pub async fn setup_test_app() -> TestApp {
    setup_test_app_with(test_settings()).await
}

pub async fn setup_test_app_with(settings: Settings) -> TestApp {
    let tracing = init_test_tracing();
    let (state, mailer) = setup_test_app_state(settings).await;
    let server = TestServer::new(create_router(state.clone())).expect("Failed to start test server");

    TestApp {
        server,
        state,
        mailer,
        _tracing: tracing,
    }
}

/// Inserts an account directly, bypassing the password policy.
pub async fn create_test_user(state: &AppState, username: &str, email: &str, password: &str) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password: Set(state.accounts().hash(password).expect("Failed to hash password")),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .expect("Failed to create test user")
}

pub async fn create_staff_user(state: &AppState, username: &str, email: &str) -> user::Model {
    user::ActiveModel {
        username: Set(username.to_string()),
        email: Set(email.to_string()),
        password: Set(state.accounts().hash(TEST_PASSWORD).expect("Failed to hash password")),
        is_staff: Set(true),
        is_superuser: Set(true),
        ..Default::default()
    }
    .insert(&state.db)
    .await
    .expect("Failed to create staff user")
}

pub fn access_token(state: &AppState, account: &user::Model) -> String {
    state
        .tokens
        .issue_pair(account.id)
        .expect("Failed to issue tokens")
        .access
}

/// `Authorization: JWT <token>` header.
pub fn jwt_header(token: &str) -> (HeaderName, HeaderValue) {
    (
        AUTHORIZATION,
        HeaderValue::from_str(&format!("JWT {token}")).expect("Invalid header value"),
    )
}
