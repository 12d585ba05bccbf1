//! End-to-end checks of the bootstrap flow that need no running database.
//!
//! Run with: cargo test --test bootstrap_tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use seedbed_core::{
    bootstrap::{
        ensure_admin_with, init_database, AdminSeed, DatabaseHandle, HandleState,
        ShutdownOutcome, ShutdownSignal,
    },
    models::Account,
    repository::AccountStore,
    service::verify_password,
    Config, Error, Result,
};
use sqlx::postgres::PgPoolOptions;

fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

#[tokio::test]
async fn test_missing_database_url_fails_before_connecting() {
    let config = Config::load_from(None, vars(&[("DATABASE_TLS_MODE", "relaxed")])).unwrap();
    let connection = config.connection_config().unwrap();

    let err = init_database(&connection).await.unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[tokio::test]
async fn test_tls_mode_has_no_default() {
    let config = Config::load_from(
        None,
        vars(&[("DATABASE_URL", "postgres://app@localhost:5432/app")]),
    )
    .unwrap();

    assert!(matches!(config.connection_config(), Err(Error::Config(_))));
    assert!(config.validate().is_err());
}

#[tokio::test]
async fn test_unreachable_database_fails_with_connection_error() {
    let config = Config::load_from(
        None,
        vars(&[
            ("DATABASE_URL", "postgres://app:pw@127.0.0.1:1/app"),
            ("DATABASE_TLS_MODE", "disabled"),
            ("SEEDBED_DATABASE__MIN_CONNECTIONS", "0"),
            ("SEEDBED_DATABASE__CONNECT_TIMEOUT_SECONDS", "1"),
        ]),
    )
    .unwrap();

    let err = init_database(&config.connection_config().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Connection(_)), "unexpected error: {err}");
}

#[tokio::test]
async fn test_signals_racing_release_once() {
    let pool = PgPoolOptions::new()
        .min_connections(0)
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy("postgres://app@127.0.0.1:1/app")
        .unwrap();
    let handle = Arc::new(DatabaseHandle::from_pool(
        pool,
        Duration::from_millis(200),
        Duration::from_secs(2),
    ));

    let (a, b, c) = tokio::join!(
        handle.shutdown(ShutdownSignal::Interrupt),
        handle.shutdown(ShutdownSignal::Terminate),
        handle.shutdown(ShutdownSignal::Exit),
    );
    let outcomes = [a.unwrap(), b.unwrap(), c.unwrap()];

    assert_eq!(
        outcomes.iter().filter(|o| **o == ShutdownOutcome::Released).count(),
        1
    );
    assert_eq!(handle.state(), HandleState::Closed);
    assert!(!handle.health_check().await);
}

/// Minimal store keyed by email
#[derive(Default)]
struct MapStore {
    accounts: Mutex<HashMap<String, Account>>,
}

#[async_trait]
impl AccountStore for MapStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.accounts.lock().await.get(email).cloned())
    }

    async fn create(&self, account: &Account) -> Result<Account> {
        let mut accounts = self.accounts.lock().await;
        if accounts.contains_key(&account.email) {
            return Err(Error::AlreadyExists("Email already registered".to_string()));
        }
        accounts.insert(account.email.clone(), account.clone());
        Ok(account.clone())
    }
}

#[tokio::test]
async fn test_seed_from_config_is_idempotent() {
    let config = Config::load_from(
        None,
        vars(&[
            ("ADMIN_EMAIL", "admin@example.com"),
            ("ADMIN_PASSWORD", "Secret#123"),
        ]),
    )
    .unwrap();
    let store = MapStore::default();
    let seed = AdminSeed::from(&config.bootstrap);

    let first = ensure_admin_with(&store, &seed).await.unwrap();
    let second = ensure_admin_with(&store, &seed).await.unwrap();

    assert!(first.created);
    assert!(!second.created);
    assert_eq!(first.account_id, second.account_id);
    assert!(!first.default_password_in_use);

    let accounts = store.accounts.lock().await;
    assert_eq!(accounts.len(), 1);
    let stored = &accounts["admin@example.com"];
    assert_ne!(stored.password_hash, "Secret#123");
    assert!(verify_password("Secret#123", &stored.password_hash).await.unwrap());
}

#[tokio::test]
async fn test_default_credentials_raise_warning_flag() {
    let config = Config::load_from(None, HashMap::new()).unwrap();
    let store = MapStore::default();

    let outcome = ensure_admin_with(&store, &AdminSeed::from(&config.bootstrap))
        .await
        .unwrap();

    assert!(outcome.created);
    assert!(outcome.default_password_in_use);
}
