//! Test helpers and fixtures for seedbed-core tests

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::bootstrap::{init_database, ConnectionConfig, DatabaseHandle};
use crate::config::{LogVerbosity, TlsMode};
use crate::models::{Account, AccountId, AccountRole};
use crate::repository::AccountStore;
use crate::{Error, Result};

/// A lazily connected pool aimed at a port nothing listens on.
///
/// Creating it performs no I/O; any query fails fast.
pub fn unreachable_pool() -> PgPool {
    let options = PgConnectOptions::new()
        .host("127.0.0.1")
        .port(1)
        .username("seedbed")
        .database("seedbed");

    PgPoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .acquire_timeout(Duration::from_millis(200))
        .connect_lazy_with(options)
}

/// Connect to the database named by `DATABASE_URL` and apply migrations.
///
/// Only used by `#[ignore = "Requires database"]` tests.
pub async fn live_handle() -> DatabaseHandle {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for database tests");
    let tls_mode = std::env::var("DATABASE_TLS_MODE")
        .ok()
        .and_then(|mode| mode.parse().ok())
        .unwrap_or(TlsMode::Disabled);

    let config = ConnectionConfig::new(url, tls_mode, LogVerbosity::Quiet);
    let handle = init_database(&config).await.expect("database should be reachable");

    sqlx::migrate!("../migrations")
        .run(handle.pool())
        .await
        .expect("migrations should apply");
    handle
}

/// An email no earlier run has used
pub fn unique_email() -> String {
    format!("{}@seedbed.test", nanoid::nanoid!(10).to_lowercase())
}

/// Test fixture builder for Account
pub struct AccountFixture {
    id: AccountId,
    email: String,
    display_name: String,
    role: AccountRole,
}

impl AccountFixture {
    pub fn new() -> Self {
        Self {
            id: AccountId::new(),
            email: "test@example.com".to_string(),
            display_name: "Test Account".to_string(),
            role: AccountRole::Admin,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = email.to_string();
        self
    }

    pub fn with_role(mut self, role: AccountRole) -> Self {
        self.role = role;
        self
    }

    pub fn build(self) -> Account {
        let now = Utc::now();
        Account {
            id: self.id,
            email: self.email,
            password_hash: "hash".to_string(),
            display_name: self.display_name,
            role: self.role,
            is_active: true,
            is_approved: true,
            verified_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }
}

impl Default for AccountFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// `AccountStore` backed by a map, with the same unique-email rule as the table.
#[derive(Default)]
pub struct InMemoryAccountStore {
    accounts: Mutex<HashMap<String, Account>>,
    creates: AtomicUsize,
}

impl InMemoryAccountStore {
    pub fn len(&self) -> usize {
        self.accounts.lock().len()
    }

    pub fn get(&self, email: &str) -> Option<Account> {
        self.accounts.lock().get(email).cloned()
    }

    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        Ok(self.get(email))
    }

    async fn create(&self, account: &Account) -> Result<Account> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        let mut accounts = self.accounts.lock();
        if accounts.contains_key(&account.email) {
            return Err(Error::AlreadyExists("Email already registered".to_string()));
        }
        accounts.insert(account.email.clone(), account.clone());
        Ok(account.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_fixture() {
        let account = AccountFixture::new()
            .with_email("ops@example.com")
            .with_role(AccountRole::User)
            .build();

        assert_eq!(account.email, "ops@example.com");
        assert_eq!(account.role, AccountRole::User);
    }

    #[tokio::test]
    async fn test_in_memory_store_enforces_unique_email() {
        let store = InMemoryAccountStore::default();
        let account = AccountFixture::new().build();

        store.create(&account).await.unwrap();
        let err = store.create(&account).await.unwrap_err();

        assert!(matches!(err, Error::AlreadyExists(_)));
        assert_eq!(store.len(), 1);
        assert_eq!(store.create_calls(), 2);
    }
}
