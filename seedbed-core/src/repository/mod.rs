pub mod account;

use async_trait::async_trait;

use crate::{models::Account, Result};

pub use account::AccountRepository;

/// What the admin seeder needs from storage
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Look an account up by its unique email
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Insert a new account and return the stored row
    async fn create(&self, account: &Account) -> Result<Account>;
}
