use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Row};
use std::str::FromStr;

use super::AccountStore;
use crate::{
    models::{Account, AccountRole},
    Error, Result,
};

const ACCOUNT_COLUMNS: &str =
    "id, email, password_hash, display_name, role, is_active, is_approved, verified_at, created_at, updated_at";

/// Account repository for database operations
#[derive(Clone)]
pub struct AccountRepository {
    pool: PgPool,
}

impl AccountRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a new account
    pub async fn create(&self, account: &Account) -> Result<Account> {
        let sql = format!(
            r"
            INSERT INTO users (id, email, password_hash, display_name, role, is_active, is_approved, verified_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {ACCOUNT_COLUMNS}
            "
        );

        let row = sqlx::query(&sql)
            .bind(&account.id)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.display_name)
            .bind(account.role.as_str())
            .bind(account.is_active)
            .bind(account.is_approved)
            .bind(account.verified_at)
            .bind(account.created_at)
            .bind(account.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Self::row_to_account(&row)
    }

    /// Get account by email
    pub async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM users WHERE email = $1");
        let row = sqlx::query(&sql)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::row_to_account).transpose()
    }

    /// Convert database row to Account model
    fn row_to_account(row: &PgRow) -> Result<Account> {
        let role: String = row.try_get("role")?;
        let role = AccountRole::from_str(&role).map_err(Error::Internal)?;

        Ok(Account {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            display_name: row.try_get("display_name")?,
            role,
            is_active: row.try_get("is_active")?,
            is_approved: row.try_get("is_approved")?,
            verified_at: row.try_get("verified_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl AccountStore for AccountRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>> {
        self.get_by_email(email).await
    }

    async fn create(&self, account: &Account) -> Result<Account> {
        Self::create(self, account).await
    }
}
