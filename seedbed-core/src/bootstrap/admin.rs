//! Admin account seeding

use std::fmt;
use tracing::{info, warn};

use super::handle::DatabaseHandle;
use crate::{
    config::BootstrapConfig,
    models::{Account, AccountId},
    repository::{AccountRepository, AccountStore},
    service::password::hash_password,
    Error, Result,
};

pub const DEFAULT_ADMIN_EMAIL: &str = "admin@example.com";
/// Shipped default; seeding with it always logs a rotation warning.
pub const DEFAULT_ADMIN_PASSWORD: &str = "Admin@123";
pub const DEFAULT_ADMIN_DISPLAY_NAME: &str = "Super Admin";

/// Who to seed
#[derive(Clone)]
pub struct AdminSeed {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

impl AdminSeed {
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            display_name: display_name.into(),
        }
    }

    #[must_use]
    pub fn uses_default_password(&self) -> bool {
        self.password == DEFAULT_ADMIN_PASSWORD
    }

    fn validate(&self) -> Result<()> {
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(Error::InvalidInput(format!(
                "Admin email '{}' is not an email address",
                self.email
            )));
        }
        if self.password.is_empty() {
            return Err(Error::InvalidInput("Admin password must not be empty".to_string()));
        }
        if self.display_name.trim().is_empty() {
            return Err(Error::InvalidInput("Admin display name must not be empty".to_string()));
        }
        Ok(())
    }
}

impl From<&BootstrapConfig> for AdminSeed {
    fn from(config: &BootstrapConfig) -> Self {
        Self::new(
            config.admin_email.clone(),
            config.admin_password.clone(),
            config.admin_display_name.clone(),
        )
    }
}

impl fmt::Debug for AdminSeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSeed")
            .field("email", &self.email)
            .field("password", &"****")
            .field("display_name", &self.display_name)
            .finish()
    }
}

/// Result of a seed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedOutcome {
    /// `false` when the account was already there
    pub created: bool,
    pub account_id: AccountId,
    /// The shipped default password was used and should be rotated
    pub default_password_in_use: bool,
}

/// Make sure an admin account exists for `email`, creating it on first run.
///
/// Running it again is a no-op that reports the existing account id.
pub async fn ensure_admin(
    handle: &DatabaseHandle,
    email: &str,
    raw_password: &str,
    display_name: &str,
) -> Result<SeedOutcome> {
    let repository = AccountRepository::new(handle.pool().clone());
    ensure_admin_with(&repository, &AdminSeed::new(email, raw_password, display_name)).await
}

/// Seed against any [`AccountStore`].
///
/// Every failure comes back as [`Error::Seed`] wrapping the cause, including
/// a unique-key violation from a concurrent seed run.
pub async fn ensure_admin_with<S>(store: &S, seed: &AdminSeed) -> Result<SeedOutcome>
where
    S: AccountStore + ?Sized,
{
    seed.validate().map_err(Error::seed)?;
    let email = seed.email.trim();
    let default_password_in_use = seed.uses_default_password();

    info!(email = %email, "Starting admin account seed...");

    if let Some(existing) = store.find_by_email(email).await.map_err(Error::seed)? {
        info!(
            account_id = %existing.id,
            email = %existing.email,
            role = %existing.role,
            "Admin account already exists, skipping seed"
        );
        warn_default_password(default_password_in_use);
        return Ok(SeedOutcome {
            created: false,
            account_id: existing.id,
            default_password_in_use,
        });
    }

    let password_hash = hash_password(&seed.password).await.map_err(Error::seed)?;
    let account = Account::new_admin(
        email.to_string(),
        password_hash,
        seed.display_name.trim().to_string(),
    );
    let created = store.create(&account).await.map_err(Error::seed)?;

    info!(
        account_id = %created.id,
        email = %created.email,
        display_name = %created.display_name,
        role = %created.role,
        "Admin account created successfully"
    );
    warn_default_password(default_password_in_use);

    Ok(SeedOutcome {
        created: true,
        account_id: created.id,
        default_password_in_use,
    })
}

fn warn_default_password(in_use: bool) {
    if in_use {
        warn!("SECURITY: the admin account is seeded with the default password");
        warn!("Set ADMIN_PASSWORD or change the password immediately after first login");
    }
}
