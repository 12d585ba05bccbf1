use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::id::AccountId;

/// Global account role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AccountRole {
    /// Platform administrator
    Admin,
    /// Regular user
    User,
}

impl AccountRole {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
        }
    }
}

impl FromStr for AccountRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "ADMIN" => Ok(Self::Admin),
            "USER" => Ok(Self::User),
            _ => Err(format!("Unknown account role: {s}")),
        }
    }
}

impl std::fmt::Display for AccountRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Unique key
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub role: AccountRole,
    pub is_active: bool,
    pub is_approved: bool,
    pub verified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A regular, inactive, unapproved and unverified account
    #[must_use]
    pub fn new(email: String, password_hash: String, display_name: String) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            email,
            password_hash,
            display_name,
            role: AccountRole::User,
            is_active: false,
            is_approved: false,
            verified_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// An administrator that is active, approved and verified as of now
    #[must_use]
    pub fn new_admin(email: String, password_hash: String, display_name: String) -> Self {
        let mut account = Self::new(email, password_hash, display_name);

        account.role = AccountRole::Admin;
        account.is_active = true;
        account.is_approved = true;
        account.verified_at = Some(account.created_at);
        account
    }
}
