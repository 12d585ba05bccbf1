pub mod account;
pub mod id;

pub use account::{Account, AccountRole};
pub use id::AccountId;
