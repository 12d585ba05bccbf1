//! Bootstrap module for starting a seedbed process
//!
//! This module handles:
//! - Configuration loading
//! - Database handle initialization, health checks and shutdown
//! - Admin account seeding

pub mod admin;
pub mod config;
pub mod database;
pub mod handle;

pub use admin::{ensure_admin, ensure_admin_with, AdminSeed, SeedOutcome};
pub use config::load_config;
pub use database::{init_database, ConnectionConfig, DatabaseTarget, PoolSettings};
pub use handle::{DatabaseHandle, HandleState, ShutdownOutcome, ShutdownSignal};
