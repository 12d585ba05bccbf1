use anyhow::Result;
use sqlx::PgPool;
use std::collections::HashSet;
use tracing::{error, info};

/// Apply every pending migration under `migrations/`.
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    let migrator = sqlx::migrate!("../migrations");

    let pending = pending_count(pool, &migrator).await;
    info!(pending, "Running database migrations...");

    migrator.run(pool).await.map_err(|e| {
        error!("Failed to run migrations: {}", e);
        anyhow::anyhow!("Migration failed: {e}")
    })?;

    info!("Migrations completed");
    Ok(())
}

/// Migrations known to the binary but missing from `_sqlx_migrations`.
async fn pending_count(pool: &PgPool, migrator: &sqlx::migrate::Migrator) -> usize {
    let applied: Vec<(i64,)> =
        match sqlx::query_as("SELECT version FROM _sqlx_migrations WHERE success ORDER BY version")
            .fetch_all(pool)
            .await
        {
            Ok(rows) => rows,
            Err(_) => return migrator.migrations.len(), // table may not exist yet
        };

    let applied: HashSet<i64> = applied.into_iter().map(|(v,)| v).collect();

    migrator
        .migrations
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count()
}
