//! Database migration command.
//!
//! The service never migrates on startup; operators apply the schema with
//! this command (or `sqlx migrate run`) before deploying.
//!
//! # Usage
//!
//! ```bash
//! oc-cli migrate
//! oc-cli migrate --source crates/service/migrations
//! ```
//!
//! # Environment Variables
//!
//! - `ORDER_CACHE_DATABASE_URL` - `PostgreSQL` connection string (falls back to `DATABASE_URL`)

use std::path::Path;

use order_cache_service::ServiceConfig;
use order_cache_service::store::create_pool;
use sqlx::migrate::Migrator;
use tracing::info;

/// Run the migrations found in `source`.
///
/// # Errors
///
/// Returns an error if configuration is missing, the database is
/// unreachable, or a migration fails.
pub async fn run(source: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServiceConfig::from_env()?;

    info!("Connecting to order cache database...");
    let pool = create_pool(&config.database_url).await?;

    info!(source = %source.display(), "Running migrations...");
    let migrator = Migrator::new(source).await?;
    migrator.run(&pool).await?;
    pool.close().await;

    info!("Migrations complete!");
    Ok(())
}
