use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use crate::error::AppError;
use tracing::{info, error};
use std::str::FromStr;
use std::time::Duration;

pub async fn establish_connection(database_url: &str, max_connections: u32) -> Result<SqlitePool, AppError> {
    info!(url = database_url, "Establishing database connection");

    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::ConfigError(format!("Invalid database url: {}", e)))?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            AppError::DatabaseError(format!("Connection failed: {}", e))
        })?;

    info!("Database connection established successfully");
    Ok(pool)
}

pub async fn test_connection(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Connection test failed: {}", e)))?;

    info!("Database connection test successful");
    Ok(())
}
