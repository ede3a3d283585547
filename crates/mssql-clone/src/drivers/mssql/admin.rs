//! Database-level operations, run from `master`.

use async_trait::async_trait;
use tiberius::Query;
use tracing::info;

use super::connection::{build_pool, checkout, MssqlPool};
use super::dialect::{MssqlDialect, DATABASE_EXISTS};
use crate::config::DatabaseConfig;
use crate::core::{validate_identifier, DatabaseAdmin};
use crate::error::Result;

pub struct MssqlAdmin {
    pool: MssqlPool,
}

impl MssqlAdmin {
    /// Connect to the `master` database of the server described by `config`.
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let pool = build_pool(&config.with_database("master"), 1).await?;
        Ok(Self { pool })
    }
}

#[async_trait]
impl DatabaseAdmin for MssqlAdmin {
    async fn database_exists(&self, database: &str) -> Result<bool> {
        let mut conn = checkout(&self.pool, "checking database").await?;
        let mut query = Query::new(DATABASE_EXISTS);
        query.bind(database);
        let row = query.query(&mut conn).await?.into_row().await?;
        Ok(match row {
            Some(row) => row.try_get::<i32, _>(0)?.unwrap_or(0) > 0,
            None => false,
        })
    }

    async fn create_database(&self, database: &str) -> Result<bool> {
        validate_identifier(database)?;
        if self.database_exists(database).await? {
            return Ok(false);
        }
        let mut conn = checkout(&self.pool, "creating database").await?;
        conn.simple_query(MssqlDialect::create_database(database))
            .await?
            .into_results()
            .await?;
        info!("Created database {}", database);
        Ok(true)
    }

    async fn drop_database(&self, database: &str) -> Result<bool> {
        validate_identifier(database)?;
        if !self.database_exists(database).await? {
            return Ok(false);
        }
        let mut conn = checkout(&self.pool, "dropping database").await?;
        conn.simple_query(MssqlDialect::drop_database(database))
            .await?
            .into_results()
            .await?;
        info!("Dropped database {}", database);
        Ok(true)
    }
}
