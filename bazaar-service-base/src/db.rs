use std::error::Error;

use bazaar_common::config::{DbPostgresConfig, DbSqliteConfig};
use sqlx::migrate::Migrator;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Connection, Executor, PgConnection, Pool, Postgres, Sqlite, SqliteConnection};
use tracing::info;

trait ToPgConnectOptions {
    fn to_connect_options(&self) -> PgConnectOptions;
}

impl ToPgConnectOptions for DbPostgresConfig {
    fn to_connect_options(&self) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(self.host.as_str())
            .port(self.port)
            .database(self.database.as_str())
            .username(self.username.as_str())
            .password(self.password.as_str())
    }
}

trait ToSqliteConnectOptions {
    fn to_connect_options(&self) -> SqliteConnectOptions;
}

impl ToSqliteConnectOptions for DbSqliteConfig {
    fn to_connect_options(&self) -> SqliteConnectOptions {
        SqliteConnectOptions::new()
            .filename(std::path::Path::new(self.database.as_str()))
            .create_if_missing(true)
    }
}

pub async fn create_postgres_pool(
    config: &DbPostgresConfig,
) -> Result<Pool<Postgres>, Box<dyn Error>> {
    info!(
        "DB pool: postgresql://{}:{}/{}",
        config.host, config.port, config.database
    );
    let conn_options = config.to_connect_options();
    let schema = config.schema.clone();

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .after_connect(move |conn, _meta| {
            let schema = schema.clone();
            Box::pin(async move {
                if let Some(schema) = schema {
                    let sql = format!("SET SCHEMA '{}';", schema);
                    conn.execute(sqlx::query(&sql)).await?;
                }
                Ok(())
            })
        })
        .connect_with(conn_options)
        .await
        .map_err(|e| e.into())
}

pub async fn postgres_migrate(
    config: &DbPostgresConfig,
    migrator: &Migrator,
) -> Result<(), Box<dyn Error>> {
    info!(
        "DB migration: postgresql://{}:{}/{}",
        config.host, config.port, config.database
    );
    let conn_options = config.to_connect_options();
    let mut conn = PgConnection::connect_with(&conn_options).await?;

    if let Some(schema) = &config.schema {
        let sql = format!("CREATE SCHEMA IF NOT EXISTS {};", schema);
        conn.execute(sqlx::query(&sql)).await?;
        let sql = format!("SET SCHEMA '{}';", schema);
        conn.execute(sqlx::query(&sql)).await?;
    }

    migrator.run(&mut conn).await?;

    let _ = conn.close().await;
    Ok(())
}

pub async fn create_sqlite_pool(config: &DbSqliteConfig) -> Result<Pool<Sqlite>, Box<dyn Error>> {
    info!("DB pool: sqlite://{}", config.database);
    let conn_options = config.to_connect_options();

    SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(conn_options)
        .await
        .map_err(|e| e.into())
}

pub async fn sqlite_migrate(
    config: &DbSqliteConfig,
    migrator: &Migrator,
) -> Result<(), Box<dyn Error>> {
    info!("DB migration: sqlite://{}", config.database);
    let conn_options = config.to_connect_options();
    let mut conn = SqliteConnection::connect_with(&conn_options).await?;

    migrator.run(&mut conn).await?;

    let _ = conn.close().await;
    Ok(())
}
