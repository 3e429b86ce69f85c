use std::net::SocketAddr;

use anyhow::Context;
use clap::Args;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

#[derive(Debug, Clone, Args)]
pub struct DatabaseConfig {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    #[arg(long, env = "PLANNER_MAX_CONNECTIONS", default_value_t = 5)]
    pub max_connections: u32,
}

impl DatabaseConfig {
    pub async fn connect(&self) -> anyhow::Result<PgPool> {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect(&self.database_url)
            .await
            .context("failed to connect to Postgres")
    }
}

#[derive(Debug, Clone, Args)]
pub struct ServerConfig {
    #[arg(long, env = "PLANNER_BIND", default_value = "127.0.0.1:3000")]
    pub bind: SocketAddr,

    /// Cookie carrying the session token
    #[arg(long, env = "PLANNER_SESSION_COOKIE", default_value = "session")]
    pub session_cookie: String,
}
