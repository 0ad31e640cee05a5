use std::str::FromStr;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;

use crate::error::{ReportError, Result};
use crate::pagination::DEFAULT_PAGE_SIZE;

pub const DATABASE_URL_VAR: &str = "KENDRA_DATABASE_URL";
pub const ACCESS_KEY_VAR: &str = "KENDRA_ACCESS_KEY";
pub const MAX_CONNECTIONS_VAR: &str = "KENDRA_MAX_CONNECTIONS";
pub const PAGE_SIZE_VAR: &str = "KENDRA_PAGE_SIZE";

#[derive(Clone)]
pub struct BackendConfig {
    pub database_url: String,
    pub access_key: String,
    pub max_connections: u32,
    pub page_size: usize,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("database_url", &self.database_url)
            .field("access_key", &"<redacted>")
            .field("max_connections", &self.max_connections)
            .field("page_size", &self.page_size)
            .finish()
    }
}

impl BackendConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &str| {
            lookup(name)
                .filter(|value| !value.trim().is_empty())
                .ok_or_else(|| ReportError::Config(format!("{name} must be set")))
        };
        let database_url = required(DATABASE_URL_VAR)?;
        let access_key = required(ACCESS_KEY_VAR)?;

        let max_connections = parse_optional(&lookup, MAX_CONNECTIONS_VAR)?.unwrap_or(5);
        let page_size = parse_optional(&lookup, PAGE_SIZE_VAR)?.unwrap_or(DEFAULT_PAGE_SIZE);
        if page_size == 0 {
            return Err(ReportError::Config(format!("{PAGE_SIZE_VAR} must be positive")));
        }

        Ok(Self {
            database_url,
            access_key,
            max_connections,
            page_size,
        })
    }

    pub async fn connect(&self) -> Result<PgPool> {
        let options = PgConnectOptions::from_str(&self.database_url)?.password(&self.access_key);
        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .connect_with(options)
            .await?;
        Ok(pool)
    }
}

fn parse_optional<F, T>(lookup: &F, name: &str) -> Result<Option<T>>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ReportError::Config(format!("{name} has invalid value {raw:?}"))),
    }
}
