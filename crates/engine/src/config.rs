//! Configuration loaded from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::QueryError;

/// Default number of rows per page when the request names none.
pub const DEFAULT_PAGE_SIZE: u64 = 10;

/// Default maximum include nesting depth.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 8;

/// SQL dialect of the data-access layer consuming the descriptor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Postgres,
    Mysql,
    Mariadb,
    Sqlite,
    Mssql,
}

impl Dialect {
    /// Whether the driver has a case-insensitive pattern operator (ILIKE).
    pub fn supports_ilike(self) -> bool {
        matches!(self, Dialect::Postgres)
    }
}

impl FromStr for Dialect {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Dialect::Postgres),
            "mysql" => Ok(Dialect::Mysql),
            "mariadb" => Ok(Dialect::Mariadb),
            "sqlite" => Ok(Dialect::Sqlite),
            "mssql" => Ok(Dialect::Mssql),
            other => Err(QueryError::Config(format!("unsupported dialect '{other}'"))),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Dialect::Postgres => "postgres",
            Dialect::Mysql => "mysql",
            Dialect::Mariadb => "mariadb",
            Dialect::Sqlite => "sqlite",
            Dialect::Mssql => "mssql",
        };
        f.write_str(name)
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Database dialect (DB_CONNECTION, default: postgres).
    pub dialect: Dialect,

    /// Page size used when a request names none (default: 10).
    pub default_page_size: u64,

    /// Deepest include nesting accepted in a relation template (default: 8).
    pub max_include_depth: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            default_page_size: DEFAULT_PAGE_SIZE,
            max_include_depth: DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let dialect = env::var("DB_CONNECTION")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse()
            .context("DB_CONNECTION must name a supported dialect")?;

        let default_page_size: u64 = env::var("QUERY_DEFAULT_PAGE_SIZE")
            .unwrap_or_else(|_| DEFAULT_PAGE_SIZE.to_string())
            .parse()
            .context("QUERY_DEFAULT_PAGE_SIZE must be a valid u64")?;
        if default_page_size == 0 {
            anyhow::bail!("QUERY_DEFAULT_PAGE_SIZE must be greater than zero");
        }

        let max_include_depth = env::var("QUERY_MAX_INCLUDE_DEPTH")
            .unwrap_or_else(|_| DEFAULT_MAX_INCLUDE_DEPTH.to_string())
            .parse()
            .context("QUERY_MAX_INCLUDE_DEPTH must be a valid usize")?;

        Ok(Self {
            dialect,
            default_page_size,
            max_include_depth,
        })
    }
}
