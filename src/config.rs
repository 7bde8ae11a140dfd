use std::path::PathBuf;

use anyhow::Context;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketConfig {
    /// Directory of the sled database (default: `market.db`).
    pub db_path: PathBuf,
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("market.db"),
            host: "0.0.0.0".into(),
            port: 3000,
        }
    }
}

impl MarketConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var          | Default     |
    /// |------------------|-------------|
    /// | `MARKET_DB_PATH` | `market.db` |
    /// | `HOST`           | `0.0.0.0`   |
    /// | `PORT`           | `3000`      |
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let db_path = lookup("MARKET_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let host = lookup("HOST").unwrap_or(defaults.host);
        let port = match lookup("PORT") {
            Some(raw) => raw
                .trim()
                .parse::<u16>()
                .with_context(|| format!("PORT must be a valid u16, got '{raw}'"))?,
            None => defaults.port,
        };

        Ok(Self {
            db_path,
            host,
            port,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
