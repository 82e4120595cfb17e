use std::str::FromStr;

use anyhow::{Context, Result};
use contests::ContestSettings;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub max_rounds: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = ContestSettings::default();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("Cannot load DATABASE_URL env variable")?,
            max_connections: var_or("DATABASE_MAX_CONNECTIONS", 5)?,
            max_rounds: var_or("CONTEST_MAX_ROUNDS", defaults.max_rounds)?,
        })
    }

    pub fn settings(&self) -> ContestSettings {
        ContestSettings {
            max_rounds: self.max_rounds,
        }
    }
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a number", key)),
        Err(_) => Ok(default),
    }
}
