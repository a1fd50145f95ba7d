//! Server configuration from environment variables.
//!
//! A `.env` file in the working directory is loaded first if present.

use std::env;
use std::str::FromStr;

use catbattle_shared::DEFAULT_PORT;
use thiserror::Error;

const DEFAULT_BIND: &str = "0.0.0.0";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("{var} must be set when {because}")]
    Missing {
        var: &'static str,
        because: &'static str,
    },
}

/// Which Entity Store backend to run against
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Memory,
    Postgres { url: String, max_connections: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub store: StoreConfig,
    /// Insert the demo account when seeding an empty store
    pub seed_demo_user: bool,
    /// Fixed seed for reproducible battles, entropy otherwise
    pub rng_seed: Option<u64>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            store: StoreConfig::Memory,
            seed_demo_user: true,
            rng_seed: None,
        }
    }
}

impl ServerConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|var| env::var(var).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let store = match lookup("CATBATTLE_STORE").as_deref() {
            None | Some("memory") => StoreConfig::Memory,
            Some("postgres") => {
                let url = lookup("DATABASE_URL").ok_or(ConfigError::Missing {
                    var: "DATABASE_URL",
                    because: "CATBATTLE_STORE=postgres",
                })?;
                let max_connections = parse_var(&lookup, "CATBATTLE_DB_MAX_CONNECTIONS")?
                    .unwrap_or(DEFAULT_DB_MAX_CONNECTIONS);
                StoreConfig::Postgres { url, max_connections }
            }
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "CATBATTLE_STORE",
                    value: other.to_string(),
                    reason: "expected 'memory' or 'postgres'".to_string(),
                })
            }
        };

        Ok(Self {
            bind: lookup("CATBATTLE_BIND").unwrap_or(defaults.bind),
            port: parse_var(&lookup, "CATBATTLE_PORT")?.unwrap_or(defaults.port),
            store,
            seed_demo_user: parse_var(&lookup, "CATBATTLE_SEED_DEMO")?.unwrap_or(defaults.seed_demo_user),
            rng_seed: parse_var(&lookup, "CATBATTLE_RNG_SEED")?,
        })
    }

    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(e) => Err(ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}
