use crate::{Error, Result};
use std::{env, time::Duration};
use tokio::sync::Semaphore;
use url::Url;
use urlencoding::decode;

pub const DEFAULT_MAX_CONNECTIONS: usize = 10;
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);
/// Largest pool the semaphore can count.
pub const MAX_CONNECTIONS: usize = Semaphore::MAX_PERMITS;

const MAX_CONNECTIONS_PARAM: &str = "max_connections";
const ACQUIRE_TIMEOUT_PARAM: &str = "acquire_timeout_ms";

/// What a driver needs to open a session: the connection URL without the pool
/// options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub url: Url,
}

impl ConnectionConfig {
    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }
    pub fn username(&self) -> Option<String> {
        let user = self.url.username();
        if user.is_empty() {
            return None;
        }
        Some(decode(user).map(Into::into).unwrap_or_else(|_| user.to_owned()))
    }
    pub fn password(&self) -> Option<String> {
        self.url
            .password()
            .map(|v| decode(v).map(Into::into).unwrap_or_else(|_| v.to_owned()))
    }
    /// Value of the query parameter `key`, if present.
    pub fn param(&self, key: &str) -> Option<String> {
        self.url
            .query_pairs()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.into_owned())
    }
}

/// Pool configuration.
///
/// Built from a URL like
/// `sqlite://path/to/file.sqlite?mode=rwc&max_connections=4&acquire_timeout_ms=500`.
/// `max_connections` and `acquire_timeout_ms` are consumed here, every other
/// parameter is left for the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub connection: ConnectionConfig,
    pub max_connections: usize,
    pub acquire_timeout: Duration,
}

impl PoolConfig {
    pub fn from_url(url: &str) -> Result<Self> {
        let context = |e: &dyn std::fmt::Display| {
            let error = Error::Config(format!("Invalid connection url `{}`: {}", url, e));
            log::error!("{:#}", error);
            error
        };
        let mut parsed = Url::parse(url).map_err(|e| context(&e))?;
        let mut max_connections = DEFAULT_MAX_CONNECTIONS;
        let mut acquire_timeout = DEFAULT_ACQUIRE_TIMEOUT;
        let mut pairs: Vec<(String, String)> = Vec::new();
        for (key, value) in parsed.query_pairs() {
            match &*key {
                MAX_CONNECTIONS_PARAM => {
                    max_connections = value.parse().map_err(|e| context(&e))?;
                }
                ACQUIRE_TIMEOUT_PARAM => {
                    acquire_timeout = Duration::from_millis(value.parse().map_err(|e| context(&e))?);
                }
                _ => pairs.push((key.into_owned(), value.into_owned())),
            }
        }
        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            parsed
                .query_pairs_mut()
                .clear()
                .extend_pairs(pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        }
        PoolConfig {
            connection: ConnectionConfig { url: parsed },
            max_connections,
            acquire_timeout,
        }
        .validated()
    }

    /// Reads `DATABASE_URL`, then applies `TETHER_MAX_CONNECTIONS` and
    /// `TETHER_ACQUIRE_TIMEOUT_MS` when set.
    pub fn from_env() -> Result<Self> {
        let url = env::var("DATABASE_URL")
            .map_err(|_| Error::Config("The environment variable DATABASE_URL is not set".into()))?;
        let mut config = Self::from_url(&url)?;
        if let Ok(value) = env::var("TETHER_MAX_CONNECTIONS") {
            config.max_connections = value.parse().map_err(|_| {
                Error::Config(format!("TETHER_MAX_CONNECTIONS `{}` is not a number", value))
            })?;
        }
        if let Ok(value) = env::var("TETHER_ACQUIRE_TIMEOUT_MS") {
            config.acquire_timeout = Duration::from_millis(value.parse().map_err(|_| {
                Error::Config(format!("TETHER_ACQUIRE_TIMEOUT_MS `{}` is not a number", value))
            })?);
        }
        config.validated()
    }

    pub fn with_max_connections(mut self, max_connections: usize) -> Self {
        self.max_connections = max_connections;
        self
    }

    pub fn with_acquire_timeout(mut self, acquire_timeout: Duration) -> Self {
        self.acquire_timeout = acquire_timeout;
        self
    }

    /// Check the pool options, [`ConnectionPool::new`](crate::ConnectionPool::new)
    /// does it too for configurations changed through the builders.
    pub fn validate(&self) -> Result<()> {
        if self.max_connections == 0 {
            return Err(Error::Config(
                "The pool must allow at least one connection".into(),
            ));
        }
        if self.max_connections > MAX_CONNECTIONS {
            return Err(Error::Config(format!(
                "The pool allows at most {} connections, got {}",
                MAX_CONNECTIONS, self.max_connections
            )));
        }
        Ok(())
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }
}
