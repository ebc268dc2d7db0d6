//! Configuration for the beacon binary.

use std::time::Duration;

use anyhow::{Context, Result};
use beacon_dispatch::{ClientConfig, DispatchConfig, PoolConfig};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

const CONFIG_FILE: &str = "beacon.toml";
const ENV_PREFIX: &str = "BEACON_";

/// Runtime configuration with defaults, file, and environment overrides.
///
/// Sources in priority order:
/// 1. `BEACON_*` environment variables (e.g. `BEACON_WORKER_COUNT`)
/// 2. `beacon.toml` in the working directory
/// 3. Built-in defaults
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Capacity of the event queue.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Number of dispatch workers.
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Connection cap across all endpoints.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connection cap per endpoint origin.
    #[serde(default = "default_connections_per_route")]
    pub connections_per_route: usize,
    /// Idle time after which pooled connections are not reused, in
    /// milliseconds.
    #[serde(default = "default_validate_after_inactivity_ms")]
    pub validate_after_inactivity_ms: u64,
    /// Connect timeout in milliseconds.
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Whole-request timeout in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// Time allowed to drain the queue on shutdown, in milliseconds.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Config {
    /// Loads configuration from defaults, `beacon.toml` and `BEACON_*`
    /// variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a source cannot be parsed or a value is invalid.
    pub fn load() -> Result<Self> {
        let figment = Figment::new()
            .merge(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX));

        let config: Self = figment.extract().context("failed to load configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Converts to the engine configuration.
    pub fn to_dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            queue_capacity: self.queue_capacity,
            worker_count: self.worker_count,
            pool: PoolConfig {
                max_total_connections: self.max_connections,
                max_connections_per_route: self.connections_per_route,
                validate_after_inactivity: Duration::from_millis(self.validate_after_inactivity_ms),
            },
            client: ClientConfig {
                connect_timeout: Duration::from_millis(self.connect_timeout_ms),
                request_timeout: Duration::from_millis(self.request_timeout_ms),
            },
        }
    }

    /// Drain deadline for graceful shutdown.
    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            anyhow::bail!("queue_capacity must be greater than 0");
        }

        if self.worker_count == 0 {
            anyhow::bail!("worker_count must be greater than 0");
        }

        if self.max_connections == 0 {
            anyhow::bail!("max_connections must be greater than 0");
        }

        if self.connections_per_route == 0 {
            anyhow::bail!("connections_per_route must be greater than 0");
        }

        if self.connections_per_route > self.max_connections {
            anyhow::bail!("connections_per_route cannot exceed max_connections");
        }

        if self.request_timeout_ms == 0 {
            anyhow::bail!("request_timeout_ms must be greater than 0");
        }

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            max_connections: default_max_connections(),
            connections_per_route: default_connections_per_route(),
            validate_after_inactivity_ms: default_validate_after_inactivity_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            close_timeout_ms: default_close_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

fn default_queue_capacity() -> usize {
    beacon_dispatch::DEFAULT_QUEUE_CAPACITY
}

fn default_worker_count() -> usize {
    beacon_dispatch::DEFAULT_WORKER_COUNT
}

fn default_max_connections() -> usize {
    beacon_dispatch::DEFAULT_MAX_CONNECTIONS
}

fn default_connections_per_route() -> usize {
    beacon_dispatch::DEFAULT_CONNECTIONS_PER_ROUTE
}

fn default_validate_after_inactivity_ms() -> u64 {
    5000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_close_timeout_ms() -> u64 {
    5000
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use figment::Jail;

    use super::*;

    #[test]
    fn defaults_match_engine_defaults() {
        Jail::expect_with(|_jail| {
            let config = Config::load().map_err(|e| e.to_string())?;

            assert_eq!(config, Config::default());
            assert_eq!(config.to_dispatch_config(), DispatchConfig::default());
            Ok(())
        });
    }

    #[test]
    fn file_overrides_defaults() {
        Jail::expect_with(|jail| {
            jail.create_file(
                CONFIG_FILE,
                r#"
                queue_capacity = 500
                worker_count = 8
                close_timeout_ms = 250
                "#,
            )?;

            let config = Config::load().map_err(|e| e.to_string())?;

            assert_eq!(config.queue_capacity, 500);
            assert_eq!(config.worker_count, 8);
            assert_eq!(config.close_timeout(), Duration::from_millis(250));
            assert_eq!(config.max_connections, 200);
            Ok(())
        });
    }

    #[test]
    fn environment_overrides_file() {
        Jail::expect_with(|jail| {
            jail.create_file(CONFIG_FILE, "worker_count = 8")?;
            jail.set_env("BEACON_WORKER_COUNT", "3");
            jail.set_env("BEACON_VALIDATE_AFTER_INACTIVITY_MS", "1000");

            let config = Config::load().map_err(|e| e.to_string())?;
            let dispatch = config.to_dispatch_config();

            assert_eq!(dispatch.worker_count, 3);
            assert_eq!(dispatch.pool.validate_after_inactivity, Duration::from_secs(1));
            Ok(())
        });
    }

    #[test]
    fn zero_capacity_rejected() {
        Jail::expect_with(|jail| {
            jail.set_env("BEACON_QUEUE_CAPACITY", "0");

            let error = Config::load().unwrap_err();
            assert!(error.to_string().contains("queue_capacity"));
            Ok(())
        });
    }

    #[test]
    fn per_route_cap_cannot_exceed_total() {
        let config = Config { max_connections: 5, connections_per_route: 10, ..Config::default() };

        assert!(config.validate().is_err());
    }
}
