use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::services::NotificationPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    #[serde(default)]
    pub checkout: CheckoutConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CheckoutConfig {
    /// How long the simulated "pay now" authorization takes.
    #[serde(default = "default_payment_delay_ms")]
    pub payment_delay_ms: u64,
    #[serde(default)]
    pub notification_policy: NotificationPolicy,
}

fn default_payment_delay_ms() -> u64 {
    1000
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            payment_delay_ms: default_payment_delay_ms(),
            notification_policy: NotificationPolicy::default(),
        }
    }
}

impl CheckoutConfig {
    pub fn payment_delay(&self) -> Duration {
        Duration::from_millis(self.payment_delay_ms)
    }
}

impl Config {
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = ConfigBuilder::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // Not checked in
            .add_source(File::with_name("config/local").required(false))
            // e.g. `TRIPCART_SERVER__PORT=9000`
            .add_source(
                Environment::with_prefix("TRIPCART")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let database_url =
            env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite://tripcart.db".to_string());

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_max_connections);

        let server_host = env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let server_port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse::<u16>()
            .unwrap_or(8080);

        let payment_delay_ms = env::var("CHECKOUT_PAYMENT_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default_payment_delay_ms);

        let notification_policy = match env::var("CHECKOUT_NOTIFICATION_POLICY") {
            Ok(raw) => raw.parse::<NotificationPolicy>().map_err(ConfigError::Message)?,
            Err(_) => NotificationPolicy::default(),
        };

        Ok(Config {
            database: DatabaseConfig {
                url: database_url,
                max_connections,
            },
            server: ServerConfig {
                host: server_host,
                port: server_port,
            },
            checkout: CheckoutConfig {
                payment_delay_ms,
                notification_policy,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkout_defaults() {
        let checkout = CheckoutConfig::default();
        assert_eq!(checkout.payment_delay(), Duration::from_secs(1));
        assert_eq!(checkout.notification_policy, NotificationPolicy::PerItem);
    }

    #[test]
    fn checkout_section_deserializes() {
        let config: Config = ConfigBuilder::builder()
            .set_override("database.url", "sqlite::memory:")
            .unwrap()
            .set_override("server.host", "0.0.0.0")
            .unwrap()
            .set_override("server.port", 9000)
            .unwrap()
            .set_override("checkout.notification_policy", "per_lender")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.checkout.payment_delay_ms, 1000);
        assert_eq!(config.checkout.notification_policy, NotificationPolicy::PerLender);
    }
}
