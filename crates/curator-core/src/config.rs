//! Configuration module
//!
//! Settings for the database, the site URLs, the message broker and the
//! signed authorization header, read from the environment.

use std::env;

use url::Url;

// Common constants
const MAX_CONNECTIONS: u32 = 20;
const CONNECTION_TIMEOUT_SECS: u64 = 30;
const JWT_EXPIRY_HOURS: i64 = 2;
const BROKER_PORT: u16 = 61613;
const BROKER_TIMEOUT_SECS: u64 = 10;
const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_FILE_SCHEME: &str = "public";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Settings shared by every entry point
#[derive(Clone, Debug)]
pub struct BaseConfig {
    pub database_url: Option<String>,
    pub db_max_connections: u32,
    pub db_timeout_seconds: u64,
    pub base_url: String,
    pub default_file_scheme: String,
    pub jwt_secret: Option<String>,
    pub jwt_expiry_hours: i64,
    pub environment: String,
    pub log_format: LogFormat,
}

/// Connection settings of the STOMP broker
#[derive(Clone, Debug)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub login: Option<String>,
    pub passcode: Option<String>,
    pub vhost: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CuratorConfig {
    pub base: BaseConfig,
    pub broker: BrokerConfig,
}

impl CuratorConfig {
    pub fn from_env() -> Result<Self, anyhow::Error> {
        dotenvy::dotenv().ok();
        Self::from_source(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_source<F>(var: F) -> Result<Self, anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = var("ENVIRONMENT").unwrap_or_else(|| "development".to_string());

        let log_format = match var("LOG_FORMAT").map(|s| s.to_lowercase()).as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        let base = BaseConfig {
            database_url: var("DATABASE_URL"),
            db_max_connections: var("DB_MAX_CONNECTIONS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(MAX_CONNECTIONS),
            db_timeout_seconds: var("DB_TIMEOUT_SECONDS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(CONNECTION_TIMEOUT_SECS),
            base_url: var("BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            default_file_scheme: var("DEFAULT_FILE_SCHEME")
                .unwrap_or_else(|| DEFAULT_FILE_SCHEME.to_string()),
            jwt_secret: var("JWT_SECRET").filter(|s| !s.is_empty()),
            jwt_expiry_hours: var("JWT_EXPIRY_HOURS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(JWT_EXPIRY_HOURS),
            environment,
            log_format,
        };

        let broker = BrokerConfig {
            host: var("BROKER_HOST").unwrap_or_else(|| "localhost".to_string()),
            port: match var("BROKER_PORT") {
                Some(port) => port
                    .parse()
                    .map_err(|_| anyhow::anyhow!("BROKER_PORT must be a valid number"))?,
                None => BROKER_PORT,
            },
            login: var("BROKER_LOGIN"),
            passcode: var("BROKER_PASSCODE"),
            vhost: var("BROKER_VHOST"),
            timeout_secs: var("BROKER_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .unwrap_or(BROKER_TIMEOUT_SECS),
        };

        Ok(Self { base, broker })
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        Url::parse(&self.base.base_url)
            .map_err(|e| anyhow::anyhow!("BASE_URL must be a valid URL: {}", e))?;

        if self.is_production() && self.base.jwt_secret.is_none() {
            return Err(anyhow::anyhow!(
                "JWT_SECRET must be set in production so queue consumers can authenticate"
            ));
        }

        if let Some(url) = &self.base.database_url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(anyhow::anyhow!(
                    "DATABASE_URL must be a valid PostgreSQL connection string"
                ));
            }
        }

        Ok(())
    }

    /// Check if the application is running in production mode
    pub fn is_production(&self) -> bool {
        let env = self.base.environment.to_lowercase();
        env == "production" || env == "prod"
    }

    pub fn database_url(&self) -> Option<&str> {
        self.base.database_url.as_deref()
    }

    pub fn base_url(&self) -> &str {
        &self.base.base_url
    }

    pub fn default_file_scheme(&self) -> &str {
        &self.base.default_file_scheme
    }

    pub fn jwt_secret(&self) -> Option<&str> {
        self.base.jwt_secret.as_deref()
    }

    pub fn jwt_expiry_hours(&self) -> i64 {
        self.base.jwt_expiry_hours
    }

    pub fn log_format(&self) -> LogFormat {
        self.base.log_format
    }

    pub fn broker(&self) -> &BrokerConfig {
        &self.broker
    }
}
