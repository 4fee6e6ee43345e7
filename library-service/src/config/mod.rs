use service_core::config as core_config;
use service_core::error::AppError;
use service_core::middleware::rate_limit::RateLimitSettings;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Upper bound for token lifetimes (one year).
pub const MAX_TOKEN_TTL_HOURS: i64 = 24 * 365;

#[derive(Debug, Clone)]
pub struct LibraryConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// `None` runs against the in-memory store (development only).
    pub database: Option<DatabaseConfig>,
    pub store_timeout: Duration,
    pub limiter: RateLimitSettings,
    pub cors: CorsConfig,
    pub token_ttl: chrono::Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Staging,
    Prod,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Dev => "dev",
            Environment::Staging => "staging",
            Environment::Prod => "prod",
        }
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Dev),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub idle_timeout: Duration,
    pub store_timeout: Duration,
}

#[derive(Debug, Clone, Default)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            common: core_config::Config::default(),
            environment: Environment::Dev,
            service_name: "library-service".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            log_level: "info".to_string(),
            otlp_endpoint: None,
            database: None,
            store_timeout: Duration::from_secs(3),
            limiter: RateLimitSettings::default(),
            cors: CorsConfig::default(),
            token_ttl: chrono::Duration::hours(24),
        }
    }
}

impl LibraryConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment: Environment = lookup("ENVIRONMENT")
            .unwrap_or_else(|| "dev".to_string())
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let get = |key: &str, default: Option<&str>| get_env(&lookup, key, default, is_prod);

        let store_timeout = Duration::from_secs(parse(
            "STORE_TIMEOUT_SECONDS",
            get("STORE_TIMEOUT_SECONDS", Some("3"))?,
        )?);

        let database = match lookup("DATABASE_URL").filter(|url| !url.is_empty()) {
            Some(url) => Some(DatabaseConfig {
                url,
                max_connections: parse(
                    "DATABASE_MAX_CONNECTIONS",
                    get("DATABASE_MAX_CONNECTIONS", Some("25"))?,
                )?,
                min_connections: parse(
                    "DATABASE_MIN_CONNECTIONS",
                    get("DATABASE_MIN_CONNECTIONS", Some("1"))?,
                )?,
                idle_timeout: Duration::from_secs(parse(
                    "DATABASE_IDLE_TIMEOUT_SECONDS",
                    get("DATABASE_IDLE_TIMEOUT_SECONDS", Some("900"))?,
                )?),
                store_timeout,
            }),
            None if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "DATABASE_URL is required in production but not set"
                )));
            }
            None => None,
        };

        let limiter = RateLimitSettings {
            requests_per_second: parse("LIMITER_RPS", get("LIMITER_RPS", Some("4"))?)?,
            burst: parse("LIMITER_BURST", get("LIMITER_BURST", Some("8"))?)?,
            enabled: parse("LIMITER_ENABLED", get("LIMITER_ENABLED", Some("true"))?)?,
            cleanup_interval: Duration::from_secs(parse(
                "LIMITER_CLEANUP_INTERVAL_SECONDS",
                get("LIMITER_CLEANUP_INTERVAL_SECONDS", Some("60"))?,
            )?),
            idle_timeout: Duration::from_secs(parse(
                "LIMITER_IDLE_TIMEOUT_SECONDS",
                get("LIMITER_IDLE_TIMEOUT_SECONDS", Some("180"))?,
            )?),
        };

        let ttl_hours: i64 = parse("TOKEN_TTL_HOURS", get("TOKEN_TTL_HOURS", Some("24"))?)?;
        let token_ttl = chrono::Duration::try_hours(ttl_hours).ok_or_else(|| {
            AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_TTL_HOURS is out of range: {}",
                ttl_hours
            ))
        })?;

        let config = LibraryConfig {
            common,
            environment,
            service_name: get("SERVICE_NAME", Some("library-service"))?,
            service_version: get("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")))?,
            log_level: get("LOG_LEVEL", Some("info"))?,
            otlp_endpoint: lookup("OTLP_ENDPOINT").filter(|e| !e.is_empty()),
            database,
            store_timeout,
            limiter,
            cors: CorsConfig {
                allowed_origins: lookup("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_default()
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect(),
            },
            token_ttl,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.store_timeout.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "STORE_TIMEOUT_SECONDS must be positive"
            )));
        }

        if self.token_ttl <= chrono::Duration::zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_TTL_HOURS must be positive"
            )));
        }

        if self.token_ttl > chrono::Duration::hours(MAX_TOKEN_TTL_HOURS) {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "TOKEN_TTL_HOURS must not exceed {}",
                MAX_TOKEN_TTL_HOURS
            )));
        }

        if self.limiter.cleanup_interval.is_zero() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "LIMITER_CLEANUP_INTERVAL_SECONDS must be positive"
            )));
        }

        self.limiter.quota()?;

        if self.environment == Environment::Prod
            && self.cors.allowed_origins.iter().any(|o| o == "*")
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Wildcard CORS origin not allowed in production"
            )));
        }

        Ok(())
    }
}

fn get_env<F>(lookup: &F, key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(val) => Ok(val),
        None => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required in production but not set",
                    key
                )))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} is required but not set",
                    key
                )))
            }
        }
    }
}

fn parse<T>(key: &str, value: String) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value {:?}: {}", key, value, e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<LibraryConfig, AppError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        LibraryConfig::from_lookup(core_config::Config::default(), |key| vars.get(key).cloned())
    }

    #[test]
    fn test_dev_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config.environment, Environment::Dev);
        assert!(config.database.is_none());
        assert_eq!(config.limiter.requests_per_second, 4.0);
        assert_eq!(config.limiter.burst, 8);
        assert!(config.limiter.enabled);
        assert_eq!(config.limiter.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.limiter.idle_timeout, Duration::from_secs(180));
        assert_eq!(config.store_timeout, Duration::from_secs(3));
        assert_eq!(config.token_ttl, chrono::Duration::hours(24));
    }

    #[test]
    fn test_database_and_cors() {
        let config = load(&[
            ("DATABASE_URL", "postgres://localhost/library"),
            ("DATABASE_MAX_CONNECTIONS", "10"),
            ("CORS_ALLOWED_ORIGINS", "https://a.example, https://b.example"),
        ])
        .unwrap();

        let database = config.database.unwrap();
        assert_eq!(database.max_connections, 10);
        assert_eq!(database.min_connections, 1);
        assert_eq!(database.idle_timeout, Duration::from_secs(900));
        assert_eq!(
            config.cors.allowed_origins,
            ["https://a.example", "https://b.example"]
        );
    }

    #[test]
    fn test_invalid_limiter_settings_rejected() {
        assert!(matches!(
            load(&[("LIMITER_RPS", "0")]),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            load(&[("LIMITER_BURST", "0")]),
            Err(AppError::ConfigError(_))
        ));
        assert!(matches!(
            load(&[("LIMITER_BURST", "many")]),
            Err(AppError::ConfigError(_))
        ));
    }

    #[test]
    fn test_out_of_range_values_are_config_errors() {
        for vars in [
            [("LIMITER_RPS", "1e-300")],
            [("TOKEN_TTL_HOURS", "9223372036854775807")],
            [("TOKEN_TTL_HOURS", "8761")],
            [("TOKEN_TTL_HOURS", "-1")],
        ] {
            assert!(
                matches!(load(&vars), Err(AppError::ConfigError(_))),
                "{:?} should be rejected",
                vars
            );
        }

        let config = load(&[("TOKEN_TTL_HOURS", "8760")]).unwrap();
        assert_eq!(config.token_ttl, chrono::Duration::hours(MAX_TOKEN_TTL_HOURS));
    }

    #[test]
    fn test_prod_requires_database() {
        assert!(matches!(
            load(&[("ENVIRONMENT", "prod")]),
            Err(AppError::ConfigError(_))
        ));
    }
}
