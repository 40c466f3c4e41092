use std::env;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub engagement: EngagementConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origin allowed by CORS.
    pub frontend_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration_hours: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    /// Allowed requests per second (per IP) for RSVP writes
    pub writes_per_second: u32,
    /// Burst size for RSVP writes
    pub writes_burst: u32,
}

/// Limits applied when records are created and responded to.
#[derive(Debug, Clone, Deserialize)]
pub struct EngagementConfig {
    pub check_in_min_duration_minutes: i64,
    pub check_in_max_duration_minutes: i64,
    /// How far in the future a check-in may start.
    pub check_in_max_start_lead_minutes: i64,
    /// Upper bound on occurrences materialized from one recurrence rule.
    pub series_max_occurrences: u32,
    /// Buffered events per subscriber on the same-page sync bus.
    pub sync_channel_capacity: usize,
}

fn parse_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8080".to_string())
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue("PORT".to_string()))?,
                frontend_url: env::var("FRONTEND_URL")
                    .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL")
                    .unwrap_or_else(|_| "sqlite://data/community.db".to_string()),
                max_connections: parse_or("DATABASE_MAX_CONNECTIONS", 5),
            },
            jwt: JwtConfig {
                secret: env::var("JWT_SECRET")
                    .map_err(|_| ConfigError::MissingEnv("JWT_SECRET".to_string()))?,
                expiration_hours: parse_or("JWT_EXPIRATION_HOURS", 24),
            },
            rate_limit: RateLimitConfig {
                writes_per_second: parse_or("RATE_LIMIT_WRITES_PER_SECOND", 5),
                writes_burst: parse_or("RATE_LIMIT_WRITES_BURST", 20),
            },
            engagement: EngagementConfig {
                check_in_min_duration_minutes: parse_or(
                    "CHECK_IN_MIN_DURATION_MINUTES",
                    defaults.engagement.check_in_min_duration_minutes,
                ),
                check_in_max_duration_minutes: parse_or(
                    "CHECK_IN_MAX_DURATION_MINUTES",
                    defaults.engagement.check_in_max_duration_minutes,
                ),
                check_in_max_start_lead_minutes: parse_or(
                    "CHECK_IN_MAX_START_LEAD_MINUTES",
                    defaults.engagement.check_in_max_start_lead_minutes,
                ),
                series_max_occurrences: parse_or(
                    "SERIES_MAX_OCCURRENCES",
                    defaults.engagement.series_max_occurrences,
                ),
                sync_channel_capacity: parse_or(
                    "SYNC_CHANNEL_CAPACITY",
                    defaults.engagement.sync_channel_capacity,
                ),
            },
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnv(String),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

impl Default for EngagementConfig {
    fn default() -> Self {
        EngagementConfig {
            check_in_min_duration_minutes: 30,
            check_in_max_duration_minutes: 480,
            check_in_max_start_lead_minutes: 60,
            series_max_occurrences: 52,
            sync_channel_capacity: 64,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 8080,
                frontend_url: "http://localhost:3000".to_string(),
            },
            database: DatabaseConfig {
                url: "sqlite://data/community.db".to_string(),
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: String::new(),
                expiration_hours: 24,
            },
            rate_limit: RateLimitConfig {
                writes_per_second: 5,
                writes_burst: 20,
            },
            engagement: EngagementConfig::default(),
        }
    }
}
