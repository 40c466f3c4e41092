//! Visibility, privacy and RSVP consistency engine for residential communities.

pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod services;

#[cfg(test)]
pub(crate) mod test_support;

use config::Config;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
}
