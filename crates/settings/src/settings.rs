use std::path::Path;

use anyhow::Context;
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgSslMode};

/// Top-level application settings, one section per concern.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Database connection settings.
    pub db: DbSettings,
    /// Google Maps Distance Matrix settings.
    pub gmaps: GmapsSettings,
    /// Read-API settings.
    #[serde(default)]
    pub api: ApiSettings,
    /// Crawl settings.
    #[serde(default)]
    pub scrape: ScrapeSettings,
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct DbSettings {
    /// Database host.
    pub host: String,
    /// Database port.
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database user.
    pub user: String,
    /// Database password.
    pub password: Secret<String>,
    /// Database name.
    pub dbname: String,
    /// Require TLS for the connection.
    #[serde(default)]
    pub require_ssl: bool,
}

/// Settings for the external distance API.
#[derive(Debug, Clone, Deserialize)]
pub struct GmapsSettings {
    /// Google Maps API key.
    pub apikey: String,
}

/// Settings for the read-only JSON API.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiSettings {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Prefix prepended to stored image names in API responses.
    #[serde(default)]
    pub image_base_url: String,
    /// Minimum number of pooled database connections.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            image_base_url: String::new(),
            min_connections: default_min_connections(),
        }
    }
}

/// Settings for the crawl binaries.
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSettings {
    /// Park portal root page (park flow entry point).
    #[serde(default = "default_portal_url")]
    pub portal_url: String,
    /// Reservation viewer listing page (campsite/reservation flow entry point).
    #[serde(default = "default_listing_url")]
    pub listing_url: String,
    /// Delay between request dispatches, in milliseconds.
    #[serde(default = "default_download_delay_ms")]
    pub download_delay_ms: u64,
    /// Maximum sibling entities crawled concurrently.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Directory to download campsite images into. No downloads when unset.
    #[serde(default)]
    pub images_store: Option<String>,
}

impl Default for ScrapeSettings {
    fn default() -> Self {
        Self {
            portal_url: default_portal_url(),
            listing_url: default_listing_url(),
            download_delay_ms: default_download_delay_ms(),
            max_concurrency: default_max_concurrency(),
            images_store: None,
        }
    }
}

fn default_db_port() -> u16 {
    5432
}

fn default_bind_address() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_min_connections() -> u32 {
    1
}

fn default_portal_url() -> String {
    "http://www.ontarioparks.com/en".to_string()
}

fn default_listing_url() -> String {
    "https://reservations.ontarioparks.com/Algonquin-Achray?List".to_string()
}

fn default_download_delay_ms() -> u64 {
    500
}

fn default_max_concurrency() -> usize {
    4
}

impl Settings {
    /// Load settings from a config file, with `PARKWATCH_`-prefixed
    /// environment variables taking precedence.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("PARKWATCH")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        settings
            .try_deserialize::<Settings>()
            .context("Failed to deserialize settings")
    }
}

impl DbSettings {
    /// Build `sqlx` connection options from these settings.
    pub fn connect_options(&self) -> PgConnectOptions {
        let ssl_mode = if self.require_ssl {
            PgSslMode::Require
        } else {
            PgSslMode::Prefer
        };
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(self.password.expose_secret())
            .database(&self.dbname)
            .ssl_mode(ssl_mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scrape_defaults_fill_missing_sections() {
        let scrape = ScrapeSettings::default();
        assert_eq!(scrape.download_delay_ms, 500);
        assert_eq!(scrape.max_concurrency, 4);
        assert!(scrape.images_store.is_none());
        assert!(scrape.listing_url.contains("reservations"));
    }

    #[test]
    fn api_defaults() {
        let api = ApiSettings::default();
        assert_eq!(api.bind_address, "0.0.0.0:8080");
        assert_eq!(api.min_connections, 1);
        assert!(api.image_base_url.is_empty());
    }
}
