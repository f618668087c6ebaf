use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            api_port: default_api_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Static token granting admin access, for automation and first-run setup
    #[serde(default = "default_admin_token")]
    pub admin_token: String,
    #[serde(default = "default_admin_email")]
    pub admin_email: String,
    #[serde(default)]
    pub admin_password: Option<String>,
    /// Session lifetime in days
    #[serde(default = "default_session_ttl_days")]
    pub session_ttl_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            admin_token: default_admin_token(),
            admin_email: default_admin_email(),
            admin_password: None,
            session_ttl_days: default_session_ttl_days(),
        }
    }
}

fn default_admin_token() -> String {
    // Generate a random token if not provided
    uuid::Uuid::new_v4().to_string()
}

fn default_admin_email() -> String {
    "admin@hailr.local".to_string()
}

fn default_session_ttl_days() -> i64 {
    7
}

#[derive(Debug, Clone, Deserialize)]
pub struct DispatchConfig {
    /// Radius of the driver offer board in kilometers
    #[serde(default = "default_board_radius_km")]
    pub board_radius_km: f64,
    /// Radius of the passenger-side nearby-driver listing in kilometers
    #[serde(default = "default_nearby_driver_radius_km")]
    pub nearby_driver_radius_km: f64,
    /// Seconds an unassigned ride may wait for a driver before it is expired
    #[serde(default = "default_negotiation_timeout_secs")]
    pub negotiation_timeout_secs: i64,
    /// Seconds after which a driver's last location fix counts as stale
    #[serde(default = "default_location_stale_secs")]
    pub location_stale_secs: i64,
    /// Interval between sweeper passes in seconds
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            board_radius_km: default_board_radius_km(),
            nearby_driver_radius_km: default_nearby_driver_radius_km(),
            negotiation_timeout_secs: default_negotiation_timeout_secs(),
            location_stale_secs: default_location_stale_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_board_radius_km() -> f64 {
    15.0
}

fn default_nearby_driver_radius_km() -> f64 {
    10.0
}

fn default_negotiation_timeout_secs() -> i64 {
    600
}

fn default_location_stale_secs() -> i64 {
    90
}

fn default_sweep_interval_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rate_limit_enabled")]
    pub enabled: bool,
    /// Window duration in seconds
    #[serde(default = "default_rate_limit_window")]
    pub window_seconds: u64,
    /// Max requests per window for general API endpoints
    #[serde(default = "default_api_requests")]
    pub api_requests_per_window: u32,
    /// Max requests per window for auth endpoints
    #[serde(default = "default_auth_requests")]
    pub auth_requests_per_window: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: default_rate_limit_enabled(),
            window_seconds: default_rate_limit_window(),
            api_requests_per_window: default_api_requests(),
            auth_requests_per_window: default_auth_requests(),
        }
    }
}

fn default_rate_limit_enabled() -> bool {
    true
}

fn default_rate_limit_window() -> u64 {
    60
}

fn default_api_requests() -> u32 {
    300
}

fn default_auth_requests() -> u32 {
    20
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, falling back to defaults when
    /// the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
            info!("Loaded configuration from {}", path.display());
            Ok(config)
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Ok(Config::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.api_port, 8080);
        assert_eq!(config.dispatch.board_radius_km, 15.0);
        assert_eq!(config.dispatch.nearby_driver_radius_km, 10.0);
        assert_eq!(config.dispatch.negotiation_timeout_secs, 600);
        assert_eq!(config.auth.session_ttl_days, 7);
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [server]
            api_port = 9090

            [dispatch]
            board_radius_km = 25.0
            "#,
        )
        .unwrap();
        assert_eq!(config.server.api_port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.dispatch.board_radius_km, 25.0);
        assert_eq!(config.dispatch.location_stale_secs, 90);
    }
}
