use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub access: AccessConfig,
    #[serde(default)]
    pub eviction: EvictionConfig,
    #[serde(default)]
    pub udp: UdpConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// UDP listener port, `None` or 0 disables the UDP transport
    #[serde(default = "default_udp_port")]
    pub udp_port: Option<u16>,
    #[serde(default = "default_num_threads")]
    pub num_threads: usize,
    /// Ceiling for any single backend operation
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_announce_interval")]
    pub announce_interval: u32,
    /// Leave the announcing peer out of its own peer list
    #[serde(default = "default_exclude_self")]
    pub exclude_self: bool,
    #[serde(default = "default_numwant")]
    pub default_numwant: u32,
    #[serde(default = "default_max_numwant")]
    pub max_numwant: u32,
    /// Register peers at the `ip` query parameter instead of the socket address
    #[serde(default)]
    pub accept_ip_param: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_bucket_capacity")]
    pub capacity: u32,
    #[serde(default = "default_refill_per_second")]
    pub refill_per_second: f64,
    /// Optional second, per-IP layer
    #[serde(default)]
    pub per_ip_requests_per_minute: Option<u32>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// Only IPs on the allow list are admitted
    Allowlist,
    /// Any IP not denied is admitted while the allow list is empty
    Open,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessConfig {
    #[serde(default = "default_access_mode")]
    pub mode: AccessMode,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub denied_ips: Vec<String>,
    #[serde(default)]
    pub admin_api_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EvictionConfig {
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout_secs: i64,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UdpProtocol {
    /// Standard connect/announce/scrape exchange
    Bep15,
    /// Bare `peer_id | info_hash | port` datagrams answered with bencode
    Raw,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UdpConfig {
    #[serde(default = "default_udp_protocol")]
    pub protocol: UdpProtocol,
    #[serde(default = "default_connection_ttl")]
    pub connection_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_wal_path")]
    pub wal_path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_console")]
    pub console: bool,
}

// Default value functions
fn default_http_port() -> u16 {
    8080
}

fn default_udp_port() -> Option<u16> {
    Some(8081)
}

fn default_num_threads() -> usize {
    num_cpus::get()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_announce_interval() -> u32 {
    1800 // 30 minutes
}

fn default_exclude_self() -> bool {
    true
}

fn default_numwant() -> u32 {
    50
}

fn default_max_numwant() -> u32 {
    200
}

fn default_bucket_capacity() -> u32 {
    10
}

fn default_refill_per_second() -> f64 {
    10.0
}

fn default_access_mode() -> AccessMode {
    AccessMode::Allowlist
}

fn default_sweep_interval() -> u64 {
    600 // 10 minutes
}

fn default_peer_timeout() -> i64 {
    1800 // 30 minutes
}

fn default_udp_protocol() -> UdpProtocol {
    UdpProtocol::Bep15
}

fn default_connection_ttl() -> i64 {
    120
}

fn default_wal_path() -> PathBuf {
    PathBuf::from("tracker.wal")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_console() -> bool {
    false
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            udp_port: default_udp_port(),
            num_threads: default_num_threads(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            announce_interval: default_announce_interval(),
            exclude_self: default_exclude_self(),
            default_numwant: default_numwant(),
            max_numwant: default_max_numwant(),
            accept_ip_param: false,
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: default_bucket_capacity(),
            refill_per_second: default_refill_per_second(),
            per_ip_requests_per_minute: None,
        }
    }
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            mode: default_access_mode(),
            allowed_ips: Vec::new(),
            denied_ips: Vec::new(),
            admin_api_key: None,
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval(),
            peer_timeout_secs: default_peer_timeout(),
        }
    }
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            protocol: default_udp_protocol(),
            connection_ttl_secs: default_connection_ttl(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            wal_path: default_wal_path(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            console: default_console(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// UDP port if the transport is enabled
    pub fn udp_port(&self) -> Option<u16> {
        self.udp_port.filter(|port| *port != 0)
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .context("Failed to parse config file")?;

        Ok(config)
    }

    /// Resolve the configuration for the binary.
    ///
    /// An explicit path must exist. Without one, `config.toml` is used when present
    /// and built-in defaults otherwise. Environment overrides are applied last.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new("config.toml");
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Apply `TRACKER_PORT`, `TRACKER_UDP_PORT` and `RATE_LIMIT`. Unparsable values are ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup("TRACKER_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.http_port = port;
        }

        if let Some(port) = lookup("TRACKER_UDP_PORT").and_then(|v| v.parse::<u16>().ok()) {
            self.server.udp_port = Some(port);
        }

        if let Some(rate) = lookup("RATE_LIMIT").and_then(|v| v.parse::<u32>().ok()) {
            self.rate_limit.capacity = rate;
            self.rate_limit.refill_per_second = rate as f64;
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.server.http_port == 0 {
            bail!("http_port must be greater than 0");
        }

        if self.server.num_threads == 0 {
            bail!("num_threads must be greater than 0");
        }

        if self.server.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than 0");
        }

        if self.tracker.announce_interval == 0 {
            bail!("announce_interval must be greater than 0");
        }

        if self.tracker.default_numwant > self.tracker.max_numwant {
            bail!(
                "default_numwant ({}) must not exceed max_numwant ({})",
                self.tracker.default_numwant,
                self.tracker.max_numwant
            );
        }

        if self.rate_limit.capacity == 0 {
            bail!("rate_limit capacity must be greater than 0");
        }

        if !(self.rate_limit.refill_per_second > 0.0) {
            bail!("rate_limit refill_per_second must be greater than 0");
        }

        if self.rate_limit.per_ip_requests_per_minute == Some(0) {
            bail!("per_ip_requests_per_minute must be greater than 0 when set");
        }

        if self.eviction.sweep_interval_secs == 0 {
            bail!("sweep_interval_secs must be greater than 0");
        }

        if self.eviction.peer_timeout_secs <= self.eviction.sweep_interval_secs as i64 {
            bail!(
                "peer_timeout_secs ({}) must be greater than sweep_interval_secs ({})",
                self.eviction.peer_timeout_secs,
                self.eviction.sweep_interval_secs
            );
        }

        if self.udp.connection_ttl_secs <= 0 {
            bail!("connection_ttl_secs must be greater than 0");
        }

        for ip in self.access.allowed_ips.iter().chain(self.access.denied_ips.iter()) {
            ip.parse::<IpAddr>()
                .context(format!("Invalid IP address '{}' in access config", ip))?;
        }

        if matches!(&self.access.admin_api_key, Some(key) if key.is_empty()) {
            bail!("admin_api_key must not be empty when set");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.as_str()) {
            bail!(
                "Invalid log level '{}'. Must be one of: trace, debug, info, warn, error",
                self.logging.level
            );
        }

        let valid_formats = ["json", "console"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            bail!(
                "Invalid log format '{}'. Must be one of: json, console",
                self.logging.format
            );
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = Config::from_toml("").unwrap();

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.server.udp_port(), Some(8081));
        assert_eq!(config.tracker.announce_interval, 1800);
        assert!(config.tracker.exclude_self);
        assert_eq!(config.eviction.sweep_interval_secs, 600);
        assert_eq!(config.eviction.peer_timeout_secs, 1800);
        assert_eq!(config.access.mode, AccessMode::Allowlist);
        assert_eq!(config.udp.protocol, UdpProtocol::Bep15);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml(
            r#"
            [server]
            http_port = 9000
            udp_port = 0
            request_timeout_secs = 5

            [tracker]
            exclude_self = false

            [rate_limit]
            capacity = 50
            refill_per_second = 25.0
            per_ip_requests_per_minute = 30

            [access]
            mode = "open"
            allowed_ips = ["10.0.0.1"]
            denied_ips = ["192.168.1.100", "2001:db8::1"]
            admin_api_key = "secret"

            [udp]
            protocol = "raw"

            [logging]
            format = "console"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.http_port, 9000);
        assert_eq!(config.server.udp_port(), None);
        assert_eq!(config.server.request_timeout(), Duration::from_secs(5));
        assert!(!config.tracker.exclude_self);
        assert_eq!(config.rate_limit.per_ip_requests_per_minute, Some(30));
        assert_eq!(config.access.mode, AccessMode::Open);
        assert_eq!(config.access.denied_ips.len(), 2);
        assert_eq!(config.udp.protocol, UdpProtocol::Raw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("TRACKER_PORT", "7070"),
            ("TRACKER_UDP_PORT", "7071"),
            ("RATE_LIMIT", "3"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.http_port, 7070);
        assert_eq!(config.server.udp_port(), Some(7071));
        assert_eq!(config.rate_limit.capacity, 3);
        assert_eq!(config.rate_limit.refill_per_second, 3.0);
    }

    #[test]
    fn test_env_overrides_ignore_garbage() {
        let mut config = Config::default();
        config.apply_env_overrides(|key| match key {
            "TRACKER_PORT" => Some("not-a-port".to_string()),
            "RATE_LIMIT" => Some("-1".to_string()),
            _ => None,
        });

        assert_eq!(config.server.http_port, 8080);
        assert_eq!(config.rate_limit.capacity, 10);
    }

    #[test]
    fn test_validate_rejects_timeout_below_sweep_interval() {
        let mut config = Config::default();
        config.eviction.peer_timeout_secs = 300;
        config.eviction.sweep_interval_secs = 600;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_access_ip() {
        let mut config = Config::default();
        config.access.denied_ips = vec!["not-an-ip".to_string()];

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_log_format() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nhttp_port = 6969\n").unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.http_port, 6969);
    }

    #[test]
    fn test_from_file_missing() {
        let result = Config::from_file(Path::new("/nonexistent/tracker/config.toml"));
        assert!(result.is_err());
    }
}
