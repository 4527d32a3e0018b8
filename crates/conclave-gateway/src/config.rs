//! Gateway configuration

use conclave_core::Expert;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::{GatewayError, Result, DEFAULT_HOST, DEFAULT_PORT};

/// Main gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// HTTP surface
    pub server: ServerSettings,

    /// Connection pool
    pub pool: PoolSettings,

    /// Circuit breakers
    pub breaker: BreakerSettings,

    /// Result cache
    pub cache: CacheSettings,

    /// Error / fallback dispatcher
    pub dispatcher: DispatcherSettings,

    /// Health thresholds
    pub monitor: MonitorSettings,

    /// Expert registry
    pub experts: Vec<Expert>,
}

impl GatewayConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    pub fn with_expert(mut self, expert: Expert) -> Self {
        self.experts.push(expert);
        self
    }

    pub fn with_max_sessions_per_expert(mut self, max: usize) -> Self {
        self.pool.max_sessions_per_expert = max;
        self
    }

    pub fn with_breaker(mut self, failure_threshold: u32, cooldown: Duration) -> Self {
        self.breaker.failure_threshold = failure_threshold;
        self.breaker.cooldown_ms = cooldown.as_millis() as u64;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.dispatcher.call_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| GatewayError::InvalidConfig(format!("bad listen address: {}", e)))
    }

    /// Load configuration from a TOML or JSON file (chosen by extension)
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str(&content)?,
            _ => toml::from_str(&content)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Apply `CONCLAVE_HOST` / `CONCLAVE_PORT` overrides
    pub fn apply_env(mut self) -> Result<Self> {
        if let Ok(host) = std::env::var("CONCLAVE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("CONCLAVE_PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| GatewayError::InvalidConfig(format!("CONCLAVE_PORT={}", port)))?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        let checks = [
            (self.pool.max_sessions_per_expert == 0, "pool.max_sessions_per_expert must be > 0"),
            (self.breaker.failure_threshold == 0, "breaker.failure_threshold must be > 0"),
            (self.cache.assignment_ttl_secs == 0, "cache.assignment_ttl_secs must be > 0"),
            (self.cache.handoff_ttl_secs == 0, "cache.handoff_ttl_secs must be > 0"),
            (self.cache.max_entries == 0, "cache.max_entries must be > 0"),
            (self.dispatcher.call_timeout_ms == 0, "dispatcher.call_timeout_ms must be > 0"),
        ];
        if let Some((_, message)) = checks.iter().find(|(failed, _)| *failed) {
            return Err(GatewayError::InvalidConfig(message.to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for expert in &self.experts {
            if expert.id.is_blank() {
                return Err(GatewayError::InvalidConfig("expert id must not be empty".into()));
            }
            if !seen.insert(&expert.id) {
                return Err(GatewayError::InvalidConfig(format!(
                    "duplicate expert id: {}",
                    expert.id
                )));
            }
        }
        Ok(())
    }
}

/// HTTP listen settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolSettings {
    /// Maximum concurrent sessions per expert
    pub max_sessions_per_expert: usize,

    /// How long acquire waits for a free session before failing
    pub acquire_timeout_ms: u64,

    /// Idle sessions older than this are evicted on the next acquire
    pub idle_timeout_secs: u64,
}

impl PoolSettings {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sessions_per_expert: 4,
            acquire_timeout_ms: 2_000,
            idle_timeout_secs: 300,
        }
    }
}

/// Circuit breaker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    /// Consecutive failures before the breaker opens
    pub failure_threshold: u32,

    /// Time an open breaker waits before allowing a trial call
    pub cooldown_ms: u64,
}

impl BreakerSettings {
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

/// Result cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub assignment_ttl_secs: u64,
    pub handoff_ttl_secs: u64,
    pub max_entries: usize,
}

impl CacheSettings {
    pub fn assignment_ttl(&self) -> Duration {
        Duration::from_secs(self.assignment_ttl_secs)
    }

    pub fn handoff_ttl(&self) -> Duration {
        Duration::from_secs(self.handoff_ttl_secs)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            assignment_ttl_secs: 300,  // 5 minutes
            handoff_ttl_secs: 1_800,   // 30 minutes
            max_entries: 10_000,
        }
    }
}

/// Dispatcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherSettings {
    /// Per-call bound on every expert call
    pub call_timeout_ms: u64,

    /// Number of recent errors kept for the monitor
    pub recent_errors: usize,
}

impl DispatcherSettings {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            recent_errors: 100,
        }
    }
}

/// Thresholds used when judging overall health
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorSettings {
    pub max_error_rate: f64,
    pub min_cache_hit_rate: f64,
    /// Cache hit rate is only judged after this many lookups
    pub min_cache_lookups: u64,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            max_error_rate: 0.1,
            min_cache_hit_rate: 0.3,
            min_cache_lookups: 20,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.server.host, DEFAULT_HOST);
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.assignment_ttl(), Duration::from_secs(300));
    }

    #[test]
    fn test_config_builder() {
        let config = GatewayConfig::new()
            .with_host("0.0.0.0")
            .with_port(8080)
            .with_max_sessions_per_expert(2)
            .with_breaker(3, Duration::from_millis(250))
            .with_expert(Expert::new("security", "local://security"));

        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.pool.max_sessions_per_expert, 2);
        assert_eq!(config.breaker.cooldown(), Duration::from_millis(250));
        assert_eq!(config.experts.len(), 1);
        assert!(config.socket_addr().is_ok());
    }

    #[test]
    fn test_validation_rejects_zero_and_duplicates() {
        assert!(GatewayConfig::new().with_max_sessions_per_expert(0).validate().is_err());

        let duplicated = GatewayConfig::new()
            .with_expert(Expert::new("a", "local://a"))
            .with_expert(Expert::new("a", "local://b"));
        assert!(matches!(
            duplicated.validate(),
            Err(GatewayError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[pool]
max_sessions_per_expert = 8

[breaker]
failure_threshold = 2

[[experts]]
id = "architecture"
endpoint = "http://127.0.0.1:9100"
specialties = ["design"]
"#
        )
        .unwrap();

        let config = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(config.pool.max_sessions_per_expert, 8);
        assert_eq!(config.pool.acquire_timeout_ms, 2_000);
        assert_eq!(config.breaker.failure_threshold, 2);
        assert_eq!(config.experts[0].id.as_str(), "architecture");
    }

    #[test]
    fn test_config_json_roundtrip_file() {
        let config = GatewayConfig::new().with_expert(Expert::new("a", "local://a"));
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "{}", serde_json::to_string(&config).unwrap()).unwrap();

        let parsed = GatewayConfig::from_file(file.path()).unwrap();
        assert_eq!(parsed.experts, config.experts);
    }
}
