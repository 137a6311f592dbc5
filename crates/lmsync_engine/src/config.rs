//! Configuration for the sync engine.
//!
//! Configuration is an explicit value passed through the engine, loadable
//! from a JSON file, so cycles stay testable in isolation.

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// The kind of source a database speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// An AlterMap CouchDB.
    AlterMap,
    /// An OpenWiFiMap CouchDB.
    OpenWifiMap,
}

impl SourceKind {
    /// Human-readable name, used in logs and error messages.
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::AlterMap => "altermap",
            SourceKind::OpenWifiMap => "openwifimap",
        }
    }

    /// Default target-id prefix for this kind, matching upstream behavior.
    pub fn default_id_prefix(&self) -> &'static str {
        match self {
            SourceKind::AlterMap => "",
            SourceKind::OpenWifiMap => "owm2libremap_",
        }
    }
}

/// One configured source database.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Stable identifier for this source; keys the persisted checkpoint.
    pub id: String,
    /// Database URL.
    pub url: String,
    /// Which native schema the database speaks.
    pub kind: SourceKind,
    /// Prefix for target ids. Two sources whose native id spaces could
    /// collide must be configured with disjoint prefixes.
    #[serde(default)]
    pub id_prefix: Option<String>,
}

impl SourceConfig {
    /// Creates a source configuration with the kind's default id prefix.
    pub fn new(id: impl Into<String>, url: impl Into<String>, kind: SourceKind) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
            kind,
            id_prefix: None,
        }
    }

    /// Overrides the target-id prefix.
    pub fn with_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// The effective target-id prefix for this source.
    pub fn id_prefix(&self) -> &str {
        self.id_prefix
            .as_deref()
            .unwrap_or_else(|| self.kind.default_id_prefix())
    }
}

/// Configuration for the whole engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Source databases to replicate from.
    pub sources: Vec<SourceConfig>,
    /// Target LibreMap database URL.
    pub target_url: String,
    /// Pause between cycles in continuous mode, in seconds.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Maximum number of change events fetched per cycle, if bounded.
    #[serde(default)]
    pub fetch_limit: Option<u32>,
    /// Retry behavior for transient store failures in continuous mode.
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_poll_interval_secs() -> u64 {
    10
}

impl SyncConfig {
    /// Creates a configuration with defaults and no sources.
    pub fn new(target_url: impl Into<String>) -> Self {
        Self {
            sources: Vec::new(),
            target_url: target_url.into(),
            poll_interval_secs: default_poll_interval_secs(),
            fetch_limit: None,
            retry: RetryConfig::default(),
        }
    }

    /// Adds a source.
    pub fn with_source(mut self, source: SourceConfig) -> Self {
        self.sources.push(source);
        self
    }

    /// Sets the inter-cycle pause for continuous mode.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_secs = interval.as_secs();
        self
    }

    /// Bounds the number of change events fetched per cycle.
    pub fn with_fetch_limit(mut self, limit: u32) -> Self {
        self.fetch_limit = Some(limit);
        self
    }

    /// Sets the retry configuration.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// The inter-cycle pause for continuous mode.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Loads a configuration from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| SyncError::Config(format!("cannot read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_slice(&bytes)
            .map_err(|e| SyncError::Config(format!("cannot parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the configuration for inconsistencies.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sources.is_empty() {
            return Err(SyncError::Config("no sources configured".into()));
        }
        if self.target_url.is_empty() {
            return Err(SyncError::Config("target_url is empty".into()));
        }
        for (i, source) in self.sources.iter().enumerate() {
            if self.sources[..i].iter().any(|s| s.id == source.id) {
                return Err(SyncError::Config(format!(
                    "duplicate source id {:?}",
                    source.id
                )));
            }
        }
        Ok(())
    }
}

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum consecutive failed attempts before giving up.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Initial delay between retries, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Maximum delay between retries, in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Multiplier for exponential backoff.
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// Whether to add jitter to delays.
    #[serde(default = "default_add_jitter")]
    pub add_jitter: bool,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_add_jitter() -> bool {
    true
}

fn rand_jitter() -> f64 {
    // Use a simple hash of current time for pseudo-random jitter
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .subsec_nanos();
    (nanos % 1000) as f64 / 1000.0
}

impl RetryConfig {
    /// Creates a retry configuration with the given attempt budget.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Creates a configuration with no retries.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay_ms: 0,
            max_delay_ms: 0,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the initial delay.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Sets the maximum delay.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Calculates the backoff delay before retry `attempt` (1-indexed;
    /// attempt 0 has no delay).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let base = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi(attempt.saturating_sub(1) as i32);
        let capped = base.min(self.max_delay_ms as f64);

        if self.add_jitter {
            // Add up to 25% jitter
            let jitter = capped * 0.25 * rand_jitter();
            Duration::from_millis((capped + jitter) as u64)
        } else {
            Duration::from_millis(capped as u64)
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            add_jitter: default_add_jitter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_id_prefixes() {
        let am = SourceConfig::new("am", "http://couch/altermap", SourceKind::AlterMap);
        assert_eq!(am.id_prefix(), "");

        let owm = SourceConfig::new("owm", "http://couch/owm", SourceKind::OpenWifiMap);
        assert_eq!(owm.id_prefix(), "owm2libremap_");

        let custom = am.with_id_prefix("am_");
        assert_eq!(custom.id_prefix(), "am_");
    }

    #[test]
    fn config_builder() {
        let config = SyncConfig::new("http://couch/libremap")
            .with_source(SourceConfig::new("am", "http://couch/am", SourceKind::AlterMap))
            .with_poll_interval(Duration::from_secs(30))
            .with_fetch_limit(500);

        assert_eq!(config.poll_interval(), Duration::from_secs(30));
        assert_eq!(config.fetch_limit, Some(500));
        config.validate().unwrap();
    }

    #[test]
    fn validation_rejects_empty_and_duplicates() {
        let empty = SyncConfig::new("http://couch/libremap");
        assert!(empty.validate().is_err());

        let dup = SyncConfig::new("http://couch/libremap")
            .with_source(SourceConfig::new("s", "http://a", SourceKind::AlterMap))
            .with_source(SourceConfig::new("s", "http://b", SourceKind::OpenWifiMap));
        assert!(matches!(dup.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn config_parses_from_json() {
        let json = r#"{
            "sources": [
                {"id": "am-main", "url": "http://couch:5984/altermap", "kind": "altermap"},
                {"id": "owm-main", "url": "http://couch:5984/owm", "kind": "openwifimap",
                 "id_prefix": "owm_"}
            ],
            "target_url": "http://couch:5984/libremap",
            "poll_interval_secs": 15
        }"#;

        let config: SyncConfig = serde_json::from_str(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources[0].kind, SourceKind::AlterMap);
        assert_eq!(config.sources[1].id_prefix(), "owm_");
        assert_eq!(config.poll_interval(), Duration::from_secs(15));
        // Omitted sections take defaults.
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.fetch_limit, None);
    }

    #[test]
    fn retry_delay_backs_off_and_caps() {
        let mut retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));
        retry.add_jitter = false;

        assert_eq!(retry.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(retry.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(retry.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(retry.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(retry.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(retry.delay_for_attempt(10), Duration::from_millis(500));
    }

    #[test]
    fn retry_delay_jitter_stays_bounded() {
        let retry = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));
        assert!(retry.add_jitter);

        for _ in 0..50 {
            let delay = retry.delay_for_attempt(2);
            // 200ms base plus at most 25% jitter.
            assert!(delay >= Duration::from_millis(200));
            assert!(delay <= Duration::from_millis(250));
        }
    }

    #[test]
    fn no_retry_config() {
        let retry = RetryConfig::no_retry();
        assert_eq!(retry.max_attempts, 1);
        assert_eq!(retry.delay_for_attempt(1), Duration::ZERO);
    }
}
