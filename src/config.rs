//! Engine configuration.
//!
//! The heuristic constants used by the runner and the analyzers are
//! empirical tuning knobs, not derived values. They are kept here so
//! callers can override them from a TOML file or in code.

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://localhost";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base used to resolve relative test case endpoints.
    pub base_url: String,
    pub concurrency: ConcurrencyConfig,
    pub suite: SuiteConfig,
    pub thresholds: AnalysisThresholds,
    pub transport: TransportConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            concurrency: ConcurrencyConfig::default(),
            suite: SuiteConfig::default(),
            thresholds: AnalysisThresholds::default(),
            transport: TransportConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConcurrencyConfig {
    /// Share of logical cores used as the base concurrency.
    pub cpu_fraction: f64,
    /// Estimated memory needed by one in-flight test.
    pub memory_per_slot_mb: u64,
    /// Hard cap on the derived concurrency level.
    pub max_concurrency: usize,
    /// Pause between batches in batch mode.
    pub batch_pause_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_count_override: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_memory_mb_override: Option<u64>,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            cpu_fraction: 0.75,
            memory_per_slot_mb: 10,
            max_concurrency: 10,
            batch_pause_ms: 100,
            processor_count_override: None,
            available_memory_mb_override: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SuiteConfig {
    /// Upper bound on concurrency for a suite run.
    pub max_concurrency: usize,
    /// When set, suites run in ordered batches of this size.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            batch_size: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisThresholds {
    /// Minimum confidence for a capability to be considered valid.
    pub capability_valid: f64,
    pub status_validated: f64,
    pub status_learned: f64,
    pub status_learning: f64,
    /// Pattern share of all failures for each severity band.
    pub severity_critical: f64,
    pub severity_high: f64,
    pub severity_medium: f64,
    /// Minimum absolute correlation for a trend to count.
    pub trend_significance: f64,
    /// Allowed relative deviation from the mean for consistent timings.
    pub consistency_tolerance: f64,
    /// Test count at which the sample-size factor saturates.
    pub confidence_saturation_tests: usize,
    pub long_running_test_secs: f64,
    pub high_failure_rate: f64,
    pub fast_success_ms: f64,
    pub slow_average_ms: f64,
}

impl Default for AnalysisThresholds {
    fn default() -> Self {
        Self {
            capability_valid: 0.8,
            status_validated: 0.9,
            status_learned: 0.7,
            status_learning: 0.5,
            severity_critical: 0.8,
            severity_high: 0.5,
            severity_medium: 0.3,
            trend_significance: 0.3,
            consistency_tolerance: 0.5,
            confidence_saturation_tests: 10,
            long_running_test_secs: 10.0,
            high_failure_rate: 0.2,
            fast_success_ms: 1000.0,
            slow_average_ms: 5000.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub follow_redirects: bool,
    pub verify_ssl: bool,
    pub keep_alive: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            follow_redirects: true,
            verify_ssl: true,
            keep_alive: true,
            proxy_url: None,
            user_agent: format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document. Missing sections take defaults.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        reqwest::Url::parse(&self.base_url)
            .map_err(|err| EngineError::InvalidConfig(format!("base_url `{}`: {err}", self.base_url)))?;

        let c = &self.concurrency;
        if !(c.cpu_fraction > 0.0 && c.cpu_fraction <= 1.0) {
            return Err(EngineError::InvalidConfig(
                "concurrency.cpu_fraction must be in (0, 1]".to_string(),
            ));
        }
        if c.memory_per_slot_mb == 0 {
            return Err(EngineError::InvalidConfig(
                "concurrency.memory_per_slot_mb must be greater than 0".to_string(),
            ));
        }
        if c.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "concurrency.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.suite.max_concurrency == 0 {
            return Err(EngineError::InvalidConfig(
                "suite.max_concurrency must be greater than 0".to_string(),
            ));
        }
        if self.suite.batch_size == Some(0) {
            return Err(EngineError::InvalidConfig(
                "suite.batch_size must be greater than 0".to_string(),
            ));
        }

        let t = &self.thresholds;
        let unit_fields = [
            ("capability_valid", t.capability_valid),
            ("status_validated", t.status_validated),
            ("status_learned", t.status_learned),
            ("status_learning", t.status_learning),
            ("severity_critical", t.severity_critical),
            ("severity_high", t.severity_high),
            ("severity_medium", t.severity_medium),
            ("trend_significance", t.trend_significance),
            ("high_failure_rate", t.high_failure_rate),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::InvalidConfig(format!(
                    "thresholds.{name} must be in [0, 1], got {value}"
                )));
            }
        }
        if !(t.status_validated >= t.status_learned && t.status_learned >= t.status_learning) {
            return Err(EngineError::InvalidConfig(
                "capability status thresholds must be descending".to_string(),
            ));
        }
        if !(t.severity_critical >= t.severity_high && t.severity_high >= t.severity_medium) {
            return Err(EngineError::InvalidConfig(
                "severity thresholds must be descending".to_string(),
            ));
        }
        if t.confidence_saturation_tests == 0 {
            return Err(EngineError::InvalidConfig(
                "thresholds.confidence_saturation_tests must be greater than 0".to_string(),
            ));
        }

        if let Some(proxy) = self.transport.proxy_url.as_deref().map(str::trim) {
            if !proxy.is_empty() {
                reqwest::Url::parse(proxy)
                    .map_err(|err| EngineError::InvalidConfig(format!("Invalid proxy URL: {err}")))?;
            }
        }

        Ok(())
    }
}
