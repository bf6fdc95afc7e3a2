use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

// ─── Metric keys ──────────────────────────────────────────────────────────────

pub const METRIC_STATUS_CODE: &str = "statusCode";
pub const METRIC_EXECUTION_TIME_MS: &str = "executionTimeMs";
pub const METRIC_RESPONSE_LENGTH: &str = "responseLength";
pub const METRIC_CONTENT_TYPE: &str = "contentType";
pub const METRIC_ERROR: &str = "error";
pub const METRIC_EXCEPTION_TYPE: &str = "exceptionType";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Text(String),
}

impl MetricValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Integer(value) => Some(*value as f64),
            MetricValue::Float(value) => Some(*value),
            MetricValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MetricValue::Text(value) => Some(value),
            _ => None,
        }
    }
}

impl From<i64> for MetricValue {
    fn from(value: i64) -> Self {
        MetricValue::Integer(value)
    }
}

impl From<f64> for MetricValue {
    fn from(value: f64) -> Self {
        MetricValue::Float(value)
    }
}

impl From<&str> for MetricValue {
    fn from(value: &str) -> Self {
        MetricValue::Text(value.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(value: String) -> Self {
        MetricValue::Text(value)
    }
}

/// Captured failure, kept as data so results stay serializable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorDetails {
    pub kind: String,
    pub message: String,
}

impl ErrorDetails {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

// ─── Execution results ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionResult {
    pub assertion_name: String,
    pub passed: bool,
    pub actual_value: String,
    pub expected_value: String,
    pub is_critical: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestExecutionResult {
    pub test_case_id: String,
    pub test_case_name: String,
    pub success: bool,
    /// Round trip of the single HTTP call; queueing delay is excluded.
    pub execution_time: Duration,
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub assertion_results: Vec<AssertionResult>,
    #[serde(default)]
    pub metrics: BTreeMap<String, MetricValue>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorDetails>,
    #[serde(default)]
    pub executed_at_ms: u64,
    #[serde(default = "default_attempt")]
    pub attempt_number: u32,
}

fn default_attempt() -> u32 {
    1
}

impl TestExecutionResult {
    /// A failed result with no response, used for timeouts, transport
    /// failures and faults caught at the runner boundary.
    pub fn failed(
        test_case_id: impl Into<String>,
        test_case_name: impl Into<String>,
        execution_time: Duration,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            test_case_id: test_case_id.into(),
            test_case_name: test_case_name.into(),
            success: false,
            execution_time,
            response: None,
            assertion_results: Vec::new(),
            metrics: BTreeMap::new(),
            error_message: Some(error_message.into()),
            error: None,
            executed_at_ms: now_ms(),
            attempt_number: 1,
        }
    }

    pub fn execution_time_ms(&self) -> f64 {
        self.execution_time.as_secs_f64() * 1000.0
    }

    pub fn failed_assertions(&self) -> impl Iterator<Item = &AssertionResult> {
        self.assertion_results.iter().filter(|result| !result.passed)
    }

    pub fn status_code(&self) -> Option<u16> {
        self.metrics
            .get(METRIC_STATUS_CODE)
            .and_then(MetricValue::as_f64)
            .map(|code| code as u16)
    }
}

/// `true` iff every critical assertion passed.
pub fn critical_assertions_passed(results: &[AssertionResult]) -> bool {
    results.iter().all(|result| result.passed || !result.is_critical)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestSuiteStatus {
    NotStarted,
    Running,
    Completed,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteResult {
    pub suite_name: String,
    pub status: TestSuiteStatus,
    #[serde(default)]
    pub test_results: Vec<TestExecutionResult>,
    pub total_execution_time: Duration,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub executed_at_ms: u64,
}

impl TestSuiteResult {
    pub fn new(suite_name: impl Into<String>) -> Self {
        Self {
            suite_name: suite_name.into(),
            status: TestSuiteStatus::Running,
            test_results: Vec::new(),
            total_execution_time: Duration::ZERO,
            recommendations: Vec::new(),
            executed_at_ms: now_ms(),
        }
    }

    pub fn total_tests(&self) -> usize {
        self.test_results.len()
    }

    pub fn passed_tests(&self) -> usize {
        self.test_results.iter().filter(|r| r.success).count()
    }

    pub fn failed_tests(&self) -> usize {
        self.total_tests() - self.passed_tests()
    }

    /// Percentage of passing tests, 0 for an empty suite.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_tests();
        if total == 0 {
            return 0.0;
        }
        self.passed_tests() as f64 / total as f64 * 100.0
    }
}

pub(crate) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|duration| duration.as_millis() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assertion(passed: bool, is_critical: bool) -> AssertionResult {
        AssertionResult {
            assertion_name: "check".to_string(),
            passed,
            actual_value: String::new(),
            expected_value: String::new(),
            is_critical,
            error_message: None,
        }
    }

    fn result(success: bool) -> TestExecutionResult {
        let mut result = TestExecutionResult::failed("id", "name", Duration::from_millis(5), "x");
        result.success = success;
        result
    }

    #[test]
    fn non_critical_failures_do_not_flip_success() {
        assert!(critical_assertions_passed(&[assertion(true, true), assertion(false, false)]));
        assert!(!critical_assertions_passed(&[assertion(false, true), assertion(true, false)]));
        assert!(critical_assertions_passed(&[]));
    }

    #[test]
    fn suite_rates_stay_in_range() {
        let mut suite = TestSuiteResult::new("suite");
        assert_eq!(suite.success_rate(), 0.0);

        suite.test_results = vec![result(true), result(false), result(true), result(true)];
        assert_eq!(suite.total_tests(), 4);
        assert_eq!(suite.passed_tests(), 3);
        assert_eq!(suite.failed_tests(), 1);
        assert_eq!(suite.success_rate(), 75.0);
    }

    #[test]
    fn metric_values_round_trip_untagged() {
        let mut metrics = BTreeMap::new();
        metrics.insert(METRIC_STATUS_CODE.to_string(), MetricValue::from(200i64));
        metrics.insert(METRIC_EXECUTION_TIME_MS.to_string(), MetricValue::from(12.5));
        metrics.insert(METRIC_CONTENT_TYPE.to_string(), MetricValue::from("text/plain"));
        metrics.insert("whole".to_string(), MetricValue::from(3.0));

        let encoded = serde_json::to_string(&metrics).expect("encode");
        let decoded: BTreeMap<String, MetricValue> = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded, metrics);
    }
}
