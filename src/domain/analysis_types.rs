use super::results::TestExecutionResult;
use super::types::CapabilityStatus;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::time::Duration;

// ─── Parallel execution ───────────────────────────────────────────────────────

pub const RESOURCE_CPU: &str = "cpu";
pub const RESOURCE_MEMORY: &str = "memory";
pub const RESOURCE_NETWORK: &str = "network";
pub const COORDINATION_AVERAGE_WAIT_MS: &str = "averageWaitTimeMs";
pub const COORDINATION_CONTENTION_RATIO: &str = "contentionRatio";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ParallelExecutionAnalysis {
    pub concurrency_level: usize,
    /// Estimated wall clock for the batch at `concurrency_level`.
    pub total_execution_time: Duration,
    pub average_execution_time: Duration,
    pub estimated_serial_time: Duration,
    pub speedup_ratio: f64,
    pub parallel_efficiency: f64,
    pub recommended_concurrency: usize,
    #[serde(default)]
    pub resource_utilization: BTreeMap<String, f64>,
    #[serde(default)]
    pub thread_coordination_stats: BTreeMap<String, f64>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

// ─── Capability validation ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapabilityValidationResult {
    pub capability_name: String,
    pub is_valid: bool,
    pub confidence_score: f64,
    #[serde(default)]
    pub validation_results: Vec<TestExecutionResult>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    pub new_status: CapabilityStatus,
    #[serde(default)]
    pub validated_at_ms: u64,
}

// ─── Benchmarks ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PerformanceGrade {
    F,
    D,
    C,
    B,
    A,
}

impl PerformanceGrade {
    /// Grade from a success rate expressed as a percentage.
    pub fn from_success_percentage(percentage: f64) -> Self {
        if percentage >= 90.0 {
            PerformanceGrade::A
        } else if percentage >= 80.0 {
            PerformanceGrade::B
        } else if percentage >= 70.0 {
            PerformanceGrade::C
        } else if percentage >= 60.0 {
            PerformanceGrade::D
        } else {
            PerformanceGrade::F
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceBenchmarkResult {
    pub skill_name: String,
    pub average_execution_time: Duration,
    pub min_execution_time: Duration,
    pub max_execution_time: Duration,
    /// Fraction of successful operations in [0, 1].
    pub success_rate: f64,
    pub total_operations: usize,
    #[serde(default)]
    pub performance_metrics: BTreeMap<String, f64>,
    pub grade: PerformanceGrade,
    #[serde(default)]
    pub performance_recommendations: Vec<String>,
    #[serde(default)]
    pub benchmarked_at_ms: u64,
}

impl PerformanceBenchmarkResult {
    /// Zeroed benchmark with grade F.
    pub fn empty(skill_name: impl Into<String>) -> Self {
        Self {
            skill_name: skill_name.into(),
            average_execution_time: Duration::ZERO,
            min_execution_time: Duration::ZERO,
            max_execution_time: Duration::ZERO,
            success_rate: 0.0,
            total_operations: 0,
            performance_metrics: BTreeMap::new(),
            grade: PerformanceGrade::F,
            performance_recommendations: Vec::new(),
            benchmarked_at_ms: super::results::now_ms(),
        }
    }
}

// ─── Failure analysis ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Timeout,
    Authentication,
    NotFound,
    ServerError,
    AssertionFailure,
    Unknown,
}

impl Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureCategory::Timeout => "Timeout",
            FailureCategory::Authentication => "Authentication",
            FailureCategory::NotFound => "Not Found",
            FailureCategory::ServerError => "Server Error",
            FailureCategory::AssertionFailure => "Assertion Failure",
            FailureCategory::Unknown => "Unknown",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    ErrorMessage,
    AssertionFailure,
}

impl Display for PatternKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PatternKind::ErrorMessage => write!(f, "Error Message"),
            PatternKind::AssertionFailure => write!(f, "Assertion Failure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommonFailurePattern {
    pub pattern: PatternKind,
    pub description: String,
    pub frequency: usize,
    #[serde(default)]
    pub affected_tests: Vec<String>,
    pub severity: FailureSeverity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionPriority {
    Low,
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImprovementSuggestion {
    pub title: String,
    pub description: String,
    pub priority: SuggestionPriority,
    #[serde(default)]
    pub action_steps: Vec<String>,
    #[serde(default)]
    pub estimated_impact: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAnalysisResult {
    pub total_failed_tests: usize,
    #[serde(default)]
    pub failure_categories: BTreeMap<FailureCategory, usize>,
    #[serde(default)]
    pub common_patterns: Vec<CommonFailurePattern>,
    #[serde(default)]
    pub suggestions: Vec<ImprovementSuggestion>,
    /// Health in [0, 100].
    pub overall_health_score: f64,
    #[serde(default)]
    pub critical_issues: Vec<String>,
    #[serde(default)]
    pub analyzed_at_ms: u64,
}

// ─── Trends ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalMetric {
    pub timestamp_ms: u64,
    pub value: f64,
    #[serde(default)]
    pub metric_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Declining,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendAnalysisResult {
    pub direction: TrendDirection,
    /// Slope as a percentage of the series mean, per step.
    pub rate_of_change: f64,
    /// Absolute correlation coefficient in [0, 1].
    pub trend_confidence: f64,
    pub trend_description: String,
    #[serde(default)]
    pub trend_recommendations: Vec<String>,
}
