use crate::analysis::statistics::{mean_duration, StatisticalAnalyzer};
use crate::config::{AnalysisThresholds, EngineConfig};
use crate::domain::{
    now_ms, CapabilityStatus, CapabilityValidationResult, CommonFailurePattern, FailureCategory,
    FailureSeverity, ImprovementSuggestion, LearnedCapability, PatternKind,
    PerformanceBenchmarkResult, PerformanceGrade, SuggestionPriority, TestAnalysisResult,
    TestExecutionResult, TestSuiteResult,
};
use crate::engine::TestExecutor;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tracing::info;

/// Turns execution results into verdicts: capability validation, benchmark
/// grades and failure-pattern reports.
#[derive(Clone)]
pub struct ResultsAnalyzer {
    executor: TestExecutor,
    statistics: StatisticalAnalyzer,
    thresholds: AnalysisThresholds,
}

impl ResultsAnalyzer {
    pub fn new(executor: TestExecutor, config: &EngineConfig) -> Self {
        Self {
            executor,
            statistics: StatisticalAnalyzer::new(config),
            thresholds: config.thresholds.clone(),
        }
    }

    pub fn statistics(&self) -> &StatisticalAnalyzer {
        &self.statistics
    }

    /// Runs the capability's own validation tests and scores them.
    pub async fn validate_capability(
        &self,
        capability: &LearnedCapability,
    ) -> CapabilityValidationResult {
        info!(capability = %capability.name, tests = capability.validation_tests.len(), "validating capability");

        let suite = self
            .executor
            .execute_suite(&capability.validation_tests)
            .await;
        let confidence_score = self.confidence_for_suite(&suite);

        let mut result = CapabilityValidationResult {
            capability_name: capability.name.clone(),
            is_valid: confidence_score >= self.thresholds.capability_valid,
            confidence_score,
            validation_results: Vec::new(),
            strengths: Vec::new(),
            weaknesses: Vec::new(),
            improvement_suggestions: Vec::new(),
            new_status: self.capability_status(confidence_score),
            validated_at_ms: now_ms(),
        };
        self.describe_capability(&mut result, &suite.test_results);
        result.validation_results = suite.test_results;

        info!(
            capability = %result.capability_name,
            valid = result.is_valid,
            confidence = result.confidence_score,
            status = ?result.new_status,
            "capability validation completed"
        );
        result
    }

    pub fn confidence_for_suite(&self, suite: &TestSuiteResult) -> f64 {
        let times: Vec<f64> = suite
            .test_results
            .iter()
            .map(TestExecutionResult::execution_time_ms)
            .collect();
        self.statistics
            .confidence_score(suite.success_rate(), suite.total_tests(), &times)
    }

    pub fn detailed_metrics(&self, results: &[TestExecutionResult]) -> BTreeMap<String, f64> {
        let times: Vec<f64> = results
            .iter()
            .map(TestExecutionResult::execution_time_ms)
            .collect();
        let successes = results.iter().filter(|r| r.success).count();
        self.statistics
            .performance_metrics(&times, successes, results.len())
    }

    fn capability_status(&self, confidence: f64) -> CapabilityStatus {
        if confidence >= self.thresholds.status_validated {
            CapabilityStatus::Validated
        } else if confidence >= self.thresholds.status_learned {
            CapabilityStatus::Learned
        } else if confidence >= self.thresholds.status_learning {
            CapabilityStatus::Learning
        } else {
            CapabilityStatus::Failed
        }
    }

    fn describe_capability(
        &self,
        result: &mut CapabilityValidationResult,
        test_results: &[TestExecutionResult],
    ) {
        let (passed, failed): (Vec<&TestExecutionResult>, Vec<&TestExecutionResult>) =
            test_results.iter().partition(|r| r.success);

        if !passed.is_empty() {
            result
                .strengths
                .push(format!("{} test cases passed successfully", passed.len()));
            let average_ms = passed.iter().map(|r| r.execution_time_ms()).sum::<f64>()
                / passed.len() as f64;
            if average_ms < self.thresholds.fast_success_ms {
                result
                    .strengths
                    .push("Fast execution time for successful operations".to_string());
            }
        }

        if !failed.is_empty() {
            result
                .weaknesses
                .push(format!("{} test cases failed", failed.len()));
            let mut most_common: Option<(&str, usize)> = None;
            for (message, members) in group_in_order(failed.iter().copied().filter_map(error_key)) {
                if most_common.map_or(true, |(_, count)| members.len() > count) {
                    most_common = Some((message, members.len()));
                }
            }
            if let Some((message, _)) = most_common {
                result
                    .weaknesses
                    .push(format!("Common error pattern: {message}"));
            }
        }

        if result.confidence_score < self.thresholds.capability_valid {
            result
                .improvement_suggestions
                .push("Increase test coverage to improve confidence".to_string());
        }

        if failed.iter().any(|r| is_timeout(r)) {
            result
                .improvement_suggestions
                .push("Consider increasing timeout values for slow operations".to_string());
        }
    }

    pub fn benchmark_skill(
        &self,
        skill_name: &str,
        results: &[TestExecutionResult],
    ) -> PerformanceBenchmarkResult {
        info!(skill = skill_name, operations = results.len(), "benchmarking skill");

        if results.is_empty() {
            return PerformanceBenchmarkResult::empty(skill_name);
        }

        let times: Vec<Duration> = results.iter().map(|r| r.execution_time).collect();
        let average = mean_duration(&times);
        let min = times.iter().min().copied().unwrap_or_default();
        let max = times.iter().max().copied().unwrap_or_default();
        let success_rate =
            results.iter().filter(|r| r.success).count() as f64 / results.len() as f64;

        let mut benchmark = PerformanceBenchmarkResult {
            skill_name: skill_name.to_string(),
            average_execution_time: average,
            min_execution_time: min,
            max_execution_time: max,
            success_rate,
            total_operations: results.len(),
            performance_metrics: self.detailed_metrics(results),
            grade: PerformanceGrade::from_success_percentage(success_rate * 100.0),
            performance_recommendations: Vec::new(),
            benchmarked_at_ms: now_ms(),
        };
        benchmark.performance_recommendations = self.performance_recommendations(&benchmark);

        info!(
            skill = skill_name,
            grade = ?benchmark.grade,
            success_rate = benchmark.success_rate * 100.0,
            average_ms = average.as_secs_f64() * 1000.0,
            "skill benchmark completed"
        );
        benchmark
    }

    fn performance_recommendations(&self, benchmark: &PerformanceBenchmarkResult) -> Vec<String> {
        let mut recommendations = Vec::new();
        let average_ms = benchmark.average_execution_time.as_secs_f64() * 1000.0;
        let max_ms = benchmark.max_execution_time.as_secs_f64() * 1000.0;

        if benchmark.success_rate < 0.9 {
            recommendations.push("Improve error handling to increase success rate".to_string());
        }
        if average_ms > self.thresholds.slow_average_ms {
            recommendations.push("Consider optimizing for faster execution times".to_string());
        }
        if max_ms > average_ms * 3.0 {
            recommendations.push(
                "High execution time variance detected - investigate performance inconsistencies"
                    .to_string(),
            );
        }

        recommendations
    }

    /// Mines failed results for categories and repeating patterns. Passing
    /// results in the input are ignored.
    pub fn analyze_failures(&self, results: &[TestExecutionResult]) -> TestAnalysisResult {
        let failed: Vec<&TestExecutionResult> = results.iter().filter(|r| !r.success).collect();
        info!(failed = failed.len(), "analyzing test failures");

        let mut failure_categories = BTreeMap::new();
        for result in &failed {
            *failure_categories.entry(categorize(result)).or_insert(0) += 1;
        }

        let common_patterns = self.common_patterns(&failed);
        let suggestions = improvement_suggestions(&failure_categories, &common_patterns);
        let overall_health_score = health_score(failed.len(), &common_patterns);
        let critical_issues = critical_issues(&common_patterns, overall_health_score);

        info!(
            patterns = common_patterns.len(),
            health = overall_health_score,
            "failure analysis completed"
        );

        TestAnalysisResult {
            total_failed_tests: failed.len(),
            failure_categories,
            common_patterns,
            suggestions,
            overall_health_score,
            critical_issues,
            analyzed_at_ms: now_ms(),
        }
    }

    fn common_patterns(&self, failed: &[&TestExecutionResult]) -> Vec<CommonFailurePattern> {
        let total = failed.len();
        let mut patterns = Vec::new();

        let by_message = group_in_order(failed.iter().copied().filter_map(error_key));
        for (message, members) in by_message {
            if members.len() > 1 {
                patterns.push(CommonFailurePattern {
                    pattern: PatternKind::ErrorMessage,
                    description: message.to_string(),
                    frequency: members.len(),
                    affected_tests: members.iter().map(|r| r.test_case_name.clone()).collect(),
                    severity: self.severity(members.len(), total),
                });
            }
        }

        let failing_assertions = failed.iter().copied().flat_map(|r| {
            r.failed_assertions()
                .map(move |assertion| (assertion.assertion_name.as_str(), r))
        });
        for (name, members) in group_in_order(failing_assertions) {
            if members.len() > 1 {
                let mut affected_tests: Vec<String> = Vec::new();
                for result in &members {
                    if !affected_tests.contains(&result.test_case_name) {
                        affected_tests.push(result.test_case_name.clone());
                    }
                }
                patterns.push(CommonFailurePattern {
                    pattern: PatternKind::AssertionFailure,
                    description: format!("'{name}' assertion consistently failing"),
                    frequency: members.len(),
                    affected_tests,
                    severity: self.severity(members.len(), total),
                });
            }
        }

        patterns
    }

    fn severity(&self, frequency: usize, total: usize) -> FailureSeverity {
        let share = if total == 0 {
            0.0
        } else {
            frequency as f64 / total as f64
        };
        if share >= self.thresholds.severity_critical {
            FailureSeverity::Critical
        } else if share >= self.thresholds.severity_high {
            FailureSeverity::High
        } else if share >= self.thresholds.severity_medium {
            FailureSeverity::Medium
        } else {
            FailureSeverity::Low
        }
    }
}

/// Groups keyed items, keeping the order in which keys first appear.
fn group_in_order<'k, T>(items: impl IntoIterator<Item = (&'k str, T)>) -> Vec<(&'k str, Vec<T>)> {
    let mut index: HashMap<&'k str, usize> = HashMap::new();
    let mut groups: Vec<(&'k str, Vec<T>)> = Vec::new();
    for (key, item) in items {
        match index.get(key) {
            Some(&position) => groups[position].1.push(item),
            None => {
                index.insert(key, groups.len());
                groups.push((key, vec![item]));
            }
        }
    }
    groups
}

fn error_key(result: &TestExecutionResult) -> Option<(&str, &TestExecutionResult)> {
    result
        .error_message
        .as_deref()
        .filter(|message| !message.is_empty())
        .map(|message| (message, result))
}

fn is_timeout(result: &TestExecutionResult) -> bool {
    if result
        .error
        .as_ref()
        .is_some_and(|error| error.kind == "TIMEOUT")
    {
        return true;
    }
    let message = result
        .error_message
        .as_deref()
        .unwrap_or_default()
        .to_ascii_lowercase();
    message.contains("timeout") || message.contains("timed out")
}

fn categorize(result: &TestExecutionResult) -> FailureCategory {
    let message = result.error_message.as_deref().unwrap_or_default();

    if is_timeout(result) {
        return FailureCategory::Timeout;
    }
    if message.contains("401") {
        return FailureCategory::Authentication;
    }
    if message.contains("404") {
        return FailureCategory::NotFound;
    }
    if message.contains("500") {
        return FailureCategory::ServerError;
    }
    if result.failed_assertions().next().is_some() {
        return match result.status_code() {
            Some(401 | 403) => FailureCategory::Authentication,
            Some(404) => FailureCategory::NotFound,
            Some(500..=599) => FailureCategory::ServerError,
            _ => FailureCategory::AssertionFailure,
        };
    }

    FailureCategory::Unknown
}

fn improvement_suggestions(
    categories: &BTreeMap<FailureCategory, usize>,
    patterns: &[CommonFailurePattern],
) -> Vec<ImprovementSuggestion> {
    let mut suggestions = Vec::new();

    for (category, count) in categories.iter().filter(|(_, count)| **count > 2) {
        let label = category.to_string().to_lowercase();
        suggestions.push(ImprovementSuggestion {
            title: format!("Address {category} Issues"),
            description: format!("Multiple tests ({count}) are failing due to {label} issues"),
            priority: SuggestionPriority::High,
            action_steps: vec![
                format!("Review and fix {label} related problems"),
                "Update test expectations if necessary".to_string(),
                "Add more robust error handling".to_string(),
            ],
            estimated_impact: Some(format!("Up to {count} failing tests resolved")),
        });
    }

    for pattern in patterns
        .iter()
        .filter(|pattern| pattern.severity >= FailureSeverity::High)
    {
        suggestions.push(ImprovementSuggestion {
            title: format!("Fix {} Pattern", pattern.pattern),
            description: pattern.description.clone(),
            priority: if pattern.severity == FailureSeverity::Critical {
                SuggestionPriority::Urgent
            } else {
                SuggestionPriority::High
            },
            action_steps: vec![
                "Investigate root cause of pattern".to_string(),
                "Implement systematic fix".to_string(),
                "Re-run affected tests to validate fix".to_string(),
            ],
            estimated_impact: Some(format!(
                "{} affected tests",
                pattern.affected_tests.len()
            )),
        });
    }

    suggestions
}

fn health_score(total_failed: usize, patterns: &[CommonFailurePattern]) -> f64 {
    if total_failed == 0 {
        return 100.0;
    }

    let penalty: f64 = patterns
        .iter()
        .map(|pattern| {
            let weight = match pattern.severity {
                FailureSeverity::Critical => 30.0,
                FailureSeverity::High => 20.0,
                FailureSeverity::Medium => 10.0,
                FailureSeverity::Low => 5.0,
            };
            weight * pattern.frequency as f64 / total_failed as f64
        })
        .sum();

    (100.0 - penalty).max(0.0)
}

fn critical_issues(patterns: &[CommonFailurePattern], health: f64) -> Vec<String> {
    let mut issues: Vec<String> = patterns
        .iter()
        .filter(|pattern| pattern.severity == FailureSeverity::Critical)
        .map(|pattern| {
            format!(
                "Critical {}: {} (affects {} tests)",
                pattern.pattern, pattern.description, pattern.frequency
            )
        })
        .collect();

    if health < 50.0 {
        issues.push(format!(
            "Overall system health is critically low: {health:.1}%"
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AssertionResult, ErrorDetails, HttpMethod, MetricValue, TestCase, METRIC_STATUS_CODE};
    use crate::engine::{CaseExecutor, HostResources, ParallelTestRunner};
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::Arc;

    /// Passes cases whose id starts with `ok`, times out the rest.
    struct VerdictExecutor;

    impl CaseExecutor for VerdictExecutor {
        fn execute<'a>(
            &'a self,
            test_case: &'a TestCase,
        ) -> Pin<Box<dyn Future<Output = TestExecutionResult> + Send + 'a>> {
            Box::pin(async move {
                if test_case.id.starts_with("ok") {
                    passed(&test_case.name, 120)
                } else {
                    let mut result = TestExecutionResult::failed(
                        &test_case.id,
                        &test_case.name,
                        Duration::from_millis(50),
                        "Test timed out after 0.050 seconds",
                    );
                    result.error = Some(ErrorDetails::new("TIMEOUT", "Test timed out"));
                    result
                }
            })
        }
    }

    fn analyzer() -> ResultsAnalyzer {
        let config = EngineConfig::default();
        let executor = Arc::new(VerdictExecutor);
        let runner =
            ParallelTestRunner::with_resources(executor.clone(), &config, HostResources::new(4, 1024));
        ResultsAnalyzer::new(TestExecutor::with_runner(executor, runner, &config), &config)
    }

    fn passed(name: &str, ms: u64) -> TestExecutionResult {
        let mut result = TestExecutionResult::failed(name, name, Duration::from_millis(ms), "");
        result.success = true;
        result.error_message = None;
        result
    }

    fn failed(name: &str, ms: u64, message: &str) -> TestExecutionResult {
        TestExecutionResult::failed(name, name, Duration::from_millis(ms), message)
    }

    fn assertion_failure(name: &str, assertion: &str, status: i64) -> TestExecutionResult {
        let mut result = failed(name, 100, "");
        result.error_message = None;
        result
            .metrics
            .insert(METRIC_STATUS_CODE.to_string(), MetricValue::Integer(status));
        result.assertion_results.push(AssertionResult {
            assertion_name: assertion.to_string(),
            passed: false,
            actual_value: status.to_string(),
            expected_value: "200".to_string(),
            is_critical: true,
            error_message: None,
        });
        result
    }

    fn cases(ids: &[&str]) -> Vec<TestCase> {
        ids.iter()
            .map(|id| TestCase::new(*id, *id, HttpMethod::Get, "/"))
            .collect()
    }

    #[tokio::test]
    async fn fully_passing_capability_is_validated() {
        let ids: Vec<String> = (0..10).map(|i| format!("ok-{i}")).collect();
        let ids: Vec<&str> = ids.iter().map(String::as_str).collect();
        let capability = LearnedCapability::new("weather lookup", cases(&ids));

        let result = analyzer().validate_capability(&capability).await;
        assert!(result.is_valid);
        assert_eq!(result.confidence_score, 1.0);
        assert_eq!(result.new_status, CapabilityStatus::Validated);
        assert_eq!(result.validation_results.len(), 10);
        assert_eq!(
            result.strengths,
            vec![
                "10 test cases passed successfully".to_string(),
                "Fast execution time for successful operations".to_string(),
            ]
        );
        assert!(result.weaknesses.is_empty());
        assert!(result.improvement_suggestions.is_empty());
    }

    #[tokio::test]
    async fn timeouts_weaken_a_capability() {
        let capability =
            LearnedCapability::new("slow api", cases(&["ok-1", "ok-2", "slow-1", "slow-2"]));

        let result = analyzer().validate_capability(&capability).await;
        assert!(!result.is_valid);
        // Half the tests pass and four tests give a sample factor of 0.4.
        assert!((result.confidence_score - 0.2).abs() < 1e-9);
        assert_eq!(result.new_status, CapabilityStatus::Failed);
        assert_eq!(result.weaknesses[0], "2 test cases failed");
        assert_eq!(
            result.weaknesses[1],
            "Common error pattern: Test timed out after 0.050 seconds"
        );
        assert!(result
            .improvement_suggestions
            .iter()
            .any(|s| s.contains("timeout values")));
        assert!(result
            .improvement_suggestions
            .iter()
            .any(|s| s.contains("test coverage")));
    }

    #[tokio::test]
    async fn empty_capability_scores_zero() {
        let result = analyzer()
            .validate_capability(&LearnedCapability::new("nothing", Vec::new()))
            .await;
        assert_eq!(result.confidence_score, 0.0);
        assert!(!result.is_valid);
        assert_eq!(result.new_status, CapabilityStatus::Failed);
    }

    #[test]
    fn benchmark_grades_and_flags_variance() {
        let results = vec![
            passed("a", 100),
            passed("b", 100),
            passed("c", 100),
            passed("d", 100),
            failed("e", 1_000, "boom"),
        ];
        let benchmark = analyzer().benchmark_skill("search", &results);

        assert_eq!(benchmark.total_operations, 5);
        assert_eq!(benchmark.success_rate, 0.8);
        assert_eq!(benchmark.grade, PerformanceGrade::B);
        assert_eq!(benchmark.min_execution_time, Duration::from_millis(100));
        assert_eq!(benchmark.max_execution_time, Duration::from_millis(1_000));
        assert_eq!(benchmark.average_execution_time, Duration::from_millis(280));
        assert!(benchmark
            .performance_recommendations
            .iter()
            .any(|r| r.contains("increase success rate")));
        assert!(benchmark
            .performance_recommendations
            .iter()
            .any(|r| r.contains("variance")));
        assert!(benchmark.performance_metrics.contains_key("p95ExecutionTimeMs"));
    }

    #[test]
    fn empty_benchmark_is_graded_f() {
        let benchmark = analyzer().benchmark_skill("idle", &[]);
        assert_eq!(benchmark.grade, PerformanceGrade::F);
        assert_eq!(benchmark.total_operations, 0);
        assert_eq!(benchmark.average_execution_time, Duration::ZERO);
    }

    #[test]
    fn repeated_error_becomes_a_high_severity_pattern() {
        let mut results: Vec<TestExecutionResult> = (0..4)
            .map(|i| failed(&format!("t{i}"), 100, "Connection failed: refused"))
            .collect();
        results.push(passed("fine", 100));

        let analysis = analyzer().analyze_failures(&results);
        assert_eq!(analysis.total_failed_tests, 4);
        assert_eq!(analysis.common_patterns.len(), 1);

        let pattern = &analysis.common_patterns[0];
        assert_eq!(pattern.pattern, PatternKind::ErrorMessage);
        assert_eq!(pattern.frequency, 4);
        assert!(pattern.severity >= FailureSeverity::High);
        assert_eq!(pattern.affected_tests, ["t0", "t1", "t2", "t3"]);

        assert_eq!(analysis.failure_categories.get(&FailureCategory::Unknown), Some(&4));
        assert_eq!(analysis.overall_health_score, 70.0);
        assert_eq!(analysis.critical_issues.len(), 1);
        assert!(analysis
            .suggestions
            .iter()
            .any(|s| s.priority == SuggestionPriority::Urgent));
        assert!(analysis
            .suggestions
            .iter()
            .any(|s| s.title == "Address Unknown Issues"));
    }

    #[test]
    fn categories_follow_error_text_and_status() {
        let results = vec![
            failed("slow", 100, "Request Timeout reached"),
            failed("denied", 100, "HTTP 401 Unauthorized"),
            failed("gone", 100, "HTTP 404"),
            failed("broken", 100, "upstream returned 500"),
            assertion_failure("forbidden", "status", 403),
            assertion_failure("missing", "status", 404),
            assertion_failure("crash", "status", 503),
            assertion_failure("wrong body", "name", 200),
        ];

        let analysis = analyzer().analyze_failures(&results);
        let categories = &analysis.failure_categories;
        assert_eq!(categories[&FailureCategory::Timeout], 1);
        assert_eq!(categories[&FailureCategory::Authentication], 2);
        assert_eq!(categories[&FailureCategory::NotFound], 2);
        assert_eq!(categories[&FailureCategory::ServerError], 2);
        assert_eq!(categories[&FailureCategory::AssertionFailure], 1);

        let status_pattern = analysis
            .common_patterns
            .iter()
            .find(|p| p.pattern == PatternKind::AssertionFailure)
            .expect("assertion pattern");
        assert_eq!(status_pattern.frequency, 3);
        assert_eq!(status_pattern.description, "'status' assertion consistently failing");
        assert_eq!(status_pattern.severity, FailureSeverity::Medium);
    }

    #[test]
    fn no_failures_means_full_health() {
        let analysis = analyzer().analyze_failures(&[passed("a", 10)]);
        assert_eq!(analysis.total_failed_tests, 0);
        assert_eq!(analysis.overall_health_score, 100.0);
        assert!(analysis.common_patterns.is_empty());
        assert!(analysis.critical_issues.is_empty());
    }
}
