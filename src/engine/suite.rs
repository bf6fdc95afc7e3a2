use crate::config::{AnalysisThresholds, EngineConfig, SuiteConfig};
use crate::domain::{TestCase, TestExecutionResult, TestSuiteResult, TestSuiteStatus};
use crate::engine::executor::{CaseExecutor, SingleTestExecutor};
use crate::engine::http::HttpTransport;
use crate::engine::parallel::{AbortOnDrop, ParallelTestRunner};
use crate::error::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Runs whole suites and turns them into a [`TestSuiteResult`].
#[derive(Clone)]
pub struct TestExecutor {
    executor: Arc<dyn CaseExecutor>,
    runner: ParallelTestRunner,
    suite: SuiteConfig,
    thresholds: AnalysisThresholds,
}

impl TestExecutor {
    pub fn new(executor: Arc<dyn CaseExecutor>, config: &EngineConfig) -> Self {
        let runner = ParallelTestRunner::new(executor.clone(), config);
        Self::with_runner(executor, runner, config)
    }

    pub fn with_runner(
        executor: Arc<dyn CaseExecutor>,
        runner: ParallelTestRunner,
        config: &EngineConfig,
    ) -> Self {
        Self {
            executor,
            runner,
            suite: config.suite.clone(),
            thresholds: config.thresholds.clone(),
        }
    }

    /// Wire a [`SingleTestExecutor`] over `transport`.
    pub fn from_transport(transport: Arc<dyn HttpTransport>, config: &EngineConfig) -> Result<Self> {
        let executor = SingleTestExecutor::from_config(transport, config)?;
        Ok(Self::new(Arc::new(executor), config))
    }

    pub fn runner(&self) -> &ParallelTestRunner {
        &self.runner
    }

    pub async fn execute_case(&self, test_case: &TestCase) -> TestExecutionResult {
        self.executor.execute(test_case).await
    }

    pub async fn execute_suite(&self, test_cases: &[TestCase]) -> TestSuiteResult {
        let mut suite = TestSuiteResult::new(format!(
            "Self-Generated Test Suite ({} tests)",
            test_cases.len()
        ));
        let started_at = Instant::now();
        info!(tests = test_cases.len(), "executing test suite");

        if test_cases.is_empty() {
            suite.total_execution_time = started_at.elapsed();
            suite.status = TestSuiteStatus::Completed;
            info!("empty test suite completed");
            return suite;
        }

        let runner = self.runner.clone();
        let cases = test_cases.to_vec();
        let concurrency = self.suite.max_concurrency.max(1).min(cases.len());
        let batch_size = self.suite.batch_size;
        let run = tokio::spawn(async move {
            match batch_size {
                Some(size) => runner.run_in_batches(&cases, size).await,
                None => runner.run_bounded(&cases, concurrency).await,
            }
        });
        let _abort = AbortOnDrop::new([run.abort_handle()]);

        match run.await {
            Ok(results) => {
                suite.test_results = results;
                suite.total_execution_time = started_at.elapsed();
                suite.status = TestSuiteStatus::Completed;
                suite.recommendations = self.suite_recommendations(&suite);
                info!(
                    passed = suite.passed_tests(),
                    total = suite.total_tests(),
                    success_rate = suite.success_rate(),
                    elapsed_ms = suite.total_execution_time.as_millis() as u64,
                    "test suite completed"
                );
            }
            Err(err) => {
                suite.total_execution_time = started_at.elapsed();
                suite.status = TestSuiteStatus::Failed;
                error!(error = %err, "test suite execution failed");
            }
        }

        suite
    }

    fn suite_recommendations(&self, suite: &TestSuiteResult) -> Vec<String> {
        let mut recommendations = Vec::new();

        if suite.success_rate() < 50.0 {
            recommendations.push(
                "Overall test success rate is low. Review API configuration and test data."
                    .to_string(),
            );
        }

        if suite.failed_tests() > suite.passed_tests() {
            recommendations.push(
                "More tests are failing than passing. Consider reviewing test expectations."
                    .to_string(),
            );
        }

        let total = suite.total_tests().max(1) as f64;
        let average_ms = suite
            .test_results
            .iter()
            .map(TestExecutionResult::execution_time_ms)
            .sum::<f64>()
            / total;
        if average_ms > self.thresholds.slow_average_ms {
            recommendations.push(
                "Average test execution time is high. Consider optimizing API performance."
                    .to_string(),
            );
        }

        recommendations
    }
}
