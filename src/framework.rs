use crate::analysis::{ResultsAnalyzer, StatisticalAnalyzer};
use crate::config::EngineConfig;
use crate::domain::{
    now_ms, CapabilityStatus, CapabilityValidationResult, HistoricalMetric, LearnedCapability,
    ParallelExecutionAnalysis, PerformanceBenchmarkResult, TestAnalysisResult, TestCase,
    TestExecutionResult, TestSuiteResult, TrendAnalysisResult,
};
use crate::engine::{HttpTransport, ReqwestTransport, TestExecutor};
use crate::error::Result;
use std::sync::Arc;
use tracing::{info, warn};

/// Single entry point over execution and analysis.
#[derive(Clone)]
pub struct SelfTestingFramework {
    executor: TestExecutor,
    analyzer: ResultsAnalyzer,
}

impl SelfTestingFramework {
    /// Framework backed by a `reqwest` transport built from `config.transport`.
    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        config.validate()?;
        let transport = ReqwestTransport::new(&config.transport)?;
        Self::new(Arc::new(transport), config)
    }

    pub fn new(transport: Arc<dyn HttpTransport>, config: &EngineConfig) -> Result<Self> {
        let executor = TestExecutor::from_transport(transport, config)?;
        Ok(Self::with_executor(executor, config))
    }

    pub fn with_executor(executor: TestExecutor, config: &EngineConfig) -> Self {
        let analyzer = ResultsAnalyzer::new(executor.clone(), config);
        Self { executor, analyzer }
    }

    pub fn statistics(&self) -> &StatisticalAnalyzer {
        self.analyzer.statistics()
    }

    pub async fn execute_case(&self, test_case: &TestCase) -> TestExecutionResult {
        info!(test_case = %test_case.id, "executing single test case");
        self.executor.execute_case(test_case).await
    }

    pub async fn execute_suite(&self, test_cases: &[TestCase]) -> TestSuiteResult {
        self.executor.execute_suite(test_cases).await
    }

    /// A missing capability yields an invalid result instead of an error.
    pub async fn validate_capability(
        &self,
        api_name: &str,
        capability: Option<&LearnedCapability>,
    ) -> CapabilityValidationResult {
        let Some(capability) = capability else {
            warn!(api = api_name, "cannot validate a missing capability");
            return CapabilityValidationResult {
                capability_name: api_name.to_string(),
                is_valid: false,
                confidence_score: 0.0,
                validation_results: Vec::new(),
                strengths: Vec::new(),
                weaknesses: Vec::new(),
                improvement_suggestions: vec!["Capability is missing".to_string()],
                new_status: CapabilityStatus::Failed,
                validated_at_ms: now_ms(),
            };
        };

        info!(api = api_name, capability = %capability.name, "validating learned capability");
        self.analyzer.validate_capability(capability).await
    }

    pub fn benchmark_skill(
        &self,
        skill_name: &str,
        results: Option<&[TestExecutionResult]>,
    ) -> PerformanceBenchmarkResult {
        let Some(results) = results else {
            warn!(skill = skill_name, "cannot benchmark without test results");
            let mut benchmark = PerformanceBenchmarkResult::empty(skill_name);
            benchmark
                .performance_recommendations
                .push("Test results are missing".to_string());
            return benchmark;
        };

        self.analyzer.benchmark_skill(skill_name, results)
    }

    pub fn analyze_failures(&self, results: &[TestExecutionResult]) -> TestAnalysisResult {
        self.analyzer.analyze_failures(results)
    }

    pub fn analyze_parallel_performance(
        &self,
        results: &[TestExecutionResult],
        concurrency_level: usize,
    ) -> ParallelExecutionAnalysis {
        self.executor
            .runner()
            .analyze_parallel_performance(results, concurrency_level)
    }

    pub fn analyze_trends(&self, history: &[HistoricalMetric]) -> TrendAnalysisResult {
        self.statistics().analyze_trends(history)
    }
}
