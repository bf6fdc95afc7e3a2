use crate::analysis::statistics::{mean_duration, standard_deviation};
use crate::config::{AnalysisThresholds, ConcurrencyConfig, EngineConfig};
use crate::domain::{
    ParallelExecutionAnalysis, TestCase, TestExecutionResult, COORDINATION_AVERAGE_WAIT_MS,
    COORDINATION_CONTENTION_RATIO, METRIC_ERROR, METRIC_EXCEPTION_TYPE, RESOURCE_CPU,
    RESOURCE_MEMORY, RESOURCE_NETWORK,
};
use crate::engine::executor::CaseExecutor;
use crate::engine::host::{collect_host_resources, HostResources};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::{AbortHandle, JoinError};
use tracing::{debug, error, info};

/// Runs many test cases through a shared executor behind a counting
/// semaphore. Results always come back in input order.
#[derive(Clone)]
pub struct ParallelTestRunner {
    executor: Arc<dyn CaseExecutor>,
    config: ConcurrencyConfig,
    thresholds: AnalysisThresholds,
    resources: HostResources,
}

impl ParallelTestRunner {
    pub fn new(executor: Arc<dyn CaseExecutor>, config: &EngineConfig) -> Self {
        let resources = collect_host_resources(&config.concurrency);
        Self::with_resources(executor, config, resources)
    }

    pub fn with_resources(
        executor: Arc<dyn CaseExecutor>,
        config: &EngineConfig,
        resources: HostResources,
    ) -> Self {
        debug!(
            processors = resources.processor_count,
            memory_mb = resources.available_memory_mb,
            "parallel runner sized against host"
        );
        Self {
            executor,
            config: config.concurrency.clone(),
            thresholds: config.thresholds.clone(),
            resources,
        }
    }

    pub fn host_resources(&self) -> HostResources {
        self.resources
    }

    /// Heuristic worker count: a share of the cores, bounded by memory per
    /// slot and clamped to `[1, max_concurrency]`.
    pub fn optimal_concurrency(&self) -> usize {
        let cpu_based = ((self.resources.processor_count as f64 * self.config.cpu_fraction).floor()
            as usize)
            .max(1);
        let memory_based = (self.resources.available_memory_mb
            / self.config.memory_per_slot_mb.max(1))
        .max(1);
        let memory_based = usize::try_from(memory_based).unwrap_or(usize::MAX);

        cpu_based
            .min(memory_based)
            .clamp(1, self.config.max_concurrency.max(1))
    }

    pub async fn run_bounded(
        &self,
        cases: &[TestCase],
        max_concurrency: usize,
    ) -> Vec<TestExecutionResult> {
        if cases.is_empty() {
            return Vec::new();
        }

        let limit = max_concurrency.max(1);
        let gate = Arc::new(Semaphore::new(limit));
        let started_at = Instant::now();
        debug!(cases = cases.len(), concurrency = limit, "dispatching test cases");

        let handles: Vec<_> = cases
            .iter()
            .cloned()
            .map(|case| {
                let gate = gate.clone();
                let executor = self.executor.clone();
                tokio::spawn(async move {
                    // Held until the task ends, including on unwind.
                    let Ok(_permit) = gate.acquire_owned().await else {
                        return TestExecutionResult::failed(
                            &case.id,
                            &case.name,
                            Duration::ZERO,
                            "Concurrency gate closed before dispatch",
                        );
                    };
                    executor.execute(&case).await
                })
            })
            .collect();

        let _abort = AbortOnDrop::new(handles.iter().map(|handle| handle.abort_handle()));
        let outcomes = join_all(handles).await;
        let results: Vec<TestExecutionResult> = outcomes
            .into_iter()
            .zip(cases)
            .map(|(outcome, case)| match outcome {
                Ok(result) => result,
                Err(err) => fault_result(case, err),
            })
            .collect();

        info!(
            cases = results.len(),
            passed = results.iter().filter(|r| r.success).count(),
            concurrency = limit,
            elapsed_ms = started_at.elapsed().as_millis() as u64,
            "bounded run finished"
        );
        results
    }

    pub async fn run_at_optimal_concurrency(&self, cases: &[TestCase]) -> Vec<TestExecutionResult> {
        self.run_bounded(cases, self.optimal_concurrency()).await
    }

    /// Runs ordered batches one after another, each at optimal concurrency,
    /// pausing between batches.
    pub async fn run_in_batches(
        &self,
        cases: &[TestCase],
        batch_size: usize,
    ) -> Vec<TestExecutionResult> {
        let batch_size = batch_size.max(1);
        let batch_count = cases.len().div_ceil(batch_size);
        let concurrency = self.optimal_concurrency();
        let pause = Duration::from_millis(self.config.batch_pause_ms);
        let mut results = Vec::with_capacity(cases.len());

        for (index, batch) in cases.chunks(batch_size).enumerate() {
            info!(
                batch = index + 1,
                batches = batch_count,
                size = batch.len(),
                concurrency,
                "running batch"
            );
            results.extend(self.run_bounded(batch, concurrency).await);

            if index + 1 < batch_count && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
        }

        results
    }

    pub fn analyze_parallel_performance(
        &self,
        results: &[TestExecutionResult],
        concurrency_level: usize,
    ) -> ParallelExecutionAnalysis {
        if results.is_empty() {
            return ParallelExecutionAnalysis {
                concurrency_level,
                recommended_concurrency: concurrency_level,
                recommendations: vec!["No test results available for analysis".to_string()],
                ..ParallelExecutionAnalysis::default()
            };
        }

        let level = concurrency_level.max(1);
        let count = results.len();
        let times: Vec<Duration> = results.iter().map(|r| r.execution_time).collect();
        let times_ms: Vec<f64> = results.iter().map(TestExecutionResult::execution_time_ms).collect();

        let serial_time: Duration = times.iter().sum();
        let parallel_time = estimate_parallel_time(&times, level);
        let average_time = mean_duration(&times);
        let average_ms = average_time.as_secs_f64() * 1000.0;

        let speedup_ratio = if parallel_time.is_zero() {
            0.0
        } else {
            serial_time.as_secs_f64() / parallel_time.as_secs_f64()
        };
        let theoretical_max = level.min(count) as f64;
        let parallel_efficiency = (speedup_ratio / theoretical_max).clamp(0.0, 1.0);

        let optimal = self.optimal_concurrency();
        let recommended_concurrency = if parallel_efficiency > 0.8 && level < optimal {
            (level + 2).min(optimal)
        } else if parallel_efficiency < 0.5 && level > 2 {
            (level - 1).max(2)
        } else {
            level
        };

        let resource_utilization = self.estimate_resource_utilization(results, level, average_ms);
        let thread_coordination_stats = coordination_stats(&times_ms);

        let mut analysis = ParallelExecutionAnalysis {
            concurrency_level: level,
            total_execution_time: parallel_time,
            average_execution_time: average_time,
            estimated_serial_time: serial_time,
            speedup_ratio,
            parallel_efficiency,
            recommended_concurrency,
            resource_utilization,
            thread_coordination_stats,
            recommendations: Vec::new(),
        };
        analysis.recommendations = self.recommendations(&analysis, results, optimal);

        info!(
            concurrency = level,
            speedup = speedup_ratio,
            efficiency = parallel_efficiency,
            recommended = recommended_concurrency,
            "parallel performance analyzed"
        );
        analysis
    }

    fn estimate_resource_utilization(
        &self,
        results: &[TestExecutionResult],
        level: usize,
        average_ms: f64,
    ) -> BTreeMap<String, f64> {
        let cpu = (level as f64 / self.resources.processor_count as f64).min(1.0);

        let response_lengths: Vec<usize> = results
            .iter()
            .filter_map(|r| r.response.as_ref().map(String::len))
            .collect();
        let memory = if response_lengths.is_empty() {
            0.1
        } else {
            let average_length =
                response_lengths.iter().sum::<usize>() as f64 / response_lengths.len() as f64;
            // Response text plus its parsed copy per in-flight result.
            let working_set = average_length * results.len() as f64 * 2.0;
            let capacity = self.resources.available_memory_bytes();
            if capacity > 0.0 {
                (working_set / capacity).clamp(0.0, 1.0)
            } else {
                1.0
            }
        };

        let network = (level as f64 * 0.1 + (1000.0 - average_ms) / 1000.0).clamp(0.0, 1.0);

        BTreeMap::from([
            (RESOURCE_CPU.to_string(), cpu),
            (RESOURCE_MEMORY.to_string(), memory),
            (RESOURCE_NETWORK.to_string(), network),
        ])
    }

    fn recommendations(
        &self,
        analysis: &ParallelExecutionAnalysis,
        results: &[TestExecutionResult],
        optimal: usize,
    ) -> Vec<String> {
        let mut recommendations = Vec::new();
        let level = analysis.concurrency_level;

        if analysis.parallel_efficiency < 0.5 {
            recommendations.push(format!(
                "Parallel efficiency is low ({:.0}%); consider reducing concurrency to {}",
                analysis.parallel_efficiency * 100.0,
                analysis.recommended_concurrency
            ));
        }

        if analysis.parallel_efficiency > 0.8 && level < optimal {
            recommendations.push(format!(
                "Parallel efficiency is high ({:.0}%); concurrency can be raised to {}",
                analysis.parallel_efficiency * 100.0,
                analysis.recommended_concurrency
            ));
        }

        if analysis.speedup_ratio < 2.0 && level >= 4 {
            recommendations.push(format!(
                "Speedup of {:.2}x at concurrency {level} suggests I/O-bound tests or a shared bottleneck",
                analysis.speedup_ratio
            ));
        }

        let memory = analysis
            .resource_utilization
            .get(RESOURCE_MEMORY)
            .copied()
            .unwrap_or_default();
        if memory > 0.8 {
            recommendations.push(
                "Estimated memory utilization is high; lower concurrency or reduce response sizes"
                    .to_string(),
            );
        }

        let long_running_limit = Duration::try_from_secs_f64(self.thresholds.long_running_test_secs)
            .unwrap_or(Duration::MAX);
        let long_running = results
            .iter()
            .filter(|r| r.execution_time > long_running_limit)
            .count();
        if long_running > 0 {
            recommendations.push(format!(
                "{long_running} test(s) ran longer than {}s; review their timeouts or optimize the endpoints",
                self.thresholds.long_running_test_secs
            ));
        }

        let failures = results.iter().filter(|r| !r.success).count();
        let failure_rate = failures as f64 / results.len() as f64;
        if failure_rate > self.thresholds.high_failure_rate {
            recommendations.push(format!(
                "Failure rate is {:.0}%; debug failing tests serially before running them in parallel",
                failure_rate * 100.0
            ));
        }

        recommendations
    }
}

/// Aborts spawned work when the awaiting future is dropped before it
/// completes. Aborting a finished task is a no-op.
pub(crate) struct AbortOnDrop(Vec<AbortHandle>);

impl AbortOnDrop {
    pub(crate) fn new(handles: impl IntoIterator<Item = AbortHandle>) -> Self {
        Self(handles.into_iter().collect())
    }
}

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        for handle in &self.0 {
            handle.abort();
        }
    }
}

/// Greedy longest-first assignment onto `min(level, n)` buckets. The
/// fullest bucket is the estimated wall clock.
fn estimate_parallel_time(times: &[Duration], level: usize) -> Duration {
    let bucket_count = level.min(times.len()).max(1);
    let mut sorted = times.to_vec();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let mut buckets = vec![Duration::ZERO; bucket_count];
    for time in sorted {
        if let Some(lightest) = buckets.iter_mut().min() {
            *lightest += time;
        }
    }

    buckets.into_iter().max().unwrap_or_default()
}

fn coordination_stats(times_ms: &[f64]) -> BTreeMap<String, f64> {
    let max = times_ms.iter().copied().fold(f64::MIN, f64::max);
    let min = times_ms.iter().copied().fold(f64::MAX, f64::min);
    let contention = if max > 0.0 { (max - min) / max } else { 0.0 };

    BTreeMap::from([
        (
            COORDINATION_AVERAGE_WAIT_MS.to_string(),
            standard_deviation(times_ms),
        ),
        (COORDINATION_CONTENTION_RATIO.to_string(), contention),
    ])
}

fn fault_result(case: &TestCase, err: JoinError) -> TestExecutionResult {
    let (exception_type, message) = if err.is_panic() {
        let payload = err.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|text| text.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "test execution panicked".to_string());
        ("Panic", message)
    } else {
        ("Cancelled", err.to_string())
    };

    error!(test_case = %case.name, exception_type, error = %message, "test case worker faulted");

    let mut result = TestExecutionResult::failed(&case.id, &case.name, Duration::ZERO, &message);
    result
        .metrics
        .insert(METRIC_ERROR.to_string(), message.into());
    result
        .metrics
        .insert(METRIC_EXCEPTION_TYPE.to_string(), exception_type.into());
    result
}
