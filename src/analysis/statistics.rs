use crate::config::{AnalysisThresholds, EngineConfig};
use crate::domain::{HistoricalMetric, TrendAnalysisResult, TrendDirection};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

pub const AVERAGE_EXECUTION_TIME_MS: &str = "averageExecutionTimeMs";
pub const MIN_EXECUTION_TIME_MS: &str = "minExecutionTimeMs";
pub const MAX_EXECUTION_TIME_MS: &str = "maxExecutionTimeMs";
pub const MEDIAN_EXECUTION_TIME_MS: &str = "medianExecutionTimeMs";
pub const STANDARD_DEVIATION_MS: &str = "standardDeviationMs";
pub const SUCCESS_RATE: &str = "successRate";
pub const SUCCESS_RATE_PERCENTAGE: &str = "successRatePercentage";
pub const FAILURE_RATE: &str = "failureRate";
pub const COEFFICIENT_OF_VARIATION: &str = "coefficientOfVariation";
pub const P50_EXECUTION_TIME_MS: &str = "p50ExecutionTimeMs";
pub const P90_EXECUTION_TIME_MS: &str = "p90ExecutionTimeMs";
pub const P95_EXECUTION_TIME_MS: &str = "p95ExecutionTimeMs";
pub const P99_EXECUTION_TIME_MS: &str = "p99ExecutionTimeMs";

const EPSILON: f64 = 1e-10;

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Arithmetic mean of durations, zero for empty input.
pub fn mean_duration(times: &[Duration]) -> Duration {
    if times.is_empty() {
        return Duration::ZERO;
    }
    let total: Duration = times.iter().sum();
    match u32::try_from(times.len()) {
        Ok(count) => total / count,
        Err(_) => total.div_f64(times.len() as f64),
    }
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Population standard deviation.
pub fn standard_deviation(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let avg = mean(values);
    let variance =
        values.iter().map(|value| (value - avg).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Linear-interpolated percentile. `fraction` is in [0, 1]; values outside
/// are clamped.
pub fn percentile(values: &[f64], fraction: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let sorted = sorted(values);
    let index = fraction.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = index.floor() as usize;
    let upper = index.ceil() as usize;
    if lower == upper {
        return sorted[lower];
    }
    let weight = index - lower as f64;
    sorted[lower] * (1.0 - weight) + sorted[upper] * weight
}

fn sorted(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    sorted
}

/// Pure numeric analysis over execution timings and historical series.
#[derive(Debug, Clone, Default)]
pub struct StatisticalAnalyzer {
    thresholds: AnalysisThresholds,
}

impl StatisticalAnalyzer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
        }
    }

    /// Blend of success rate, sample size and timing consistency, in [0, 1].
    pub fn confidence_score(
        &self,
        success_rate_percent: f64,
        total_tests: usize,
        execution_times_ms: &[f64],
    ) -> f64 {
        if total_tests == 0 {
            return 0.0;
        }

        let base = success_rate_percent / 100.0;
        let saturation = self.thresholds.confidence_saturation_tests.max(1) as f64;
        let test_count_factor = (total_tests as f64 / saturation).min(1.0);
        let consistency_factor = self.consistency_factor(execution_times_ms);
        let score = (base * test_count_factor * consistency_factor).clamp(0.0, 1.0);

        debug!(
            score,
            base, test_count_factor, consistency_factor, "confidence score calculated"
        );
        score
    }

    fn consistency_factor(&self, execution_times_ms: &[f64]) -> f64 {
        if execution_times_ms.is_empty() {
            return 1.0;
        }
        let avg = mean(execution_times_ms);
        let tolerance = avg * self.thresholds.consistency_tolerance;
        let consistent = execution_times_ms
            .iter()
            .all(|time| (time - avg).abs() < tolerance);
        if consistent {
            1.0
        } else {
            0.9
        }
    }

    pub fn performance_metrics(
        &self,
        execution_times_ms: &[f64],
        success_count: usize,
        total_count: usize,
    ) -> BTreeMap<String, f64> {
        let mut metrics = BTreeMap::new();
        if execution_times_ms.is_empty() {
            return metrics;
        }

        let avg = mean(execution_times_ms);
        let stddev = standard_deviation(execution_times_ms);
        let min = execution_times_ms.iter().copied().fold(f64::INFINITY, f64::min);
        let max = execution_times_ms
            .iter()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);

        metrics.insert(AVERAGE_EXECUTION_TIME_MS.to_string(), avg);
        metrics.insert(MIN_EXECUTION_TIME_MS.to_string(), min);
        metrics.insert(MAX_EXECUTION_TIME_MS.to_string(), max);
        metrics.insert(MEDIAN_EXECUTION_TIME_MS.to_string(), median(execution_times_ms));
        metrics.insert(STANDARD_DEVIATION_MS.to_string(), stddev);

        if total_count > 0 {
            let success_rate = success_count as f64 / total_count as f64;
            metrics.insert(SUCCESS_RATE.to_string(), success_rate);
            metrics.insert(SUCCESS_RATE_PERCENTAGE.to_string(), success_rate * 100.0);
            metrics.insert(
                FAILURE_RATE.to_string(),
                total_count.saturating_sub(success_count) as f64 / total_count as f64,
            );
        }

        let coefficient = if avg > 0.0 { stddev / avg } else { 0.0 };
        metrics.insert(COEFFICIENT_OF_VARIATION.to_string(), coefficient);

        for (key, fraction) in [
            (P50_EXECUTION_TIME_MS, 0.50),
            (P90_EXECUTION_TIME_MS, 0.90),
            (P95_EXECUTION_TIME_MS, 0.95),
            (P99_EXECUTION_TIME_MS, 0.99),
        ] {
            metrics.insert(key.to_string(), percentile(execution_times_ms, fraction));
        }

        metrics
    }

    /// Least-squares trend of value against sequence position, after
    /// ordering by timestamp.
    pub fn analyze_trends(&self, history: &[HistoricalMetric]) -> TrendAnalysisResult {
        if history.len() < 2 {
            return TrendAnalysisResult {
                direction: TrendDirection::InsufficientData,
                rate_of_change: 0.0,
                trend_confidence: 0.0,
                trend_description:
                    "Not enough historical data for trend analysis (minimum 2 data points required)"
                        .to_string(),
                trend_recommendations: Vec::new(),
            };
        }

        let mut ordered: Vec<&HistoricalMetric> = history.iter().collect();
        ordered.sort_by_key(|metric| metric.timestamp_ms);
        let values: Vec<f64> = ordered.iter().map(|metric| metric.value).collect();

        let n = values.len() as f64;
        let x_mean = (n - 1.0) / 2.0;
        let y_mean = mean(&values);

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        let mut y_variance = 0.0;
        for (index, value) in values.iter().enumerate() {
            let dx = index as f64 - x_mean;
            let dy = value - y_mean;
            numerator += dx * dy;
            denominator += dx * dx;
            y_variance += dy * dy;
        }

        if denominator.abs() < EPSILON {
            return TrendAnalysisResult {
                direction: TrendDirection::Stable,
                rate_of_change: 0.0,
                trend_confidence: 0.5,
                trend_description: "No significant trend detected - values remain stable"
                    .to_string(),
                trend_recommendations: Vec::new(),
            };
        }

        let slope = numerator / denominator;
        let r_squared = if y_variance.abs() > EPSILON {
            (numerator * numerator) / (denominator * y_variance)
        } else {
            0.0
        };
        let correlation = r_squared.abs().sqrt() * slope.signum();
        let confidence = correlation.abs().min(1.0);

        let direction = if confidence < self.thresholds.trend_significance {
            TrendDirection::Stable
        } else if slope > 0.0 {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        };
        let rate_of_change = if y_mean.abs() > EPSILON {
            slope / y_mean * 100.0
        } else {
            0.0
        };

        info!(
            ?direction,
            rate_of_change,
            confidence,
            points = values.len(),
            "trend analysis completed"
        );

        TrendAnalysisResult {
            direction,
            rate_of_change,
            trend_confidence: confidence,
            trend_description: trend_description(direction, rate_of_change, confidence),
            trend_recommendations: trend_recommendations(direction, rate_of_change, confidence),
        }
    }
}

fn confidence_band(confidence: f64) -> &'static str {
    if confidence >= 0.9 {
        "very high"
    } else if confidence >= 0.7 {
        "high"
    } else if confidence >= 0.5 {
        "moderate"
    } else if confidence >= 0.3 {
        "low"
    } else {
        "very low"
    }
}

fn trend_description(direction: TrendDirection, rate_of_change: f64, confidence: f64) -> String {
    let band = confidence_band(confidence);
    match direction {
        TrendDirection::Improving => format!(
            "Performance is improving at {:.1}% rate with {band} confidence",
            rate_of_change.abs()
        ),
        TrendDirection::Declining => format!(
            "Performance is declining at {:.1}% rate with {band} confidence",
            rate_of_change.abs()
        ),
        TrendDirection::Stable => format!("Performance remains stable with {band} confidence"),
        TrendDirection::InsufficientData => {
            "Insufficient data for reliable trend analysis".to_string()
        }
    }
}

fn trend_recommendations(
    direction: TrendDirection,
    rate_of_change: f64,
    confidence: f64,
) -> Vec<String> {
    let lines: &[&str] = match direction {
        TrendDirection::Improving if confidence >= 0.7 => &[
            "Continue current optimization strategies",
            "Monitor performance to maintain improvement trajectory",
        ],
        TrendDirection::Declining if confidence >= 0.7 => {
            let mut recommendations = vec![
                "Investigate causes of performance degradation".to_string(),
                "Implement corrective measures immediately".to_string(),
            ];
            if rate_of_change.abs() > 10.0 {
                recommendations.push(
                    "Critical performance decline detected - urgent intervention required"
                        .to_string(),
                );
            }
            return recommendations;
        }
        TrendDirection::Stable if confidence >= 0.5 => &[
            "Performance is stable - consider optimization opportunities",
            "Establish baseline metrics for future comparison",
        ],
        _ => &[
            "Collect more performance data for reliable trend analysis",
            "Consider increasing measurement frequency for better insights",
        ],
    };
    lines.iter().map(|line| line.to_string()).collect()
}
