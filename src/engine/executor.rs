use crate::config::EngineConfig;
use crate::domain::{
    critical_assertions_passed, now_ms, Assertion, AssertionKind, AssertionResult, ErrorDetails,
    MetricValue, TestCase, TestExecutionResult, METRIC_CONTENT_TYPE, METRIC_EXECUTION_TIME_MS,
    METRIC_RESPONSE_LENGTH, METRIC_STATUS_CODE,
};
use crate::engine::http::{build_headers, HttpTransport, TransportRequest, TransportResponse};
use crate::engine::json_path;
use crate::error::EngineError;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Url;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Runs one test case to completion. Implementations never panic on bad
/// input and always return a populated result.
pub trait CaseExecutor: Send + Sync {
    fn execute<'a>(
        &'a self,
        test_case: &'a TestCase,
    ) -> Pin<Box<dyn Future<Output = TestExecutionResult> + Send + 'a>>;
}

/// Executes exactly one test case against an injected transport.
#[derive(Clone)]
pub struct SingleTestExecutor {
    transport: Arc<dyn HttpTransport>,
    base_url: Url,
}

impl SingleTestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, base_url: &str) -> Result<Self, EngineError> {
        let base_url = Url::parse(base_url)
            .map_err(|err| EngineError::InvalidConfig(format!("base_url `{base_url}`: {err}")))?;
        Ok(Self {
            transport,
            base_url,
        })
    }

    pub fn from_config(
        transport: Arc<dyn HttpTransport>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        Self::new(transport, &config.base_url)
    }

    pub async fn execute_case(&self, test_case: &TestCase) -> TestExecutionResult {
        debug!(test_case = %test_case.name, id = %test_case.id, "executing test case");

        let request = match self.build_request(test_case) {
            Ok(request) => request,
            Err(err) => {
                warn!(test_case = %test_case.name, error = %err, "test case request is invalid");
                let mut result = TestExecutionResult::failed(
                    &test_case.id,
                    &test_case.name,
                    Duration::ZERO,
                    err.to_string(),
                );
                result.error = Some(ErrorDetails::new(err.kind(), err.to_string()));
                return result;
            }
        };

        let timeout = test_case.expected_execution_time;
        let started_at = Instant::now();
        let outcome = tokio::select! {
            biased;
            response = self.transport.send(request) => Some(response),
            _ = tokio::time::sleep(timeout) => None,
        };
        let execution_time = started_at.elapsed();

        let Some(outcome) = outcome else {
            let message = format!(
                "Test timed out after {:.3} seconds",
                timeout.as_secs_f64()
            );
            warn!(test_case = %test_case.name, elapsed_ms = execution_time.as_millis() as u64, "test case timed out");
            let mut result =
                TestExecutionResult::failed(&test_case.id, &test_case.name, execution_time, &message);
            result.error = Some(ErrorDetails::new("TIMEOUT", message));
            return result;
        };

        match outcome {
            Ok(response) => {
                let result = self.evaluate_response(test_case, &response, execution_time);
                debug!(
                    test_case = %test_case.name,
                    elapsed_ms = execution_time.as_millis() as u64,
                    status = if result.success { "PASSED" } else { "FAILED" },
                    "test case executed"
                );
                result
            }
            Err(err) => {
                error!(test_case = %test_case.name, error = %err, "test case transport failure");
                let mut result = TestExecutionResult::failed(
                    &test_case.id,
                    &test_case.name,
                    execution_time,
                    err.to_string(),
                );
                result.error = Some(ErrorDetails::new(err.kind(), err.to_string()));
                result
            }
        }
    }

    pub fn build_request(&self, test_case: &TestCase) -> Result<TransportRequest, EngineError> {
        let mut url = self.base_url.join(&test_case.endpoint).map_err(|err| {
            EngineError::InvalidRequest(format!("Invalid endpoint `{}`: {err}", test_case.endpoint))
        })?;
        let (mut headers, rejected) = build_headers(&test_case.headers);
        for err in &rejected {
            warn!(test_case = %test_case.name, error = %err, "skipping header that cannot be sent");
        }
        let mut body = None;

        if test_case.method.carries_body() {
            let payload = match &test_case.request_body {
                Some(explicit) => Some(explicit.clone()),
                None if !test_case.parameters.is_empty() => {
                    Some(parameters_object(&test_case.parameters))
                }
                None => None,
            };
            if let Some(payload) = payload {
                let encoded = serde_json::to_vec(&payload).map_err(|err| {
                    EngineError::InvalidRequest(format!("Failed to serialize body: {err}"))
                })?;
                if !headers.contains_key(CONTENT_TYPE) {
                    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                }
                body = Some(Bytes::from(encoded));
            }
        } else if !test_case.parameters.is_empty() {
            let mut query = url.query_pairs_mut();
            for (key, value) in &test_case.parameters {
                query.append_pair(key, &json_path::node_text(value));
            }
        }

        Ok(TransportRequest {
            method: test_case.method.into(),
            url: url.to_string(),
            headers,
            body,
        })
    }

    fn evaluate_response(
        &self,
        test_case: &TestCase,
        response: &TransportResponse,
        execution_time: Duration,
    ) -> TestExecutionResult {
        let body = String::from_utf8_lossy(&response.body).into_owned();
        let assertion_results: Vec<AssertionResult> = test_case
            .assertions
            .iter()
            .map(|assertion| evaluate_assertion(assertion, response, &body))
            .collect();

        TestExecutionResult {
            test_case_id: test_case.id.clone(),
            test_case_name: test_case.name.clone(),
            success: critical_assertions_passed(&assertion_results),
            execution_time,
            response: Some(body),
            assertion_results,
            metrics: collect_metrics(response, execution_time),
            error_message: None,
            error: None,
            executed_at_ms: now_ms(),
            attempt_number: 1,
        }
    }
}

impl CaseExecutor for SingleTestExecutor {
    fn execute<'a>(
        &'a self,
        test_case: &'a TestCase,
    ) -> Pin<Box<dyn Future<Output = TestExecutionResult> + Send + 'a>> {
        Box::pin(self.execute_case(test_case))
    }
}

fn parameters_object(parameters: &BTreeMap<String, Value>) -> Value {
    let map: Map<String, Value> = parameters
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    Value::Object(map)
}

fn evaluate_assertion(
    assertion: &Assertion,
    response: &TransportResponse,
    body: &str,
) -> AssertionResult {
    let mut result = AssertionResult {
        assertion_name: assertion.name.clone(),
        passed: false,
        actual_value: String::new(),
        expected_value: assertion.expected.clone(),
        is_critical: assertion.is_critical,
        error_message: None,
    };

    match extract_actual_value(assertion, response, body) {
        Ok(actual) => {
            result.passed = assertion.operator.evaluate(&actual, &assertion.expected);
            result.actual_value = actual;
        }
        Err(message) => {
            result.error_message = Some(message);
        }
    }

    result
}

fn extract_actual_value(
    assertion: &Assertion,
    response: &TransportResponse,
    body: &str,
) -> Result<String, String> {
    match assertion.kind {
        AssertionKind::StatusCode => Ok(response.status.to_string()),
        AssertionKind::ResponseBody => Ok(body.to_string()),
        AssertionKind::ResponseHeader => header_value(response, &assertion.path),
        AssertionKind::JsonPath => Ok(json_path::extract(body, &assertion.path)),
        // Timing is supplied by callers; nothing is measured here.
        AssertionKind::ResponseTime => Ok("0".to_string()),
    }
}

/// First value for `name`, transport headers before payload headers.
fn header_value(response: &TransportResponse, name: &str) -> Result<String, String> {
    if name.trim().is_empty() {
        return Err("Header assertion requires a header name".to_string());
    }

    let value = lookup_header(&response.headers, name)
        .or_else(|| lookup_header(&response.content_headers, name));

    match value {
        Some(value) => value
            .to_str()
            .map(str::to_string)
            .map_err(|err| format!("Header `{name}` is not valid text: {err}")),
        None => Ok(String::new()),
    }
}

fn lookup_header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a HeaderValue> {
    headers.get(name.trim().to_ascii_lowercase().as_str())
}

fn collect_metrics(
    response: &TransportResponse,
    execution_time: Duration,
) -> BTreeMap<String, MetricValue> {
    let content_type = lookup_header(&response.content_headers, CONTENT_TYPE.as_str())
        .or_else(|| lookup_header(&response.headers, CONTENT_TYPE.as_str()))
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    let mut metrics = BTreeMap::new();
    metrics.insert(
        METRIC_STATUS_CODE.to_string(),
        MetricValue::Integer(i64::from(response.status)),
    );
    metrics.insert(
        METRIC_EXECUTION_TIME_MS.to_string(),
        MetricValue::Float(execution_time.as_secs_f64() * 1000.0),
    );
    metrics.insert(
        METRIC_RESPONSE_LENGTH.to_string(),
        MetricValue::Integer(response.body.len() as i64),
    );
    metrics.insert(METRIC_CONTENT_TYPE.to_string(), MetricValue::Text(content_type));
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ComparisonOperator, HttpMethod};
    use crate::error::TransportError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct FakeTransport {
        response: TransportResponse,
        delay: Duration,
        fail_with: Option<TransportError>,
        calls: AtomicUsize,
        last_request: Mutex<Option<TransportRequest>>,
    }

    impl FakeTransport {
        fn json(status: u16, body: &str) -> Self {
            let mut content_headers = HeaderMap::new();
            content_headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
            Self {
                response: TransportResponse {
                    status,
                    headers: HeaderMap::new(),
                    content_headers,
                    body: Bytes::from(body.to_string()),
                },
                delay: Duration::ZERO,
                fail_with: None,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn failing(err: TransportError) -> Self {
            let mut transport = Self::json(0, "");
            transport.fail_with = Some(err);
            transport
        }

        fn last_request(&self) -> TransportRequest {
            self.last_request
                .lock()
                .unwrap()
                .clone()
                .expect("request was dispatched")
        }
    }

    impl HttpTransport for FakeTransport {
        fn send(
            &self,
            request: TransportRequest,
        ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, crate::error::TransportError>> + Send + '_>>
        {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                *self.last_request.lock().unwrap() = Some(request);
                if !self.delay.is_zero() {
                    tokio::time::sleep(self.delay).await;
                }
                match &self.fail_with {
                    Some(err) => Err(err.clone()),
                    None => Ok(self.response.clone()),
                }
            })
        }
    }

    fn executor(transport: Arc<FakeTransport>) -> SingleTestExecutor {
        SingleTestExecutor::new(transport, "https://api.example.com").expect("executor")
    }

    fn case() -> TestCase {
        TestCase::new("t-1", "get user", HttpMethod::Get, "/users/1")
    }

    #[tokio::test]
    async fn success_depends_only_on_critical_assertions() {
        let transport = Arc::new(FakeTransport::json(200, r#"{"name":"ada"}"#));
        let executor = executor(transport);

        let passing = case()
            .with_assertion(Assertion::status_code(200))
            .with_assertion(Assertion::status_code(201).advisory());
        let result = executor.execute_case(&passing).await;
        assert!(result.success);
        assert_eq!(result.assertion_results.len(), 2);
        assert!(!result.assertion_results[1].passed);
        assert!(!result.assertion_results[1].is_critical);

        let failing = case()
            .with_assertion(Assertion::status_code(404))
            .with_assertion(Assertion::status_code(200).advisory());
        let result = executor.execute_case(&failing).await;
        assert!(!result.success);
        assert_eq!(result.assertion_results[0].actual_value, "200");
        assert_eq!(result.assertion_results[0].expected_value, "404");
    }

    #[tokio::test]
    async fn timeout_produces_failed_result() {
        let mut transport = FakeTransport::json(200, "{}");
        transport.delay = Duration::from_millis(300);
        let executor = executor(Arc::new(transport));
        let timeout = Duration::from_millis(30);

        let result = executor
            .execute_case(&case().with_timeout(timeout).with_assertion(Assertion::status_code(200)))
            .await;

        assert!(!result.success);
        let message = result.error_message.as_deref().unwrap_or_default();
        assert!(message.contains("timed out"), "{message}");
        assert!(result.execution_time >= timeout);
        assert!(result.execution_time < Duration::from_millis(300));
        assert_eq!(result.error.as_ref().map(|e| e.kind.as_str()), Some("TIMEOUT"));
        assert!(result.assertion_results.is_empty());
    }

    #[tokio::test]
    async fn transport_errors_are_captured_as_data() {
        let transport = Arc::new(FakeTransport::failing(TransportError::Connect(
            "connection refused".to_string(),
        )));
        let executor = executor(transport);

        let result = executor.execute_case(&case()).await;
        assert!(!result.success);
        assert_eq!(
            result.error_message.as_deref(),
            Some("Connection failed: connection refused")
        );
        assert_eq!(
            result.error,
            Some(ErrorDetails::new("CONNECT_ERROR", "Connection failed: connection refused"))
        );
    }

    #[tokio::test]
    async fn header_assertions_fall_back_to_payload_headers() {
        let mut transport = FakeTransport::json(200, "{}");
        transport
            .response
            .headers
            .insert("x-request-id", HeaderValue::from_static("req-9"));
        let executor = executor(Arc::new(transport));

        let test_case = case()
            .with_assertion(
                Assertion::new("trace", AssertionKind::ResponseHeader, ComparisonOperator::Equals, "req-9")
                    .with_path("X-Request-Id"),
            )
            .with_assertion(
                Assertion::new("type", AssertionKind::ResponseHeader, ComparisonOperator::StartsWith, "application/")
                    .with_path("Content-Type"),
            )
            .with_assertion(
                Assertion::new("missing", AssertionKind::ResponseHeader, ComparisonOperator::Equals, "")
                    .with_path("X-Absent"),
            );

        let result = executor.execute_case(&test_case).await;
        assert!(result.success);
        assert_eq!(result.assertion_results[1].actual_value, "application/json");
        assert_eq!(result.assertion_results[2].actual_value, "");
        assert!(result.assertion_results[2].error_message.is_none());
    }

    #[tokio::test]
    async fn one_broken_assertion_does_not_abort_the_rest() {
        let mut transport = FakeTransport::json(200, r#"{"ok":true}"#);
        transport
            .response
            .headers
            .insert("x-binary", HeaderValue::from_bytes(&[0xfa, 0xfb]).unwrap());
        let executor = executor(Arc::new(transport));

        let test_case = case()
            .with_assertion(
                Assertion::new("binary", AssertionKind::ResponseHeader, ComparisonOperator::Equals, "x")
                    .with_path("x-binary")
                    .advisory(),
            )
            .with_assertion(
                Assertion::new("ok flag", AssertionKind::JsonPath, ComparisonOperator::Equals, "true")
                    .with_path("ok"),
            );

        let result = executor.execute_case(&test_case).await;
        assert!(result.success);
        assert!(!result.assertion_results[0].passed);
        assert!(result.assertion_results[0].error_message.is_some());
        assert!(result.assertion_results[1].passed);
    }

    #[tokio::test]
    async fn json_path_on_malformed_body_fails_softly() {
        let executor = executor(Arc::new(FakeTransport::json(200, "<html>")));
        let test_case = case().with_assertion(
            Assertion::new("id", AssertionKind::JsonPath, ComparisonOperator::Equals, "1")
                .with_path("data.id"),
        );

        let result = executor.execute_case(&test_case).await;
        assert!(!result.success);
        assert_eq!(result.assertion_results[0].actual_value, "");
        assert!(result.assertion_results[0].error_message.is_none());
    }

    #[tokio::test]
    async fn metrics_describe_the_response() {
        let mut transport = FakeTransport::json(201, "hello");
        transport.response.content_headers.clear();
        let executor = executor(Arc::new(transport));

        let result = executor.execute_case(&case()).await;
        assert_eq!(result.metrics.get(METRIC_STATUS_CODE), Some(&MetricValue::Integer(201)));
        assert_eq!(result.metrics.get(METRIC_RESPONSE_LENGTH), Some(&MetricValue::Integer(5)));
        assert_eq!(
            result.metrics.get(METRIC_CONTENT_TYPE),
            Some(&MetricValue::Text("unknown".to_string()))
        );
        assert!(result.metrics.contains_key(METRIC_EXECUTION_TIME_MS));
        assert_eq!(result.status_code(), Some(201));
        assert_eq!(result.response.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn get_parameters_are_escaped_independently() {
        let transport = Arc::new(FakeTransport::json(200, "{}"));
        let executor = executor(transport.clone());
        let test_case = TestCase::new("q", "search", HttpMethod::Get, "/search")
            .with_parameter("a b", "x&y")
            .with_parameter("a+b", 1);

        executor.execute_case(&test_case).await;
        let request = transport.last_request();
        assert_eq!(request.method, http::Method::GET);
        assert!(request.url.starts_with("https://api.example.com/search?"));
        assert!(request.url.contains("a+b=x%26y"), "{}", request.url);
        assert!(request.url.contains("a%2Bb=1"), "{}", request.url);
        assert!(request.body.is_none());
    }

    #[tokio::test]
    async fn explicit_body_takes_priority_over_parameters() {
        let transport = Arc::new(FakeTransport::json(200, "{}"));
        let executor = executor(transport.clone());

        let with_body = TestCase::new("p", "create", HttpMethod::Post, "https://other.example.com/items")
            .with_parameter("ignored", true)
            .with_body(json!({"name": "widget"}));
        executor.execute_case(&with_body).await;
        let request = transport.last_request();
        assert_eq!(request.url, "https://other.example.com/items");
        let sent: Value = serde_json::from_slice(request.body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"name": "widget"}));
        assert_eq!(
            request.headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()),
            Some("application/json")
        );

        let with_params = TestCase::new("p2", "update", HttpMethod::Put, "/items/1")
            .with_parameter("qty", 3);
        executor.execute_case(&with_params).await;
        let sent: Value =
            serde_json::from_slice(transport.last_request().body.as_deref().unwrap()).unwrap();
        assert_eq!(sent, json!({"qty": 3}));
    }

    #[tokio::test]
    async fn unsendable_headers_are_dropped_and_the_request_still_goes_out() {
        let transport = Arc::new(FakeTransport::json(200, "{}"));
        let executor = executor(transport.clone());
        let test_case = case()
            .with_header("bad header", "v")
            .with_header("x-broken", "line\nbreak")
            .with_header("X-Api-Key", "k-1")
            .with_assertion(Assertion::status_code(200));

        let result = executor.execute_case(&test_case).await;
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);

        let request = transport.last_request();
        assert_eq!(request.headers.len(), 1);
        assert_eq!(
            request.headers.get("x-api-key").and_then(|v| v.to_str().ok()),
            Some("k-1")
        );
    }

    #[tokio::test]
    async fn unparsable_endpoint_fails_without_dispatch() {
        let transport = Arc::new(FakeTransport::json(200, "{}"));
        let executor = executor(transport.clone());
        let test_case = TestCase::new("t-2", "broken url", HttpMethod::Get, "http://[::1");

        let result = executor.execute_case(&test_case).await;
        assert!(!result.success);
        assert_eq!(result.error.as_ref().map(|e| e.kind.as_str()), Some("INVALID_REQUEST"));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }
}
