use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::time::Duration;

// ─── Test Case Types ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
    Options,
}

impl HttpMethod {
    /// Methods whose request carries a serialized payload.
    pub fn carries_body(self) -> bool {
        matches!(self, HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch)
    }
}

impl Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Head => "HEAD",
            HttpMethod::Options => "OPTIONS",
        };
        write!(f, "{label}")
    }
}

impl From<HttpMethod> for http::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => http::Method::GET,
            HttpMethod::Post => http::Method::POST,
            HttpMethod::Put => http::Method::PUT,
            HttpMethod::Patch => http::Method::PATCH,
            HttpMethod::Delete => http::Method::DELETE,
            HttpMethod::Head => http::Method::HEAD,
            HttpMethod::Options => http::Method::OPTIONS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestPriority {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    StatusCode,
    ResponseBody,
    ResponseHeader,
    JsonPath,
    ResponseTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
}

impl ComparisonOperator {
    pub fn evaluate(self, actual: &str, expected: &str) -> bool {
        match self {
            ComparisonOperator::Equals => actual == expected,
            ComparisonOperator::NotEquals => actual != expected,
            ComparisonOperator::Contains => actual.contains(expected),
            ComparisonOperator::NotContains => !actual.contains(expected),
            ComparisonOperator::StartsWith => actual.starts_with(expected),
            ComparisonOperator::EndsWith => actual.ends_with(expected),
        }
    }
}

/// One comparison between an expected value and a value extracted from a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assertion {
    pub name: String,
    pub kind: AssertionKind,
    /// Header name or dot-separated JSON path, depending on `kind`.
    #[serde(default)]
    pub path: String,
    pub expected: String,
    #[serde(default = "default_operator")]
    pub operator: ComparisonOperator,
    #[serde(default = "default_critical")]
    pub is_critical: bool,
}

fn default_operator() -> ComparisonOperator {
    ComparisonOperator::Equals
}

fn default_critical() -> bool {
    true
}

impl Assertion {
    pub fn new(
        name: impl Into<String>,
        kind: AssertionKind,
        operator: ComparisonOperator,
        expected: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            kind,
            path: String::new(),
            expected: expected.into(),
            operator,
            is_critical: true,
        }
    }

    pub fn status_code(expected: u16) -> Self {
        Self::new(
            "Status code check",
            AssertionKind::StatusCode,
            ComparisonOperator::Equals,
            expected.to_string(),
        )
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn advisory(mut self) -> Self {
        self.is_critical = false;
        self
    }
}

/// A single declarative HTTP probe plus its pass/fail assertions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub api_name: String,
    /// Relative or absolute URL.
    pub endpoint: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub parameters: BTreeMap<String, Value>,
    #[serde(default)]
    pub request_body: Option<Value>,
    /// Expected duration, also the per-test timeout.
    pub expected_execution_time: Duration,
    #[serde(default)]
    pub assertions: Vec<Assertion>,
    #[serde(default = "default_priority")]
    pub priority: TestPriority,
    /// Carried for callers; the pipeline never retries.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub test_data: BTreeMap<String, Value>,
    #[serde(default)]
    pub created_at_ms: u64,
}

fn default_priority() -> TestPriority {
    TestPriority::Medium
}

pub const DEFAULT_EXPECTED_EXECUTION_TIME: Duration = Duration::from_secs(5);

impl TestCase {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        method: HttpMethod,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            api_name: String::new(),
            endpoint: endpoint.into(),
            method,
            headers: BTreeMap::new(),
            parameters: BTreeMap::new(),
            request_body: None,
            expected_execution_time: DEFAULT_EXPECTED_EXECUTION_TIME,
            assertions: Vec::new(),
            priority: TestPriority::Medium,
            retry_count: 0,
            test_data: BTreeMap::new(),
            created_at_ms: 0,
        }
    }

    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.request_body = Some(body);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.expected_execution_time = timeout;
        self
    }

    pub fn with_assertion(mut self, assertion: Assertion) -> Self {
        self.assertions.push(assertion);
        self
    }
}

// ─── Capability Types ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapabilityStatus {
    Learning,
    Learned,
    Validated,
    Deprecated,
    Failed,
}

/// A named, learned integration behaviour and the tests that validate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnedCapability {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub required_skills: Vec<String>,
    #[serde(default)]
    pub configuration: BTreeMap<String, Value>,
    #[serde(default)]
    pub validation_tests: Vec<TestCase>,
    #[serde(default)]
    pub learned_at_ms: u64,
    #[serde(default = "default_capability_status")]
    pub status: CapabilityStatus,
}

fn default_capability_status() -> CapabilityStatus {
    CapabilityStatus::Learning
}

impl LearnedCapability {
    pub fn new(name: impl Into<String>, validation_tests: Vec<TestCase>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            required_skills: Vec::new(),
            configuration: BTreeMap::new(),
            validation_tests,
            learned_at_ms: 0,
            status: CapabilityStatus::Learning,
        }
    }
}
