use crate::config::TransportConfig;
use crate::error::{EngineError, TransportError};
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, CONNECTION, USER_AGENT};
use http::Method;
use reqwest::{Client, Proxy};
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

/// A fully resolved request ready for the wire.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
}

/// Response as seen by the executor.
///
/// `content_headers` holds payload-level headers (`content-*`), the rest
/// live in `headers`.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub content_headers: HeaderMap,
    pub body: Bytes,
}

impl TransportResponse {
    /// Split a flat header map into transport and payload headers.
    pub fn from_parts(status: u16, all_headers: HeaderMap, body: Bytes) -> Self {
        let mut headers = HeaderMap::new();
        let mut content_headers = HeaderMap::new();
        let mut current: Option<HeaderName> = None;
        for (name, value) in all_headers {
            if let Some(name) = name {
                current = Some(name);
            }
            let Some(name) = current.clone() else {
                continue;
            };
            if name.as_str().starts_with("content-") {
                content_headers.append(name, value);
            } else {
                headers.append(name, value);
            }
        }
        Self {
            status,
            headers,
            content_headers,
            body,
        }
    }
}

/// HTTP transport injected into the executor.
///
/// Implementations must be safe for concurrent use by many callers.
/// Dropping the returned future must cancel the call.
pub trait HttpTransport: Send + Sync {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>>;
}

/// Converts test case headers into a `HeaderMap`. Empty keys are ignored;
/// pairs that are not valid HTTP are left out and reported back.
pub fn build_headers(input: &BTreeMap<String, String>) -> (HeaderMap, Vec<EngineError>) {
    let mut headers = HeaderMap::new();
    let mut rejected = Vec::new();

    for (key, value) in input {
        if key.is_empty() {
            continue;
        }

        let header_name = match HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(err) => {
                rejected.push(EngineError::InvalidRequest(format!(
                    "Invalid header name `{key}`: {err}"
                )));
                continue;
            }
        };
        match HeaderValue::from_str(value) {
            Ok(header_value) => {
                headers.insert(header_name, header_value);
            }
            Err(err) => rejected.push(EngineError::InvalidRequest(format!(
                "Invalid header value for `{key}`: {err}"
            ))),
        }
    }

    (headers, rejected)
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> TransportError {
    let message = err.to_string();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("dns") || lowered.contains("failed to lookup address") {
        return TransportError::Dns(message);
    }
    if lowered.contains("tls") || lowered.contains("ssl") || lowered.contains("certificate") {
        return TransportError::Tls(message);
    }
    if err.is_connect() {
        return TransportError::Connect(message);
    }
    if err.is_body() || err.is_decode() {
        return TransportError::Read(message);
    }

    TransportError::Request(message)
}

/// Default transport backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
    keep_alive: bool,
}

impl ReqwestTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: build_client(config)?,
            keep_alive: config.keep_alive,
        })
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            keep_alive: true,
        }
    }
}

fn build_client(config: &TransportConfig) -> Result<Client, EngineError> {
    let mut builder = Client::builder();
    builder = if config.follow_redirects {
        builder.redirect(reqwest::redirect::Policy::limited(10))
    } else {
        builder.redirect(reqwest::redirect::Policy::none())
    };

    if let Some(proxy_url) = config
        .proxy_url
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
    {
        let proxy = Proxy::all(proxy_url)
            .map_err(|err| EngineError::Client(format!("Invalid proxy URL: {err}")))?;
        builder = builder.proxy(proxy);
    }

    if !config.verify_ssl {
        builder = builder.danger_accept_invalid_certs(true);
    }

    if !config.keep_alive {
        builder = builder.pool_max_idle_per_host(0);
    }

    let mut default_headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&config.user_agent) {
        default_headers.insert(USER_AGENT, value);
    }

    builder
        .default_headers(default_headers)
        .build()
        .map_err(|err| EngineError::Client(err.to_string()))
}

impl HttpTransport for ReqwestTransport {
    fn send(
        &self,
        request: TransportRequest,
    ) -> Pin<Box<dyn Future<Output = Result<TransportResponse, TransportError>> + Send + '_>> {
        Box::pin(async move {
            let mut builder = self
                .client
                .request(request.method, &request.url)
                .headers(request.headers);

            if !self.keep_alive {
                builder = builder.header(CONNECTION, HeaderValue::from_static("close"));
            }

            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder
                .send()
                .await
                .map_err(|err| classify_reqwest_error(&err))?;
            let status = response.status().as_u16();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|err| TransportError::Read(err.to_string()))?;

            Ok(TransportResponse::from_parts(status, headers, body))
        })
    }
}
