use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use super::request::{Payload, Route};
use super::{BackendError, BackendRequest, ServiceSnapshot};
use crate::config::ConfigError;

/// Status probes must not hold up polling when the backend hangs
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Thin JSON-over-HTTP client for one backend base URL.
///
/// No retries happen here: each call is a single request and response.
#[derive(Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<Arc<SecretString>>,
    request_timeout: Duration,
}

impl fmt::Debug for BackendClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendClient")
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl BackendClient {
    pub fn new(
        base_url: &str,
        api_key: Option<SecretString>,
        request_timeout: Duration,
    ) -> Result<Self, BackendError> {
        let invalid = |reason: String| {
            BackendError::Config(ConfigError::InvalidSetting {
                field: "backend.remoteUrl",
                reason,
            })
        };

        let base_url = Url::parse(base_url.trim()).map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid(format!("'{}' cannot be used as a base URL", base_url)));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            api_key: api_key.map(Arc::new),
            request_timeout,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Live status probe.
    pub async fn probe(&self) -> Result<ServiceSnapshot, BackendError> {
        let body = self.execute(Route::status(), PROBE_TIMEOUT).await?;
        Ok(ServiceSnapshot::from_status_body(&body))
    }

    /// Does anything answer HTTP at this address, whatever the status code?
    pub async fn is_reachable(&self) -> bool {
        match self.url_for(&Route::status().segments) {
            Ok(url) => self
                .http
                .get(url)
                .timeout(Duration::from_secs(2))
                .send()
                .await
                .is_ok(),
            Err(_) => false,
        }
    }

    /// Validate and send a pass-through request.
    pub async fn send(&self, request: &BackendRequest) -> Result<Value, BackendError> {
        request.validate()?;
        self.execute(request.route(), self.request_timeout).await
    }

    pub(crate) async fn execute(&self, route: Route, timeout: Duration) -> Result<Value, BackendError> {
        let url = self.url_for(&route.segments)?;
        let described = route.describe();
        debug!("Backend request: {}", described);

        let mut builder = self
            .http
            .request(route.method.clone(), url)
            .timeout(timeout);

        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        builder = match route.payload {
            Payload::Empty => builder,
            Payload::Json(body) => builder.json(&body),
            Payload::Video { path, config } => builder.multipart(video_form(&path, &config).await?),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, timeout))?;

        match serde_json::from_str::<Value>(&text) {
            Ok(body) => {
                let reported_failure = body.get("success").and_then(Value::as_bool) == Some(false);
                if status.is_success() && !reported_failure {
                    return Ok(body);
                }

                let message = ["error", "message"]
                    .iter()
                    .find_map(|field| body.get(*field).and_then(Value::as_str))
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("Backend returned HTTP {}", status.as_u16()));
                warn!("{} rejected: {}", described, message);
                Err(BackendError::Rejected(message))
            }
            Err(_) if status.is_success() => Err(BackendError::InvalidResponse(format!(
                "{} did not return JSON",
                described
            ))),
            Err(_) => {
                let text = text.trim();
                let message = if text.is_empty() {
                    format!("Backend returned HTTP {}", status.as_u16())
                } else {
                    text.to_string()
                };
                warn!("{} rejected: {}", described, message);
                Err(BackendError::Rejected(message))
            }
        }
    }

    fn url_for(&self, segments: &[String]) -> Result<Url, BackendError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::InvalidResponse(format!("bad base URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout(timeout)
    } else {
        BackendError::Unreachable(e.to_string())
    }
}

async fn video_form(path: &std::path::Path, config: &Value) -> Result<Form, BackendError> {
    let read_error = |e: std::io::Error| BackendError::ReadFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    };

    let file = tokio::fs::File::open(path).await.map_err(read_error)?;
    let len = file.metadata().await.map_err(read_error)?.len();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());

    let part = Part::stream_with_length(reqwest::Body::from(file), len).file_name(file_name);
    Ok(Form::new()
        .part("video", part)
        .text("config", config.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_joins_segments() {
        let test_cases = vec![
            ("http://127.0.0.1:64451", "http://127.0.0.1:64451/api/system/status"),
            ("http://127.0.0.1:64451/", "http://127.0.0.1:64451/api/system/status"),
            ("https://gpu.example.com/vimo/", "https://gpu.example.com/vimo/api/system/status"),
        ];

        for (base, expected) in test_cases {
            let client = BackendClient::new(base, None, Duration::from_secs(1)).unwrap();
            let url = client.url_for(&Route::status().segments).unwrap();
            assert_eq!(url.as_str(), expected, "{}", base);
        }
    }

    #[test]
    fn test_url_for_escapes_ids() {
        let client = BackendClient::new("http://localhost:1", None, Duration::from_secs(1)).unwrap();
        let url = client
            .url_for(&["api".to_string(), "jobs".to_string(), "a/b c".to_string()])
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:1/api/jobs/a%2Fb%20c");
    }

    #[test]
    fn test_rejects_bad_base_url() {
        let err = BackendClient::new("mailto:ops@example.com", None, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, BackendError::Config(ConfigError::InvalidSetting { .. })));
    }
}
