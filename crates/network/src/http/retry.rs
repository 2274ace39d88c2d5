// -------------------------------------------------------------------------------------------------
//  Copyright (C) 2015-2025 Nautech Systems Pty Ltd. All rights reserved.
//  https://nautechsystems.io
//
//  Licensed under the GNU Lesser General Public License Version 3.0 (the "License");
//  You may not use this file except in compliance with the License.
//  You may obtain a copy of the License at https://www.gnu.org/licenses/lgpl-3.0.en.html
//
//  Unless required by applicable law or agreed to in writing, software
//  distributed under the License is distributed on an "AS IS" BASIS,
//  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//  See the License for the specific language governing permissions and
//  limitations under the License.
// -------------------------------------------------------------------------------------------------

//! Drives one request through a wrapped transport with exponential-backoff
//! retries, a pluggable classifier, and a per-retry preparation hook.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use url::Url;

use super::{
    client::HttpResponse,
    error::HttpClientError,
    wrappers::{OutgoingRequest, RoundTrip},
};
use crate::backoff::ExponentialBackoff;

/// Growth factor for the backoff cap, matching the full-jitter formula
/// `wait = rand_uniform(0, min(retryWaitMax, retryWaitMin * 2^attempt))`:
/// [`ExponentialBackoff`] doubles the cap each attempt and samples the wait
/// uniformly from `[0, cap]` itself, not a fixed window on top of it.
const FULL_JITTER_FACTOR: f64 = 2.0;

/// Classifies whether an error should be retried.
///
/// Callers supply a custom classifier to extend the default policy (retry on
/// connection errors and HTTP >= 500) — for example, file-transfer paths add
/// TCP i/o-timeout and deadline-exceeded signatures.
pub type Classifier = Arc<dyn Fn(&HttpClientError) -> bool + Send + Sync>;

/// Invoked before each retry attempt (never before the first). Lets callers
/// rotate presigned URLs or reset stateful readers before the request replays.
#[async_trait]
pub trait PrepareRetry: std::fmt::Debug + Send + Sync {
    /// Mutates `request` in place ahead of a retry attempt.
    ///
    /// # Errors
    ///
    /// Returning an error aborts the retry with that error.
    async fn prepare(&self, request: &mut OutgoingRequest) -> Result<(), HttpClientError>;
}

/// Retry configuration for one [`RetryableHttpClient`].
#[derive(Clone)]
pub struct RetryPolicy {
    /// Maximum total attempts, including the first.
    pub retry_max: u32,
    /// Minimum backoff wait between attempts.
    pub retry_wait_min: Duration,
    /// Maximum backoff wait between attempts.
    pub retry_wait_max: Duration,
    /// Per-attempt timeout; a retry begins a fresh timeout.
    pub non_retry_timeout: Duration,
    /// Overrides the default retry classifier.
    pub classifier: Option<Classifier>,
    /// Invoked before each retry attempt.
    pub prepare_retry: Option<Arc<dyn PrepareRetry>>,
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("retry_max", &self.retry_max)
            .field("retry_wait_min", &self.retry_wait_min)
            .field("retry_wait_max", &self.retry_wait_max)
            .field("non_retry_timeout", &self.non_retry_timeout)
            .field("classifier", &self.classifier.as_ref().map(|_| "<fn>"))
            .field("prepare_retry", &self.prepare_retry)
            .finish()
    }
}

impl RetryPolicy {
    /// A policy using the crate's documented retry defaults.
    #[must_use]
    pub fn defaults() -> Self {
        Self {
            retry_max: tracklab_core::consts::DEFAULT_RETRY_MAX,
            retry_wait_min: Duration::from_secs(tracklab_core::consts::DEFAULT_RETRY_WAIT_MIN_SECS),
            retry_wait_max: Duration::from_secs(tracklab_core::consts::DEFAULT_RETRY_WAIT_MAX_SECS),
            non_retry_timeout: Duration::from_secs(tracklab_core::consts::DEFAULT_NON_RETRY_TIMEOUT_SECS),
            classifier: None,
            prepare_retry: None,
        }
    }
}

/// Maps a non-2xx HTTP response into the corresponding taxonomy error (§7).
fn response_error(method: &Method, url: &Url, status: StatusCode, body: &[u8]) -> HttpClientError {
    let body_text = String::from_utf8_lossy(body).into_owned();
    match status.as_u16() {
        401 | 403 => HttpClientError::Auth {
            status: status.as_u16(),
            body: body_text,
        },
        429 => HttpClientError::RateLimited { retry_after: None },
        s if s >= 500 => HttpClientError::TransientTransport(format!("HTTP {s}")),
        _ => HttpClientError::terminal_http(method.as_str(), url.as_str(), status.as_u16(), &body_text),
    }
}

fn default_classify(err: &HttpClientError) -> bool {
    matches!(
        err,
        HttpClientError::Transport(_)
            | HttpClientError::TransientTransport(_)
            | HttpClientError::RateLimited { .. }
    )
}

/// Drives a request through a wrapped transport with retry, backoff, and logging.
#[derive(Debug)]
pub struct RetryableHttpClient {
    transport: Arc<dyn RoundTrip>,
    policy: RetryPolicy,
}

impl RetryableHttpClient {
    /// Wraps `transport` with `policy`.
    #[must_use]
    pub fn new(transport: Arc<dyn RoundTrip>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    fn classify(&self, err: &HttpClientError) -> bool {
        self.policy
            .classifier
            .as_ref()
            .map_or_else(|| default_classify(err), |c| c(err))
    }

    /// Sends `request`, retrying per policy.
    ///
    /// # Errors
    ///
    /// Returns the final error once retries are exhausted, the error is
    /// non-retryable, the request is cancelled, or `PrepareRetry` fails.
    pub async fn send(&self, mut request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        let mut backoff = ExponentialBackoff::new(
            self.policy.retry_wait_min,
            self.policy.retry_wait_max,
            FULL_JITTER_FACTOR,
            true,
            false,
        )
        .map_err(|e| HttpClientError::Configuration(e.to_string()))?;

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;

            if attempt > 1 {
                if let Some(prepare) = &self.policy.prepare_retry {
                    prepare.prepare(&mut request).await?;
                }
                let wait = backoff.next_duration().min(self.policy.retry_wait_max);
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = request.cancellation.cancelled() => return Err(HttpClientError::Cancelled),
                }
            }

            let mut attempt_request = request.clone();
            attempt_request.timeout = Some(self.policy.non_retry_timeout);

            let outcome = match self.transport.send(attempt_request).await {
                Ok(resp) if resp.is_success() => Ok(resp),
                Ok(resp) => Err(response_error(&request.method, &request.url, resp.status, &resp.body)),
                Err(err) => Err(err),
            };

            match outcome {
                Ok(resp) => {
                    if let Some(operation) = &request.operation {
                        operation.clear_error_status();
                    }
                    return Ok(resp);
                }
                Err(HttpClientError::Cancelled) => return Err(HttpClientError::Cancelled),
                Err(err) => {
                    let retryable = self.classify(&err);
                    if retryable && attempt < self.policy.retry_max {
                        tracing::debug!(attempt, %err, "retrying request");
                        if let Some(operation) = &request.operation {
                            operation.set_error_status(format!("retrying {err}"));
                        }
                        continue;
                    }
                    if !matches!(err, HttpClientError::Auth { .. } | HttpClientError::TerminalHttp { .. }) {
                        tracing::error!(
                            method = %request.method,
                            url = %request.url,
                            %err,
                            "request failed"
                        );
                    }
                    return Err(err);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use rstest::rstest;

    use super::*;

    #[derive(Debug)]
    struct ScriptedTransport {
        responses: std::sync::Mutex<Vec<Result<StatusCode, HttpClientError>>>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl RoundTrip for ScriptedTransport {
        async fn send(&self, _request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().remove(0);
            match next {
                Ok(status) => Ok(HttpResponse {
                    status,
                    headers: http::HeaderMap::new(),
                    body: bytes::Bytes::new(),
                }),
                Err(e) => Err(e),
            }
        }
    }

    #[derive(Debug)]
    struct CountingPrepareRetry {
        calls: AtomicU32,
    }

    #[async_trait]
    impl PrepareRetry for CountingPrepareRetry {
        async fn prepare(&self, _request: &mut OutgoingRequest) -> Result<(), HttpClientError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_retries_on_500_then_succeeds() {
        // Scenario 3 from the spec: classifier treats 500 as retryable; server
        // returns 500 then 200; PrepareRetry called exactly once; 2 requests total.
        let transport = Arc::new(ScriptedTransport {
            responses: std::sync::Mutex::new(vec![
                Ok(StatusCode::INTERNAL_SERVER_ERROR),
                Ok(StatusCode::OK),
            ]),
            calls: AtomicU32::new(0),
        });
        let prepare = Arc::new(CountingPrepareRetry {
            calls: AtomicU32::new(0),
        });

        let mut policy = RetryPolicy::defaults();
        policy.retry_wait_min = Duration::from_millis(1);
        policy.retry_wait_max = Duration::from_millis(2);
        policy.prepare_retry = Some(prepare.clone());

        let client = RetryableHttpClient::new(transport.clone(), policy);
        let request = OutgoingRequest::new(Method::GET, Url::parse("https://api.example.com/x").unwrap());

        let response = client.send(request).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
        assert_eq!(prepare.calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_terminal_4xx_is_not_retried() {
        let transport = Arc::new(ScriptedTransport {
            responses: std::sync::Mutex::new(vec![Ok(StatusCode::NOT_FOUND)]),
            calls: AtomicU32::new(0),
        });

        let mut policy = RetryPolicy::defaults();
        policy.retry_wait_min = Duration::from_millis(1);
        policy.retry_wait_max = Duration::from_millis(2);

        let client = RetryableHttpClient::new(transport.clone(), policy);
        let request = OutgoingRequest::new(Method::GET, Url::parse("https://api.example.com/x").unwrap());

        let err = client.send(request).await.unwrap_err();
        assert!(matches!(err, HttpClientError::TerminalHttp { status: 404, .. }));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[rstest]
    #[tokio::test]
    async fn test_retry_sets_and_clears_operation_error_status() {
        use crate::operation::OperationTree;

        let transport = Arc::new(ScriptedTransport {
            responses: std::sync::Mutex::new(vec![
                Ok(StatusCode::INTERNAL_SERVER_ERROR),
                Ok(StatusCode::OK),
            ]),
            calls: AtomicU32::new(0),
        });

        let mut policy = RetryPolicy::defaults();
        policy.retry_wait_min = Duration::from_millis(1);
        policy.retry_wait_max = Duration::from_millis(2);

        let client = RetryableHttpClient::new(transport, policy);
        let tree = OperationTree::new();
        let operation = tree.new_operation("filestream");
        let mut request = OutgoingRequest::new(Method::GET, Url::parse("https://api.example.com/x").unwrap());
        request.operation = Some(operation.clone());

        client.send(request).await.unwrap();

        assert!(tree.snapshot().roots[0].error_status.is_none());
    }

    #[rstest]
    #[tokio::test]
    async fn test_exhausts_retry_budget() {
        let transport = Arc::new(ScriptedTransport {
            responses: std::sync::Mutex::new(vec![
                Ok(StatusCode::INTERNAL_SERVER_ERROR),
                Ok(StatusCode::INTERNAL_SERVER_ERROR),
                Ok(StatusCode::INTERNAL_SERVER_ERROR),
            ]),
            calls: AtomicU32::new(0),
        });

        let mut policy = RetryPolicy::defaults();
        policy.retry_max = 2;
        policy.retry_wait_min = Duration::from_millis(1);
        policy.retry_wait_max = Duration::from_millis(2);

        let client = RetryableHttpClient::new(transport.clone(), policy);
        let request = OutgoingRequest::new(Method::GET, Url::parse("https://api.example.com/x").unwrap());

        let err = client.send(request).await.unwrap_err();
        assert!(matches!(err, HttpClientError::TransientTransport(_)));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 2);
    }
}
