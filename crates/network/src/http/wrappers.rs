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

//! Composable round-trip wrappers: each takes an inner send-function
//! `request -> (response, error)` and returns a send-function of the same
//! shape. Wrappers compose by nesting, never by a deep class hierarchy — see
//! the `RoundTrip` trait below, which stands in for that function type.

use std::{sync::Arc, time::Instant};

use async_trait::async_trait;
use bytes::Bytes;
use http::HeaderMap;
use reqwest::Method;
use url::Url;

use super::{
    client::{HttpResponse, InnerHttpClient},
    error::HttpClientError,
};
use crate::{
    credentials::CredentialProvider,
    operation::Operation,
    ratelimiter::{RateLimitTracker, RateLimiter, parse_rate_limit_headers, quota::Quota},
};

/// One outbound HTTP request as it flows through the wrapper chain.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// Request method.
    pub method: Method,
    /// Fully qualified target URL.
    pub url: Url,
    /// Request headers, mutated in place by upstream wrappers.
    pub headers: HeaderMap,
    /// Request body, if any. Must be replayable across retries.
    pub body: Option<Bytes>,
    /// Per-attempt timeout.
    pub timeout: Option<std::time::Duration>,
    /// Cooperative cancellation handle, checked at every suspension point.
    pub cancellation: tokio_util::sync::CancellationToken,
    /// Operation this request reports retries against, if the caller attached
    /// one. [`RetryableHttpClient`](super::retry::RetryableHttpClient) sets
    /// its error status while retrying and clears it on the next success.
    pub operation: Option<Operation>,
}

impl OutgoingRequest {
    /// Creates a request with no body, no timeout, and a fresh (never cancelled) token.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            cancellation: tokio_util::sync::CancellationToken::new(),
            operation: None,
        }
    }
}

/// Stands in for the "function over send-functions" shape from the design
/// notes: a transport layer consumes one request and returns one response.
#[async_trait]
pub trait RoundTrip: std::fmt::Debug + Send + Sync {
    /// Sends `request` through this layer (and everything it wraps).
    async fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, HttpClientError>;
}

/// The innermost layer: a bare [`InnerHttpClient`] attempt, no wrapping.
#[derive(Debug)]
pub struct BaseTransport {
    inner: InnerHttpClient,
}

impl BaseTransport {
    /// Wraps an [`InnerHttpClient`] as the base of a wrapper chain.
    #[must_use]
    pub fn new(inner: InnerHttpClient) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl RoundTrip for BaseTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        let response = self
            .inner
            .send_request(
                request.method,
                request.url.to_string(),
                Some(request.headers),
                request.body,
                request.timeout,
            )
            .await?;

        // Guard the observed-elsewhere bug where a library can return neither
        // a response nor an error: `send_request` already maps transport
        // failures to `Err`, so reaching here with a response is the invariant.
        Ok(response)
    }
}

/// Sets each header in `extra` on the outgoing request before delegating.
/// Keys already present on the request are overwritten.
#[derive(Debug)]
pub struct ExtraHeaders {
    inner: Arc<dyn RoundTrip>,
    extra: HeaderMap,
}

impl ExtraHeaders {
    /// Wraps `inner`, injecting `extra` on every request.
    #[must_use]
    pub fn new(inner: Arc<dyn RoundTrip>, extra: HeaderMap) -> Self {
        Self { inner, extra }
    }
}

#[async_trait]
impl RoundTrip for ExtraHeaders {
    async fn send(&self, mut request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        for (name, value) in &self.extra {
            request.headers.insert(name.clone(), value.clone());
        }
        self.inner.send(request).await
    }
}

/// Observes a request/response pair after the inner call returns, without
/// altering status or body. Implementations must not block for long; the
/// peek happens on the request's own task.
#[async_trait]
pub trait NetworkPeek: std::fmt::Debug + Send + Sync {
    /// Inspects `request` and `response` after a successful round trip.
    async fn peek(&self, request: &OutgoingRequest, response: &HttpResponse);
}

/// Invokes an optional [`NetworkPeek`] after the inner call returns.
#[derive(Debug)]
pub struct NetworkPeeker {
    inner: Arc<dyn RoundTrip>,
    peeker: Option<Arc<dyn NetworkPeek>>,
}

impl NetworkPeeker {
    /// Wraps `inner`, invoking `peeker` (if any) after every successful response.
    #[must_use]
    pub fn new(inner: Arc<dyn RoundTrip>, peeker: Option<Arc<dyn NetworkPeek>>) -> Self {
        Self { inner, peeker }
    }
}

#[async_trait]
impl RoundTrip for NetworkPeeker {
    async fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        let request_for_peek = request.clone();
        let response = self.inner.send(request).await?;
        if let Some(peeker) = &self.peeker {
            peeker.peek(&request_for_peek, &response).await;
        }
        Ok(response)
    }
}

/// Attaches authorization via a [`CredentialProvider`] before delegating.
#[derive(Debug)]
pub struct CredentialInjector {
    inner: Arc<dyn RoundTrip>,
    provider: Arc<dyn CredentialProvider>,
}

impl CredentialInjector {
    /// Wraps `inner`, applying `provider` to every request's headers.
    #[must_use]
    pub fn new(inner: Arc<dyn RoundTrip>, provider: Arc<dyn CredentialProvider>) -> Self {
        Self { inner, provider }
    }
}

#[async_trait]
impl RoundTrip for CredentialInjector {
    async fn send(&self, mut request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        self.provider.apply(&mut request.headers).await?;
        self.inner.send(request).await
    }
}

/// Wraps a leaky-bucket limiter keyed by rate-limit domain (initial rate =
/// max-rate, burst = 10). Waits on the limiter before sending, then retargets
/// it from response rate-limit headers via a [`RateLimitTracker`].
#[derive(Debug)]
pub struct ResponseBasedRateLimiter {
    inner: Arc<dyn RoundTrip>,
    domain: String,
    limiter: RateLimiter<String>,
    tracker: Arc<RateLimitTracker>,
}

/// Burst capacity used for the leaky bucket underlying every rate-limit domain.
const DOMAIN_BURST: u32 = 10;

impl ResponseBasedRateLimiter {
    /// Wraps `inner`, limiting and tracking requests under `domain`.
    ///
    /// `tracker` should already be initialized with `min_rate`/`max_rate`; the
    /// limiter's starting rate is seeded from `tracker.target_rate_limit()`
    /// (the tracker's initial target is `max_rate`).
    #[must_use]
    pub fn new(inner: Arc<dyn RoundTrip>, domain: String, tracker: Arc<RateLimitTracker>) -> Self {
        let initial_rate = tracker.target_rate_limit().max(0.001);
        let quota = rate_to_quota(initial_rate);
        let limiter = RateLimiter::new_with_quota(Some(quota), vec![]);
        Self {
            inner,
            domain,
            limiter,
            tracker,
        }
    }
}

fn rate_to_quota(rate_per_second: f64) -> Quota {
    let burst = std::num::NonZeroU32::new(DOMAIN_BURST).expect("10 is nonzero");
    if rate_per_second <= 0.0 {
        return Quota::per_second(burst);
    }
    let period = std::time::Duration::from_secs_f64(1.0 / rate_per_second);
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[async_trait]
impl RoundTrip for ResponseBasedRateLimiter {
    async fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        loop {
            match self.limiter.check_key(&self.domain) {
                Ok(()) => break,
                Err(crate::ratelimiter::RateLimitError::NoQuota) => break,
                Err(crate::ratelimiter::RateLimitError::Exceeded { retry_after }) => {
                    tokio::select! {
                        () = tokio::time::sleep(retry_after) => {}
                        () = request.cancellation.cancelled() => return Err(HttpClientError::Cancelled),
                    }
                }
            }
        }

        self.tracker.track_request();
        let response = self.inner.send(request).await?;

        if let Some(headers) = parse_rate_limit_headers(&response.headers) {
            self.tracker.update_estimates(Instant::now(), headers);
            self.limiter
                .set_default_quota(rate_to_quota(self.tracker.target_rate_limit()));
        }

        Ok(response)
    }
}

/// Applies the inner chain only when the outgoing request targets the
/// backend (host matches and path is prefixed by the backend path);
/// otherwise passes through to a bare transport unmodified. This keeps
/// credentials and rate limiting scoped to backend traffic when the same
/// client is reused for arbitrary URLs (e.g. cloud storage presigned URLs).
#[derive(Debug)]
pub struct LimitTo {
    backend_url: Url,
    backend_chain: Arc<dyn RoundTrip>,
    passthrough: Arc<dyn RoundTrip>,
}

impl LimitTo {
    /// Scopes `backend_chain` to requests under `backend_url`; anything else
    /// is sent through `passthrough` (typically a [`BaseTransport`]).
    #[must_use]
    pub fn new(backend_url: Url, backend_chain: Arc<dyn RoundTrip>, passthrough: Arc<dyn RoundTrip>) -> Self {
        Self {
            backend_url,
            backend_chain,
            passthrough,
        }
    }

    fn targets_backend(&self, url: &Url) -> bool {
        let host_matches = self.backend_url.host_str() == url.host_str();
        let path_matches = url.path().starts_with(self.backend_url.path());
        host_matches && path_matches
    }
}

#[async_trait]
impl RoundTrip for LimitTo {
    async fn send(&self, request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        if self.targets_backend(&request.url) {
            self.backend_chain.send(request).await
        } else {
            self.passthrough.send(request).await
        }
    }
}
