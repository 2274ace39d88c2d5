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

//! The backend-facing HTTP client: assembles the wrapper chain from
//! [`crate::http::wrappers`] and [`crate::http::retry`] on top of
//! [`client::InnerHttpClient`], and exposes the `Send`/`Do` surface callers use.

pub mod client;
pub mod error;
pub mod retry;
pub mod wrappers;

use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use reqwest::Method;
use url::Url;

pub use client::{HttpResponse, InnerHttpClient, TransportConfig};
pub use error::{HttpClientError, TransferError};
pub use retry::{Classifier, PrepareRetry, RetryPolicy, RetryableHttpClient};
pub use wrappers::{
    BaseTransport, CredentialInjector, ExtraHeaders, LimitTo, NetworkPeek, NetworkPeeker,
    OutgoingRequest, ResponseBasedRateLimiter, RoundTrip,
};

use crate::{
    credentials::{CredentialError, CredentialProvider},
    ratelimiter::RateLimitTracker,
};

/// One backend-scoped, path-relative request: the path has no scheme or host,
/// retries replay `body` verbatim, and `extra_headers` are merged onto the
/// client's own extra headers (the request's own values win).
#[derive(Debug, Clone, Default)]
pub struct Request {
    /// Request method.
    pub method: Option<Method>,
    /// Path relative to the backend's base URL (no leading scheme/host).
    pub path: String,
    /// Request body, empty if none. Must be replayable across retries.
    pub body: Bytes,
    /// Headers merged onto the client's own, overriding on conflict.
    pub extra_headers: HeaderMap,
}

/// Appends `path` onto `base`'s own path, rather than resolving it as a
/// relative reference via [`Url::join`] (which would replace `base`'s last
/// path segment instead of extending it, since backend base URLs rarely end
/// in a trailing slash).
fn join_backend_path(base: &Url, path: &str) -> Url {
    let mut url = base.clone();
    let mut full_path = base.path().to_string();
    if !full_path.ends_with('/') {
        full_path.push('/');
    }
    full_path.push_str(path.trim_start_matches('/'));
    url.set_path(&full_path);
    url
}

impl Request {
    /// Creates a GET request for `path`.
    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Some(Method::GET),
            path: path.into(),
            body: Bytes::new(),
            extra_headers: HeaderMap::new(),
        }
    }
}

/// Per-logical-API client options (§3 `ClientOptions`).
#[derive(Clone)]
pub struct ClientOptions {
    /// Retry policy applied by the outermost [`RetryableHttpClient`] layer.
    pub retry_policy: RetryPolicy,
    /// Tag naming the rate-limit domain this client draws from, for diagnostics
    /// and for keying the [`ResponseBasedRateLimiter`]'s leaky bucket.
    pub rate_limit_domain: String,
    /// Headers merged onto every outgoing request.
    pub extra_headers: HeaderMap,
    /// Optional observer invoked after every successful round trip.
    pub peeker: Option<Arc<dyn NetworkPeek>>,
}

impl std::fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientOptions")
            .field("retry_policy", &self.retry_policy)
            .field("rate_limit_domain", &self.rate_limit_domain)
            .field("extra_headers", &self.extra_headers)
            .field("peeker", &self.peeker.as_ref().map(|_| "<dyn NetworkPeek>"))
            .finish()
    }
}

impl ClientOptions {
    /// Options for a named rate-limit domain, with default retry policy, no
    /// extra headers, and no peeker.
    #[must_use]
    pub fn new(rate_limit_domain: impl Into<String>) -> Self {
        Self {
            retry_policy: RetryPolicy::defaults(),
            rate_limit_domain: rate_limit_domain.into(),
            extra_headers: HeaderMap::new(),
            peeker: None,
        }
    }
}

/// Client-wide backend configuration (§3 `BackendConfig`), immutable after construction.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL all backend requests are relative to.
    pub base_url: Url,
    /// Static API key; ignored if `identity_token_path` is set.
    pub api_key: Option<String>,
    /// Path to a pre-issued JWT identity token; presence selects OAuth2.
    pub identity_token_path: Option<std::path::PathBuf>,
    /// Path to the on-disk OAuth2 credentials cache.
    pub credentials_cache_path: std::path::PathBuf,
    /// Headers merged onto every outgoing request, regardless of client.
    pub extra_headers: HeaderMap,
    /// Transport-level settings (proxying, TLS).
    pub transport: TransportConfig,
}

impl BackendConfig {
    /// Validates and wraps a base URL with default transport settings and no credentials.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError::Configuration`] if `base_url` is empty or
    /// its scheme is not `http`/`https`.
    pub fn new(base_url: &str) -> Result<Self, HttpClientError> {
        let url = tracklab_core::correctness::check_http_url(base_url, "base_url")
            .map_err(|e| HttpClientError::Configuration(e.to_string()))?;
        Ok(Self {
            base_url: url,
            api_key: None,
            identity_token_path: None,
            credentials_cache_path: std::path::PathBuf::from("credentials.json"),
            extra_headers: HeaderMap::new(),
            transport: TransportConfig::default(),
        })
    }

    /// Builds the credential provider selected by §4.3 (OAuth2 if an identity
    /// token path is configured, otherwise a static API key).
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError::Configuration`] if neither credential is configured.
    pub fn build_credential_provider(&self) -> Result<Arc<dyn CredentialProvider>, HttpClientError> {
        crate::credentials::build_provider(
            &self.base_url,
            self.api_key.as_deref(),
            self.identity_token_path.clone(),
            self.credentials_cache_path.clone(),
        )
        .map_err(|e: CredentialError| HttpClientError::Configuration(e.to_string()))
    }
}

/// One logical HTTP client: the full wrapper chain for one rate-limit domain,
/// bound to one backend.
///
/// Construction wires, from innermost to outermost: [`BaseTransport`] →
/// [`ExtraHeaders`] (client-wide) → [`CredentialInjector`] →
/// [`ResponseBasedRateLimiter`] → [`NetworkPeeker`] → [`LimitTo`] (scoping the
/// preceding layers to backend traffic) → [`RetryableHttpClient`] (outermost).
#[derive(Debug)]
pub struct Client {
    backend_url: Url,
    retryable: RetryableHttpClient,
}

impl Client {
    /// Assembles a client for one backend and rate-limit domain.
    #[must_use]
    pub fn new(
        config: &BackendConfig,
        credentials: Arc<dyn CredentialProvider>,
        tracker: Arc<RateLimitTracker>,
        options: ClientOptions,
    ) -> Self {
        let inner = InnerHttpClient::new(&config.transport).unwrap_or_default();
        let passthrough: Arc<dyn RoundTrip> = Arc::new(BaseTransport::new(inner.clone()));

        let mut headers = config.extra_headers.clone();
        for (name, value) in &options.extra_headers {
            headers.insert(name.clone(), value.clone());
        }
        headers.insert(
            http::header::USER_AGENT,
            http::HeaderValue::from_static(tracklab_core::consts::USER_AGENT),
        );

        let base: Arc<dyn RoundTrip> = Arc::new(BaseTransport::new(inner));
        let with_headers: Arc<dyn RoundTrip> = Arc::new(ExtraHeaders::new(base, headers));
        let with_credentials: Arc<dyn RoundTrip> =
            Arc::new(CredentialInjector::new(with_headers, credentials));
        let with_rate_limit: Arc<dyn RoundTrip> = Arc::new(ResponseBasedRateLimiter::new(
            with_credentials,
            options.rate_limit_domain,
            tracker,
        ));
        let with_peeker: Arc<dyn RoundTrip> =
            Arc::new(NetworkPeeker::new(with_rate_limit, options.peeker));
        let scoped: Arc<dyn RoundTrip> =
            Arc::new(LimitTo::new(config.base_url.clone(), with_peeker, passthrough));

        let retryable = RetryableHttpClient::new(scoped, options.retry_policy);

        Self {
            backend_url: config.base_url.clone(),
            retryable,
        }
    }

    /// Sends a backend-relative [`Request`], resolving it against the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] per the wrapper chain and retry policy.
    pub async fn send(&self, request: Request) -> Result<HttpResponse, HttpClientError> {
        let url = join_backend_path(&self.backend_url, &request.path);

        let mut outgoing = OutgoingRequest::new(request.method.unwrap_or(Method::GET), url);
        outgoing.headers = request.extra_headers;
        if !request.body.is_empty() {
            outgoing.body = Some(request.body);
        }

        self.do_send(outgoing).await
    }

    /// Sends an arbitrary HTTP request. [`LimitTo`] decides whether backend-only
    /// layers (credentials, rate limiting) apply, based on the request's URL.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError`] per the wrapper chain and retry policy.
    pub async fn do_send(&self, request: OutgoingRequest) -> Result<HttpResponse, HttpClientError> {
        self.retryable.send(request).await
    }
}

#[cfg(test)]
mod tests {
    use std::{
        net::SocketAddr,
        sync::{Arc, Mutex},
    };

    use axum::{Router, extract::State, http::HeaderMap as AxumHeaderMap, routing::get};
    use rstest::rstest;

    use super::*;

    #[derive(Default)]
    struct Observed {
        headers: Option<AxumHeaderMap>,
    }

    async fn spawn_echo_server() -> (SocketAddr, Arc<Mutex<Observed>>) {
        let observed = Arc::new(Mutex::new(Observed::default()));
        let state = observed.clone();

        async fn handler(State(state): State<Arc<Mutex<Observed>>>, headers: AxumHeaderMap) -> &'static str {
            state.lock().unwrap().headers = Some(headers);
            "ok"
        }

        let app = Router::new()
            .route("/base/some/test/path", get(handler))
            .route("/notwandb/xyz", get(handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (addr, observed)
    }

    fn test_client(addr: SocketAddr, api_key: &str) -> Client {
        let base_url = Url::parse(&format!("http://{addr}/base")).unwrap();
        let config = BackendConfig {
            api_key: Some(api_key.to_string()),
            ..BackendConfig::new(base_url.as_str()).unwrap()
        };
        let credentials = config.build_credential_provider().unwrap();
        let tracker = Arc::new(RateLimitTracker::new(0.1, 1000.0, 0.5, 2).unwrap());

        let mut options = ClientOptions::new("test-domain");
        options.extra_headers.insert("Header1", "one".parse().unwrap());
        options.extra_headers.insert("Header2", "two".parse().unwrap());
        options.extra_headers.insert("ClientHeader", "xyz".parse().unwrap());

        Client::new(&config, credentials, tracker, options)
    }

    #[rstest]
    #[tokio::test]
    async fn test_scenario_1_api_key_path() {
        let (addr, observed) = spawn_echo_server().await;
        let client = test_client(addr, "test_api_key");

        let response = client.send(Request::get("some/test/path")).await.unwrap();
        assert!(response.is_success());

        let headers = observed.lock().unwrap().headers.clone().unwrap();
        assert_eq!(headers.get("Header1").unwrap(), "one");
        assert_eq!(headers.get("Header2").unwrap(), "two");
        assert_eq!(headers.get("ClientHeader").unwrap(), "xyz");
        assert_eq!(headers.get(http::header::USER_AGENT).unwrap(), "tracklab-core");
        assert_eq!(
            headers.get(http::header::AUTHORIZATION).unwrap(),
            "Basic YXBpOnRlc3RfYXBpX2tleQ=="
        );
    }

    #[rstest]
    #[tokio::test]
    async fn test_scenario_2_non_backend_url_has_no_auth() {
        let (addr, observed) = spawn_echo_server().await;
        let client = test_client(addr, "test_api_key");

        let other_url = Url::parse(&format!("http://{addr}/notwandb/xyz")).unwrap();
        let request = OutgoingRequest::new(Method::GET, other_url);
        let response = client.do_send(request).await.unwrap();
        assert!(response.is_success());

        let headers = observed.lock().unwrap().headers.clone().unwrap();
        assert!(headers.get(http::header::AUTHORIZATION).is_none());
    }
}
