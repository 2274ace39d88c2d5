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

//! The two-layer HTTP client: [`InnerHttpClient`] issues one bare attempt with
//! no retry; [`HttpClient`] drives a request through the wrapped transport
//! (credentials, rate limiting, retry) built in [`crate::http::wrappers`] and
//! [`crate::http::retry`].

use std::time::Duration;

use bytes::Bytes;
use http::HeaderMap;
use reqwest::Method;

use super::error::HttpClientError;

/// The outcome of one HTTP attempt.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Response status code.
    pub status: reqwest::StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Fully buffered response body.
    pub body: Bytes,
}

impl HttpResponse {
    /// Returns `true` if the status is in `200..300`.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// Decodes the body as UTF-8, replacing invalid sequences.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Optional transport-level configuration: proxying and TLS verification.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    /// Proxy URL applied to all outbound requests, if any.
    pub proxy_url: Option<String>,
    /// `Proxy-Authorization` value forwarded onto the CONNECT tunnel, if any.
    pub proxy_authorization: Option<String>,
    /// Skip TLS certificate verification. Dangerous; intended for local testing only.
    pub insecure_skip_verify: bool,
}

/// A single-attempt HTTP client with no retry and no wrappers.
///
/// This is the innermost layer of the stack: [`crate::http::wrappers::BaseTransport`]
/// holds one of these and every round-trip wrapper ultimately bottoms out here.
#[derive(Debug, Clone)]
pub struct InnerHttpClient {
    client: reqwest::Client,
}

impl InnerHttpClient {
    /// Builds a client from transport configuration.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError::Configuration`] if the proxy URL is invalid
    /// or the underlying TLS backend cannot be constructed.
    pub fn new(config: &TransportConfig) -> Result<Self, HttpClientError> {
        let mut builder = reqwest::Client::builder();

        if let Some(proxy_url) = &config.proxy_url {
            let mut proxy = reqwest::Proxy::all(proxy_url)
                .map_err(|e| HttpClientError::Configuration(format!("invalid proxy URL: {e}")))?;
            if let Some(auth) = &config.proxy_authorization {
                proxy = proxy.custom_http_auth(
                    http::HeaderValue::from_str(auth).map_err(|e| {
                        HttpClientError::Configuration(format!("invalid proxy auth header: {e}"))
                    })?,
                );
            }
            builder = builder.proxy(proxy);
        }

        if config.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let client = builder
            .build()
            .map_err(|e| HttpClientError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client })
    }

    /// Sends one HTTP request with no retry.
    ///
    /// # Errors
    ///
    /// Returns [`HttpClientError::Transport`] if the request cannot be sent or
    /// a response cannot be read, or [`HttpClientError::InvariantViolated`] if
    /// the underlying library reports neither a response nor an error.
    pub async fn send_request(
        &self,
        method: Method,
        url: String,
        headers: Option<HeaderMap>,
        body: Option<Bytes>,
        timeout: Option<Duration>,
    ) -> Result<HttpResponse, HttpClientError> {
        let mut request = self.client.request(method, &url);

        if let Some(headers) = headers {
            request = request.headers(headers);
        }
        if let Some(body) = body {
            request = request.body(body);
        }
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let response = request.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

impl Default for InnerHttpClient {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }
}
