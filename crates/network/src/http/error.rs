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

//! The error taxonomy surfaced by the HTTP client stack.
//!
//! Kinds, not type names: each variant names a *failure category* so callers
//! and the retry classifier can pattern-match on behavior (retry? log level?)
//! rather than on a specific backend's error strings.

use std::time::Duration;

use crate::credentials::CredentialError;

/// Maximum number of response-body bytes captured in a [`HttpClientError::TerminalHttp`].
const BODY_TRUNCATE_BYTES: usize = 1024;

/// Errors produced by the HTTP client stack.
#[derive(Debug, thiserror::Error)]
pub enum HttpClientError {
    /// Missing base URL, missing credentials, or an invalid proxy URL.
    /// Surfaced at construction; never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Credentials were present but the backend rejected them (401/403).
    /// Not retried; surfaced verbatim.
    #[error("auth error: HTTP {status}: {body}")]
    Auth {
        /// Response status code.
        status: u16,
        /// Response body (untruncated; auth failures are rare and small).
        body: String,
    },

    /// Treated as a retryable transport event; the rate tracker adjusts and
    /// the client backs off.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Suggested wait before retrying, if known.
        retry_after: Option<Duration>,
    },

    /// Connection reset, i/o-timeout, deadline-exceeded, or HTTP >= 500.
    /// Retried up to `retry_max` with backoff.
    #[error("transient transport error: {0}")]
    TransientTransport(String),

    /// A 4xx other than 401/403/429. Not retried; body captured (truncated).
    #[error("terminal HTTP error: {method} {url} -> {status}: {body}")]
    TerminalHttp {
        /// Request method.
        method: String,
        /// Request URL.
        url: String,
        /// Response status code.
        status: u16,
        /// Response body, truncated to ~1 KiB.
        body: String,
    },

    /// The request's cancellation handle fired. No retries; no error-level logging.
    #[error("request cancelled")]
    Cancelled,

    /// A `PrepareRetry` hook failed; the retry is aborted with this error.
    #[error("prepare-retry hook failed: {0}")]
    PrepareRetryFailed(String),

    /// The HTTP client observed an impossible state (nil error, nil response).
    #[error("invariant violated: {0}")]
    InvariantViolated(String),

    /// A credential provider failed to attach authorization.
    #[error(transparent)]
    Credential(#[from] CredentialError),

    /// The underlying HTTP transport failed before a response was obtained.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A local file could not be created, written, or seeked.
    /// Not retried by the core; the caller may resubmit.
    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),
}

impl HttpClientError {
    /// Builds a [`Self::TerminalHttp`], truncating `body` to ~1 KiB.
    #[must_use]
    pub fn terminal_http(method: &str, url: &str, status: u16, body: &str) -> Self {
        let truncated: String = body.chars().take(BODY_TRUNCATE_BYTES).collect();
        Self::TerminalHttp {
            method: method.to_string(),
            url: url.to_string(),
            status,
            body: truncated,
        }
    }

    /// Whether this error represents a condition the retry classifier should
    /// treat as retryable by default (connection errors, HTTP >= 500).
    #[must_use]
    pub fn is_default_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransientTransport(_) | Self::RateLimited { .. } | Self::Transport(_)
        )
    }

    /// Whether this error must never be retried, regardless of classifier.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_)
                | Self::Auth { .. }
                | Self::TerminalHttp { .. }
                | Self::Cancelled
                | Self::InvariantViolated(_)
        )
    }
}

/// Errors specific to the reference-artifact engines (§4.8).
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The downloaded object's ETag/VersionId did not match the requested digest.
    #[error("integrity error: expected digest '{expected}', got '{actual}'")]
    Integrity {
        /// The digest the caller required.
        expected: String,
        /// The digest actually observed.
        actual: String,
    },

    /// A relative path escaped its base directory.
    #[error("path traversal rejected: '{relative}' escapes base '{base}'")]
    PathTraversal {
        /// The base directory downloads must stay within.
        base: String,
        /// The offending relative path.
        relative: String,
    },

    /// An HTTP-layer failure while transferring a file.
    #[error(transparent)]
    Http(#[from] HttpClientError),

    /// A local file could not be created, written, or seeked.
    #[error("local I/O error: {0}")]
    LocalIo(#[from] std::io::Error),

    /// The task's cancellation handle fired.
    #[error("transfer cancelled")]
    Cancelled,

    /// A cloud-provider SDK call failed.
    #[error("object store error: {0}")]
    ObjectStore(String),
}
