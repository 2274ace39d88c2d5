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

//! Credential providers that attach `Authorization` to outbound backend requests.

pub mod api_key;
pub mod oauth2;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use http::HeaderMap;
use url::Url;

pub use api_key::ApiKeyProvider;
pub use oauth2::{CredentialsFile, OAuth2Provider, TokenInfo};

/// Error surfaced by a [`CredentialProvider`] when it cannot attach credentials.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// Configured API key was empty.
    #[error("missing credentials: API key must not be empty")]
    MissingApiKey,

    /// The identity-token file could not be read.
    #[error("missing credentials: could not read identity token file: {0}")]
    IdentityTokenUnreadable(std::io::Error),

    /// The on-disk credentials cache could not be read or written.
    #[error("local I/O error on credentials cache: {0}")]
    CacheIo(#[from] std::io::Error),

    /// The credentials cache file contained invalid JSON.
    #[error("corrupt credentials cache: {0}")]
    CacheCorrupt(#[from] serde_json::Error),

    /// A cached token's `expires_at` timestamp did not match the expected format.
    #[error("corrupt credentials cache: invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    /// The OAuth2 token endpoint rejected the refresh request.
    #[error("token refresh failed: HTTP {status}: {body}")]
    TokenRefreshFailed {
        /// Response status from the token endpoint.
        status: u16,
        /// Truncated response body.
        body: String,
    },

    /// The token endpoint could not be reached at all.
    #[error("token refresh failed: {0}")]
    TokenEndpointUnreachable(#[from] reqwest::Error),

    /// A header value could not be constructed (should not happen for well-formed tokens).
    #[error("invalid header value: {0}")]
    InvalidHeaderValue(#[from] http::header::InvalidHeaderValue),
}

/// Attaches authorization to an outbound request by mutating its header map.
///
/// Implementers must be idempotent and side-effect free beyond internal token
/// bookkeeping: calling `apply` twice on independent requests must not change
/// behavior other than possibly triggering a token refresh.
#[async_trait]
pub trait CredentialProvider: Send + Sync + std::fmt::Debug {
    /// Sets the `Authorization` header (and any other auth headers) on `headers`.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] if credentials are missing or a refresh fails.
    async fn apply(&self, headers: &mut HeaderMap) -> Result<(), CredentialError>;
}

/// Selects a provider per §4.3: an identity-token file means OAuth2 JWT-bearer;
/// otherwise a static API key.
///
/// # Errors
///
/// Returns [`CredentialError::MissingApiKey`] if neither an identity-token path
/// nor a non-empty API key is configured.
pub fn build_provider(
    base_url: &Url,
    api_key: Option<&str>,
    identity_token_path: Option<PathBuf>,
    credentials_cache_path: PathBuf,
) -> Result<Arc<dyn CredentialProvider>, CredentialError> {
    if let Some(identity_token_path) = identity_token_path {
        return Ok(Arc::new(OAuth2Provider::new(
            base_url.clone(),
            identity_token_path,
            credentials_cache_path,
        )));
    }

    let api_key = api_key.ok_or(CredentialError::MissingApiKey)?;
    Ok(Arc::new(ApiKeyProvider::new(api_key)?))
}
