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

//! OAuth2 JWT-bearer credential provider with an on-disk, refresh-on-expiry
//! token cache shared by all requests to one base URL.
//!
//! The identity token is a pre-issued JWT read verbatim from disk; this
//! provider never mints or signs a JWT itself, only exchanges it for a bearer
//! access token at the backend's token endpoint.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracklab_core::time::now_utc;
use url::Url;

use super::{CredentialError, CredentialProvider};

/// A refresh is started when less than this much time remains before expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(5 * 60);

const TOKEN_ENDPOINT_PATH: &str = "oidc/token";
const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const CREDENTIALS_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A cached access token for one base URL.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenInfo {
    /// The bearer access token.
    pub access_token: String,
    /// Absolute expiry time.
    pub expires_at: DateTime<Utc>,
}

impl TokenInfo {
    /// Returns `true` if fewer than 5 minutes remain before expiry.
    #[must_use]
    pub fn is_expiring(&self) -> bool {
        tracklab_core::time::is_expired(self.expires_at, EXPIRY_SKEW)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
struct TokenInfoRaw {
    access_token: String,
    expires_at: String,
}

impl TokenInfoRaw {
    fn from_info(info: &TokenInfo) -> Self {
        Self {
            access_token: info.access_token.clone(),
            expires_at: info.expires_at.format(CREDENTIALS_TIME_FORMAT).to_string(),
        }
    }

    fn into_info(self) -> Result<TokenInfo, CredentialError> {
        let naive = chrono::NaiveDateTime::parse_from_str(&self.expires_at, CREDENTIALS_TIME_FORMAT)
            .map_err(|_| CredentialError::InvalidTimestamp(self.expires_at.clone()))?;
        Ok(TokenInfo {
            access_token: self.access_token,
            expires_at: naive.and_utc(),
        })
    }
}

/// The on-disk credentials cache: a JSON mapping of base URL to [`TokenInfo`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CredentialsFile {
    credentials: HashMap<String, TokenInfoRaw>,
}

impl CredentialsFile {
    fn load(path: &Path) -> Result<Self, CredentialError> {
        match std::fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(CredentialError::CacheIo(e)),
        }
    }

    fn get(&self, base_url: &str) -> Option<Result<TokenInfo, CredentialError>> {
        self.credentials.get(base_url).cloned().map(TokenInfoRaw::into_info)
    }

    fn set(&mut self, base_url: &str, info: &TokenInfo) {
        self.credentials
            .insert(base_url.to_string(), TokenInfoRaw::from_info(info));
    }

    fn save(&self, path: &Path) -> Result<(), CredentialError> {
        let body = serde_json::to_vec_pretty(self)?;
        let tmp_path = path.with_extension("tmp");
        std::fs::write(&tmp_path, &body)?;
        set_owner_read_write_only(&tmp_path)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[cfg(unix)]
fn set_owner_read_write_only(path: &Path) -> Result<(), CredentialError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_owner_read_write_only(_path: &Path) -> Result<(), CredentialError> {
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TokenEndpointResponse {
    access_token: String,
    expires_in: i64,
}

/// OAuth2 JWT-bearer provider: exchanges a pre-issued identity-token JWT for a
/// bearer access token, caching the result on disk keyed by base URL.
#[derive(Debug)]
pub struct OAuth2Provider {
    base_url: Url,
    identity_token_path: PathBuf,
    credentials_cache_path: PathBuf,
    http: reqwest::Client,
    refresh_lock: AsyncMutex<()>,
}

impl OAuth2Provider {
    /// Creates a provider for `base_url`, reading the identity token from
    /// `identity_token_path` and caching refreshed tokens in
    /// `credentials_cache_path`.
    #[must_use]
    pub fn new(base_url: Url, identity_token_path: PathBuf, credentials_cache_path: PathBuf) -> Self {
        Self {
            base_url,
            identity_token_path,
            credentials_cache_path,
            http: reqwest::Client::new(),
            refresh_lock: AsyncMutex::new(()),
        }
    }

    fn base_url_key(&self) -> String {
        self.base_url.to_string()
    }

    fn cached_token(&self) -> Result<Option<TokenInfo>, CredentialError> {
        let file = CredentialsFile::load(&self.credentials_cache_path)?;
        file.get(&self.base_url_key()).transpose()
    }

    async fn get_valid_token(&self) -> Result<TokenInfo, CredentialError> {
        if let Some(token) = self.cached_token()?
            && !token.is_expiring()
        {
            return Ok(token);
        }

        // Serialize refreshes so concurrent callers make exactly one token-endpoint call.
        let _guard = self.refresh_lock.lock().await;

        if let Some(token) = self.cached_token()?
            && !token.is_expiring()
        {
            return Ok(token);
        }

        self.refresh().await
    }

    async fn refresh(&self) -> Result<TokenInfo, CredentialError> {
        let assertion = std::fs::read_to_string(&self.identity_token_path)
            .map_err(CredentialError::IdentityTokenUnreadable)?;
        let assertion = assertion.trim();

        let endpoint = self
            .base_url
            .join(TOKEN_ENDPOINT_PATH)
            .unwrap_or_else(|_| self.base_url.clone());

        let response = self
            .http
            .post(endpoint)
            .header(http::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(1024).collect();
            return Err(CredentialError::TokenRefreshFailed {
                status: status.as_u16(),
                body: truncated,
            });
        }

        let parsed: TokenEndpointResponse = response.json().await?;
        let token = TokenInfo {
            access_token: parsed.access_token,
            expires_at: now_utc() + chrono::Duration::seconds(parsed.expires_in),
        };

        let mut file = CredentialsFile::load(&self.credentials_cache_path)?;
        file.set(&self.base_url_key(), &token);
        file.save(&self.credentials_cache_path)?;

        Ok(token)
    }
}

#[async_trait]
impl CredentialProvider for OAuth2Provider {
    async fn apply(&self, headers: &mut HeaderMap) -> Result<(), CredentialError> {
        let token = self.get_valid_token().await?;
        let value = HeaderValue::from_str(&format!("Bearer {}", token.access_token))
            .map_err(CredentialError::InvalidHeaderValue)?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;
    use tempfile::tempdir;

    use super::*;

    #[rstest]
    fn test_credentials_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let expires_at = chrono::NaiveDate::from_ymd_opt(2026, 1, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
            .and_utc();
        let token = TokenInfo {
            access_token: "abc123".to_string(),
            expires_at,
        };

        let mut file = CredentialsFile::default();
        file.set("https://api.example.com", &token);
        file.save(&path).unwrap();

        let reloaded = CredentialsFile::load(&path).unwrap();
        let round_tripped = reloaded.get("https://api.example.com").unwrap().unwrap();
        assert_eq!(round_tripped, token);
    }

    #[rstest]
    fn test_preserves_other_base_urls_on_refresh() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("credentials.json");

        let token_a = TokenInfo {
            access_token: "a".to_string(),
            expires_at: now_utc() + chrono::Duration::hours(1),
        };
        let token_b = TokenInfo {
            access_token: "b".to_string(),
            expires_at: now_utc() + chrono::Duration::hours(1),
        };

        let mut file = CredentialsFile::default();
        file.set("https://a.example.com", &token_a);
        file.save(&path).unwrap();

        let mut file = CredentialsFile::load(&path).unwrap();
        file.set("https://b.example.com", &token_b);
        file.save(&path).unwrap();

        let reloaded = CredentialsFile::load(&path).unwrap();
        assert!(reloaded.get("https://a.example.com").is_some());
        assert!(reloaded.get("https://b.example.com").is_some());
    }

    #[rstest]
    fn test_missing_cache_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("does-not-exist.json");
        let file = CredentialsFile::load(&path).unwrap();
        assert!(file.get("https://api.example.com").is_none());
    }

    #[rstest]
    fn test_is_expiring_within_five_minutes() {
        let token = TokenInfo {
            access_token: "x".to_string(),
            expires_at: now_utc() + chrono::Duration::minutes(3),
        };
        assert!(token.is_expiring());

        let token = TokenInfo {
            access_token: "x".to_string(),
            expires_at: now_utc() + chrono::Duration::minutes(30),
        };
        assert!(!token.is_expiring());
    }

    async fn spawn_token_endpoint() -> (Url, std::sync::Arc<std::sync::atomic::AtomicU32>) {
        use axum::{Json, extract::State, routing::post};

        let calls = std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0));
        let state = calls.clone();

        async fn handler(
            State(calls): State<std::sync::Arc<std::sync::atomic::AtomicU32>>,
        ) -> Json<serde_json::Value> {
            calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Json(serde_json::json!({ "access_token": "fresh-token", "expires_in": 3600 }))
        }

        let app = axum::Router::new()
            .route(&format!("/{TOKEN_ENDPOINT_PATH}"), post(handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        (Url::parse(&format!("http://{addr}")).unwrap(), calls)
    }

    #[rstest]
    #[tokio::test]
    async fn test_concurrent_refresh_calls_token_endpoint_once() {
        // Scenario 7 from the spec: a single token-endpoint call serializes
        // concurrent refreshers, all of whom see the same resulting token.
        let (base_url, calls) = spawn_token_endpoint().await;

        let dir = tempdir().unwrap();
        let identity_token_path = dir.path().join("identity.jwt");
        std::fs::write(&identity_token_path, "dummy-jwt-assertion").unwrap();
        let cache_path = dir.path().join("credentials.json");

        let provider =
            std::sync::Arc::new(OAuth2Provider::new(base_url, identity_token_path, cache_path));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let provider = provider.clone();
            handles.push(tokio::spawn(async move { provider.get_valid_token().await.unwrap() }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap());
        }

        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        for token in &tokens[1..] {
            assert_eq!(token, &tokens[0]);
        }
    }

    #[rstest]
    #[tokio::test]
    async fn test_refresh_rejects_non_2xx_token_response() {
        use axum::routing::post;

        async fn handler() -> axum::http::StatusCode {
            axum::http::StatusCode::UNAUTHORIZED
        }

        let app = axum::Router::new().route(&format!("/{TOKEN_ENDPOINT_PATH}"), post(handler));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let dir = tempdir().unwrap();
        let identity_token_path = dir.path().join("identity.jwt");
        std::fs::write(&identity_token_path, "dummy-jwt-assertion").unwrap();
        let cache_path = dir.path().join("credentials.json");

        let provider = OAuth2Provider::new(
            Url::parse(&format!("http://{addr}")).unwrap(),
            identity_token_path,
            cache_path,
        );

        let err = provider.get_valid_token().await.unwrap_err();
        assert!(matches!(err, CredentialError::TokenRefreshFailed { status: 401, .. }));
    }
}
