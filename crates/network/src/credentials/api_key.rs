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

//! Static API-key credential provider.

use async_trait::async_trait;
use base64::Engine;
use http::{HeaderMap, HeaderValue, header::AUTHORIZATION};

use super::{CredentialError, CredentialProvider};

/// Attaches `Authorization: Basic base64("api:<key>")` to every request.
#[derive(Debug, Clone)]
pub struct ApiKeyProvider {
    header_value: HeaderValue,
}

impl ApiKeyProvider {
    /// Creates a provider from a non-empty API key.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::MissingApiKey`] if `api_key` is empty.
    pub fn new(api_key: &str) -> Result<Self, CredentialError> {
        if api_key.is_empty() {
            return Err(CredentialError::MissingApiKey);
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(format!("api:{api_key}"));
        let header_value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(CredentialError::InvalidHeaderValue)?;

        Ok(Self { header_value })
    }
}

#[async_trait]
impl CredentialProvider for ApiKeyProvider {
    async fn apply(&self, headers: &mut HeaderMap) -> Result<(), CredentialError> {
        headers.insert(AUTHORIZATION, self.header_value.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_rejects_empty_key() {
        assert!(matches!(
            ApiKeyProvider::new(""),
            Err(CredentialError::MissingApiKey)
        ));
    }

    #[rstest]
    #[tokio::test]
    async fn test_sets_expected_basic_auth_header() {
        // Scenario 1 from the spec: API key `test_api_key`.
        let provider = ApiKeyProvider::new("test_api_key").unwrap();
        let mut headers = HeaderMap::new();
        provider.apply(&mut headers).await.unwrap();

        assert_eq!(
            headers.get(AUTHORIZATION).unwrap(),
            "Basic YXBpOnRlc3RfYXBpX2tleQ=="
        );
    }
}
