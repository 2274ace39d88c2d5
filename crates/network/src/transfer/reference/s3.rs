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

//! S3 [`ObjectStore`] backend, also serving any S3-compatible endpoint
//! (MinIO, Backblaze B2, Tigris) via [`S3Store::with_endpoint`].

use async_trait::async_trait;
use aws_sdk_s3::{
    Client,
    config::{BehaviorVersion, retry::RetryConfig},
    error::SdkError,
    operation::{get_object::GetObjectError, head_object::HeadObjectError, list_objects_v2::ListObjectsV2Error},
    types::ObjectVersion,
};
use bytes::Bytes;

use super::{ObjectAttributes, ObjectStore, ObjectSummary};
use crate::{http::TransferError, transfer::task::VersionId};

/// Maximum attempts (1 initial + 3 retries) the AWS SDK's own retry layer
/// makes before surfacing a [`SdkError`] to this store.
const MAX_SDK_ATTEMPTS: u32 = 4;

/// S3-compatible object store.
#[derive(Debug, Clone)]
pub struct S3Store {
    client: Client,
}

impl S3Store {
    /// Builds a store against real AWS S3, resolving credentials and region
    /// from the ambient environment via `aws-config`.
    pub async fn new() -> Self {
        let shared_config = aws_config::defaults(BehaviorVersion::latest()).load().await;
        let config = aws_sdk_s3::config::Builder::from(&shared_config)
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_SDK_ATTEMPTS))
            .build();
        Self { client: Client::from_conf(config) }
    }

    /// Builds a store against an S3-compatible endpoint (MinIO, Backblaze B2,
    /// Tigris) using explicit static credentials and path-style addressing.
    pub async fn with_endpoint(
        endpoint: impl Into<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        let credentials = aws_sdk_s3::config::Credentials::new(
            access_key_id.into(),
            secret_access_key.into(),
            None,
            None,
            "tracklab-config",
        );
        let config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(aws_sdk_s3::config::Region::new(region.into()))
            .retry_config(RetryConfig::standard().with_max_attempts(MAX_SDK_ATTEMPTS))
            .endpoint_url(endpoint)
            .force_path_style(true)
            .build();
        Self { client: Client::from_conf(config) }
    }

    fn map_head_error(err: SdkError<HeadObjectError>) -> TransferError {
        match &err {
            SdkError::ServiceError(s) if matches!(s.err(), HeadObjectError::NotFound(_)) => {
                TransferError::ObjectStore(format!("object not found: {err}"))
            }
            _ => TransferError::ObjectStore(err.to_string()),
        }
    }

    fn map_get_error(err: SdkError<GetObjectError>) -> TransferError {
        match &err {
            SdkError::ServiceError(s) if matches!(s.err(), GetObjectError::NoSuchKey(_)) => {
                TransferError::ObjectStore(format!("object not found: {err}"))
            }
            _ => TransferError::ObjectStore(err.to_string()),
        }
    }

    fn map_list_error(err: SdkError<ListObjectsV2Error>) -> TransferError {
        TransferError::ObjectStore(err.to_string())
    }
}

fn version_id_string(version: Option<&VersionId>) -> Option<String> {
    match version {
        Some(VersionId::String(s)) => Some(s.clone()),
        Some(VersionId::Int(n)) => Some(n.to_string()),
        Some(VersionId::None) | None => None,
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    fn scheme(&self) -> &'static str {
        "s3"
    }

    async fn list_with_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>, TransferError> {
        let mut summaries = Vec::new();
        let mut continuation_token = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(bucket).prefix(prefix);
            if let Some(token) = continuation_token.take() {
                request = request.continuation_token(token);
            }
            let response = request.send().await.map_err(Self::map_list_error)?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    summaries.push(ObjectSummary {
                        key: key.to_string(),
                        size: object.size().unwrap_or(0).max(0) as u64,
                    });
                }
            }

            if response.is_truncated() == Some(true) {
                continuation_token = response.next_continuation_token().map(str::to_string);
            } else {
                break;
            }
        }

        Ok(summaries)
    }

    async fn head(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&VersionId>,
    ) -> Result<ObjectAttributes, TransferError> {
        let mut request = self.client.head_object().bucket(bucket).key(key);
        if let Some(version_id) = version_id_string(version) {
            request = request.version_id(version_id);
        }
        let response = request.send().await.map_err(Self::map_head_error)?;

        Ok(ObjectAttributes {
            etag: response.e_tag().unwrap_or_default().to_string(),
            version_id: response.version_id().map_or(VersionId::None, |v| VersionId::String(v.to_string())),
            size: response.content_length().unwrap_or(0).max(0) as u64,
        })
    }

    async fn get(&self, bucket: &str, key: &str, version: Option<&VersionId>) -> Result<Bytes, TransferError> {
        let mut request = self.client.get_object().bucket(bucket).key(key);
        if let Some(version_id) = version_id_string(version) {
            request = request.version_id(version_id);
        }
        let response = request.send().await.map_err(Self::map_get_error)?;
        let aggregated = response
            .body
            .collect()
            .await
            .map_err(|e| TransferError::ObjectStore(format!("failed to read S3 response body: {e}")))?;
        Ok(aggregated.into_bytes())
    }

    async fn list_versions(&self, bucket: &str, key: &str) -> Result<Vec<VersionId>, TransferError> {
        let response = self
            .client
            .list_object_versions()
            .bucket(bucket)
            .prefix(key)
            .send()
            .await
            .map_err(|e| TransferError::ObjectStore(e.to_string()))?;

        let versions: Vec<VersionId> = response
            .versions()
            .iter()
            .filter(|v: &&ObjectVersion| v.key() == Some(key))
            .filter_map(ObjectVersion::version_id)
            .map(|v| VersionId::String(v.to_string()))
            .collect();

        if versions.is_empty() { Ok(vec![VersionId::None]) } else { Ok(versions) }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_version_id_string_formats_int_as_decimal() {
        assert_eq!(version_id_string(Some(&VersionId::Int(42))), Some("42".to_string()));
        assert_eq!(version_id_string(Some(&VersionId::None)), None);
        assert_eq!(version_id_string(None), None);
    }
}
