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

//! Google Cloud Storage [`ObjectStore`] backend.
//!
//! GCS versions objects by an integer "generation" rather than a string; it
//! is carried through as [`VersionId::Int`]. Folder-marker objects (a listed
//! key ending in `/` with zero size, which the GCS console creates when a
//! user clicks "New Folder") are skipped during prefix listing since they
//! have no content to mirror locally.

use async_trait::async_trait;
use bytes::Bytes;
use google_cloud_storage::{
    client::{Client, ClientConfig},
    http::objects::{
        download::Range,
        get::GetObjectRequest,
        list::ListObjectsRequest,
    },
};

use super::{ObjectAttributes, ObjectStore, ObjectSummary};
use crate::{http::TransferError, transfer::task::VersionId};

/// Google Cloud Storage object store, authenticating via Application Default
/// Credentials (`GOOGLE_APPLICATION_CREDENTIALS` or the ambient metadata server).
#[derive(Debug, Clone)]
pub struct GcsStore {
    client: Client,
}

impl GcsStore {
    /// Builds a store using Application Default Credentials.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ObjectStore`] if credentials could not be resolved.
    pub async fn new() -> Result<Self, TransferError> {
        let config = ClientConfig::default()
            .with_auth()
            .await
            .map_err(|e| TransferError::ObjectStore(format!("failed to resolve GCS credentials: {e}")))?;
        Ok(Self { client: Client::new(config) })
    }

    fn version_id_of(generation: Option<i64>) -> VersionId {
        generation.map_or(VersionId::None, VersionId::Int)
    }
}

fn generation_filter(version: Option<&VersionId>) -> Option<i64> {
    match version {
        Some(VersionId::Int(n)) => Some(*n),
        Some(VersionId::String(s)) => s.parse().ok(),
        Some(VersionId::None) | None => None,
    }
}

#[async_trait]
impl ObjectStore for GcsStore {
    fn scheme(&self) -> &'static str {
        "gs"
    }

    async fn list_with_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>, TransferError> {
        let mut summaries = Vec::new();
        let mut page_token = None;

        loop {
            let request = ListObjectsRequest {
                bucket: bucket.to_string(),
                prefix: Some(prefix.to_string()),
                page_token: page_token.take(),
                ..Default::default()
            };
            let response = self
                .client
                .list_objects(&request)
                .await
                .map_err(|e| TransferError::ObjectStore(e.to_string()))?;

            for object in response.items.unwrap_or_default() {
                if object.name.ends_with('/') && object.size == 0 {
                    continue;
                }
                summaries.push(ObjectSummary { key: object.name, size: object.size.max(0) as u64 });
            }

            page_token = response.next_page_token;
            if page_token.is_none() {
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
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            generation: generation_filter(version),
            ..Default::default()
        };
        let object = self
            .client
            .get_object(&request)
            .await
            .map_err(|e| TransferError::ObjectStore(format!("object not found: {e}")))?;

        Ok(ObjectAttributes {
            etag: object.etag,
            version_id: Self::version_id_of(Some(object.generation)),
            size: object.size.max(0) as u64,
        })
    }

    async fn get(&self, bucket: &str, key: &str, version: Option<&VersionId>) -> Result<Bytes, TransferError> {
        let request = GetObjectRequest {
            bucket: bucket.to_string(),
            object: key.to_string(),
            generation: generation_filter(version),
            ..Default::default()
        };
        let bytes = self
            .client
            .download_object(&request, &Range::default())
            .await
            .map_err(|e| TransferError::ObjectStore(e.to_string()))?;
        Ok(Bytes::from(bytes))
    }

    async fn list_versions(&self, bucket: &str, key: &str) -> Result<Vec<VersionId>, TransferError> {
        let request = ListObjectsRequest {
            bucket: bucket.to_string(),
            prefix: Some(key.to_string()),
            versions: Some(true),
            ..Default::default()
        };
        let response = self
            .client
            .list_objects(&request)
            .await
            .map_err(|e| TransferError::ObjectStore(e.to_string()))?;

        let versions: Vec<VersionId> = response
            .items
            .unwrap_or_default()
            .into_iter()
            .filter(|o| o.name == key)
            .map(|o| VersionId::Int(o.generation))
            .collect();

        if versions.is_empty() { Ok(vec![VersionId::None]) } else { Ok(versions) }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_generation_filter_parses_string_version() {
        assert_eq!(generation_filter(Some(&VersionId::String("17".to_string()))), Some(17));
        assert_eq!(generation_filter(Some(&VersionId::Int(9))), Some(9));
        assert_eq!(generation_filter(Some(&VersionId::None)), None);
    }
}
