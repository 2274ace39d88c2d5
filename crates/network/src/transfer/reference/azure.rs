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

//! Azure Blob Storage [`ObjectStore`] backend.
//!
//! Azure's "container" plays the role of S3's "bucket"; blob versioning is
//! opt-in per storage account and surfaced here as a string `version_id`,
//! matching [`VersionId::String`].

use async_trait::async_trait;
use azure_storage::StorageCredentials;
use azure_storage_blobs::prelude::{BlobServiceClient, ClientBuilder};
use bytes::Bytes;
use futures_util::StreamExt;

use super::{ObjectAttributes, ObjectStore, ObjectSummary};
use crate::{http::TransferError, transfer::task::VersionId};

/// Azure Blob Storage object store, authenticating via a storage account key.
#[derive(Debug, Clone)]
pub struct AzureStore {
    service: BlobServiceClient,
}

impl AzureStore {
    /// Builds a store for `account`, authenticating with `access_key`.
    #[must_use]
    pub fn new(account: impl Into<String>, access_key: impl Into<String>) -> Self {
        let account = account.into();
        let credentials = StorageCredentials::access_key(account.clone(), access_key.into());
        let service = ClientBuilder::new(account, credentials).blob_service_client();
        Self { service }
    }

    fn container(&self, container: &str) -> azure_storage_blobs::prelude::ContainerClient {
        self.service.container_client(container)
    }
}

#[async_trait]
impl ObjectStore for AzureStore {
    fn scheme(&self) -> &'static str {
        "azure"
    }

    async fn list_with_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>, TransferError> {
        let container = self.container(bucket);
        let mut stream = container.list_blobs().prefix(prefix.to_string()).into_stream();
        let mut summaries = Vec::new();

        while let Some(page) = stream.next().await {
            let page = page.map_err(|e| TransferError::ObjectStore(e.to_string()))?;
            for blob in page.blobs.blobs() {
                summaries.push(ObjectSummary { key: blob.name.clone(), size: blob.properties.content_length });
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
        let mut blob_client = self.container(bucket).blob_client(key);
        if let Some(VersionId::String(version_id)) = version {
            blob_client = blob_client.blob_version_id(version_id.clone());
        }
        let properties = blob_client
            .get_properties()
            .await
            .map_err(|e| TransferError::ObjectStore(format!("blob not found: {e}")))?;

        Ok(ObjectAttributes {
            etag: properties.blob.properties.etag.to_string(),
            version_id: properties.blob.version_id.map_or(VersionId::None, VersionId::String),
            size: properties.blob.properties.content_length,
        })
    }

    async fn get(&self, bucket: &str, key: &str, version: Option<&VersionId>) -> Result<Bytes, TransferError> {
        let mut blob_client = self.container(bucket).blob_client(key);
        if let Some(VersionId::String(version_id)) = version {
            blob_client = blob_client.blob_version_id(version_id.clone());
        }
        let bytes = blob_client
            .get_content()
            .await
            .map_err(|e| TransferError::ObjectStore(format!("failed to read blob: {e}")))?;
        Ok(Bytes::from(bytes))
    }

    async fn list_versions(&self, bucket: &str, key: &str) -> Result<Vec<VersionId>, TransferError> {
        let container = self.container(bucket);
        let mut stream = container.list_blobs().prefix(key.to_string()).include_versions(true).into_stream();
        let mut versions = Vec::new();

        while let Some(page) = stream.next().await {
            let page = page.map_err(|e| TransferError::ObjectStore(e.to_string()))?;
            for blob in page.blobs.blobs() {
                if blob.name == key {
                    if let Some(version_id) = &blob.version_id {
                        versions.push(VersionId::String(version_id.clone()));
                    }
                }
            }
        }

        if versions.is_empty() { Ok(vec![VersionId::None]) } else { Ok(versions) }
    }
}
