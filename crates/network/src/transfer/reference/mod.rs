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

//! Reference-artifact (cloud object store) download engines (§4.8).
//!
//! [`ObjectStore`] abstracts S3, GCS, and Azure Blob behind one surface; a
//! [`ObjectStoreRegistry`] resolves a `reference` URL to the right backend by
//! scheme. [`run_reference_download`] is the shared orchestration logic:
//! single-object downloads verify against the task's digest (ETag) or, failing
//! that, enumerate versions for a match; prefix downloads enumerate every
//! object under the prefix and mirror it locally, rejecting any key that
//! would escape the destination directory.

pub mod azure;
pub mod gcs;
pub mod s3;

use std::{path::PathBuf, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::{io::AsyncWriteExt, sync::Semaphore};

use crate::{
    http::TransferError,
    transfer::{
        safe_path::{join_within_base, safe_relative_path},
        task::{TransferTask, VersionId},
    },
};

/// Per-provider bound on concurrent object requests issued while servicing a
/// single prefix download, independent of the manager-wide transfer limit.
const S3_AZURE_CONCURRENT_OBJECTS: usize = 500;
const GCS_CONCURRENT_OBJECTS: usize = 1000;

/// One object's attributes as reported by `HEAD`/`GetObject` metadata.
#[derive(Debug, Clone)]
pub struct ObjectAttributes {
    /// The object's ETag (or content hash / generation digest), used for integrity checks.
    pub etag: String,
    /// The object's current version, if the backend supports versioning.
    pub version_id: VersionId,
    /// Size in bytes.
    pub size: u64,
}

/// One object returned by a prefix listing.
#[derive(Debug, Clone)]
pub struct ObjectSummary {
    /// Full object key (not stripped of the listed prefix).
    pub key: String,
    /// Size in bytes.
    pub size: u64,
}

/// A cloud object-store backend, abstracting over S3, GCS, and Azure Blob.
#[async_trait]
pub trait ObjectStore: Send + Sync + std::fmt::Debug {
    /// The URL scheme this store answers for (`"s3"`, `"gs"`, or `"azure"`).
    fn scheme(&self) -> &'static str;

    /// Lists every object whose key starts with `prefix` in `bucket`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ObjectStore`] on a backend failure.
    async fn list_with_prefix(&self, bucket: &str, prefix: &str) -> Result<Vec<ObjectSummary>, TransferError>;

    /// Fetches `key`'s attributes, optionally pinned to `version`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ObjectStore`] on a backend failure.
    async fn head(
        &self,
        bucket: &str,
        key: &str,
        version: Option<&VersionId>,
    ) -> Result<ObjectAttributes, TransferError>;

    /// Downloads `key`'s full contents, optionally pinned to `version`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ObjectStore`] on a backend failure.
    async fn get(&self, bucket: &str, key: &str, version: Option<&VersionId>) -> Result<Bytes, TransferError>;

    /// Lists all known versions of `key`, newest first. Backends without
    /// versioning return a single `VersionId::None` entry.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ObjectStore`] on a backend failure.
    async fn list_versions(&self, bucket: &str, key: &str) -> Result<Vec<VersionId>, TransferError>;
}

/// Resolves `reference` URLs to the right [`ObjectStore`] by scheme.
#[derive(Debug, Default)]
pub struct ObjectStoreRegistry {
    s3: Option<Arc<dyn ObjectStore>>,
    gcs: Option<Arc<dyn ObjectStore>>,
    azure: Option<Arc<dyn ObjectStore>>,
}

impl ObjectStoreRegistry {
    /// A registry with no backends configured; reference downloads error out.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registers the S3 backend.
    #[must_use]
    pub fn with_s3(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.s3 = Some(store);
        self
    }

    /// Registers the GCS backend.
    #[must_use]
    pub fn with_gcs(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.gcs = Some(store);
        self
    }

    /// Registers the Azure Blob backend.
    #[must_use]
    pub fn with_azure(mut self, store: Arc<dyn ObjectStore>) -> Self {
        self.azure = Some(store);
        self
    }

    /// Resolves `reference` to its backend, bucket/container, and key,
    /// supporting `s3://bucket/key`, `gs://bucket/key`, and
    /// `https://<account>.blob.core.windows.net/container/key`.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::ObjectStore`] if the scheme is unrecognized or
    /// the matching backend was not registered.
    pub fn resolve(&self, reference: &url::Url) -> Result<(Arc<dyn ObjectStore>, String, String), TransferError> {
        let (store, scheme_label) = match reference.scheme() {
            "s3" => (&self.s3, "s3"),
            "gs" => (&self.gcs, "gs"),
            "https" | "http" if reference.host_str().is_some_and(|h| h.contains(".blob.")) => {
                (&self.azure, "azure")
            }
            other => {
                return Err(TransferError::ObjectStore(format!("unsupported reference scheme '{other}'")));
            }
        };

        let store = store
            .clone()
            .ok_or_else(|| TransferError::ObjectStore(format!("no {scheme_label} backend configured")))?;

        if scheme_label == "azure" {
            let mut segments = reference.path_segments().into_iter().flatten();
            let container = segments
                .next()
                .ok_or_else(|| TransferError::ObjectStore("azure reference missing container".to_string()))?
                .to_string();
            let key = segments.collect::<Vec<_>>().join("/");
            Ok((store, container, key))
        } else {
            let bucket = reference
                .host_str()
                .ok_or_else(|| TransferError::ObjectStore("reference missing bucket host".to_string()))?
                .to_string();
            let key = reference.path().trim_start_matches('/').to_string();
            Ok((store, bucket, key))
        }
    }
}

fn concurrency_for(scheme: &str) -> usize {
    if scheme == "gs" { GCS_CONCURRENT_OBJECTS } else { S3_AZURE_CONCURRENT_OBJECTS }
}

/// Runs a reference-download [`TransferTask`] to completion: single-file
/// verify-then-write, or prefix enumerate-then-mirror.
///
/// # Errors
///
/// Returns [`TransferError`] on any backend, integrity, path-traversal, or
/// local I/O failure.
pub async fn run_reference_download(
    registry: &ObjectStoreRegistry,
    task: &TransferTask,
) -> Result<(), TransferError> {
    let reference = task
        .reference
        .clone()
        .ok_or_else(|| TransferError::ObjectStore("reference download task missing reference URL".to_string()))?;
    let (store, bucket, key) = registry.resolve(&reference)?;

    if task.is_single_file_reference() {
        download_single_object(store.as_ref(), &bucket, &key, task).await
    } else {
        download_prefix(store, &bucket, &key, task).await
    }
}

async fn download_single_object(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    task: &TransferTask,
) -> Result<(), TransferError> {
    let expected = task.digest.as_deref().expect("caller checked is_single_file_reference");
    let version = task.version_id.as_ref();

    let attributes = store.head(bucket, key, version).await?;
    let resolved_version = if attributes.etag == expected {
        version.cloned()
    } else {
        find_matching_version(store, bucket, key, expected).await?
    };

    let bytes = store.get(bucket, key, resolved_version.as_ref()).await?;

    if let Some(parent) = task.local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&task.local_path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;

    if let Some(progress) = &task.progress {
        progress.set_bytes_of_total(bytes.len() as u64, bytes.len() as u64);
    }
    Ok(())
}

async fn find_matching_version(
    store: &dyn ObjectStore,
    bucket: &str,
    key: &str,
    expected_digest: &str,
) -> Result<Option<VersionId>, TransferError> {
    for version in store.list_versions(bucket, key).await? {
        let attributes = store.head(bucket, key, Some(&version)).await?;
        if attributes.etag == expected_digest {
            return Ok(Some(version));
        }
    }
    Err(TransferError::Integrity {
        expected: expected_digest.to_string(),
        actual: "no version matched".to_string(),
    })
}

async fn download_prefix(
    store: Arc<dyn ObjectStore>,
    bucket: &str,
    prefix: &str,
    task: &TransferTask,
) -> Result<(), TransferError> {
    let objects = store.list_with_prefix(bucket, prefix).await?;
    if let Some(progress) = &task.progress {
        progress.set_units_of_total(0, objects.len() as u64, "objects");
    }

    // Resolve every destination path up front and bail before starting any
    // transfer if one object's key would escape the base directory, rather
    // than discovering it after sibling downloads are already in flight.
    let mut destinations = Vec::with_capacity(objects.len());
    for object in &objects {
        let relative = safe_relative_path(&object.key, prefix, true)?;
        let destination = join_within_base(&task.local_path, &relative)?;
        destinations.push(destination);
    }

    let semaphore = Arc::new(Semaphore::new(concurrency_for(store.scheme())));
    let mut joins = Vec::with_capacity(objects.len());

    for (object, destination) in objects.into_iter().zip(destinations) {
        let semaphore = semaphore.clone();
        let bucket = bucket.to_string();
        let store = store.clone();

        joins.push(tokio::spawn(fetch_one_object(store, semaphore, bucket, object.key, destination)));
    }

    let mut first_error = None;
    let object_count = joins.len();
    for (index, join) in joins.into_iter().enumerate() {
        match join.await {
            Ok(Ok(())) => {
                if let Some(progress) = &task.progress {
                    progress.set_units_of_total((index + 1) as u64, object_count as u64, "objects");
                }
            }
            Ok(Err(err)) => {
                first_error.get_or_insert(err);
            }
            Err(join_err) => {
                first_error.get_or_insert(TransferError::ObjectStore(join_err.to_string()));
            }
        }
    }

    first_error.map_or(Ok(()), Err)
}

async fn fetch_one_object(
    store: Arc<dyn ObjectStore>,
    semaphore: Arc<Semaphore>,
    bucket: String,
    key: String,
    destination: PathBuf,
) -> Result<(), TransferError> {
    let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");

    let bytes = store.get(&bucket, &key, None).await?;
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut file = tokio::fs::File::create(&destination).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;
    Ok(())
}
