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

//! [`TransferTask`]: the unit of work submitted to a [`super::manager::FileTransferManager`].

use std::path::PathBuf;

use http::HeaderMap;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::{http::TransferError, operation::Progress};

/// Tagged variant standing in for the dynamically-typed VersionId observed
/// across object stores (string for S3/Azure, integer-as-JSON-number for
/// GCS). Kept as a first-class type so callers never see the source's
/// dynamic typing (§9 design notes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionId {
    /// A string version identifier (S3, Azure).
    String(String),
    /// An integer generation number (GCS).
    Int(i64),
    /// The object store does not version this object.
    None,
}

impl std::fmt::Display for VersionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::None => write!(f, "none"),
        }
    }
}

/// What kind of transfer a [`TransferTask`] performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferKind {
    /// Upload a local file to the backend over HTTP. Out of scope for the
    /// core contract (§4.8): the engine accepts these but performs no work.
    Upload,
    /// Download a file over HTTP, parallelizing via range requests when large.
    Download,
    /// Upload to a cloud object store. Out of scope; a no-op in the core.
    ReferenceUpload,
    /// Download from a cloud object store (single object or prefix), with
    /// ETag/version verification and path-traversal defense.
    ReferenceDownload,
}

/// A callback invoked exactly once, after the task's error (if any) has been
/// recorded, with the task's final result.
pub type CompletionCallback = Box<dyn FnOnce(Result<(), TransferError>) + Send>;

/// One unit of file-transfer work submitted to a [`super::manager::FileTransferManager`].
///
/// Invariants (§3): `size >= 0`, `offset >= 0`, and `offset + size <= file
/// size` when both are known and non-zero. The manager records exactly one
/// error (or none) on the task before invoking its completion callback.
pub struct TransferTask {
    /// What kind of transfer this is.
    pub kind: TransferKind,
    /// Local filesystem destination (download) or source (upload).
    pub local_path: PathBuf,
    /// Target URL for HTTP upload/download tasks.
    pub url: Option<Url>,
    /// Object-store reference (`s3://…`, `gs://…`, `https://<account>.blob…`)
    /// for reference tasks.
    pub reference: Option<Url>,
    /// Expected digest (ETag) for single-file reference downloads. `None`
    /// means this is a prefix download: enumerate everything under
    /// `reference`'s path and mirror it under `local_path`.
    pub digest: Option<String>,
    /// Pin a specific object version; if absent and the ETag mismatches, the
    /// engine enumerates versions looking for a match (§4.8).
    pub version_id: Option<VersionId>,
    /// Known size in bytes, if any (drives the parallel-download decision).
    pub size: u64,
    /// Byte offset this task starts at, for resumed or partial transfers.
    pub offset: u64,
    /// Extra headers merged onto the transfer's outbound requests.
    pub headers: HeaderMap,
    /// Progress sink, if the caller wants updates.
    pub progress: Option<std::sync::Arc<Progress>>,
    /// Cancellation handle checked at every suspension point.
    pub cancellation: CancellationToken,
    /// Invoked exactly once after the task finishes (success or error).
    pub on_complete: Option<CompletionCallback>,
}

impl std::fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferTask")
            .field("kind", &self.kind)
            .field("local_path", &self.local_path)
            .field("url", &self.url)
            .field("reference", &self.reference)
            .field("digest", &self.digest)
            .field("version_id", &self.version_id)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .finish_non_exhaustive()
    }
}

impl TransferTask {
    /// Creates a plain HTTP download task for `url` into `local_path`.
    #[must_use]
    pub fn download(url: Url, local_path: PathBuf, size: u64) -> Self {
        Self {
            kind: TransferKind::Download,
            local_path,
            url: Some(url),
            reference: None,
            digest: None,
            version_id: None,
            size,
            offset: 0,
            headers: HeaderMap::new(),
            progress: None,
            cancellation: CancellationToken::new(),
            on_complete: None,
        }
    }

    /// Creates a single-file reference-download task, verified against `digest`.
    #[must_use]
    pub fn reference_download_file(reference: Url, local_path: PathBuf, digest: String) -> Self {
        Self {
            kind: TransferKind::ReferenceDownload,
            local_path,
            url: None,
            reference: Some(reference),
            digest: Some(digest),
            version_id: None,
            size: 0,
            offset: 0,
            headers: HeaderMap::new(),
            progress: None,
            cancellation: CancellationToken::new(),
            on_complete: None,
        }
    }

    /// Creates a prefix reference-download task: every object under
    /// `reference`'s path is mirrored under `local_path`.
    #[must_use]
    pub fn reference_download_prefix(reference: Url, local_path: PathBuf) -> Self {
        Self {
            kind: TransferKind::ReferenceDownload,
            local_path,
            url: None,
            reference: Some(reference),
            digest: None,
            version_id: None,
            size: 0,
            offset: 0,
            headers: HeaderMap::new(),
            progress: None,
            cancellation: CancellationToken::new(),
            on_complete: None,
        }
    }

    /// Whether this reference-download task targets exactly one object
    /// rather than everything under a prefix.
    #[must_use]
    pub fn is_single_file_reference(&self) -> bool {
        self.digest.is_some()
    }
}
