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

//! Shared constants for the Tracklab client networking core.

/// The product name used to derive the `User-Agent` sent on every backend request.
pub static PRODUCT_NAME: &str = "tracklab";

/// The `User-Agent` string sent with every request to the backend, of the form
/// `<product>-core`.
pub static USER_AGENT: &str = "tracklab-core";

/// Default number of total attempts (including the first) for a retryable request.
pub const DEFAULT_RETRY_MAX: u32 = 7;

/// Default minimum backoff wait between retry attempts.
pub const DEFAULT_RETRY_WAIT_MIN_SECS: u64 = 1;

/// Default maximum backoff wait between retry attempts.
pub const DEFAULT_RETRY_WAIT_MAX_SECS: u64 = 60;

/// Default per-attempt timeout for a single HTTP request.
pub const DEFAULT_NON_RETRY_TIMEOUT_SECS: u64 = 60;

/// Maximum allowed concurrent file transfers across a process, per the
/// `FileTransferManager` semaphore.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 128;

/// Threshold above which a download is split into parallel HTTP range requests.
pub const PARALLEL_DOWNLOAD_THRESHOLD_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Minimum chunk size used when planning a parallel range download.
pub const MIN_CHUNK_SIZE_BYTES: u64 = 100 * 1024 * 1024;

/// Number of parts a parallel download is divided into, at minimum granularity.
pub const MIN_PARALLEL_PARTS: u64 = 10_000;

/// Alignment boundary that chunk sizes are rounded up to.
pub const CHUNK_SIZE_ALIGNMENT_BYTES: u64 = 4 * 1024;

/// Read buffer size used when streaming a range response body into chunks.
pub const RANGE_READ_BUFFER_BYTES: usize = 1024 * 1024;

/// Capacity of the bounded channel between range workers and the file writer.
pub const CHUNK_CHANNEL_CAPACITY: usize = 500;
