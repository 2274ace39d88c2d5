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

//! Parallel HTTP range-download engine (§4.7).
//!
//! Large downloads are split into fixed-size parts, each fetched by an
//! independent worker issuing `Range: bytes=start-end` requests, streaming
//! 1-MiB reads straight off the response body rather than buffering the
//! whole part in memory. A single writer task drains a bounded channel of
//! [`FileChunk`]s and positions each write with a seek, so workers never
//! touch the output file directly and can complete in any order.
//!
//! This engine bypasses [`crate::http::Client`]'s [`crate::http::RoundTrip`]
//! chain: that chain buffers the full response body (`response.bytes()`),
//! which defeats streaming. It reuses the same building blocks instead —
//! [`ExponentialBackoff`] for per-part retry and [`HttpClientError`] for
//! classification — against a bare `reqwest::Client`.

use std::{path::Path, sync::Arc, time::Duration};

use bytes::Bytes;
use futures_util::StreamExt;
use http::HeaderMap;
use tokio::{
    io::{AsyncSeekExt, AsyncWriteExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracklab_core::consts::{
    CHUNK_CHANNEL_CAPACITY, CHUNK_SIZE_ALIGNMENT_BYTES, MIN_CHUNK_SIZE_BYTES, MIN_PARALLEL_PARTS,
    PARALLEL_DOWNLOAD_THRESHOLD_BYTES, RANGE_READ_BUFFER_BYTES,
};
use url::Url;

use crate::{
    backoff::ExponentialBackoff,
    http::HttpClientError,
    operation::{Operation, Progress},
    transfer::manager::FileTransferStats,
};

/// One `[start, end]` inclusive byte range a worker fetches in full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadPart {
    /// First byte of the range (inclusive).
    pub start: u64,
    /// Last byte of the range (inclusive).
    pub end: u64,
}

impl DownloadPart {
    /// Number of bytes covered by this part.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Whether this part covers zero bytes. Parts are constructed non-empty;
    /// kept for API symmetry with [`Self::len`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }

    fn header_value(&self) -> String {
        format!("bytes={}-{}", self.start, self.end)
    }
}

/// A decoded slice of a part's response body, destined for a specific file offset.
#[derive(Debug)]
pub struct FileChunk {
    /// Absolute offset in the destination file this chunk starts at.
    pub offset: u64,
    /// The chunk's bytes.
    pub data: Bytes,
}

/// Whether `total_size` warrants splitting into parallel range requests
/// rather than one plain GET (§4.7 trigger condition).
#[must_use]
pub fn should_parallelize(total_size: u64) -> bool {
    total_size >= PARALLEL_DOWNLOAD_THRESHOLD_BYTES
}

/// Divides `total_size` into contiguous, `CHUNK_SIZE_ALIGNMENT_BYTES`-aligned
/// parts, no smaller than `MIN_CHUNK_SIZE_BYTES` and no more numerous than
/// `MIN_PARALLEL_PARTS` would imply for the smallest allowed chunk size.
///
/// # Panics
///
/// Panics if `total_size` is zero; callers must only plan parts for a
/// download whose size is already known and positive.
#[must_use]
pub fn plan_parts(total_size: u64) -> Vec<DownloadPart> {
    assert!(total_size > 0, "plan_parts requires a known, positive size");

    let min_chunk = MIN_CHUNK_SIZE_BYTES;
    let by_min_parts = total_size.div_ceil(MIN_PARALLEL_PARTS);
    let mut chunk_size = min_chunk.max(by_min_parts);

    let remainder = chunk_size % CHUNK_SIZE_ALIGNMENT_BYTES;
    if remainder != 0 {
        chunk_size += CHUNK_SIZE_ALIGNMENT_BYTES - remainder;
    }

    let mut parts = Vec::with_capacity((total_size / chunk_size + 1) as usize);
    let mut start = 0;
    while start < total_size {
        let end = (start + chunk_size - 1).min(total_size - 1);
        parts.push(DownloadPart { start, end });
        start = end + 1;
    }
    parts
}

/// Number of concurrent part workers: `min(2 * available_parallelism, num_parts)`,
/// with a floor of 1 so a single-part download still runs.
#[must_use]
pub fn worker_count(num_parts: usize) -> usize {
    let cpus = std::thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get);
    (2 * cpus).min(num_parts).max(1)
}

fn classify_reqwest_error(err: reqwest::Error) -> HttpClientError {
    if err.is_timeout() || err.is_connect() {
        HttpClientError::TransientTransport(err.to_string())
    } else {
        HttpClientError::Transport(err)
    }
}

/// Fetches one [`DownloadPart`] with retry, streaming decoded chunks into `tx`.
///
/// # Errors
///
/// Returns [`HttpClientError`] if the part could not be fetched after
/// exhausting the retry budget, or [`HttpClientError::Cancelled`] if
/// `cancellation` fires first.
pub async fn fetch_part(
    client: &reqwest::Client,
    url: &Url,
    part: DownloadPart,
    extra_headers: &HeaderMap,
    retry_max: u32,
    cancellation: &CancellationToken,
    tx: &mpsc::Sender<FileChunk>,
    operation: Option<&Operation>,
) -> Result<(), HttpClientError> {
    let mut backoff = ExponentialBackoff::new(
        Duration::from_secs(1),
        Duration::from_secs(30),
        2.0,
        true,
        false,
    )
    .expect("fixed backoff parameters are valid");

    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = fetch_part_once(client, url, part, extra_headers, cancellation, tx).await;

        match outcome {
            Ok(()) => {
                if let Some(operation) = operation {
                    operation.clear_error_status();
                }
                return Ok(());
            }
            Err(err) if cancellation.is_cancelled() => {
                let _ = err;
                return Err(HttpClientError::Cancelled);
            }
            Err(err) if attempt >= retry_max || err.is_terminal() => return Err(err),
            Err(err) => {
                if let Some(operation) = operation {
                    operation.set_error_status(format!("retrying part {}-{}: {err}", part.start, part.end));
                }
                let wait = backoff.next_duration();
                tokio::select! {
                    () = tokio::time::sleep(wait) => {}
                    () = cancellation.cancelled() => return Err(HttpClientError::Cancelled),
                }
            }
        }
    }
}

async fn fetch_part_once(
    client: &reqwest::Client,
    url: &Url,
    part: DownloadPart,
    extra_headers: &HeaderMap,
    cancellation: &CancellationToken,
    tx: &mpsc::Sender<FileChunk>,
) -> Result<(), HttpClientError> {
    let mut request = client.get(url.clone()).header(http::header::RANGE, part.header_value());
    for (name, value) in extra_headers {
        request = request.header(name, value);
    }

    let response = tokio::select! {
        result = request.send() => result.map_err(classify_reqwest_error)?,
        () = cancellation.cancelled() => return Err(HttpClientError::Cancelled),
    };

    let status = response.status();
    if status.is_server_error() {
        return Err(HttpClientError::TransientTransport(format!("HTTP {status} on range fetch")));
    }
    if !status.is_success() {
        return Err(HttpClientError::terminal_http(
            "GET",
            url.as_str(),
            status.as_u16(),
            &format!("range request failed with status {status}"),
        ));
    }

    let mut offset = part.start;
    let mut stream = response.bytes_stream();
    let mut pending = Vec::with_capacity(RANGE_READ_BUFFER_BYTES);

    loop {
        let next = tokio::select! {
            item = stream.next() => item,
            () = cancellation.cancelled() => return Err(HttpClientError::Cancelled),
        };

        let Some(item) = next else { break };
        let bytes = item.map_err(classify_reqwest_error)?;
        pending.extend_from_slice(&bytes);

        while pending.len() >= RANGE_READ_BUFFER_BYTES {
            let drained: Vec<u8> = pending.drain(..RANGE_READ_BUFFER_BYTES).collect();
            let len = drained.len() as u64;
            send_chunk(tx, offset, drained, cancellation).await?;
            offset += len;
        }
    }

    if !pending.is_empty() {
        send_chunk(tx, offset, pending, cancellation).await?;
    }

    Ok(())
}

async fn send_chunk(
    tx: &mpsc::Sender<FileChunk>,
    offset: u64,
    data: Vec<u8>,
    cancellation: &CancellationToken,
) -> Result<(), HttpClientError> {
    tokio::select! {
        result = tx.send(FileChunk { offset, data: Bytes::from(data) }) => {
            result.map_err(|_| HttpClientError::InvariantViolated("chunk writer closed early".to_string()))
        }
        () = cancellation.cancelled() => Err(HttpClientError::Cancelled),
    }
}

/// Drains `rx`, writing each [`FileChunk`] to `path` at its recorded offset.
/// The file is pre-truncated to `total_size` so positional writes never need
/// to extend it mid-flight.
///
/// The writer is the single point that accumulates bytes written and reports
/// them: every chunk's length feeds both `progress` and `stats` (§4.7), which
/// keeps the two sinks in lockstep instead of having every part worker race
/// to update them independently.
///
/// # Errors
///
/// Returns [`HttpClientError::LocalIo`] if the file cannot be created, seeked,
/// or written.
pub async fn run_writer(
    path: &Path,
    total_size: u64,
    mut rx: mpsc::Receiver<FileChunk>,
    progress: Option<Arc<Progress>>,
    stats: Option<Arc<FileTransferStats>>,
) -> Result<(), HttpClientError> {
    let mut file = tokio::fs::File::create(path).await?;
    file.set_len(total_size).await?;

    let mut written: u64 = 0;
    while let Some(chunk) = rx.recv().await {
        file.seek(std::io::SeekFrom::Start(chunk.offset)).await?;
        let len = chunk.data.len() as u64;
        file.write_all(&chunk.data).await?;
        written += len;

        if let Some(progress) = &progress {
            progress.set_bytes_of_total(written, total_size);
        }
        if let Some(stats) = &stats {
            stats.report_bytes(path, written);
        }
    }

    file.flush().await?;
    Ok(())
}

/// Downloads `url` (already known to be `total_size` bytes) to `path`, using
/// `worker_count(parts.len())` concurrent range-fetch workers feeding a single
/// writer task, per §4.7.
///
/// # Errors
///
/// Returns [`HttpClientError`] if any part's retry budget is exhausted, the
/// writer fails, or `cancellation` fires.
pub async fn download_parallel(
    client: reqwest::Client,
    url: Url,
    path: &Path,
    total_size: u64,
    extra_headers: HeaderMap,
    retry_max: u32,
    cancellation: CancellationToken,
    progress: Option<Arc<Progress>>,
    stats: Option<Arc<FileTransferStats>>,
    operation: Option<Operation>,
) -> Result<(), HttpClientError> {
    let parts = plan_parts(total_size);
    let workers = worker_count(parts.len());

    if let Some(progress) = &progress {
        progress.set_bytes_of_total(0, total_size);
    }

    let (tx, rx) = mpsc::channel(CHUNK_CHANNEL_CAPACITY);
    let writer_path = path.to_path_buf();
    let writer_progress = progress.clone();
    let writer_stats = stats.clone();
    let writer = tokio::spawn(async move {
        run_writer(&writer_path, total_size, rx, writer_progress, writer_stats).await
    });

    let semaphore = Arc::new(tokio::sync::Semaphore::new(workers));
    let mut joins = Vec::with_capacity(parts.len());

    for part in parts {
        let client = client.clone();
        let url = url.clone();
        let headers = extra_headers.clone();
        let cancellation = cancellation.clone();
        let tx = tx.clone();
        let operation = operation.clone();
        let semaphore = semaphore.clone();

        joins.push(tokio::spawn(async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
            fetch_part(&client, &url, part, &headers, retry_max, &cancellation, &tx, operation.as_ref()).await
        }));
    }
    drop(tx);

    let mut first_error = None;
    for join in joins {
        match join.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                cancellation.cancel();
                first_error.get_or_insert(err);
            }
            Err(join_err) => {
                cancellation.cancel();
                first_error.get_or_insert(HttpClientError::InvariantViolated(join_err.to_string()));
            }
        }
    }

    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => first_error.get_or_insert(err),
        Err(join_err) => first_error.get_or_insert(HttpClientError::InvariantViolated(join_err.to_string())),
    };

    first_error.map_or(Ok(()), Err)
}
