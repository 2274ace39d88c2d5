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

//! A keyed, thread-safe GCRA rate limiter.
//!
//! Each key owns an independent token bucket seeded at `quota.burst_size()` and
//! replenished continuously at one cell per `quota.replenish_interval()`. A key
//! with no specific quota falls back to the limiter's default quota.

use std::{
    collections::hash_map::RandomState,
    hash::{BuildHasher, Hash},
    sync::Mutex,
    time::{Duration, Instant},
};

use dashmap::DashMap;

use super::quota::Quota;

/// Error returned by [`RateLimiter::check_key`] when a key has exhausted its burst.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The key has no tokens available; retry after the given duration.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    Exceeded {
        /// Approximate wait before a token becomes available.
        retry_after: Duration,
    },
    /// The key has no configured quota and no default quota was set.
    #[error("no quota configured for this key")]
    NoQuota,
}

#[derive(Debug)]
struct Bucket {
    tokens: f64,
    last_refill: Instant,
}

impl Bucket {
    fn new(quota: &Quota) -> Self {
        Self {
            tokens: f64::from(quota.burst_size.get()),
            last_refill: Instant::now(),
        }
    }

    /// Refills then attempts to take one token. Returns `Ok(())` on success, or
    /// `Err(retry_after)` with an estimate of how long until a token is available.
    fn check(&mut self, quota: &Quota) -> Result<(), Duration> {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill);
        let interval_nanos = (quota.replenish_interval.as_nanos().max(1)) as f64;
        let refill = elapsed.as_nanos() as f64 / interval_nanos;
        if refill > 0.0 {
            let max_tokens = f64::from(quota.burst_size.get());
            self.tokens = (self.tokens + refill).min(max_tokens);
            self.last_refill = now;
        }

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            Ok(())
        } else {
            let missing = 1.0 - self.tokens;
            let wait_nanos = (missing * interval_nanos).ceil() as u64;
            Err(Duration::from_nanos(wait_nanos))
        }
    }
}

/// Keyed rate limiter: one GCRA bucket per key, each governed by the key's
/// configured quota or the limiter's default quota.
#[derive(Debug)]
pub struct RateLimiter<K, S = RandomState>
where
    K: Eq + Hash + Clone,
{
    default_quota: Mutex<Option<Quota>>,
    keyed_quotas: std::collections::HashMap<K, Quota>,
    buckets: DashMap<K, Bucket, S>,
}

impl<K, S> RateLimiter<K, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone + Default,
{
    /// Creates a new limiter with an optional default quota and per-key overrides.
    #[must_use]
    pub fn new_with_quota(default_quota: Option<Quota>, keyed_quotas: Vec<(K, Quota)>) -> Self {
        Self {
            default_quota: Mutex::new(default_quota),
            keyed_quotas: keyed_quotas.into_iter().collect(),
            buckets: DashMap::with_hasher(S::default()),
        }
    }

    fn quota_for(&self, key: &K) -> Option<Quota> {
        self.keyed_quotas
            .get(key)
            .copied()
            .or_else(|| *self.default_quota.lock().expect("ratelimiter mutex poisoned"))
    }

    /// Attempts to take one token for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`RateLimitError::NoQuota`] if no quota applies to `key`, or
    /// [`RateLimitError::Exceeded`] if the key's bucket is currently empty.
    pub fn check_key(&self, key: &K) -> Result<(), RateLimitError> {
        let quota = self.quota_for(key).ok_or(RateLimitError::NoQuota)?;
        let mut entry = self
            .buckets
            .entry(key.clone())
            .or_insert_with(|| Bucket::new(&quota));
        entry
            .check(&quota)
            .map_err(|retry_after| RateLimitError::Exceeded { retry_after })
    }

    /// Replaces the default quota used for keys with no specific override.
    ///
    /// Used by [`crate::http::wrappers::ResponseBasedRateLimiter`] to retarget the
    /// limiter's rate as the tracker's estimate changes. Existing buckets keep
    /// their accumulated tokens; only future refills use the new interval.
    pub fn set_default_quota(&self, quota: Quota) {
        *self.default_quota.lock().expect("ratelimiter mutex poisoned") = Some(quota);
    }
}
