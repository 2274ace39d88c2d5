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

//! Response-adaptive estimator of the sustainable outbound request rate.
//!
//! Grounded in the same mutex-guarded, [`Instant`]-based refill style used by
//! weighted request limiters elsewhere in the adapters, but here the thing
//! being tracked is not a token bucket: it is an EMA-smoothed estimate of how
//! many requests per second the server's (unknown, possibly non-uniform) quota
//! can sustain.

use std::{
    sync::Mutex,
    time::{Duration, Instant},
};

use super::headers::RateLimitHeaders;

/// Observation of the rate-limit headers on the most recently seen response.
#[derive(Debug, Clone, Copy)]
struct LastObserved {
    at: Instant,
    remaining: f64,
    reset: f64,
}

#[derive(Debug)]
struct State {
    target_rate: f64,
    last_observed: Option<LastObserved>,
    requests_since_update: u64,
}

/// Estimates the sustainable per-second request rate from a stream of
/// `(now, RateLimitHeaders)` observations, per the EMA algorithm in §4.2.
#[derive(Debug)]
pub struct RateLimitTracker {
    min_rate: f64,
    max_rate: f64,
    alpha: f64,
    min_samples_for_estimate: u64,
    state: Mutex<State>,
}

impl RateLimitTracker {
    /// Creates a tracker, initializing the target rate to `max_rate`.
    ///
    /// # Errors
    ///
    /// Returns an error if `min_rate > max_rate` or `alpha` is outside `[0, 1]`.
    pub fn new(
        min_rate: f64,
        max_rate: f64,
        alpha: f64,
        min_samples_for_estimate: u64,
    ) -> anyhow::Result<Self> {
        if min_rate > max_rate {
            anyhow::bail!("min_rate ({min_rate}) must be <= max_rate ({max_rate})");
        }
        if !(0.0..=1.0).contains(&alpha) {
            anyhow::bail!("alpha ({alpha}) must be within [0, 1]");
        }

        Ok(Self {
            min_rate,
            max_rate,
            alpha,
            min_samples_for_estimate,
            state: Mutex::new(State {
                target_rate: max_rate,
                last_observed: None,
                requests_since_update: 0,
            }),
        })
    }

    /// Records that a request is about to be sent.
    pub fn track_request(&self) {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        state.requests_since_update += 1;
    }

    /// Returns the current target rate, in `[min_rate, max_rate]`.
    #[must_use]
    pub fn target_rate_limit(&self) -> f64 {
        self.state.lock().expect("tracker mutex poisoned").target_rate
    }

    /// Incorporates a new rate-limit-headers observation.
    pub fn update_estimates(&self, now: Instant, headers: RateLimitHeaders) {
        let mut state = self.state.lock().expect("tracker mutex poisoned");
        let requests_since_update = state.requests_since_update;

        let Some(prev) = state.last_observed else {
            // First observation: no delta to compute from yet.
            state.last_observed = Some(LastObserved {
                at: now,
                remaining: headers.remaining,
                reset: headers.reset,
            });
            state.requests_since_update = 0;
            return;
        };

        let delta_quota = prev.remaining - headers.remaining;

        if delta_quota < 0.0 {
            // The quota window reset: raise the target back toward max.
            state.target_rate = Self::raise_toward_max(state.target_rate, self.max_rate);
        } else if delta_quota == 0.0 {
            // No visible consumption (e.g. cached 304s): avoid getting stuck low.
            state.target_rate = Self::raise_toward_max(state.target_rate, self.max_rate);
        } else if requests_since_update >= self.min_samples_for_estimate && prev.reset > 1.0 {
            let cost_per_request = delta_quota / requests_since_update as f64;
            if cost_per_request > 0.0 && headers.reset > 0.0 {
                let sustainable_rate = (headers.remaining / cost_per_request) / headers.reset;
                let clamped = sustainable_rate.clamp(self.min_rate, self.max_rate);
                state.target_rate = self.alpha * state.target_rate + (1.0 - self.alpha) * clamped;
            }
        }

        state.target_rate = state.target_rate.clamp(self.min_rate, self.max_rate);
        state.last_observed = Some(LastObserved {
            at: now,
            remaining: headers.remaining,
            reset: headers.reset,
        });
        state.requests_since_update = 0;
    }

    fn raise_toward_max(current: f64, max_rate: f64) -> f64 {
        // Step half the remaining distance to max rather than jumping straight
        // there, so a burst of window resets doesn't thrash the target.
        current + (max_rate - current) * 0.5
    }
}

/// Caps a rate-limit-derived wait duration at 30 s, per the design note that
/// `RateLimit-Reset` units vary by server and a literal reading can otherwise
/// produce pathological stalls.
#[must_use]
pub fn capped_wait(reset_seconds: f64) -> Duration {
    let secs = reset_seconds.max(0.0).min(30.0);
    Duration::from_secs_f64(secs)
}
