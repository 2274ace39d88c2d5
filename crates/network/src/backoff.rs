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

//! Exponential backoff with full jitter, used by [`crate::http::retry`].

use std::time::Duration;

use rand::Rng;

/// Minimum allowed growth factor.
const MIN_FACTOR: f64 = 1.0;
/// Maximum allowed growth factor.
const MAX_FACTOR: f64 = 100.0;

/// Exponential backoff generator with full jitter.
///
/// Per §4.5's formula `wait = rand_uniform(0, min(retryWaitMax, retryWaitMin *
/// factor^attempt))`: each call to [`Self::next_duration`] samples uniformly
/// from `[0, cap]`, where `cap` is the current exponential cap (starting at
/// `initial`, growing by `factor` each call, clamped to `max`) — not a fixed
/// jitter window added on top of a growing base. With `full_jitter` false,
/// the raw `cap` is returned with no randomness, for deterministic tests.
/// With `immediate_first` set, the very first call returns zero so a
/// caller's first retry attempt fires immediately.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    factor: f64,
    full_jitter: bool,
    immediate_first: bool,
    consumed_immediate: bool,
    cap: Duration,
}

impl ExponentialBackoff {
    /// Creates a new backoff generator.
    ///
    /// # Errors
    ///
    /// Returns an error if `max < initial` or `factor` is outside `[1.0, 100.0]`.
    pub fn new(
        initial: Duration,
        max: Duration,
        factor: f64,
        full_jitter: bool,
        immediate_first: bool,
    ) -> anyhow::Result<Self> {
        if max < initial {
            anyhow::bail!("max ({max:?}) must be >= initial ({initial:?})");
        }
        if !(MIN_FACTOR..=MAX_FACTOR).contains(&factor) {
            anyhow::bail!("factor ({factor}) must be within [{MIN_FACTOR}, {MAX_FACTOR}]");
        }

        Ok(Self {
            initial,
            max,
            factor,
            full_jitter,
            immediate_first,
            consumed_immediate: false,
            cap: initial,
        })
    }

    /// Returns the next delay and advances the internal state.
    pub fn next_duration(&mut self) -> Duration {
        if self.immediate_first && !self.consumed_immediate {
            self.consumed_immediate = true;
            return Duration::ZERO;
        }

        let cap = self.cap;
        let wait = if self.full_jitter {
            let cap_ms = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
            if cap_ms == 0 { Duration::ZERO } else { Duration::from_millis(rand::rng().random_range(0..=cap_ms)) }
        } else {
            cap
        };

        let scaled_nanos = (cap.as_nanos() as f64) * self.factor;
        let scaled = if scaled_nanos.is_finite() && scaled_nanos >= 0.0 {
            Duration::from_nanos(scaled_nanos.min(u64::MAX as f64) as u64)
        } else {
            self.max
        };
        self.cap = scaled.min(self.max);

        wait
    }

    /// Returns the current cap (pre-jitter), not yet consumed.
    #[must_use]
    pub fn current_delay(&self) -> Duration {
        self.cap
    }

    /// Restores the generator to its initial state.
    pub fn reset(&mut self) {
        self.cap = self.initial;
        self.consumed_immediate = false;
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_rejects_max_below_initial() {
        let result = ExponentialBackoff::new(
            Duration::from_secs(10),
            Duration::from_secs(1),
            2.0,
            false,
            false,
        );
        assert!(result.is_err());
    }

    #[rstest]
    fn test_rejects_factor_out_of_range() {
        assert!(
            ExponentialBackoff::new(Duration::from_millis(1), Duration::from_secs(1), 0.5, false, false)
                .is_err()
        );
        assert!(
            ExponentialBackoff::new(
                Duration::from_millis(1),
                Duration::from_secs(1),
                100.1,
                false,
                false
            )
            .is_err()
        );
    }

    #[rstest]
    fn test_grows_and_caps_at_max() {
        // full_jitter = false: deterministic, returns the cap itself.
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            false,
            false,
        )
        .unwrap();

        assert_eq!(backoff.next_duration(), Duration::from_millis(10));
        assert_eq!(backoff.next_duration(), Duration::from_millis(20));
        assert_eq!(backoff.next_duration(), Duration::from_millis(40));
        assert_eq!(backoff.next_duration(), Duration::from_millis(80));
        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
        assert_eq!(backoff.next_duration(), Duration::from_millis(100));
    }

    #[rstest]
    fn test_immediate_first_then_grows() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            false,
            true,
        )
        .unwrap();

        assert_eq!(backoff.next_duration(), Duration::ZERO);
        assert_eq!(backoff.next_duration(), Duration::from_millis(10));
        assert_eq!(backoff.next_duration(), Duration::from_millis(20));
    }

    #[rstest]
    fn test_reset_restores_initial() {
        let mut backoff = ExponentialBackoff::new(
            Duration::from_millis(10),
            Duration::from_millis(100),
            2.0,
            false,
            false,
        )
        .unwrap();

        backoff.next_duration();
        backoff.next_duration();
        assert_ne!(backoff.current_delay(), Duration::from_millis(10));

        backoff.reset();
        assert_eq!(backoff.current_delay(), Duration::from_millis(10));
    }

    #[rstest]
    fn test_full_jitter_stays_within_cap_and_varies() {
        // §4.5: wait = rand_uniform(0, cap). Every draw must land in [0, cap],
        // and across enough draws at least one should land below the cap
        // (otherwise this would just be the deterministic `false` behavior).
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(1000), Duration::from_millis(1000), 2.0, true, false)
                .unwrap();

        let mut saw_below_cap = false;
        for _ in 0..200 {
            let wait = backoff.next_duration();
            assert!(wait <= Duration::from_millis(1000));
            if wait < Duration::from_millis(1000) {
                saw_below_cap = true;
            }
        }
        assert!(saw_below_cap, "full jitter should produce values below the cap over many draws");
    }

    #[rstest]
    fn test_full_jitter_cap_still_grows_and_clamps() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_millis(10), Duration::from_millis(100), 2.0, true, false)
                .unwrap();

        assert!(backoff.next_duration() <= Duration::from_millis(10));
        assert_eq!(backoff.current_delay(), Duration::from_millis(20));
        assert!(backoff.next_duration() <= Duration::from_millis(20));
        assert_eq!(backoff.current_delay(), Duration::from_millis(40));

        for _ in 0..10 {
            backoff.next_duration();
        }
        assert_eq!(backoff.current_delay(), Duration::from_millis(100));
    }
}
