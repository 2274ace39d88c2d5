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

//! A GCRA quota: a replenish interval (time to refill one cell) and a burst size
//! (maximum number of cells that can be held at once).

use std::{num::NonZeroU32, time::Duration};

/// Describes the rate and burst capacity of a [`super::RateLimiter`] bucket.
#[derive(Debug, Clone, Copy)]
pub struct Quota {
    pub(crate) replenish_interval: Duration,
    pub(crate) burst_size: NonZeroU32,
}

impl Quota {
    /// A quota replenishing `max_burst` cells per second, with burst capacity `max_burst`.
    #[must_use]
    pub fn per_second(max_burst: NonZeroU32) -> Self {
        Self::per(Duration::from_secs(1), max_burst)
    }

    /// A quota replenishing `max_burst` cells per minute, with burst capacity `max_burst`.
    #[must_use]
    pub fn per_minute(max_burst: NonZeroU32) -> Self {
        Self::per(Duration::from_secs(60), max_burst)
    }

    /// A quota replenishing `max_burst` cells per hour, with burst capacity `max_burst`.
    #[must_use]
    pub fn per_hour(max_burst: NonZeroU32) -> Self {
        Self::per(Duration::from_secs(3600), max_burst)
    }

    fn per(period: Duration, max_burst: NonZeroU32) -> Self {
        Self {
            replenish_interval: period / max_burst.get(),
            burst_size: max_burst,
        }
    }

    /// A quota replenishing one cell every `replenish_interval`, burst size 1.
    ///
    /// Returns `None` if `replenish_interval` is zero.
    #[must_use]
    pub fn with_period(replenish_interval: Duration) -> Option<Self> {
        if replenish_interval.is_zero() {
            return None;
        }
        Some(Self {
            replenish_interval,
            burst_size: NonZeroU32::new(1).expect("1 is nonzero"),
        })
    }

    /// Returns a copy of this quota with its burst size set to `burst_size`.
    ///
    /// The replenish interval is unaffected.
    #[must_use]
    pub fn allow_burst(mut self, burst_size: NonZeroU32) -> Self {
        self.burst_size = burst_size;
        self
    }

    /// The maximum number of cells this quota can hold at once.
    #[must_use]
    pub fn burst_size(&self) -> NonZeroU32 {
        self.burst_size
    }

    /// The time needed to replenish a single cell.
    #[must_use]
    pub fn replenish_interval(&self) -> Duration {
        self.replenish_interval
    }
}
