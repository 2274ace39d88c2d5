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

//! Small time helpers shared by credential expiry and rate-limit tracking.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Returns the current wall-clock time.
///
/// A thin wrapper so call sites read `tracklab_core::time::now_utc()` rather than
/// importing `chrono::Utc` directly, keeping the choice of clock source in one place.
#[inline]
#[must_use]
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Returns `true` if `expires_at` is at or before now, adjusted back by `skew`.
///
/// A nonzero `skew` treats a token as expired slightly before its stated expiry,
/// so a caller can refresh ahead of the server actually rejecting it.
#[must_use]
pub fn is_expired(expires_at: DateTime<Utc>, skew: Duration) -> bool {
    let skew = chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::zero());
    expires_at - skew <= now_utc()
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_is_expired_in_past() {
        let past = now_utc() - chrono::Duration::seconds(10);
        assert!(is_expired(past, Duration::ZERO));
    }

    #[rstest]
    fn test_is_expired_in_future() {
        let future = now_utc() + chrono::Duration::seconds(60);
        assert!(!is_expired(future, Duration::ZERO));
    }

    #[rstest]
    fn test_is_expired_with_skew() {
        let soon = now_utc() + chrono::Duration::seconds(5);
        assert!(is_expired(soon, Duration::from_secs(10)));
    }
}
