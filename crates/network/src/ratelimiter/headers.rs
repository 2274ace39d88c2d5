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

//! Parser for standard (IETF draft) and legacy rate-limit response headers.

use http::HeaderMap;

const MODERN_REMAINING: &str = "ratelimit-remaining";
const MODERN_RESET: &str = "ratelimit-reset";
const LEGACY_REMAINING: &str = "x-ratelimit-remaining";

/// The rate-limit quota observed on one HTTP response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitHeaders {
    /// Remaining quota units, always `>= 0`.
    pub remaining: f64,
    /// Seconds until the quota window resets, always `>= 0`.
    pub reset: f64,
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<f64>().ok())
}

/// Parses rate-limit headers from a response header map.
///
/// Returns `None` ("no value") if neither the modern nor the legacy header is
/// present, or if a present value fails to parse or is negative. The modern
/// pair (`RateLimit-Remaining` + `RateLimit-Reset`) takes precedence over the
/// legacy `X-RateLimit-Remaining`, which is accepted alone with `reset = 0`.
#[must_use]
pub fn parse_rate_limit_headers(headers: &HeaderMap) -> Option<RateLimitHeaders> {
    let modern_remaining = header_f64(headers, MODERN_REMAINING);
    let modern_reset = header_f64(headers, MODERN_RESET);

    if let (Some(remaining), Some(reset)) = (modern_remaining, modern_reset)
        && remaining >= 0.0
        && reset >= 0.0
    {
        return Some(RateLimitHeaders { remaining, reset });
    }

    if headers.contains_key(MODERN_REMAINING) || headers.contains_key(MODERN_RESET) {
        // Modern headers present but incomplete or invalid: the modern format
        // requires both, so this is "no value" rather than a legacy fallback.
        return None;
    }

    let legacy_remaining = header_f64(headers, LEGACY_REMAINING)?;
    if legacy_remaining < 0.0 {
        return None;
    }

    Some(RateLimitHeaders {
        remaining: legacy_remaining,
        reset: 0.0,
    })
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(
                http::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                http::HeaderValue::from_str(v).unwrap(),
            );
        }
        map
    }

    #[rstest]
    fn test_modern_pair() {
        let h = headers(&[("ratelimit-remaining", "12.5"), ("ratelimit-reset", "30")]);
        let parsed = parse_rate_limit_headers(&h).unwrap();
        assert_eq!(parsed.remaining, 12.5);
        assert_eq!(parsed.reset, 30.0);
    }

    #[rstest]
    fn test_legacy_only() {
        let h = headers(&[("x-ratelimit-remaining", "7")]);
        let parsed = parse_rate_limit_headers(&h).unwrap();
        assert_eq!(parsed.remaining, 7.0);
        assert_eq!(parsed.reset, 0.0);
    }

    #[rstest]
    fn test_modern_wins_over_legacy() {
        let h = headers(&[
            ("ratelimit-remaining", "1"),
            ("ratelimit-reset", "2"),
            ("x-ratelimit-remaining", "99"),
        ]);
        let parsed = parse_rate_limit_headers(&h).unwrap();
        assert_eq!(parsed.remaining, 1.0);
        assert_eq!(parsed.reset, 2.0);
    }

    #[rstest]
    fn test_modern_partial_is_no_value() {
        let h = headers(&[("ratelimit-remaining", "1")]);
        assert!(parse_rate_limit_headers(&h).is_none());
    }

    #[rstest]
    fn test_no_headers_is_no_value() {
        let h = headers(&[]);
        assert!(parse_rate_limit_headers(&h).is_none());
    }

    #[rstest]
    fn test_negative_modern_is_no_value() {
        let h = headers(&[("ratelimit-remaining", "-1"), ("ratelimit-reset", "5")]);
        assert!(parse_rate_limit_headers(&h).is_none());
    }

    #[rstest]
    fn test_unparseable_is_no_value() {
        let h = headers(&[("ratelimit-remaining", "abc"), ("ratelimit-reset", "5")]);
        assert!(parse_rate_limit_headers(&h).is_none());
    }
}
