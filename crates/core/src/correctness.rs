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

//! Functions for correctness checks similar to the *design by contract* philosophy.
//!
//! A condition is a predicate which must be true just prior to the execution of
//! some section of code, for correct behavior as per the component's design.
//! Every check here returns an [`anyhow::Result`] with a descriptive message on
//! failure rather than panicking, so construction-time validation (for example
//! `BackendConfig` or `ClientOptions`) can surface a `ConfigurationError` to the
//! caller instead of aborting the process.

/// Checks that `s` is not empty.
///
/// # Errors
///
/// Returns an error if `s` is empty.
#[inline]
pub fn check_nonempty_string<T: AsRef<str>>(s: T, param: &str) -> anyhow::Result<()> {
    if s.as_ref().is_empty() {
        anyhow::bail!("invalid string for '{param}', was empty");
    }
    Ok(())
}

/// Checks that `min <= max`.
///
/// # Errors
///
/// Returns an error if `min > max`.
#[inline]
pub fn check_ordered<T: PartialOrd + std::fmt::Display>(
    min: T,
    max: T,
    min_param: &str,
    max_param: &str,
) -> anyhow::Result<()> {
    if min > max {
        anyhow::bail!("'{min_param}' ({min}) must be <= '{max_param}' ({max})");
    }
    Ok(())
}

/// Checks that `url` parses as an absolute URL with scheme `http` or `https`.
///
/// # Errors
///
/// Returns an error if the URL fails to parse or uses an unsupported scheme.
pub fn check_http_url(url: &str, param: &str) -> anyhow::Result<url::Url> {
    check_nonempty_string(url, param)?;
    let parsed = url::Url::parse(url)
        .map_err(|e| anyhow::anyhow!("invalid URL for '{param}': {url} ({e})"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        anyhow::bail!(
            "invalid scheme for '{param}': expected http or https, was '{}'",
            parsed.scheme()
        );
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_check_nonempty_string_ok() {
        assert!(check_nonempty_string("value", "param").is_ok());
    }

    #[rstest]
    fn test_check_nonempty_string_empty() {
        let err = check_nonempty_string("", "param").unwrap_err();
        assert!(err.to_string().contains("param"));
    }

    #[rstest]
    fn test_check_ordered_ok() {
        assert!(check_ordered(1, 2, "min", "max").is_ok());
        assert!(check_ordered(2, 2, "min", "max").is_ok());
    }

    #[rstest]
    fn test_check_ordered_violated() {
        assert!(check_ordered(3, 2, "min", "max").is_err());
    }

    #[rstest]
    fn test_check_http_url_ok() {
        assert!(check_http_url("https://api.example.com", "base_url").is_ok());
    }

    #[rstest]
    fn test_check_http_url_bad_scheme() {
        assert!(check_http_url("ftp://api.example.com", "base_url").is_err());
    }

    #[rstest]
    fn test_check_http_url_empty() {
        assert!(check_http_url("", "base_url").is_err());
    }
}
