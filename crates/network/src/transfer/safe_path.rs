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

//! Path-traversal defense for reference-artifact downloads (§4.8).
//!
//! An object key returned by a cloud list operation is attacker-influenced (it
//! mirrors whatever is in the bucket): before writing anything under a
//! caller-chosen base directory, every relative path is checked lexically,
//! never by touching the filesystem.

use std::path::{Component, Path, PathBuf};

use crate::http::TransferError;

/// Strips `root_prefix` from `object_key` and validates the remainder is a
/// safe relative path: non-empty when `require_nonempty` (prefix downloads
/// enumerate more than one object, each needing a distinct destination), not
/// absolute, and containing no `..` component.
///
/// # Errors
///
/// Returns [`TransferError::PathTraversal`] if the relative path escapes
/// `root_prefix`, is empty when one is required, or is absolute.
pub fn safe_relative_path(
    object_key: &str,
    root_prefix: &str,
    require_nonempty: bool,
) -> Result<PathBuf, TransferError> {
    let relative = object_key.strip_prefix(root_prefix).unwrap_or(object_key);
    let relative = relative.trim_start_matches('/');

    if require_nonempty && relative.is_empty() {
        return Err(TransferError::PathTraversal {
            base: root_prefix.to_string(),
            relative: relative.to_string(),
        });
    }

    let candidate = Path::new(relative);
    let escapes = candidate.is_absolute()
        || candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_) | Component::RootDir));

    if escapes {
        return Err(TransferError::PathTraversal {
            base: root_prefix.to_string(),
            relative: relative.to_string(),
        });
    }

    Ok(candidate.to_path_buf())
}

/// Joins `relative` onto `base`, re-verifying lexical containment after the
/// join (belt-and-braces alongside [`safe_relative_path`], which already
/// rejected `..` components and absolute paths).
///
/// # Errors
///
/// Returns [`TransferError::PathTraversal`] if the joined path is not
/// lexically prefixed by `base`.
pub fn join_within_base(base: &Path, relative: &Path) -> Result<PathBuf, TransferError> {
    let joined = base.join(relative);
    let base_components: Vec<_> = base.components().collect();
    let joined_components: Vec<_> = joined.components().collect();

    if !joined_components.starts_with(&base_components) {
        return Err(TransferError::PathTraversal {
            base: base.display().to_string(),
            relative: relative.display().to_string(),
        });
    }

    Ok(joined)
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_legit_relative_path_accepted() {
        let relative = safe_relative_path("prefix/legit.txt", "prefix/", true).unwrap();
        assert_eq!(relative, Path::new("legit.txt"));
    }

    #[rstest]
    fn test_traversal_rejected() {
        // Scenario 6 from the spec: a prefix-list enumerating a `../../../etc/passwd` key.
        let err = safe_relative_path("prefix/../../../etc/passwd", "prefix/", true).unwrap_err();
        assert!(matches!(err, TransferError::PathTraversal { .. }));
    }

    #[rstest]
    fn test_absolute_key_rejected() {
        let err = safe_relative_path("/etc/passwd", "prefix/", false).unwrap_err();
        assert!(matches!(err, TransferError::PathTraversal { .. }));
    }

    #[rstest]
    fn test_empty_relative_rejected_for_prefix_downloads() {
        let err = safe_relative_path("prefix/", "prefix/", true).unwrap_err();
        assert!(matches!(err, TransferError::PathTraversal { .. }));
    }

    #[rstest]
    fn test_empty_relative_allowed_for_single_file() {
        // A single-file task's key equals its own prefix; that is fine, it
        // is the caller's job to supply the destination file name.
        assert!(safe_relative_path("object.bin", "object.bin", false).is_ok());
    }

    #[rstest]
    fn test_join_within_base_rejects_escape() {
        let base = Path::new("/tmp/downloads/run1");
        let err = join_within_base(base, Path::new("../../etc/passwd")).unwrap_err();
        assert!(matches!(err, TransferError::PathTraversal { .. }));
    }

    #[rstest]
    fn test_join_within_base_accepts_nested() {
        let base = Path::new("/tmp/downloads/run1");
        let joined = join_within_base(base, Path::new("sub/dir/file.txt")).unwrap();
        assert_eq!(joined, Path::new("/tmp/downloads/run1/sub/dir/file.txt"));
    }
}
