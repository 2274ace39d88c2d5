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

//! File transfer: a bounded-concurrency manager ([`manager::FileTransferManager`])
//! dispatching [`task::TransferTask`]s to either the parallel HTTP range-download
//! engine ([`http_range`]) or a cloud reference-artifact engine ([`reference`]),
//! with path-traversal defense ([`safe_path`]) shared by both (§3, §4.6-§4.8).

pub mod http_range;
pub mod manager;
pub mod reference;
pub mod safe_path;
pub mod task;

pub use manager::{FileTransferManager, FileTransferStats};
pub use reference::{ObjectAttributes, ObjectStore, ObjectStoreRegistry, ObjectSummary};
pub use task::{TransferKind, TransferTask, VersionId};
