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

//! Cross-cutting progress reporting: a snapshot-readable tree of in-flight
//! operations, each with optional progress and error status.
//!
//! Parent links are weak and child links are strong, so a node detaches in
//! O(1) on finish without an arena or index table: dropping the last strong
//! reference (the parent's child-list entry) frees the subtree unless a
//! caller is still holding its own `Operation` handle.

use std::{
    sync::{
        Arc, Mutex, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

/// A user-facing description of one unit of progress, e.g. bytes transferred
/// out of a known total.
#[derive(Debug)]
pub struct Progress {
    state: Mutex<ProgressState>,
}

#[derive(Debug, Clone)]
struct ProgressState {
    done: u64,
    total: u64,
    unit: Option<String>,
}

/// A point-in-time read of a [`Progress`] value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    /// Units completed so far.
    pub done: u64,
    /// Total units expected, if known.
    pub total: u64,
    /// Unit label (e.g. `"files"`), unset for a plain byte count.
    pub unit: Option<String>,
}

impl Progress {
    fn new() -> Self {
        Self {
            state: Mutex::new(ProgressState {
                done: 0,
                total: 0,
                unit: None,
            }),
        }
    }

    /// Reports `done` of `total` bytes.
    pub fn set_bytes_of_total(&self, done: u64, total: u64) {
        let mut state = self.state.lock().expect("progress mutex poisoned");
        state.done = done;
        state.total = total;
        state.unit = None;
    }

    /// Reports `done` of `total` in an arbitrary unit (e.g. `"objects"`).
    pub fn set_units_of_total(&self, done: u64, total: u64, unit: impl Into<String>) {
        let mut state = self.state.lock().expect("progress mutex poisoned");
        state.done = done;
        state.total = total;
        state.unit = Some(unit.into());
    }

    /// Reads the current progress.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().expect("progress mutex poisoned");
        ProgressSnapshot {
            done: state.done,
            total: state.total,
            unit: state.unit.clone(),
        }
    }
}

struct NodeState {
    desc: String,
    error_status: Option<String>,
    progress: Option<Arc<Progress>>,
    children: Vec<Arc<OperationNode>>,
}

struct OperationNode {
    start_time: Instant,
    parent: Option<Weak<OperationNode>>,
    tree_roots: Weak<Mutex<Vec<Arc<OperationNode>>>>,
    finished: AtomicBool,
    state: Mutex<NodeState>,
}

/// A handle to one node in an [`OperationTree`].
///
/// Cloning shares the same underlying node; [`Self::finish`] is idempotent and
/// detaches the node from its parent (or the tree root) exactly once.
#[derive(Clone)]
pub struct Operation(Arc<OperationNode>);

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.0.state.lock().expect("operation mutex poisoned");
        f.debug_struct("Operation")
            .field("desc", &state.desc)
            .field("finished", &self.0.finished.load(Ordering::SeqCst))
            .finish()
    }
}

impl Operation {
    fn new(
        desc: String,
        parent: Option<Weak<OperationNode>>,
        tree_roots: Weak<Mutex<Vec<Arc<OperationNode>>>>,
    ) -> Self {
        Self(Arc::new(OperationNode {
            start_time: Instant::now(),
            parent,
            tree_roots,
            finished: AtomicBool::new(false),
            state: Mutex::new(NodeState {
                desc,
                error_status: None,
                progress: None,
                children: Vec::new(),
            }),
        }))
    }

    /// Creates a child operation under this one.
    #[must_use]
    pub fn subtask(&self, desc: impl Into<String>) -> Self {
        let child = Self::new(
            desc.into(),
            Some(Arc::downgrade(&self.0)),
            self.0.tree_roots.clone(),
        );
        self.0
            .state
            .lock()
            .expect("operation mutex poisoned")
            .children
            .push(child.0.clone());
        child
    }

    /// Attaches (or returns the existing) progress tracker for this operation.
    #[must_use]
    pub fn new_progress(&self) -> Arc<Progress> {
        let mut state = self.0.state.lock().expect("operation mutex poisoned");
        state.progress.get_or_insert_with(|| Arc::new(Progress::new())).clone()
    }

    /// Sets a short human-readable error status, e.g. `"retrying HTTP 503 Service Unavailable"`.
    pub fn set_error_status(&self, status: impl Into<String>) {
        self.0.state.lock().expect("operation mutex poisoned").error_status = Some(status.into());
    }

    /// Clears the error status, e.g. after a retry succeeds.
    pub fn clear_error_status(&self) {
        self.0.state.lock().expect("operation mutex poisoned").error_status = None;
    }

    /// Detaches this operation from its parent (or the tree root). Safe to
    /// call more than once; only the first call has an effect.
    pub fn finish(&self) {
        if self.0.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(parent) = self.0.parent.as_ref().and_then(Weak::upgrade) {
            let mut state = parent.state.lock().expect("operation mutex poisoned");
            state.children.retain(|child| !Arc::ptr_eq(child, &self.0));
        } else if let Some(roots) = self.0.tree_roots.upgrade() {
            let mut roots = roots.lock().expect("operation tree mutex poisoned");
            roots.retain(|root| !Arc::ptr_eq(root, &self.0));
        }
    }

    fn snapshot(&self) -> OperationSnapshot {
        let state = self.0.state.lock().expect("operation mutex poisoned");
        OperationSnapshot {
            desc: state.desc.clone(),
            elapsed: self.0.start_time.elapsed(),
            error_status: state.error_status.clone(),
            progress: state.progress.as_ref().map(|p| p.snapshot()),
            children: state.children.iter().map(|c| Operation(c.clone()).snapshot()).collect(),
        }
    }
}

/// A point-in-time, recursive read of one [`Operation`] and its subtasks.
#[derive(Debug, Clone)]
pub struct OperationSnapshot {
    /// The operation's description.
    pub desc: String,
    /// Time elapsed since the operation was created.
    pub elapsed: std::time::Duration,
    /// Current error status, if any.
    pub error_status: Option<String>,
    /// Current progress, if attached.
    pub progress: Option<ProgressSnapshot>,
    /// Snapshots of this operation's subtasks, in creation order.
    pub children: Vec<OperationSnapshot>,
}

/// A snapshot of an entire [`OperationTree`]: one entry per root operation.
#[derive(Debug, Clone)]
pub struct OperationStats {
    /// Root-level operation snapshots, in creation order.
    pub roots: Vec<OperationSnapshot>,
}

/// A concurrently-readable tree of in-flight operations, rooted at a list of
/// top-level operations each caller creates independently.
#[derive(Debug, Default)]
pub struct OperationTree {
    roots: Arc<Mutex<Vec<Arc<OperationNode>>>>,
}

impl OperationTree {
    /// Creates an empty tree.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new root-level operation.
    #[must_use]
    pub fn new_operation(&self, desc: impl Into<String>) -> Operation {
        let op = Operation::new(desc.into(), None, Arc::downgrade(&self.roots));
        self.roots.lock().expect("operation tree mutex poisoned").push(op.0.clone());
        op
    }

    /// Reads the whole tree without blocking writers for longer than the snapshot itself.
    #[must_use]
    pub fn snapshot(&self) -> OperationStats {
        let roots = self.roots.lock().expect("operation tree mutex poisoned");
        OperationStats {
            roots: roots.iter().map(|r| Operation(r.clone()).snapshot()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn test_subtask_appears_in_snapshot() {
        let tree = OperationTree::new();
        let root = tree.new_operation("upload run");
        let child = root.subtask("upload file.txt");
        child.new_progress().set_bytes_of_total(50, 100);

        let stats = tree.snapshot();
        assert_eq!(stats.roots.len(), 1);
        assert_eq!(stats.roots[0].children.len(), 1);
        assert_eq!(stats.roots[0].children[0].progress.as_ref().unwrap().done, 50);
    }

    #[rstest]
    fn test_finish_removes_exactly_once() {
        let tree = OperationTree::new();
        let root = tree.new_operation("upload run");
        let child = root.subtask("upload file.txt");

        child.finish();
        assert_eq!(tree.snapshot().roots[0].children.len(), 0);

        // Calling finish again must not panic or double-remove anything else.
        child.finish();
        assert_eq!(tree.snapshot().roots[0].children.len(), 0);

        root.finish();
        assert_eq!(tree.snapshot().roots.len(), 0);
    }

    #[rstest]
    fn test_error_status_set_and_cleared() {
        let tree = OperationTree::new();
        let root = tree.new_operation("filestream");
        root.set_error_status("retrying HTTP 503 Service Unavailable");
        assert_eq!(
            tree.snapshot().roots[0].error_status.as_deref(),
            Some("retrying HTTP 503 Service Unavailable")
        );
        root.clear_error_status();
        assert!(tree.snapshot().roots[0].error_status.is_none());
    }
}
