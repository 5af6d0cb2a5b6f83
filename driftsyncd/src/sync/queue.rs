use std::collections::{HashMap, HashSet};

use super::metadata::FileMetadata;

/// Work item kinds executed against the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationKind {
    Upload,
    Download,
    Delete,
    Move { to_remote: String },
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Upload => "upload",
            OperationKind::Download => "download",
            OperationKind::Delete => "delete",
            OperationKind::Move { .. } => "move",
        }
    }
}

/// One unit of queued work, bound to a point-in-time metadata snapshot.
///
/// The snapshot is deliberately not a live reference: the engine may move a
/// file forward while an older operation is still queued, and the operation
/// must describe the state it was created for.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncOperation {
    pub id: i64,
    pub kind: OperationKind,
    pub snapshot: FileMetadata,
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub created_at: i64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub error: Option<String>,
    pub progress: f64,
    pub depends_on: Vec<i64>,
    /// Unix milliseconds before which the operation must not run (retry
    /// gate). Millisecond resolution keeps short backoffs meaningful.
    pub not_before: Option<i64>,
}

impl SyncOperation {
    pub fn new(
        id: i64,
        kind: OperationKind,
        snapshot: FileMetadata,
        priority: i32,
        max_retries: u32,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            kind,
            snapshot,
            priority,
            retry_count: 0,
            max_retries,
            created_at,
            started_at: None,
            completed_at: None,
            error: None,
            progress: 0.0,
            depends_on: Vec::new(),
            not_before: None,
        }
    }
}

/// Priority queue over pending operations.
///
/// Claim order is priority descending, then operation id ascending (creation
/// order). An operation is only claimable when its retry gate has passed, all
/// its dependencies completed, and no operation for the same file is running
/// — the caller supplies the running set, the queue enforces the rest.
#[derive(Debug, Default)]
pub struct OperationQueue {
    pending: Vec<SyncOperation>,
    completed: HashSet<i64>,
    failed: HashSet<i64>,
}

impl OperationQueue {
    pub fn push(&mut self, op: SyncOperation) {
        self.pending.push(op);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn claim(&mut self, now: i64, running_files: &HashSet<String>) -> Option<SyncOperation> {
        let mut best: Option<usize> = None;
        for (index, op) in self.pending.iter().enumerate() {
            if op.not_before.is_some_and(|gate| gate > now) {
                continue;
            }
            if running_files.contains(&op.snapshot.file_id) {
                continue;
            }
            if !op
                .depends_on
                .iter()
                .all(|dep| self.completed.contains(dep))
            {
                continue;
            }
            best = match best {
                None => Some(index),
                Some(current) => {
                    let cur = &self.pending[current];
                    if (op.priority, -op.id) > (cur.priority, -cur.id) {
                        Some(index)
                    } else {
                        Some(current)
                    }
                }
            };
        }
        best.map(|index| self.pending.remove(index))
    }

    pub fn mark_completed(&mut self, id: i64) {
        self.completed.insert(id);
    }

    pub fn mark_failed(&mut self, id: i64) {
        self.failed.insert(id);
    }

    /// Operations that can never run because a dependency failed for good.
    /// The caller fails them explicitly instead of letting them starve.
    pub fn take_dependency_casualties(&mut self) -> Vec<SyncOperation> {
        let failed = &self.failed;
        let (dead, alive): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|op| op.depends_on.iter().any(|dep| failed.contains(dep)));
        self.pending = alive;
        dead
    }

    /// Earliest future retry gate, for idle-sleep sizing.
    pub fn next_gate_after(&self, now: i64) -> Option<i64> {
        self.pending
            .iter()
            .filter_map(|op| op.not_before)
            .filter(|gate| *gate > now)
            .min()
    }

    /// Drops every queued operation for a file (used when the file itself is
    /// deleted out from under its queue entries).
    pub fn purge_file(&mut self, file_id: &str) -> Vec<SyncOperation> {
        let (purged, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending)
            .into_iter()
            .partition(|op| op.snapshot.file_id == file_id);
        self.pending = kept;
        purged
    }

    pub fn pending_kinds_for(&self, file_id: &str) -> HashMap<i64, &'static str> {
        self.pending
            .iter()
            .filter(|op| op.snapshot.file_id == file_id)
            .map(|op| (op.id, op.kind.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::metadata::FileMetadata;

    fn snapshot(file_id: &str) -> FileMetadata {
        let mut meta = FileMetadata::new_local("a.txt", "/a.txt", 1, "h", 0, 4, 0);
        meta.file_id = file_id.to_string();
        meta
    }

    fn op(id: i64, file_id: &str, priority: i32) -> SyncOperation {
        SyncOperation::new(id, OperationKind::Upload, snapshot(file_id), priority, 3, 0)
    }

    #[test]
    fn claims_by_priority_then_fifo() {
        let mut queue = OperationQueue::default();
        queue.push(op(1, "a", 0));
        queue.push(op(2, "b", 10));
        queue.push(op(3, "c", 10));

        let running = HashSet::new();
        assert_eq!(queue.claim(0, &running).unwrap().id, 2);
        assert_eq!(queue.claim(0, &running).unwrap().id, 3);
        assert_eq!(queue.claim(0, &running).unwrap().id, 1);
        assert!(queue.claim(0, &running).is_none());
    }

    #[test]
    fn never_claims_a_file_that_is_running() {
        let mut queue = OperationQueue::default();
        queue.push(op(1, "a", 10));
        queue.push(op(2, "a", 10));
        queue.push(op(3, "b", 0));

        let mut running = HashSet::new();
        let first = queue.claim(0, &running).unwrap();
        assert_eq!(first.id, 1);
        running.insert(first.snapshot.file_id.clone());

        // The higher-priority sibling for file "a" is skipped while it runs.
        let next = queue.claim(0, &running).unwrap();
        assert_eq!(next.id, 3);
        assert!(queue.claim(0, &running).is_none());

        running.clear();
        assert_eq!(queue.claim(0, &running).unwrap().id, 2);
    }

    #[test]
    fn retry_gate_defers_claims() {
        let mut queue = OperationQueue::default();
        let mut gated = op(1, "a", 10);
        gated.not_before = Some(100);
        queue.push(gated);

        let running = HashSet::new();
        assert!(queue.claim(99, &running).is_none());
        assert_eq!(queue.next_gate_after(99), Some(100));
        assert_eq!(queue.claim(100, &running).unwrap().id, 1);
    }

    #[test]
    fn dependencies_hold_operations_back_until_completed() {
        let mut queue = OperationQueue::default();
        queue.push(op(1, "a", 0));
        let mut dependent = op(2, "a", 100);
        dependent.depends_on = vec![1];
        queue.push(dependent);

        let running = HashSet::new();
        // Despite the higher priority, the dependent op waits for op 1.
        assert_eq!(queue.claim(0, &running).unwrap().id, 1);
        assert!(queue.claim(0, &running).is_none());
        queue.mark_completed(1);
        assert_eq!(queue.claim(0, &running).unwrap().id, 2);
    }

    #[test]
    fn failed_dependencies_surface_their_casualties() {
        let mut queue = OperationQueue::default();
        let mut dependent = op(2, "a", 0);
        dependent.depends_on = vec![1];
        queue.push(dependent);
        queue.push(op(3, "b", 0));

        queue.mark_failed(1);
        let dead = queue.take_dependency_casualties();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].id, 2);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn purge_removes_all_operations_for_a_file() {
        let mut queue = OperationQueue::default();
        queue.push(op(1, "a", 0));
        queue.push(op(2, "a", 5));
        queue.push(op(3, "b", 0));

        let purged = queue.purge_file("a");
        assert_eq!(purged.len(), 2);
        assert_eq!(queue.len(), 1);
    }
}
