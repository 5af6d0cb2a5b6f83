use std::path::Path;

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use super::paths::relative_local_path;

/// Filesystem activity inside the sync root, expressed with root-relative
/// paths so downstream code never handles absolute paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalChange {
    Modified { path: String },
    Removed { path: String },
    Renamed { from: String, to: String },
}

impl LocalChange {
    /// Key used for per-path coalescing of event bursts.
    pub fn path_key(&self) -> &str {
        match self {
            LocalChange::Modified { path } | LocalChange::Removed { path } => path,
            LocalChange::Renamed { to, .. } => to,
        }
    }
}

/// Starts a recursive notify watcher over the sync root and bridges its
/// events into a tokio channel. The returned watcher must stay alive for the
/// stream to keep flowing.
pub fn start_local_watcher(
    sync_root: &Path,
) -> notify::Result<(RecommendedWatcher, mpsc::UnboundedReceiver<LocalChange>)> {
    let (tx, rx) = mpsc::unbounded_channel();
    let root = sync_root.to_path_buf();
    let mapped_root = root.clone();
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
        if let Ok(event) = result {
            for change in map_event(&mapped_root, event) {
                let _ = tx.send(change);
            }
        }
    })?;
    watcher.watch(&root, RecursiveMode::Recursive)?;
    Ok((watcher, rx))
}

fn map_event(root: &Path, event: Event) -> Vec<LocalChange> {
    match event.kind {
        EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
            if event.paths.len() >= 2 {
                let from = relative_local_path(root, &event.paths[0]);
                let to = relative_local_path(root, &event.paths[1]);
                if let (Some(from), Some(to)) = (from, to) {
                    return vec![LocalChange::Renamed { from, to }];
                }
            }
            // Single-path rename halves are indistinguishable from touch;
            // treating them as modifications lets the scan reconcile later.
            event
                .paths
                .into_iter()
                .filter_map(|path| relative_local_path(root, &path))
                .map(|path| LocalChange::Modified { path })
                .collect()
        }
        EventKind::Create(_) | EventKind::Modify(_) => event
            .paths
            .into_iter()
            .filter_map(|path| relative_local_path(root, &path))
            .map(|path| LocalChange::Modified { path })
            .collect(),
        EventKind::Remove(_) => event
            .paths
            .into_iter()
            .filter_map(|path| relative_local_path(root, &path))
            .map(|path| LocalChange::Removed { path })
            .collect(),
        _ => Vec::new(),
    }
}

/// Drains everything currently buffered on the channel, coalescing repeated
/// events for the same path down to the most recent one. Editors produce
/// bursts of writes per save; hashing once per burst is enough.
pub fn drain_coalesced(rx: &mut mpsc::UnboundedReceiver<LocalChange>) -> Vec<LocalChange> {
    let mut ordered: Vec<LocalChange> = Vec::new();
    while let Ok(change) = rx.try_recv() {
        ordered.retain(|existing| existing.path_key() != change.path_key());
        ordered.push(change);
    }
    ordered
}
