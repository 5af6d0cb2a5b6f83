use serde::{Deserialize, Serialize};

/// How the two histories diverged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictType {
    ContentMismatch,
    DeleteVsModify,
}

impl ConflictType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictType::ContentMismatch => "content-mismatch",
            ConflictType::DeleteVsModify => "delete-vs-modify",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "content-mismatch" => Some(ConflictType::ContentMismatch),
            "delete-vs-modify" => Some(ConflictType::DeleteVsModify),
            _ => None,
        }
    }
}

/// Session-configured policy applied when a conflict is detected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConflictResolution {
    NewerWins,
    LargerWins,
    Manual,
    KeepBoth,
}

impl ConflictResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictResolution::NewerWins => "newer-wins",
            ConflictResolution::LargerWins => "larger-wins",
            ConflictResolution::Manual => "manual",
            ConflictResolution::KeepBoth => "keep-both",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "newer-wins" => Some(ConflictResolution::NewerWins),
            "larger-wins" => Some(ConflictResolution::LargerWins),
            "manual" => Some(ConflictResolution::Manual),
            "keep-both" => Some(ConflictResolution::KeepBoth),
            _ => None,
        }
    }
}

/// Point-in-time view of one side of a conflict, persisted alongside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSnapshot {
    pub content_hash: Option<String>,
    pub modified_at: i64,
    pub size_bytes: u64,
}

/// What a policy decided to do about a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionOutcome {
    /// Local wins: upload over the remote.
    KeepLocal,
    /// Remote wins: download over the local copy.
    KeepRemote,
    /// Manual policy: the conflict stays open for external resolution.
    LeaveOpen,
    /// Both survive: the local copy is renamed and tracked as a new file.
    KeepBoth { renamed_local: String },
}

/// Divergence test, independent of any resolution policy and of which side's
/// timestamp is later.
///
/// A locally modified file conflicts when the remote no longer matches the
/// hash we last synced against — the remote moved while we weren't looking —
/// unless both sides happen to have converged on identical content. With no
/// common base at all, differing content is a conflict by definition.
pub fn is_divergent(
    last_synced_hash: Option<&str>,
    local_hash: &str,
    remote_hash: &str,
) -> bool {
    if local_hash == remote_hash {
        return false;
    }
    match last_synced_hash {
        Some(base) => remote_hash != base,
        None => true,
    }
}

/// Applies the session policy. Exact metric ties prefer local, which avoids
/// a transfer that would change nothing meaningful.
pub fn resolve(
    policy: ConflictResolution,
    path: &str,
    local: &SideSnapshot,
    remote: &SideSnapshot,
) -> ResolutionOutcome {
    match policy {
        ConflictResolution::Manual => ResolutionOutcome::LeaveOpen,
        ConflictResolution::NewerWins => {
            if local.modified_at >= remote.modified_at {
                ResolutionOutcome::KeepLocal
            } else {
                ResolutionOutcome::KeepRemote
            }
        }
        ConflictResolution::LargerWins => {
            if local.size_bytes >= remote.size_bytes {
                ResolutionOutcome::KeepLocal
            } else {
                ResolutionOutcome::KeepRemote
            }
        }
        ConflictResolution::KeepBoth => ResolutionOutcome::KeepBoth {
            renamed_local: conflict_copy_path(path, local.modified_at),
        },
    }
}

/// `notes.txt` -> `notes (conflict 1700000000).txt`; extensionless names get
/// the suffix appended.
pub fn conflict_copy_path(path: &str, stamp: i64) -> String {
    let (dir, name) = match path.rsplit_once('/') {
        Some((dir, name)) => (format!("{dir}/"), name),
        None => (String::new(), path),
    };
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{dir}{stem} (conflict {stamp}).{ext}"),
        _ => format!("{dir}{name} (conflict {stamp})"),
    }
}
