use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path escapes the sync root")]
    Traversal,
}

/// Maps a sync-root-relative path ("clips/a.mp4", `/`-separated) onto the
/// filesystem, rejecting anything that would escape the root.
pub fn absolute_local_path(sync_root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    if relative.is_empty() {
        return Err(PathError::Empty);
    }
    let mut out = sync_root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::RootDir | Component::CurDir => continue,
            Component::ParentDir | Component::Prefix(_) => return Err(PathError::Traversal),
        }
    }
    Ok(out)
}

/// Inverse of `absolute_local_path`: `/`-separated and root-relative, or
/// `None` for paths outside the sync root.
pub fn relative_local_path(sync_root: &Path, absolute: &Path) -> Option<String> {
    let relative = absolute.strip_prefix(sync_root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// Remote object key for a tracked file: the configured prefix plus the
/// root-relative path.
pub fn remote_path_for(prefix: &str, relative: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    format!("{prefix}/{relative}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_map_under_the_root() {
        let root = PathBuf::from("/work/project");
        assert_eq!(
            absolute_local_path(&root, "clips/a.mp4").unwrap(),
            PathBuf::from("/work/project/clips/a.mp4")
        );
    }

    #[test]
    fn parent_components_are_rejected() {
        let root = PathBuf::from("/work/project");
        assert!(matches!(
            absolute_local_path(&root, "../outside"),
            Err(PathError::Traversal)
        ));
        assert!(matches!(
            absolute_local_path(&root, "a/../../b"),
            Err(PathError::Traversal)
        ));
        assert!(matches!(absolute_local_path(&root, ""), Err(PathError::Empty)));
    }

    #[test]
    fn absolute_paths_map_back_to_relative() {
        let root = PathBuf::from("/work/project");
        assert_eq!(
            relative_local_path(&root, Path::new("/work/project/clips/a.mp4")),
            Some("clips/a.mp4".to_string())
        );
        assert_eq!(relative_local_path(&root, Path::new("/elsewhere/x")), None);
        assert_eq!(relative_local_path(&root, Path::new("/work/project")), None);
    }

    #[test]
    fn remote_keys_join_prefix_and_relative_path() {
        assert_eq!(remote_path_for("/media/", "clips/a.mp4"), "/media/clips/a.mp4");
        assert_eq!(remote_path_for("/media", "clips/a.mp4"), "/media/clips/a.mp4");
    }
}
