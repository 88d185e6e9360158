//! Directory entries as streams.
//!
//! Every directory handle is held by a [`ScopedResource`] on the stack of
//! the drive that opened it, so a consumer that stops part-way through a
//! (possibly deep) traversal closes every handle the traversal still held.

use std::cell::Cell;
use std::fs::ReadDir;
use std::io;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{Error, Result};
use crate::fs;
use crate::matcher::Matcher;
use crate::scope::ScopedResource;
use crate::stream::{Flow, Stream};

thread_local! {
    static OPEN_HANDLES: Cell<usize> = const { Cell::new(0) };
}

/// Directory handles currently open on the calling thread.
pub fn open_handles() -> usize {
    OPEN_HANDLES.with(Cell::get)
}

/// Open `path` for iteration. `None` when permission is denied.
fn open_dir(path: &Path) -> Result<Option<ScopedResource<ReadDir>>> {
    let handle = match std::fs::read_dir(path) {
        Ok(handle) => handle,
        Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
            debug!("skipping unreadable directory {}", path.display());
            return Ok(None);
        }
        Err(source) => {
            return Err(Error::ReadDir {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    OPEN_HANDLES.with(|n| n.set(n.get() + 1));
    let label = format!("directory handle {}", path.display());
    Ok(Some(ScopedResource::acquire(label, handle, |handle| {
        drop(handle);
        OPEN_HANDLES.with(|n| n.set(n.get() - 1));
    })))
}

/// Immediate entries of `path`, joined onto it, in the order the OS
/// returns them. Never yields `.` or `..`. An unreadable directory yields
/// nothing.
pub fn list(path: impl Into<PathBuf>) -> Stream<PathBuf> {
    let path = path.into();
    Stream::new(move |sink| {
        let Some(mut handle) = open_dir(&path)? else {
            return Ok(Flow::Continue(()));
        };
        for entry in &mut *handle {
            let entry = entry.map_err(|source| Error::ReadDir {
                path: path.clone(),
                source,
            })?;
            if sink(entry.path())?.is_break() {
                return Ok(Flow::Break(()));
            }
        }
        handle.release();
        Ok(Flow::Continue(()))
    })
}

/// Every entry under `path`, depth-first pre-order: each entry is yielded
/// before its descendants, and descendants before the next sibling.
///
/// Symlinks to directories are yielded but not followed.
pub fn recursive_list(path: impl Into<PathBuf>) -> Stream<PathBuf> {
    list(path).then(|child| {
        let below = child.clone();
        Stream::once(child).concat(Stream::new(move |sink| {
            if fs::is_real_directory(&below) {
                recursive_list(below.clone()).drive(sink)
            } else {
                Ok(Flow::Continue(()))
            }
        }))
    })
}

/// Entries under `root` whose text form contains at least one match.
/// Paths that are not valid text are skipped.
pub fn find<M>(matcher: M, root: impl Into<PathBuf>) -> Stream<PathBuf>
where
    M: Matcher + Send + Sync + 'static,
{
    recursive_list(root).filter(move |path| fs::to_text(path).is_some_and(|text| matcher.is_match(text)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matcher::Literal;
    use std::collections::HashSet;

    /// root/
    ///   a.txt
    ///   sub/
    ///     b.txt
    ///     deeper/
    ///       c.log
    ///   empty/
    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("a.txt"), "a").unwrap();
        std::fs::create_dir_all(root.join("sub/deeper")).unwrap();
        std::fs::write(root.join("sub/b.txt"), "b").unwrap();
        std::fs::write(root.join("sub/deeper/c.log"), "c").unwrap();
        std::fs::create_dir(root.join("empty")).unwrap();
        dir
    }

    fn rel(root: &Path, paths: Vec<PathBuf>) -> Vec<String> {
        paths
            .into_iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn list_yields_children_joined_onto_base() {
        let dir = fixture();
        let got = list(dir.path()).to_vec().unwrap();
        assert!(got.iter().all(|p| p.parent() == Some(dir.path())));
        let names: HashSet<_> = rel(dir.path(), got).into_iter().collect();
        let expected: HashSet<_> = ["a.txt", "sub", "empty"].map(String::from).into();
        assert_eq!(names, expected);
    }

    #[test]
    fn list_missing_directory_is_error() {
        let dir = fixture();
        let result = list(dir.path().join("missing")).to_vec();
        assert!(matches!(result, Err(Error::ReadDir { .. })));
        assert_eq!(open_handles(), 0);
    }

    #[test]
    fn recursive_list_is_preorder_and_complete() {
        let dir = fixture();
        let got = rel(dir.path(), recursive_list(dir.path()).to_vec().unwrap());
        assert_eq!(got.len(), 6);
        let unique: HashSet<_> = got.iter().cloned().collect();
        assert_eq!(unique.len(), got.len());
        assert!(!got.iter().any(|p| p.ends_with("/.") || p.ends_with("/..")));

        let pos = |name: &str| got.iter().position(|p| p == name).unwrap();
        assert!(pos("sub") < pos("sub/b.txt"));
        assert!(pos("sub") < pos("sub/deeper"));
        assert!(pos("sub/deeper") < pos("sub/deeper/c.log"));
        // Descendants of `sub` are contiguous right after it.
        let sub = pos("sub");
        let block: HashSet<_> = got[sub + 1..sub + 4].iter().cloned().collect();
        let expected: HashSet<_> = ["sub/b.txt", "sub/deeper", "sub/deeper/c.log"]
            .map(String::from)
            .into();
        assert_eq!(block, expected);
    }

    #[test]
    fn find_matches_text_form() {
        let dir = fixture();
        let found = rel(dir.path(), find(Literal::new(".txt"), dir.path()).to_vec().unwrap());
        let found: HashSet<_> = found.into_iter().collect();
        let expected: HashSet<_> = ["a.txt", "sub/b.txt"].map(String::from).into();
        assert_eq!(found, expected);
    }

    #[test]
    fn find_equals_filtered_recursive_list() {
        let dir = fixture();
        let matcher = Literal::new("e");
        let all = recursive_list(dir.path()).to_vec().unwrap();
        let filtered: Vec<_> = all
            .into_iter()
            .filter(|p| matcher.is_match(p.to_str().unwrap()))
            .collect();
        let found = find(matcher, dir.path()).to_vec().unwrap();
        assert_eq!(found, filtered);
    }

    #[test]
    fn abandoning_traversal_closes_handles() {
        let dir = fixture();
        let baseline = open_handles();
        let got = recursive_list(dir.path()).limit(4).to_vec().unwrap();
        assert_eq!(got.len(), 4);
        assert_eq!(open_handles(), baseline);
    }

    #[test]
    fn abandoning_root_traversal_closes_handles() {
        let baseline = open_handles();
        // Entries under /proc can vanish mid-walk; either ending must close
        // every handle.
        if let Ok(got) = recursive_list("/").limit(50).count() {
            assert!(got <= 50);
        }
        assert_eq!(open_handles(), baseline);
    }

    #[cfg(unix)]
    #[test]
    fn unreadable_directory_is_empty() {
        use std::os::unix::fs::PermissionsExt;
        let dir = fixture();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        std::fs::write(locked.join("secret"), "s").unwrap();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        let readable_anyway = std::fs::read_dir(&locked).is_ok();
        let got = list(&locked).to_vec();
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        // Root ignores permission bits; only check when they apply.
        if !readable_anyway {
            assert!(got.unwrap().is_empty());
        }
    }

    #[cfg(unix)]
    #[test]
    fn symlink_cycles_are_not_followed() {
        let dir = fixture();
        std::os::unix::fs::symlink(dir.path(), dir.path().join("sub/loop")).unwrap();
        let got = rel(dir.path(), recursive_list(dir.path()).to_vec().unwrap());
        assert_eq!(got.len(), 7);
        assert!(got.contains(&"sub/loop".to_string()));
    }
}
