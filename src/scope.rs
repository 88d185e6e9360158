//! Acquire-with-guaranteed-release wrapper for external handles.
//!
//! A [`ScopedResource`] pairs a value with the action that gives it back to
//! the OS. The action runs exactly once: either when the owner calls
//! [`ScopedResource::release`], or when the wrapper is dropped. Dropping
//! covers every other exit path of the owning scope: `?` propagation, a
//! consumer that stops pulling a stream early, and unwinding.

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::ops::{Deref, DerefMut};
use std::path::Path;

use log::{debug, warn};
use tempfile::{NamedTempFile, TempDir};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::fs::{self, Mode};

type Release<V> = Box<dyn FnOnce(V)>;

/// A value that must be released exactly once.
pub struct ScopedResource<V> {
    label: String,
    value: Option<V>,
    release: Option<Release<V>>,
}

impl<V> ScopedResource<V> {
    /// Wrap an already-acquired value together with its release action.
    pub fn acquire(label: impl Into<String>, value: V, release: impl FnOnce(V) + 'static) -> Self {
        let label = label.into();
        debug!("acquired {label}");
        Self {
            label,
            value: Some(value),
            release: Some(Box::new(release)),
        }
    }

    /// Human-readable description used in logs.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Run the release action now. Consumes the wrapper, so a second
    /// release cannot be expressed.
    pub fn release(mut self) {
        self.fire();
    }

    /// Disarm the wrapper and hand the raw value back to the caller, who
    /// becomes responsible for shutting it down.
    pub fn into_inner(mut self) -> V {
        self.release = None;
        debug!("disarmed {}", self.label);
        // Only `fire` and this method take the value, and both consume or
        // drop `self`, so the value is still present here.
        match self.value.take() {
            Some(v) => v,
            None => unreachable!("scoped resource value taken twice"),
        }
    }

    fn fire(&mut self) {
        if let (Some(value), Some(release)) = (self.value.take(), self.release.take()) {
            debug!("releasing {}", self.label);
            release(value);
        }
    }
}

impl<V> Deref for ScopedResource<V> {
    type Target = V;

    fn deref(&self) -> &V {
        match &self.value {
            Some(v) => v,
            None => unreachable!("scoped resource used after release"),
        }
    }
}

impl<V> DerefMut for ScopedResource<V> {
    fn deref_mut(&mut self) -> &mut V {
        match &mut self.value {
            Some(v) => v,
            None => unreachable!("scoped resource used after release"),
        }
    }
}

impl<V> Drop for ScopedResource<V> {
    fn drop(&mut self) {
        self.fire();
    }
}

impl<V> fmt::Debug for ScopedResource<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedResource")
            .field("label", &self.label)
            .field("armed", &self.release.is_some())
            .finish()
    }
}

/// Acquire a resource, run `body` against it, and release it whether `body`
/// returns a value, returns an error, or unwinds.
pub fn with_scope<V, R>(
    acquire: impl FnOnce() -> Result<ScopedResource<V>>,
    body: impl FnOnce(&mut V) -> Result<R>,
) -> Result<R> {
    let mut resource = acquire()?;
    let result = body(&mut *resource);
    resource.release();
    result
}

fn prefix_or_default(prefix: Option<&str>) -> String {
    match prefix {
        Some(p) => p.to_string(),
        None => Config::current().temp.prefix.clone(),
    }
}

/// Create a temporary directory under `parent`. Release deletes it
/// recursively.
pub fn temp_dir(parent: &Path, prefix: Option<&str>) -> Result<ScopedResource<TempDir>> {
    let dir = tempfile::Builder::new()
        .prefix(&prefix_or_default(prefix))
        .tempdir_in(parent)
        .map_err(|source| Error::TempResource {
            kind: "directory",
            source,
        })?;
    let label = format!("temp dir {}", dir.path().display());
    Ok(ScopedResource::acquire(label, dir, |dir: TempDir| {
        let path = dir.path().to_path_buf();
        if let Err(e) = dir.close() {
            warn!("failed to remove temp dir {}: {e}", path.display());
        }
    }))
}

/// Create a temporary file under `parent`. Release deletes it.
pub fn temp_file(parent: &Path, prefix: Option<&str>) -> Result<ScopedResource<NamedTempFile>> {
    let file = tempfile::Builder::new()
        .prefix(&prefix_or_default(prefix))
        .tempfile_in(parent)
        .map_err(|source| Error::TempResource {
            kind: "file",
            source,
        })?;
    let label = format!("temp file {}", file.path().display());
    Ok(ScopedResource::acquire(label, file, |file: NamedTempFile| {
        let path = file.path().to_path_buf();
        if let Err(e) = file.close() {
            warn!("failed to remove temp file {}: {e}", path.display());
        }
    }))
}

/// Open `path` in `mode`. Release closes the handle.
pub fn open_file(path: &Path, mode: Mode) -> Result<ScopedResource<File>> {
    let file = fs::open(path, mode)?;
    let label = format!("{} handle {}", mode.as_str(), path.display());
    Ok(ScopedResource::acquire(label, file, drop))
}

/// Open `path` for buffered line reading. Release closes the handle.
pub fn open_reader(path: &Path) -> Result<ScopedResource<BufReader<File>>> {
    let file = fs::open(path, Mode::Read)?;
    let label = format!("read handle {}", path.display());
    Ok(ScopedResource::acquire(label, BufReader::new(file), drop))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    fn counted(counter: &Rc<Cell<u32>>) -> ScopedResource<u32> {
        let c = Rc::clone(counter);
        ScopedResource::acquire("counter", 7, move |_| c.set(c.get() + 1))
    }

    #[test]
    fn release_runs_once() {
        let counter = Rc::new(Cell::new(0));
        let r = counted(&counter);
        assert_eq!(*r, 7);
        assert_eq!(r.label(), "counter");
        r.release();
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn drop_releases() {
        let counter = Rc::new(Cell::new(0));
        {
            let _r = counted(&counter);
        }
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn into_inner_disarms() {
        let counter = Rc::new(Cell::new(0));
        let v = counted(&counter).into_inner();
        assert_eq!(v, 7);
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn with_scope_releases_on_error() {
        let counter = Rc::new(Cell::new(0));
        let result: Result<()> = with_scope(
            || Ok(counted(&counter)),
            |_| Err(Error::TaskPanicked("boom".into())),
        );
        assert!(result.is_err());
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn with_scope_releases_on_success() {
        let counter = Rc::new(Cell::new(0));
        let doubled = with_scope(|| Ok(counted(&counter)), |v| Ok(*v * 2)).unwrap();
        assert_eq!(doubled, 14);
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn with_scope_releases_on_panic() {
        let counter = Rc::new(Cell::new(0));
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            with_scope(|| Ok(counted(&counter)), |_| -> Result<()> { panic!("body blew up") })
        }));
        assert!(outcome.is_err());
        assert_eq!(counter.get(), 1);
    }

    #[test]
    fn temp_dir_removed_on_release() {
        let parent = tempfile::tempdir().unwrap();
        let dir = temp_dir(parent.path(), Some("scope-test")).unwrap();
        let path = dir.path().to_path_buf();
        std::fs::write(path.join("inner.txt"), "x").unwrap();
        assert!(path.is_dir());
        dir.release();
        assert!(!path.exists());
    }

    #[test]
    fn temp_file_removed_on_drop() {
        let parent = tempfile::tempdir().unwrap();
        let path = {
            let file = temp_file(parent.path(), Some("scope-test")).unwrap();
            file.path().to_path_buf()
        };
        assert!(!path.exists());
    }
}
