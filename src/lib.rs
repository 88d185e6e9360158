//! shellstream: Unix-style file and process operations as lazy,
//! resource-safe streams.
//!
//! A [`Stream`] is an effectful, possibly infinite sequence that is driven by
//! a consumer ([`stream::Fold`]). Every OS handle opened while producing
//! values (directory handles, files, temp resources, subprocess pipes and
//! their feeder tasks) is owned by a [`scope::ScopedResource`] and released
//! exactly once, including when the consumer stops pulling early.
//!
//! # Architecture
//!
//! - **[`stream`]**: The stream engine: constructors, combinators, folds.
//! - **[`scope`]**: Scoped resources: acquire with guaranteed release.
//! - **[`task`]**: Background tasks with join and acknowledged cancel.
//! - **[`fs`]**: Filesystem collaborator calls and directory streams.
//! - **[`matcher`]**: Text matcher interface used by grep, sed and find.
//! - **[`process`]**: Subprocesses fed from and drained into streams.
//! - **[`prelude`]**: Shell-style facade: `ls`, `find`, `grep`, `stream`, …
//! - **[`config`]**: Configuration loading: embedded defaults + user overlay merge.
//! - **[`logging`]**: `simplelog` setup for the `log` macros used throughout.

/// Configuration types, loading, and overlay merge logic.
pub mod config;
/// Crate-wide error type.
pub mod error;
/// Filesystem pass-throughs and directory iteration.
pub mod fs;
/// Logger installation.
pub mod logging;
/// Matcher trait, literal matcher, and match-driven rewriting.
pub mod matcher;
/// Shell-style facade over the core.
pub mod prelude;
/// Stream-driven subprocesses.
pub mod process;
/// Acquire-with-guaranteed-release wrapper.
pub mod scope;
/// Lazy effectful streams and folds.
pub mod stream;
/// Cancellable background tasks.
pub mod task;

pub use error::{Error, Result};
pub use stream::Stream;
