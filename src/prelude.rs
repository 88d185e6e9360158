//! Shell-flavoured building blocks assembled from the stream core.
//!
//! ```no_run
//! use shellstream::prelude::*;
//!
//! // Every Rust source file under src/, piped through `wc -l`.
//! let files = find(Literal::new(".rs"), "src").map(|p| p.display().to_string());
//! let counted = stream("wc -l", files);
//! stdout(&counted)?;
//! # Ok::<(), shellstream::Error>(())
//! ```

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitStatus;

pub use crate::error::{Error, Result};
pub use crate::fs::{Mode, cd, pwd};
pub use crate::matcher::{Literal, Match, Matcher};
pub use crate::process::Command;
pub use crate::stream::{Flow, Fold, Stream};

use crate::fs::dir;
use crate::matcher;
use crate::process;
use crate::scope::{self, ScopedResource};
use crate::stream;

// ── Filesystem sources ──

/// Immediate children of `path`.
pub fn ls(path: impl Into<PathBuf>) -> Stream<PathBuf> {
    dir::list(path)
}

/// Everything under `path`, depth-first pre-order.
pub fn lstree(path: impl Into<PathBuf>) -> Stream<PathBuf> {
    dir::recursive_list(path)
}

/// Paths under `root` whose text contains a match.
pub fn find<M>(matcher: M, root: impl Into<PathBuf>) -> Stream<PathBuf>
where
    M: Matcher + Send + Sync + 'static,
{
    dir::find(matcher, root)
}

// ── Line transformers ──

/// Lines containing at least one match.
pub fn grep<M>(matcher: M, input: Stream<String>) -> Stream<String>
where
    M: Matcher + Send + Sync + 'static,
{
    input.filter(move |line| matcher.is_match(line))
}

/// Every line with each match replaced by its replacement text.
pub fn sed<M>(matcher: M, input: Stream<String>) -> Stream<String>
where
    M: Matcher + Send + Sync + 'static,
{
    input.map(move |line| matcher::rewrite(&matcher, &line))
}

/// Concatenate streams in order.
pub fn cat<T: 'static>(streams: Vec<Stream<T>>) -> Stream<T> {
    Stream::concat_all(streams)
}

pub fn select<T, I>(items: I) -> Stream<T>
where
    T: Clone + Send + Sync + 'static,
    I: IntoIterator<Item = T>,
{
    items.into_iter().collect()
}

/// `"y"`, forever.
pub fn yes() -> Stream<String> {
    Stream::repeat_with(|| Ok("y".to_string()))
}

pub fn limit<T: 'static>(n: usize, input: Stream<T>) -> Stream<T> {
    input.limit(n)
}

// ── Line-oriented I/O ──

/// Lines of the process's standard input.
pub fn stdin() -> Stream<String> {
    stream::lines(|| Ok(ScopedResource::acquire("stdin", io::stdin().lock(), drop)))
}

/// Lines of the file at `path`.
pub fn input(path: impl Into<PathBuf>) -> Stream<String> {
    let path = path.into();
    stream::lines(move || scope::open_reader(&path))
}

fn write_lines<W: Write>(writer: W, lines: &Stream<String>) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    lines.drive(&mut |line| {
        writeln!(writer, "{line}")?;
        Ok(Flow::Continue(()))
    })?;
    writer.flush()?;
    Ok(())
}

pub fn stdout(lines: &Stream<String>) -> Result<()> {
    write_lines(io::stdout().lock(), lines)
}

pub fn stderr(lines: &Stream<String>) -> Result<()> {
    write_lines(io::stderr().lock(), lines)
}

/// Write `lines` to `path`, truncating it.
pub fn output(path: &Path, lines: &Stream<String>) -> Result<()> {
    scope::with_scope(|| scope::open_file(path, Mode::Write), |file| write_lines(file, lines))
}

/// Append `lines` to `path`.
pub fn append(path: &Path, lines: &Stream<String>) -> Result<()> {
    scope::with_scope(|| scope::open_file(path, Mode::Append), |file| write_lines(file, lines))
}

// ── Processes ──

/// Run a shell command with `input` on its stdin; stdout and stderr go to
/// the parent's.
pub fn system(cmd: &str, input: Stream<String>) -> Result<ExitStatus> {
    process::run_to_completion(&Command::shell(cmd), input)
}

/// [`system`] without a shell.
pub fn proc<I, S>(program: &str, args: I, input: Stream<String>) -> Result<ExitStatus>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    process::run_to_completion(&Command::proc(program, args), input)
}

/// Stdout lines of a shell command fed with `input`.
pub fn stream(cmd: &str, input: Stream<String>) -> Stream<String> {
    process::capture_output(&Command::shell(cmd), input)
}

/// [`stream`] without a shell.
pub fn inproc<I, S>(program: &str, args: I, input: Stream<String>) -> Stream<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    process::capture_output(&Command::proc(program, args), input)
}

// ── Scoped resources as streams ──

/// A fresh directory under `parent`, deleted with its contents once the
/// consuming pipeline is done with it.
pub fn mktempdir(parent: impl Into<PathBuf>, prefix: &str) -> Stream<PathBuf> {
    let parent = parent.into();
    let prefix = prefix.to_string();
    Stream::using(
        move || scope::temp_dir(&parent, Some(&prefix)),
        |dir| Stream::once(dir.path().to_path_buf()),
    )
}

/// A fresh empty file under `parent`, deleted once the consuming pipeline
/// is done with it.
pub fn mktempfile(parent: impl Into<PathBuf>, prefix: &str) -> Stream<PathBuf> {
    let parent = parent.into();
    let prefix = prefix.to_string();
    Stream::using(
        move || scope::temp_file(&parent, Some(&prefix)),
        |file| Stream::once(file.path().to_path_buf()),
    )
}

/// Change into `path` while the rest of the pipeline runs, then change
/// back. Like [`cd`], this races with any other thread changing directory.
pub fn pushd(path: impl Into<PathBuf>) -> Stream<()> {
    let path = path.into();
    Stream::using(move || crate::fs::pushd(&path), |_| Stream::once(()))
}
