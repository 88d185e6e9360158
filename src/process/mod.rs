//! Subprocesses driven by streams.
//!
//! [`run_to_completion`] feeds a child's stdin while it writes straight to
//! the parent's stdout; [`capture_output`] does the same but hands the
//! child's stdout back as a stream of lines. In both, a single feeder task
//! writes the input stream into the stdin pipe concurrently with the caller.
//!
//! The capturing stream never races its two halves: it reads stdout to
//! end-of-stream first, then joins the feeder, then reaps the child, and only
//! then reports any error the feeder hit. Stopping early closes stdout, stops
//! the feeder and (unless configured otherwise) kills the child.

pub mod pipe;

pub use pipe::{Output, PipeState, ProcessPipe};

use std::fmt;
use std::process::ExitStatus;

use crate::config::{Config, ShellConfig};
use crate::error::Result;
use crate::stream::{Flow, Stream};

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    program: String,
    args: Vec<String>,
    kill_on_abandon: bool,
}

impl Command {
    /// `text` interpreted by the configured shell (`/bin/sh -c` by default).
    pub fn shell(text: impl Into<String>) -> Self {
        let config = Config::current();
        Self::shell_with(&config.shell, text).kill_on_abandon(config.process.kill_on_abandon)
    }

    /// `text` interpreted by the shell described in `shell`.
    pub fn shell_with(shell: &ShellConfig, text: impl Into<String>) -> Self {
        let mut args = shell.args.clone();
        args.push(text.into());
        Self {
            program: shell.program.clone(),
            args,
            kill_on_abandon: true,
        }
    }

    /// Execute `program` directly, without a shell.
    pub fn proc<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            kill_on_abandon: Config::current().process.kill_on_abandon,
        }
    }

    /// Whether a consumer stopping early kills the child, rather than only
    /// closing its stdout pipe.
    pub fn kill_on_abandon(mut self, kill: bool) -> Self {
        self.kill_on_abandon = kill;
        self
    }

    pub fn kills_on_abandon(&self) -> bool {
        self.kill_on_abandon
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub(crate) fn to_std(&self) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        match shlex::try_join(words) {
            Ok(joined) => f.write_str(&joined),
            Err(_) => write!(f, "{} {}", self.program, self.args.join(" ")),
        }
    }
}

/// Run `cmd` with `input` on its stdin and the parent's stdout and stderr.
///
/// A non-zero exit is reported through the returned status, not as an
/// error. A feeder failure is raised after the child has exited.
pub fn run_to_completion(cmd: &Command, input: Stream<String>) -> Result<ExitStatus> {
    ProcessPipe::spawn(cmd, input, Output::Inherit)?.wait()
}

/// Lines of `cmd`'s stdout while `input` is written to its stdin.
///
/// Each drive spawns a fresh child. The stream ends once stdout reaches
/// end-of-stream and the feeder has been joined.
pub fn capture_output(cmd: &Command, input: Stream<String>) -> Stream<String> {
    let cmd = cmd.clone();
    Stream::new(move |sink| {
        let mut pipe = ProcessPipe::spawn(&cmd, input.clone(), Output::Capture)?.scoped();
        while let Some(line) = pipe.next_line()? {
            if sink(line)?.is_break() {
                return Ok(Flow::Break(()));
            }
        }
        pipe.into_inner().finish()?;
        Ok(Flow::Continue(()))
    })
}
