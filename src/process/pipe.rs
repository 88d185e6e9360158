//! A spawned child plus the feeder thread writing its stdin.
//!
//! Lifecycle: `Spawning -> Running -> Draining -> Joined -> Done`, or
//! `Spawning -> Failed` when the child cannot be created.
//!
//! - `Running`: child alive, feeder writing.
//! - `Draining`: the caller is reading stdout, or waiting for exit.
//! - `Joined`: the feeder has returned and its result was collected.
//! - `Done`: the child has been reaped.
//!
//! Only one thread writes the stdin pipe (the feeder) and only one reads
//! stdout (the caller), so neither endpoint needs a lock.

use std::fmt;
use std::io::{self, BufReader, LineWriter, Write};
use std::process::{Child, ChildStdin, ChildStdout, ExitStatus, Stdio};

use log::{debug, trace};

use super::Command;
use crate::error::{Error, Result};
use crate::scope::ScopedResource;
use crate::stream::{self, Flow, Stream};
use crate::task::{CancelToken, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Spawning,
    Running,
    Draining,
    Joined,
    Done,
    Failed,
}

impl fmt::Display for PipeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipeState::Spawning => "spawning",
            PipeState::Running => "running",
            PipeState::Draining => "draining",
            PipeState::Joined => "joined",
            PipeState::Done => "done",
            PipeState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Where the child's stdout goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Output {
    Inherit,
    Capture,
}

pub struct ProcessPipe {
    command: String,
    child: Child,
    stdout: Option<BufReader<ChildStdout>>,
    feeder: Option<ScopedResource<Task<()>>>,
    state: PipeState,
    kill_on_abandon: bool,
}

impl ProcessPipe {
    /// Spawn `cmd` with a piped stdin fed from `input` on a background task.
    /// Stderr is always inherited.
    pub fn spawn(cmd: &Command, input: Stream<String>, output: Output) -> Result<Self> {
        let command = cmd.to_string();
        trace!("{command}: {}", PipeState::Spawning);

        let mut builder = cmd.to_std();
        builder.stdin(Stdio::piped()).stderr(Stdio::inherit());
        builder.stdout(match output {
            Output::Inherit => Stdio::inherit(),
            Output::Capture => Stdio::piped(),
        });

        let mut child = match builder.spawn() {
            Ok(child) => child,
            Err(source) => {
                trace!("{command}: {}", PipeState::Failed);
                return Err(Error::Spawn { command, source });
            }
        };
        debug!("spawned `{command}` (pid {})", child.id());

        let stdout = child.stdout.take().map(BufReader::new);
        let Some(stdin) = child.stdin.take() else {
            reap(&mut child);
            return Err(Error::Spawn {
                command,
                source: std::io::Error::other("child has no stdin pipe"),
            });
        };

        let feeder = match Task::spawn("shellstream-feeder", move |token| feed(&input, stdin, token))
        {
            Ok(task) => task.scoped(),
            Err(e) => {
                reap(&mut child);
                return Err(e);
            }
        };

        let pipe = Self {
            command,
            child,
            stdout,
            feeder: Some(feeder),
            state: PipeState::Spawning,
            kill_on_abandon: cmd.kills_on_abandon(),
        };
        Ok(pipe.with_state(PipeState::Running))
    }

    pub fn state(&self) -> PipeState {
        self.state
    }

    fn with_state(mut self, next: PipeState) -> Self {
        self.transition(next);
        self
    }

    fn transition(&mut self, next: PipeState) {
        trace!("{}: {} -> {}", self.command, self.state, next);
        self.state = next;
    }

    /// Tie the pipe to a scope: releasing it abandons the child.
    pub fn scoped(self) -> ScopedResource<ProcessPipe> {
        let label = format!("process pipe `{}`", self.command);
        ScopedResource::acquire(label, self, ProcessPipe::abandon)
    }

    /// Next line of captured stdout, or `None` at end-of-stream.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        if self.state == PipeState::Running {
            self.transition(PipeState::Draining);
        }
        match self.stdout.as_mut() {
            Some(reader) => stream::read_line(reader),
            None => Ok(None),
        }
    }

    /// Stdout is exhausted: join the feeder, then reap the child. A feeder
    /// error is returned only after the child has been reaped.
    pub fn finish(mut self) -> Result<ExitStatus> {
        self.stdout = None;
        let fed = self.join_feeder(false);
        let status = self.reap()?;
        fed.map(|()| status)
    }

    /// Wait for the child to exit, then join the feeder. A feeder error is
    /// returned only after the exit status is known.
    pub fn wait(mut self) -> Result<ExitStatus> {
        self.transition(PipeState::Draining);
        let status = self.child.wait()?;
        // Nothing can read further input once the child is gone.
        let fed = self.join_feeder(true);
        self.transition(PipeState::Done);
        debug!("`{}` exited with {status}", self.command);
        fed.map(|()| status)
    }

    fn join_feeder(&mut self, stop_early: bool) -> Result<()> {
        let Some(feeder) = self.feeder.take() else {
            return Ok(());
        };
        if stop_early {
            feeder.token().cancel();
        }
        let result = feeder.into_inner().join();
        self.transition(PipeState::Joined);
        result.map_err(|source| Error::Feeder {
            command: self.command.clone(),
            source: Box::new(source),
        })
    }

    fn reap(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait()?;
        self.transition(PipeState::Done);
        debug!("`{}` exited with {status}", self.command);
        Ok(status)
    }

    /// The consumer stopped early: close our end of stdout, stop the feeder,
    /// kill the child if configured to, and reap it. The feeder's outcome is
    /// discarded.
    pub fn abandon(mut self) {
        debug!("abandoning `{}` in state {}", self.command, self.state);
        self.stdout = None;
        if let Some(feeder) = self.feeder.take() {
            feeder.token().cancel();
            self.kill_if_running();
            drop(feeder);
            self.transition(PipeState::Joined);
        } else {
            self.kill_if_running();
        }
        if self.child.wait().is_ok() {
            self.transition(PipeState::Done);
        }
    }

    fn kill_if_running(&mut self) {
        if self.kill_on_abandon && matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
        }
    }
}

impl fmt::Debug for ProcessPipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessPipe")
            .field("command", &self.command)
            .field("pid", &self.child.id())
            .field("state", &self.state)
            .finish()
    }
}

fn reap(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Feeder body: write each line of `input` to the child's stdin, then close
/// it. A child that exits without reading everything is not an error.
fn feed(input: &Stream<String>, stdin: ChildStdin, token: &CancelToken) -> Result<()> {
    let mut writer = LineWriter::new(stdin);
    let mut write_error: Option<io::Error> = None;
    // Errors raised by the input stream itself propagate unchanged; only a
    // failed write into the pipe is parked in `write_error`.
    input.drive(&mut |line| {
        if token.is_cancelled() {
            return Ok(Flow::Break(()));
        }
        match writer
            .write_all(line.as_bytes())
            .and_then(|()| writer.write_all(b"\n"))
        {
            Ok(()) => Ok(Flow::Continue(())),
            Err(e) => {
                write_error = Some(e);
                Ok(Flow::Break(()))
            }
        }
    })?;
    let written = match write_error {
        Some(e) => Err(e),
        None => writer.flush(),
    };
    match written {
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
            debug!("feeder stopped: child closed its stdin");
            Ok(())
        }
        other => other.map_err(Error::from),
    }
}
