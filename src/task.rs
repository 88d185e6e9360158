//! Background tasks with explicit join and acknowledged cancellation.
//!
//! Cancellation is cooperative: [`Task::cancel`] raises the task's
//! [`CancelToken`] and then blocks until the thread returns. The task body is
//! expected to poll the token between units of work. Whatever the task
//! produced after being cancelled is discarded.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use log::debug;

use crate::error::{Error, Result};
use crate::scope::ScopedResource;

/// Shared flag a task polls to learn it should stop.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Handle to a running background thread.
pub struct Task<T> {
    name: String,
    token: CancelToken,
    handle: JoinHandle<Result<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// Start `body` on a named thread.
    pub fn spawn<F>(name: impl Into<String>, body: F) -> Result<Self>
    where
        F: FnOnce(&CancelToken) -> Result<T> + Send + 'static,
    {
        let name = name.into();
        let token = CancelToken::default();
        let thread_token = token.clone();
        let handle = thread::Builder::new()
            .name(name.clone())
            .spawn(move || body(&thread_token))?;
        debug!("spawned task {name}");
        Ok(Self {
            name,
            token,
            handle,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> CancelToken {
        self.token.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the task and return what it produced. A panic inside the
    /// task becomes [`Error::TaskPanicked`].
    pub fn join(self) -> Result<T> {
        let name = self.name;
        match self.handle.join() {
            Ok(result) => {
                debug!("joined task {name}");
                result
            }
            Err(_) => Err(Error::TaskPanicked(name)),
        }
    }

    /// Request cancellation and block until the task acknowledges by
    /// returning. Its result or error is dropped.
    pub fn cancel(self) {
        self.token.cancel();
        let name = self.name;
        let _ = self.handle.join();
        debug!("cancelled task {name}");
    }

    /// Tie the task to a scope: releasing it cancels and awaits the task.
    pub fn scoped(self) -> ScopedResource<Task<T>> {
        let label = format!("task {}", self.name);
        ScopedResource::acquire(label, self, Task::cancel)
    }
}
