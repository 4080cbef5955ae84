//! Named worker threads joined with a deadline.
//!
//! `std::thread::JoinHandle::join` blocks forever, so each worker signals a
//! crossbeam channel when its closure returns or unwinds.  The supervisor
//! waits on that channel with a timeout and only then joins.  A worker that
//! misses the deadline is logged and detached.

use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use metaball_types::MetaballError;
use tracing::{error, info, warn};

pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, PartialEq, Eq)]
pub enum WorkerExit<T> {
    Finished(T),
    Panicked,
    TimedOut,
}

pub struct WorkerHandle<T> {
    name: String,
    handle: JoinHandle<T>,
    done: Receiver<()>,
}

/// Dropping this (normally or during unwinding) tells the supervisor the
/// closure is done.
struct DoneSignal(Sender<()>);

impl Drop for DoneSignal {
    fn drop(&mut self) {
        let _ = self.0.send(());
    }
}

/// Spawn `f` on a named OS thread.
///
/// # Errors
///
/// [`MetaballError::Configuration`] if the OS refuses to create the thread.
pub fn spawn_worker<T, F>(name: &str, f: F) -> Result<WorkerHandle<T>, MetaballError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    let (tx, done) = channel::bounded(1);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let _signal = DoneSignal(tx);
            f()
        })
        .map_err(|e| MetaballError::Configuration(format!("cannot spawn {name} thread: {e}")))?;
    info!(worker = name, "worker started");
    Ok(WorkerHandle {
        name: name.to_string(),
        handle,
        done,
    })
}

impl<T> WorkerHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait up to `timeout` for the worker to finish.
    pub fn join_timeout(self, timeout: Duration) -> WorkerExit<T> {
        match self.done.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => match self.handle.join() {
                Ok(value) => {
                    info!(worker = %self.name, "worker stopped");
                    WorkerExit::Finished(value)
                }
                Err(_) => {
                    error!(worker = %self.name, "worker panicked");
                    WorkerExit::Panicked
                }
            },
            Err(RecvTimeoutError::Timeout) => {
                warn!(worker = %self.name, timeout_ms = timeout.as_millis() as u64, "worker did not stop in time, abandoning");
                WorkerExit::TimedOut
            }
        }
    }
}
