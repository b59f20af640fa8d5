//! Long-running background work that must not take the host down with it.
//!
//! [`IsolatedTask`] runs a worker either on a dedicated OS thread with its
//! own single-threaded tokio runtime, or in a child process re-executing the
//! current binary. Both are detached: neither keeps the host alive at exit.

use std::future::Future;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;

use log::{debug, error, info, warn};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Isolation {
    Thread,
    Process,
}

#[derive(Debug, Error)]
pub enum TaskError {
    #[error("{context}: {source}")]
    Spawn {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl TaskError {
    fn spawn(context: &'static str, source: std::io::Error) -> Self {
        Self::Spawn { context, source }
    }
}

/// Program and arguments a subprocess worker is started with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    #[must_use]
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the running binary with `args`.
    ///
    /// # Errors
    /// Returns an error if the current executable cannot be resolved.
    pub fn current_exe<I, S>(args: I) -> std::io::Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            program: std::env::current_exe()?,
            args: args.into_iter().map(Into::into).collect(),
        })
    }
}

pub enum IsolatedTask {
    Thread {
        name: String,
        cancel: CancellationToken,
        join_handle: Option<JoinHandle<()>>,
    },
    Process {
        name: String,
        child: Child,
    },
}

impl IsolatedTask {
    /// Run the future produced by `make_worker` on a named thread with its
    /// own runtime. A panic inside the worker ends that thread only.
    ///
    /// # Errors
    /// Returns an error if the thread cannot be spawned.
    pub fn spawn_thread<F, Fut>(name: &str, make_worker: F) -> Result<Self, TaskError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = ()>,
    {
        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        let thread_name = name.to_string();

        let join_handle = std::thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(error) => {
                        error!("Failed to start runtime for {thread_name}: {error}");
                        return;
                    }
                };
                runtime.block_on(make_worker(worker_cancel));
                debug!("Background task {thread_name} finished");
            })
            .map_err(|error| TaskError::spawn("failed to spawn worker thread", error))?;

        info!("Started background task {name} on a thread");
        Ok(Self::Thread {
            name: name.to_string(),
            cancel,
            join_handle: Some(join_handle),
        })
    }

    /// Start `command` as a child process with no stdin.
    ///
    /// # Errors
    /// Returns an error if the process cannot be started.
    pub fn spawn_process(name: &str, command: &WorkerCommand) -> Result<Self, TaskError> {
        let child = Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|error| TaskError::spawn("failed to spawn worker process", error))?;

        info!(
            "Started background task {name} as process {} ({} {})",
            child.id(),
            command.program.display(),
            command.args.join(" ")
        );
        Ok(Self::Process {
            name: name.to_string(),
            child,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Thread { name, .. } | Self::Process { name, .. } => name,
        }
    }

    #[must_use]
    pub fn isolation(&self) -> Isolation {
        match self {
            Self::Thread { .. } => Isolation::Thread,
            Self::Process { .. } => Isolation::Process,
        }
    }

    pub fn is_finished(&mut self) -> bool {
        match self {
            Self::Thread { join_handle, .. } => join_handle
                .as_ref()
                .is_none_or(JoinHandle::is_finished),
            Self::Process { child, .. } => !matches!(child.try_wait(), Ok(None)),
        }
    }

    /// Ask the worker to stop and wait for it. Threads are cancelled through
    /// their token; processes are killed.
    pub fn shutdown(&mut self) {
        match self {
            Self::Thread {
                name,
                cancel,
                join_handle,
            } => {
                cancel.cancel();
                if let Some(join_handle) = join_handle.take()
                    && join_handle.join().is_err()
                {
                    warn!("Background task {name} panicked");
                }
            }
            Self::Process { name, child } => {
                if matches!(child.try_wait(), Ok(None)) {
                    if let Err(error) = child.kill() {
                        warn!("Could not kill background task {name}: {error}");
                    }
                }
                let _ = child.wait();
            }
        }
        debug!("Background task {} shut down", self.name());
    }
}
