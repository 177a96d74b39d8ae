//! The single background worker. Every S3 call runs on its thread; callers
//! observe results only through [`WorkerEvent`]s.

pub mod events;
pub mod operation;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;

use futures_util::FutureExt;
use tokio::runtime::{Builder, Runtime};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ManagerError, Result};
use crate::s3::ops::Reporter;
use crate::s3::{ClientConfig, ClientFactory};
use crate::settings::WaitPolicy;

pub use events::{EventPayload, LogLevel, OperationKind, WorkerEvent};
pub use operation::Operation;

#[derive(Clone, Copy, Debug, Default)]
pub struct WorkerOptions {
    pub wait: WaitPolicy,
}

#[derive(Clone, Copy, Debug)]
struct RunningOperation {
    id: Uuid,
    kind: OperationKind,
}

#[derive(Debug)]
struct State {
    running: Option<RunningOperation>,
    config: ClientConfig,
}

struct Shared {
    state: Mutex<State>,
    events: Sender<WorkerEvent>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl Shared {
    fn emit(&self, operation_id: Uuid, kind: OperationKind, payload: EventPayload) {
        // A dropped receiver only means nobody is listening any more.
        let _ = self.events.send(WorkerEvent {
            operation_id,
            kind,
            payload,
        });
    }

    /// Sends the terminal event and returns to idle under one lock, so a
    /// consumer reacting to the event can submit straight away and no event of
    /// the next operation can precede it.
    fn finish(&self, id: Uuid, kind: OperationKind, result: std::result::Result<String, ManagerError>) {
        let mut state = lock(&self.state);
        let payload = match result {
            Ok(message) => {
                info!("{kind} {id} completed");
                EventPayload::Completed {
                    success: true,
                    message,
                    error: None,
                }
            }
            Err(err) => {
                error!("{kind} {id} failed: {err}");
                EventPayload::Completed {
                    success: false,
                    message: err.to_string(),
                    error: Some(err.kind()),
                }
            }
        };
        self.emit(id, kind, payload);
        if state.running.map(|running| running.id) == Some(id) {
            state.running = None;
        }
    }
}

struct Job {
    id: Uuid,
    kind: OperationKind,
    operation: Operation,
    config: ClientConfig,
}

/// Forwards operation output as events and keeps progress monotonic.
struct EventReporter<'a> {
    shared: &'a Shared,
    id: Uuid,
    kind: OperationKind,
    last_percent: u8,
}

impl Reporter for EventReporter<'_> {
    fn progress(&mut self, percent: u8, message: String) {
        let percent = percent.min(100).max(self.last_percent);
        self.last_percent = percent;
        self.shared
            .emit(self.id, self.kind, EventPayload::Progress { percent, message });
    }

    fn log(&mut self, level: LogLevel, message: String) {
        self.shared
            .emit(self.id, self.kind, EventPayload::Log { level, message });
    }
}

/// Releases the worker if the job is abandoned without a terminal event.
struct CompletionGuard<'a> {
    shared: &'a Shared,
    id: Uuid,
    kind: OperationKind,
    done: bool,
}

impl CompletionGuard<'_> {
    fn complete(mut self, result: std::result::Result<String, ManagerError>) {
        self.done = true;
        self.shared.finish(self.id, self.kind, result);
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.shared.finish(
                self.id,
                self.kind,
                Err(ManagerError::Unexpected(
                    "The worker stopped before the operation finished".to_string(),
                )),
            );
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn run_job(
    runtime: &Runtime,
    shared: &Shared,
    factory: &dyn ClientFactory,
    wait: WaitPolicy,
    job: Job,
) {
    let guard = CompletionGuard {
        shared,
        id: job.id,
        kind: job.kind,
        done: false,
    };
    let mut reporter = EventReporter {
        shared,
        id: job.id,
        kind: job.kind,
        last_percent: 0,
    };

    let result = runtime.block_on(
        AssertUnwindSafe(operation::execute(
            job.operation,
            factory,
            &job.config,
            wait,
            &mut reporter,
        ))
        .catch_unwind(),
    );

    let result = match result {
        Ok(Ok(outcome)) => {
            if let Some(payload) = outcome.payload {
                shared.emit(job.id, job.kind, payload);
            }
            Ok(outcome.message)
        }
        Ok(Err(err)) => {
            reporter.log(LogLevel::Error, err.to_string());
            Err(err)
        }
        Err(panic) => Err(ManagerError::Unexpected(format!(
            "Operation panicked: {}",
            panic_message(panic)
        ))),
    };
    guard.complete(result);
}

pub struct Worker {
    shared: Arc<Shared>,
    jobs: Option<Sender<Job>>,
    handle: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn spawn(
        factory: Arc<dyn ClientFactory>,
        options: WorkerOptions,
    ) -> Result<(Self, Receiver<WorkerEvent>)> {
        let (event_tx, event_rx) = mpsc::channel();
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                running: None,
                config: ClientConfig::default(),
            }),
            events: event_tx,
        });

        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| ManagerError::Unexpected(format!("Failed to start runtime: {err}")))?;

        let thread_shared = Arc::clone(&shared);
        let handle = std::thread::Builder::new()
            .name("s3manager-worker".to_string())
            .spawn(move || {
                for job in job_rx {
                    run_job(&runtime, &thread_shared, factory.as_ref(), options.wait, job);
                }
            })
            .map_err(|err| ManagerError::Unexpected(format!("Failed to start worker: {err}")))?;

        Ok((
            Self {
                shared,
                jobs: Some(job_tx),
                handle: Some(handle),
            },
            event_rx,
        ))
    }

    /// Replaces the configuration used by operations submitted from now on.
    pub fn set_client_config(&self, config: ClientConfig) {
        lock(&self.shared.state).config = config;
    }

    pub fn client_config(&self) -> ClientConfig {
        lock(&self.shared.state).config.clone()
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.shared.state).running.is_some()
    }

    pub fn running(&self) -> Option<OperationKind> {
        lock(&self.shared.state).running.map(|running| running.kind)
    }

    pub fn submit(&self, operation: Operation) -> Result<Uuid> {
        operation.validate()?;
        let kind = operation.kind();

        let mut state = lock(&self.shared.state);
        if let Some(running) = state.running {
            warn!("Rejected {kind}: {} is still running", running.kind);
            return Err(ManagerError::Busy {
                running: running.kind.label().to_string(),
            });
        }

        let id = Uuid::new_v4();
        let job = Job {
            id,
            kind,
            operation,
            config: state.config.clone(),
        };
        let sender = self
            .jobs
            .as_ref()
            .ok_or_else(|| ManagerError::Unexpected("The worker has shut down".to_string()))?;
        sender
            .send(job)
            .map_err(|_| ManagerError::Unexpected("The worker thread is not running".to_string()))?;
        state.running = Some(RunningOperation { id, kind });
        info!("Started {kind} {id}");
        Ok(id)
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Worker thread panicked");
            }
        }
    }
}
