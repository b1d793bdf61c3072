//! Background tick loop
//!
//! ## Message Flow
//!
//! ```text
//! deadline reached → tick → next deadline = tick start + interval
//!     ↑
//!     └─── Commands (TickNow, Shutdown)
//! ```
//!
//! A tick that overruns the interval is followed immediately by the next one; ticks never
//! overlap. A failed tick is followed by a full interval of rest.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until, timeout};
use tracing::{debug, error, instrument, warn};

use crate::error::{MonitorError, MonitorResult};

use super::{Engine, TickReport};

/// How long `stop` waits for the worker before aborting it
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
enum SchedulerCommand {
    /// Tick immediately, out of schedule
    TickNow {
        respond_to: oneshot::Sender<MonitorResult<TickReport>>,
    },

    /// Finish the current tick and exit
    Shutdown,
}

struct SchedulerActor {
    engine: Arc<Engine>,
    interval: Duration,
    command_rx: mpsc::Receiver<SchedulerCommand>,
}

impl SchedulerActor {
    #[instrument(skip(self), fields(interval = ?self.interval))]
    async fn run(mut self) {
        debug!("starting scheduler worker");

        let mut deadline = Instant::now();

        loop {
            tokio::select! {
                // commands first, so a pending shutdown wins over an overdue tick
                biased;

                command = self.command_rx.recv() => {
                    match command {
                        Some(SchedulerCommand::TickNow { respond_to }) => {
                            debug!("received TickNow command");
                            let result = self.engine.tick().await;
                            let _ = respond_to.send(result);
                        }

                        Some(SchedulerCommand::Shutdown) => {
                            debug!("received shutdown command");
                            break;
                        }

                        None => {
                            warn!("command channel closed, shutting down");
                            break;
                        }
                    }
                }

                _ = sleep_until(deadline) => {
                    let started = Instant::now();
                    deadline = match self.engine.tick().await {
                        Ok(_) => started + self.interval,
                        Err(_) => Instant::now() + self.interval,
                    };
                }
            }
        }

        debug!("scheduler worker stopped");
    }
}

struct WorkerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
    task: JoinHandle<()>,
}

/// Starts and stops the single background worker of a monitor
pub struct Scheduler {
    engine: Arc<Engine>,
    interval: Duration,
    worker: Mutex<Option<WorkerHandle>>,
}

impl Scheduler {
    pub(crate) fn new(engine: Arc<Engine>, interval: Duration) -> Self {
        Self {
            engine,
            interval,
            worker: Mutex::new(None),
        }
    }

    /// Spawn the worker unless one is running; the first tick happens right away
    pub async fn start(&self) -> bool {
        let mut worker = self.worker.lock().await;

        if let Some(handle) = worker.as_ref()
            && !handle.task.is_finished()
        {
            debug!("scheduler already running");
            return false;
        }

        let (sender, command_rx) = mpsc::channel(8);
        let actor = SchedulerActor {
            engine: self.engine.clone(),
            interval: self.interval,
            command_rx,
        };

        *worker = Some(WorkerHandle {
            sender,
            task: tokio::spawn(actor.run()),
        });

        debug!("scheduler started");
        true
    }

    /// Signal the worker and wait for it to exit, aborting it after a timeout
    pub async fn stop(&self) -> bool {
        let mut worker = self.worker.lock().await;
        let Some(WorkerHandle { sender, mut task }) = worker.take() else {
            debug!("scheduler not running");
            return false;
        };

        // a worker that already exited has dropped its receiver
        let _ = sender.send(SchedulerCommand::Shutdown).await;

        match timeout(STOP_TIMEOUT, &mut task).await {
            Ok(Ok(())) => debug!("scheduler stopped"),
            Ok(Err(e)) => error!("scheduler worker ended abnormally: {e}"),
            Err(_) => {
                warn!("scheduler worker did not stop within {STOP_TIMEOUT:?}, aborting");
                task.abort();
            }
        }

        true
    }

    pub async fn is_running(&self) -> bool {
        self.worker
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.task.is_finished())
    }

    /// Ask the running worker for an immediate tick and wait for its report
    pub async fn tick_now(&self) -> MonitorResult<TickReport> {
        let sender = match self.worker.lock().await.as_ref() {
            Some(handle) if !handle.task.is_finished() => handle.sender.clone(),
            _ => return Err(MonitorError::SchedulerStopped),
        };

        let (respond_to, response) = oneshot::channel();
        sender
            .send(SchedulerCommand::TickNow { respond_to })
            .await
            .map_err(|_| MonitorError::WorkerFailed("failed to send TickNow command".to_string()))?;

        response
            .await
            .map_err(|_| MonitorError::WorkerFailed("worker dropped the tick request".to_string()))?
    }
}
