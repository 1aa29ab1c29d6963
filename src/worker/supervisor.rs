use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::error::Result;
use crate::queue::{self, stat, Job, JobStatus};
use crate::store::Store;
use crate::worker::executor::{ChildExit, JobExecutor};
use crate::worker::registry::{self, WorkingOn};
use crate::worker::signals::{install_signal_handlers, WorkerSignal};
use crate::worker::{process, WorkerId};

/// Capacity of the signal channel between the OS adapter and the loop.
pub const SIGNAL_BUFFER: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Starting,
    Waiting,
    Paused,
    Forked,
    ShuttingDown,
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Starting => write!(f, "starting"),
            WorkerState::Waiting => write!(f, "waiting"),
            WorkerState::Paused => write!(f, "paused"),
            WorkerState::Forked => write!(f, "forked"),
            WorkerState::ShuttingDown => write!(f, "shutting down"),
        }
    }
}

/// Outcome of one poll of the work loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// No job was found on any queue.
    Idle,
    /// Reservation was skipped because the worker is paused.
    Paused,
    /// A job was run to completion (successfully or not).
    Processed,
    /// A shutdown was requested; the loop should stop.
    ShuttingDown,
}

/// Polls its queues and runs each job in a child process, one at a time.
///
/// Signals are never acted on preemptively. They queue up in a channel and
/// are applied at the top of every [`tick`](Self::tick), while sleeping
/// between polls, and while waiting on a child. Only terminate, interrupt
/// and kill-child touch a running job; the rest just flip flags.
pub struct Worker {
    id: WorkerId,
    store: Arc<dyn Store>,
    executor: JobExecutor,
    state: WorkerState,
    paused: bool,
    shutdown: bool,
    current_job: Option<Job>,
    job_timeout: Option<Duration>,
    os_signals: bool,
    signal_tx: mpsc::Sender<WorkerSignal>,
    signal_rx: mpsc::Receiver<WorkerSignal>,
    signal_task: Option<JoinHandle<()>>,
}

impl Worker {
    pub fn new(store: Arc<dyn Store>, queues: Vec<String>, executor: JobExecutor) -> Self {
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        Self {
            id: WorkerId::current(queues),
            store,
            executor,
            state: WorkerState::Starting,
            paused: false,
            shutdown: false,
            current_job: None,
            job_timeout: None,
            os_signals: true,
            signal_tx,
            signal_rx,
            signal_task: None,
        }
    }

    pub fn with_id(mut self, id: WorkerId) -> Self {
        self.id = id;
        self
    }

    /// Kill jobs that run longer than `timeout` and record them as dirty exits.
    pub fn with_job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Do not listen for process signals; only [`signal_sender`](Self::signal_sender) feeds the loop.
    pub fn without_os_signals(mut self) -> Self {
        self.os_signals = false;
        self
    }

    /// A handle for delivering [`WorkerSignal`]s to this worker.
    pub fn signal_sender(&self) -> mpsc::Sender<WorkerSignal> {
        self.signal_tx.clone()
    }

    pub fn id(&self) -> &WorkerId {
        &self.id
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown
    }

    pub fn current_job(&self) -> Option<&Job> {
        self.current_job.as_ref()
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Install signal handlers, prune dead workers on this host and register.
    pub async fn startup(&mut self) -> Result<()> {
        self.state = WorkerState::Starting;
        if self.os_signals && self.signal_task.is_none() {
            self.signal_task = Some(install_signal_handlers(self.signal_tx.clone())?);
        }

        if let Err(e) = self.prune_dead_workers().await {
            tracing::warn!(worker = %self.id, error = %e, "Could not prune dead workers");
        }

        registry::register(self.store.as_ref(), &self.id).await?;
        self.state = WorkerState::Waiting;
        tracing::info!(worker = %self.id, "Worker started");
        Ok(())
    }

    /// Poll until shut down, sleeping `interval` whenever there is nothing to
    /// do. A zero interval returns after the first idle or paused poll.
    /// The worker is unregistered on the way out.
    pub async fn work(&mut self, interval: Duration) -> Result<()> {
        self.startup().await?;
        let result = self.run(interval).await;
        let unregistered = self.unregister().await;
        result.and(unregistered)
    }

    async fn run(&mut self, interval: Duration) -> Result<()> {
        loop {
            match self.tick().await? {
                Tick::ShuttingDown => break,
                Tick::Processed => continue,
                Tick::Idle | Tick::Paused => {
                    if interval.is_zero() {
                        break;
                    }
                    tracing::debug!(worker = %self.id, seconds = interval.as_secs_f64(), "Sleeping");
                    self.sleep(interval).await;
                }
            }
        }
        Ok(())
    }

    /// One pass of the loop: apply pending signals, then reserve and run at
    /// most one job.
    pub async fn tick(&mut self) -> Result<Tick> {
        self.drain_signals().await;

        if self.shutdown {
            self.state = WorkerState::ShuttingDown;
            return Ok(Tick::ShuttingDown);
        }
        if self.paused {
            self.state = WorkerState::Paused;
            return Ok(Tick::Paused);
        }

        self.state = WorkerState::Waiting;
        match self.reserve().await? {
            Some(job) => {
                self.process(job).await?;
                Ok(Tick::Processed)
            }
            None => Ok(Tick::Idle),
        }
    }

    /// Queues to poll, in priority order. `*` means every known queue,
    /// alphabetically, re-read on each call.
    pub async fn queues(&self) -> Result<Vec<String>> {
        if self.id.queues().iter().any(|q| q == "*") {
            let mut all = queue::queues(self.store.as_ref()).await?;
            all.sort();
            return Ok(all);
        }
        Ok(self.id.queues().to_vec())
    }

    /// The first job found scanning [`queues`](Self::queues) in order.
    pub async fn reserve(&self) -> Result<Option<Job>> {
        for name in self.queues().await? {
            tracing::debug!(worker = %self.id, queue = %name, "Checking queue");
            if let Some(job) = queue::reserve(self.store.as_ref(), &name).await? {
                tracing::debug!(worker = %self.id, queue = %name, job = %job, "Found job");
                return Ok(Some(job));
            }
        }
        Ok(None)
    }

    async fn process(&mut self, job: Job) -> Result<()> {
        let job = self.working_on(job).await?;

        let mut child = self.executor.spawn(&job)?;
        self.state = WorkerState::Forked;
        tracing::info!(worker = %self.id, job = %job, pid = ?child.id(), "Forked child for job");

        let exit = self.wait_for_child(&mut child).await?;
        if let Some(fault) = exit.fault() {
            let recorded = job
                .status(self.store.as_ref())
                .await?
                .is_some_and(|status| status.is_terminal());
            if !recorded {
                tracing::warn!(worker = %self.id, job = %job, error = %fault, "Job process exited dirty");
                job.fail(self.store.as_ref(), &fault).await?;
            }
        }

        self.done_working().await
    }

    /// Mark `job` as owned by this worker and running.
    pub async fn working_on(&mut self, mut job: Job) -> Result<Job> {
        job.worker = Some(self.id.to_string());
        job.update_status(self.store.as_ref(), JobStatus::Running)
            .await?;
        registry::set_working_on(self.store.as_ref(), &self.id, &job).await?;
        self.current_job = Some(job.clone());
        Ok(job)
    }

    /// Forget the current job and count it as processed.
    pub async fn done_working(&mut self) -> Result<()> {
        self.current_job = None;
        stat::incr(self.store.as_ref(), "processed").await?;
        stat::incr(self.store.as_ref(), &format!("processed:{}", self.id)).await?;
        registry::clear_working_on(self.store.as_ref(), &self.id).await?;
        if !self.shutdown {
            self.state = WorkerState::Waiting;
        }
        Ok(())
    }

    async fn wait_for_child(&mut self, child: &mut Child) -> Result<ChildExit> {
        let mut deadline = self.job_timeout.map(|t| Instant::now() + t);

        let status = loop {
            tokio::select! {
                status = child.wait() => break status?,
                Some(signal) = self.signal_rx.recv() => {
                    if self.handle_signal(signal).await {
                        self.kill_child(child);
                    }
                }
                _ = until(deadline) => {
                    tracing::warn!(worker = %self.id, timeout = ?self.job_timeout, "Job timed out");
                    self.kill_child(child);
                    deadline = None;
                }
            }
        };

        Ok(ChildExit::from_status(status))
    }

    /// SIGKILL the running job process, if it is still around.
    pub fn kill_child(&self, child: &mut Child) {
        let Some(pid) = child.id() else {
            return;
        };
        tracing::info!(worker = %self.id, pid, "Killing child");
        if let Err(e) = child.start_kill() {
            tracing::warn!(worker = %self.id, pid, error = %e, "Could not kill child");
        }
    }

    pub fn pause(&mut self) {
        tracing::info!(worker = %self.id, "Pausing job processing");
        self.paused = true;
    }

    pub fn resume(&mut self) {
        tracing::info!(worker = %self.id, "Resuming job processing");
        self.paused = false;
    }

    /// Stop after the current job.
    pub fn shutdown(&mut self) {
        tracing::info!(worker = %self.id, "Exiting after current job");
        self.shutdown = true;
    }

    /// Stop now. The caller kills any running job.
    pub fn shutdown_now(&mut self) {
        tracing::info!(worker = %self.id, "Shutting down now");
        self.shutdown = true;
    }

    async fn drain_signals(&mut self) {
        while let Ok(signal) = self.signal_rx.try_recv() {
            // Nothing is running between jobs, so there is no child to kill.
            self.handle_signal(signal).await;
        }
    }

    async fn sleep(&mut self, interval: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            Some(signal) = self.signal_rx.recv() => {
                self.handle_signal(signal).await;
            }
        }
    }

    /// Apply `signal`. Returns true when the running job must be killed.
    async fn handle_signal(&mut self, signal: WorkerSignal) -> bool {
        match signal {
            WorkerSignal::Terminate | WorkerSignal::Interrupt => {
                self.shutdown_now();
                true
            }
            WorkerSignal::Quit => {
                self.shutdown();
                false
            }
            WorkerSignal::KillChild => true,
            WorkerSignal::Pause => {
                self.pause();
                false
            }
            WorkerSignal::Resume => {
                self.resume();
                false
            }
            WorkerSignal::Reconnect => {
                tracing::info!(worker = %self.id, "Reconnecting to store");
                if let Err(e) = self.store.reconnect().await {
                    tracing::error!(worker = %self.id, error = %e, "Reconnect failed");
                }
                false
            }
        }
    }

    /// Unregister workers on this host whose process is gone.
    pub async fn prune_dead_workers(&self) -> Result<Vec<WorkerId>> {
        let live = process::live_pids().await?;
        self.prune_dead_workers_with(&live).await
    }

    /// [`prune_dead_workers`](Self::prune_dead_workers) against a given set of live pids.
    pub async fn prune_dead_workers_with(&self, live: &HashSet<u32>) -> Result<Vec<WorkerId>> {
        let own_pid = std::process::id();
        let mut pruned = Vec::new();

        for worker in registry::all(self.store.as_ref()).await? {
            if worker.hostname() != self.id.hostname()
                || live.contains(&worker.pid())
                || worker.pid() == own_pid
                || worker.pid() == self.id.pid()
            {
                continue;
            }
            tracing::info!(worker = %self.id, dead = %worker, "Pruning dead worker");
            registry::unregister(self.store.as_ref(), &worker, None).await?;
            pruned.push(worker);
        }

        Ok(pruned)
    }

    /// Remove this worker from the registry, failing any job it still holds.
    pub async fn unregister(&mut self) -> Result<()> {
        registry::unregister(self.store.as_ref(), &self.id, self.current_job.as_ref()).await?;
        self.current_job = None;
        tracing::info!(worker = %self.id, "Worker unregistered");
        Ok(())
    }

    /// The stored working-on record for this worker.
    pub async fn job(&self) -> Result<Option<WorkingOn>> {
        registry::working_on(self.store.as_ref(), &self.id).await
    }

    /// A per-worker statistic such as `processed` or `failed`.
    pub async fn stat(&self, name: &str) -> Result<i64> {
        stat::get(self.store.as_ref(), &format!("{}:{}", name, self.id)).await
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(task) = self.signal_task.take() {
            task.abort();
        }
    }
}

async fn until(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
