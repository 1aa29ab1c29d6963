//! The worker supervisor and everything it needs to run jobs.
//!
//! A worker is one OS process polling an ordered list of queues. Each job it
//! reserves runs in a child process of its own; the worker blocks until that
//! child exits and turns an abnormal exit into a dirty-exit failure.
//!
//! # Components
//!
//! - [`Worker`]: the supervisor state machine (startup, tick, work, prune)
//! - [`WorkerId`]: the `host:pid:queues` identity
//! - [`registry`]: fleet-wide worker registration and working-on records
//! - [`JobExecutor`]: launches the child process and reads its exit status
//! - [`child`]: what the child process does with the job it is handed
//! - [`signals`]: OS signal to [`WorkerSignal`] adapter
//! - [`process`]: live process table for dead-worker pruning
//!
//! # Job Flow
//!
//! 1. [`Worker::tick`] applies pending signals and reserves the first job
//!    found across its queues
//! 2. The job is marked Running and recorded under the worker's key
//! 3. [`JobExecutor::spawn`] starts `resq perform` with the job in its env
//! 4. The child reconnects, performs, records Complete or Failed, exits 0
//! 5. The parent records a dirty exit if the child did not exit cleanly,
//!    bumps the processed counters and clears the working-on record

pub mod child;
pub mod executor;
pub mod identity;
pub mod process;
pub mod registry;
pub mod signals;
pub mod supervisor;

pub use executor::{ChildExit, ExecutorConfig, JobExecutor};
pub use identity::WorkerId;
pub use registry::WorkingOn;
pub use signals::WorkerSignal;
pub use supervisor::{Tick, Worker, WorkerState};
