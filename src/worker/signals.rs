use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;

/// External controls a worker reacts to between jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// Shut down now, killing any running job (SIGTERM).
    Terminate,
    /// Same as [`Terminate`](Self::Terminate) (SIGINT).
    Interrupt,
    /// Shut down once the running job finishes (SIGQUIT).
    Quit,
    /// Kill the running job but keep working (SIGUSR1).
    KillChild,
    /// Stop reserving jobs (SIGUSR2).
    Pause,
    /// Start reserving jobs again (SIGCONT).
    Resume,
    /// Reopen the store connection (SIGPIPE).
    Reconnect,
}

/// Forward OS signals into `tx` until the receiving side goes away.
pub fn install_signal_handlers(tx: mpsc::Sender<WorkerSignal>) -> Result<JoinHandle<()>> {
    let mut term = signal(SignalKind::terminate())?;
    let mut int = signal(SignalKind::interrupt())?;
    let mut quit = signal(SignalKind::quit())?;
    let mut usr1 = signal(SignalKind::user_defined1())?;
    let mut usr2 = signal(SignalKind::user_defined2())?;
    let mut cont = signal(SignalKind::from_raw(libc::SIGCONT))?;
    let mut pipe = signal(SignalKind::pipe())?;

    Ok(tokio::spawn(async move {
        loop {
            let received = tokio::select! {
                Some(()) = term.recv() => WorkerSignal::Terminate,
                Some(()) = int.recv() => WorkerSignal::Interrupt,
                Some(()) = quit.recv() => WorkerSignal::Quit,
                Some(()) = usr1.recv() => WorkerSignal::KillChild,
                Some(()) = usr2.recv() => WorkerSignal::Pause,
                Some(()) = cont.recv() => WorkerSignal::Resume,
                Some(()) = pipe.recv() => WorkerSignal::Reconnect,
                else => break,
            };
            tracing::debug!(signal = ?received, "Received signal");
            if tx.send(received).await.is_err() {
                break;
            }
        }
    }))
}
