use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use mirror_core::TaskId;
use mirror_logging::RunLog;

use crate::control::RunControl;
use crate::fetch::ChannelProgressSink;
use crate::mirror::{Mirror, MirrorError, MirrorReport};
use crate::EngineEvent;

/// A mirroring run on its own thread and runtime.
///
/// Events arrive in emission order through [`EngineHandle::try_recv`]; the
/// outcome is collected with [`EngineHandle::wait`].
pub struct EngineHandle {
    control: RunControl,
    log: RunLog,
    event_rx: mpsc::Receiver<EngineEvent>,
    worker: thread::JoinHandle<Result<MirrorReport, MirrorError>>,
}

impl EngineHandle {
    pub fn start(mirror: Mirror) -> Self {
        let (event_tx, event_rx) = mpsc::channel();
        let control = RunControl::new();
        let log = RunLog::new();

        let worker = {
            let control = control.clone();
            let log = log.clone();
            thread::spawn(move || {
                let runtime = tokio::runtime::Builder::new_multi_thread()
                    .enable_all()
                    .build()
                    .map_err(|err| MirrorError::Runtime(err.to_string()))?;
                let sink = ChannelProgressSink::new(event_tx);
                runtime.block_on(mirror.run(&control, &sink, &log))
            })
        };

        Self {
            control,
            log,
            event_rx,
            worker,
        }
    }

    pub fn try_recv(&self) -> Option<EngineEvent> {
        self.event_rx.try_recv().ok()
    }

    /// Next event, or `None` on timeout or once the run has hung up.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<EngineEvent> {
        self.event_rx.recv_timeout(timeout).ok()
    }

    pub fn control(&self) -> &RunControl {
        &self.control
    }

    pub fn cancel_task(&self, task_id: TaskId) {
        self.control.cancel_task(task_id);
    }

    pub fn cancel_run(&self) {
        self.control.cancel_run();
    }

    pub fn log(&self) -> &RunLog {
        &self.log
    }

    pub fn is_finished(&self) -> bool {
        self.worker.is_finished()
    }

    /// Blocks until the run ends. Undelivered events stay readable through
    /// the returned receiver.
    pub fn wait(self) -> (Result<MirrorReport, MirrorError>, mpsc::Receiver<EngineEvent>) {
        let outcome = self
            .worker
            .join()
            .unwrap_or_else(|_| Err(MirrorError::Runtime("engine thread panicked".to_string())));
        (outcome, self.event_rx)
    }
}
