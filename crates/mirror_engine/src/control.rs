use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use mirror_core::{TaskId, PAGE_TASK_ID};
use tokio_util::sync::CancellationToken;

/// Cancellation handle for one run. Clones control the same run.
///
/// Every task observes a child of the run token, so cancelling the run
/// reaches all outstanding tasks while cancelling one task leaves its
/// siblings alone.
#[derive(Debug, Clone, Default)]
pub struct RunControl {
    inner: Arc<ControlInner>,
}

#[derive(Debug, Default)]
struct ControlInner {
    run: CancellationToken,
    tasks: Mutex<TaskTokens>,
}

#[derive(Debug, Default)]
struct TaskTokens {
    live: HashMap<TaskId, CancellationToken>,
    /// Cancelled before the task asked for its token.
    early: HashSet<TaskId>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel_run(&self) {
        self.inner.run.cancel();
    }

    pub fn is_run_cancelled(&self) -> bool {
        self.inner.run.is_cancelled()
    }

    /// Cancels one task. The page task id cancels the whole run.
    pub fn cancel_task(&self, task_id: TaskId) {
        if task_id == PAGE_TASK_ID {
            self.cancel_run();
            return;
        }
        let mut tasks = self.lock();
        match tasks.live.get(&task_id) {
            Some(token) => token.cancel(),
            None => {
                tasks.early.insert(task_id);
            }
        }
    }

    /// Token observed by `task_id`; the page task gets the run token itself.
    pub fn token_for(&self, task_id: TaskId) -> CancellationToken {
        if task_id == PAGE_TASK_ID {
            return self.inner.run.clone();
        }
        let mut tasks = self.lock();
        let early = tasks.early.remove(&task_id);
        let token = tasks
            .live
            .entry(task_id)
            .or_insert_with(|| self.inner.run.child_token())
            .clone();
        if early {
            token.cancel();
        }
        token
    }

    pub fn is_task_cancelled(&self, task_id: TaskId) -> bool {
        if self.is_run_cancelled() {
            return true;
        }
        let tasks = self.lock();
        tasks.early.contains(&task_id)
            || tasks
                .live
                .get(&task_id)
                .is_some_and(CancellationToken::is_cancelled)
    }

    fn lock(&self) -> MutexGuard<'_, TaskTokens> {
        self.inner.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::RunControl;

    #[test]
    fn task_cancel_does_not_touch_siblings() {
        let control = RunControl::new();
        let a = control.token_for(1);
        let b = control.token_for(2);
        control.cancel_task(1);
        assert!(a.is_cancelled());
        assert!(!b.is_cancelled());
        assert!(!control.is_run_cancelled());
    }

    #[test]
    fn early_cancel_applies_when_token_is_requested() {
        let control = RunControl::new();
        control.cancel_task(7);
        assert!(control.is_task_cancelled(7));
        assert!(control.token_for(7).is_cancelled());
    }

    #[test]
    fn page_task_cancels_everything() {
        let control = RunControl::new();
        let asset = control.token_for(3);
        control.cancel_task(0);
        assert!(control.is_run_cancelled());
        assert!(asset.is_cancelled());
        assert!(control.token_for(4).is_cancelled());
    }
}
