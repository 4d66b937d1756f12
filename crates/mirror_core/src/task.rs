use url::Url;

use crate::types::{AssetReference, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    InFlight,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// `Failed -> InFlight` is the only way back, used when falling back to
    /// the next URL candidate.
    pub fn can_transition_to(self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, InFlight)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (InFlight, Succeeded)
                | (InFlight, Failed)
                | (InFlight, Cancelled)
                | (Failed, InFlight)
                | (Failed, Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid task transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// Download state of one unique asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub id: TaskId,
    pub reference: AssetReference,
    status: TaskStatus,
    bytes_received: u64,
    bytes_total: Option<u64>,
    error: Option<String>,
    attempts: usize,
}

impl DownloadTask {
    pub fn new(id: TaskId, reference: AssetReference) -> Self {
        Self {
            id,
            reference,
            status: TaskStatus::Pending,
            bytes_received: 0,
            bytes_total: None,
            error: None,
            attempts: 0,
        }
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    pub fn bytes_total(&self) -> Option<u64> {
        self.bytes_total
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn local_path(&self) -> Option<&str> {
        self.reference.local_path.as_deref()
    }

    pub fn begin_attempt(&mut self) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::InFlight)?;
        self.attempts += 1;
        Ok(())
    }

    /// Records transfer progress. Returns `true` when the visible values
    /// advanced; values never move backwards, even across fallback attempts.
    pub fn record_progress(&mut self, received: u64, total: Option<u64>) -> bool {
        let mut changed = false;
        if received > self.bytes_received {
            self.bytes_received = received;
            changed = true;
        }
        if let Some(total) = total {
            let grows = self.bytes_total.map_or(true, |current| total > current);
            if grows && total >= self.bytes_received {
                self.bytes_total = Some(total);
                changed = true;
            }
        }
        changed
    }

    pub fn succeed(&mut self, resolved: Url, local_path: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Succeeded)?;
        self.error = None;
        self.reference.resolved = Some(resolved);
        self.reference.local_path = Some(local_path.into());
        Ok(())
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    pub fn cancel(&mut self) -> Result<(), InvalidTransition> {
        self.transition(TaskStatus::Cancelled)
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), InvalidTransition> {
        if !self.status.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{DownloadTask, TaskStatus};
    use crate::types::{AssetKind, AssetReference, Origin};
    use url::Url;

    fn task() -> DownloadTask {
        let url = Url::parse("https://example.com/a.png").unwrap();
        let reference = AssetReference::new(
            "a.png",
            vec![url],
            AssetKind::Image,
            Origin::Element {
                tag: "img".into(),
                attribute: "src".into(),
            },
        );
        DownloadTask::new(1, reference)
    }

    #[test]
    fn succeeded_and_cancelled_are_absorbing() {
        let mut t = task();
        t.begin_attempt().unwrap();
        t.succeed(Url::parse("https://example.com/a.png").unwrap(), "img/a.png")
            .unwrap();
        assert!(t.fail("late").is_err());
        assert!(t.cancel().is_err());
        assert!(t.begin_attempt().is_err());
        assert_eq!(t.status(), TaskStatus::Succeeded);

        let mut t = task();
        t.cancel().unwrap();
        assert!(t.begin_attempt().is_err());
        assert_eq!(t.status(), TaskStatus::Cancelled);
    }

    #[test]
    fn failed_can_retry_with_next_candidate() {
        let mut t = task();
        t.begin_attempt().unwrap();
        t.fail("http status 404").unwrap();
        t.begin_attempt().unwrap();
        assert_eq!(t.status(), TaskStatus::InFlight);
        assert_eq!(t.attempts(), 2);
    }

    #[test]
    fn progress_never_decreases() {
        let mut t = task();
        assert!(t.record_progress(100, Some(1000)));
        assert!(t.record_progress(400, Some(1000)));
        assert!(!t.record_progress(50, Some(200)));
        assert_eq!(t.bytes_received(), 400);
        assert_eq!(t.bytes_total(), Some(1000));
    }
}
