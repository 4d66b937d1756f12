use std::path::Path;

use futures_util::{stream, StreamExt};
use mirror_core::{file_name_for, DownloadTask, TaskId, TaskStatus};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::control::RunControl;
use crate::fetch::{FetchResponse, Fetcher};
use crate::persist::StagedFile;
use crate::registry::{AssetRegistry, Slot, TransferCancelled};
use crate::reporter::Reporter;
use crate::{EngineEvent, FailureKind, FetchError, FetchOutput, Stage, StageProgress, TaskProgress};

/// Executes asset tasks with bounded concurrency.
///
/// Each task walks its URL candidates in order until one is saved. Outcomes
/// are shared per URL through the [`AssetRegistry`], so a URL is fetched at
/// most once per run no matter how many tasks reach it.
pub(crate) struct DownloadManager<'a> {
    pub fetcher: &'a dyn Fetcher,
    pub registry: &'a AssetRegistry,
    pub control: &'a RunControl,
    pub reporter: &'a Reporter<'a>,
    pub folder: &'a Path,
    pub max_concurrent: usize,
}

enum StreamEnd {
    Cancelled,
    Failed(String),
}

impl DownloadManager<'_> {
    /// Runs one wave of tasks and returns them in completion order.
    pub async fn run(&self, stage: Stage, tasks: Vec<DownloadTask>) -> Vec<DownloadTask> {
        let total = tasks.len();
        self.reporter.emit(EngineEvent::Stage(StageProgress {
            stage,
            done: 0,
            total,
        }));

        let mut finished = Vec::with_capacity(total);
        let mut pending = stream::iter(tasks)
            .map(|task| self.execute(task))
            .buffer_unordered(self.max_concurrent.max(1));

        while let Some(task) = pending.next().await {
            finished.push(task);
            self.reporter.emit(EngineEvent::Stage(StageProgress {
                stage,
                done: finished.len(),
                total,
            }));
        }
        finished
    }

    async fn execute(&self, mut task: DownloadTask) -> DownloadTask {
        let token = self.control.token_for(task.id);
        let candidates = task.reference.candidates.clone();
        let mut last_error = None;

        for (index, candidate) in candidates.iter().enumerate() {
            if token.is_cancelled() {
                break;
            }
            let cell = self.registry.slot(candidate);
            let attempt = &mut task;
            let watched = &token;
            // A task waiting on another task's transfer still honours its own token.
            let outcome = tokio::select! {
                biased;
                slot = cell.get_or_try_init(move || self.transfer(attempt, candidate, watched)) => {
                    slot.ok().cloned()
                }
                _ = token.cancelled() => None,
            };
            let Some(slot) = outcome else {
                break;
            };

            match slot {
                Slot::Saved {
                    local_path,
                    final_url,
                } => {
                    if task.status() != TaskStatus::InFlight {
                        let _ = task.begin_attempt();
                    }
                    if let Err(err) = task.succeed(final_url, local_path) {
                        self.reporter.debug(format!("task {}: {err}", task.id));
                    }
                    if index > 0 {
                        self.reporter.info(format!(
                            "{} \"{}\" resolved via fallback candidate {candidate}",
                            task.reference.kind, task.reference.raw
                        ));
                    }
                    break;
                }
                Slot::Failed(message) => {
                    self.reporter
                        .debug(format!("task {} candidate {candidate} failed: {message}", task.id));
                    if task.status() != TaskStatus::Failed {
                        let _ = task.fail(message.clone());
                    }
                    last_error = Some(message);
                }
            }
        }

        self.finish(&mut task, &token, last_error);
        task
    }

    fn finish(&self, task: &mut DownloadTask, token: &CancellationToken, last_error: Option<String>) {
        let reference = &task.reference;
        match task.status() {
            TaskStatus::Succeeded => {
                self.reporter.debug(format!(
                    "saved {} as {}",
                    reference.raw,
                    task.local_path().unwrap_or_default()
                ));
            }
            _ if token.is_cancelled() => {
                let _ = task.cancel();
                self.reporter
                    .info(format!("cancelled {} \"{}\"", task.reference.kind, task.reference.raw));
            }
            _ => {
                let attempts = reference.candidates.len();
                let message = format!(
                    "failed to download {} \"{}\" after {attempts} candidate(s): {}",
                    reference.kind,
                    reference.raw,
                    last_error.as_deref().unwrap_or("no candidate")
                );
                if task.status() != TaskStatus::Failed {
                    let _ = task.fail(message.clone());
                }
                self.reporter.error(message);
            }
        }

        self.reporter.emit(EngineEvent::TaskFinished {
            task_id: task.id,
            status: task.status(),
            local_path: task.local_path().map(str::to_string),
            error: task.error().map(str::to_string),
        });
    }

    /// Fetches one candidate into its final file. Runs at most once per URL
    /// unless cancelled, in which case the URL stays open for other tasks.
    async fn transfer(
        &self,
        task: &mut DownloadTask,
        url: &Url,
        token: &CancellationToken,
    ) -> Result<Slot, TransferCancelled> {
        if token.is_cancelled() {
            return Err(TransferCancelled);
        }
        if let Err(err) = task.begin_attempt() {
            return Ok(Slot::Failed(err.to_string()));
        }
        self.emit_progress(task);

        let opened = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(TransferCancelled),
            opened = self.fetcher.open(url) => opened,
        };
        let mut response = match opened {
            Ok(response) => response,
            Err(err) => {
                let message = format!("{url}: {err}");
                let _ = task.fail(message.clone());
                return Ok(Slot::Failed(message));
            }
        };

        let file_name = file_name_for(url, response.metadata.content_type.as_deref());
        let local_path = self.registry.reserve_path(task.reference.kind, &file_name);

        match self.stream_to_file(task, &mut response, &local_path, token).await {
            Ok(()) => Ok(Slot::Saved {
                local_path,
                final_url: response.metadata.final_url,
            }),
            Err(StreamEnd::Cancelled) => {
                self.registry.release_path(&local_path);
                Err(TransferCancelled)
            }
            Err(StreamEnd::Failed(message)) => {
                self.registry.release_path(&local_path);
                let _ = task.fail(message.clone());
                Ok(Slot::Failed(message))
            }
        }
    }

    async fn stream_to_file(
        &self,
        task: &mut DownloadTask,
        response: &mut FetchResponse,
        local_path: &str,
        token: &CancellationToken,
    ) -> Result<(), StreamEnd> {
        let target = self.folder.join(local_path);
        let mut staged = StagedFile::create(target)
            .map_err(|err| StreamEnd::Failed(format!("{local_path}: {err}")))?;
        let total = response.metadata.content_length;
        if task.record_progress(0, total) {
            self.emit_progress(task);
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(StreamEnd::Cancelled),
                next = response.body.next() => next,
            };
            match next {
                None => break,
                Some(Ok(chunk)) => {
                    staged
                        .write_chunk(&chunk)
                        .map_err(|err| StreamEnd::Failed(format!("{local_path}: {err}")))?;
                    if task.record_progress(staged.written(), total) {
                        self.emit_progress(task);
                    }
                }
                Some(Err(err)) => {
                    return Err(StreamEnd::Failed(format!(
                        "{}: {err}",
                        response.metadata.original_url
                    )))
                }
            }
        }

        staged
            .commit()
            .map_err(|err| StreamEnd::Failed(format!("{local_path}: {err}")))?;
        Ok(())
    }

    fn emit_progress(&self, task: &DownloadTask) {
        self.reporter.emit(EngineEvent::Progress(TaskProgress {
            task_id: task.id,
            status: task.status(),
            bytes_received: task.bytes_received(),
            bytes_total: task.bytes_total(),
        }));
    }
}

/// Fetches the page body into memory, reporting progress as `task_id`.
pub(crate) async fn fetch_page(
    fetcher: &dyn Fetcher,
    task_id: TaskId,
    url: &Url,
    token: &CancellationToken,
    reporter: &Reporter<'_>,
) -> Result<FetchOutput, FetchError> {
    let cancelled = || FetchError::new(FailureKind::Cancelled, format!("fetch of {url} cancelled"));

    let opened = tokio::select! {
        biased;
        _ = token.cancelled() => return Err(cancelled()),
        opened = fetcher.open(url) => opened,
    };
    let mut response = opened?;
    let total = response.metadata.content_length;
    let mut bytes = Vec::new();

    let progress = |received: u64, status: TaskStatus| {
        EngineEvent::Progress(TaskProgress {
            task_id,
            status,
            bytes_received: received,
            bytes_total: total.filter(|t| *t >= received),
        })
    };
    reporter.emit(progress(0, TaskStatus::InFlight));

    loop {
        let next = tokio::select! {
            biased;
            _ = token.cancelled() => return Err(cancelled()),
            next = response.body.next() => next,
        };
        match next {
            None => break,
            Some(Ok(chunk)) => {
                bytes.extend_from_slice(&chunk);
                reporter.emit(progress(bytes.len() as u64, TaskStatus::InFlight));
            }
            Some(Err(err)) => return Err(err),
        }
    }

    Ok(FetchOutput {
        bytes,
        metadata: response.metadata,
    })
}
