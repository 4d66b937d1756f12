//! Turns engine events into terminal lines.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use mirror_core::{format_bytes, format_duration, AssetKind, TaskId, TaskStatus, TransferClock};
use mirror_engine::{EngineEvent, MirrorReport, Stage};

/// Minimum spacing between two progress lines of the same task.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

struct Transfer {
    label: String,
    clock: TransferClock,
    received: u64,
    total: Option<u64>,
    last_line: Option<Instant>,
}

pub struct Console {
    quiet: bool,
    transfers: HashMap<TaskId, Transfer>,
}

impl Console {
    pub fn new(quiet: bool) -> Self {
        Self {
            quiet,
            transfers: HashMap::new(),
        }
    }

    /// The line to print for `event`, if any. Log events are left to the
    /// logger.
    pub fn render(&mut self, event: &EngineEvent, now: Instant) -> Option<String> {
        match event {
            EngineEvent::TaskQueued { task_id, kind, url } => {
                let label = match kind {
                    Some(kind) => format!("{kind} {url}"),
                    None => format!("page {url}"),
                };
                self.transfers.insert(
                    *task_id,
                    Transfer {
                        label,
                        clock: TransferClock::started_at(now),
                        received: 0,
                        total: None,
                        last_line: None,
                    },
                );
                None
            }
            EngineEvent::Progress(progress) => {
                let transfer = self.transfers.get_mut(&progress.task_id)?;
                transfer.received = progress.bytes_received;
                transfer.total = progress.bytes_total;
                if self.quiet || transfer.last_line.is_some_and(|at| now < at + PROGRESS_INTERVAL) {
                    return None;
                }
                transfer.last_line = Some(now);
                Some(progress_line(transfer, now))
            }
            EngineEvent::TaskFinished {
                task_id,
                status,
                local_path,
                error,
            } => {
                let transfer = self.transfers.remove(task_id)?;
                if self.quiet {
                    return None;
                }
                let line = match status {
                    TaskStatus::Succeeded => format!(
                        "  saved     {} -> {} ({})",
                        transfer.label,
                        local_path.as_deref().unwrap_or("?"),
                        format_bytes(transfer.received)
                    ),
                    TaskStatus::Cancelled => format!("  cancelled {}", transfer.label),
                    _ => format!(
                        "  failed    {}: {}",
                        transfer.label,
                        error.as_deref().unwrap_or("unknown error")
                    ),
                };
                Some(line)
            }
            EngineEvent::Stage(progress) => {
                let announce = progress.done == progress.total
                    && progress.total > 0
                    && matches!(progress.stage, Stage::Assets | Stage::CssAssets);
                (!self.quiet && announce)
                    .then(|| format!("{}: {}/{} done", progress.stage, progress.done, progress.total))
            }
            EngineEvent::Log(_) => None,
        }
    }
}

fn progress_line(transfer: &Transfer, now: Instant) -> String {
    let estimate = transfer.clock.estimate_at(now, transfer.received, transfer.total);
    let mut line = format!("  ...       {} {}", transfer.label, format_bytes(transfer.received));
    if let Some(total) = transfer.total {
        line.push_str(&format!(" / {}", format_bytes(total)));
    }
    if let Some(fraction) = estimate.fraction {
        line.push_str(&format!(" ({:.0}%)", fraction * 100.0));
    }
    if let Some(rate) = estimate.bytes_per_second {
        line.push_str(&format!(", {}/s", format_bytes(rate as u64)));
    }
    if let Some(remaining) = estimate.remaining.filter(|r| !r.is_zero()) {
        line.push_str(&format!(", {} left", format_duration(remaining)));
    }
    line
}

/// Multi-line run summary with one row per asset kind that saw any reference.
pub fn summary(report: &MirrorReport) -> String {
    let mut out = format!("Mirrored {} into {}\n", report.page_url, report.folder.display());
    out.push_str(&format!("  encoding: {}\n", report.encoding));
    for kind in AssetKind::ALL {
        let Some(counts) = report.counts.get(&kind) else {
            continue;
        };
        out.push_str(&format!(
            "  {:<10} {:>3} found, {:>3} saved, {:>3} failed, {:>3} cancelled, {:>3} skipped\n",
            kind.label(),
            counts.discovered,
            counts.downloaded,
            counts.failed,
            counts.cancelled,
            counts.skipped
        ));
    }
    if report.preserved_fonts > 0 {
        out.push_str(&format!("  {} absolute font URL(s) kept as-is\n", report.preserved_fonts));
    }
    if let Some(path) = &report.template_path {
        out.push_str(&format!("  template: {}\n", path.display()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{summary, Console};
    use mirror_core::{AssetKind, TaskStatus};
    use mirror_engine::{EngineEvent, KindCounts, MirrorReport, Stage, StageProgress, TaskProgress};
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::time::{Duration, Instant};
    use url::Url;

    fn queued(console: &mut Console, now: Instant) {
        let event = EngineEvent::TaskQueued {
            task_id: 3,
            kind: Some(AssetKind::Image),
            url: Url::parse("https://example.com/img/hero.jpg").unwrap(),
        };
        assert_eq!(console.render(&event, now), None);
    }

    fn progress(received: u64) -> EngineEvent {
        EngineEvent::Progress(TaskProgress {
            task_id: 3,
            status: TaskStatus::InFlight,
            bytes_received: received,
            bytes_total: Some(4096),
        })
    }

    #[test]
    fn progress_lines_are_throttled_and_carry_rate() {
        let start = Instant::now();
        let mut console = Console::new(false);
        queued(&mut console, start);

        let first = console.render(&progress(1024), start + Duration::from_secs(1)).unwrap();
        assert!(first.contains("image https://example.com/img/hero.jpg 1.00 KB / 4.00 KB (25%)"), "{first}");
        assert!(first.contains("1.00 KB/s"), "{first}");
        assert!(first.contains("3s left"), "{first}");

        assert_eq!(console.render(&progress(2048), start + Duration::from_millis(1200)), None);
        assert!(console.render(&progress(3072), start + Duration::from_secs(2)).is_some());
    }

    #[test]
    fn finished_task_reports_local_path() {
        let now = Instant::now();
        let mut console = Console::new(false);
        queued(&mut console, now);
        console.render(&progress(4096), now);

        let done = EngineEvent::TaskFinished {
            task_id: 3,
            status: TaskStatus::Succeeded,
            local_path: Some("img/hero.jpg".into()),
            error: None,
        };
        assert_eq!(
            console.render(&done, now).as_deref(),
            Some("  saved     image https://example.com/img/hero.jpg -> img/hero.jpg (4.00 KB)")
        );
    }

    #[test]
    fn quiet_mode_prints_nothing_per_task() {
        let now = Instant::now();
        let mut console = Console::new(true);
        queued(&mut console, now);
        assert_eq!(console.render(&progress(10), now), None);
        let stage = EngineEvent::Stage(StageProgress {
            stage: Stage::Assets,
            done: 1,
            total: 1,
        });
        assert_eq!(console.render(&stage, now), None);
    }

    #[test]
    fn summary_lists_kinds_with_references() {
        let mut counts = BTreeMap::new();
        counts.insert(
            AssetKind::Image,
            KindCounts {
                discovered: 3,
                downloaded: 2,
                failed: 1,
                cancelled: 0,
                skipped: 0,
            },
        );
        let report = MirrorReport {
            folder: PathBuf::from("output/acme"),
            index_path: PathBuf::from("output/acme/index.html"),
            local_index_path: None,
            template_path: None,
            page_url: Url::parse("https://example.com/").unwrap(),
            encoding: "UTF-8".into(),
            counts,
            preserved_fonts: 0,
            issues: Vec::new(),
        };

        let text = summary(&report);
        assert!(text.starts_with("Mirrored https://example.com/ into output/acme\n"));
        assert!(text.contains("image        3 found,   2 saved,   1 failed"));
        assert!(!text.contains("script"));
    }
}
