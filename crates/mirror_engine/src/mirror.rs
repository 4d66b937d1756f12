use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use mirror_core::{
    declare_utf8, extract_assets, generate_template, resolve_css_references, rewrite_css, rewrite_html, slugify,
    AssetKind, AssetReference, CssDocument, DownloadTask, LocalPaths, PageJob, Rejection, TaskId, TaskStatus,
    TemplateOutput, INDEX_FILE, LOCAL_INDEX_FILE, PAGE_TASK_ID, TEMPLATE_FILE,
};
use mirror_logging::{mirror_info, LogEntry, RunLog};
use url::Url;

use crate::admission::{Admission, AdmissionDecision};
use crate::control::RunControl;
use crate::decode::{decode_page, decode_stylesheet};
use crate::download::{fetch_page, DownloadManager};
use crate::fetch::{FetchSettings, Fetcher, ProgressSink, ReqwestFetcher, DEFAULT_USER_AGENT};
use crate::persist::{create_run_folder, AtomicFileWriter, PersistError};
use crate::registry::AssetRegistry;
use crate::reporter::Reporter;
use crate::{EngineEvent, FailureKind, FetchError, Stage, StageProgress};

#[derive(Debug, Clone)]
pub struct MirrorConfig {
    /// Size of the download worker pool.
    pub max_concurrent: usize,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub redirect_limit: usize,
    pub user_agent: String,
    /// Send the page URL as `Referer` with every request.
    pub send_referer: bool,
    /// How many levels of `@import` below a linked stylesheet are followed.
    pub max_css_depth: usize,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(30),
            redirect_limit: 10,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            send_referer: true,
            max_css_depth: 3,
        }
    }
}

impl MirrorConfig {
    pub fn fetch_settings(&self, job: &PageJob) -> FetchSettings {
        FetchSettings {
            connect_timeout: self.connect_timeout,
            read_timeout: self.read_timeout,
            redirect_limit: self.redirect_limit,
            user_agent: self.user_agent.clone(),
            referer: self.send_referer.then(|| job.source_url().clone()),
            accept_invalid_certs: job.options().ignore_ssl,
        }
    }
}

/// Failures that end a run. Asset-level failures never show up here.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    #[error("page fetch failed: {0}")]
    PageFetch(FetchError),
    #[error("run cancelled")]
    Cancelled,
    #[error("output error: {0}")]
    Output(#[from] PersistError),
    #[error("http client setup failed: {0}")]
    Client(FetchError),
    #[error("no page html found in {0}")]
    MissingSource(PathBuf),
    #[error("engine runtime failed: {0}")]
    Runtime(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KindCounts {
    /// References found, one per occurrence.
    pub discovered: usize,
    pub downloaded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// References held back by the preview caps.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct MirrorReport {
    pub folder: PathBuf,
    pub index_path: PathBuf,
    pub local_index_path: Option<PathBuf>,
    pub template_path: Option<PathBuf>,
    /// Page URL after redirects.
    pub page_url: Url,
    pub encoding: String,
    pub counts: BTreeMap<AssetKind, KindCounts>,
    pub preserved_fonts: usize,
    pub issues: Vec<LogEntry>,
}

impl MirrorReport {
    pub fn downloaded(&self) -> usize {
        self.counts.values().map(|c| c.downloaded).sum()
    }

    pub fn failed(&self) -> usize {
        self.counts.values().map(|c| c.failed).sum()
    }

    pub fn cancelled(&self) -> usize {
        self.counts.values().map(|c| c.cancelled).sum()
    }
}

/// Mirrors one page into a fresh folder below the job's output root.
pub struct Mirror {
    job: PageJob,
    config: MirrorConfig,
    fetcher: Arc<dyn Fetcher>,
}

impl Mirror {
    pub fn for_job(job: PageJob, config: MirrorConfig) -> Result<Self, MirrorError> {
        let fetcher = ReqwestFetcher::new(config.fetch_settings(&job)).map_err(MirrorError::Client)?;
        Ok(Self::with_fetcher(job, config, Arc::new(fetcher)))
    }

    pub fn with_fetcher(job: PageJob, config: MirrorConfig, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            job,
            config,
            fetcher,
        }
    }

    pub fn job(&self) -> &PageJob {
        &self.job
    }

    pub async fn run(
        &self,
        control: &RunControl,
        sink: &dyn ProgressSink,
        log: &RunLog,
    ) -> Result<MirrorReport, MirrorError> {
        let reporter = Reporter::new(sink, log);
        let source = self.job.source_url();
        let preview = self.job.options().preview;
        reporter.info(format!(
            "Mirroring {source}{}",
            if preview { " (preview)" } else { "" }
        ));
        if self.job.options().ignore_ssl {
            reporter.warn("TLS certificate verification is disabled for this run");
        }

        // Page: fetched and persisted before any asset work starts.
        reporter.emit(EngineEvent::Stage(StageProgress {
            stage: Stage::Page,
            done: 0,
            total: 1,
        }));
        reporter.emit(EngineEvent::TaskQueued {
            task_id: PAGE_TASK_ID,
            kind: None,
            url: source.clone(),
        });
        let page_token = control.token_for(PAGE_TASK_ID);
        let page = match fetch_page(self.fetcher.as_ref(), PAGE_TASK_ID, source, &page_token, &reporter).await {
            Ok(page) => page,
            Err(err) => {
                let cancelled = err.kind == FailureKind::Cancelled;
                reporter.emit(EngineEvent::TaskFinished {
                    task_id: PAGE_TASK_ID,
                    status: if cancelled { TaskStatus::Cancelled } else { TaskStatus::Failed },
                    local_path: None,
                    error: Some(err.to_string()),
                });
                if cancelled {
                    reporter.info("Run cancelled before the page arrived");
                    return Err(MirrorError::Cancelled);
                }
                reporter.error(format!("Could not fetch {source}: {err}"));
                return Err(MirrorError::PageFetch(err));
            }
        };

        let folder = create_run_folder(self.job.output_root(), &slugify(self.job.product_name()))?;
        let writer = AtomicFileWriter::new(folder.clone());
        let index_path = writer.write_bytes(INDEX_FILE, &page.bytes)?;
        reporter.emit(EngineEvent::TaskFinished {
            task_id: PAGE_TASK_ID,
            status: TaskStatus::Succeeded,
            local_path: Some(INDEX_FILE.to_string()),
            error: None,
        });
        reporter.emit(EngineEvent::Stage(StageProgress {
            stage: Stage::Page,
            done: 1,
            total: 1,
        }));
        reporter.info(format!(
            "Saved {} bytes to {}",
            page.bytes.len(),
            index_path.display()
        ));
        checkpoint(control, &reporter)?;

        let page_url = page.metadata.final_url.clone();
        if &page_url != source {
            reporter.info(format!("Page redirected to {page_url}"));
        }
        let decoded = decode_page(&page.bytes, page.metadata.content_type.as_deref());
        if decoded.had_errors {
            reporter.warn(format!(
                "Page is not valid {}; malformed bytes were replaced",
                decoded.encoding_label
            ));
        }

        let extraction = extract_assets(&decoded.text, &page_url);
        if extraction.parse_errors > 0 {
            reporter.debug(format!("html parser recovered from {} error(s)", extraction.parse_errors));
        }
        for warning in &extraction.warnings {
            reporter.warn(warning.clone());
        }
        for item in &extraction.unclassified {
            reporter.warn(format!(
                "Unclassifiable <{}> reference \"{}\": {}",
                item.tag, item.raw, item.reason
            ));
        }
        for rejected in &extraction.rejected {
            report_rejection(&reporter, &rejected.raw, &rejected.rejection);
        }

        let registry = AssetRegistry::new();
        let manager = DownloadManager {
            fetcher: self.fetcher.as_ref(),
            registry: &registry,
            control,
            reporter: &reporter,
            folder: &folder,
            max_concurrent: self.config.max_concurrent,
        };
        let mut plan = Plan::new(preview);

        let (tasks, html_assignment) = plan.admit(&extraction.references, &reporter);
        reporter.info(format!(
            "Found {} asset reference(s), {} to download",
            extraction.references.len(),
            tasks.len()
        ));
        let finished = manager.run(Stage::Assets, tasks).await;
        plan.record(finished);
        checkpoint(control, &reporter)?;

        // Stylesheets, level by level through @import.
        let mut processed = HashSet::new();
        let mut stylesheets = Vec::new();
        let mut queue = Vec::new();
        for task in plan.succeeded(AssetKind::Stylesheet) {
            if let Some(doc) = load_stylesheet(&folder, task, 0, &mut processed, &reporter) {
                queue.push(doc);
            }
        }

        while !queue.is_empty() {
            let mut scanned = Vec::new();
            let mut wave = Vec::new();
            for mut doc in queue.drain(..) {
                let scan = resolve_css_references(&doc.text, &doc.url, &page_url);
                for warning in scan.warnings {
                    reporter.warn(warning);
                }
                for (raw, rejection) in &scan.rejected {
                    report_rejection(&reporter, raw, rejection);
                }
                for font in &scan.preserved_fonts {
                    reporter.info(format!("Keeping absolute font URL {font} in {}", doc.local_path));
                }
                plan.preserved_fonts += scan.preserved_fonts.len();
                let (tasks, assignment) = plan.admit(&scan.references, &reporter);
                wave.extend(tasks);
                doc.references = scan.references;
                scanned.push((doc, assignment));
            }

            let finished = manager.run(Stage::CssAssets, wave).await;
            plan.record(finished);
            checkpoint(control, &reporter)?;

            for (mut doc, assignment) in scanned {
                let paths = plan.local_paths(&doc.references, &assignment);
                let rewritten = rewrite_css(&doc.text, &doc.local_path, &paths);
                if rewritten.references_rewritten > 0 {
                    match writer.write(&doc.local_path, &rewritten.text) {
                        Ok(_) => doc.rewritten = Some(rewritten.text),
                        Err(err) => reporter.error(format!("Could not rewrite {}: {err}", doc.local_path)),
                    }
                }

                for (reference, task_id) in doc.references.iter().zip(&assignment) {
                    if reference.kind != AssetKind::Stylesheet {
                        continue;
                    }
                    let Some(task) = task_id.and_then(|id| plan.outcome(id)) else {
                        continue;
                    };
                    if task.status() != TaskStatus::Succeeded {
                        continue;
                    }
                    if doc.depth + 1 > self.config.max_css_depth {
                        reporter.warn(format!(
                            "@import \"{}\" in {} is nested deeper than {} level(s), not scanned",
                            reference.raw, doc.local_path, self.config.max_css_depth
                        ));
                        continue;
                    }
                    if let Some(next) = load_stylesheet(&folder, task, doc.depth + 1, &mut processed, &reporter) {
                        queue.push(next);
                    }
                }
                stylesheets.push(doc);
            }
        }
        if !stylesheets.is_empty() {
            let localized = stylesheets.iter().filter(|doc| doc.rewritten.is_some()).count();
            reporter.info(format!(
                "Scanned {} stylesheet(s), {localized} rewritten",
                stylesheets.len()
            ));
        }

        // Localized page.
        reporter.emit(EngineEvent::Stage(StageProgress {
            stage: Stage::Rewrite,
            done: 0,
            total: 1,
        }));
        let paths = plan.local_paths(&extraction.references, &html_assignment);
        let localized = rewrite_html(&decoded.text, LOCAL_INDEX_FILE, &paths);
        let local_index_path = match writer.write(LOCAL_INDEX_FILE, &localized.text) {
            Ok(path) => Some(path),
            Err(err) => {
                reporter.error(format!("Could not write {LOCAL_INDEX_FILE}: {err}"));
                None
            }
        };
        reporter.info(format!(
            "Localized page: {} reference(s) rewritten, {} srcset attribute(s) dropped, {} inline handler(s) stripped",
            localized.references_rewritten, localized.srcsets_dropped, localized.handlers_stripped
        ));
        if localized.charsets_updated > 0 {
            reporter.debug(format!(
                "Declared charset switched from {} to utf-8",
                decoded.encoding_label
            ));
        }
        reporter.emit(EngineEvent::Stage(StageProgress {
            stage: Stage::Rewrite,
            done: 1,
            total: 1,
        }));

        // Template.
        let template_source = if local_index_path.is_some() {
            localized.text
        } else {
            declare_utf8(&decoded.text)
        };
        let template = generate_template(&template_source, self.job.product_name());
        let template_path = match writer.write(TEMPLATE_FILE, &template.text) {
            Ok(path) => Some(path),
            Err(err) => {
                reporter.error(format!("Could not write {TEMPLATE_FILE}: {err}"));
                None
            }
        };
        report_template(&reporter, &template);
        reporter.emit(EngineEvent::Stage(StageProgress {
            stage: Stage::Template,
            done: 1,
            total: 1,
        }));

        let report = MirrorReport {
            folder,
            index_path,
            local_index_path,
            template_path,
            page_url,
            encoding: decoded.encoding_label,
            counts: plan.counts,
            preserved_fonts: plan.preserved_fonts,
            issues: Vec::new(),
        };
        reporter.info(format!(
            "Finished {}: {} downloaded, {} failed, {} cancelled",
            report.folder.display(),
            report.downloaded(),
            report.failed(),
            report.cancelled()
        ));
        reporter.emit(EngineEvent::Stage(StageProgress {
            stage: Stage::Done,
            done: 1,
            total: 1,
        }));

        Ok(MirrorReport {
            issues: log.issues(),
            ..report
        })
    }
}

/// Rebuilds `content.php` from a finished run folder without any network access.
pub fn regenerate_template(folder: &Path, product_name: &str) -> Result<TemplateOutput, MirrorError> {
    let text = match fs::read(folder.join(LOCAL_INDEX_FILE)) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => match fs::read(folder.join(INDEX_FILE)) {
            Ok(bytes) => declare_utf8(&decode_page(&bytes, None).text),
            Err(_) => return Err(MirrorError::MissingSource(folder.to_path_buf())),
        },
    };
    let output = generate_template(&text, product_name);
    let path = AtomicFileWriter::new(folder.to_path_buf()).write(TEMPLATE_FILE, &output.text)?;
    mirror_info!(
        "Regenerated {} ({} product mention(s), {} CTA link(s))",
        path.display(),
        output.product_mentions,
        output.cta_links
    );
    Ok(output)
}

fn checkpoint(control: &RunControl, reporter: &Reporter<'_>) -> Result<(), MirrorError> {
    if control.is_run_cancelled() {
        reporter.info("Run cancelled; files already saved are kept");
        return Err(MirrorError::Cancelled);
    }
    Ok(())
}

fn report_rejection(reporter: &Reporter<'_>, raw: &str, rejection: &Rejection) {
    if rejection.is_benign() {
        reporter.debug(format!("not downloading \"{raw}\": {rejection}"));
    } else {
        reporter.warn(format!("Skipping \"{raw}\": {rejection}"));
    }
}

fn report_template(reporter: &Reporter<'_>, template: &TemplateOutput) {
    reporter.info(format!(
        "Template: {} product mention(s), {} CTA link(s)",
        template.product_mentions, template.cta_links
    ));
    if !template.header_inserted {
        reporter.warn("No </title> found; header marker not inserted");
    }
    if template.cta_links == 0 {
        reporter.warn("No \"order\" link found for the CTA marker");
    }
}

fn load_stylesheet(
    folder: &Path,
    task: &DownloadTask,
    depth: usize,
    processed: &mut HashSet<String>,
    reporter: &Reporter<'_>,
) -> Option<CssDocument> {
    let local_path = task.local_path()?;
    if !processed.insert(local_path.to_string()) {
        return None;
    }
    let url = task
        .reference
        .resolved
        .clone()
        .or_else(|| task.reference.primary_url().cloned())?;
    match fs::read(folder.join(local_path)) {
        Ok(bytes) => {
            let decoded = decode_stylesheet(&bytes);
            if decoded.had_errors {
                reporter.warn(format!("{local_path} is not valid {}", decoded.encoding_label));
            }
            Some(CssDocument::new(url, local_path, decoded.text, depth))
        }
        Err(err) => {
            reporter.error(format!("Could not read back {local_path}: {err}"));
            None
        }
    }
}

/// Task bookkeeping across the HTML wave and every stylesheet wave.
struct Plan {
    admission: Admission,
    next_id: TaskId,
    outcomes: HashMap<TaskId, DownloadTask>,
    counts: BTreeMap<AssetKind, KindCounts>,
    preserved_fonts: usize,
}

impl Plan {
    fn new(preview: bool) -> Self {
        Self {
            admission: Admission::new(preview),
            next_id: PAGE_TASK_ID + 1,
            outcomes: HashMap::new(),
            counts: BTreeMap::new(),
            preserved_fonts: 0,
        }
    }

    /// New tasks to run, plus the task serving each reference (by index).
    fn admit(
        &mut self,
        references: &[AssetReference],
        reporter: &Reporter<'_>,
    ) -> (Vec<DownloadTask>, Vec<Option<TaskId>>) {
        let mut tasks = Vec::new();
        let mut assignment = Vec::with_capacity(references.len());

        for reference in references {
            self.counts.entry(reference.kind).or_default().discovered += 1;
            let offered = self.next_id;
            let decision = self.admission.consider(reference, offered);
            match decision {
                AdmissionDecision::Admit => {
                    let id = offered;
                    self.next_id += 1;
                    if let Some(url) = reference.primary_url() {
                        reporter.emit(EngineEvent::TaskQueued {
                            task_id: id,
                            kind: Some(reference.kind),
                            url: url.clone(),
                        });
                    }
                    tasks.push(DownloadTask::new(id, reference.clone()));
                }
                AdmissionDecision::Duplicate(_) => {}
                AdmissionDecision::PreviewKindCap | AdmissionDecision::PreviewDocumentCap => {
                    self.counts.entry(reference.kind).or_default().skipped += 1;
                    reporter.debug(format!("preview: skipping {} \"{}\"", reference.kind, reference.raw));
                }
                AdmissionDecision::NoCandidate => {
                    reporter.debug(format!("no URL candidate for \"{}\"", reference.raw));
                }
            }
            assignment.push(decision.task_id(offered));
        }
        (tasks, assignment)
    }

    fn record(&mut self, finished: Vec<DownloadTask>) {
        for task in finished {
            let counts = self.counts.entry(task.reference.kind).or_default();
            match task.status() {
                TaskStatus::Succeeded => counts.downloaded += 1,
                TaskStatus::Cancelled => counts.cancelled += 1,
                _ => counts.failed += 1,
            }
            self.outcomes.insert(task.id, task);
        }
    }

    fn outcome(&self, id: TaskId) -> Option<&DownloadTask> {
        self.outcomes.get(&id)
    }

    fn succeeded(&self, kind: AssetKind) -> Vec<&DownloadTask> {
        let mut tasks: Vec<_> = self
            .outcomes
            .values()
            .filter(|t| t.reference.kind == kind && t.status() == TaskStatus::Succeeded)
            .collect();
        tasks.sort_by_key(|t| t.id);
        tasks
    }

    /// Replacement targets for one document: the local copy when the serving
    /// task succeeded, the absolute URL otherwise.
    fn local_paths(&self, references: &[AssetReference], assignment: &[Option<TaskId>]) -> LocalPaths {
        let mut paths = LocalPaths::new();
        for (reference, task_id) in references.iter().zip(assignment) {
            let local = task_id
                .and_then(|id| self.outcome(id))
                .and_then(DownloadTask::local_path);
            match local {
                Some(local) => paths.insert(&reference.raw, local),
                None => {
                    if let Some(url) = reference.primary_url() {
                        paths.insert_remote(&reference.raw, url.as_str());
                    }
                }
            }
        }
        paths
    }
}
