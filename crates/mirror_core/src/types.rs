use std::fmt;
use std::path::{Path, PathBuf};

use url::Url;

pub type TaskId = u64;

/// Task id reserved for the page fetch. Cancelling it aborts the whole run.
pub const PAGE_TASK_ID: TaskId = 0;

/// Closed set of asset categories. The kind alone decides the local folder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AssetKind {
    Image,
    Script,
    Stylesheet,
    Video,
    Font,
    CssImage,
    Other,
}

impl AssetKind {
    pub const ALL: [AssetKind; 7] = [
        AssetKind::Image,
        AssetKind::Script,
        AssetKind::Stylesheet,
        AssetKind::Video,
        AssetKind::Font,
        AssetKind::CssImage,
        AssetKind::Other,
    ];

    pub fn folder(self) -> &'static str {
        match self {
            AssetKind::Image => "img",
            AssetKind::Script => "js",
            AssetKind::Stylesheet => "css",
            AssetKind::Video => "video",
            AssetKind::Font => "fonts",
            AssetKind::CssImage => "css_img",
            AssetKind::Other => "other",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Script => "script",
            AssetKind::Stylesheet => "stylesheet",
            AssetKind::Video => "video",
            AssetKind::Font => "font",
            AssetKind::CssImage => "css-image",
            AssetKind::Other => "other",
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which construct inside a stylesheet produced a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssRule {
    Url,
    Import,
    FontFace,
}

/// Where a reference was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    Element { tag: String, attribute: String },
    Css { stylesheet: Url, rule: CssRule },
}

/// A single occurrence of a resource reference in a document.
///
/// `candidates` holds the absolute URLs to try, in order. `resolved` and
/// `local_path` stay empty until a download for one of the candidates
/// succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    pub raw: String,
    pub candidates: Vec<Url>,
    pub kind: AssetKind,
    pub origin: Origin,
    pub resolved: Option<Url>,
    pub local_path: Option<String>,
}

impl AssetReference {
    pub fn new(raw: impl Into<String>, candidates: Vec<Url>, kind: AssetKind, origin: Origin) -> Self {
        Self {
            raw: raw.into(),
            candidates,
            kind,
            origin,
            resolved: None,
            local_path: None,
        }
    }

    pub fn primary_url(&self) -> Option<&Url> {
        self.candidates.first()
    }

    /// Key used to collapse occurrences that would issue the same first request.
    pub fn dedup_key(&self) -> Option<&str> {
        self.primary_url().map(Url::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobOptions {
    /// Download at most one asset per kind and one reference per stylesheet.
    pub preview: bool,
    /// Accept invalid TLS certificates for every request of the run.
    pub ignore_ssl: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("invalid page url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("unsupported url scheme {0}, expected http or https")]
    UnsupportedScheme(String),
}

/// Everything needed to mirror one page. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageJob {
    source_url: Url,
    product_name: String,
    output_root: PathBuf,
    options: JobOptions,
}

impl PageJob {
    pub fn new(
        source_url: &str,
        product_name: impl Into<String>,
        output_root: impl Into<PathBuf>,
        options: JobOptions,
    ) -> Result<Self, JobError> {
        let trimmed = source_url.trim();
        let source_url = Url::parse(trimmed).map_err(|err| JobError::InvalidUrl {
            url: trimmed.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(source_url.scheme(), "http" | "https") {
            return Err(JobError::UnsupportedScheme(source_url.scheme().to_string()));
        }
        Ok(Self {
            source_url,
            product_name: product_name.into().trim().to_string(),
            output_root: output_root.into(),
            options,
        })
    }

    pub fn source_url(&self) -> &Url {
        &self.source_url
    }

    pub fn product_name(&self) -> &str {
        &self.product_name
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn options(&self) -> JobOptions {
        self.options
    }
}
