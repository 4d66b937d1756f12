//! Stylesheet reference scanning.
//!
//! Every `url(...)` and `@import` in a stylesheet is turned into an
//! [`AssetReference`] whose candidates are resolved against, in order, the
//! stylesheet URL, the page URL and the stylesheet host root. Each reference
//! is resolved on its own; there is no per-stylesheet winning base.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use url::Url;

use crate::resolve::{authority_root, classify_reference, resolve_candidates, Rejection};
use crate::types::{AssetKind, AssetReference, CssRule, Origin};

static COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("comment regex"));

static FONT_FACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)@font-face\s*\{[^}]*\}").expect("font-face regex"));

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)@import\s+(?:url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)|"([^"]*)"|'([^']*)')"#,
    )
    .expect("import regex")
});

static URL_FN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)url\(\s*(?:"([^"]*)"|'([^']*)'|([^)"'\s]*))\s*\)"#).expect("url regex")
});

static URL_OPEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)url\(").expect("url open regex"));

const FONT_EXTENSIONS: &[&str] = &[".woff", ".woff2", ".ttf", ".otf", ".eot"];

/// True when the reference path ends in a web font extension.
pub fn is_font_url(reference: &str) -> bool {
    let path = reference
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    FONT_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

/// One textual reference inside a stylesheet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Occurrence<'a> {
    pub raw: &'a str,
    /// Value text without quotes, in stylesheet offsets.
    pub value_range: Range<usize>,
    pub quoted: bool,
    pub rule: CssRule,
}

pub(crate) struct Scan<'a> {
    pub occurrences: Vec<Occurrence<'a>>,
    pub unterminated: Vec<usize>,
}

pub(crate) fn scan(css: &str) -> Scan<'_> {
    let comments: Vec<Range<usize>> = COMMENT.find_iter(css).map(|m| m.range()).collect();
    let in_comment = |pos: usize| comments.iter().any(|c| c.contains(&pos));

    let font_faces: Vec<Range<usize>> = FONT_FACE
        .find_iter(css)
        .filter(|m| !in_comment(m.start()))
        .map(|m| m.range())
        .collect();

    let mut occurrences = Vec::new();
    let mut import_ranges = Vec::new();

    for caps in IMPORT.captures_iter(css) {
        let Some(whole) = caps.get(0) else { continue };
        if in_comment(whole.start()) {
            continue;
        }
        import_ranges.push(whole.range());
        let value = (1..=5).find_map(|i| caps.get(i).map(|m| (i, m)));
        if let Some((group, m)) = value {
            occurrences.push(Occurrence {
                raw: m.as_str(),
                value_range: m.range(),
                quoted: group != 3,
                rule: CssRule::Import,
            });
        }
    }

    let mut matched_opens = Vec::new();
    for caps in URL_FN.captures_iter(css) {
        let Some(whole) = caps.get(0) else { continue };
        matched_opens.push(whole.start());
        if in_comment(whole.start()) || import_ranges.iter().any(|r| r.contains(&whole.start())) {
            continue;
        }
        let Some((group, m)) = (1..=3).find_map(|i| caps.get(i).map(|m| (i, m))) else {
            continue;
        };
        let rule = if font_faces.iter().any(|r| r.contains(&whole.start())) {
            CssRule::FontFace
        } else {
            CssRule::Url
        };
        occurrences.push(Occurrence {
            raw: m.as_str(),
            value_range: m.range(),
            quoted: group != 3,
            rule,
        });
    }

    let unterminated = URL_OPEN
        .find_iter(css)
        .map(|m| m.start())
        .filter(|start| !matched_opens.contains(start) && !in_comment(*start))
        .collect();

    occurrences.sort_by_key(|o| o.value_range.start);
    Scan {
        occurrences,
        unterminated,
    }
}

/// Result of scanning one stylesheet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssScan {
    /// Downloadable references in source order.
    pub references: Vec<AssetReference>,
    /// Absolute font URLs left untouched and never fetched.
    pub preserved_fonts: Vec<String>,
    pub rejected: Vec<(String, Rejection)>,
    pub warnings: Vec<String>,
}

/// Scans `css` (served from `css_url`, linked from `page_url`) for references.
pub fn resolve_css_references(css: &str, css_url: &Url, page_url: &Url) -> CssScan {
    let mut bases = vec![css_url.clone(), page_url.clone()];
    if let Some(root) = authority_root(css_url) {
        bases.push(root);
    }

    let scanned = scan(css);
    let mut out = CssScan::default();

    for offset in scanned.unterminated {
        out.warnings
            .push(format!("unterminated url( at byte {offset} in {css_url}, skipped"));
    }

    for occurrence in scanned.occurrences {
        let raw = occurrence.raw.trim();
        let form = match classify_reference(raw) {
            Ok(form) => form,
            Err(rejection) => {
                if !rejection.is_benign() {
                    out.warnings.push(format!("cannot resolve {raw:?} in {css_url}: {rejection}"));
                }
                out.rejected.push((raw.to_string(), rejection));
                continue;
            }
        };

        let kind = match occurrence.rule {
            CssRule::Import => AssetKind::Stylesheet,
            CssRule::FontFace => AssetKind::Font,
            CssRule::Url if is_font_url(raw) => AssetKind::Font,
            CssRule::Url => AssetKind::CssImage,
        };

        if kind == AssetKind::Font && !form.is_relative() {
            out.preserved_fonts.push(raw.to_string());
            continue;
        }

        match resolve_candidates(raw, &bases) {
            Ok(candidates) => out.references.push(AssetReference::new(
                raw,
                candidates,
                kind,
                Origin::Css {
                    stylesheet: css_url.clone(),
                    rule: occurrence.rule,
                },
            )),
            Err(rejection) => {
                out.warnings.push(format!("cannot resolve {raw:?} in {css_url}: {rejection}"));
                out.rejected.push((raw.to_string(), rejection));
            }
        }
    }

    out
}

/// A downloaded stylesheet moving through scan, download and rewrite.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssDocument {
    pub url: Url,
    /// Local path of the stylesheet relative to the run folder.
    pub local_path: String,
    pub text: String,
    pub references: Vec<AssetReference>,
    pub rewritten: Option<String>,
    /// `@import` nesting level; stylesheets linked from HTML are level 0.
    pub depth: usize,
}

impl CssDocument {
    pub fn new(url: Url, local_path: impl Into<String>, text: impl Into<String>, depth: usize) -> Self {
        Self {
            url,
            local_path: local_path.into(),
            text: text.into(),
            references: Vec::new(),
            rewritten: None,
            depth,
        }
    }
}
