use ego_tree::NodeRef;
use scraper::{ElementRef, Html, Node};
use url::Url;

use crate::resolve::{resolve_candidates, Rejection};
use crate::rewrite::is_noop_navigation_handler;
use crate::types::{AssetKind, AssetReference, Origin};

/// Outcome of classifying one reference-bearing element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Asset(AssetKind),
    /// Recognised but deliberately not downloaded (resource hints, page links).
    Ignored,
    Unclassifiable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unclassified {
    pub tag: String,
    pub raw: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedReference {
    pub raw: String,
    pub rejection: Rejection,
}

/// Everything the extractor learned about one HTML document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extraction {
    /// Asset references in document order, one entry per occurrence.
    pub references: Vec<AssetReference>,
    pub unclassified: Vec<Unclassified>,
    pub rejected: Vec<RejectedReference>,
    pub warnings: Vec<String>,
    /// Parser recoveries, including harmless ones such as a missing DOCTYPE.
    pub parse_errors: usize,
    /// Number of inline `onclick` handlers that localization will strip.
    pub noop_handlers: usize,
    /// Effective base URL (`<base href>` or the page URL).
    pub base: Option<Url>,
}

/// Attribute carrying the resource reference for a tag, if the tag can carry one.
pub fn reference_attribute(tag: &str) -> Option<&'static str> {
    match tag {
        "img" | "script" | "video" | "audio" | "source" | "track" | "iframe" => Some("src"),
        "link" => Some("href"),
        _ => None,
    }
}

const IGNORED_LINK_RELS: &[&str] = &[
    "preconnect",
    "dns-prefetch",
    "prefetch",
    "prerender",
    "modulepreload",
    "canonical",
    "alternate",
    "next",
    "prev",
    "author",
    "license",
    "search",
    "shortlink",
    "pingback",
    "amphtml",
];

const OTHER_LINK_RELS: &[&str] = &["icon", "apple-touch-icon", "apple-touch-icon-precomposed", "mask-icon", "manifest"];

/// Closed classification of a reference-bearing element.
pub fn classify(element: ElementRef<'_>) -> Classification {
    let el = element.value();
    match el.name() {
        "img" => Classification::Asset(AssetKind::Image),
        "script" => Classification::Asset(AssetKind::Script),
        "video" | "audio" | "track" => Classification::Asset(AssetKind::Video),
        "iframe" => Classification::Asset(AssetKind::Other),
        "source" => {
            let in_media = matches!(parent_tag(*element), Some("video" | "audio"));
            let video_type = el
                .attr("type")
                .is_some_and(|t| t.trim().to_ascii_lowercase().starts_with("video/"));
            if in_media || video_type {
                Classification::Asset(AssetKind::Video)
            } else {
                Classification::Asset(AssetKind::Image)
            }
        }
        "link" => classify_link(el.attr("rel"), el.attr("as")),
        other => Classification::Unclassifiable(format!("<{other}> carries no known asset")),
    }
}

fn classify_link(rel: Option<&str>, as_attr: Option<&str>) -> Classification {
    let Some(rel) = rel else {
        return Classification::Unclassifiable("link without rel".to_string());
    };
    let rels: Vec<String> = rel.split_ascii_whitespace().map(str::to_ascii_lowercase).collect();
    let has = |name: &str| rels.iter().any(|r| r == name);

    if has("stylesheet") {
        return Classification::Asset(AssetKind::Stylesheet);
    }
    if has("preload") {
        return match as_attr.map(|a| a.trim().to_ascii_lowercase()).as_deref() {
            Some("style") => Classification::Asset(AssetKind::Stylesheet),
            _ => Classification::Ignored,
        };
    }
    if rels.iter().any(|r| OTHER_LINK_RELS.contains(&r.as_str())) {
        return Classification::Asset(AssetKind::Other);
    }
    if rels.iter().any(|r| IGNORED_LINK_RELS.contains(&r.as_str())) {
        return Classification::Ignored;
    }
    Classification::Unclassifiable(format!("link rel=\"{rel}\""))
}

fn parent_tag(node: NodeRef<'_, Node>) -> Option<&str> {
    node.parent()
        .and_then(|parent| parent.value().as_element())
        .map(|el| el.name())
}

/// Scans an HTML document for asset references.
///
/// Never fails. Parser recoveries are only counted; markup the parser had to
/// drop (a document cut off inside a tag or comment) and unusable references
/// become warnings.
pub fn extract_assets(html: &str, page_url: &Url) -> Extraction {
    let document = Html::parse_document(html);
    let mut out = Extraction {
        parse_errors: document.errors.len(),
        ..Extraction::default()
    };

    let truncated = document.errors.iter().filter(|e| e.contains("EOF")).count();
    if truncated > 0 {
        out.warnings.push(format!(
            "malformed markup fragment at the end of {page_url} skipped ({} parser error(s) in total)",
            document.errors.len()
        ));
    }

    let base = effective_base(&document, page_url, &mut out.warnings);
    let bases = [base.clone()];

    for node in document.tree.root().descendants() {
        let Some(element) = ElementRef::wrap(node) else {
            continue;
        };
        let tag = element.value().name();

        if element
            .value()
            .attr("onclick")
            .is_some_and(is_noop_navigation_handler)
        {
            out.noop_handlers += 1;
        }

        let Some(attribute) = reference_attribute(tag) else {
            continue;
        };
        let Some(raw) = element.value().attr(attribute).map(str::trim) else {
            continue;
        };
        if raw.is_empty() {
            continue;
        }

        let kind = match classify(element) {
            Classification::Asset(kind) => kind,
            Classification::Ignored => continue,
            Classification::Unclassifiable(reason) => {
                out.unclassified.push(Unclassified {
                    tag: tag.to_string(),
                    raw: raw.to_string(),
                    reason,
                });
                continue;
            }
        };

        match resolve_candidates(raw, &bases) {
            Ok(candidates) => out.references.push(AssetReference::new(
                raw,
                candidates,
                kind,
                Origin::Element {
                    tag: tag.to_string(),
                    attribute: attribute.to_string(),
                },
            )),
            Err(rejection) => {
                if !rejection.is_benign() {
                    out.warnings
                        .push(format!("cannot resolve <{tag} {attribute}=\"{raw}\">: {rejection}"));
                }
                out.rejected.push(RejectedReference {
                    raw: raw.to_string(),
                    rejection,
                });
            }
        }
    }

    out.base = Some(base);
    out
}

fn effective_base(document: &Html, page_url: &Url, warnings: &mut Vec<String>) -> Url {
    let href = document
        .tree
        .root()
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "base" && el.value().attr("href").is_some())
        .and_then(|el| el.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty());

    match href {
        Some(href) => match page_url.join(href) {
            Ok(base) if matches!(base.scheme(), "http" | "https") => base,
            _ => {
                warnings.push(format!("ignoring unusable <base href=\"{href}\">"));
                page_url.clone()
            }
        },
        None => page_url.clone(),
    }
}
