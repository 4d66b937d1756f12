//! Substitution of remote references by local relative paths.
//!
//! Rewriting works on the original text through byte-range edits, so any
//! markup or CSS that is not a reference survives untouched. Only values
//! recorded in [`LocalPaths`] are replaced, so a second pass over rewritten
//! output finds nothing left to do unless a local path collides with another
//! reference's raw text, in which case the raw mapping wins.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::css;
use crate::extract::reference_attribute;
use crate::layout::relative_path;
use crate::markup::{escape_attribute, start_tags, Edits, StartTag};

static NOOP_HANDLER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r##"(?i)^\s*(?:javascript:\s*)?(?:void\s*\(\s*0\s*\)|void\s+0|return\s+false|(?:window\.|document\.)?location(?:\.href)?\s*=\s*(?:''|""|'#'|"#"))\s*;?\s*(?:return\s+false\s*;?\s*)?$"##,
    )
    .expect("no-op handler regex")
});

static CONTENT_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(charset\s*=\s*)["']?([^\s;"']+)["']?"#).expect("content charset regex")
});

static CSS_CHARSET_RULE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:\u{feff})?@charset\s+"([^"]*)"\s*;"#).expect("css charset rule regex")
});

/// Inline handlers that only suppress or fake navigation, e.g.
/// `javascript:void(0)`, `return false;` or `location.href='#'`.
pub fn is_noop_navigation_handler(handler: &str) -> bool {
    NOOP_HANDLER.is_match(handler)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    /// Downloaded copy, relative to the run folder.
    Local(String),
    /// Absolute URL kept for references that were not downloaded.
    Remote(String),
}

/// Raw reference text → replacement target for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalPaths {
    targets: HashMap<String, Target>,
}

impl LocalPaths {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, raw: &str, local_path: impl Into<String>) {
        self.targets
            .insert(raw.trim().to_string(), Target::Local(local_path.into()));
    }

    /// Points a reference at its absolute URL unless a local copy is already known.
    pub fn insert_remote(&mut self, raw: &str, url: impl Into<String>) {
        self.targets
            .entry(raw.trim().to_string())
            .or_insert_with(|| Target::Remote(url.into()));
    }

    pub fn get(&self, raw: &str) -> Option<&Target> {
        let raw = raw.trim();
        self.targets
            .get(raw)
            .or_else(|| self.targets.get(split_fragment(raw).0))
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    fn resolver<'a>(&'a self, document: &'a str) -> ValueRewriter<'a> {
        ValueRewriter {
            paths: self,
            document,
        }
    }
}

struct ValueRewriter<'a> {
    paths: &'a LocalPaths,
    document: &'a str,
}

impl ValueRewriter<'_> {
    /// New value for a reference, or `None` when it stays as it is.
    fn rewrite(&self, value: &str) -> Option<String> {
        let value = value.trim();
        let (_, fragment) = split_fragment(value);
        let mut local = match self.paths.get(value)? {
            Target::Local(path) => relative_path(self.document, path),
            Target::Remote(url) => url.clone(),
        };
        if let Some(fragment) = fragment {
            local.push('#');
            local.push_str(fragment);
        }
        (local != value).then_some(local)
    }
}

fn split_fragment(value: &str) -> (&str, Option<&str>) {
    match value.split_once('#') {
        Some((path, fragment)) => (path, Some(fragment)),
        None => (value, None),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HtmlRewrite {
    pub text: String,
    pub references_rewritten: usize,
    pub srcsets_dropped: usize,
    pub handlers_stripped: usize,
    /// `<meta>` charset declarations switched to UTF-8.
    pub charsets_updated: usize,
}

/// Localizes an HTML document saved at `document_path` (relative to the run folder).
///
/// Besides replacing references this drops `srcset` on `<img>`/`<source>`,
/// strips no-op `onclick` handlers and neutralises `<base href>`, which would
/// otherwise redirect the local relative paths back to the remote site.
/// The output is always saved as UTF-8, so `<meta>` charset declarations are
/// switched to `utf-8` as well.
pub fn rewrite_html(html: &str, document_path: &str, paths: &LocalPaths) -> HtmlRewrite {
    let values = paths.resolver(document_path);
    let mut edits = Edits::new();
    let mut out = HtmlRewrite::default();

    for tag in start_tags(html) {
        if let Some(attribute) = reference_attribute(&tag.name).and_then(|name| tag.attr(name)) {
            if let Some(local) = attribute.value().and_then(|value| values.rewrite(&value)) {
                edits.set_attribute_value(html, attribute, &escape_attribute(&local));
                out.references_rewritten += 1;
            }
        }

        if matches!(tag.name.as_str(), "img" | "source") {
            if let Some(srcset) = tag.attr("srcset") {
                edits.remove_attribute(srcset);
                out.srcsets_dropped += 1;
            }
        }

        if let Some(onclick) = tag.attr("onclick") {
            if onclick.value().is_some_and(|v| is_noop_navigation_handler(&v)) {
                edits.remove_attribute(onclick);
                out.handlers_stripped += 1;
            }
        }

        if tag.name == "base" {
            if let Some(href) = tag.attr("href") {
                edits.remove_attribute(href);
            }
        }

        if tag.name == "meta" && declare_utf8_in(html, &tag, &mut edits) {
            out.charsets_updated += 1;
        }
    }

    out.text = edits.apply(html);
    out
}

/// `html` with every `<meta>` charset declaration switched to `utf-8`, for
/// decoded markup that is written out without going through [`rewrite_html`].
pub fn declare_utf8(html: &str) -> String {
    let mut edits = Edits::new();
    for tag in start_tags(html).filter(|tag| tag.name == "meta") {
        declare_utf8_in(html, &tag, &mut edits);
    }
    edits.apply(html)
}

/// Queues the edits for one `<meta>` tag; true when it declared another charset.
fn declare_utf8_in(html: &str, tag: &StartTag<'_>, edits: &mut Edits) -> bool {
    if let Some(charset) = tag.attr("charset") {
        if charset.value().is_some_and(|v| !is_utf8_label(&v)) {
            edits.set_attribute_value(html, charset, "utf-8");
            return true;
        }
        return false;
    }

    let is_content_type = tag
        .attr("http-equiv")
        .and_then(|a| a.value())
        .is_some_and(|v| v.trim().eq_ignore_ascii_case("content-type"));
    let Some(content) = tag.attr("content").filter(|_| is_content_type) else {
        return false;
    };
    let Some(value) = content.value() else {
        return false;
    };
    let Some(caps) = CONTENT_CHARSET.captures(&value) else {
        return false;
    };
    if caps.get(2).is_some_and(|label| is_utf8_label(label.as_str())) {
        return false;
    }
    let updated = CONTENT_CHARSET.replace(&value, "${1}utf-8");
    edits.set_attribute_value(html, content, &escape_attribute(&updated));
    true
}

fn is_utf8_label(label: &str) -> bool {
    let label = label.trim();
    label.eq_ignore_ascii_case("utf-8") || label.eq_ignore_ascii_case("utf8")
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CssRewrite {
    pub text: String,
    pub references_rewritten: usize,
}

/// Localizes a stylesheet saved at `document_path` (relative to the run folder).
pub fn rewrite_css(css_text: &str, document_path: &str, paths: &LocalPaths) -> CssRewrite {
    let values = paths.resolver(document_path);
    let mut edits = Edits::new();
    let mut rewritten = 0;

    for occurrence in css::scan(css_text).occurrences {
        let Some(local) = values.rewrite(occurrence.raw) else {
            continue;
        };
        let needs_quotes = !occurrence.quoted
            && local.contains(|c: char| c.is_whitespace() || matches!(c, '(' | ')' | '\'' | '"'));
        if needs_quotes {
            edits.replace(occurrence.value_range, format!("\"{}\"", local.replace('"', "\\\"")));
        } else {
            edits.replace(occurrence.value_range, local);
        }
        rewritten += 1;
    }

    // A rewritten stylesheet is saved as UTF-8.
    if rewritten > 0 {
        if let Some(label) = CSS_CHARSET_RULE.captures(css_text).and_then(|caps| caps.get(1)) {
            if !is_utf8_label(label.as_str()) {
                edits.replace(label.range(), "UTF-8");
            }
        }
    }

    CssRewrite {
        text: edits.apply(css_text),
        references_rewritten: rewritten,
    }
}
