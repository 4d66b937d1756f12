//! Start-tag scanner for rewriting markup in place.
//!
//! The parsed DOM is used to decide *what* a document references; this module
//! finds *where* those references sit in the original text so they can be
//! replaced without reserializing (and thereby reformatting) the page.
//! Comments and the bodies of `<script>`/`<style>` are skipped.

use std::borrow::Cow;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

static START_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"<([A-Za-z][A-Za-z0-9:-]*)((?:\s*[^\s"'<>/=]+(?:\s*=\s*(?:"[^"]*"|'[^']*'|[^\s"'=<>`]+))?)*)\s*/?>"#,
    )
    .expect("start tag regex")
});

static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(\s*)([^\s"'<>/=]+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+)))?"#)
        .expect("attribute regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute<'a> {
    /// Lower-cased attribute name.
    pub name: String,
    /// Attribute text without leading whitespace, in document offsets.
    pub range: Range<usize>,
    /// Leading whitespace plus attribute text, in document offsets.
    pub full_range: Range<usize>,
    /// Value text (inside quotes when quoted), in document offsets.
    pub value_range: Option<Range<usize>>,
    pub quoted: bool,
    raw_value: Option<&'a str>,
}

impl Attribute<'_> {
    /// Attribute value with character references decoded.
    pub fn value(&self) -> Option<Cow<'_, str>> {
        self.raw_value.map(decode_entities)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartTag<'a> {
    /// Lower-cased tag name.
    pub name: String,
    pub range: Range<usize>,
    pub attributes: Vec<Attribute<'a>>,
}

impl StartTag<'_> {
    pub fn attr(&self, name: &str) -> Option<&Attribute<'_>> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// Offset right after the tag name, where new attributes can go.
    pub fn name_end(&self) -> usize {
        self.range.start + 1 + self.name.len()
    }
}

pub fn start_tags(html: &str) -> StartTags<'_> {
    StartTags { html, pos: 0 }
}

pub struct StartTags<'a> {
    html: &'a str,
    pos: usize,
}

impl<'a> Iterator for StartTags<'a> {
    type Item = StartTag<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.pos >= self.html.len() {
                return None;
            }
            let found = START_TAG.captures_at(self.html, self.pos);
            let comment = self.html[self.pos..].find("<!--").map(|i| i + self.pos);

            let Some(caps) = found else {
                self.pos = self.html.len();
                return None;
            };
            let whole = caps.get(0)?;

            if let Some(comment_start) = comment {
                if comment_start < whole.start() {
                    self.pos = match self.html[comment_start + 4..].find("-->") {
                        Some(end) => comment_start + 4 + end + 3,
                        None => self.html.len(),
                    };
                    continue;
                }
            }

            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let attributes = caps
                .get(2)
                .map(|area| parse_attributes(area.start(), area.as_str()))
                .unwrap_or_default();

            self.pos = whole.end();
            if matches!(name.as_str(), "script" | "style") {
                let closing = format!("</{name}");
                self.pos = find_ascii_case_insensitive(self.html, &closing, whole.end())
                    .unwrap_or(self.html.len());
            }

            return Some(StartTag {
                name,
                range: whole.range(),
                attributes,
            });
        }
    }
}

fn parse_attributes(offset: usize, area: &str) -> Vec<Attribute<'_>> {
    ATTRIBUTE
        .captures_iter(area)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(2)?;
            let (value, quoted) = match (caps.get(3), caps.get(4), caps.get(5)) {
                (Some(v), _, _) | (_, Some(v), _) => (Some(v), true),
                (_, _, Some(v)) => (Some(v), false),
                _ => (None, false),
            };
            Some(Attribute {
                name: name.as_str().to_ascii_lowercase(),
                range: offset + name.start()..offset + whole.end(),
                full_range: offset + whole.start()..offset + whole.end(),
                value_range: value.map(|v| offset + v.start()..offset + v.end()),
                quoted,
                raw_value: value.map(|v| v.as_str()),
            })
        })
        .collect()
}

pub(crate) fn find_ascii_case_insensitive(haystack: &str, needle: &str, from: usize) -> Option<usize> {
    let hay = haystack.as_bytes();
    let needle = needle.as_bytes();
    if needle.is_empty() || from > hay.len() || hay.len() - from < needle.len() {
        return None;
    }
    (from..=hay.len() - needle.len()).find(|&i| hay[i..i + needle.len()].eq_ignore_ascii_case(needle))
}

/// Pending replacements against one source text.
#[derive(Debug, Default)]
pub struct Edits {
    edits: Vec<(Range<usize>, String)>,
}

impl Edits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn replace(&mut self, range: Range<usize>, text: impl Into<String>) {
        self.edits.push((range, text.into()));
    }

    pub fn insert(&mut self, at: usize, text: impl Into<String>) {
        self.edits.push((at..at, text.into()));
    }

    pub fn remove_attribute(&mut self, attribute: &Attribute<'_>) {
        self.edits.push((attribute.full_range.clone(), String::new()));
    }

    /// Sets an attribute value, keeping the original quote style when quoted.
    pub fn set_attribute_value(&mut self, source: &str, attribute: &Attribute<'_>, value: &str) {
        match (&attribute.value_range, attribute.quoted) {
            (Some(range), true) => self.replace(range.clone(), value),
            _ => {
                let name = &source[attribute.range.start..attribute.range.start + attribute.name.len()];
                self.replace(attribute.range.clone(), format!("{name}=\"{value}\""));
            }
        }
    }

    /// Applies the edits. Overlapping edits after the first are dropped.
    pub fn apply(self, source: &str) -> String {
        self.apply_mapped(source, |kept, out| out.push_str(kept))
    }

    /// Applies the edits, passing every untouched stretch of `source` through
    /// `keep` on its way to the output.
    pub fn apply_mapped(mut self, source: &str, mut keep: impl FnMut(&str, &mut String)) -> String {
        self.edits.sort_by_key(|(range, _)| (range.start, range.end));
        let mut out = String::with_capacity(source.len());
        let mut cursor = 0;
        for (range, text) in self.edits {
            if range.start < cursor {
                continue;
            }
            keep(&source[cursor..range.start], &mut out);
            out.push_str(&text);
            cursor = range.end;
        }
        keep(&source[cursor..], &mut out);
        out
    }
}

/// Decodes the character references that commonly appear in URLs and text.
pub fn decode_entities(input: &str) -> Cow<'_, str> {
    if !input.contains('&') {
        return Cow::Borrowed(input);
    }
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(amp) = rest.find('&') {
        out.push_str(&rest[..amp]);
        let tail = &rest[amp..];
        match tail.find(';').filter(|&semi| semi <= 10).and_then(|semi| {
            decode_entity(&tail[1..semi]).map(|c| (c, semi))
        }) {
            Some((c, semi)) => {
                out.push(c);
                rest = &tail[semi + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "nbsp" => Some('\u{a0}'),
        _ => {
            let number = name.strip_prefix('#')?;
            let code = match number.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => number.parse().ok()?,
            };
            char::from_u32(code)
        }
    }
}

/// Escapes a value for a double-quoted attribute.
pub fn escape_attribute(value: &str) -> Cow<'_, str> {
    if !value.contains(['&', '"']) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(value.replace('&', "&amp;").replace('"', "&quot;"))
}
