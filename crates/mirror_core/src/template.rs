use std::sync::LazyLock;

use regex::Regex;

use crate::markup::{decode_entities, find_ascii_case_insensitive, start_tags, Edits};

/// Replaces every literal occurrence of the product name.
pub const PRODUCT_NAME_MARKER: &str = "<?=$productName;?>";
/// Replaces the `href` of "order" call-to-action anchors.
pub const CTA_LINK_MARKER: &str = "<?php echo $ctaLink; ?>";
/// Inserted on its own line right after the first `</title>`.
pub const HEADERS_MARKER: &str = "<?= $headers; ?>";

static TITLE_END: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</title\s*>").expect("title regex"));

static INNER_TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").expect("tag regex"));

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateOutput {
    pub text: String,
    pub product_mentions: usize,
    pub cta_links: usize,
    pub header_inserted: bool,
}

/// Derives the template artifact from (preferably localized) page HTML.
///
/// "Order" links are found on the source text, so a product name inside the
/// link text does not hide them. Product-name substitution then runs on
/// everything except the replaced `href` values, which keeps the inserted
/// markers intact. An empty product name substitutes nothing.
pub fn generate_template(html: &str, product_name: &str) -> TemplateOutput {
    let product_name = product_name.trim();
    let cta = order_link_edits(html);
    let cta_links = cta.len();

    let mut product_mentions = 0;
    let text = cta.apply_mapped(html, |kept, out| {
        if product_name.is_empty() {
            out.push_str(kept);
            return;
        }
        product_mentions += kept.matches(product_name).count();
        out.push_str(&kept.replace(product_name, PRODUCT_NAME_MARKER));
    });

    let (text, header_inserted) = match TITLE_END.find(&text) {
        Some(m) => {
            let mut out = String::with_capacity(text.len() + HEADERS_MARKER.len() + 1);
            out.push_str(&text[..m.end()]);
            out.push('\n');
            out.push_str(HEADERS_MARKER);
            out.push_str(&text[m.end()..]);
            (out, true)
        }
        None => (text, false),
    };

    TemplateOutput {
        text,
        product_mentions,
        cta_links,
        header_inserted,
    }
}

fn order_link_edits(html: &str) -> Edits {
    let mut edits = Edits::new();
    for tag in start_tags(html).filter(|t| t.name == "a") {
        let body_end = find_ascii_case_insensitive(html, "</a", tag.range.end).unwrap_or(html.len());
        let inner = &html[tag.range.end..body_end];
        if !visible_text(inner).to_lowercase().contains("order") {
            continue;
        }
        match tag.attr("href") {
            Some(href) => edits.set_attribute_value(html, href, CTA_LINK_MARKER),
            None => edits.insert(tag.name_end(), format!(" href=\"{CTA_LINK_MARKER}\"")),
        }
    }
    edits
}

fn visible_text(fragment: &str) -> String {
    decode_entities(&INNER_TAG.replace_all(fragment, " ")).into_owned()
}

#[cfg(test)]
mod tests {
    use super::visible_text;

    #[test]
    fn visible_text_ignores_markup_and_attributes() {
        assert_eq!(visible_text("<span class=\"order\">Buy</span>").trim(), "Buy");
        assert!(visible_text("<b>Order</b>&nbsp;now").to_lowercase().contains("order"));
    }
}
