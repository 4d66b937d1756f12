use std::sync::LazyLock;

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8};
use regex::bytes::Regex;

static META_CHARSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<meta[^>]+charset\s*=\s*["']?\s*([A-Za-z0-9_:.\-]+)"#).expect("meta charset regex")
});

static CSS_CHARSET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^@charset\s+"([^"]+)"\s*;"#).expect("css charset regex"));

/// Bytes inspected for a `<meta charset>` declaration.
const META_PRESCAN_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPage {
    pub text: String,
    pub encoding_label: String,
    /// Malformed sequences were replaced with U+FFFD.
    pub had_errors: bool,
}

/// Decodes page bytes to UTF-8: BOM -> Content-Type charset -> `<meta>`
/// charset -> chardetng guess. Never fails; undecodable bytes become U+FFFD.
pub fn decode_page(bytes: &[u8], content_type: Option<&str>) -> DecodedPage {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(enc) = content_type
        .and_then(extract_charset)
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    let head = &bytes[..bytes.len().min(META_PRESCAN_LEN)];
    if let Some(enc) = META_CHARSET
        .captures(head)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_bytes()))
    {
        return decode_with(bytes, enc);
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let enc = detector.guess(None, true);
    decode_with(bytes, enc)
}

/// Decodes stylesheet bytes: BOM -> `@charset` rule -> UTF-8.
pub fn decode_stylesheet(bytes: &[u8]) -> DecodedPage {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }
    let declared = CSS_CHARSET
        .captures(bytes)
        .and_then(|caps| caps.get(1))
        .and_then(|label| Encoding::for_label(label.as_bytes()));
    decode_with(bytes, declared.unwrap_or(UTF_8))
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let (key, value) = part.split_once('=')?;
            key.trim()
                .eq_ignore_ascii_case("charset")
                .then(|| value.trim_matches([' ', '"', '\''].as_ref()).to_string())
        })
        .next()
}

fn decode_with(bytes: &[u8], enc: &'static Encoding) -> DecodedPage {
    let (text, used, had_errors) = enc.decode(bytes);
    DecodedPage {
        text: text.into_owned(),
        encoding_label: used.name().to_string(),
        had_errors,
    }
}

#[cfg(test)]
mod tests {
    use super::{decode_page, decode_stylesheet};

    #[test]
    fn bom_wins_over_header() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("café".as_bytes());
        let page = decode_page(&bytes, Some("text/html; charset=iso-8859-1"));
        assert_eq!(page.text, "café");
        assert_eq!(page.encoding_label, "UTF-8");
    }

    #[test]
    fn header_charset_is_case_insensitive() {
        let page = decode_page(b"caf\xe9", Some("text/html; Charset=\"ISO-8859-1\""));
        assert_eq!(page.text, "café");
        assert!(!page.had_errors);
    }

    #[test]
    fn meta_charset_is_used_without_header() {
        let html = b"<html><head><meta charset=\"windows-1252\"></head><body>\x93hi\x94</body></html>";
        let page = decode_page(html, Some("text/html"));
        assert_eq!(page.encoding_label, "windows-1252");
        assert!(page.text.contains("\u{201c}hi\u{201d}"));
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let page = decode_page(b"ok \xff\xfe\xfd", Some("text/html; charset=utf-8"));
        assert!(page.had_errors);
        assert!(page.text.starts_with("ok "));
    }

    #[test]
    fn stylesheet_charset_rule() {
        let css = decode_stylesheet(b"@charset \"iso-8859-1\";\na::after{content:\"\xe9\"}");
        assert!(css.text.contains('\u{e9}'));
        assert_eq!(decode_stylesheet(b"a{}").encoding_label, "UTF-8");
    }
}
