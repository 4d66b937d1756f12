use std::path::{Component, Path};

use sha2::{Digest, Sha256};
use url::Url;

/// Raw page response, byte-exact.
pub const INDEX_FILE: &str = "index.html";
/// Page with references rewritten to local copies.
pub const LOCAL_INDEX_FILE: &str = "local-index.html";
/// Templated variant of the localized page.
pub const TEMPLATE_FILE: &str = "content.php";

const MAX_STEM_LEN: usize = 80;

/// Folder-safe slug of a product name: lower-case ASCII alphanumerics joined by `-`.
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    if slug.is_empty() {
        slug.push_str("page");
    }
    slug
}

/// Local file name for a downloaded URL.
///
/// Uses the last path segment, adds an extension from the content type when
/// the segment has none, and appends a short hash of the query so that
/// `css2?family=A` and `css2?family=B` land in different files.
pub fn file_name_for(url: &Url, content_type: Option<&str>) -> String {
    let segment = url
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .unwrap_or_default();
    let sanitized = sanitize(segment);
    let (stem, mut ext) = split_extension(&sanitized);
    let mut stem = if stem.is_empty() { "file".to_string() } else { stem.to_string() };

    if ext.is_empty() {
        if let Some(guessed) = content_type.and_then(extension_for_mime) {
            ext = guessed;
        }
    }

    if let Some(query) = url.query().filter(|q| !q.is_empty()) {
        stem.push('-');
        stem.push_str(&short_hash(query));
    }

    if is_reserved_windows_name(&stem) {
        stem.push('_');
    }

    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}

/// `name`, or `name` with `-n` before the extension for n >= 2.
pub fn disambiguate(name: &str, n: usize) -> String {
    if n < 2 {
        return name.to_string();
    }
    let (stem, ext) = split_extension(name);
    if ext.is_empty() {
        format!("{stem}-{n}")
    } else {
        format!("{stem}-{n}.{ext}")
    }
}

/// Path of `target` as seen from the file `from_file`, both relative to the
/// run folder, always with `/` separators.
pub fn relative_path(from_file: &str, target: &str) -> String {
    let from_dir = Path::new(from_file).parent().unwrap_or_else(|| Path::new(""));
    let diff = pathdiff::diff_paths(Path::new(target), from_dir)
        .unwrap_or_else(|| Path::new(target).to_path_buf());
    let parts: Vec<String> = diff
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            Component::ParentDir => Some("..".to_string()),
            _ => None,
        })
        .collect();
    parts.join("/")
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() => (&name[..dot], &name[dot + 1..]),
        _ => (name, ""),
    }
}

fn sanitize(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if is_forbidden(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_matches(&['_', ' ', '.'][..]);

    let (stem, ext) = split_extension(cleaned);
    let mut stem: String = stem.chars().take(MAX_STEM_LEN).collect();
    let ext: String = ext.chars().take(10).collect::<String>().to_ascii_lowercase();
    if !ext.is_empty() {
        stem.push('.');
        stem.push_str(&ext);
    }
    stem
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '%' | '#' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

fn extension_for_mime(content_type: &str) -> Option<&'static str> {
    let mime = content_type.split(';').next()?.trim().to_ascii_lowercase();
    let ext = match mime.as_str() {
        "text/css" => "css",
        "text/javascript" | "application/javascript" | "application/x-javascript" => "js",
        "text/html" => "html",
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/gif" => "gif",
        "image/webp" => "webp",
        "image/avif" => "avif",
        "image/svg+xml" => "svg",
        "image/x-icon" | "image/vnd.microsoft.icon" => "ico",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "video/ogg" => "ogv",
        "audio/mpeg" => "mp3",
        "text/vtt" => "vtt",
        "font/woff" | "application/font-woff" => "woff",
        "font/woff2" => "woff2",
        "font/ttf" | "application/x-font-ttf" => "ttf",
        "font/otf" => "otf",
        "application/vnd.ms-fontobject" => "eot",
        "application/manifest+json" | "application/json" => "json",
        _ => return None,
    };
    Some(ext)
}

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    let mut hex = String::with_capacity(8);
    for byte in digest.iter().take(4) {
        use std::fmt::Write;
        let _ = write!(&mut hex, "{byte:02x}");
    }
    hex
}

#[cfg(test)]
mod tests {
    use super::{disambiguate, file_name_for, relative_path, slugify};
    use url::Url;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn slug_collapses_punctuation() {
        assert_eq!(slugify("  Aqua Max 2000!! "), "aqua-max-2000");
        assert_eq!(slugify("Crème brûlée"), "cr-me-br-l-e");
        assert_eq!(slugify("???"), "page");
    }

    #[test]
    fn names_come_from_last_segment() {
        assert_eq!(file_name_for(&url("https://h/a/b/Logo.PNG"), None), "Logo.png");
        assert_eq!(file_name_for(&url("https://h/a/b/"), Some("text/html")), "file.html");
        assert_eq!(file_name_for(&url("https://h/con"), None), "con_");
    }

    #[test]
    fn content_type_supplies_missing_extension() {
        assert_eq!(
            file_name_for(&url("https://h/pixel"), Some("image/png; charset=binary")),
            "pixel.png"
        );
        assert_eq!(file_name_for(&url("https://h/x.js"), Some("text/plain")), "x.js");
    }

    #[test]
    fn query_hash_separates_variants() {
        let a = file_name_for(&url("https://fonts.example/css2?family=A"), Some("text/css"));
        let b = file_name_for(&url("https://fonts.example/css2?family=B"), Some("text/css"));
        assert_ne!(a, b);
        assert!(a.starts_with("css2-") && a.ends_with(".css"));
        assert_eq!(a, file_name_for(&url("https://fonts.example/css2?family=A"), Some("text/css")));
    }

    #[test]
    fn percent_and_forbidden_characters_are_replaced() {
        assert_eq!(file_name_for(&url("https://h/my%20pic.jpg"), None), "my_20pic.jpg");
    }

    #[test]
    fn disambiguation_keeps_extension() {
        assert_eq!(disambiguate("a.png", 1), "a.png");
        assert_eq!(disambiguate("a.png", 2), "a-2.png");
        assert_eq!(disambiguate("file", 3), "file-3");
    }

    #[test]
    fn relative_paths_between_folders() {
        assert_eq!(relative_path("local-index.html", "img/a.png"), "img/a.png");
        assert_eq!(relative_path("css/site.css", "css_img/x.png"), "../css_img/x.png");
        assert_eq!(relative_path("css/site.css", "css/other.css"), "other.css");
    }
}
