use mirror_core::{declare_utf8, rewrite_css, rewrite_html, LocalPaths, LOCAL_INDEX_FILE};
use pretty_assertions::assert_eq;

fn html_paths() -> LocalPaths {
    let mut paths = LocalPaths::new();
    paths.insert("img/hero.jpg", "img/hero.jpg");
    paths.insert("https://cdn.example.net/app.js?v=3", "js/app-1a2b3c4d.js");
    paths.insert("/css/site.css", "css/site.css");
    paths.insert("//cdn.example.net/logo.svg#mark", "img/logo.svg");
    paths
}

#[test]
fn references_are_replaced_with_local_paths() {
    let html = r#"<html><head><link rel="stylesheet" href="/css/site.css"></head>
<body><img src="img/hero.jpg" srcset="img/hero@2x.jpg 2x" alt="Hero">
<img src='//cdn.example.net/logo.svg#mark'>
<script src="https://cdn.example.net/app.js?v=3"></script>
<img src="https://elsewhere.example.org/failed.png"></body></html>"#;

    let out = rewrite_html(html, LOCAL_INDEX_FILE, &html_paths());

    assert_eq!(
        out.text,
        r#"<html><head><link rel="stylesheet" href="css/site.css"></head>
<body><img src="img/hero.jpg" alt="Hero">
<img src='img/logo.svg#mark'>
<script src="js/app-1a2b3c4d.js"></script>
<img src="https://elsewhere.example.org/failed.png"></body></html>"#
    );
    assert_eq!(out.references_rewritten, 3);
    assert_eq!(out.srcsets_dropped, 1);
}

#[test]
fn html_rewrite_is_idempotent() {
    let html = r##"<base href="https://shop.example.com/"><img src="/css/site.css" srcset="x 2x">
<a href="#" onclick="javascript:void(0)">Order</a><script src="https://cdn.example.net/app.js?v=3"></script>"##;
    let paths = html_paths();
    let once = rewrite_html(html, LOCAL_INDEX_FILE, &paths);
    let twice = rewrite_html(&once.text, LOCAL_INDEX_FILE, &paths);
    assert_eq!(twice.text, once.text);
    assert_eq!(twice.references_rewritten, 0);
    assert_eq!(once.handlers_stripped, 1);
}

#[test]
fn base_href_and_noop_handlers_are_removed() {
    let html = r##"<base href="https://shop.example.com/"><a href="#" onclick="return false;">x</a><a onclick="track()">y</a>"##;
    let out = rewrite_html(html, LOCAL_INDEX_FILE, &LocalPaths::new());
    assert_eq!(out.text, r##"<base><a href="#">x</a><a onclick="track()">y</a>"##);
}

#[test]
fn commented_out_markup_is_left_alone() {
    let html = "<!-- <img src=\"/css/site.css\"> --><img src=\"/css/site.css\">";
    let out = rewrite_html(html, LOCAL_INDEX_FILE, &html_paths());
    assert_eq!(
        out.text,
        "<!-- <img src=\"/css/site.css\"> --><img src=\"css/site.css\">"
    );
}

#[test]
fn css_paths_are_relative_to_the_stylesheet() {
    let mut paths = LocalPaths::new();
    paths.insert("../img/x.png", "css_img/x.png");
    paths.insert("fonts/a b.woff2", "fonts/a b.woff2");
    paths.insert("reset.css", "css/reset.css");

    let css = "@import \"reset.css\";\na{background:url(../img/x.png)}\n@font-face{src:url(fonts/a b.woff2)}\nb{background:url(missing.png)}";
    let out = rewrite_css(css, "css/site.css", &paths);
    assert_eq!(
        out.text,
        "@import \"reset.css\";\na{background:url(../css_img/x.png)}\n@font-face{src:url(fonts/a b.woff2)}\nb{background:url(missing.png)}"
    );
    assert_eq!(out.references_rewritten, 1);

    let again = rewrite_css(&out.text, "css/site.css", &paths);
    assert_eq!(again.text, out.text);
}

#[test]
fn unquoted_css_values_get_quotes_when_needed() {
    let mut paths = LocalPaths::new();
    paths.insert("bg.png", "css_img/my bg.png");
    let out = rewrite_css("a{background:url(bg.png)}", "css/site.css", &paths);
    assert_eq!(out.text, "a{background:url(\"../css_img/my bg.png\")}");
}

#[test]
fn references_without_local_copy_point_at_their_absolute_url() {
    let mut paths = LocalPaths::new();
    paths.insert("img/ok.png", "img/ok.png");
    paths.insert_remote("img/ok.png", "https://h/img/ok.png");
    paths.insert_remote("img/failed.png", "https://h/img/failed.png");

    let html = r#"<img src="img/failed.png"><img src="img/ok.png">"#;
    let once = rewrite_html(html, LOCAL_INDEX_FILE, &paths);
    assert_eq!(
        once.text,
        r#"<img src="https://h/img/failed.png"><img src="img/ok.png">"#
    );
    let twice = rewrite_html(&once.text, LOCAL_INDEX_FILE, &paths);
    assert_eq!(twice.text, once.text);
}

#[test]
fn raw_reference_equal_to_another_local_path_keeps_its_own_copy() {
    // Page at the site root: "logo.png" is saved first and takes img/logo.png,
    // while the distinct "/img/logo.png" lands in img/logo-2.png.
    let mut paths = LocalPaths::new();
    paths.insert("logo.png", "img/logo.png");
    paths.insert("img/logo.png", "img/logo-2.png");

    let html = r#"<img src="logo.png"><img src="img/logo.png">"#;
    let out = rewrite_html(html, LOCAL_INDEX_FILE, &paths);
    assert_eq!(out.text, r#"<img src="img/logo.png"><img src="img/logo-2.png">"#);
    assert_eq!(out.references_rewritten, 2);
}

#[test]
fn meta_charset_is_switched_to_utf8() {
    let html = "<head><meta charset=\"windows-1252\"><title>\u{201c}hi\u{201d}</title></head>";
    let out = rewrite_html(html, LOCAL_INDEX_FILE, &LocalPaths::new());
    assert_eq!(
        out.text,
        "<head><meta charset=\"utf-8\"><title>\u{201c}hi\u{201d}</title></head>"
    );
    assert_eq!(out.charsets_updated, 1);

    let again = rewrite_html(&out.text, LOCAL_INDEX_FILE, &LocalPaths::new());
    assert_eq!(again.text, out.text);
    assert_eq!(again.charsets_updated, 0);
}

#[test]
fn http_equiv_content_type_charset_is_switched_to_utf8() {
    let html = r#"<meta http-equiv="Content-Type" content="text/html; charset=ISO-8859-1"><meta name="x" content="charset=latin1">"#;
    assert_eq!(
        declare_utf8(html),
        r#"<meta http-equiv="Content-Type" content="text/html; charset=utf-8"><meta name="x" content="charset=latin1">"#
    );
    let utf8 = r#"<meta http-equiv="content-type" content="text/html; charset=UTF-8">"#;
    assert_eq!(declare_utf8(utf8), utf8);
}

#[test]
fn rewritten_stylesheet_declares_utf8() {
    let mut paths = LocalPaths::new();
    paths.insert("bg.png", "css_img/bg.png");
    let css = "@charset \"iso-8859-1\";\na::after{content:\"\u{e9}\"}\nb{background:url(bg.png)}";
    let out = rewrite_css(css, "css/site.css", &paths);
    assert_eq!(
        out.text,
        "@charset \"UTF-8\";\na::after{content:\"\u{e9}\"}\nb{background:url(../css_img/bg.png)}"
    );

    let untouched = rewrite_css(css, "css/site.css", &LocalPaths::new());
    assert_eq!(untouched.text, css);
}
