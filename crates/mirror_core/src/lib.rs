//! Mirror core: pure, I/O-free logic for mirroring a single page.
mod css;
mod extract;
mod layout;
mod markup;
mod progress;
mod resolve;
mod rewrite;
mod task;
mod template;
mod types;

pub use css::{is_font_url, resolve_css_references, CssDocument, CssScan};
pub use extract::{
    classify, extract_assets, reference_attribute, Classification, Extraction, RejectedReference,
    Unclassified,
};
pub use layout::{
    disambiguate, file_name_for, relative_path, slugify, INDEX_FILE, LOCAL_INDEX_FILE,
    TEMPLATE_FILE,
};
pub use markup::{decode_entities, escape_attribute, start_tags, Attribute, Edits, StartTag, StartTags};
pub use progress::{format_bytes, format_duration, TransferClock, TransferEstimate};
pub use resolve::{authority_root, classify_reference, resolve_candidates, ReferenceForm, Rejection};
pub use rewrite::{
    declare_utf8, is_noop_navigation_handler, rewrite_css, rewrite_html, CssRewrite, HtmlRewrite, LocalPaths,
    Target,
};
pub use task::{DownloadTask, InvalidTransition, TaskStatus};
pub use template::{
    generate_template, TemplateOutput, CTA_LINK_MARKER, HEADERS_MARKER, PRODUCT_NAME_MARKER,
};
pub use types::{
    AssetKind, AssetReference, CssRule, JobError, JobOptions, Origin, PageJob, TaskId, PAGE_TASK_ID,
};
