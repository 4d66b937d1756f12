use url::Url;

/// Why a reference produces no download attempt.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("empty reference")]
    Empty,
    #[error("inline data URI")]
    DataUri,
    #[error("javascript pseudo-URL")]
    Javascript,
    #[error("fragment-only reference")]
    FragmentOnly,
    #[error("unsupported scheme {0}")]
    UnsupportedScheme(String),
    #[error("no base URL to resolve against")]
    NoBase,
    #[error("malformed reference: {0}")]
    Malformed(String),
}

impl Rejection {
    /// Rejections that are expected on any page and not worth a warning.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Rejection::Empty
                | Rejection::DataUri
                | Rejection::Javascript
                | Rejection::FragmentOnly
                | Rejection::UnsupportedScheme(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceForm {
    Absolute,
    ProtocolRelative,
    RootRelative,
    DocumentRelative,
}

impl ReferenceForm {
    pub fn is_relative(self) -> bool {
        matches!(self, ReferenceForm::RootRelative | ReferenceForm::DocumentRelative)
    }
}

pub fn classify_reference(raw: &str) -> Result<ReferenceForm, Rejection> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Rejection::Empty);
    }
    if trimmed.starts_with('#') {
        return Err(Rejection::FragmentOnly);
    }
    if trimmed.starts_with("//") {
        return Ok(ReferenceForm::ProtocolRelative);
    }
    if trimmed.starts_with('/') {
        return Ok(ReferenceForm::RootRelative);
    }
    match scheme_of(trimmed) {
        Some(scheme) if scheme.eq_ignore_ascii_case("data") => Err(Rejection::DataUri),
        Some(scheme) if scheme.eq_ignore_ascii_case("javascript") => Err(Rejection::Javascript),
        Some(scheme) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {
            Ok(ReferenceForm::Absolute)
        }
        Some(scheme) => Err(Rejection::UnsupportedScheme(scheme.to_ascii_lowercase())),
        None => Ok(ReferenceForm::DocumentRelative),
    }
}

/// Turns a raw reference into the ordered, de-duplicated list of absolute
/// URLs to try. Fragments are dropped; they never change what is fetched.
pub fn resolve_candidates(raw: &str, bases: &[Url]) -> Result<Vec<Url>, Rejection> {
    let trimmed = raw.trim();
    let form = classify_reference(trimmed)?;
    let mut candidates = Vec::new();

    match form {
        ReferenceForm::Absolute => {
            let url = Url::parse(trimmed).map_err(|err| Rejection::Malformed(err.to_string()))?;
            push_unique(&mut candidates, url);
        }
        ReferenceForm::ProtocolRelative => {
            let base = bases.first().ok_or(Rejection::NoBase)?;
            let url = Url::parse(&format!("{}:{}", base.scheme(), trimmed))
                .map_err(|err| Rejection::Malformed(err.to_string()))?;
            push_unique(&mut candidates, url);
        }
        ReferenceForm::RootRelative | ReferenceForm::DocumentRelative => {
            if bases.is_empty() {
                return Err(Rejection::NoBase);
            }
            let mut last_error = None;
            for base in bases {
                match base.join(trimmed) {
                    Ok(url) => push_unique(&mut candidates, url),
                    Err(err) => last_error = Some(err),
                }
            }
            if candidates.is_empty() {
                let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
                return Err(Rejection::Malformed(reason));
            }
        }
    }

    Ok(candidates)
}

/// `scheme://host/` of a URL.
pub fn authority_root(url: &Url) -> Option<Url> {
    if url.cannot_be_a_base() || url.host_str().is_none() {
        return None;
    }
    url.join("/").ok()
}

fn push_unique(candidates: &mut Vec<Url>, mut url: Url) {
    url.set_fragment(None);
    if !candidates.contains(&url) {
        candidates.push(url);
    }
}

/// RFC 3986 scheme prefix, if the reference starts with one.
fn scheme_of(reference: &str) -> Option<&str> {
    let colon = reference.find(':')?;
    let scheme = &reference[..colon];
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    if chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.')) {
        Some(scheme)
    } else {
        None
    }
}
