use std::collections::{HashMap, HashSet};

use mirror_core::{AssetKind, AssetReference, Origin, TaskId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionDecision {
    /// Start a new task with the offered id.
    Admit,
    /// Same first request as an already admitted task.
    Duplicate(TaskId),
    /// Preview mode already admitted an asset of this kind.
    PreviewKindCap,
    /// Preview mode already resolved a reference of this stylesheet.
    PreviewDocumentCap,
    /// The reference has no URL to fetch.
    NoCandidate,
}

impl AdmissionDecision {
    pub fn task_id(self, offered: TaskId) -> Option<TaskId> {
        match self {
            AdmissionDecision::Admit => Some(offered),
            AdmissionDecision::Duplicate(id) => Some(id),
            _ => None,
        }
    }
}

/// Queue admission for one run: deduplication plus the preview caps, which
/// are enforced here so capped references never start a transfer.
#[derive(Debug, Default)]
pub struct Admission {
    preview: bool,
    seen: HashMap<String, TaskId>,
    kinds: HashSet<AssetKind>,
    per_stylesheet: HashMap<String, usize>,
}

impl Admission {
    pub fn new(preview: bool) -> Self {
        Self {
            preview,
            ..Self::default()
        }
    }

    pub fn consider(&mut self, reference: &AssetReference, offered: TaskId) -> AdmissionDecision {
        let stylesheet = match &reference.origin {
            Origin::Css { stylesheet, .. } => Some(stylesheet.as_str().to_string()),
            Origin::Element { .. } => None,
        };

        if self.preview {
            if let Some(sheet) = &stylesheet {
                if self.per_stylesheet.get(sheet).copied().unwrap_or(0) >= 1 {
                    return AdmissionDecision::PreviewDocumentCap;
                }
            }
        }

        let Some(key) = reference.dedup_key() else {
            return AdmissionDecision::NoCandidate;
        };

        if let Some(&existing) = self.seen.get(key) {
            if let Some(sheet) = stylesheet {
                *self.per_stylesheet.entry(sheet).or_default() += 1;
            }
            return AdmissionDecision::Duplicate(existing);
        }

        if self.preview && self.kinds.contains(&reference.kind) {
            return AdmissionDecision::PreviewKindCap;
        }

        self.seen.insert(key.to_string(), offered);
        self.kinds.insert(reference.kind);
        if let Some(sheet) = stylesheet {
            *self.per_stylesheet.entry(sheet).or_default() += 1;
        }
        AdmissionDecision::Admit
    }
}
