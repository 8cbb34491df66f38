//! Activation tag matching.
//!
//! Tags compare case-insensitively and order-independently. An empty active
//! tag list is replaced by the wildcard [`WILDCARD_TAG`] before matching; the
//! raw matcher itself fails closed on an empty list.

use std::collections::HashSet;

/// Tag every capability answers to.
pub const WILDCARD_TAG: &str = "all";

/// Normalized set of active tags for one registration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTags {
    tags: HashSet<String>,
}

impl ActiveTags {
    /// Normalize the tags supplied at process start. Empty means wildcard.
    pub fn resolve<S: AsRef<str>>(tags: &[S]) -> Self {
        let mut normalized: HashSet<String> = tags
            .iter()
            .map(|t| t.as_ref().trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();
        if normalized.is_empty() {
            normalized.insert(WILDCARD_TAG.to_string());
        }
        Self { tags: normalized }
    }

    pub fn is_wildcard(&self) -> bool {
        self.tags.contains(WILDCARD_TAG)
    }

    /// Whether a capability tagged with `filtering_tags` is selected.
    pub fn selects(&self, filtering_tags: &[&str]) -> bool {
        self.is_wildcard() || self.tags.iter().any(|t| contains_tag(filtering_tags, t))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }
}

/// Whether any of `tags` appears in `filtering_tags`, ignoring case.
///
/// An empty `tags` list never matches a non-empty filter.
pub fn matches_any_tag<S: AsRef<str>>(filtering_tags: &[&str], tags: &[S]) -> bool {
    tags.iter().any(|t| contains_tag(filtering_tags, t.as_ref()))
}

fn contains_tag(filtering_tags: &[&str], tag: &str) -> bool {
    let tag = tag.trim();
    filtering_tags.iter().any(|f| f.eq_ignore_ascii_case(tag))
}
