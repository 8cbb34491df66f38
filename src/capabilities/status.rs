//! Per-capability enablement status.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::utilities::errors::ConfigurationMissing;

/// Why a capability is not registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisabledReason {
    /// None of the active tags select the capability.
    NotSelected {
        /// The capability's own activation tags.
        capability_tags: Vec<String>,
    },
    /// Selected, but required environment keys are absent.
    MissingConfiguration(ConfigurationMissing),
}

impl fmt::Display for DisabledReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSelected { capability_tags } => write!(
                f,
                "not selected by active tags (the filtering tags don't contain {})",
                capability_tags.join(" or ")
            ),
            Self::MissingConfiguration(missing) => write!(f, "{}", missing),
        }
    }
}

/// Status of one capability after a registration pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapabilityStatus {
    Enabled,
    Disabled(DisabledReason),
}

impl CapabilityStatus {
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled)
    }

    pub fn reason(&self) -> Option<&DisabledReason> {
        match self {
            Self::Enabled => None,
            Self::Disabled(reason) => Some(reason),
        }
    }
}

impl fmt::Display for CapabilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enabled => write!(f, "enabled"),
            Self::Disabled(reason) => write!(f, "{}", reason),
        }
    }
}

/// Status entry keyed by public capability name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub name: String,
    pub status: CapabilityStatus,
}

/// Status of every declared capability, in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusTable {
    entries: Vec<StatusEntry>,
}

impl StatusTable {
    pub fn new(entries: Vec<StatusEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[StatusEntry] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&CapabilityStatus> {
        self.entries
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| &entry.status)
    }

    pub fn enabled_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.status.is_enabled())
            .map(|entry| entry.name.as_str())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Read-only view of the registry's status table.
///
/// Cloning is cheap; every clone observes the latest registration pass.
#[derive(Debug, Clone, Default)]
pub struct StatusReader {
    inner: Arc<RwLock<StatusTable>>,
}

impl StatusReader {
    pub(crate) fn new(inner: Arc<RwLock<StatusTable>>) -> Self {
        Self { inner }
    }

    /// Copy of the current table.
    pub fn snapshot(&self) -> StatusTable {
        self.inner.read().clone()
    }
}
