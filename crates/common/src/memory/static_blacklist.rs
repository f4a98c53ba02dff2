use crate::domain::Blacklist;
use std::collections::HashMap;

const DEFAULT_REASON: &str = "blacklisted";

/// Blacklist backed by a fixed set of device IDs loaded at startup
#[derive(Debug, Clone, Default)]
pub struct StaticBlacklist {
    entries: HashMap<String, String>,
}

impl StaticBlacklist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse `id1,id2=reason,...`. IDs are normalized to lowercase; a missing
    /// reason falls back to a generic one.
    pub fn from_comma_separated(list: &str) -> Self {
        let entries = list
            .split(',')
            .filter_map(|entry| {
                let entry = entry.trim();
                if entry.is_empty() {
                    return None;
                }
                let (id, reason) = match entry.split_once('=') {
                    Some((id, reason)) if !reason.trim().is_empty() => (id, reason.trim()),
                    Some((id, _)) => (id, DEFAULT_REASON),
                    None => (entry, DEFAULT_REASON),
                };
                let id = id.trim().to_lowercase();
                (!id.is_empty()).then(|| (id, reason.to_string()))
            })
            .collect();

        Self { entries }
    }

    pub fn with_entry(mut self, device_id: impl Into<String>, reason: impl Into<String>) -> Self {
        self.entries
            .insert(device_id.into().to_lowercase(), reason.into());
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Blacklist for StaticBlacklist {
    fn in_list(&self, device_id: &str) -> Option<String> {
        self.entries.get(device_id).cloned()
    }
}
