//! Property registry and the status machine of each property.
//!
//! ```text
//! NOT_CHECKED -> UNKNOWN -> { PASS | FAIL | ERROR }
//! ```
//!
//! PASS, FAIL and ERROR are terminal. Properties still NOT_CHECKED when the
//! run ends were never reached within the bounds and become PASS.

use std::fmt;

use bmcheck_ir::program::SourceLocation;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropertyStatus {
    NotChecked,
    Unknown,
    Pass,
    Fail,
    Error,
}

impl PropertyStatus {
    pub fn is_resolved(self) -> bool {
        matches!(
            self,
            PropertyStatus::Pass | PropertyStatus::Fail | PropertyStatus::Error
        )
    }

    fn can_become(self, next: PropertyStatus) -> bool {
        use PropertyStatus::*;
        matches!(
            (self, next),
            (NotChecked, Unknown) | (Unknown, Pass) | (Unknown, Fail) | (Unknown, Error)
        )
    }
}

impl fmt::Display for PropertyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            PropertyStatus::NotChecked => "NOT CHECKED",
            PropertyStatus::Unknown => "UNKNOWN",
            PropertyStatus::Pass => "SUCCESS",
            PropertyStatus::Fail => "FAILURE",
            PropertyStatus::Error => "ERROR",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyInfo {
    pub description: String,
    pub location: SourceLocation,
    pub status: PropertyStatus,
    /// Solver diagnostic for ERROR properties.
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PropertyRegistry {
    entries: IndexMap<String, PropertyInfo>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a property as NOT_CHECKED. Returns false if it was already
    /// known.
    pub fn register(
        &mut self,
        id: impl Into<String>,
        description: impl Into<String>,
        location: SourceLocation,
    ) -> bool {
        let id = id.into();
        if self.entries.contains_key(&id) {
            return false;
        }
        self.entries.insert(
            id,
            PropertyInfo {
                description: description.into(),
                location,
                status: PropertyStatus::NotChecked,
                reason: None,
            },
        );
        true
    }

    pub fn get(&self, id: &str) -> Option<&PropertyInfo> {
        self.entries.get(id)
    }

    pub fn status(&self, id: &str) -> Option<PropertyStatus> {
        self.entries.get(id).map(|p| p.status)
    }

    pub fn is_resolved(&self, id: &str) -> bool {
        self.status(id).is_some_and(PropertyStatus::is_resolved)
    }

    /// Move `id` to `next`. Illegal transitions are refused and reported
    /// with `false`.
    pub fn set_status(&mut self, id: &str, next: PropertyStatus) -> bool {
        let Some(entry) = self.entries.get_mut(id) else {
            warn!(property = id, "status update for unregistered property");
            return false;
        };
        if !entry.status.can_become(next) {
            warn!(
                property = id,
                from = %entry.status,
                to = %next,
                "refused property status transition"
            );
            return false;
        }
        debug!(property = id, from = %entry.status, to = %next, "property status");
        entry.status = next;
        true
    }

    pub fn mark_error(&mut self, id: &str, reason: impl Into<String>) -> bool {
        if !self.set_status(id, PropertyStatus::Error) {
            return false;
        }
        if let Some(entry) = self.entries.get_mut(id) {
            entry.reason = Some(reason.into());
        }
        true
    }

    /// NOT_CHECKED -> UNKNOWN; already-UNKNOWN properties are accepted as is.
    pub fn include(&mut self, id: &str) -> bool {
        match self.status(id) {
            Some(PropertyStatus::Unknown) => true,
            Some(PropertyStatus::NotChecked) => self.set_status(id, PropertyStatus::Unknown),
            _ => false,
        }
    }

    /// End-of-run promotion of every property still NOT_CHECKED to PASS.
    pub fn finalize_unreached(&mut self) {
        let open: Vec<String> = self.ids_with_status(PropertyStatus::NotChecked);
        for id in open {
            self.set_status(&id, PropertyStatus::Unknown);
            self.set_status(&id, PropertyStatus::Pass);
        }
    }

    pub fn ids_with_status(&self, status: PropertyStatus) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, p)| p.status == status)
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropertyInfo)> {
        self.entries.iter().map(|(id, p)| (id.as_str(), p))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, status: PropertyStatus) -> usize {
        self.entries.values().filter(|p| p.status == status).count()
    }

    pub fn any_with_status(&self, status: PropertyStatus) -> bool {
        self.entries.values().any(|p| p.status == status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry_with(ids: &[&str]) -> PropertyRegistry {
        let mut reg = PropertyRegistry::new();
        for id in ids {
            assert!(reg.register(*id, format!("assertion {id}"), SourceLocation::default()));
        }
        reg
    }

    #[test]
    fn registration_is_idempotent() {
        let mut reg = registry_with(&["main.1"]);
        assert!(!reg.register("main.1", "again", SourceLocation::default()));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get("main.1").map(|p| p.description.as_str()), Some("assertion main.1"));
    }

    #[test]
    fn status_machine_refuses_illegal_transitions() {
        let mut reg = registry_with(&["p"]);
        assert!(!reg.set_status("p", PropertyStatus::Pass));
        assert!(reg.include("p"));
        assert!(reg.include("p"));
        assert!(reg.set_status("p", PropertyStatus::Fail));
        assert!(!reg.set_status("p", PropertyStatus::Pass));
        assert!(!reg.include("p"));
        assert_eq!(reg.status("p"), Some(PropertyStatus::Fail));
    }

    #[test]
    fn error_records_reason() {
        let mut reg = registry_with(&["p"]);
        reg.include("p");
        assert!(reg.mark_error("p", "timeout"));
        let info = reg.get("p").expect("registered");
        assert_eq!(info.status, PropertyStatus::Error);
        assert_eq!(info.reason.as_deref(), Some("timeout"));
    }

    #[test]
    fn finalize_turns_unreached_into_pass() {
        let mut reg = registry_with(&["reached", "unreached"]);
        reg.include("reached");
        reg.finalize_unreached();
        assert_eq!(reg.status("unreached"), Some(PropertyStatus::Pass));
        assert_eq!(reg.status("reached"), Some(PropertyStatus::Unknown));
        assert!(!reg.set_status("missing", PropertyStatus::Unknown));
    }

    #[test]
    fn status_display_uses_verdict_words() {
        assert_eq!(PropertyStatus::Pass.to_string(), "SUCCESS");
        assert_eq!(PropertyStatus::Fail.to_string(), "FAILURE");
    }
}
