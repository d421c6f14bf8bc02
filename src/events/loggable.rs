use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Retention class of an audit entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Access-control changes. Never trimmed.
    Critical,
    #[default]
    Important,
}

/// Implemented by every model whose writes land in the audit trail.
pub trait Loggable: Serialize + Send + Sync {
    /// Prefix of the event name, e.g. `profile` in `profile.updated`.
    fn entity_type() -> &'static str;

    fn subject_id(&self) -> Uuid;

    fn severity(&self) -> Severity {
        Severity::Important
    }

    fn severity_for_action(&self, action: &str) -> Severity {
        match action {
            "deleted" | "revoked" => Severity::Critical,
            "created" | "updated" | "granted" => self.severity(),
            _ => Severity::Important,
        }
    }
}
