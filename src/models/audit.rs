//! Audit trail records.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{text_enum, ChangeRecord};

text_enum!(AuditAction {
    Create => "create",
    Read => "read",
    Update => "update",
    Delete => "delete",
    PermissionDenied => "permission_denied",
    Export => "export",
    Import => "import",
});

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLog {
    pub id: String,
    pub action: AuditAction,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub changes: Vec<ChangeRecord>,
    /// Full document as it was before deletion
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// An audit record about to be stored.
#[derive(Debug, Clone)]
pub struct NewAuditLog {
    pub action: AuditAction,
    pub collection: &'static str,
    pub document_id: Option<String>,
    pub actor_id: Option<String>,
    pub changes: Vec<ChangeRecord>,
    pub snapshot: Option<Value>,
    pub metadata: Option<Value>,
}

impl NewAuditLog {
    pub fn new(action: AuditAction, collection: &'static str) -> Self {
        Self {
            action,
            collection,
            document_id: None,
            actor_id: None,
            changes: Vec::new(),
            snapshot: None,
            metadata: None,
        }
    }

    pub fn document(mut self, id: impl Into<String>) -> Self {
        self.document_id = Some(id.into());
        self
    }

    pub fn actor(mut self, id: impl Into<String>) -> Self {
        self.actor_id = Some(id.into());
        self
    }

    pub fn changes(mut self, changes: Vec<ChangeRecord>) -> Self {
        self.changes = changes;
        self
    }

    pub fn snapshot<T: Serialize>(mut self, doc: &T) -> Self {
        self.snapshot = serde_json::to_value(doc).ok();
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFilter {
    #[serde(default)]
    pub action: Option<AuditAction>,
    #[serde(default)]
    pub collection: Option<String>,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
    #[serde(default)]
    pub from: Option<NaiveDate>,
    #[serde(default)]
    pub to: Option<NaiveDate>,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}
