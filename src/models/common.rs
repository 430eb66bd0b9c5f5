//! Shared model pieces: change history, pagination and revision info.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One field-level change, kept in entity history and in audit records.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRecord {
    pub field: String,
    pub old_value: Value,
    pub new_value: Value,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Collects changes between an existing record and its update.
pub struct ChangeSet<'a> {
    changed_by: &'a str,
    changed_at: DateTime<Utc>,
    records: Vec<ChangeRecord>,
}

impl<'a> ChangeSet<'a> {
    pub fn new(changed_by: &'a str, changed_at: DateTime<Utc>) -> Self {
        Self {
            changed_by,
            changed_at,
            records: Vec::new(),
        }
    }

    /// Record `field` if the serialized values differ.
    pub fn track<T: Serialize + PartialEq>(&mut self, field: &str, old: &T, new: &T) {
        if old == new {
            return;
        }
        self.records.push(ChangeRecord {
            field: field.to_string(),
            old_value: serde_json::to_value(old).unwrap_or(Value::Null),
            new_value: serde_json::to_value(new).unwrap_or(Value::Null),
            changed_by: self.changed_by.to_string(),
            changed_at: self.changed_at,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<ChangeRecord> {
        self.records
    }
}

/// Paging parameters shared by list endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageQuery {
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub page_size: Option<u32>,
}

impl PageQuery {
    pub const MAX_PAGE_SIZE: u32 = 200;

    /// Resolve to `(limit, offset)` using the configured default page size.
    pub fn resolve(&self, default_size: u32) -> (i64, i64) {
        let size = self
            .page_size
            .unwrap_or(default_size)
            .clamp(1, Self::MAX_PAGE_SIZE) as i64;
        let page = self.page.unwrap_or(1).max(1) as i64;
        (size, (page - 1) * size)
    }
}

/// One page of a list result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T: Serialize> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub page_size: i64,
}

impl<T: Serialize> Page<T> {
    pub fn new(items: Vec<T>, total: i64, limit: i64, offset: i64) -> Self {
        Self {
            items,
            total,
            page: offset / limit.max(1) + 1,
            page_size: limit,
        }
    }
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
///
/// Use with `#[serde(default, deserialize_with = "double_option")]`.
pub fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Revision information for change detection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionInfo {
    pub revision_id: i64,
    pub generated_at: String,
}
