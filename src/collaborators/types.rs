use crate::coordinator::types::ItemId;

use serde::{Deserialize, Serialize};

/// One processable entry of a record, in the record's natural listing order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubItem {
    pub id: String,
    pub label: String,
}

impl SubItem {
    pub fn new(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
        }
    }
}

/// Opaque handle the retrieval service needs to fetch one artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Locator(pub String);

/// Identifier of a download submitted to the retrieval service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum DownloadStatus {
    Pending,
    Complete,
    Interrupted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    Established,
    /// The login form did not render; worth retrying.
    FormMissing,
    /// Credentials refused; retrying will not help.
    Rejected(String),
}

/// An item whose output already exists from an earlier run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorOutput {
    pub item: ItemId,
    pub output_ref: String,
}

/// Name under which the artifact of `sub` of `item` is stored.
pub fn artifact_name(item: ItemId, sub: &SubItem) -> String {
    format!("{}/{}", item_output_ref(item), sub.id)
}

/// Output location reported for a completed item.
pub fn item_output_ref(item: ItemId) -> String {
    format!("item-{}", item.0)
}
