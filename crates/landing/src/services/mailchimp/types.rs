//! Wire types for the Mailchimp Marketing API (`/lists/{id}/members`).

use serde::{Deserialize, Serialize};
use sweetbox_core::SubscriptionStatus;

/// Body of `PUT /lists/{list_id}/members/{subscriber_hash}`.
///
/// `status_if_new` only applies when the member is created; `status`, when
/// set, is forced on existing members too.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberPut {
    pub email_address: String,
    pub status_if_new: SubscriptionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub merge_fields: serde_json::Map<String, serde_json::Value>,
}

/// The part of a member record the service reads back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    #[serde(default)]
    pub id: String,
    pub email_address: String,
    pub status: SubscriptionStatus,
}

/// Mailchimp problem-details error body.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub detail: String,
    #[serde(default, rename = "type")]
    pub kind: String,
}

/// Body of `POST /lists/{list_id}/members/{subscriber_hash}/tags`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagsBody {
    pub tags: Vec<TagUpdate>,
}

impl TagsBody {
    /// Activate every tag in `names`.
    #[must_use]
    pub fn activate(names: &[String]) -> Self {
        Self {
            tags: names
                .iter()
                .map(|name| TagUpdate {
                    name: name.clone(),
                    status: TagStatus::Active,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagUpdate {
    pub name: String,
    pub status: TagStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TagStatus {
    Active,
    Inactive,
}
