use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

/// Default number of history records returned by a listing.
pub const DEFAULT_HISTORY_LIMIT: u32 = 100;
/// Hard ceiling on a single history listing.
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} must not be empty")]
    Blank { field: &'static str },

    #[error("role entries must not be empty (entry {index})")]
    BlankRole { index: usize },
}

/// A board member persona owned by one user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Member {
    pub id: String,
    pub user_id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub background: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub picture: String,
    pub created_at: String,
}

/// Payload for creating a member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewMember {
    pub user_id: String,
    pub name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub background: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub role: Vec<String>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub picture: String,
}

impl NewMember {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("user_id", &self.user_id)?;
        require("name", &self.name)?;
        validate_roles(&self.role)
    }
}

/// Partial update of a member. Absent fields are left untouched.
///
/// Clients send the whole member object back on save, so unknown fields
/// (`id`, `user_id`, `created_at`) are accepted and ignored; ownership never
/// moves through a patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MemberPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
}

impl MemberPatch {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(name) = &self.name {
            require("name", name)?;
        }
        if let Some(role) = &self.role {
            validate_roles(role)?;
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.background.is_none()
            && self.role.is_none()
            && self.picture.is_none()
    }

    /// Apply the patch onto an existing member.
    pub fn apply_to(self, member: &mut Member) {
        if let Some(name) = self.name {
            member.name = name;
        }
        if let Some(description) = self.description {
            member.description = description;
        }
        if let Some(background) = self.background {
            member.background = background;
        }
        if let Some(role) = self.role {
            member.role = role;
        }
        if let Some(picture) = self.picture {
            member.picture = picture;
        }
    }
}

/// Link from a chained answer back to the answer it critiques.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainLink {
    pub in_reply_to: String,
    pub source_member_id: String,
}

/// One question put to one member and the member's answer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct History {
    pub id: String,
    pub user_id: String,
    pub member_id: String,
    pub user_input: String,
    pub member_output: String,
    #[serde(default, deserialize_with = "chain_link_or_none")]
    pub chat: Option<ChainLink>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewHistory {
    pub user_id: String,
    pub member_id: String,
    pub user_input: String,
    pub member_output: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat: Option<ChainLink>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Picture {
    pub id: String,
    pub url: String,
    pub created_at: String,
}

/// Filter for history listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryQuery {
    pub user_id: String,
    #[serde(default)]
    pub member_id: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
}

impl HistoryQuery {
    pub fn for_user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            member_id: None,
            limit: None,
        }
    }

    pub fn with_member(mut self, member_id: impl Into<String>) -> Self {
        self.member_id = Some(member_id.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Requested limit clamped to `1..=MAX_HISTORY_LIMIT`.
    pub fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Stored rows may carry NULL where the API expects an empty value.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// `chat` is a free-form JSON column; only a chain link is surfaced.
fn chain_link_or_none<'de, D>(deserializer: D) -> Result<Option<ChainLink>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(raw.and_then(|value| serde_json::from_value(value).ok()))
}

fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::Blank { field })
    } else {
        Ok(())
    }
}

fn validate_roles(roles: &[String]) -> Result<(), ValidationError> {
    match roles.iter().position(|r| r.trim().is_empty()) {
        Some(index) => Err(ValidationError::BlankRole { index }),
        None => Ok(()),
    }
}
