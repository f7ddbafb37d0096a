//! Node Data Structures
//!
//! This module defines the `Node` struct for the outline forest together with
//! the sparse `NodePatch` used by every write, and the `Language` selector
//! that decides which content field a read or write targets.
//!
//! # Architecture
//!
//! - **Forest**: `parent_id = None` marks a root; every node has a dense
//!   zero-based `position` inside its sibling group
//! - **Bilingual content**: `content` holds the primary language,
//!   `content_alt` the alternate one (falls back to `content` on read)
//! - **Sparse patches**: writes are expressed as `NodePatch` values so a batch
//!   only touches the fields a plan names
//!
//! # Examples
//!
//! ```rust
//! use outline_core::models::{Language, Node};
//!
//! let root = Node::new("Groceries".to_string(), Some("杂货".to_string()), None, 0);
//! assert!(root.is_root());
//! assert_eq!(root.display_content(Language::Chinese), "杂货");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use uuid::Uuid;

/// Content language selector
///
/// Passed explicitly through every read and write that depends on it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Language {
    /// Primary language, stored in `content`
    #[default]
    #[serde(rename = "en")]
    English,

    /// Alternate language, stored in `content_alt`
    #[serde(rename = "zh")]
    Chinese,
}

impl Language {
    /// Short language code used on the wire ("en" / "zh")
    pub fn code(&self) -> &'static str {
        match self {
            Language::English => "en",
            Language::Chinese => "zh",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A vertex in the outline forest.
///
/// # Fields
///
/// - `id`: Unique identifier (UUID v4 when generated), never rewritten
/// - `content`: Primary-language text
/// - `content_alt`: Optional alternate-language text
/// - `parent_id`: Owning parent, `None` for a root
/// - `position`: Zero-based rank among siblings sharing `parent_id`
/// - `is_expanded`: Whether children should be shown eagerly
/// - `created_at` / `modified_at`: Timestamps maintained by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Unique identifier
    pub id: String,

    /// Primary-language content
    pub content: String,

    /// Alternate-language content
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_alt: Option<String>,

    /// Parent node ID (`None` = root group)
    pub parent_id: Option<String>,

    /// Rank inside the sibling group
    pub position: u32,

    /// Expand/collapse flag
    pub is_expanded: bool,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last modification timestamp
    pub modified_at: DateTime<Utc>,
}

impl Node {
    /// Create a new expanded node with an auto-generated UUID
    ///
    /// The caller chooses `position`; the engine always passes the next free
    /// slot of the target group.
    pub fn new(
        content: String,
        content_alt: Option<String>,
        parent_id: Option<String>,
        position: u32,
    ) -> Self {
        Self::new_with_id(
            Uuid::new_v4().to_string(),
            content,
            content_alt,
            parent_id,
            position,
        )
    }

    /// Create a new expanded node with an explicit ID
    pub fn new_with_id(
        id: String,
        content: String,
        content_alt: Option<String>,
        parent_id: Option<String>,
        position: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            content,
            content_alt,
            parent_id,
            position,
            is_expanded: true,
            created_at: now,
            modified_at: now,
        }
    }

    /// Check if this node sits in the root group
    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// Text to show for `language`, falling back to `content`
    pub fn display_content(&self, language: Language) -> &str {
        match language {
            Language::English => &self.content,
            Language::Chinese => self.content_alt.as_deref().unwrap_or(&self.content),
        }
    }

    /// Raw stored text for `language` (no fallback)
    pub fn stored_content(&self, language: Language) -> Option<&str> {
        match language {
            Language::English => Some(&self.content),
            Language::Chinese => self.content_alt.as_deref(),
        }
    }

    /// Apply a patch in place
    ///
    /// Returns `true` if any field actually changed; `modified_at` is only
    /// bumped in that case.
    pub fn apply_patch(&mut self, patch: &NodePatch) -> bool {
        let mut changed = false;

        if let Some(content) = &patch.content {
            if &self.content != content {
                self.content = content.clone();
                changed = true;
            }
        }
        if let Some(content_alt) = &patch.content_alt {
            if &self.content_alt != content_alt {
                self.content_alt = content_alt.clone();
                changed = true;
            }
        }
        if let Some(parent_id) = &patch.parent_id {
            if &self.parent_id != parent_id {
                self.parent_id = parent_id.clone();
                changed = true;
            }
        }
        if let Some(position) = patch.position {
            if self.position != position {
                self.position = position;
                changed = true;
            }
        }
        if let Some(is_expanded) = patch.is_expanded {
            if self.is_expanded != is_expanded {
                self.is_expanded = is_expanded;
                changed = true;
            }
        }

        if changed {
            self.modified_at = Utc::now();
        }
        changed
    }
}

/// Accepts both plain values and explicit nulls for double-Option fields
///
/// - Missing field → None (don't update)
/// - null → Some(None) (set to NULL)
/// - "value" → Some(Some("value")) (set to value)
fn deserialize_optional_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Some(Option::<T>::deserialize(deserializer)?))
}

/// Sparse node update
///
/// Only provided fields are written. Nullable fields (`content_alt`,
/// `parent_id`) use the double-`Option` pattern:
///
/// - `None`: leave the field untouched
/// - `Some(None)`: set the field to NULL
/// - `Some(Some(value))`: set the field to `value`
///
/// # Examples
///
/// ```rust
/// # use outline_core::models::NodePatch;
/// // Move under a new parent at slot 0
/// let patch = NodePatch::new()
///     .with_parent(Some("parent-id".to_string()))
///     .with_position(0);
/// assert!(!patch.is_empty());
///
/// // Promote to root
/// let patch = NodePatch::new().with_parent(None);
/// assert_eq!(patch.parent_id, Some(None));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodePatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub content_alt: Option<Option<String>>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_optional_field"
    )]
    pub parent_id: Option<Option<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expanded: Option<bool>,
}

impl NodePatch {
    /// Create a new empty patch
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the text stored for `language`
    pub fn with_content(mut self, language: Language, text: String) -> Self {
        match language {
            Language::English => self.content = Some(text),
            Language::Chinese => self.content_alt = Some(Some(text)),
        }
        self
    }

    /// Set the parent (`None` = root group)
    pub fn with_parent(mut self, parent_id: Option<String>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_position(mut self, position: u32) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_expanded(mut self, is_expanded: bool) -> Self {
        self.is_expanded = Some(is_expanded);
        self
    }

    /// Overlay `other` on top of this patch (fields set in `other` win)
    pub fn merge(&mut self, other: NodePatch) {
        if other.content.is_some() {
            self.content = other.content;
        }
        if other.content_alt.is_some() {
            self.content_alt = other.content_alt;
        }
        if other.parent_id.is_some() {
            self.parent_id = other.parent_id;
        }
        if other.position.is_some() {
            self.position = other.position;
        }
        if other.is_expanded.is_some() {
            self.is_expanded = other.is_expanded;
        }
    }

    /// Check if the patch touches linkage (parent or position)
    pub fn touches_linkage(&self) -> bool {
        self.parent_id.is_some() || self.position.is_some()
    }

    /// Check if the patch contains any changes
    pub fn is_empty(&self) -> bool {
        self.content.is_none()
            && self.content_alt.is_none()
            && self.parent_id.is_none()
            && self.position.is_none()
            && self.is_expanded.is_none()
    }
}
