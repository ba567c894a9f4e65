//! Story documents persisted in the `stories` collection.
//!
//! Every struct derives `Serialize` and `Deserialize` with camelCase field
//! names so it can be handed straight to HTTP clients.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use storybook_shared::{Role, StoryId, UserId};

// ---------------------------------------------------------------------------
// Chapter
// ---------------------------------------------------------------------------

/// One titled, illustrated segment of a story.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub chapter_number: u32,
    #[serde(default)]
    pub title: String,
    /// Chapter text.
    #[serde(default)]
    pub content: String,
    /// Prompt handed to the image model for this chapter's illustration.
    #[serde(default)]
    pub image_prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Metadata
// ---------------------------------------------------------------------------

/// Generation parameters and ownership of a story.
///
/// Anything a client sends beyond the known fields is kept in `extra`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoryMetadata {
    /// Owner of the story.
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main_character: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age_group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub setting: Option<String>,
    #[serde(default)]
    pub supporting_characters: Vec<String>,
    #[serde(default)]
    pub is_demo: bool,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl StoryMetadata {
    pub fn for_owner(user_id: UserId) -> Self {
        Self {
            user_id,
            main_character: None,
            age_group: None,
            genre: None,
            tone: None,
            setting: None,
            supporting_characters: Vec::new(),
            is_demo: false,
            extra: BTreeMap::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Collaborator
// ---------------------------------------------------------------------------

/// A user granted access to a story beyond its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Collaborator {
    pub user_id: UserId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub name: String,
    pub role: Role,
    pub joined_at: DateTime<Utc>,
}

/// Who last saved chapter content, and when.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LastEditedBy {
    pub user_id: UserId,
    pub user_name: String,
    pub timestamp: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// The persisted story document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: StoryId,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub chapters: Vec<Chapter>,
    pub metadata: StoryMetadata,
    pub collaborators: Vec<Collaborator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_edited_by: Option<LastEditedBy>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Story {
    pub fn owner(&self) -> &UserId {
        &self.metadata.user_id
    }

    pub fn chapter(&self, number: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.chapter_number == number)
    }

    pub fn collaborator(&self, user_id: &UserId) -> Option<&Collaborator> {
        self.collaborators.iter().find(|c| &c.user_id == user_id)
    }
}

/// Fields supplied by the caller when creating a story; the store assigns the
/// id and timestamps.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStory {
    pub title: String,
    pub description: Option<String>,
    pub chapters: Vec<Chapter>,
    pub metadata: StoryMetadata,
}

/// Aggregate counts for the admin dashboard.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoryStats {
    pub total_stories: u64,
    /// Distinct story owners.
    pub total_users: u64,
    /// Stories created since midnight UTC.
    pub today_stories: u64,
}
