//! Who may do what to a story.
//!
//! Ownership comes only from `metadata.userId`.  A collaborator entry never
//! grants more than editor access, even if it carries the `owner` role.

use storybook_shared::{Role, UserId};

use crate::models::Story;

/// Effective access a user holds on one story.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Editor,
    Viewer,
    None,
}

impl Access {
    pub fn resolve(story: &Story, user_id: &UserId) -> Self {
        if story.owner() == user_id {
            return Self::Owner;
        }
        match story.collaborator(user_id).map(|c| c.role) {
            Some(Role::Owner) | Some(Role::Editor) => Self::Editor,
            Some(Role::Viewer) => Self::Viewer,
            None => Self::None,
        }
    }

    pub fn can_read(self) -> bool {
        !matches!(self, Self::None)
    }

    pub fn can_edit(self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }

    /// Delete the story and manage its collaborators.
    pub fn can_manage(self) -> bool {
        matches!(self, Self::Owner)
    }

    pub fn role(self) -> Option<Role> {
        match self {
            Self::Owner => Some(Role::Owner),
            Self::Editor => Some(Role::Editor),
            Self::Viewer => Some(Role::Viewer),
            Self::None => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Collaborator, StoryMetadata};
    use chrono::Utc;
    use storybook_shared::StoryId;

    fn story_with(collaborators: Vec<(&str, Role)>) -> Story {
        let now = Utc::now();
        Story {
            id: StoryId::new(),
            title: "The Brave Little Kite".into(),
            description: None,
            chapters: Vec::new(),
            metadata: StoryMetadata::for_owner(UserId::from("owner")),
            collaborators: collaborators
                .into_iter()
                .map(|(id, role)| Collaborator {
                    user_id: UserId::from(id),
                    email: None,
                    name: id.to_string(),
                    role,
                    joined_at: now,
                })
                .collect(),
            last_edited_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn owner_has_full_access() {
        let story = story_with(vec![]);
        let access = Access::resolve(&story, &UserId::from("owner"));
        assert_eq!(access, Access::Owner);
        assert!(access.can_read() && access.can_edit() && access.can_manage());
    }

    #[test]
    fn editor_can_edit_but_not_manage() {
        let story = story_with(vec![("ed", Role::Editor)]);
        let access = Access::resolve(&story, &UserId::from("ed"));
        assert!(access.can_read());
        assert!(access.can_edit());
        assert!(!access.can_manage());
    }

    #[test]
    fn viewer_reads_only() {
        let story = story_with(vec![("vi", Role::Viewer)]);
        let access = Access::resolve(&story, &UserId::from("vi"));
        assert!(access.can_read());
        assert!(!access.can_edit());
        assert!(!access.can_manage());
    }

    #[test]
    fn stranger_has_no_access() {
        let story = story_with(vec![("ed", Role::Editor)]);
        let access = Access::resolve(&story, &UserId::from("mallory"));
        assert_eq!(access, Access::None);
        assert!(!access.can_read());
    }

    #[test]
    fn collaborator_owner_role_is_capped_at_editor() {
        let story = story_with(vec![("co", Role::Owner)]);
        let access = Access::resolve(&story, &UserId::from("co"));
        assert_eq!(access, Access::Editor);
        assert!(!access.can_manage());
    }
}
