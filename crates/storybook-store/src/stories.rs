//! CRUD operations for [`Story`] documents.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::params;

use storybook_shared::{StoryId, UserId};

use crate::database::Database;
use crate::error::{Result, StoreError};
use crate::models::{Chapter, Collaborator, LastEditedBy, NewStory, Story, StoryStats};

const STORY_COLUMNS: &str = "id, owner_id, title, description, chapters, metadata, \
                             collaborators, last_edited_by, created_at, updated_at";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new story, assigning its id and timestamps.
    pub fn insert_story(&self, new: &NewStory) -> Result<Story> {
        let now = Utc::now().trunc_subsecs(6);
        let story = Story {
            id: StoryId::new(),
            title: new.title.clone(),
            description: new.description.clone(),
            chapters: new.chapters.clone(),
            metadata: new.metadata.clone(),
            collaborators: Vec::new(),
            last_edited_by: None,
            created_at: now,
            updated_at: now,
        };

        self.conn().execute(
            "INSERT INTO stories (id, owner_id, title, description, chapters, metadata,
                                  collaborators, last_edited_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?9)",
            params![
                story.id.to_string(),
                story.owner().as_str(),
                story.title,
                story.description,
                serde_json::to_string(&story.chapters)?,
                serde_json::to_string(&story.metadata)?,
                serde_json::to_string(&story.collaborators)?,
                ts(&story.created_at),
                ts(&story.updated_at),
            ],
        )?;

        tracing::debug!(story_id = %story.id, owner = %story.owner(), "story inserted");
        Ok(story)
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    /// Fetch a single story by id.
    pub fn get_story(&self, id: StoryId) -> Result<Story> {
        self.conn()
            .query_row(
                &format!("SELECT {STORY_COLUMNS} FROM stories WHERE id = ?1"),
                params![id.to_string()],
                row_to_story,
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::NotFound,
                other => StoreError::Sqlite(other),
            })
    }

    /// List the stories a user owns, newest first.
    pub fn list_stories_for_owner(&self, owner: &UserId) -> Result<Vec<Story>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {STORY_COLUMNS}
             FROM stories
             WHERE owner_id = ?1
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![owner.as_str()], row_to_story)?;

        let mut stories = Vec::new();
        for row in rows {
            stories.push(row?);
        }
        Ok(stories)
    }

    /// List the stories on which a user is a collaborator, newest first.
    pub fn list_stories_shared_with(&self, user: &UserId) -> Result<Vec<Story>> {
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {STORY_COLUMNS}
             FROM stories
             WHERE EXISTS (
                 SELECT 1 FROM json_each(stories.collaborators)
                 WHERE json_extract(json_each.value, '$.userId') = ?1
             )
             ORDER BY created_at DESC, rowid DESC"
        ))?;

        let rows = stmt.query_map(params![user.as_str()], row_to_story)?;

        let mut stories = Vec::new();
        for row in rows {
            stories.push(row?);
        }
        Ok(stories)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Overwrite a story's chapters.  Last write wins.
    pub fn update_chapters(&self, id: StoryId, chapters: &[Chapter]) -> Result<Story> {
        let affected = self.conn().execute(
            "UPDATE stories SET chapters = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(chapters)?,
                ts(&Utc::now()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        self.get_story(id)
    }

    /// Overwrite one chapter's text and record who saved it.
    ///
    /// Other chapters, and the chapter's title and illustration, are left
    /// untouched.
    pub fn save_chapter_content(
        &self,
        id: StoryId,
        chapter_number: u32,
        content: &str,
        editor: &LastEditedBy,
    ) -> Result<Story> {
        let tx = self.conn().unchecked_transaction()?;

        let mut story = self.get_story(id)?;
        let chapter = story
            .chapters
            .iter_mut()
            .find(|c| c.chapter_number == chapter_number)
            .ok_or(StoreError::ChapterNotFound(chapter_number))?;
        chapter.content = content.to_string();
        story.last_edited_by = Some(editor.clone());
        story.updated_at = editor.timestamp;

        tx.execute(
            "UPDATE stories SET chapters = ?2, last_edited_by = ?3, updated_at = ?4 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(&story.chapters)?,
                serde_json::to_string(editor)?,
                ts(&story.updated_at),
            ],
        )?;
        tx.commit()?;

        Ok(story)
    }

    /// Replace the collaborator list of a story.
    pub fn set_collaborators(&self, id: StoryId, collaborators: &[Collaborator]) -> Result<()> {
        let affected = self.conn().execute(
            "UPDATE stories SET collaborators = ?2, updated_at = ?3 WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(collaborators)?,
                ts(&Utc::now()),
            ],
        )?;
        if affected == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    /// Delete a story by id.  Returns `true` if a row was deleted.
    pub fn delete_story(&self, id: StoryId) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM stories WHERE id = ?1", params![id.to_string()])?;
        Ok(affected > 0)
    }

    // ------------------------------------------------------------------
    // Stats
    // ------------------------------------------------------------------

    pub fn story_stats(&self, now: DateTime<Utc>) -> Result<StoryStats> {
        let midnight = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc())
            .unwrap_or(now);

        let (total_stories, total_users, today_stories): (i64, i64, i64) = self.conn().query_row(
            "SELECT COUNT(*),
                    COUNT(DISTINCT owner_id),
                    COALESCE(SUM(CASE WHEN created_at >= ?1 THEN 1 ELSE 0 END), 0)
             FROM stories",
            params![ts(&midnight)],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(StoryStats {
            total_stories: total_stories as u64,
            total_users: total_users as u64,
            today_stories: today_stories as u64,
        })
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC-3339 so that text ordering matches time ordering.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_err<E>(idx: usize, e: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn parse_ts(idx: usize, s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_err(idx, e))
}

/// Map a `rusqlite::Row` to a [`Story`].
fn row_to_story(row: &rusqlite::Row<'_>) -> rusqlite::Result<Story> {
    let id_str: String = row.get(0)?;
    let owner_id: String = row.get(1)?;
    let title: String = row.get(2)?;
    let description: Option<String> = row.get(3)?;
    let chapters_json: String = row.get(4)?;
    let metadata_json: String = row.get(5)?;
    let collaborators_json: String = row.get(6)?;
    let last_edited_json: Option<String> = row.get(7)?;
    let created_str: String = row.get(8)?;
    let updated_str: String = row.get(9)?;

    let id = uuid::Uuid::parse_str(&id_str)
        .map(StoryId)
        .map_err(|e| conversion_err(0, e))?;

    let chapters = serde_json::from_str(&chapters_json).map_err(|e| conversion_err(4, e))?;
    let mut metadata: crate::models::StoryMetadata =
        serde_json::from_str(&metadata_json).map_err(|e| conversion_err(5, e))?;
    // The indexed column is authoritative for ownership.
    metadata.user_id = UserId(owner_id);
    let collaborators =
        serde_json::from_str(&collaborators_json).map_err(|e| conversion_err(6, e))?;
    let last_edited_by = last_edited_json
        .map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(|e| conversion_err(7, e))?;

    Ok(Story {
        id,
        title,
        description,
        chapters,
        metadata,
        collaborators,
        last_edited_by,
        created_at: parse_ts(8, &created_str)?,
        updated_at: parse_ts(9, &updated_str)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StoryMetadata;
    use chrono::Duration;
    use storybook_shared::Role;

    fn chapter(n: u32, content: &str) -> Chapter {
        Chapter {
            chapter_number: n,
            title: format!("Chapter {n}"),
            content: content.to_string(),
            image_prompt: format!("scene {n}"),
            image_url: None,
        }
    }

    fn new_story(owner: &str, title: &str) -> NewStory {
        NewStory {
            title: title.to_string(),
            description: Some("A tale".into()),
            chapters: vec![chapter(1, "Once upon a time"), chapter(2, "The end")],
            metadata: StoryMetadata::for_owner(UserId::from(owner)),
        }
    }

    fn collaborator(id: &str, role: Role) -> Collaborator {
        Collaborator {
            user_id: UserId::from(id),
            email: Some(format!("{id}@example.com")),
            name: id.to_string(),
            role,
            joined_at: Utc::now(),
        }
    }

    #[test]
    fn insert_then_get_returns_same_story() {
        let db = Database::open_in_memory().unwrap();
        let created = db.insert_story(&new_story("alice", "Moon Picnic")).unwrap();

        let fetched = db.get_story(created.id).unwrap();
        assert_eq!(fetched.title, "Moon Picnic");
        assert_eq!(fetched.chapters.len(), 2);
        assert_eq!(fetched.owner().as_str(), "alice");
        assert_eq!(fetched.created_at, created.created_at);
    }

    #[test]
    fn get_missing_story_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.get_story(StoryId::new()),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn list_for_owner_is_newest_first_and_scoped() {
        let db = Database::open_in_memory().unwrap();
        db.insert_story(&new_story("alice", "First")).unwrap();
        db.insert_story(&new_story("bob", "Other")).unwrap();
        db.insert_story(&new_story("alice", "Second")).unwrap();

        let titles: Vec<String> = db
            .list_stories_for_owner(&UserId::from("alice"))
            .unwrap()
            .into_iter()
            .map(|s| s.title)
            .collect();
        assert_eq!(titles, vec!["Second", "First"]);
    }

    #[test]
    fn list_shared_with_finds_collaborations() {
        let db = Database::open_in_memory().unwrap();
        let shared = db.insert_story(&new_story("alice", "Shared")).unwrap();
        db.insert_story(&new_story("alice", "Private")).unwrap();
        db.set_collaborators(shared.id, &[collaborator("bob", Role::Viewer)])
            .unwrap();

        let stories = db.list_stories_shared_with(&UserId::from("bob")).unwrap();
        assert_eq!(stories.len(), 1);
        assert_eq!(stories[0].id, shared.id);
        assert!(db
            .list_stories_shared_with(&UserId::from("carol"))
            .unwrap()
            .is_empty());
    }

    #[test]
    fn update_chapters_overwrites() {
        let db = Database::open_in_memory().unwrap();
        let story = db.insert_story(&new_story("alice", "Edit me")).unwrap();

        let updated = db
            .update_chapters(story.id, &[chapter(1, "Rewritten")])
            .unwrap();
        assert_eq!(updated.chapters.len(), 1);
        assert_eq!(updated.chapters[0].content, "Rewritten");
        assert!(updated.updated_at >= story.updated_at);
    }

    #[test]
    fn repeated_identical_updates_are_idempotent() {
        let db = Database::open_in_memory().unwrap();
        let story = db.insert_story(&new_story("alice", "Stable")).unwrap();
        let chapters = vec![chapter(1, "A"), chapter(2, "B"), chapter(3, "C")];

        for _ in 0..5 {
            db.update_chapters(story.id, &chapters).unwrap();
        }

        let fetched = db.get_story(story.id).unwrap();
        assert_eq!(fetched.chapters, chapters);
    }

    #[test]
    fn update_missing_story_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        assert!(matches!(
            db.update_chapters(StoryId::new(), &[]),
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            db.set_collaborators(StoryId::new(), &[]),
            Err(StoreError::NotFound)
        ));
    }

    #[test]
    fn save_chapter_content_touches_only_that_chapter() {
        let db = Database::open_in_memory().unwrap();
        let story = db.insert_story(&new_story("alice", "Collab")).unwrap();
        let editor = LastEditedBy {
            user_id: UserId::from("bob"),
            user_name: "Bob".into(),
            timestamp: Utc::now(),
        };

        db.save_chapter_content(story.id, 2, "A new ending", &editor)
            .unwrap();

        let fetched = db.get_story(story.id).unwrap();
        assert_eq!(fetched.chapter(1).unwrap().content, "Once upon a time");
        assert_eq!(fetched.chapter(2).unwrap().content, "A new ending");
        assert_eq!(fetched.chapter(2).unwrap().title, "Chapter 2");
        assert_eq!(fetched.last_edited_by.unwrap().user_name, "Bob");
    }

    #[test]
    fn save_chapter_content_unknown_chapter() {
        let db = Database::open_in_memory().unwrap();
        let story = db.insert_story(&new_story("alice", "Collab")).unwrap();
        let editor = LastEditedBy {
            user_id: UserId::from("alice"),
            user_name: "Alice".into(),
            timestamp: Utc::now(),
        };

        assert!(matches!(
            db.save_chapter_content(story.id, 9, "x", &editor),
            Err(StoreError::ChapterNotFound(9))
        ));
    }

    #[test]
    fn collaborators_round_trip() {
        let db = Database::open_in_memory().unwrap();
        let story = db.insert_story(&new_story("alice", "Team")).unwrap();
        let collabs = vec![
            collaborator("bob", Role::Editor),
            collaborator("carol", Role::Viewer),
        ];

        db.set_collaborators(story.id, &collabs).unwrap();
        let fetched = db.get_story(story.id).unwrap();
        assert_eq!(fetched.collaborators, collabs);
    }

    #[test]
    fn delete_story_removes_row() {
        let db = Database::open_in_memory().unwrap();
        let story = db.insert_story(&new_story("alice", "Gone")).unwrap();

        assert!(db.delete_story(story.id).unwrap());
        assert!(!db.delete_story(story.id).unwrap());
        assert!(matches!(db.get_story(story.id), Err(StoreError::NotFound)));
    }

    #[test]
    fn metadata_extra_fields_survive() {
        let db = Database::open_in_memory().unwrap();
        let mut new = new_story("alice", "Extras");
        new.metadata
            .extra
            .insert("status".into(), serde_json::json!("draft"));
        let story = db.insert_story(&new).unwrap();

        let fetched = db.get_story(story.id).unwrap();
        assert_eq!(
            fetched.metadata.extra.get("status"),
            Some(&serde_json::json!("draft"))
        );
    }

    #[test]
    fn stats_count_owners_and_today() {
        let db = Database::open_in_memory().unwrap();
        db.insert_story(&new_story("alice", "One")).unwrap();
        db.insert_story(&new_story("alice", "Two")).unwrap();
        db.insert_story(&new_story("bob", "Three")).unwrap();

        let stats = db.story_stats(Utc::now()).unwrap();
        assert_eq!(stats.total_stories, 3);
        assert_eq!(stats.total_users, 2);
        assert_eq!(stats.today_stories, 3);

        let tomorrow = db.story_stats(Utc::now() + Duration::days(1)).unwrap();
        assert_eq!(tomorrow.today_stories, 0);
    }
}
