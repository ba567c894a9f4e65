//! Story CRUD routes.

use axum::extract::{Path, State};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::info;

use storybook_shared::{Role, StoryId, UserId};
use storybook_store::{Chapter, NewStory, Story, StoryMetadata};

use super::{done, load_authorized, ok, required, ApiJson, ApiQuery, ApiResult, AppState, Need};
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ServerError;

const DEFAULT_GENRE: &str = "fantasy";
const DEFAULT_AUDIENCE: &str = "children";

/// Merge caller-supplied metadata with the fields the server owns.
pub(crate) fn build_metadata(
    mut fields: Map<String, Value>,
    owner: &UserId,
    is_demo: bool,
) -> Result<StoryMetadata, ServerError> {
    fields.insert("userId".into(), Value::String(owner.to_string()));
    fields.insert("isDemo".into(), Value::Bool(is_demo));
    serde_json::from_value(Value::Object(fields))
        .map_err(|e| ServerError::BadRequest(format!("Invalid metadata: {e}")))
}

#[derive(Serialize)]
pub struct StoriesBody {
    stories: Vec<Story>,
}

#[derive(Serialize)]
pub struct StoryBody {
    story: Story,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<Role>,
}

// ---------------------------------------------------------------------------
// GET /api/stories
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ListQuery {
    scope: Option<String>,
}

pub async fn list_stories(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<ListQuery>,
) -> ApiResult<StoriesBody> {
    let stories = state.with_db(|db| match query.scope.as_deref() {
        None | Some("owned") => Ok(db.list_stories_for_owner(user.id())?),
        Some("shared") => Ok(db.list_stories_shared_with(user.id())?),
        Some(other) => Err(ServerError::BadRequest(format!("Unknown scope: {other}"))),
    })?;
    ok(StoriesBody { stories })
}

// ---------------------------------------------------------------------------
// POST /api/stories
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateStoryRequest {
    title: Option<String>,
    description: Option<String>,
    genre: Option<String>,
    target_audience: Option<String>,
    #[serde(default)]
    chapters: Vec<Chapter>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

pub async fn create_story(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<CreateStoryRequest>,
) -> ApiResult<StoryBody> {
    let title = required(req.title, "Title is required")?;

    let mut fields = req.metadata;
    fields.insert(
        "genre".into(),
        Value::String(req.genre.unwrap_or_else(|| DEFAULT_GENRE.into())),
    );
    fields.insert(
        "targetAudience".into(),
        Value::String(
            req.target_audience
                .unwrap_or_else(|| DEFAULT_AUDIENCE.into()),
        ),
    );
    fields
        .entry("status")
        .or_insert_with(|| Value::String("draft".into()));

    let new = NewStory {
        title,
        description: req.description.filter(|d| !d.trim().is_empty()),
        chapters: req.chapters,
        metadata: build_metadata(fields, user.id(), false)?,
    };
    let story = state.with_db(|db| Ok(db.insert_story(&new)?))?;

    info!(story_id = %story.id, owner = %user.id(), "Story created");
    ok(StoryBody {
        story,
        role: Some(Role::Owner),
    })
}

// ---------------------------------------------------------------------------
// /api/stories/:id
// ---------------------------------------------------------------------------

pub async fn get_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StoryBody> {
    let (story, access) =
        state.with_db(|db| load_authorized(db, &id, user.id(), Need::Read, "Access denied"))?;
    ok(StoryBody {
        story,
        role: access.role(),
    })
}

#[derive(Deserialize)]
pub struct UpdateStoryRequest {
    chapters: Option<Vec<Chapter>>,
}

/// Replace the chapter list.  Repeating the same request leaves the story
/// unchanged apart from `updatedAt`.
pub async fn update_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<UpdateStoryRequest>,
) -> ApiResult<StoryBody> {
    let chapters = req
        .chapters
        .ok_or_else(|| ServerError::BadRequest("Chapters are required".into()))?;

    let (story, access) = state.with_db(|db| {
        let (story, access) =
            load_authorized(db, &id, user.id(), Need::Edit, "Insufficient permissions")?;
        Ok((db.update_chapters(story.id, &chapters)?, access))
    })?;

    info!(
        story_id = %story.id,
        editor = %user.id(),
        chapters = story.chapters.len(),
        "Story chapters updated"
    );
    ok(StoryBody {
        story,
        role: access.role(),
    })
}

pub async fn delete_story(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<()> {
    let story_id = state.with_db(|db| {
        let (story, _) = load_authorized(
            db,
            &id,
            user.id(),
            Need::Manage,
            "Only the story owner can delete this story",
        )?;
        db.delete_story(story.id)?;
        Ok(story.id)
    })?;

    info!(story_id = %story_id, owner = %user.id(), "Story deleted");
    done("Story deleted successfully")
}

// ---------------------------------------------------------------------------
// POST /api/save-story
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct DraftStory {
    title: Option<String>,
    #[serde(default)]
    chapters: Vec<Chapter>,
}

#[derive(Deserialize)]
pub struct SaveStoryRequest {
    story: Option<DraftStory>,
    metadata: Option<Map<String, Value>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedStoryBody {
    story_id: StoryId,
    is_demo: bool,
}

/// Persist a generated story.  Anonymous callers save under the demo owner.
pub async fn save_story(
    State(state): State<AppState>,
    user: MaybeUser,
    ApiJson(req): ApiJson<SaveStoryRequest>,
) -> ApiResult<SavedStoryBody> {
    let (owner, is_demo) = state.owner_for(&user)?;
    let (Some(draft), Some(fields)) = (req.story, req.metadata) else {
        return Err(ServerError::BadRequest("Missing story data".into()));
    };
    let title = required(draft.title, "Missing story data")?;

    let new = NewStory {
        title,
        description: None,
        chapters: draft.chapters,
        metadata: build_metadata(fields, &owner, is_demo)?,
    };
    let story = state.with_db(|db| Ok(db.insert_story(&new)?))?;

    info!(story_id = %story.id, owner = %owner, is_demo, "Generated story saved");
    ok(SavedStoryBody {
        story_id: story.id,
        is_demo,
    })
}
