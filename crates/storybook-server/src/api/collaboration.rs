//! Collaboration routes: manage a story's collaborators and the polled
//! chapter editor (`save-content` / `check-updates`).

use axum::extract::State;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

use storybook_shared::constants::{ANONYMOUS_EDITOR, DEFAULT_CHAPTER_NUMBER};
use storybook_shared::{Role, UserId};
use storybook_store::{Collaborator, LastEditedBy};

use super::{done, load_authorized, ok, required, ApiJson, ApiQuery, ApiResult, AppState, Need};
use crate::auth::CurrentUser;
use crate::error::ServerError;

fn assignable_role(raw: &str) -> Result<Role, ServerError> {
    let role: Role = raw
        .parse()
        .map_err(|_| ServerError::BadRequest(format!("Unknown role: {raw}")))?;
    if !role.is_assignable() {
        return Err(ServerError::BadRequest(
            "Role must be editor or viewer".into(),
        ));
    }
    Ok(role)
}

/// Display name for a new collaborator.
fn collaborator_name(name: Option<String>, email: Option<&str>, user_id: &UserId) -> String {
    name.filter(|n| !n.trim().is_empty())
        .or_else(|| {
            email
                .and_then(|e| e.split('@').next())
                .filter(|local| !local.is_empty())
                .map(str::to_string)
        })
        .unwrap_or_else(|| user_id.to_string())
}

#[derive(Serialize)]
pub struct CollaboratorBody {
    collaborator: Collaborator,
}

// ---------------------------------------------------------------------------
// POST /api/collaboration/invite
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    story_id: Option<String>,
    user_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    role: Option<String>,
}

pub async fn invite(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<InviteRequest>,
) -> ApiResult<CollaboratorBody> {
    const MISSING: &str = "Missing required fields";
    let story_id = required(req.story_id, MISSING)?;
    let invitee = UserId::new(required(req.user_id, MISSING)?)
        .map_err(|_| ServerError::BadRequest(MISSING.into()))?;
    let role = assignable_role(&required(req.role, MISSING)?)?;
    let email = req.email.filter(|e| !e.trim().is_empty());

    let collaborator = state.with_db(|db| {
        let (mut story, _) = load_authorized(
            db,
            &story_id,
            user.id(),
            Need::Manage,
            "Only the story owner can invite collaborators",
        )?;
        if story.owner() == &invitee {
            return Err(ServerError::BadRequest(
                "The story owner cannot be invited".into(),
            ));
        }
        if story.collaborator(&invitee).is_some() {
            return Err(ServerError::BadRequest(
                "User is already a collaborator".into(),
            ));
        }

        let collaborator = Collaborator {
            name: collaborator_name(req.name, email.as_deref(), &invitee),
            user_id: invitee,
            email,
            role,
            joined_at: Utc::now().trunc_subsecs(6),
        };
        story.collaborators.push(collaborator.clone());
        db.set_collaborators(story.id, &story.collaborators)?;
        Ok(collaborator)
    })?;

    info!(
        story_id = %story_id,
        collaborator = %collaborator.user_id,
        role = %collaborator.role,
        "Collaborator invited"
    );
    ok(CollaboratorBody { collaborator })
}

// ---------------------------------------------------------------------------
// PUT /api/collaboration/update-role
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    story_id: Option<String>,
    collaborator_id: Option<String>,
    role: Option<String>,
}

pub async fn update_role(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<UpdateRoleRequest>,
) -> ApiResult<CollaboratorBody> {
    const MISSING: &str = "Missing required fields";
    let story_id = required(req.story_id, MISSING)?;
    let target = UserId(required(req.collaborator_id, MISSING)?);
    let role = assignable_role(&required(req.role, MISSING)?)?;

    let collaborator = state.with_db(|db| {
        let (mut story, _) = load_authorized(
            db,
            &story_id,
            user.id(),
            Need::Manage,
            "Only the story owner can update roles",
        )?;
        let entry = story
            .collaborators
            .iter_mut()
            .find(|c| c.user_id == target)
            .ok_or_else(|| ServerError::NotFound("Collaborator not found".into()))?;
        entry.role = role;
        let updated = entry.clone();
        db.set_collaborators(story.id, &story.collaborators)?;
        Ok(updated)
    })?;

    info!(story_id = %story_id, collaborator = %target, role = %role, "Collaborator role updated");
    ok(CollaboratorBody { collaborator })
}

// ---------------------------------------------------------------------------
// DELETE /api/collaboration/remove
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveRequest {
    story_id: Option<String>,
    collaborator_id: Option<String>,
}

/// Removing someone who is not a collaborator succeeds without change.
pub async fn remove(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<RemoveRequest>,
) -> ApiResult<()> {
    const MISSING: &str = "Missing required fields";
    let story_id = required(req.story_id, MISSING)?;
    let target = UserId(required(req.collaborator_id, MISSING)?);

    let removed = state.with_db(|db| {
        let (mut story, _) = load_authorized(
            db,
            &story_id,
            user.id(),
            Need::Manage,
            "Only the story owner can remove collaborators",
        )?;
        let before = story.collaborators.len();
        story.collaborators.retain(|c| c.user_id != target);
        if story.collaborators.len() == before {
            return Ok(false);
        }
        db.set_collaborators(story.id, &story.collaborators)?;
        Ok(true)
    })?;

    info!(story_id = %story_id, collaborator = %target, removed, "Collaborator removal");
    done("Collaborator removed successfully")
}

// ---------------------------------------------------------------------------
// GET /api/collaboration/collaborators
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryQuery {
    story_id: Option<String>,
}

#[derive(Serialize)]
pub struct CollaboratorsBody {
    owner: UserId,
    collaborators: Vec<Collaborator>,
}

pub async fn list_collaborators(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<StoryQuery>,
) -> ApiResult<CollaboratorsBody> {
    let story_id = required(query.story_id, "Story ID required")?;
    let (story, _) = state.with_db(|db| {
        load_authorized(db, &story_id, user.id(), Need::Read, "Access denied")
    })?;
    ok(CollaboratorsBody {
        owner: story.owner().clone(),
        collaborators: story.collaborators,
    })
}

// ---------------------------------------------------------------------------
// PUT /api/collaboration/save-content
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveContentRequest {
    story_id: Option<String>,
    chapter_number: Option<u32>,
    content: Option<String>,
    user_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedContentBody {
    last_edited_by: LastEditedBy,
    updated_at: DateTime<Utc>,
}

/// Overwrite one chapter's text.  Concurrent saves are last-write-wins.
pub async fn save_content(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<SaveContentRequest>,
) -> ApiResult<SavedContentBody> {
    const MISSING: &str = "Missing required fields";
    let story_id = required(req.story_id, MISSING)?;
    let (Some(chapter_number), Some(content)) = (req.chapter_number, req.content) else {
        return Err(ServerError::BadRequest(MISSING.into()));
    };

    let editor = LastEditedBy {
        user_id: user.id().clone(),
        user_name: req
            .user_name
            .filter(|n| !n.trim().is_empty())
            .or_else(|| user.claims.display_name())
            .unwrap_or_else(|| ANONYMOUS_EDITOR.to_string()),
        timestamp: Utc::now().trunc_subsecs(6),
    };

    let story = state.with_db(|db| {
        let (story, _) = load_authorized(
            db,
            &story_id,
            user.id(),
            Need::Edit,
            "Insufficient permissions to edit",
        )?;
        Ok(db.save_chapter_content(story.id, chapter_number, &content, &editor)?)
    })?;

    tracing::debug!(
        story_id = %story.id,
        chapter = chapter_number,
        editor = %editor.user_id,
        "Chapter content saved"
    );
    ok(SavedContentBody {
        last_edited_by: editor,
        updated_at: story.updated_at,
    })
}

// ---------------------------------------------------------------------------
// GET /api/collaboration/check-updates
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckUpdatesQuery {
    story_id: Option<String>,
    chapter: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatesBody {
    chapter_number: u32,
    content: String,
    /// Always empty: active editors are not tracked.
    edit_sessions: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_edited_by: Option<LastEditedBy>,
    updated_at: DateTime<Utc>,
}

pub async fn check_updates(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiQuery(query): ApiQuery<CheckUpdatesQuery>,
) -> ApiResult<UpdatesBody> {
    let story_id = required(query.story_id, "Story ID required")?;
    let chapter_number = match query.chapter.as_deref().map(str::trim) {
        None | Some("") => DEFAULT_CHAPTER_NUMBER,
        Some(raw) => raw
            .parse::<u32>()
            .map_err(|_| ServerError::BadRequest(format!("Invalid chapter number: {raw}")))?,
    };

    let (story, _) = state.with_db(|db| {
        load_authorized(db, &story_id, user.id(), Need::Read, "Access denied")
    })?;
    let content = story
        .chapter(chapter_number)
        .map(|c| c.content.clone())
        .ok_or_else(|| ServerError::NotFound("Chapter not found".into()))?;

    ok(UpdatesBody {
        chapter_number,
        content,
        edit_sessions: Vec::new(),
        last_edited_by: story.last_edited_by,
        updated_at: story.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assignable_role_rejects_owner_and_unknown() {
        assert_eq!(assignable_role("Editor").unwrap(), Role::Editor);
        assert_eq!(assignable_role("viewer").unwrap(), Role::Viewer);
        assert!(matches!(assignable_role("owner"), Err(ServerError::BadRequest(_))));
        assert!(matches!(assignable_role("admin"), Err(ServerError::BadRequest(_))));
    }

    #[test]
    fn collaborator_name_fallbacks() {
        let id = UserId::from("user_2");
        assert_eq!(collaborator_name(Some("Bea".into()), None, &id), "Bea");
        assert_eq!(
            collaborator_name(None, Some("bea@example.com"), &id),
            "bea"
        );
        assert_eq!(collaborator_name(Some(" ".into()), None, &id), "user_2");
    }
}
