//! Routes backed by the AI vendor: story drafting, rewriting, illustration
//! and transcription.

use axum::extract::{Multipart, State};
use bytes::Bytes;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use storybook_shared::constants::{DEFAULT_IMAGE_SIZE, IMAGE_SIZES, MAX_AUDIO_SIZE};
use storybook_store::{Chapter, StoryMetadata};

use super::{ok, required, ApiJson, ApiResult, AppState};
use crate::ai::{ChatRequest, ImageRequest, TranscriptionRequest};
use crate::auth::{CurrentUser, MaybeUser};
use crate::error::ServerError;
use crate::generation::{
    build_story_prompt, chapter_illustration_prompt, enhance_prompt, free_story_system_prompt,
    parse_free_story, parse_generated_story, standalone_illustration_prompt, FreeStory,
    GeneratedStory, StoryForm, StoryFormInput, StoryLength, ENHANCE_SYSTEM_PROMPT,
    STORY_MAX_TOKENS, STORY_SYSTEM_PROMPT, STORY_TEMPERATURE,
};

const TRANSCRIBE_LANGUAGE: &str = "en";
const TRANSCRIBE_TEMPERATURE: f32 = 0.2;
const FREE_STORY_TEMPERATURE: f32 = 0.8;

#[derive(Serialize)]
pub struct GeneratedBody {
    story: GeneratedStory,
    metadata: StoryMetadata,
}

async fn draft_story(state: &AppState, form: &StoryForm) -> Result<GeneratedStory, ServerError> {
    let reply = state
        .ai
        .chat(ChatRequest {
            model: state.config.ai.chat_model.clone(),
            system: STORY_SYSTEM_PROMPT.to_string(),
            prompt: build_story_prompt(form),
            temperature: Some(STORY_TEMPERATURE),
            max_tokens: Some(STORY_MAX_TOKENS),
        })
        .await?;
    Ok(parse_generated_story(&reply, form))
}

/// Illustrate every chapter concurrently.  A chapter whose illustration fails
/// is kept without an image.
async fn illustrate(state: &AppState, chapters: Vec<Chapter>) -> Vec<Chapter> {
    let jobs = chapters.into_iter().map(|mut chapter| async move {
        if chapter.image_prompt.trim().is_empty() {
            return chapter;
        }
        let request = ImageRequest {
            model: state.config.ai.image_model.clone(),
            prompt: chapter_illustration_prompt(&chapter.image_prompt),
            size: DEFAULT_IMAGE_SIZE.to_string(),
        };
        match state.ai.generate_image(request).await {
            Ok(url) => chapter.image_url = Some(url),
            Err(e) => warn!(
                chapter = chapter.chapter_number,
                error = %e,
                "Chapter illustration failed, continuing without image"
            ),
        }
        chapter
    });
    join_all(jobs).await
}

// ---------------------------------------------------------------------------
// POST /api/generate
// ---------------------------------------------------------------------------

/// Draft a five-chapter story and illustrate it.
pub async fn generate_illustrated(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(input): ApiJson<StoryFormInput>,
) -> ApiResult<GeneratedBody> {
    let form = input.validate()?;

    let mut story = draft_story(&state, &form).await?;
    story.chapters = illustrate(&state, story.chapters).await;

    info!(
        user = %user.id(),
        chapters = story.chapters.len(),
        illustrated = story.chapters.iter().filter(|c| c.image_url.is_some()).count(),
        "Illustrated story generated"
    );
    ok(GeneratedBody {
        story,
        metadata: form.metadata(user.id().clone(), false),
    })
}

// ---------------------------------------------------------------------------
// POST /api/generate-story
// ---------------------------------------------------------------------------

/// Draft a five-chapter story without illustrations.  Anonymous callers get a
/// demo story.
pub async fn generate_story(
    State(state): State<AppState>,
    user: MaybeUser,
    ApiJson(input): ApiJson<StoryFormInput>,
) -> ApiResult<GeneratedBody> {
    let (owner, is_demo) = state.owner_for(&user)?;
    let form = input.validate()?;

    let story = draft_story(&state, &form).await?;

    info!(owner = %owner, is_demo, chapters = story.chapters.len(), "Story generated");
    ok(GeneratedBody {
        story,
        metadata: form.metadata(owner, is_demo),
    })
}

// ---------------------------------------------------------------------------
// POST /api/ai/generate-story
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FreeStoryRequest {
    prompt: Option<String>,
    template: Option<String>,
    category: Option<String>,
    #[serde(default)]
    length: StoryLength,
}

pub async fn generate_free_story(
    State(state): State<AppState>,
    user: MaybeUser,
    ApiJson(req): ApiJson<FreeStoryRequest>,
) -> ApiResult<FreeStory> {
    state.owner_for(&user)?;
    let prompt = required(req.prompt, "Prompt is required")?;
    let category = req.category.filter(|c| !c.trim().is_empty());

    let reply = state
        .ai
        .chat(ChatRequest {
            model: state.config.ai.enhance_model.clone(),
            system: free_story_system_prompt(
                req.template.as_deref(),
                category.as_deref(),
                req.length,
            ),
            prompt,
            temperature: Some(FREE_STORY_TEMPERATURE),
            max_tokens: None,
        })
        .await?;

    ok(parse_free_story(&reply, category.as_deref()))
}

// ---------------------------------------------------------------------------
// POST /api/ai/enhance-story
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct EnhanceRequest {
    content: Option<String>,
    enhancement: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedBody {
    enhanced_content: String,
}

pub async fn enhance_story(
    State(state): State<AppState>,
    user: MaybeUser,
    ApiJson(req): ApiJson<EnhanceRequest>,
) -> ApiResult<EnhancedBody> {
    state.owner_for(&user)?;
    let content = required(req.content, "Content and enhancement are required")?;
    let enhancement = required(req.enhancement, "Content and enhancement are required")?;

    let enhanced_content = state
        .ai
        .chat(ChatRequest {
            model: state.config.ai.enhance_model.clone(),
            system: ENHANCE_SYSTEM_PROMPT.to_string(),
            prompt: enhance_prompt(&content, &enhancement),
            temperature: None,
            max_tokens: None,
        })
        .await?;

    ok(EnhancedBody { enhanced_content })
}

// ---------------------------------------------------------------------------
// POST /api/generate-image
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct ImageGenerationRequest {
    prompt: Option<String>,
    size: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageBody {
    image_url: String,
    original_prompt: String,
    enhanced_prompt: String,
}

pub async fn generate_image(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(req): ApiJson<ImageGenerationRequest>,
) -> ApiResult<ImageBody> {
    let prompt = required(req.prompt, "Image prompt is required")?;
    let size = req.size.unwrap_or_else(|| DEFAULT_IMAGE_SIZE.to_string());
    if !IMAGE_SIZES.contains(&size.as_str()) {
        return Err(ServerError::BadRequest(format!(
            "Unsupported image size: {size}"
        )));
    }

    let enhanced_prompt = standalone_illustration_prompt(&prompt);
    let image_url = state
        .ai
        .generate_image(ImageRequest {
            model: state.config.ai.image_model.clone(),
            prompt: enhanced_prompt.clone(),
            size,
        })
        .await?;

    info!(user = %user.id(), "Illustration generated");
    ok(ImageBody {
        image_url,
        original_prompt: prompt,
        enhanced_prompt,
    })
}

// ---------------------------------------------------------------------------
// POST /api/transcribe-audio
// ---------------------------------------------------------------------------

struct AudioUpload {
    file_name: String,
    content_type: Option<String>,
    data: Bytes,
}

async fn read_audio_field(multipart: &mut Multipart) -> Result<Option<AudioUpload>, ServerError> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some("audio") {
            continue;
        }
        let file_name = field
            .file_name()
            .filter(|n| !n.is_empty())
            .unwrap_or("audio.webm")
            .to_string();
        let content_type = field.content_type().map(str::to_string);
        let data = field.bytes().await?;
        return Ok(Some(AudioUpload {
            file_name,
            content_type,
            data,
        }));
    }
    Ok(None)
}

#[derive(Serialize)]
pub struct TranscriptionBody {
    text: String,
}

pub async fn transcribe_audio(
    State(state): State<AppState>,
    user: CurrentUser,
    mut multipart: Multipart,
) -> ApiResult<TranscriptionBody> {
    let upload = read_audio_field(&mut multipart)
        .await?
        .filter(|u| !u.data.is_empty())
        .ok_or_else(|| ServerError::BadRequest("Audio file is required".into()))?;
    if upload.data.len() > MAX_AUDIO_SIZE {
        return Err(ServerError::BadRequest(
            "Audio file too large. Maximum size is 25MB.".into(),
        ));
    }

    let size = upload.data.len();
    let text = state
        .ai
        .transcribe(TranscriptionRequest {
            model: state.config.ai.transcribe_model.clone(),
            language: TRANSCRIBE_LANGUAGE.to_string(),
            temperature: TRANSCRIBE_TEMPERATURE,
            file_name: upload.file_name,
            content_type: upload.content_type,
            audio: upload.data,
        })
        .await?;

    info!(user = %user.id(), size, "Audio transcribed");
    ok(TranscriptionBody { text })
}
