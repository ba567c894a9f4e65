//! Prompt construction and reply parsing for story generation.
//!
//! Model replies are expected to be JSON, but anything that fails to parse is
//! turned into a fixed fallback structure instead of an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use storybook_shared::constants::STORY_CHAPTER_COUNT;
use storybook_shared::UserId;
use storybook_store::{Chapter, StoryMetadata};

use crate::error::ServerError;

pub const STORY_SYSTEM_PROMPT: &str = "You are a creative children's story writer who creates \
engaging, age-appropriate stories with positive messages. Always respond with valid JSON. Create \
detailed image prompts for each chapter that will work well with DALL-E for children's book \
illustrations.";

pub const ENHANCE_SYSTEM_PROMPT: &str = "You are a story editor. Enhance the given story based on \
the user's request while maintaining the original story's essence and child-friendly nature.";

pub const STORY_TEMPERATURE: f32 = 0.8;
pub const STORY_MAX_TOKENS: u32 = 3000;

// ---------------------------------------------------------------------------
// Story form
// ---------------------------------------------------------------------------

/// Parameters of the story creation form, as posted by clients.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryFormInput {
    pub title: Option<String>,
    pub main_character: Option<String>,
    pub age_group: Option<String>,
    #[serde(default)]
    pub supporting_characters: Vec<String>,
    pub genre: Option<String>,
    pub tone: Option<String>,
    pub setting: Option<String>,
    pub custom_prompt: Option<String>,
}

/// A story form with every required field present.
#[derive(Debug, Clone, PartialEq)]
pub struct StoryForm {
    pub title: Option<String>,
    pub main_character: String,
    pub age_group: String,
    pub supporting_characters: Vec<String>,
    pub genre: String,
    pub tone: String,
    pub setting: String,
    pub custom_prompt: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl StoryFormInput {
    pub fn validate(self) -> Result<StoryForm, ServerError> {
        let missing = || ServerError::BadRequest("Missing required fields".into());
        Ok(StoryForm {
            title: present(self.title),
            main_character: present(self.main_character).ok_or_else(missing)?,
            age_group: present(self.age_group).ok_or_else(missing)?,
            supporting_characters: self
                .supporting_characters
                .into_iter()
                .map(|c| c.trim().to_string())
                .filter(|c| !c.is_empty())
                .collect(),
            genre: present(self.genre).ok_or_else(missing)?,
            tone: present(self.tone).ok_or_else(missing)?,
            setting: present(self.setting).ok_or_else(missing)?,
            custom_prompt: present(self.custom_prompt),
        })
    }
}

impl StoryForm {
    /// Metadata recorded alongside a story generated from this form.
    pub fn metadata(&self, owner: UserId, is_demo: bool) -> StoryMetadata {
        let mut metadata = StoryMetadata::for_owner(owner);
        metadata.main_character = Some(self.main_character.clone());
        metadata.age_group = Some(self.age_group.clone());
        metadata.genre = Some(self.genre.clone());
        metadata.tone = Some(self.tone.clone());
        metadata.setting = Some(self.setting.clone());
        metadata.supporting_characters = self.supporting_characters.clone();
        metadata.is_demo = is_demo;
        if let Some(prompt) = &self.custom_prompt {
            metadata
                .extra
                .insert("customPrompt".into(), serde_json::json!(prompt));
        }
        metadata
    }

    pub fn fallback_title(&self) -> String {
        self.title
            .clone()
            .unwrap_or_else(|| format!("{}'s {} Adventure", self.main_character, self.genre))
    }
}

/// Build the user prompt asking for a five-chapter JSON story.
pub fn build_story_prompt(form: &StoryForm) -> String {
    let title = form
        .title
        .clone()
        .unwrap_or_else(|| format!("{}'s Adventure", form.main_character));
    let supporting = if form.supporting_characters.is_empty() {
        "None".to_string()
    } else {
        form.supporting_characters.join(", ")
    };
    let extra = form
        .custom_prompt
        .as_deref()
        .map(|p| format!("- Additional Instructions: {p}\n"))
        .unwrap_or_default();

    format!(
        "Create a {tone_lc} {genre_lc} story for children aged {age}.

Story Details:
- Title: {title}
- Main Character: {main}
- Supporting Characters: {supporting}
- Setting: {setting}
- Tone: {tone}
- Genre: {genre}
{extra}
Please create a story with exactly {count} chapters. Each chapter should be 2-3 paragraphs long \
and engaging for the target age group. Format the response as a JSON object with this structure:

{{
  \"title\": \"An engaging story title\",
  \"chapters\": [
    {{
      \"chapterNumber\": 1,
      \"title\": \"Chapter title\",
      \"content\": \"Chapter content here...\",
      \"imagePrompt\": \"Detailed description for DALL-E illustration showing the scene, characters, and setting in a child-friendly art style\"
    }}
  ]
}}

Make sure the story is age-appropriate, engaging, teaches positive values, and has a satisfying \
conclusion. Each imagePrompt should be detailed and specific for generating beautiful children's \
book illustrations with DALL-E.",
        tone_lc = form.tone.to_lowercase(),
        genre_lc = form.genre.to_lowercase(),
        age = form.age_group,
        main = form.main_character,
        setting = form.setting,
        tone = form.tone,
        genre = form.genre,
        count = STORY_CHAPTER_COUNT,
    )
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// A drafted story: title plus chapters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedStory {
    pub title: String,
    pub chapters: Vec<Chapter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawStory {
    title: Option<String>,
    #[serde(default)]
    chapters: Vec<RawChapter>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChapter {
    #[serde(default)]
    chapter_number: Value,
    #[serde(default)]
    title: String,
    #[serde(default, alias = "text")]
    content: String,
    #[serde(default)]
    image_prompt: String,
}

/// Models send chapter numbers as `1`, `1.0` or `"1"`.
fn chapter_number(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => match n.as_u64() {
            Some(whole) => u32::try_from(whole).ok(),
            None => n
                .as_f64()
                .filter(|f| f.fract() == 0.0 && (0.0..=f64::from(u32::MAX)).contains(f))
                .map(|f| f as u32),
        },
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Strip a surrounding markdown code fence, if any.
fn unfence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = match rest.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &rest[4..],
        _ => rest,
    };
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse a chapter-structured reply, falling back to a single chapter that
/// carries the whole reply.
pub fn parse_generated_story(reply: &str, form: &StoryForm) -> GeneratedStory {
    match serde_json::from_str::<RawStory>(unfence(reply)) {
        Ok(raw) if !raw.chapters.is_empty() => GeneratedStory {
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| form.fallback_title()),
            chapters: raw
                .chapters
                .into_iter()
                .enumerate()
                .map(|(i, c)| Chapter {
                    chapter_number: chapter_number(&c.chapter_number).unwrap_or(i as u32 + 1),
                    title: c.title,
                    content: c.content,
                    image_prompt: c.image_prompt,
                    image_url: None,
                })
                .collect(),
        },
        _ => {
            tracing::warn!("Story reply was not chapter JSON, using fallback structure");
            fallback_story(reply, form)
        }
    }
}

fn fallback_story(reply: &str, form: &StoryForm) -> GeneratedStory {
    GeneratedStory {
        title: form.fallback_title(),
        chapters: vec![Chapter {
            chapter_number: 1,
            title: "The Beginning".to_string(),
            content: reply.to_string(),
            image_prompt: format!(
                "{} in a {}, {} style illustration for children's book, colorful and friendly",
                form.main_character,
                form.setting,
                form.genre.to_lowercase()
            ),
            image_url: None,
        }],
    }
}

// ---------------------------------------------------------------------------
// Free-form stories
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoryLength {
    Short,
    #[default]
    Medium,
    Long,
}

impl StoryLength {
    pub fn word_range(self) -> &'static str {
        match self {
            Self::Short => "200-400 words",
            Self::Medium => "500-800 words",
            Self::Long => "1000-1500 words",
        }
    }
}

/// System prompt for a free-form story in the requested shape.
pub fn free_story_system_prompt(
    template: Option<&str>,
    category: Option<&str>,
    length: StoryLength,
) -> String {
    let mut prompt = String::from(
        "You are a creative children's storyteller. Create engaging, age-appropriate stories \
         that are educational and entertaining.\n",
    );
    if let Some(t) = template {
        prompt.push_str(&format!("Use this template structure: {t}\n"));
    }
    if let Some(c) = category {
        prompt.push_str(&format!("Story category: {c}\n"));
    }
    prompt.push_str(&format!("Target length: {}\n\n", length.word_range()));
    prompt.push_str(
        "Return a JSON response with:\n\
         - title: A catchy, child-friendly title\n\
         - content: The complete story with proper paragraphs\n\
         - category: Story category (adventure, fantasy, educational, etc.)\n\
         - tags: Array of relevant tags",
    );
    prompt
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FreeStory {
    pub title: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// Free-form reply as the model sends it; only `content` is mandatory.
#[derive(Deserialize)]
struct RawFreeStory {
    title: Option<String>,
    content: String,
    category: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

pub fn parse_free_story(reply: &str, category: Option<&str>) -> FreeStory {
    let requested = || category.unwrap_or("general").to_string();
    match serde_json::from_str::<RawFreeStory>(unfence(reply)) {
        Ok(raw) => FreeStory {
            title: raw
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| "Generated Story".to_string()),
            content: raw.content,
            category: raw
                .category
                .filter(|c| !c.trim().is_empty())
                .unwrap_or_else(requested),
            tags: raw.tags,
        },
        Err(_) => {
            tracing::warn!("Free-form story reply was not JSON, using fallback structure");
            FreeStory {
                title: "Generated Story".to_string(),
                content: reply.to_string(),
                category: requested(),
                tags: vec!["ai-generated".to_string()],
            }
        }
    }
}

pub fn enhance_prompt(content: &str, enhancement: &str) -> String {
    format!(
        "Original story: {content}\n\nEnhancement request: {enhancement}\n\n\
         Return only the enhanced story content."
    )
}

// ---------------------------------------------------------------------------
// Illustrations
// ---------------------------------------------------------------------------

/// Prompt for a chapter illustration drafted alongside a story.
pub fn chapter_illustration_prompt(image_prompt: &str) -> String {
    format!(
        "Children's book illustration: {image_prompt}. Style: Colorful, friendly, cartoon-like, \
         safe and welcoming atmosphere, high quality, detailed but not scary, appropriate for \
         young readers."
    )
}

/// Prompt for a standalone illustration request.
pub fn standalone_illustration_prompt(prompt: &str) -> String {
    format!(
        "Children's book illustration: {prompt}\n\
         Style: Colorful, friendly, cartoon-like illustration suitable for children's books\n\
         Art style: Digital art, bright vibrant colors, safe and welcoming atmosphere\n\
         Quality: High quality, detailed but not scary, appropriate for young readers\n\
         Character design: Cute, expressive, and appealing to children\n\
         Background: Rich, imaginative, and story-appropriate\n\
         Lighting: Warm and inviting\n\
         No text or words in the image"
    )
}
