/// Application name
pub const APP_NAME: &str = "Storybook";

/// Owner id recorded on stories saved without a signed-in user
pub const DEMO_USER_ID: &str = "demo-user";

/// Number of chapters requested from the story model
pub const STORY_CHAPTER_COUNT: usize = 5;

/// Chapter number assumed by check-updates when none is given
pub const DEFAULT_CHAPTER_NUMBER: u32 = 1;

/// Display name recorded when an editor saves without one
pub const ANONYMOUS_EDITOR: &str = "Anonymous";

/// Interval at which editor clients poll check-updates, in seconds
pub const UPDATE_POLL_INTERVAL_SECS: u64 = 5;

/// Idle time after the last keystroke before an editor client autosaves, in milliseconds
pub const AUTOSAVE_DEBOUNCE_MS: u64 = 2_000;

/// Maximum audio upload accepted for transcription (25 MiB)
pub const MAX_AUDIO_SIZE: usize = 25 * 1024 * 1024;

/// Maximum JSON request body (1 MiB)
pub const MAX_JSON_BODY: usize = 1024 * 1024;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Ed25519 public key size in bytes
pub const PUBKEY_SIZE: usize = 32;

/// Image sizes accepted by the illustration endpoint
pub const IMAGE_SIZES: &[&str] = &["1024x1024", "1792x1024", "1024x1792"];

/// Image size used when the caller does not pick one
pub const DEFAULT_IMAGE_SIZE: &str = "1024x1024";
