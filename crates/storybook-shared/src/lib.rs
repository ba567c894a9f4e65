//! # storybook-shared
//!
//! Types shared between the story store and the HTTP server: user and story
//! identifiers, collaborator roles, identity-provider session tokens and the
//! constants both sides agree on.

pub mod constants;
pub mod error;
pub mod session;
pub mod types;

pub use error::{SessionError, TypeError};
pub use types::{Role, StoryId, UserId};
