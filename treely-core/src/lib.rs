//! Conversation-driven family tree pipeline.
//!
//! This crate provides:
//! - A chat session that turns free-form conversation into persisted
//!   family/member/relationship records via model-emitted directives
//! - Defensive, fail-open parsing of the model's embedded payloads
//! - Name resolution against the existing tree, with identity gating
//! - A tree materializer for the rendering layer
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use treely_core::{ChatSession, MemoryStore, OpenAiModel};
//! use treely_core::store::EntityStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = Arc::new(MemoryStore::new());
//!     let family = store.create_family("Rivera", "Our tree").await?;
//!     let model = Arc::new(OpenAiModel::from_env()?);
//!
//!     let mut session = ChatSession::open(store, model, family.id).await?;
//!     let outcome = session.send("Hi, I'm Ana").await?;
//!     println!("{}", outcome.reply);
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod directive;
pub mod hierarchy;
pub mod model;
pub mod pipeline;
pub mod provider;
pub mod relation;
pub mod resolver;
pub mod store;
pub mod testing;

// Primary public API
pub use directive::{parse_directive, strip_directive, Directive};
pub use hierarchy::{materialize, TreeNode};
pub use model::{ConversationTurn, CurrentUser, Family, FamilyId, Member, MemberId, TurnRole};
pub use pipeline::{ChatError, ChatSession, SessionConfig, SessionState, TreeEvent, TurnOutcome};
pub use provider::{ChatModel, ModelSettings, OpenAiModel, ProviderError};
pub use store::{EntityStore, MemoryStore, NameMatch, PostgrestStore, StoreError};
pub use testing::{FlakyStore, ScriptedModel, StoreOp, TestHarness};
