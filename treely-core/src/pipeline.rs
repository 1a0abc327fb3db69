//! Tree Update Pipeline.
//!
//! `ChatSession` is the orchestrator: it sends conversation context to the
//! model, parses a directive from the reply, resolves identities against
//! the store, applies writes, and returns the clean conversational text.
//! All family/member/relationship writes happen exclusively through this
//! pipeline.
//!
//! Sessions are self-contained values, not process-wide state; two
//! sessions against different families are fully independent. Two sessions
//! against the same family are not coordinated - the design assumes one
//! active conversant per family at a time.

use crate::context;
use crate::directive::{parse_directive, strip_directive, Directive, MemberPayload};
use crate::hierarchy::{self, TreeNode};
use crate::model::{
    ConversationTurn, CurrentUser, Family, FamilyId, Member, MemberRecord, NewMember,
};
use crate::provider::{ChatModel, ProviderError};
use crate::resolver::Resolver;
use crate::store::{EntityStore, StoreError};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors from a chat turn. Every failure here is recoverable: the user's
/// message stays in the transcript and they may retry by sending another.
#[derive(Debug, Error)]
pub enum ChatError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How many recent turns to send to the model.
    pub context_turns: usize,

    /// Per-turn character cap applied to the history sent to the model.
    pub max_turn_chars: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            context_turns: 3,
            max_turn_chars: 200,
        }
    }
}

/// Identification state of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No speaker has been confirmed yet; member extraction is disabled.
    AwaitingIdentity,
    /// A speaker has been confirmed and persisted on the family.
    Active(CurrentUser),
}

impl SessionState {
    fn current_user(&self) -> Option<&CurrentUser> {
        match self {
            SessionState::AwaitingIdentity => None,
            SessionState::Active(user) => Some(user),
        }
    }
}

/// The structured side effect of one turn, if any.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent {
    /// The visitor was confirmed against the existing tree and persisted
    /// as the family's current user.
    UserIdentified(CurrentUser),

    /// A member directive was applied.
    MemberAdded {
        member: Member,
        /// Whether a new row was inserted (false when the member already
        /// existed and only relationships were written).
        inserted: bool,
        /// How many semantic links were written (two rows each).
        linked: usize,
        /// Counterpart names that could not be resolved and were skipped.
        skipped: Vec<String>,
    },
}

/// The result of one chat turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The stripped reply text, as appended to the transcript.
    pub reply: String,

    /// The structured update applied this turn, if any.
    pub event: Option<TreeEvent>,
}

/// One conversation against one family.
pub struct ChatSession {
    store: Arc<dyn EntityStore>,
    model: Arc<dyn ChatModel>,
    config: SessionConfig,
    family: Family,
    members: Vec<MemberRecord>,
    transcript: Vec<ConversationTurn>,
    state: SessionState,
}

impl ChatSession {
    /// Open a session against an existing family.
    ///
    /// Loads the family and its member graph; the session starts Active
    /// when a current user was already persisted.
    pub async fn open(
        store: Arc<dyn EntityStore>,
        model: Arc<dyn ChatModel>,
        family_id: FamilyId,
    ) -> Result<Self, ChatError> {
        Self::open_with_config(store, model, family_id, SessionConfig::default()).await
    }

    /// Open a session with explicit context limits.
    pub async fn open_with_config(
        store: Arc<dyn EntityStore>,
        model: Arc<dyn ChatModel>,
        family_id: FamilyId,
        config: SessionConfig,
    ) -> Result<Self, ChatError> {
        let family = store.get_family(family_id).await?;
        let members = store.list_members(family_id).await?;
        let state = match family.current_user.clone() {
            Some(user) => SessionState::Active(user),
            None => SessionState::AwaitingIdentity,
        };

        Ok(Self {
            store,
            model,
            config,
            family,
            members,
            transcript: Vec::new(),
            state,
        })
    }

    /// Process one user message.
    ///
    /// The user's turn is appended to the transcript before anything
    /// fallible runs, so a provider or store failure never loses input.
    /// The stripped reply is always appended regardless of directive
    /// outcome; directive failures are silent by design.
    pub async fn send(&mut self, input: &str) -> Result<TurnOutcome, ChatError> {
        self.transcript.push(ConversationTurn::user(input));

        let system = context::build_system_prompt(
            &self.family,
            &self.members,
            self.state.current_user(),
        );
        let history = self.recent_history();

        let reply = self.model.complete(&system, &history, input).await?;

        let event = match parse_directive(&reply) {
            Some(directive) => self.apply_directive(directive).await?,
            None => {
                debug!("no directive in reply");
                None
            }
        };

        let clean = strip_directive(&reply);
        self.transcript.push(ConversationTurn::assistant(&clean));

        Ok(TurnOutcome {
            reply: clean,
            event,
        })
    }

    /// Apply a parsed directive according to the session state machine.
    async fn apply_directive(
        &mut self,
        directive: Directive,
    ) -> Result<Option<TreeEvent>, ChatError> {
        let active = matches!(self.state, SessionState::Active(_));
        match directive {
            Directive::IdentifyUser { user } if !active => {
                self.confirm_identity(user.name, user.relation).await
            }
            Directive::AddMember { member } if active => {
                self.apply_add_member(member).await.map(Some)
            }
            Directive::AddMember { .. } => {
                // Member extraction is gated on a confirmed identity.
                debug!("ignoring add_member while awaiting identity");
                Ok(None)
            }
            Directive::IdentifyUser { .. } => {
                debug!("ignoring identify_user in active session");
                Ok(None)
            }
        }
    }

    /// Confirm a self-identification against the existing tree.
    ///
    /// The named person must already be referable within the family graph;
    /// otherwise the session stays AwaitingIdentity with no error raised.
    /// This is expected conversational flow, not a fault.
    async fn confirm_identity(
        &mut self,
        name: String,
        relation: Option<String>,
    ) -> Result<Option<TreeEvent>, ChatError> {
        let resolver = Resolver::new(self.store.as_ref());
        let Some(matched) = resolver.find_connection(self.family.id, &name).await? else {
            debug!(%name, "identity not confirmed, no connection in family graph");
            return Ok(None);
        };

        let user = CurrentUser {
            name,
            relation: relation.unwrap_or_else(|| matched.relation.clone()),
        };
        self.store
            .update_family_current_user(self.family.id, &user)
            .await?;
        self.family.current_user = Some(user.clone());
        self.state = SessionState::Active(user.clone());

        info!(name = %user.name, "current user identified");
        Ok(Some(TreeEvent::UserIdentified(user)))
    }

    /// Apply an add_member directive: resolve by exact name, insert only
    /// when absent, link declared relationships in both directions, then
    /// reload the member graph so the next prompt sees the new state.
    async fn apply_add_member(&mut self, payload: MemberPayload) -> Result<TreeEvent, ChatError> {
        let resolver = Resolver::new(self.store.as_ref());

        let (member, inserted) = match resolver
            .find_existing(self.family.id, &payload.name)
            .await?
        {
            // Member identity is immutable once persisted; an existing row
            // is reused as-is, only relationships may still be written.
            Some(existing) => (existing, false),
            None => {
                let fields = NewMember {
                    name: payload.name.clone(),
                    relation: payload.relation.clone().unwrap_or_default(),
                    birth_date: payload.birth_date.clone(),
                    occupation: payload.occupation.clone(),
                };
                let member = self.store.insert_member(self.family.id, &fields).await?;
                info!(name = %member.name, "member inserted");
                (member, true)
            }
        };

        let mut linked = 0;
        let mut skipped = Vec::new();
        for declared in &payload.relationships {
            match resolver
                .find_existing(self.family.id, &declared.to_name)
                .await?
            {
                Some(other) if other.id != member.id => {
                    self.store
                        .link_members(self.family.id, member.id, other.id, &declared.kind)
                        .await?;
                    linked += 1;
                }
                Some(_) => {
                    warn!(name = %declared.to_name, "skipping self-referential relationship");
                    skipped.push(declared.to_name.clone());
                }
                None => {
                    // Fail-open: an unresolvable counterpart is dropped
                    // silently, the rest of the directive still applies.
                    debug!(name = %declared.to_name, "counterpart not found, skipping");
                    skipped.push(declared.to_name.clone());
                }
            }
        }

        self.members = self.store.list_members(self.family.id).await?;

        Ok(TreeEvent::MemberAdded {
            member,
            inserted,
            linked,
            skipped,
        })
    }

    /// The bounded history sent to the model: the most recent turns before
    /// the current input, each clipped to the configured character cap.
    fn recent_history(&self) -> Vec<ConversationTurn> {
        let prior = &self.transcript[..self.transcript.len().saturating_sub(1)];
        let start = prior.len().saturating_sub(self.config.context_turns);
        prior[start..]
            .iter()
            .map(|turn| ConversationTurn {
                role: turn.role,
                content: clip(&turn.content, self.config.max_turn_chars),
                timestamp: turn.timestamp,
            })
            .collect()
    }

    /// The full transcript of this session.
    pub fn transcript(&self) -> &[ConversationTurn] {
        &self.transcript
    }

    /// The session's identification state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// The confirmed speaker, if any.
    pub fn current_user(&self) -> Option<&CurrentUser> {
        self.state.current_user()
    }

    /// The family this session is bound to.
    pub fn family(&self) -> &Family {
        &self.family
    }

    /// The cached member graph (reloaded after every write).
    pub fn members(&self) -> &[MemberRecord] {
        &self.members
    }

    /// Materialize the hierarchical tree document for rendering, or `None`
    /// when the tree has no root member.
    pub fn tree(&self) -> Option<TreeNode> {
        hierarchy::materialize(&self.members)
    }
}

/// Clip a string to at most `max_chars` characters, respecting character
/// boundaries.
fn clip(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_respects_char_boundaries() {
        assert_eq!(clip("hello", 3), "hel");
        assert_eq!(clip("hello", 10), "hello");
        // Multibyte characters must not be split
        assert_eq!(clip("ábcdé", 5), "ábcdé");
        assert_eq!(clip("ábcdé", 2), "áb");
    }

    #[test]
    fn test_default_config_bounds() {
        let config = SessionConfig::default();
        assert_eq!(config.context_turns, 3);
        assert_eq!(config.max_turn_chars, 200);
    }

    #[test]
    fn test_session_state_current_user() {
        assert!(SessionState::AwaitingIdentity.current_user().is_none());

        let user = CurrentUser {
            name: "Ana".to_string(),
            relation: "self".to_string(),
        };
        let state = SessionState::Active(user.clone());
        assert_eq!(state.current_user(), Some(&user));
    }
}
