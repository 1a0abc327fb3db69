//! Testing utilities for the pipeline.
//!
//! This module provides tools for integration testing:
//! - `ScriptedModel` for deterministic testing without API calls
//! - `FlakyStore` for injecting store failures into chosen operations
//! - `TestHarness` for scripted conversation scenarios
//! - Assertion helpers for verifying session and store state

use crate::model::{
    ConversationTurn, CurrentUser, Family, FamilyId, Member, MemberRecord, NewMember, Relationship,
};
use crate::pipeline::{ChatSession, SessionState, TurnOutcome};
use crate::provider::{ChatModel, ProviderError};
use crate::store::{EntityStore, MemoryStore, NameMatch, StoreError};
use async_trait::async_trait;
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};

/// A scripted reply, either text or a provider failure.
#[derive(Debug, Clone)]
enum ScriptedReply {
    Text(String),
    Failure(String),
}

/// A mock model that returns scripted replies in order.
///
/// Use this for deterministic integration tests without API calls. The
/// last system prompt sent is recorded for inspection.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    last_system: Mutex<Option<String>>,
    last_history_len: Mutex<usize>,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply to return.
    pub fn queue_reply(&self, reply: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Text(reply.into()));
    }

    /// Queue a provider failure.
    pub fn queue_failure(&self, message: impl Into<String>) {
        self.replies
            .lock()
            .unwrap()
            .push_back(ScriptedReply::Failure(message.into()));
    }

    /// The system prompt of the most recent call.
    pub fn last_system_prompt(&self) -> Option<String> {
        self.last_system.lock().unwrap().clone()
    }

    /// How many history turns the most recent call carried.
    pub fn last_history_len(&self) -> usize {
        *self.last_history_len.lock().unwrap()
    }
}

#[async_trait]
impl ChatModel for ScriptedModel {
    async fn complete(
        &self,
        system: &str,
        history: &[ConversationTurn],
        _user: &str,
    ) -> Result<String, ProviderError> {
        *self.last_system.lock().unwrap() = Some(system.to_string());
        *self.last_history_len.lock().unwrap() = history.len();

        match self.replies.lock().unwrap().pop_front() {
            Some(ScriptedReply::Text(text)) => Ok(text),
            Some(ScriptedReply::Failure(message)) => Err(ProviderError(message)),
            None => Ok("I have nothing more to add.".to_string()),
        }
    }
}

/// A store operation a `FlakyStore` can fail on demand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOp {
    UpdateCurrentUser,
    InsertMember,
    ListMembers,
    UpsertRelationships,
}

/// A store wrapper that fails chosen operations once, then recovers.
///
/// Wraps a `MemoryStore` and delegates everything; `fail_next` arms a
/// one-shot `StoreError::Unavailable` for the named operation, so a retry
/// of the same turn goes through.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    failing: Mutex<HashSet<StoreOp>>,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>) -> Self {
        Self {
            inner,
            failing: Mutex::new(HashSet::new()),
        }
    }

    /// Make the next call to the given operation fail.
    pub fn fail_next(&self, op: StoreOp) {
        self.failing.lock().unwrap().insert(op);
    }

    fn trip(&self, op: StoreOp) -> Result<(), StoreError> {
        if self.failing.lock().unwrap().remove(&op) {
            return Err(StoreError::Unavailable(format!("{op:?} is down")));
        }
        Ok(())
    }
}

#[async_trait]
impl EntityStore for FlakyStore {
    async fn create_family(&self, name: &str, description: &str) -> Result<Family, StoreError> {
        self.inner.create_family(name, description).await
    }

    async fn get_family(&self, id: FamilyId) -> Result<Family, StoreError> {
        self.inner.get_family(id).await
    }

    async fn update_family_current_user(
        &self,
        id: FamilyId,
        user: &CurrentUser,
    ) -> Result<(), StoreError> {
        self.trip(StoreOp::UpdateCurrentUser)?;
        self.inner.update_family_current_user(id, user).await
    }

    async fn list_members(&self, family_id: FamilyId) -> Result<Vec<MemberRecord>, StoreError> {
        self.trip(StoreOp::ListMembers)?;
        self.inner.list_members(family_id).await
    }

    async fn insert_member(
        &self,
        family_id: FamilyId,
        fields: &NewMember,
    ) -> Result<Member, StoreError> {
        self.trip(StoreOp::InsertMember)?;
        self.inner.insert_member(family_id, fields).await
    }

    async fn find_member_by_name(
        &self,
        family_id: FamilyId,
        name: &str,
        mode: NameMatch,
    ) -> Result<Option<Member>, StoreError> {
        self.inner.find_member_by_name(family_id, name, mode).await
    }

    async fn upsert_relationships(&self, rows: &[Relationship]) -> Result<(), StoreError> {
        self.trip(StoreOp::UpsertRelationships)?;
        self.inner.upsert_relationships(rows).await
    }

    async fn count_members(&self, family_id: FamilyId) -> Result<usize, StoreError> {
        self.inner.count_members(family_id).await
    }
}

/// Test harness for running conversation scenarios against an in-memory
/// store.
pub struct TestHarness {
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub family_id: FamilyId,
    pub session: ChatSession,
}

impl TestHarness {
    /// Create a harness with an empty family.
    pub async fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let family = store
            .create_family("Test Family", "harness family")
            .await
            .expect("create family");
        let model = Arc::new(ScriptedModel::new());

        let session = ChatSession::open(store.clone(), model.clone(), family.id)
            .await
            .expect("open session");

        Self {
            store,
            model,
            family_id: family.id,
            session,
        }
    }

    /// Seed a member directly through the store, before the conversation
    /// starts. Reopens the session so it sees the seeded graph.
    pub async fn seed_member(&mut self, name: &str, relation: &str) -> Member {
        let member = self
            .store
            .insert_member(self.family_id, &NewMember::new(name, relation))
            .await
            .expect("insert member");
        self.reopen().await;
        member
    }

    /// Reopen the session against the same family, picking up persisted
    /// state (used to simulate returning to an identified conversation).
    pub async fn reopen(&mut self) {
        self.session = ChatSession::open(self.store.clone(), self.model.clone(), self.family_id)
            .await
            .expect("reopen session");
    }

    /// Queue a model reply.
    pub fn expect_reply(&self, text: impl Into<String>) -> &Self {
        self.model.queue_reply(text);
        self
    }

    /// Send user input through the session.
    pub async fn send(&mut self, input: &str) -> TurnOutcome {
        self.session.send(input).await.expect("send turn")
    }

    /// Number of members currently persisted.
    pub async fn member_count(&self) -> usize {
        self.store
            .count_members(self.family_id)
            .await
            .expect("count members")
    }

    /// Whether a member with the exact name exists.
    pub async fn has_member(&self, name: &str) -> bool {
        self.store
            .find_member_by_name(self.family_id, name, crate::store::NameMatch::Exact)
            .await
            .expect("find member")
            .is_some()
    }

    /// Relationship kinds stored from one member to another, by name.
    pub async fn kinds_between(&self, from: &str, to: &str) -> Vec<String> {
        let members = self
            .store
            .list_members(self.family_id)
            .await
            .expect("list members");
        let find = |name: &str| {
            members
                .iter()
                .find(|r| r.member.name == name)
                .map(|r| r.member.id)
        };
        let (Some(from_id), Some(to_id)) = (find(from), find(to)) else {
            return Vec::new();
        };

        self.store
            .relationship_rows(self.family_id)
            .await
            .into_iter()
            .filter(|r| r.from == from_id && r.to == to_id)
            .map(|r| r.kind)
            .collect()
    }
}

// ============================================================================
// Assertion Helpers
// ============================================================================

/// Assert the session has not confirmed a speaker yet.
#[track_caller]
pub fn assert_awaiting_identity(harness: &TestHarness) {
    assert!(
        matches!(harness.session.state(), SessionState::AwaitingIdentity),
        "Expected session to be awaiting identity, got {:?}",
        harness.session.state()
    );
}

/// Assert the session has confirmed the named speaker.
#[track_caller]
pub fn assert_active_as(harness: &TestHarness, name: &str) {
    match harness.session.state() {
        SessionState::Active(user) => assert_eq!(
            user.name, name,
            "Expected current user '{name}', got '{}'",
            user.name
        ),
        SessionState::AwaitingIdentity => {
            panic!("Expected active session as '{name}', still awaiting identity")
        }
    }
}

/// Assert both directed rows of a semantic link exist.
pub async fn assert_symmetric_link(harness: &TestHarness, a: &str, b: &str, kind: &str) {
    let forward = harness.kinds_between(a, b).await;
    let backward = harness.kinds_between(b, a).await;
    let inverse = crate::relation::inverse(kind);

    assert!(
        forward.iter().any(|k| k == kind),
        "Expected ({a},{b},{kind}) row, found {forward:?}"
    );
    assert!(
        backward.iter().any(|k| *k == inverse),
        "Expected ({b},{a},{inverse}) row, found {backward:?}"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_model_replays_in_order() {
        let model = ScriptedModel::new();
        model.queue_reply("first");
        model.queue_reply("second");

        assert_eq!(model.complete("sys", &[], "hi").await.unwrap(), "first");
        assert_eq!(model.complete("sys", &[], "hi").await.unwrap(), "second");
        // Exhausted queue falls back to a default line
        assert!(model
            .complete("sys", &[], "hi")
            .await
            .unwrap()
            .contains("nothing more"));
    }

    #[tokio::test]
    async fn test_scripted_model_failure() {
        let model = ScriptedModel::new();
        model.queue_failure("rate limited");

        let err = model.complete("sys", &[], "hi").await.unwrap_err();
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_flaky_store_fails_once_then_recovers() {
        let store = FlakyStore::new(Arc::new(MemoryStore::new()));
        let family = store.create_family("Test", "").await.unwrap();

        store.fail_next(StoreOp::InsertMember);
        let err = store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));

        // The armed failure is consumed; the same call now succeeds
        store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();
        assert_eq!(store.count_members(family.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_harness_starts_awaiting_identity() {
        let harness = TestHarness::new().await;
        assert_awaiting_identity(&harness);
        assert_eq!(harness.member_count().await, 0);
    }

    #[tokio::test]
    async fn test_harness_seeding() {
        let mut harness = TestHarness::new().await;
        harness.seed_member("Ana", "self").await;

        assert!(harness.has_member("Ana").await);
        assert_eq!(harness.member_count().await, 1);
    }
}
