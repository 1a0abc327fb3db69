//! Entity Store contract.
//!
//! The store owns persisted family/member/relationship records and nothing
//! else - no business logic lives here. Two implementations are provided:
//! `MemoryStore` for tests and demos, and `PostgrestStore` for a hosted
//! PostgREST backend.

mod memory;
mod postgrest;

pub use memory::MemoryStore;
pub use postgrest::PostgrestStore;

use crate::model::{
    CurrentUser, Family, FamilyId, Member, MemberId, MemberRecord, NewMember, Relationship,
};
use crate::relation;
use async_trait::async_trait;
use thiserror::Error;

/// Errors from Entity Store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store could not be reached or rejected the request.
    /// Carries the provider's message where one was available.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("family not found: {0}")]
    FamilyNotFound(FamilyId),

    #[error("malformed store response: {0}")]
    Malformed(String),
}

/// How `find_member_by_name` should match the candidate name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameMatch {
    /// Case-insensitive whole-name equality.
    Exact,
    /// Case-insensitive substring containment in either direction.
    Fuzzy,
}

/// Data-access contract for families, members, and relationships.
///
/// All operations are scoped by family id; a family exclusively owns its
/// members and relationships. Duplicate names are possible and resolved by
/// first match in insertion order.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Create a new family.
    async fn create_family(&self, name: &str, description: &str) -> Result<Family, StoreError>;

    /// Fetch a family by id.
    async fn get_family(&self, id: FamilyId) -> Result<Family, StoreError>;

    /// Persist the identified speaker on a family.
    async fn update_family_current_user(
        &self,
        id: FamilyId,
        user: &CurrentUser,
    ) -> Result<(), StoreError>;

    /// List all members of a family in insertion order, each with its
    /// forward relationship edges.
    async fn list_members(&self, family_id: FamilyId) -> Result<Vec<MemberRecord>, StoreError>;

    /// Insert a new member row. Member rows are never updated afterwards.
    async fn insert_member(
        &self,
        family_id: FamilyId,
        fields: &NewMember,
    ) -> Result<Member, StoreError>;

    /// Find the first member matching the name under the given mode, or
    /// `None` when no member matches.
    async fn find_member_by_name(
        &self,
        family_id: FamilyId,
        name: &str,
        mode: NameMatch,
    ) -> Result<Option<Member>, StoreError>;

    /// Insert relationship rows, ignoring rows that already exist with the
    /// same (family, from, to, kind).
    async fn upsert_relationships(&self, rows: &[Relationship]) -> Result<(), StoreError>;

    /// Count the members of a family.
    async fn count_members(&self, family_id: FamilyId) -> Result<usize, StoreError>;

    /// Link two members with a typed relationship.
    ///
    /// Writes both directed rows - the forward type and its computed
    /// inverse - in a single store call so the pair cannot drift apart.
    async fn link_members(
        &self,
        family_id: FamilyId,
        from: MemberId,
        to: MemberId,
        kind: &str,
    ) -> Result<(), StoreError> {
        let rows = [
            Relationship::new(family_id, from, to, kind),
            Relationship::new(family_id, to, from, relation::inverse(kind)),
        ];
        self.upsert_relationships(&rows).await
    }
}
