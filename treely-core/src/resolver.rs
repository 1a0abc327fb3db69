//! Member resolution.
//!
//! Maps a name mentioned in conversation to an existing persisted member,
//! or determines that none exists. Matching strategy lives entirely behind
//! this module so it can be swapped (edit distance, phonetic) without
//! touching the pipeline.
//!
//! Resolution is read-only and never fabricates a match; store failures
//! surface as `StoreError`.

use crate::model::{FamilyId, Member, MemberRecord};
use crate::store::{EntityStore, NameMatch, StoreError};

/// Resolves candidate names against a family's persisted members.
pub struct Resolver<'a> {
    store: &'a dyn EntityStore,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn EntityStore) -> Self {
        Self { store }
    }

    /// Case-insensitive exact-name lookup, scoped to the family.
    ///
    /// Duplicate names are possible; the first match in insertion order
    /// wins.
    pub async fn find_existing(
        &self,
        family_id: FamilyId,
        name: &str,
    ) -> Result<Option<Member>, StoreError> {
        self.store
            .find_member_by_name(family_id, name, NameMatch::Exact)
            .await
    }

    /// Broader fuzzy pass over all members of the family.
    ///
    /// Confirms that a newly introduced speaker is already referable within
    /// the existing tree: the candidate matches when its name and a stored
    /// name contain each other in either direction, or when the candidate
    /// appears inside a member's free-text relation label.
    pub async fn find_connection(
        &self,
        family_id: FamilyId,
        candidate: &str,
    ) -> Result<Option<Member>, StoreError> {
        let members = self.store.list_members(family_id).await?;
        Ok(find_connection_in(&members, candidate))
    }
}

/// Pure fuzzy pass over an already-loaded member list.
pub(crate) fn find_connection_in(members: &[MemberRecord], candidate: &str) -> Option<Member> {
    let candidate = candidate.trim().to_lowercase();
    if candidate.is_empty() {
        return None;
    }

    members
        .iter()
        .find(|record| {
            let name = record.member.name.to_lowercase();
            let relation = record.member.relation.to_lowercase();
            name.contains(&candidate) || candidate.contains(&name) || relation.contains(&candidate)
        })
        .map(|record| record.member.clone())
}
