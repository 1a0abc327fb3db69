//! In-memory Entity Store.
//!
//! Backs tests, demos, and offline use. Insertion order is preserved so
//! first-match name resolution behaves like the hosted backend ordered by
//! creation time.

use super::{EntityStore, NameMatch, StoreError};
use crate::model::{
    CurrentUser, Family, FamilyId, Member, MemberId, MemberRecord, NewMember, Relationship,
    RelationshipEdge,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Default)]
struct Inner {
    families: HashMap<FamilyId, Family>,
    /// Members per family in insertion order.
    members: HashMap<FamilyId, Vec<Member>>,
    relationships: HashMap<FamilyId, Vec<Relationship>>,
}

/// An Entity Store held entirely in memory.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All relationship rows of a family, in insertion order. Test helper.
    pub async fn relationship_rows(&self, family_id: FamilyId) -> Vec<Relationship> {
        let inner = self.inner.read().await;
        inner
            .relationships
            .get(&family_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn create_family(&self, name: &str, description: &str) -> Result<Family, StoreError> {
        let family = Family {
            id: FamilyId::new(),
            name: name.to_string(),
            description: description.to_string(),
            current_user: None,
            created_at: Utc::now(),
        };

        let mut inner = self.inner.write().await;
        inner.families.insert(family.id, family.clone());
        inner.members.insert(family.id, Vec::new());
        inner.relationships.insert(family.id, Vec::new());
        Ok(family)
    }

    async fn get_family(&self, id: FamilyId) -> Result<Family, StoreError> {
        let inner = self.inner.read().await;
        inner
            .families
            .get(&id)
            .cloned()
            .ok_or(StoreError::FamilyNotFound(id))
    }

    async fn update_family_current_user(
        &self,
        id: FamilyId,
        user: &CurrentUser,
    ) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let family = inner
            .families
            .get_mut(&id)
            .ok_or(StoreError::FamilyNotFound(id))?;
        family.current_user = Some(user.clone());
        Ok(())
    }

    async fn list_members(&self, family_id: FamilyId) -> Result<Vec<MemberRecord>, StoreError> {
        let inner = self.inner.read().await;
        let members = inner.members.get(&family_id).cloned().unwrap_or_default();
        let relationships = inner
            .relationships
            .get(&family_id)
            .cloned()
            .unwrap_or_default();

        Ok(members
            .into_iter()
            .map(|member| {
                let edges = relationships
                    .iter()
                    .filter(|r| r.from == member.id)
                    .map(|r| RelationshipEdge {
                        to: r.to,
                        kind: r.kind.clone(),
                    })
                    .collect();
                MemberRecord {
                    member,
                    relationships: edges,
                }
            })
            .collect())
    }

    async fn insert_member(
        &self,
        family_id: FamilyId,
        fields: &NewMember,
    ) -> Result<Member, StoreError> {
        let mut inner = self.inner.write().await;
        if !inner.families.contains_key(&family_id) {
            return Err(StoreError::FamilyNotFound(family_id));
        }

        let member = Member {
            id: MemberId::new(),
            family_id,
            name: fields.name.clone(),
            relation: fields.relation.clone(),
            birth_date: fields.birth_date.clone(),
            occupation: fields.occupation.clone(),
        };
        inner
            .members
            .entry(family_id)
            .or_default()
            .push(member.clone());
        Ok(member)
    }

    async fn find_member_by_name(
        &self,
        family_id: FamilyId,
        name: &str,
        mode: NameMatch,
    ) -> Result<Option<Member>, StoreError> {
        let inner = self.inner.read().await;
        let candidate = name.to_lowercase();
        let members = inner.members.get(&family_id);

        Ok(members.and_then(|members| {
            members
                .iter()
                .find(|m| {
                    let stored = m.name.to_lowercase();
                    match mode {
                        NameMatch::Exact => stored == candidate,
                        NameMatch::Fuzzy => {
                            stored.contains(&candidate) || candidate.contains(&stored)
                        }
                    }
                })
                .cloned()
        }))
    }

    async fn upsert_relationships(&self, rows: &[Relationship]) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        for row in rows {
            let existing = inner.relationships.entry(row.family_id).or_default();
            let duplicate = existing
                .iter()
                .any(|r| r.from == row.from && r.to == row.to && r.kind == row.kind);
            if !duplicate {
                existing.push(row.clone());
            }
        }
        Ok(())
    }

    async fn count_members(&self, family_id: FamilyId) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner.members.get(&family_id).map_or(0, Vec::len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_family() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "The Rivera tree").await.unwrap();

        let fetched = store.get_family(family.id).await.unwrap();
        assert_eq!(fetched.name, "Rivera");
        assert!(fetched.current_user.is_none());
    }

    #[tokio::test]
    async fn test_get_missing_family() {
        let store = MemoryStore::new();
        let result = store.get_family(FamilyId::new()).await;
        assert!(matches!(result, Err(StoreError::FamilyNotFound(_))));
    }

    #[tokio::test]
    async fn test_insert_and_count_members() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();

        store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();
        store
            .insert_member(family.id, &NewMember::new("Tom", "brother"))
            .await
            .unwrap();

        assert_eq!(store.count_members(family.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_member_exact_is_case_insensitive() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();
        store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();

        let found = store
            .find_member_by_name(family.id, "ANA", NameMatch::Exact)
            .await
            .unwrap();
        assert_eq!(found.unwrap().name, "Ana");

        let missing = store
            .find_member_by_name(family.id, "An", NameMatch::Exact)
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_find_member_fuzzy() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();
        store
            .insert_member(family.id, &NewMember::new("Ana Maria Rivera", "self"))
            .await
            .unwrap();

        // Candidate contained in stored name
        let found = store
            .find_member_by_name(family.id, "ana maria", NameMatch::Fuzzy)
            .await
            .unwrap();
        assert!(found.is_some());

        // Stored name contained in candidate
        let found = store
            .find_member_by_name(family.id, "Mrs. Ana Maria Rivera Sr.", NameMatch::Fuzzy)
            .await
            .unwrap();
        assert!(found.is_some());
    }

    #[tokio::test]
    async fn test_first_match_wins_on_duplicate_names() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();
        let first = store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();
        store
            .insert_member(family.id, &NewMember::new("Ana", "cousin"))
            .await
            .unwrap();

        let found = store
            .find_member_by_name(family.id, "Ana", NameMatch::Exact)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(found.id, first.id);
    }

    #[tokio::test]
    async fn test_link_members_writes_both_directions() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();
        let ana = store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();
        let rosa = store
            .insert_member(family.id, &NewMember::new("Rosa", "mother"))
            .await
            .unwrap();

        store
            .link_members(family.id, rosa.id, ana.id, "parent")
            .await
            .unwrap();

        let rows = store.relationship_rows(family.id).await;
        assert_eq!(rows.len(), 2);
        assert!(rows
            .iter()
            .any(|r| r.from == rosa.id && r.to == ana.id && r.kind == "parent"));
        assert!(rows
            .iter()
            .any(|r| r.from == ana.id && r.to == rosa.id && r.kind == "child"));
    }

    #[tokio::test]
    async fn test_upsert_skips_duplicate_rows() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();
        let ana = store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();
        let tom = store
            .insert_member(family.id, &NewMember::new("Tom", "brother"))
            .await
            .unwrap();

        store
            .link_members(family.id, tom.id, ana.id, "sibling")
            .await
            .unwrap();
        store
            .link_members(family.id, tom.id, ana.id, "sibling")
            .await
            .unwrap();

        assert_eq!(store.relationship_rows(family.id).await.len(), 2);
    }

    #[tokio::test]
    async fn test_list_members_carries_forward_edges() {
        let store = MemoryStore::new();
        let family = store.create_family("Rivera", "").await.unwrap();
        let ana = store
            .insert_member(family.id, &NewMember::new("Ana", "self"))
            .await
            .unwrap();
        let rosa = store
            .insert_member(family.id, &NewMember::new("Rosa", "mother"))
            .await
            .unwrap();
        store
            .link_members(family.id, rosa.id, ana.id, "parent")
            .await
            .unwrap();

        let records = store.list_members(family.id).await.unwrap();
        assert_eq!(records.len(), 2);

        let rosa_record = records.iter().find(|r| r.member.id == rosa.id).unwrap();
        assert_eq!(rosa_record.relationships.len(), 1);
        assert_eq!(rosa_record.relationships[0].to, ana.id);
        assert_eq!(rosa_record.relationships[0].kind, "parent");
    }
}
