//! Persisted record types for families, members, and relationships.
//!
//! A family exclusively owns its members and relationships. Relationships
//! reference members by id only; they are associations, not pointers.
//! Members are never mutated once persisted - only relationships evolve.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Unique identifier for families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FamilyId(pub Uuid);

impl FamilyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for FamilyId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for FamilyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for family members.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemberId(pub Uuid);

impl MemberId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MemberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for relationship rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipId(pub Uuid);

impl RelationshipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RelationshipId {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Records
// ============================================================================

/// The top-level container for one tree's members and relationships.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Family {
    pub id: FamilyId,
    pub name: String,
    pub description: String,

    /// Denormalized snapshot of the identified speaker, set at most once
    /// per conversation unless reset.
    pub current_user: Option<CurrentUser>,

    pub created_at: DateTime<Utc>,
}

/// The identified speaker for a family's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentUser {
    pub name: String,
    pub relation: String,
}

/// One person recorded within a family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub family_id: FamilyId,

    /// Display name. Not guaranteed unique within a family.
    pub name: String,

    /// Free-text relation label relative to the tree owner, e.g. "self",
    /// "father". The materializer roots the tree at the "self" member.
    pub relation: String,

    pub birth_date: Option<String>,
    pub occupation: Option<String>,
}

/// Fields for a member row that has not been persisted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMember {
    pub name: String,
    pub relation: String,
    pub birth_date: Option<String>,
    pub occupation: Option<String>,
}

impl NewMember {
    pub fn new(name: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relation: relation.into(),
            birth_date: None,
            occupation: None,
        }
    }
}

/// A directed, typed link between two members.
///
/// Every semantic link is stored as two directed rows, one per direction,
/// the second carrying the computed inverse type. Writers must always
/// produce both rows together (see `EntityStore::link_members`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelationshipId,
    pub family_id: FamilyId,
    pub from: MemberId,
    pub to: MemberId,
    pub kind: String,
}

impl Relationship {
    pub fn new(family_id: FamilyId, from: MemberId, to: MemberId, kind: impl Into<String>) -> Self {
        Self {
            id: RelationshipId::new(),
            family_id,
            from,
            to,
            kind: kind.into(),
        }
    }
}

/// A member together with its forward relationship edges, as returned by
/// `EntityStore::list_members`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberRecord {
    pub member: Member,
    pub relationships: Vec<RelationshipEdge>,
}

/// One forward edge of a member's relationship set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub to: MemberId,
    pub kind: String,
}

// ============================================================================
// Conversation
// ============================================================================

/// One turn of the in-memory chat transcript. Held for the life of a
/// session only; transcripts are not persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// The speaker of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}
