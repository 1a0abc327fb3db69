//! PostgREST-backed Entity Store.
//!
//! Talks to a hosted relational backend (Supabase-style) over its REST
//! layer. Three tables mirror the data model: `families`, `family_members`,
//! and `relationships` (directed rows with `person1_id` / `person2_id` /
//! `relationship_type` columns).
//!
//! Name matching is done client-side over the family's member list so that
//! `Exact` and `Fuzzy` behave identically across store implementations.

use super::{EntityStore, NameMatch, StoreError};
use crate::model::{
    CurrentUser, Family, FamilyId, Member, MemberId, MemberRecord, NewMember, Relationship,
    RelationshipEdge, RelationshipId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Entity Store over a PostgREST endpoint.
///
/// Duplicate suppression in [`upsert_relationships`] relies on a unique
/// index over `(family_id, person1_id, person2_id, relationship_type)` on
/// the `relationships` table; without it PostgREST rejects the
/// `on_conflict` target and every relationship write fails. Add the index
/// with:
///
/// ```sql
/// create unique index relationships_directed_edge_key
///   on relationships (family_id, person1_id, person2_id, relationship_type);
/// ```
///
/// [`upsert_relationships`]: EntityStore::upsert_relationships
#[derive(Clone)]
pub struct PostgrestStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl PostgrestStore {
    /// Create a store for the given REST base URL (e.g.
    /// `https://project.supabase.co/rest/v1`) and API key.
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(15))
                .connect_timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("Failed to build HTTP client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    /// Create a store from SUPABASE_URL and SUPABASE_ANON_KEY environment
    /// variables.
    pub fn from_env() -> Result<Self, StoreError> {
        let url = std::env::var("SUPABASE_URL")
            .map_err(|_| StoreError::Unavailable("SUPABASE_URL not set".to_string()))?;
        let key = std::env::var("SUPABASE_ANON_KEY")
            .map_err(|_| StoreError::Unavailable("SUPABASE_ANON_KEY not set".to_string()))?;
        Ok(Self::new(format!("{}/rest/v1", url.trim_end_matches('/')), key))
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            "apikey",
            HeaderValue::from_str(&self.api_key)
                .map_err(|e| StoreError::Unavailable(format!("invalid API key: {e}")))?,
        );
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|e| StoreError::Unavailable(format!("invalid API key: {e}")))?,
        );
        Ok(headers)
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String, StoreError> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(StoreError::Unavailable(format!(
                "status {}: {}",
                status.as_u16(),
                body
            )));
        }
        Ok(body)
    }

    async fn fetch_members(&self, family_id: FamilyId) -> Result<Vec<Member>, StoreError> {
        let url = format!(
            "{}/family_members?family_id=eq.{}&select=*&order=created_at.asc",
            self.base_url, family_id
        );
        let body = self.send(self.http.get(url).headers(self.headers()?)).await?;
        let rows: Vec<MemberRow> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows.into_iter().map(Member::from).collect())
    }

    async fn fetch_relationships(
        &self,
        family_id: FamilyId,
    ) -> Result<Vec<Relationship>, StoreError> {
        let url = format!(
            "{}/relationships?family_id=eq.{}&select=*",
            self.base_url, family_id
        );
        let body = self.send(self.http.get(url).headers(self.headers()?)).await?;
        let rows: Vec<RelationshipRow> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows.into_iter().map(Relationship::from).collect())
    }
}

#[async_trait]
impl EntityStore for PostgrestStore {
    async fn create_family(&self, name: &str, description: &str) -> Result<Family, StoreError> {
        let url = format!("{}/families", self.base_url);
        let mut headers = self.headers()?;
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let body = self
            .send(
                self.http
                    .post(url)
                    .headers(headers)
                    .json(&json!({ "name": name, "description": description })),
            )
            .await?;
        let rows: Vec<FamilyRow> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .map(Family::from)
            .ok_or_else(|| StoreError::Malformed("insert returned no family row".to_string()))
    }

    async fn get_family(&self, id: FamilyId) -> Result<Family, StoreError> {
        let url = format!("{}/families?id=eq.{}&select=*", self.base_url, id);
        let body = self.send(self.http.get(url).headers(self.headers()?)).await?;
        let rows: Vec<FamilyRow> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .map(Family::from)
            .ok_or(StoreError::FamilyNotFound(id))
    }

    async fn update_family_current_user(
        &self,
        id: FamilyId,
        user: &CurrentUser,
    ) -> Result<(), StoreError> {
        let url = format!("{}/families?id=eq.{}", self.base_url, id);
        self.send(
            self.http
                .patch(url)
                .headers(self.headers()?)
                .json(&json!({ "current_user": user })),
        )
        .await?;
        Ok(())
    }

    async fn list_members(&self, family_id: FamilyId) -> Result<Vec<MemberRecord>, StoreError> {
        let members = self.fetch_members(family_id).await?;
        let relationships = self.fetch_relationships(family_id).await?;

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
        let url = format!("{}/family_members", self.base_url);
        let mut headers = self.headers()?;
        headers.insert("Prefer", HeaderValue::from_static("return=representation"));

        let body = self
            .send(self.http.post(url).headers(headers).json(&json!({
                "family_id": family_id,
                "name": fields.name,
                "relation": fields.relation,
                "birth_date": fields.birth_date,
                "occupation": fields.occupation,
            })))
            .await?;
        let rows: Vec<MemberRow> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        rows.into_iter()
            .next()
            .map(Member::from)
            .ok_or_else(|| StoreError::Malformed("insert returned no member row".to_string()))
    }

    async fn find_member_by_name(
        &self,
        family_id: FamilyId,
        name: &str,
        mode: NameMatch,
    ) -> Result<Option<Member>, StoreError> {
        let candidate = name.to_lowercase();
        let members = self.fetch_members(family_id).await?;
        Ok(members.into_iter().find(|m| {
            let stored = m.name.to_lowercase();
            match mode {
                NameMatch::Exact => stored == candidate,
                NameMatch::Fuzzy => stored.contains(&candidate) || candidate.contains(&stored),
            }
        }))
    }

    async fn upsert_relationships(&self, rows: &[Relationship]) -> Result<(), StoreError> {
        if rows.is_empty() {
            return Ok(());
        }

        // Requires the unique index documented on the struct; the conflict
        // target below must name its exact column set.
        let url = format!(
            "{}/relationships?on_conflict=family_id,person1_id,person2_id,relationship_type",
            self.base_url
        );
        let mut headers = self.headers()?;
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=ignore-duplicates"),
        );

        let payload: Vec<RelationshipRow> = rows.iter().map(RelationshipRow::from).collect();
        self.send(self.http.post(url).headers(headers).json(&payload))
            .await?;
        Ok(())
    }

    async fn count_members(&self, family_id: FamilyId) -> Result<usize, StoreError> {
        let url = format!(
            "{}/family_members?family_id=eq.{}&select=id",
            self.base_url, family_id
        );
        let body = self.send(self.http.get(url).headers(self.headers()?)).await?;
        let rows: Vec<serde_json::Value> =
            serde_json::from_str(&body).map_err(|e| StoreError::Malformed(e.to_string()))?;
        Ok(rows.len())
    }
}

// ============================================================================
// Wire rows
// ============================================================================

#[derive(Debug, Deserialize)]
struct FamilyRow {
    id: FamilyId,
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    current_user: Option<CurrentUser>,
    created_at: DateTime<Utc>,
}

impl From<FamilyRow> for Family {
    fn from(row: FamilyRow) -> Self {
        Family {
            id: row.id,
            name: row.name,
            description: row.description.unwrap_or_default(),
            current_user: row.current_user,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MemberRow {
    id: MemberId,
    family_id: FamilyId,
    name: String,
    #[serde(default)]
    relation: Option<String>,
    #[serde(default)]
    birth_date: Option<String>,
    #[serde(default)]
    occupation: Option<String>,
}

impl From<MemberRow> for Member {
    fn from(row: MemberRow) -> Self {
        Member {
            id: row.id,
            family_id: row.family_id,
            name: row.name,
            relation: row.relation.unwrap_or_default(),
            birth_date: row.birth_date,
            occupation: row.occupation,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct RelationshipRow {
    id: RelationshipId,
    family_id: FamilyId,
    person1_id: MemberId,
    person2_id: MemberId,
    relationship_type: String,
}

impl From<&Relationship> for RelationshipRow {
    fn from(rel: &Relationship) -> Self {
        RelationshipRow {
            id: rel.id,
            family_id: rel.family_id,
            person1_id: rel.from,
            person2_id: rel.to,
            relationship_type: rel.kind.clone(),
        }
    }
}

impl From<RelationshipRow> for Relationship {
    fn from(row: RelationshipRow) -> Self {
        Relationship {
            id: row.id,
            family_id: row.family_id,
            from: row.person1_id,
            to: row.person2_id,
            kind: row.relationship_type,
        }
    }
}
