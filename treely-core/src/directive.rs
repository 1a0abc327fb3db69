//! Directive extraction from model replies.
//!
//! A reply may contain zero or one structured payload delimited by sentinel
//! tags wrapping a single JSON object. Extraction is fail-open: malformed
//! JSON, a missing required field, or an unknown action all yield "no
//! directive" so the conversational text can still be shown to the user.

use serde::Deserialize;

/// Opening sentinel for an embedded payload.
pub const OPEN_TAG: &str = "<json>";
/// Closing sentinel for an embedded payload.
pub const CLOSE_TAG: &str = "</json>";

/// A structured instruction embedded in a model reply.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Directive {
    /// The model has established who the visitor is.
    IdentifyUser { user: IdentifiedUser },
    /// The model has gathered enough to record a new person.
    AddMember { member: MemberPayload },
}

/// The visitor's self-identification.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct IdentifiedUser {
    pub name: String,
    #[serde(default)]
    pub relation: Option<String>,
}

/// A new person as described by the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemberPayload {
    pub name: String,
    #[serde(default)]
    pub relation: Option<String>,
    #[serde(default)]
    pub birth_date: Option<String>,
    #[serde(default)]
    pub occupation: Option<String>,
    #[serde(default)]
    pub relationships: Vec<DeclaredRelationship>,
}

/// A declared link from the new person to an existing member.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeclaredRelationship {
    pub to_name: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Extract the first delimited payload from a model reply.
///
/// Returns `None` on any decode or shape failure rather than raising; the
/// reply text must still reach the user when extraction fails.
pub fn parse_directive(reply: &str) -> Option<Directive> {
    let span = delimited_span(reply)?;
    let directive: Directive = serde_json::from_str(span).ok()?;

    // An empty name is a shape failure, not a usable directive.
    let name = match &directive {
        Directive::IdentifyUser { user } => &user.name,
        Directive::AddMember { member } => &member.name,
    };
    if name.trim().is_empty() {
        return None;
    }

    Some(directive)
}

/// Remove the first delimited span (if any) and trim the remainder.
///
/// A reply with no span is returned unchanged.
pub fn strip_directive(reply: &str) -> String {
    let Some((start, end)) = delimited_bounds(reply) else {
        return reply.to_string();
    };
    format!("{}{}", &reply[..start], &reply[end..])
        .trim()
        .to_string()
}

/// The JSON text between the first sentinel pair, if present.
fn delimited_span(reply: &str) -> Option<&str> {
    let (start, end) = delimited_bounds(reply)?;
    Some(&reply[start + OPEN_TAG.len()..end - CLOSE_TAG.len()])
}

/// Byte bounds of the first sentinel pair, tags included.
fn delimited_bounds(reply: &str) -> Option<(usize, usize)> {
    let start = reply.find(OPEN_TAG)?;
    let close = reply[start + OPEN_TAG.len()..].find(CLOSE_TAG)?;
    let end = start + OPEN_TAG.len() + close + CLOSE_TAG.len();
    Some((start, end))
}
