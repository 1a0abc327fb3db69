//! Conversation context building.
//!
//! Assembles the system prompt the model sees on every turn. The prompt is
//! a pure function of the family, its member graph, and whether a speaker
//! has been identified; it performs no I/O.

use crate::directive::{CLOSE_TAG, OPEN_TAG};
use crate::model::{CurrentUser, Family, MemberRecord};
use crate::relation::RELATIONSHIP_VOCABULARY;
use std::collections::HashMap;

/// Build the system prompt for one model call.
///
/// With no identified speaker the prompt asks the model to establish who
/// the visitor is and to emit an `identify_user` payload once their exact
/// full name is known. With an identified speaker the prompt enumerates
/// the member graph and constrains the model to the `add_member` payload
/// and the closed relationship vocabulary.
pub fn build_system_prompt(
    family: &Family,
    members: &[MemberRecord],
    current_user: Option<&CurrentUser>,
) -> String {
    match current_user {
        None => unidentified_prompt(family, members),
        Some(user) => identified_prompt(family, members, user),
    }
}

fn unidentified_prompt(family: &Family, members: &[MemberRecord]) -> String {
    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are a warm, conversational assistant helping visitors build the \
         \"{}\" family tree.\n\n",
        family.name
    ));
    prompt.push_str(
        "You do not yet know who you are talking to. Ask for the visitor's \
         full name and their relation to this family tree before anything \
         else.\n",
    );

    if !members.is_empty() {
        prompt.push_str("\nPeople already recorded in this tree:\n");
        for record in members {
            prompt.push_str(&format!(
                "- {} ({})\n",
                record.member.name, record.member.relation
            ));
        }
        prompt.push_str(
            "\nIf the visitor's name is unclear, ask a clarifying question that \
             references these people rather than inventing someone new.\n",
        );
    }

    prompt.push_str(&format!(
        "\nOnce you know the visitor's exact full name and relation, include \
         this payload in your reply:\n{OPEN_TAG}{{\"action\":\"identify_user\",\
         \"user\":{{\"name\":\"exact full name\",\"relation\":\"relation\"}}}}{CLOSE_TAG}\n",
    ));
    prompt.push_str(
        "Never show the payload or its tags to the visitor; the visible part \
         of your reply must read as plain conversation.\n",
    );

    prompt
}

fn identified_prompt(family: &Family, members: &[MemberRecord], user: &CurrentUser) -> String {
    let names: HashMap<_, _> = members
        .iter()
        .map(|r| (r.member.id, r.member.name.as_str()))
        .collect();

    let mut prompt = String::new();

    prompt.push_str(&format!(
        "You are helping {} ({}) build the \"{}\" family tree through \
         conversation.\n",
        user.name, user.relation, family.name
    ));

    if !members.is_empty() {
        prompt.push_str("\nCurrent family tree:\n");
        for record in members {
            prompt.push_str(&format!(
                "- {} ({})",
                record.member.name, record.member.relation
            ));
            let relations: Vec<String> = record
                .relationships
                .iter()
                .filter_map(|edge| {
                    names
                        .get(&edge.to)
                        .map(|name| format!("{} of {}", edge.kind, name))
                })
                .collect();
            if !relations.is_empty() {
                prompt.push_str(&format!(" - {}", relations.join(", ")));
            }
            prompt.push('\n');
        }
    }

    prompt.push_str(
        "\nWhen a person is mentioned, first confirm whether they are already \
         in the tree above. Ask targeted questions about how a new person \
         relates to existing members; do not guess.\n",
    );
    prompt.push_str(&format!(
        "\nOnly once you have a new person's name and at least one \
         relationship, include this payload in your reply:\n\
         {OPEN_TAG}{{\"action\":\"add_member\",\"member\":{{\"name\":\"\",\
         \"relation\":\"to {}\",\"birth_date\":\"YYYY-MM-DD\",\"occupation\":\"\",\
         \"relationships\":[{{\"to_name\":\"existing member name\",\"type\":\"\"}}]}}}}{CLOSE_TAG}\n",
        user.name
    ));
    prompt.push_str(&format!(
        "birth_date and occupation are optional. Relationship types must be \
         one of: {}.\n",
        RELATIONSHIP_VOCABULARY.join(", ")
    ));
    prompt.push_str(
        "Never show the payload or its tags to the visitor; the visible part \
         of your reply must read as plain conversation.\n",
    );

    prompt
}
