//! Tree materialization.
//!
//! Reconstructs a hierarchical parent/child document from the flat
//! relationship rows for rendering. Pure and always terminating: the walk
//! tracks visited member ids and refuses to revisit one, so the symmetric
//! spouse/sibling row pairs cannot loop it.

use crate::model::{MemberId, MemberRecord};
use serde::Serialize;
use std::collections::HashSet;

/// One node of the rendered tree document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    pub attributes: NodeAttributes,
    pub children: Vec<TreeNode>,
}

/// Display attributes carried on each node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeAttributes {
    pub relation: String,
    pub birth_date: Option<String>,
    pub occupation: Option<String>,
}

/// Materialize the family's tree document, or `None` when no root member
/// exists.
pub fn materialize(members: &[MemberRecord]) -> Option<TreeNode> {
    let root = find_root(members)?;
    Some(build_hierarchy(root, members))
}

/// The designated root: the first member whose relation label contains
/// "self".
pub fn find_root(members: &[MemberRecord]) -> Option<&MemberRecord> {
    members
        .iter()
        .find(|record| record.member.relation.to_lowercase().contains("self"))
}

/// Depth-first walk from a designated root. Each member is visited at most
/// once; the result is bounded by member count.
pub fn build_hierarchy(root: &MemberRecord, all: &[MemberRecord]) -> TreeNode {
    let mut visited = HashSet::new();
    walk(root, all, &mut visited)
}

fn walk(record: &MemberRecord, all: &[MemberRecord], visited: &mut HashSet<MemberId>) -> TreeNode {
    visited.insert(record.member.id);

    let mut node = TreeNode {
        name: record.member.name.clone(),
        attributes: NodeAttributes {
            relation: record.member.relation.clone(),
            birth_date: record.member.birth_date.clone(),
            occupation: record.member.occupation.clone(),
        },
        children: Vec::new(),
    };

    for edge in &record.relationships {
        if visited.contains(&edge.to) {
            continue;
        }
        if let Some(related) = all.iter().find(|r| r.member.id == edge.to) {
            node.children.push(walk(related, all, visited));
        }
    }

    node
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FamilyId, Member, RelationshipEdge};

    fn record(name: &str, relation: &str) -> MemberRecord {
        MemberRecord {
            member: Member {
                id: MemberId::new(),
                family_id: FamilyId::new(),
                name: name.to_string(),
                relation: relation.to_string(),
                birth_date: None,
                occupation: None,
            },
            relationships: Vec::new(),
        }
    }

    fn link(a: &mut MemberRecord, b: &MemberRecord, kind: &str) {
        a.relationships.push(RelationshipEdge {
            to: b.member.id,
            kind: kind.to_string(),
        });
    }

    #[test]
    fn test_no_root_yields_none() {
        let members = vec![record("Rosa", "mother"), record("Tom", "brother")];
        assert!(materialize(&members).is_none());
    }

    #[test]
    fn test_root_is_self_member() {
        let members = vec![record("Rosa", "mother"), record("Ana", "self")];
        let tree = materialize(&members).unwrap();
        assert_eq!(tree.name, "Ana");
    }

    #[test]
    fn test_children_follow_forward_edges() {
        let mut ana = record("Ana", "self");
        let mut rosa = record("Rosa", "mother");
        link(&mut ana, &rosa, "child");
        link(&mut rosa, &ana, "parent");

        let tree = materialize(&[ana, rosa]).unwrap();
        assert_eq!(tree.children.len(), 1);
        assert_eq!(tree.children[0].name, "Rosa");
        // The back edge to Ana must not recurse
        assert!(tree.children[0].children.is_empty());
    }

    #[test]
    fn test_symmetric_spouse_pair_terminates() {
        let mut ana = record("Ana", "self");
        let mut ben = record("Ben", "spouse");
        link(&mut ana, &ben, "spouse");
        link(&mut ben, &ana, "spouse");

        let tree = materialize(&[ana, ben]).unwrap();
        assert_eq!(tree.name, "Ana");
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());
    }

    #[test]
    fn test_each_member_visited_at_most_once() {
        // Triangle: Ana - Ben - Rosa all mutually linked
        let mut ana = record("Ana", "self");
        let mut ben = record("Ben", "spouse");
        let mut rosa = record("Rosa", "mother");
        link(&mut ana, &ben, "spouse");
        link(&mut ana, &rosa, "child");
        link(&mut ben, &ana, "spouse");
        link(&mut ben, &rosa, "child");
        link(&mut rosa, &ana, "parent");
        link(&mut rosa, &ben, "parent");

        let tree = materialize(&[ana, ben, rosa]).unwrap();

        fn count(node: &TreeNode) -> usize {
            1 + node.children.iter().map(count).sum::<usize>()
        }
        assert_eq!(count(&tree), 3);
    }

    #[test]
    fn test_attributes_carried() {
        let mut ana = record("Ana", "self");
        ana.member.birth_date = Some("1992-01-01".to_string());
        ana.member.occupation = Some("engineer".to_string());

        let tree = materialize(&[ana]).unwrap();
        assert_eq!(tree.attributes.birth_date.as_deref(), Some("1992-01-01"));
        assert_eq!(tree.attributes.occupation.as_deref(), Some("engineer"));
        assert_eq!(tree.attributes.relation, "self");
    }
}
