//! Relationship type normalization.
//!
//! Relationships are persisted as two directed rows per semantic link, so
//! every write needs the inverse of the forward label. The mapping covers
//! the symmetric core of the vocabulary; labels outside it pass through
//! unchanged, which keeps the function total.

/// The closed vocabulary the model is asked to draw relationship types
/// from. Free-text labels outside this list are still stored as given.
pub const RELATIONSHIP_VOCABULARY: &[&str] = &[
    "parent",
    "child",
    "sibling",
    "spouse",
    "grandparent",
    "grandchild",
    "aunt/uncle",
    "niece/nephew",
    "cousin",
];

/// Return the semantic inverse of a relationship label.
///
/// Unrecognized labels are returned unchanged rather than rejected.
pub fn inverse(kind: &str) -> String {
    match kind.to_lowercase().as_str() {
        "parent" => "child".to_string(),
        "child" => "parent".to_string(),
        "sibling" => "sibling".to_string(),
        "spouse" => "spouse".to_string(),
        _ => kind.to_string(),
    }
}
