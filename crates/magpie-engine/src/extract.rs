//! Entity extraction from fragment text.
//!
//! The heuristic is deliberately naive: a capitalized token is an entity
//! name. Callers that already know the entities pass them explicitly and
//! bypass extraction entirely, so this is the floor, not the ceiling.

use std::collections::BTreeSet;

/// Extract candidate entity names from text.
///
/// A token qualifies when, after stripping surrounding punctuation, it
/// starts with an uppercase letter and is longer than one character (which
/// drops the pronoun "I"). Output is deduplicated and sorted so pair
/// generation downstream is deterministic.
pub fn extract_entities(text: &str) -> Vec<String> {
    let mut names = BTreeSet::new();
    for token in text.split_whitespace() {
        let word = token.trim_matches(|c: char| !c.is_alphanumeric());
        if word.chars().count() > 1 && word.chars().next().is_some_and(|c| c.is_uppercase()) {
            names.insert(word.to_string());
        }
    }
    names.into_iter().collect()
}

/// All unordered pairs from a sorted name list, first element always the
/// lexically smaller name.
pub fn entity_pairs(names: &[String]) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for i in 0..names.len() {
        for j in (i + 1)..names.len() {
            pairs.push((names[i].clone(), names[j].clone()));
        }
    }
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_capitalized_tokens() {
        let names = extract_entities("yesterday Alice met Bob near the Seine");
        assert_eq!(names, vec!["Alice", "Bob", "Seine"]);
    }

    #[test]
    fn test_strips_surrounding_punctuation() {
        let names = extract_entities("talked to (Alice), then \"Bob\"!");
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_drops_short_and_lowercase_tokens() {
        let names = extract_entities("I saw x and a Y near iPhone");
        assert!(names.is_empty());
    }

    #[test]
    fn test_dedup_and_sort() {
        let names = extract_entities("Bob told Bob about Alice");
        assert_eq!(names, vec!["Alice", "Bob"]);
    }

    #[test]
    fn test_non_ascii_names() {
        let names = extract_entities("later Zoë phoned Åsa");
        assert_eq!(names, vec!["Zoë", "Åsa"]);
    }

    #[test]
    fn test_entity_pairs() {
        let names = vec!["Alice".to_string(), "Bob".to_string(), "Carol".to_string()];
        let pairs = entity_pairs(&names);
        assert_eq!(
            pairs,
            vec![
                ("Alice".to_string(), "Bob".to_string()),
                ("Alice".to_string(), "Carol".to_string()),
                ("Bob".to_string(), "Carol".to_string()),
            ]
        );
    }

    #[test]
    fn test_pairs_empty_and_single() {
        assert!(entity_pairs(&[]).is_empty());
        assert!(entity_pairs(&["Alice".to_string()]).is_empty());
    }
}
