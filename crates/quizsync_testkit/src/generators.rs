//! Property-based test generators using proptest.
//!
//! Provides strategies for generating progress records that keep the
//! model's invariants (non-empty IDs, resolvable question types).

use crate::fixtures::at;
use proptest::prelude::*;
use quizsync_model::{MistakeEntry, QuestionIdType};
use std::collections::BTreeSet;

/// Strategy for question IDs from a small alphabet, so independently
/// generated sets overlap.
pub fn question_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("Q[0-9]{1,2}").expect("Invalid regex")
}

/// Strategy for numeric IDs too large to be real questions.
pub fn legacy_id_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[1-9][0-9]{17,24}").expect("Invalid regex")
}

/// Strategy for the ID namespace.
pub fn id_type_strategy() -> impl Strategy<Value = QuestionIdType> {
    prop_oneof![Just(QuestionIdType::External), Just(QuestionIdType::Ibn)]
}

/// Strategy for sets of distinct question IDs.
pub fn seen_set_strategy(max: usize) -> impl Strategy<Value = BTreeSet<String>> {
    prop::collection::btree_set(question_id_strategy(), 0..=max)
}

/// Strategy for a mistake on a generated question.
pub fn mistake_entry_strategy() -> impl Strategy<Value = MistakeEntry> {
    (
        question_id_strategy(),
        id_type_strategy(),
        any::<bool>(),
        "[A-D]",
        0i64..1_000_000,
    )
        .prop_map(|(id, id_type, mcq, answer, secs)| {
            if mcq {
                MistakeEntry::choice(id, id_type, answer, at(secs))
            } else {
                MistakeEntry::input(id, id_type, answer, at(secs))
            }
        })
}

/// Strategy for mistakes with distinct question IDs.
pub fn mistake_set_strategy(max: usize) -> impl Strategy<Value = Vec<MistakeEntry>> {
    prop::collection::vec(mistake_entry_strategy(), 0..=max).prop_map(|entries| {
        let mut seen = BTreeSet::new();
        entries
            .into_iter()
            .filter(|e| seen.insert(e.question_id.clone()))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    proptest! {
        #[test]
        fn generated_ids_are_not_legacy(entry in mistake_entry_strategy()) {
            prop_assert!(!entry.has_legacy_id());
            prop_assert!(!entry.question_id.is_empty());
        }

        #[test]
        fn legacy_ids_are_detected(id in legacy_id_strategy()) {
            let entry = MistakeEntry::choice(id, QuestionIdType::Ibn, "A", at(0));
            prop_assert!(entry.has_legacy_id());
        }

        #[test]
        fn mistake_sets_are_distinct(entries in mistake_set_strategy(20)) {
            let ids: BTreeSet<_> = entries.iter().map(|e| e.question_id.clone()).collect();
            prop_assert_eq!(ids.len(), entries.len());
        }
    }
}
