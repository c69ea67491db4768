//! Overlap conflict detection
//!
//! Provides the [`ConflictStrategy`] trait for pluggable detection of suggested
//! edits that touch the same characters of the same clause.
//!
//! Only edits sharing a `clause_id` are ever compared. A conflict is recorded
//! on both sides, so `a.conflicts_with` contains `b` exactly when
//! `b.conflicts_with` contains `a`.

use crate::edit::{CharRange, SuggestedEdit};
use std::collections::{BTreeMap, BTreeSet};

/// Conflict detection strategy
///
/// Implementations return index pairs `(i, j)` with `i < j` into the slice
/// they were given, sorted and without duplicates. Strategies must agree on
/// the set of pairs for identical input.
pub trait ConflictStrategy: Send + Sync + std::fmt::Debug {
    /// Find all conflicting index pairs
    fn find_conflicts(&self, edits: &[SuggestedEdit]) -> Vec<(usize, usize)>;

    /// Strategy name (for debugging/serialization)
    fn name(&self) -> &'static str;
}

/// Outcome of a resolution pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConflictReport {
    /// Distinct conflicting pairs found
    pub conflicting_pairs: usize,
    /// Edits with a non-empty `conflicts_with` afterwards
    pub edits_with_conflicts: usize,
}

/// Group edit indices by clause, keeping input order inside each group
fn group_by_clause(edits: &[SuggestedEdit]) -> BTreeMap<&str, Vec<usize>> {
    let mut groups: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, edit) in edits.iter().enumerate() {
        groups.entry(edit.clause_id.as_str()).or_default().push(idx);
    }
    groups
}

/// Compare every pair of edits within a clause
///
/// Quadratic in the size of each clause group. Clause groups are small in
/// practice, so this is the default.
#[derive(Debug, Clone, Copy, Default)]
pub struct PairwiseResolver;

impl ConflictStrategy for PairwiseResolver {
    fn find_conflicts(&self, edits: &[SuggestedEdit]) -> Vec<(usize, usize)> {
        let mut pairs = Vec::new();
        for group in group_by_clause(edits).values() {
            let ranges: Vec<Vec<CharRange>> =
                group.iter().map(|&i| edits[i].affected_ranges()).collect();
            for a in 0..group.len() {
                for b in (a + 1)..group.len() {
                    let hit = ranges[a]
                        .iter()
                        .any(|ra| ranges[b].iter().any(|rb| ra.overlaps(rb)));
                    if hit {
                        pairs.push((group[a].min(group[b]), group[a].max(group[b])));
                    }
                }
            }
        }
        pairs.sort_unstable();
        pairs.dedup();
        pairs
    }

    fn name(&self) -> &'static str {
        "pairwise"
    }
}

/// Sort ranges by start and sweep an active set
///
/// A range leaves the active set once a later range starts at or after its
/// end; any range still active when another starts is tested for overlap.
#[derive(Debug, Clone, Copy, Default)]
pub struct SweepResolver;

impl ConflictStrategy for SweepResolver {
    fn find_conflicts(&self, edits: &[SuggestedEdit]) -> Vec<(usize, usize)> {
        let mut pairs = BTreeSet::new();
        for group in group_by_clause(edits).values() {
            let mut events: Vec<(CharRange, usize)> = group
                .iter()
                .flat_map(|&i| edits[i].affected_ranges().into_iter().map(move |r| (r, i)))
                .collect();
            events.sort_unstable();

            let mut active: Vec<(CharRange, usize)> = Vec::new();
            for (range, owner) in events {
                active.retain(|(r, _)| r.end > range.start);
                for (r, other) in &active {
                    if *other != owner && r.overlaps(&range) {
                        pairs.insert((owner.min(*other), owner.max(*other)));
                    }
                }
                active.push((range, owner));
            }
        }
        pairs.into_iter().collect()
    }

    fn name(&self) -> &'static str {
        "sweep"
    }
}

/// Detect conflicts and record them on both edits of each pair
///
/// Existing `conflicts_with` entries are kept; new ones are appended without
/// duplicates.
pub fn resolve_conflicts<S>(strategy: &S, edits: &mut [SuggestedEdit]) -> ConflictReport
where
    S: ConflictStrategy + ?Sized,
{
    let pairs = strategy.find_conflicts(edits);
    for &(i, j) in &pairs {
        let (left, right) = edits.split_at_mut(j);
        let (a, b) = (&mut left[i], &mut right[0]);
        a.mark_conflict(&b.edit_id);
        b.mark_conflict(&a.edit_id);
    }

    let report = ConflictReport {
        conflicting_pairs: pairs.len(),
        edits_with_conflicts: conflict_count(edits),
    };
    tracing::debug!(
        strategy = strategy.name(),
        edits = edits.len(),
        pairs = report.conflicting_pairs,
        "Resolved edit conflicts"
    );
    report
}

/// Number of edits carrying at least one conflict
#[inline]
#[must_use]
pub fn conflict_count(edits: &[SuggestedEdit]) -> usize {
    edits.iter().filter(|e| e.has_conflicts()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::EditId;

    fn del(id: &str, clause: &str, start: usize, end: usize) -> SuggestedEdit {
        SuggestedEdit::new(clause, "f").with_id(id).with_deletion(start, end, "")
    }

    #[test]
    fn overlapping_deletions_conflict_both_ways() {
        let mut edits = vec![del("a", "c1", 0, 10), del("b", "c1", 5, 15)];
        let report = resolve_conflicts(&PairwiseResolver, &mut edits);

        assert_eq!(report.conflicting_pairs, 1);
        assert_eq!(report.edits_with_conflicts, 2);
        assert_eq!(edits[0].conflicts_with, vec![EditId::from("b")]);
        assert_eq!(edits[1].conflicts_with, vec![EditId::from("a")]);
    }

    #[test]
    fn deletion_and_distant_insertion_do_not_conflict() {
        let mut edits = vec![
            del("a", "c1", 0, 5),
            SuggestedEdit::new("c1", "f").with_id("b").with_insertion(10, "x"),
        ];
        resolve_conflicts(&PairwiseResolver, &mut edits);
        assert!(edits.iter().all(|e| e.conflicts_with.is_empty()));
    }

    #[test]
    fn one_char_gap_is_not_a_conflict() {
        let mut edits = vec![del("a", "c1", 0, 5), del("b", "c1", 6, 10)];
        assert_eq!(resolve_conflicts(&SweepResolver, &mut edits).conflicting_pairs, 0);
    }

    #[test]
    fn different_clauses_never_conflict() {
        let mut edits = vec![del("a", "c1", 0, 10), del("b", "c2", 0, 10)];
        assert_eq!(resolve_conflicts(&PairwiseResolver, &mut edits).conflicting_pairs, 0);
        assert_eq!(conflict_count(&edits), 0);
    }

    #[test]
    fn insertion_at_deletion_start_conflicts() {
        let mut edits = vec![
            del("a", "c1", 4, 8),
            SuggestedEdit::new("c1", "f").with_id("b").with_insertion(4, "x"),
        ];
        assert_eq!(resolve_conflicts(&SweepResolver, &mut edits).conflicting_pairs, 1);
    }

    #[test]
    fn insertions_at_max_position_from_json_conflict() {
        let raw = format!(
            r#"[
                {{"edit_id": "a", "finding_id": "f", "clause_id": "c1",
                  "insertions": [{{"position": {max}, "inserted_text": "x"}}]}},
                {{"edit_id": "b", "finding_id": "g", "clause_id": "c1",
                  "insertions": [{{"position": {max}, "inserted_text": "y"}}]}}
            ]"#,
            max = usize::MAX
        );
        let parsed: Vec<SuggestedEdit> = serde_json::from_str(&raw).unwrap();

        let strategies: [&dyn ConflictStrategy; 2] = [&PairwiseResolver, &SweepResolver];
        for strategy in strategies {
            let mut edits = parsed.clone();
            let report = resolve_conflicts(strategy, &mut edits);
            assert_eq!(report.conflicting_pairs, 1, "{}", strategy.name());
            assert_eq!(edits[0].conflicts_with, vec![EditId::from("b")]);
        }
    }

    #[test]
    fn multi_range_edit_counts_pair_once() {
        let a = SuggestedEdit::new("c1", "f")
            .with_id("a")
            .with_deletion(0, 5, "")
            .with_deletion(10, 15, "");
        let b = SuggestedEdit::new("c1", "f")
            .with_id("b")
            .with_deletion(3, 12, "");
        let mut edits = vec![a, b];

        let strategies: [&dyn ConflictStrategy; 2] = [&PairwiseResolver, &SweepResolver];
        for strategy in strategies {
            assert_eq!(strategy.find_conflicts(&edits), vec![(0, 1)]);
        }
        resolve_conflicts(&PairwiseResolver, &mut edits);
        resolve_conflicts(&SweepResolver, &mut edits);
        assert_eq!(edits[0].conflicts_with.len(), 1);
    }

    #[test]
    fn chain_conflicts_are_not_transitive() {
        let mut edits = vec![
            del("a", "c1", 0, 5),
            del("b", "c1", 4, 9),
            del("c", "c1", 8, 12),
        ];
        resolve_conflicts(&PairwiseResolver, &mut edits);
        assert_eq!(edits[0].conflicts_with, vec![EditId::from("b")]);
        assert_eq!(
            edits[1].conflicts_with,
            vec![EditId::from("a"), EditId::from("c")]
        );
        assert_eq!(edits[2].conflicts_with, vec![EditId::from("b")]);
    }

    #[test]
    fn empty_batch() {
        let mut edits: Vec<SuggestedEdit> = Vec::new();
        assert_eq!(
            resolve_conflicts(&PairwiseResolver, &mut edits),
            ConflictReport::default()
        );
    }
}
