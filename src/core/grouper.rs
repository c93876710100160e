//! Exact-match grouping by fingerprint.
//!
//! Groups come out in the order their fingerprint was first seen, and the
//! identifiers inside a group keep their input order.

use crate::core::fingerprint::Fingerprint;
use serde::Serialize;
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// Two or more identifiers from one collection sharing a fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FingerprintGroup {
    pub fingerprint: Fingerprint,
    pub members: Vec<String>,
}

/// Every identifier on each side that carries the same fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossGroup {
    pub fingerprint: Fingerprint,
    pub left: Vec<String>,
    pub right: Vec<String>,
}

fn bucket<I>(entries: I) -> Vec<(Fingerprint, Vec<String>)>
where
    I: IntoIterator<Item = (String, Fingerprint)>,
{
    let mut index: HashMap<Fingerprint, usize> = HashMap::new();
    let mut buckets: Vec<(Fingerprint, Vec<String>)> = Vec::new();

    for (id, fingerprint) in entries {
        match index.entry(fingerprint) {
            Entry::Occupied(slot) => buckets[*slot.get()].1.push(id),
            Entry::Vacant(slot) => {
                slot.insert(buckets.len());
                buckets.push((fingerprint, vec![id]));
            }
        }
    }

    buckets
}

/// Groups within one collection. Singletons are dropped.
pub fn group_within<I>(entries: I) -> Vec<FingerprintGroup>
where
    I: IntoIterator<Item = (String, Fingerprint)>,
{
    bucket(entries)
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(fingerprint, members)| FingerprintGroup {
            fingerprint,
            members,
        })
        .collect()
}

/// Groups across two collections: a fingerprint present on both sides.
///
/// A group must pair at least two distinct identifiers. When a collection is
/// compared with itself, an image that only matches itself is not grouped.
pub fn group_across<L, R>(left: L, right: R) -> Vec<CrossGroup>
where
    L: IntoIterator<Item = (String, Fingerprint)>,
    R: IntoIterator<Item = (String, Fingerprint)>,
{
    let mut right: HashMap<Fingerprint, Vec<String>> = bucket(right).into_iter().collect();

    bucket(left)
        .into_iter()
        .filter_map(|(fingerprint, left)| {
            let right = right.remove(&fingerprint)?;
            let distinct = left.iter().any(|l| right.iter().any(|r| r != l));
            distinct.then_some(CrossGroup {
                fingerprint,
                left,
                right,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(items: &[(&str, u64)]) -> Vec<(String, Fingerprint)> {
        items
            .iter()
            .map(|(id, fp)| (id.to_string(), Fingerprint(*fp)))
            .collect()
    }

    #[test]
    fn test_within_drops_singletons() {
        let groups = group_within(entries(&[("a", 1), ("b", 2), ("c", 1)]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].fingerprint, Fingerprint(1));
        assert_eq!(groups[0].members, vec!["a", "c"]);
    }

    #[test]
    fn test_within_first_seen_order() {
        let groups = group_within(entries(&[
            ("x1", 9),
            ("y1", 3),
            ("y2", 3),
            ("x2", 9),
            ("x3", 9),
        ]));
        let keys: Vec<_> = groups.iter().map(|g| g.fingerprint).collect();
        assert_eq!(keys, vec![Fingerprint(9), Fingerprint(3)]);
        assert_eq!(groups[0].members, vec!["x1", "x2", "x3"]);
    }

    #[test]
    fn test_groups_only_hold_matching_fingerprints() {
        let input = entries(&[("a", 1), ("b", 2), ("c", 1), ("d", 2), ("e", 3)]);
        let lookup: HashMap<String, Fingerprint> = input.iter().cloned().collect();
        for group in group_within(input) {
            for member in &group.members {
                assert_eq!(lookup[member], group.fingerprint);
            }
        }
    }

    #[test]
    fn test_across_reports_all_members_on_both_sides() {
        let left = entries(&[("l1", 5), ("l2", 7), ("l3", 5)]);
        let right = entries(&[("r1", 5), ("r2", 8), ("r3", 5), ("r4", 5)]);

        let groups = group_across(left, right);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].fingerprint, Fingerprint(5));
        assert_eq!(groups[0].left, vec!["l1", "l3"]);
        assert_eq!(groups[0].right, vec!["r1", "r3", "r4"]);
    }

    #[test]
    fn test_across_single_member_each_side() {
        let groups = group_across(entries(&[("l", 4)]), entries(&[("r", 4)]));
        assert_eq!(
            groups,
            vec![CrossGroup {
                fingerprint: Fingerprint(4),
                left: vec!["l".to_string()],
                right: vec!["r".to_string()],
            }]
        );
    }

    #[test]
    fn test_across_never_groups_an_id_with_itself() {
        let groups = group_across(entries(&[("only", 3)]), entries(&[("only", 3)]));
        assert!(groups.is_empty());

        let side = entries(&[("a", 1), ("b", 1), ("c", 2)]);
        let groups = group_across(side.clone(), side);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].fingerprint, Fingerprint(1));
        assert_eq!(groups[0].left, vec!["a", "b"]);
        assert_eq!(groups[0].right, vec!["a", "b"]);
    }

    #[test]
    fn test_across_shared_id_with_another_match_is_kept() {
        let groups = group_across(entries(&[("x", 6)]), entries(&[("x", 6), ("y", 6)]));
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].right, vec!["x", "y"]);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(group_within(entries(&[])).is_empty());
        assert!(group_across(entries(&[]), entries(&[("r", 1)])).is_empty());
        assert!(group_across(entries(&[("l", 1)]), entries(&[])).is_empty());
    }
}
