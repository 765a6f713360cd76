//! Checkpoint filtering of listings

use chrono::{DateTime, Utc};
use harvest_core::Entry;

/// Entries committed strictly after `cutoff`, in their original order
pub fn since(entries: &[Entry], cutoff: DateTime<Utc>) -> Vec<Entry> {
    entries
        .iter()
        .filter(|e| e.commit.date > cutoff)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use harvest_core::{Commit, NodeKind};
    use proptest::prelude::*;

    fn entry(name: &str, date: DateTime<Utc>) -> Entry {
        Entry {
            kind: NodeKind::File,
            name: name.to_string(),
            size: None,
            commit: Commit {
                revision: "1".to_string(),
                author: "alice".to_string(),
                date,
            },
        }
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_since_is_strict() {
        let t = base();
        let entries = vec![
            entry("older", t - Duration::seconds(1)),
            entry("equal", t),
            entry("newer", t + Duration::seconds(1)),
        ];

        let names: Vec<_> = since(&entries, t).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["newer"]);
    }

    #[test]
    fn test_since_keeps_order_and_source() {
        let t = base();
        let entries = vec![
            entry("c", t + Duration::hours(3)),
            entry("a", t + Duration::hours(1)),
            entry("old", t - Duration::hours(1)),
            entry("b", t + Duration::hours(2)),
        ];
        let before = entries.clone();

        let names: Vec<_> = since(&entries, t).into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["c", "a", "b"]);
        assert_eq!(entries, before);
    }

    #[test]
    fn test_since_empty() {
        assert!(since(&[], base()).is_empty());
        assert!(since(&[entry("old", base())], base() + Duration::days(1)).is_empty());
    }

    proptest! {
        #[test]
        fn prop_since_selects_exactly_newer(
            offsets in prop::collection::vec(-1000i64..1000, 0..40),
            cutoff in -1000i64..1000,
        ) {
            let t = base();
            let entries: Vec<Entry> = offsets
                .iter()
                .enumerate()
                .map(|(i, off)| entry(&i.to_string(), t + Duration::seconds(*off)))
                .collect();
            let cutoff = t + Duration::seconds(cutoff);

            let result = since(&entries, cutoff);

            prop_assert!(result.len() <= entries.len());

            let kept: Vec<usize> = result.iter().map(|e| e.name.parse().unwrap()).collect();
            prop_assert!(kept.windows(2).all(|w| w[0] < w[1]));
            for (i, e) in entries.iter().enumerate() {
                prop_assert_eq!(kept.contains(&i), e.commit.date > cutoff);
            }
            prop_assert_eq!(since(&result, cutoff), result.clone());
        }
    }
}
