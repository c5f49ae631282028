///! Property-based tests for key derivation and interval sets
use kuba_federation::cache::MetadataCacheKey;
use kuba_federation::types::{Interval, IntervalSet, Query};
use proptest::prelude::*;
use std::time::Duration;

fn granularity() -> impl Strategy<Value = u64> {
    1u64..3600
}

mod cache_key_props {
    use super::*;

    proptest! {
        /// Times in the same bucket share a key
        #[test]
        fn same_bucket_same_key(
            g in granularity(),
            bucket in -1_000_000i64..1_000_000,
            a in 0u64..3600,
            b in 0u64..3600,
        ) {
            let g_i = g as i64;
            let start_a = bucket * g_i + (a % g) as i64;
            let start_b = bucket * g_i + (b % g) as i64;
            let granularity = Duration::from_secs(g);

            let key_a = MetadataCacheKey::new("h:80", &Query::new("a.*").with_start(start_a), granularity);
            let key_b = MetadataCacheKey::new("h:80", &Query::new("a.*").with_start(start_b), granularity);

            prop_assert_eq!(key_a, key_b);
        }

        /// Adjacent buckets never share a key
        #[test]
        fn next_bucket_new_key(
            g in granularity(),
            t in -1_000_000_000i64..1_000_000_000,
        ) {
            let granularity = Duration::from_secs(g);
            let key_a = MetadataCacheKey::new("h:80", &Query::new("a.*").with_end(t), granularity);
            let key_b = MetadataCacheKey::new("h:80", &Query::new("a.*").with_end(t + g as i64), granularity);

            prop_assert_ne!(key_a, key_b);
        }

        /// Buckets round down, also for negative times
        #[test]
        fn bucket_is_floor_multiple(
            g in granularity(),
            t in -1_000_000_000i64..1_000_000_000,
        ) {
            let key = MetadataCacheKey::new("h:80", &Query::new("p").with_start(t), Duration::from_secs(g));
            let start: i64 = key
                .as_str()
                .trim_start_matches("find:h:80:p:")
                .trim_end_matches(':')
                .parse()
                .unwrap();

            prop_assert_eq!(start.rem_euclid(g as i64), 0);
            prop_assert!(start <= t);
            prop_assert!(t - start < g as i64);
        }
    }
}

mod interval_set_props {
    use super::*;

    fn intervals() -> impl Strategy<Value = Vec<(f64, f64)>> {
        prop::collection::vec((0u32..10_000, 0u32..500), 0..50).prop_map(|raw| {
            raw.into_iter()
                .map(|(start, len)| (start as f64, (start + len) as f64))
                .collect()
        })
    }

    proptest! {
        /// Normalized sets are sorted and disjoint
        #[test]
        fn normalized_is_sorted_and_disjoint(pairs in intervals()) {
            let set = IntervalSet::from_pairs(&pairs).unwrap();
            let normalized = set.to_pairs();

            for window in normalized.windows(2) {
                prop_assert!(window[0].1 < window[1].0, "{:?}", normalized);
            }
        }

        /// Merging never changes which timestamps are covered
        #[test]
        fn contains_matches_inputs(pairs in intervals(), t in 0u32..11_000) {
            let set = IntervalSet::from_pairs(&pairs).unwrap();
            let t = t as f64;
            let expected = pairs.iter().any(|&(s, e)| Interval::new(s, e).unwrap().contains(t));

            prop_assert_eq!(set.contains(t), expected);
        }
    }
}
