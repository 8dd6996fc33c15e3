//! Property tests for partitioning, aggregation and report ordering.

use std::collections::{HashMap, HashSet};

use adk_themes::aggregate::aggregate;
use adk_themes::report::compare_rows;
use adk_themes::{ClusteringConfig, IdeaRecord, Partitioner, ThemeRow};
use proptest::prelude::*;

fn arb_embeddings(max_n: usize) -> impl Strategy<Value = Vec<Vec<f32>>> {
    proptest::collection::vec(proptest::collection::vec(-10.0f32..10.0f32, 3), 1..max_n)
}

fn config() -> ClusteringConfig {
    ClusteringConfig { n_init: 2, max_iterations: 50, ..ClusteringConfig::default() }
}

/// **Property: every record lands in exactly one cluster**
/// *For any* embeddings and any k in `1..=n`, the member sets of the clusters are disjoint,
/// cover every record, and every label is below k.
mod prop_partition_covers_records {
    use super::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn members_are_disjoint_and_complete(
            (embeddings, k) in arb_embeddings(25).prop_flat_map(|e| {
                let n = e.len();
                (Just(e), 1..=n)
            }),
        ) {
            let n = embeddings.len();
            let ids: Vec<String> = (0..n).map(|i| format!("idea-{i}")).collect();
            let assignment = Partitioner::new(config())
                .partition_embeddings(&ids, &embeddings, k)
                .unwrap();

            prop_assert_eq!(assignment.len(), n);
            prop_assert!(assignment.labels().iter().all(|&l| l < k));

            let mut seen = HashSet::new();
            for cluster in 0..k {
                for position in assignment.members(cluster) {
                    prop_assert!(seen.insert(position));
                }
            }
            prop_assert_eq!(seen.len(), n);
        }

        #[test]
        fn identical_seed_reproduces_labels(embeddings in arb_embeddings(20)) {
            let ids: Vec<String> = (0..embeddings.len()).map(|i| i.to_string()).collect();
            let k = embeddings.len().min(3);
            let partitioner = Partitioner::new(config());
            let a = partitioner.partition_embeddings(&ids, &embeddings, k).unwrap();
            let b = partitioner.partition_embeddings(&ids, &embeddings, k).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}

/// **Property: aggregation preserves counts and engagement**
/// *For any* records and cluster labels, theme frequencies equal their member counts and sum
/// to the record count, and vote and comment totals are preserved.
mod prop_aggregation_sums {
    use super::*;
    use adk_themes::ClusterAssignment;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn totals_match_members(
            rows in proptest::collection::vec((0usize..4, 0u64..1000, 0u64..100), 1..40),
        ) {
            let records: Vec<IdeaRecord> = rows
                .iter()
                .enumerate()
                .map(|(i, &(_, votes, comments))| {
                    IdeaRecord::new(i.to_string(), format!("idea {i}"), votes, comments)
                })
                .collect();
            let ids = records.iter().map(|r| r.id.clone()).collect();
            let clusters: Vec<usize> = rows.iter().map(|&(c, _, _)| c).collect();
            let assignment = ClusterAssignment::new(4, ids, clusters).unwrap();
            // Clusters 1 and 3 share a label and merge.
            let labels: HashMap<usize, String> = [(0, "A"), (1, "B"), (2, "C"), (3, "B")]
                .into_iter()
                .map(|(c, l)| (c, l.to_string()))
                .collect();

            let out = aggregate(&records, &assignment, &labels).unwrap();

            let total: usize = out.themes.iter().map(|t| t.frequency).sum();
            prop_assert_eq!(total, records.len());
            for theme in &out.themes {
                prop_assert_eq!(theme.frequency, theme.member_ids.len());
                prop_assert_eq!(theme.texts.len(), theme.member_ids.len());
            }
            let votes: u64 = out.themes.iter().map(|t| t.total_votes).sum();
            prop_assert_eq!(votes, records.iter().map(|r| r.votes).sum::<u64>());
            let comments: u64 = out.themes.iter().map(|t| t.total_comments).sum();
            prop_assert_eq!(comments, records.iter().map(|r| r.comment_count).sum::<u64>());
            prop_assert!(out.themes.windows(2).all(|w| w[0].label < w[1].label));
        }
    }
}

/// **Property: report ordering is total and idempotent**
/// *For any* theme rows, sorting yields frequency descending with ties by label ascending,
/// and sorting a sorted table changes nothing.
mod prop_report_ordering {
    use super::*;

    fn arb_row() -> impl Strategy<Value = ThemeRow> {
        ("[A-Z][a-z]{2,8}", 1usize..20).prop_map(|(theme, frequency)| ThemeRow {
            theme,
            frequency,
            sum_of_votes: 0,
            sum_of_comments: 0,
            summary: String::new(),
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn sorted_rows_are_ordered_and_stable(rows in proptest::collection::vec(arb_row(), 0..30)) {
            let mut once = rows.clone();
            once.sort_by(compare_rows);
            for w in once.windows(2) {
                prop_assert!(
                    w[0].frequency > w[1].frequency
                        || (w[0].frequency == w[1].frequency && w[0].theme <= w[1].theme)
                );
            }
            let mut twice = once.clone();
            twice.sort_by(compare_rows);
            prop_assert_eq!(once, twice);
        }
    }
}
