//! Theme naming from cluster keywords.
//!
//! Each non-empty cluster's top TF-IDF keywords are handed to the long-form generator,
//! which answers with a short label. A call that fails, times out or returns nothing
//! degrades to a label built from the keywords themselves.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, Semaphore};
use tracing::{debug, info, warn};

use crate::config::{GenerationConfig, NamingConfig};
use crate::error::{Result, ThemeError};
use crate::generation::{TextGenerator, generate_with_retry};
use crate::partition::ClusterAssignment;
use crate::tfidf::TfIdfMatrix;

/// Build the labelling prompt for a ranked keyword list.
pub fn label_prompt(keywords: &[String]) -> String {
    format!(
        "You are a business analyst. Based on the following {} keywords extracted from \
         employee suggested ideas, generate one short, descriptive theme name (3-5 words max) \
         that captures the central idea of the cluster.\n\nKeywords:\n{}\n\nTheme:",
        keywords.len(),
        keywords.join(", ")
    )
}

/// Deterministic label used when the generator gives no usable answer.
///
/// The first `count` keywords title-cased and joined with `" / "`, or `"Theme {n}"`
/// (1-based cluster number) when the cluster has no keywords.
pub fn fallback_label(cluster: usize, keywords: &[String], count: usize) -> String {
    if keywords.is_empty() {
        return format!("Theme {}", cluster + 1);
    }
    keywords.iter().take(count).map(|k| title_case(k)).collect::<Vec<_>>().join(" / ")
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// The label chosen for one cluster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterLabel {
    /// Cluster index.
    pub cluster: usize,
    /// Resolved label.
    pub label: String,
    /// Ranked keywords the label was derived from.
    pub keywords: Vec<String>,
    /// Whether the label is the keyword fallback.
    pub fallback: bool,
}

/// Names clusters through a [`TextGenerator`].
pub struct ThemeNamer {
    generator: Arc<dyn TextGenerator>,
    naming: NamingConfig,
    generation: GenerationConfig,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    memo: Mutex<HashMap<Vec<String>, String>>,
}

impl ThemeNamer {
    /// Create a namer. `permits` bounds long-form calls shared with other stages.
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        naming: NamingConfig,
        generation: GenerationConfig,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            generator,
            naming,
            generation,
            permits,
            max_concurrent: 1,
            memo: Mutex::new(HashMap::new()),
        }
    }

    /// Name up to `max_concurrent` clusters at the same time.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Label every non-empty cluster of `assignment`, in cluster order.
    ///
    /// `matrix` rows must be in the same record order as `assignment`.
    pub async fn name_clusters(
        &self,
        matrix: &TfIdfMatrix,
        assignment: &ClusterAssignment,
    ) -> Vec<ClusterLabel> {
        let clusters: Vec<(usize, Vec<String>)> = (0..assignment.k())
            .filter_map(|cluster| {
                let members = assignment.members(cluster);
                if members.is_empty() {
                    debug!(cluster, "skipping empty cluster");
                    return None;
                }
                let keywords = matrix
                    .top_terms(&members, self.naming.top_keywords)
                    .into_iter()
                    .map(|(term, _)| term)
                    .collect();
                Some((cluster, keywords))
            })
            .collect();

        let labels: Vec<ClusterLabel> = stream::iter(clusters)
            .map(|(cluster, keywords)| self.name_cluster(cluster, keywords))
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let fallbacks = labels.iter().filter(|l| l.fallback).count();
        info!(clusters = labels.len(), fallbacks, "named clusters");
        labels
    }

    /// Label a single cluster from its ranked keywords.
    pub async fn name_cluster(&self, cluster: usize, keywords: Vec<String>) -> ClusterLabel {
        if keywords.is_empty() {
            let label = fallback_label(cluster, &keywords, self.naming.fallback_keywords);
            warn!(cluster, label = %label, "cluster has no keywords, using fallback label");
            return ClusterLabel { cluster, label, keywords, fallback: true };
        }

        if self.naming.memoize_labels {
            if let Some(label) = self.memo.lock().await.get(&keywords) {
                debug!(cluster, label = %label, "reusing memoized label");
                return ClusterLabel { cluster, label: label.clone(), keywords, fallback: false };
            }
        }

        match self.generate_label(cluster, &keywords).await {
            Ok(label) => {
                let label = if self.naming.memoize_labels {
                    // First label stored for a keyword list wins.
                    self.memo.lock().await.entry(keywords.clone()).or_insert(label).clone()
                } else {
                    label
                };
                debug!(cluster, label = %label, "named cluster");
                ClusterLabel { cluster, label, keywords, fallback: false }
            }
            Err(e) => {
                let label = fallback_label(cluster, &keywords, self.naming.fallback_keywords);
                warn!(cluster, error = %e, label = %label, "naming failed, using fallback label");
                ClusterLabel { cluster, label, keywords, fallback: true }
            }
        }
    }

    async fn generate_label(&self, cluster: usize, keywords: &[String]) -> Result<String> {
        let prompt = label_prompt(keywords);
        let raw = generate_with_retry(
            self.generator.as_ref(),
            &prompt,
            self.generation.timeout(),
            &self.generation.retry,
            Some(&self.permits),
        )
        .await?;

        let label = raw.trim();
        if label.is_empty() {
            return Err(ThemeError::EmptyThemeLabel { cluster });
        }
        Ok(label.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::config::RetryPolicy;

    struct Counting {
        reply: &'static str,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for Counting {
        async fn generate(&self, prompt: &str) -> Result<String> {
            assert!(prompt.contains("Keywords:"));
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} {n}", self.reply))
        }

        fn model(&self) -> &str {
            "counting"
        }
    }

    fn namer(generator: Arc<dyn TextGenerator>, memoize: bool) -> ThemeNamer {
        let naming = NamingConfig { memoize_labels: memoize, ..NamingConfig::default() };
        let generation =
            GenerationConfig { retry: RetryPolicy::none(), ..GenerationConfig::default() };
        ThemeNamer::new(generator, naming, generation, Arc::new(Semaphore::new(1)))
    }

    fn words(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fallback_title_cases_top_three_keywords() {
        let keywords = words(&["parking", "shuttle", "bus", "station"]);
        assert_eq!(fallback_label(0, &keywords, 3), "Parking / Shuttle / Bus");
        assert_eq!(fallback_label(4, &[], 3), "Theme 5");
    }

    #[test]
    fn prompt_lists_keywords() {
        let prompt = label_prompt(&words(&["coffee", "kitchen"]));
        assert!(prompt.contains("following 2 keywords"));
        assert!(prompt.contains("coffee, kitchen"));
        assert!(prompt.ends_with("Theme:"));
    }

    #[tokio::test]
    async fn identical_keywords_reuse_the_memoized_label() {
        let generator = Arc::new(Counting { reply: "Parking", calls: AtomicUsize::new(0) });
        let namer = namer(generator.clone(), true);
        let a = namer.name_cluster(0, words(&["parking", "lot"])).await;
        let b = namer.name_cluster(1, words(&["parking", "lot"])).await;
        assert_eq!(a.label, b.label);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn memo_can_be_disabled() {
        let generator = Arc::new(Counting { reply: "Parking", calls: AtomicUsize::new(0) });
        let namer = namer(generator.clone(), false);
        let a = namer.name_cluster(0, words(&["parking"])).await;
        let b = namer.name_cluster(1, words(&["parking"])).await;
        assert_ne!(a.label, b.label);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    struct Blank;

    #[async_trait]
    impl TextGenerator for Blank {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("   ".into())
        }

        fn model(&self) -> &str {
            "blank"
        }
    }

    struct Verbose;

    #[async_trait]
    impl TextGenerator for Verbose {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("  \"Parking & Commute\"\nThese ideas cover parking.  ".into())
        }

        fn model(&self) -> &str {
            "verbose"
        }
    }

    #[tokio::test]
    async fn reply_is_trimmed_and_used_verbatim() {
        let namer = namer(Arc::new(Verbose), true);
        let label = namer.name_cluster(0, words(&["parking", "commute"])).await;
        assert!(!label.fallback);
        assert_eq!(label.label, "\"Parking & Commute\"\nThese ideas cover parking.");
    }

    #[tokio::test]
    async fn empty_generator_output_falls_back_to_keywords() {
        let namer = namer(Arc::new(Blank), true);
        let label = namer.name_cluster(2, words(&["gym", "hours", "showers", "lockers"])).await;
        assert!(label.fallback);
        assert_eq!(label.label, "Gym / Hours / Showers");
    }

    #[tokio::test]
    async fn empty_clusters_are_not_named() {
        let docs = ["parking shuttle", "parking permits", "coffee machine"];
        let matrix = TfIdfMatrix::fit(&docs, 100);
        let ids = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let assignment = ClusterAssignment::new(3, ids, vec![0, 0, 2]).unwrap();
        let generator = Arc::new(Counting { reply: "Label", calls: AtomicUsize::new(0) });
        let namer = namer(generator, true).with_max_concurrent(2);
        let labels = namer.name_clusters(&matrix, &assignment).await;
        assert_eq!(labels.iter().map(|l| l.cluster).collect::<Vec<_>>(), vec![0, 2]);
        assert_eq!(labels[0].keywords[0], "parking");
    }
}
