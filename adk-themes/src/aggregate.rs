//! Grouping of records into themes by resolved label.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::LabelCollision;
use crate::error::{Result, ThemeError};
use crate::naming::ClusterLabel;
use crate::partition::ClusterAssignment;
use crate::record::IdeaRecord;

/// A group of records sharing one label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    /// Human-readable label.
    pub label: String,
    /// Member record ids, in record order.
    pub member_ids: Vec<String>,
    /// Number of members.
    pub frequency: usize,
    /// Sum of member votes.
    pub total_votes: u64,
    /// Sum of member comment counts.
    pub total_comments: u64,
    /// Member texts, in record order.
    pub texts: Vec<String>,
    /// Clusters that resolved to this label, ascending.
    pub clusters: Vec<usize>,
    /// Narrative summary, set by the summarizer.
    pub summary: Option<String>,
}

impl Theme {
    fn new(label: String) -> Self {
        Self {
            label,
            member_ids: Vec::new(),
            frequency: 0,
            total_votes: 0,
            total_comments: 0,
            texts: Vec::new(),
            clusters: Vec::new(),
            summary: None,
        }
    }

    fn push(&mut self, record: &IdeaRecord, cluster: usize) {
        self.member_ids.push(record.id.clone());
        self.texts.push(record.text.clone());
        self.frequency += 1;
        self.total_votes += record.votes;
        self.total_comments += record.comment_count;
        if !self.clusters.contains(&cluster) {
            self.clusters.push(cluster);
            self.clusters.sort_unstable();
        }
    }
}

/// A record with the cluster and theme it was assigned to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedRecord {
    /// The source record.
    #[serde(flatten)]
    pub record: IdeaRecord,
    /// Cluster index.
    pub cluster: usize,
    /// Resolved theme label.
    pub theme: String,
}

/// Themes and the annotated record set they were built from.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Aggregation {
    /// One theme per distinct label, sorted by label.
    pub themes: Vec<Theme>,
    /// Every record with its cluster and theme, in record order.
    pub records: Vec<AnnotatedRecord>,
}

/// Map each labelled cluster to its final label under `policy`.
///
/// With [`LabelCollision::Merge`] labels are kept as-is, so identical labels share a theme.
/// With [`LabelCollision::Disambiguate`] the lowest cluster keeps the label and later
/// clusters get `" (2)"`, `" (3)"`, ... appended.
pub fn resolve_labels(labels: &[ClusterLabel], policy: LabelCollision) -> HashMap<usize, String> {
    let mut ordered: Vec<&ClusterLabel> = labels.iter().collect();
    ordered.sort_by_key(|l| l.cluster);

    match policy {
        LabelCollision::Merge => {
            ordered.into_iter().map(|l| (l.cluster, l.label.clone())).collect()
        }
        LabelCollision::Disambiguate => {
            let mut taken: HashSet<String> = HashSet::new();
            let mut resolved = HashMap::with_capacity(ordered.len());
            for l in ordered {
                let mut label = l.label.clone();
                let mut n = 2;
                while taken.contains(&label) {
                    label = format!("{} ({n})", l.label);
                    n += 1;
                }
                if label != l.label {
                    debug!(cluster = l.cluster, label = %label, "disambiguated duplicate label");
                }
                taken.insert(label.clone());
                resolved.insert(l.cluster, label);
            }
            resolved
        }
    }
}

/// Group `records` into themes.
///
/// `assignment` must be in record order and `labels` must cover every non-empty cluster.
///
/// # Errors
///
/// Returns [`ThemeError::Config`] if the assignment does not match the records (length or
/// record ids) or a record's cluster has no label.
pub fn aggregate(
    records: &[IdeaRecord],
    assignment: &ClusterAssignment,
    labels: &HashMap<usize, String>,
) -> Result<Aggregation> {
    if records.len() != assignment.len() {
        return Err(ThemeError::Config(format!(
            "{} records but {} cluster assignments",
            records.len(),
            assignment.len()
        )));
    }

    let mut themes: BTreeMap<&str, Theme> = BTreeMap::new();
    let mut annotated = Vec::with_capacity(records.len());

    for (record, (id, cluster)) in records.iter().zip(assignment.iter()) {
        if record.id != id {
            return Err(ThemeError::Config(format!(
                "record '{}' is assigned under id '{id}'",
                record.id
            )));
        }
        let label = labels.get(&cluster).ok_or_else(|| {
            ThemeError::Config(format!("cluster {cluster} of record '{}' has no label", record.id))
        })?;
        themes.entry(label).or_insert_with(|| Theme::new(label.clone())).push(record, cluster);
        annotated.push(AnnotatedRecord { record: record.clone(), cluster, theme: label.clone() });
    }

    let themes: Vec<Theme> = themes.into_values().collect();
    info!(themes = themes.len(), records = annotated.len(), "aggregated themes");
    Ok(Aggregation { themes, records: annotated })
}
