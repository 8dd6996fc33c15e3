//! The theme table and the sinks it is emitted to.

use std::cmp::Ordering;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::aggregate::{AnnotatedRecord, Theme};
use crate::error::{Result, ThemeError};
use crate::summarize::SUMMARY_UNAVAILABLE;

/// One line of the theme table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThemeRow {
    /// Theme label.
    pub theme: String,
    /// Number of member records.
    pub frequency: usize,
    /// Sum of member votes.
    pub sum_of_votes: u64,
    /// Sum of member comment counts.
    pub sum_of_comments: u64,
    /// Theme summary.
    pub summary: String,
}

impl From<&Theme> for ThemeRow {
    fn from(theme: &Theme) -> Self {
        Self {
            theme: theme.label.clone(),
            frequency: theme.frequency,
            sum_of_votes: theme.total_votes,
            sum_of_comments: theme.total_comments,
            summary: theme.summary.clone().unwrap_or_else(|| SUMMARY_UNAVAILABLE.to_string()),
        }
    }
}

/// Frequency descending, then label ascending.
pub fn compare_rows(a: &ThemeRow, b: &ThemeRow) -> Ordering {
    b.frequency.cmp(&a.frequency).then_with(|| a.theme.cmp(&b.theme))
}

/// The final output of a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ThemeReport {
    /// Theme table, sorted by [`compare_rows`].
    pub rows: Vec<ThemeRow>,
    /// Every record with its cluster and theme.
    pub records: Vec<AnnotatedRecord>,
}

impl ThemeReport {
    /// Build a report from summarized themes.
    pub fn new(themes: &[Theme], records: Vec<AnnotatedRecord>) -> Self {
        let mut rows: Vec<ThemeRow> = themes.iter().map(ThemeRow::from).collect();
        rows.sort_by(compare_rows);
        Self { rows, records }
    }

    /// Sort the rows in place. Sorting an already sorted table is a no-op.
    pub fn sort(&mut self) {
        self.rows.sort_by(compare_rows);
    }

    /// Whether the report has no themes.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Json`] if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Destination for a finished [`ThemeReport`].
#[async_trait]
pub trait ReportSink: Send + Sync {
    /// Persist or forward the report.
    async fn emit(&self, report: &ThemeReport) -> Result<()>;
}

/// Writes the report as pretty JSON to a file.
#[derive(Debug, Clone)]
pub struct JsonReportSink {
    path: PathBuf,
}

impl JsonReportSink {
    /// Write to `path`, replacing any existing file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ReportSink for JsonReportSink {
    async fn emit(&self, report: &ThemeReport) -> Result<()> {
        let mut sorted = report.clone();
        sorted.sort();
        let mut json = sorted.to_json()?;
        json.push('\n');

        tokio::fs::write(&self.path, json).await.map_err(|e| {
            error!(path = %self.path.display(), error = %e, "failed to write report");
            ThemeError::Report(format!("failed to write '{}': {e}", self.path.display()))
        })?;

        info!(path = %self.path.display(), themes = report.rows.len(), "wrote report");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(theme: &str, frequency: usize) -> ThemeRow {
        ThemeRow {
            theme: theme.into(),
            frequency,
            sum_of_votes: 0,
            sum_of_comments: 0,
            summary: String::new(),
        }
    }

    #[test]
    fn rows_sort_by_frequency_then_label() {
        let mut report = ThemeReport {
            rows: vec![row("Parking", 2), row("Coffee", 5), row("Badges", 2), row("Gym", 7)],
            records: Vec::new(),
        };
        report.sort();
        let order: Vec<&str> = report.rows.iter().map(|r| r.theme.as_str()).collect();
        assert_eq!(order, vec!["Gym", "Coffee", "Badges", "Parking"]);
    }

    #[test]
    fn missing_summary_reads_unavailable() {
        let theme = Theme {
            label: "Parking".into(),
            member_ids: vec!["1".into()],
            frequency: 1,
            total_votes: 4,
            total_comments: 1,
            texts: vec!["More spaces".into()],
            clusters: vec![0],
            summary: None,
        };
        let row = ThemeRow::from(&theme);
        assert_eq!(row.summary, SUMMARY_UNAVAILABLE);
        assert_eq!(row.sum_of_votes, 4);
    }

    #[tokio::test]
    async fn re_emitting_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.json");
        let report = ThemeReport {
            rows: vec![row("Parking", 2), row("Coffee", 2), row("Gym", 3)],
            records: Vec::new(),
        };

        let sink = JsonReportSink::new(&path);
        sink.emit(&report).await.unwrap();
        let first = std::fs::read(&path).unwrap();
        sink.emit(&report).await.unwrap();
        let second = std::fs::read(&path).unwrap();
        assert_eq!(first, second);

        let parsed: ThemeReport = serde_json::from_slice(&first).unwrap();
        assert_eq!(parsed.rows[0].theme, "Gym");
        assert_eq!(parsed.rows[1].theme, "Coffee");
    }
}
