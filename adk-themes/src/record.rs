//! Idea records and the sources they are loaded from.
//!
//! Raw rows use the column names of the ideas export (`Idea Name`, `Description`, `Votes`,
//! `Idea Comments`, `Segment`). They are normalized once into [`IdeaRecord`]s, which are
//! immutable for the rest of the run. Exports are read from CSV, a JSON array or JSON Lines.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, ThemeError};

/// A single idea submission, normalized for clustering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IdeaRecord {
    /// Opaque identifier, unique within a run.
    pub id: String,
    /// Title and description joined as `"{title}: {description}"`.
    pub text: String,
    /// Number of votes.
    pub votes: u64,
    /// Number of comments.
    pub comment_count: u64,
    /// Segment tag, used only as a pre-filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub segment: Option<String>,
}

impl IdeaRecord {
    /// Create a record from already-normalized parts.
    pub fn new(
        id: impl Into<String>,
        text: impl Into<String>,
        votes: u64,
        comment_count: u64,
    ) -> Self {
        Self { id: id.into(), text: text.into(), votes, comment_count, segment: None }
    }

    /// Attach a segment tag.
    pub fn with_segment(mut self, segment: impl Into<String>) -> Self {
        self.segment = Some(segment.into());
        self
    }

    /// Normalize a raw row. `position` becomes the id when the row has none.
    pub fn from_row(position: usize, row: RawIdeaRow) -> Self {
        let name = row.name.filter(|s| !s.trim().is_empty());
        let description = row.description.filter(|s| !s.trim().is_empty());
        let text = match (name, description) {
            (Some(name), Some(description)) => format!("{name}: {description}"),
            (Some(only), None) | (None, Some(only)) => only,
            (None, None) => String::new(),
        };
        let id = row.id.filter(|s| !s.trim().is_empty()).unwrap_or_else(|| position.to_string());
        let segment = row.segment.filter(|s| !s.trim().is_empty());

        Self { id, text, votes: row.votes, comment_count: row.comment_count, segment }
    }
}

/// A row as it appears in the ideas export.
///
/// Counts accept numbers or numeric strings; anything else (including a missing column or
/// an empty CSV cell) counts as zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawIdeaRow {
    /// Row identifier.
    #[serde(default, alias = "ID", alias = "Idea ID", deserialize_with = "lenient_string")]
    pub id: Option<String>,
    /// Idea title.
    #[serde(default, rename = "Idea Name", alias = "Idea", alias = "title")]
    pub name: Option<String>,
    /// Idea body.
    #[serde(default, rename = "Description", alias = "description")]
    pub description: Option<String>,
    /// Vote count.
    #[serde(default, rename = "Votes", alias = "votes", deserialize_with = "lenient_count")]
    pub votes: u64,
    /// Comment count.
    #[serde(
        default,
        rename = "Idea Comments",
        alias = "comment_count",
        alias = "comments",
        deserialize_with = "lenient_count"
    )]
    pub comment_count: u64,
    /// Segment tag.
    #[serde(default, rename = "Segment", alias = "segment", deserialize_with = "lenient_string")]
    pub segment: Option<String>,
}

fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(n)) => n.as_u64().or_else(|| n.as_f64().map(clamp_count)).unwrap_or(0),
        Some(Value::String(s)) => parse_count(&s),
        _ => 0,
    })
}

fn parse_count(raw: &str) -> u64 {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    cleaned
        .parse::<u64>()
        .ok()
        .or_else(|| cleaned.parse::<f64>().ok().map(clamp_count))
        .unwrap_or(0)
}

fn clamp_count(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 { value as u64 } else { 0 }
}

/// Which records take part in a run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SegmentFilter {
    /// Keep every record.
    #[default]
    Any,
    /// Keep records whose segment equals the given tag.
    Equals(String),
    /// Keep records without a segment.
    Missing,
}

impl SegmentFilter {
    /// Whether a record with this segment passes the filter.
    pub fn matches(&self, segment: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Equals(wanted) => segment == Some(wanted.as_str()),
            Self::Missing => segment.is_none_or(|s| s.trim().is_empty()),
        }
    }

    /// Keep the matching records, preserving their order.
    pub fn apply(&self, records: Vec<IdeaRecord>) -> Vec<IdeaRecord> {
        if *self == Self::Any {
            return records;
        }
        let before = records.len();
        let kept: Vec<IdeaRecord> =
            records.into_iter().filter(|r| self.matches(r.segment.as_deref())).collect();
        debug!(filter = ?self, before, after = kept.len(), "applied segment filter");
        kept
    }
}

/// Reject record sets that reuse an id.
///
/// # Errors
///
/// Returns [`ThemeError::RecordSource`] naming the first duplicate id.
pub fn ensure_unique_ids(records: &[IdeaRecord]) -> Result<()> {
    let mut seen = HashSet::with_capacity(records.len());
    for record in records {
        if !seen.insert(record.id.as_str()) {
            return Err(ThemeError::RecordSource(format!("duplicate record id '{}'", record.id)));
        }
    }
    Ok(())
}

/// A source of idea records.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Load every record, in source order.
    async fn load(&self) -> Result<Vec<IdeaRecord>>;
}

/// A [`RecordSource`] over records already in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    records: Vec<IdeaRecord>,
}

impl InMemoryRecordSource {
    /// Wrap the given records.
    pub fn new(records: Vec<IdeaRecord>) -> Self {
        Self { records }
    }
}

#[async_trait]
impl RecordSource for InMemoryRecordSource {
    async fn load(&self) -> Result<Vec<IdeaRecord>> {
        Ok(self.records.clone())
    }
}

/// A [`RecordSource`] reading raw rows from a JSON array or a JSON Lines file.
#[derive(Debug, Clone)]
pub struct JsonRecordSource {
    path: PathBuf,
}

impl JsonRecordSource {
    /// Read rows from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse rows from file contents. Exposed for callers that already hold the text.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::RecordSource`] with the failing line for malformed input.
    pub fn parse(contents: &str) -> Result<Vec<IdeaRecord>> {
        let rows: Vec<RawIdeaRow> = if contents.trim_start().starts_with('[') {
            serde_json::from_str(contents)
                .map_err(|e| ThemeError::RecordSource(format!("invalid JSON array: {e}")))?
        } else {
            contents
                .lines()
                .enumerate()
                .filter(|(_, line)| !line.trim().is_empty())
                .map(|(i, line)| {
                    serde_json::from_str(line).map_err(|e| {
                        ThemeError::RecordSource(format!("invalid JSON on line {}: {e}", i + 1))
                    })
                })
                .collect::<Result<_>>()?
        };

        Ok(rows.into_iter().enumerate().map(|(i, row)| IdeaRecord::from_row(i, row)).collect())
    }
}

#[async_trait]
impl RecordSource for JsonRecordSource {
    async fn load(&self) -> Result<Vec<IdeaRecord>> {
        let contents = read_export(&self.path).await?;
        let records = Self::parse(&contents)?;
        info!(path = %self.path.display(), record_count = records.len(), "loaded records");
        Ok(records)
    }
}

/// A [`RecordSource`] reading raw rows from a CSV export with a header row.
///
/// Columns are matched by header name; unknown columns are ignored and rows may have
/// fewer cells than the header.
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    path: PathBuf,
}

impl CsvRecordSource {
    /// Read rows from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Parse rows from CSV text.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::RecordSource`] with the failing row for malformed input.
    pub fn parse(contents: &str) -> Result<Vec<IdeaRecord>> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(contents.as_bytes());

        reader
            .deserialize::<RawIdeaRow>()
            .enumerate()
            .map(|(i, row)| {
                row.map(|row| IdeaRecord::from_row(i, row)).map_err(|e| {
                    ThemeError::RecordSource(format!("invalid CSV row {}: {e}", i + 1))
                })
            })
            .collect()
    }
}

#[async_trait]
impl RecordSource for CsvRecordSource {
    async fn load(&self) -> Result<Vec<IdeaRecord>> {
        let contents = read_export(&self.path).await?;
        let records = Self::parse(&contents)?;
        info!(path = %self.path.display(), record_count = records.len(), "loaded records");
        Ok(records)
    }
}

async fn read_export(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path).await.map_err(|e| {
        ThemeError::RecordSource(format!("failed to read '{}': {e}", path.display()))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_text_joins_title_and_description() {
        let row: RawIdeaRow = serde_json::from_str(
            r#"{"Idea Name": "Shuttle", "Description": "Run a bus from the station",
                "Votes": "12", "Idea Comments": 3}"#,
        )
        .unwrap();
        let record = IdeaRecord::from_row(0, row);
        assert_eq!(record.text, "Shuttle: Run a bus from the station");
        assert_eq!(record.votes, 12);
        assert_eq!(record.comment_count, 3);
        assert_eq!(record.id, "0");
    }

    #[test]
    fn missing_parts_never_produce_null_text() {
        let record = IdeaRecord::from_row(4, RawIdeaRow::default());
        assert_eq!(record.text, "");
        assert_eq!(record.votes, 0);

        let row: RawIdeaRow = serde_json::from_str(r#"{"Description": "only a body"}"#).unwrap();
        assert_eq!(IdeaRecord::from_row(0, row).text, "only a body");
    }

    #[test]
    fn counts_are_lenient() {
        assert_eq!(parse_count("1,204"), 1204);
        assert_eq!(parse_count("7.0"), 7);
        assert_eq!(parse_count("n/a"), 0);
        assert_eq!(parse_count("-3"), 0);
    }

    #[test]
    fn segment_filter_variants() {
        let records = vec![
            IdeaRecord::new("a", "x", 0, 0).with_segment("Corporate"),
            IdeaRecord::new("b", "y", 0, 0).with_segment("Products"),
            IdeaRecord::new("c", "z", 0, 0),
        ];
        let corporate = SegmentFilter::Equals("Corporate".into()).apply(records.clone());
        assert_eq!(corporate.len(), 1);
        assert_eq!(corporate[0].id, "a");

        let missing = SegmentFilter::Missing.apply(records.clone());
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].id, "c");

        assert_eq!(SegmentFilter::Any.apply(records).len(), 3);
    }

    #[test]
    fn json_lines_and_arrays_parse_alike() {
        let lines = "{\"ID\": 10, \"Idea Name\": \"A\"}\n\n{\"ID\": 11, \"Idea Name\": \"B\"}\n";
        let array = r#"[{"ID": 10, "Idea Name": "A"}, {"ID": 11, "Idea Name": "B"}]"#;
        assert_eq!(
            JsonRecordSource::parse(lines).unwrap(),
            JsonRecordSource::parse(array).unwrap()
        );
    }

    #[test]
    fn csv_export_columns_are_read() {
        let csv = "\
ID,Idea Name,Description,Votes,Idea Comments,Segment,Owner
17,Shuttle,\"Run a bus, hourly\",\"1,204\",3,Foundry,ops
18,Coffee,,,,,
,,Only a body,7.0,n/a,Products
";
        let records = CsvRecordSource::parse(csv).unwrap();
        assert_eq!(records.len(), 3);

        assert_eq!(records[0].id, "17");
        assert_eq!(records[0].text, "Shuttle: Run a bus, hourly");
        assert_eq!(records[0].votes, 1204);
        assert_eq!(records[0].comment_count, 3);
        assert_eq!(records[0].segment.as_deref(), Some("Foundry"));

        assert_eq!(records[1].text, "Coffee");
        assert_eq!(records[1].votes, 0);
        assert_eq!(records[1].segment, None);

        assert_eq!(records[2].id, "2");
        assert_eq!(records[2].text, "Only a body");
        assert_eq!(records[2].votes, 7);
        assert_eq!(records[2].comment_count, 0);
    }

    #[tokio::test]
    async fn csv_source_loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ideas.csv");
        std::fs::write(&path, "Idea Name,Votes\nParking,2\nBadges,5\n").unwrap();

        let records = CsvRecordSource::new(&path).load().await.unwrap();
        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["0", "1"]);
        assert_eq!(records[1].votes, 5);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let records = vec![IdeaRecord::new("a", "x", 0, 0), IdeaRecord::new("a", "y", 0, 0)];
        assert!(matches!(ensure_unique_ids(&records), Err(ThemeError::RecordSource(_))));
    }
}
