//! Hand-written providers shared by the integration tests.

#![allow(dead_code)]

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use adk_themes::{
    EmbeddingProvider, IdeaRecord, Result, ShortFormSummarizer, TextGenerator, ThemeError,
};
use async_trait::async_trait;

/// Topic words; each becomes one embedding dimension.
pub const TOPICS: [&str; 3] = ["parking", "coffee", "badge"];

/// Embeds a text as the presence of each topic word.
#[derive(Default)]
pub struct TopicEmbedder {
    pub calls: AtomicUsize,
    /// Return a NaN component for the text at this position of the first batch.
    pub corrupt: Option<usize>,
}

#[async_trait]
impl EmbeddingProvider for TopicEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        Ok(TOPICS.iter().map(|t| if lower.contains(t) { 1.0 } else { 0.0 }).collect())
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        if let (0, Some(i)) = (call, self.corrupt) {
            out[i][0] = f32::NAN;
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        TOPICS.len()
    }
}

/// Long-form generator that answers label prompts with the title-cased first keyword and
/// summary prompts with a line count. Every prompt is recorded.
#[derive(Default)]
pub struct ScriptedGenerator {
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedGenerator {
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(rest) = prompt.split("Keywords:\n").nth(1) {
            let first = rest.split([',', '\n']).next().unwrap_or_default().trim();
            let mut chars = first.chars();
            let title: String = match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect(),
                None => String::new(),
            };
            return Ok(format!("  {title} Ideas\n"));
        }

        let ideas = prompt.split("Ideas:\n").nth(1).and_then(|r| r.split("\n\nSummary:").next());
        let lines = ideas.map_or(0, |i| i.lines().count());
        Ok(format!("Summary of {lines} lines."))
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Long-form generator that always fails.
#[derive(Default)]
pub struct FailingGenerator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TextGenerator for FailingGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ThemeError::GenerationFailure {
            model: "failing".into(),
            message: "service down".into(),
        })
    }

    fn model(&self) -> &str {
        "failing"
    }
}

/// Short-form summarizer that records its inputs and answers `chunk-{n}`, counting
/// successful answers only. The first `failures` calls fail.
pub struct RecordingSummarizer {
    pub inputs: Mutex<Vec<String>>,
    pub answers: AtomicUsize,
    pub failures: usize,
    pub max_input_chars: usize,
}

impl RecordingSummarizer {
    pub fn new() -> Self {
        Self {
            inputs: Mutex::new(Vec::new()),
            answers: AtomicUsize::new(0),
            failures: 0,
            max_input_chars: 4096,
        }
    }

    pub fn failing() -> Self {
        Self { failures: usize::MAX, ..Self::new() }
    }

    pub fn failing_first(failures: usize) -> Self {
        Self { failures, ..Self::new() }
    }

    pub fn with_ceiling(max_input_chars: usize) -> Self {
        Self { max_input_chars, ..Self::new() }
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl ShortFormSummarizer for RecordingSummarizer {
    async fn summarize(&self, text: &str, _max_len: usize, _min_len: usize) -> Result<String> {
        let mut inputs = self.inputs.lock().unwrap();
        let call = inputs.len();
        inputs.push(text.to_string());
        if call < self.failures {
            return Err(ThemeError::GenerationFailure {
                model: "recording".into(),
                message: "oom".into(),
            });
        }
        Ok(format!("chunk-{}", self.answers.fetch_add(1, Ordering::SeqCst)))
    }

    fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Nine ideas, three per topic, each mentioning its topic twice.
pub fn topic_records() -> Vec<IdeaRecord> {
    vec![
        IdeaRecord::new("p1", "Parking: more parking spaces near the gate", 5, 1),
        IdeaRecord::new("c1", "Coffee: better coffee beans in the kitchen", 2, 0),
        IdeaRecord::new("b1", "Badge readers: badge readers fail in the rain", 1, 3),
        IdeaRecord::new("p2", "Parking lights: the parking lot is dark at night", 3, 2),
        IdeaRecord::new("c2", "Coffee machine: the coffee machine leaks", 4, 1),
        IdeaRecord::new("b2", "Badge printer: print a new badge on site", 0, 0),
        IdeaRecord::new("p3", "Parking permits: cheaper parking permits for interns", 7, 4),
        IdeaRecord::new("c3", "Coffee hours: serve coffee after six", 1, 1),
        IdeaRecord::new("b3", "Badge colors: visitor badge colors are confusing", 2, 0),
    ]
}
