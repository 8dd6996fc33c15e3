//! Adaptive, size-aware summarization of themes.
//!
//! Small themes go straight to the long-form generator. Large themes are split into fixed
//! size chunks, each chunk is condensed by the short-form summarizer, and the chunk
//! summaries are combined by one final long-form call.
//!
//! Failures never abort a batch. Both models are retried with backoff first; a chunk
//! summary that still fails falls back to the chunk's raw text truncated to `chunk_max_len`
//! characters, and a final long-form call that still fails leaves the theme with
//! [`SUMMARY_UNAVAILABLE`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::aggregate::Theme;
use crate::config::{GenerationConfig, SummaryConfig};
use crate::error::{Result, ThemeError};
use crate::generation::{
    ShortFormSummarizer, TextGenerator, generate_with_retry, summarize_with_retry, truncate_chars,
};

/// Summary text of a theme whose final long-form call could not be completed.
pub const SUMMARY_UNAVAILABLE: &str = "summary unavailable";

/// Separator between texts and between chunk summaries.
const SEPARATOR: &str = "\n";

/// How a theme is summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryStrategy {
    /// One long-form call over all texts.
    Direct,
    /// Short-form chunk summaries combined by one long-form call.
    Hierarchical,
}

/// Pick the strategy for a theme's texts.
///
/// Direct when there are at most `direct_max_texts` texts or the texts joined by newlines
/// are shorter than `direct_max_chars` characters.
pub fn choose_strategy<S: AsRef<str>>(texts: &[S], config: &SummaryConfig) -> SummaryStrategy {
    let n = texts.len();
    let chars: usize =
        texts.iter().map(|t| t.as_ref().chars().count()).sum::<usize>() + n.saturating_sub(1);

    if n <= config.direct_max_texts || chars < config.direct_max_chars {
        SummaryStrategy::Direct
    } else {
        SummaryStrategy::Hierarchical
    }
}

/// Split texts into consecutive chunks of `chunk_size`; the last chunk may be smaller.
pub fn chunk_texts<S>(texts: &[S], chunk_size: usize) -> Vec<&[S]> {
    texts.chunks(chunk_size.max(1)).collect()
}

/// Build the summary prompt for the long-form generator.
pub fn summary_prompt(text: &str) -> String {
    format!(
        "You are a business analyst. Summarize the following employee suggested ideas into a \
         detailed, formal summary. Identify key concerns, suggestions, and patterns. Be concise \
         but informative.\n\nIdeas:\n{text}\n\nSummary:"
    )
}

fn join<S: AsRef<str>>(texts: &[S]) -> String {
    texts.iter().map(AsRef::as_ref).collect::<Vec<_>>().join(SEPARATOR)
}

/// What happened while summarizing one theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryOutcome {
    /// The summary, or [`SUMMARY_UNAVAILABLE`].
    pub summary: String,
    /// Strategy used.
    pub strategy: SummaryStrategy,
    /// Chunks summarized on the hierarchical path (0 on the direct path).
    pub chunks: usize,
    /// Chunks whose short-form call failed and fell back to truncated raw text.
    pub short_form_fallbacks: usize,
    /// Whether the final long-form call was exhausted.
    pub unavailable: bool,
}

/// Progress notifications for a summarization batch.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A theme started summarizing.
    ThemeStarted {
        /// Theme label.
        theme: String,
        /// Position of the theme in the batch.
        index: usize,
        /// Number of themes in the batch.
        total: usize,
    },
    /// A theme finished summarizing.
    ThemeFinished {
        /// Theme label.
        theme: String,
        /// Position of the theme in the batch.
        index: usize,
        /// Number of themes in the batch.
        total: usize,
        /// Strategy used.
        strategy: SummaryStrategy,
        /// Whether the summary is unavailable.
        unavailable: bool,
    },
    /// Every theme finished.
    BatchFinished {
        /// Number of themes summarized.
        themes: usize,
        /// Number of themes left without a summary.
        unavailable: usize,
    },
}

/// Operator-held flag that stops a batch before its next theme starts.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    /// Create an unset flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Summarizes themes with the direct or hierarchical strategy.
pub struct AdaptiveSummarizer {
    long_form: Arc<dyn TextGenerator>,
    short_form: Arc<dyn ShortFormSummarizer>,
    summary: SummaryConfig,
    generation: GenerationConfig,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
    progress: Option<UnboundedSender<ProgressEvent>>,
    cancellation: CancellationFlag,
}

impl AdaptiveSummarizer {
    /// Create a summarizer. `permits` bounds long-form calls shared with other stages.
    pub fn new(
        long_form: Arc<dyn TextGenerator>,
        short_form: Arc<dyn ShortFormSummarizer>,
        summary: SummaryConfig,
        generation: GenerationConfig,
        permits: Arc<Semaphore>,
    ) -> Self {
        Self {
            long_form,
            short_form,
            summary,
            generation,
            permits,
            max_concurrent: 1,
            progress: None,
            cancellation: CancellationFlag::new(),
        }
    }

    /// Summarize up to `max_concurrent` themes at the same time.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    /// Send [`ProgressEvent`]s to `sender`.
    pub fn with_progress(mut self, sender: UnboundedSender<ProgressEvent>) -> Self {
        self.progress = Some(sender);
        self
    }

    /// Stop the batch when `flag` is set.
    pub fn with_cancellation(mut self, flag: CancellationFlag) -> Self {
        self.cancellation = flag;
        self
    }

    fn notify(&self, event: ProgressEvent) {
        if let Some(sender) = &self.progress {
            // A dropped receiver only means nobody is listening.
            let _ = sender.send(event);
        }
    }

    /// Summarize every theme and store the summaries in place.
    ///
    /// Themes run concurrently; outcomes are returned in theme order.
    ///
    /// # Errors
    ///
    /// Returns [`ThemeError::Cancelled`] if the cancellation flag is set before a theme starts.
    /// Summaries already produced are discarded.
    pub async fn summarize_themes(&self, themes: &mut [Theme]) -> Result<Vec<SummaryOutcome>> {
        let total = themes.len();
        let results: Vec<Result<SummaryOutcome>> = stream::iter(themes.iter().enumerate())
            .map(|(index, theme)| async move {
                if self.cancellation.is_cancelled() {
                    return Err(ThemeError::Cancelled);
                }
                self.notify(ProgressEvent::ThemeStarted {
                    theme: theme.label.clone(),
                    index,
                    total,
                });
                let outcome = self.summarize_texts(&theme.label, &theme.texts).await;
                self.notify(ProgressEvent::ThemeFinished {
                    theme: theme.label.clone(),
                    index,
                    total,
                    strategy: outcome.strategy,
                    unavailable: outcome.unavailable,
                });
                Ok(outcome)
            })
            .buffered(self.max_concurrent)
            .collect()
            .await;

        let outcomes: Vec<SummaryOutcome> = results
            .into_iter()
            .collect::<Result<_>>()
            .inspect_err(|_| warn!("summarization batch cancelled"))?;

        for (theme, outcome) in themes.iter_mut().zip(&outcomes) {
            theme.summary = Some(outcome.summary.clone());
        }

        let unavailable = outcomes.iter().filter(|o| o.unavailable).count();
        info!(themes = total, unavailable, "summarized themes");
        self.notify(ProgressEvent::BatchFinished { themes: total, unavailable });
        Ok(outcomes)
    }

    /// Summarize one theme's texts. Never fails; degraded results are flagged in the outcome.
    pub async fn summarize_texts<S: AsRef<str> + Sync>(
        &self,
        theme: &str,
        texts: &[S],
    ) -> SummaryOutcome {
        let strategy = choose_strategy(texts, &self.summary);
        debug!(theme, texts = texts.len(), ?strategy, "summarizing theme");

        let (combined, chunks, short_form_fallbacks) = match strategy {
            SummaryStrategy::Direct => (join(texts), 0, 0),
            SummaryStrategy::Hierarchical => self.summarize_chunks(theme, texts).await,
        };

        let prompt = summary_prompt(&combined);
        let (summary, unavailable) = match generate_with_retry(
            self.long_form.as_ref(),
            &prompt,
            self.generation.timeout(),
            &self.generation.retry,
            Some(&self.permits),
        )
        .await
        {
            Ok(summary) => (summary, false),
            Err(e) => {
                warn!(theme, error = %e, "final summary unavailable");
                (SUMMARY_UNAVAILABLE.to_string(), true)
            }
        };

        SummaryOutcome { summary, strategy, chunks, short_form_fallbacks, unavailable }
    }

    /// Summarize chunks in order. Returns the joined chunk summaries, the chunk count and the
    /// number of fallbacks.
    async fn summarize_chunks<S: AsRef<str> + Sync>(
        &self,
        theme: &str,
        texts: &[S],
    ) -> (String, usize, usize) {
        let max_len = self.summary.chunk_max_len;
        let min_len = self.summary.chunk_min_len;
        let ceiling = self.short_form.max_input_chars();
        let chunks = chunk_texts(texts, self.summary.chunk_size);
        let chunk_count = chunks.len();

        let mut summaries = Vec::with_capacity(chunk_count);
        let mut fallbacks = 0;

        for (index, chunk) in chunks.into_iter().enumerate() {
            let raw = join(chunk);
            let input = truncate_chars(&raw, ceiling);
            if input.len() < raw.len() {
                debug!(theme, chunk = index, ceiling, "chunk truncated to short-form input limit");
            }

            let result = summarize_with_retry(
                self.short_form.as_ref(),
                input,
                max_len,
                min_len,
                self.generation.timeout(),
                &self.generation.retry,
            )
            .await;

            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    warn!(
                        theme,
                        chunk = index,
                        error = %e,
                        "chunk summary failed, using truncated text"
                    );
                    fallbacks += 1;
                    summaries.push(truncate_chars(&raw, max_len).to_string());
                }
            }
        }

        (summaries.join(SEPARATOR), chunk_count, fallbacks)
    }
}
