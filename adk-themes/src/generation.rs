//! Text generation seams: a long-form generator for labels and final summaries, and a
//! short-form summarizer with a hard input ceiling for chunk summaries.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::error::{Result, ThemeError};

/// A long-form generator: prompt in, text out.
///
/// Higher latency, no hard input ceiling assumed.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate a response to `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// The model identifier, used in logs and errors.
    fn model(&self) -> &str;
}

/// A bounded sequence-to-sequence summarizer.
///
/// Input longer than [`max_input_chars`](ShortFormSummarizer::max_input_chars) is the
/// caller's responsibility to truncate.
#[async_trait]
pub trait ShortFormSummarizer: Send + Sync {
    /// Summarize `text` to between `min_len` and `max_len` tokens.
    async fn summarize(&self, text: &str, max_len: usize, min_len: usize) -> Result<String>;

    /// Largest input, in characters, the model accepts.
    fn max_input_chars(&self) -> usize;

    /// The model identifier, used in logs and errors.
    fn name(&self) -> &str;
}

/// Truncate to at most `max_chars` characters on a char boundary.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte, _)) => &text[..byte],
        None => text,
    }
}

/// Call the long-form generator once, bounded by `timeout` and the optional shared permit pool.
///
/// # Errors
///
/// Returns [`ThemeError::GenerationTimeout`] when the call exceeds `timeout`, or the
/// generator's own error.
pub async fn generate_once(
    generator: &dyn TextGenerator,
    prompt: &str,
    timeout: Duration,
    permits: Option<&Semaphore>,
) -> Result<String> {
    let _permit = match permits {
        Some(semaphore) => Some(semaphore.acquire().await.map_err(|_| ThemeError::Cancelled)?),
        None => None,
    };

    tokio::time::timeout(timeout, generator.generate(prompt)).await.map_err(|_| {
        ThemeError::GenerationTimeout {
            model: generator.model().to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    })?
}

/// Call the long-form generator with bounded retries and exponential backoff.
///
/// Empty (whitespace-only) responses count as failures. The returned text is trimmed.
///
/// # Errors
///
/// Returns the last error once `policy.max_attempts` attempts are exhausted.
pub async fn generate_with_retry(
    generator: &dyn TextGenerator,
    prompt: &str,
    timeout: Duration,
    policy: &RetryPolicy,
    permits: Option<&Semaphore>,
) -> Result<String> {
    retry(generator.model(), policy, || generate_once(generator, prompt, timeout, permits)).await
}

/// Call the short-form summarizer once, bounded by `timeout`.
///
/// # Errors
///
/// Returns [`ThemeError::GenerationTimeout`] or the summarizer's own error.
pub async fn summarize_once(
    summarizer: &dyn ShortFormSummarizer,
    text: &str,
    max_len: usize,
    min_len: usize,
    timeout: Duration,
) -> Result<String> {
    let call = summarizer.summarize(text, max_len, min_len);
    tokio::time::timeout(timeout, call).await.map_err(|_| ThemeError::GenerationTimeout {
        model: summarizer.name().to_string(),
        timeout_ms: timeout.as_millis() as u64,
    })?
}

/// Call the short-form summarizer with bounded retries and exponential backoff.
///
/// Same failure rules as [`generate_with_retry`].
///
/// # Errors
///
/// Returns the last error once `policy.max_attempts` attempts are exhausted.
pub async fn summarize_with_retry(
    summarizer: &dyn ShortFormSummarizer,
    text: &str,
    max_len: usize,
    min_len: usize,
    timeout: Duration,
    policy: &RetryPolicy,
) -> Result<String> {
    retry(summarizer.name(), policy, || {
        summarize_once(summarizer, text, max_len, min_len, timeout)
    })
    .await
}

async fn retry<F, Fut>(model: &str, policy: &RetryPolicy, mut call: F) -> Result<String>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        let outcome = match call().await {
            Ok(text) if text.trim().is_empty() => Err(ThemeError::GenerationFailure {
                model: model.to_string(),
                message: "empty response".into(),
            }),
            Ok(text) => Ok(text.trim().to_string()),
            Err(e) => Err(e),
        };

        match outcome {
            Ok(text) => {
                debug!(model, attempt, "generation succeeded");
                return Ok(text);
            }
            Err(e) => {
                warn!(model, attempt, attempts, error = %e, "generation attempt failed");
                let again = e.is_transient() && attempt < attempts;
                last_error = Some(e);
                if !again {
                    break;
                }
                tokio::time::sleep(policy.backoff(attempt)).await;
            }
        }
    }

    Err(last_error.unwrap_or_else(|| ThemeError::GenerationFailure {
        model: model.to_string(),
        message: "no attempts made".into(),
    }))
}
