//! Embedding provider trait for generating vector embeddings from idea text.

use async_trait::async_trait;
use tracing::{debug, error};

use crate::config::EmbeddingConfig;
use crate::error::{Result, ThemeError};

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async interface. The
/// default [`embed_batch`](EmbeddingProvider::embed_batch) implementation calls
/// [`embed`](EmbeddingProvider::embed) sequentially; backends that support native batching
/// should override it.
///
/// # Example
///
/// ```rust,ignore
/// use adk_themes::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("Shuttle: run a bus from the station").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}

/// Embed every text in batches of `config.batch_size`, each batch bounded by the configured
/// timeout.
///
/// # Errors
///
/// Returns [`ThemeError::Embedding`] if a batch fails, times out, or returns the wrong number
/// of vectors.
pub async fn embed_texts(
    provider: &dyn EmbeddingProvider,
    texts: &[&str],
    config: &EmbeddingConfig,
) -> Result<Vec<Vec<f32>>> {
    let mut embeddings = Vec::with_capacity(texts.len());

    for (batch_index, batch) in texts.chunks(config.batch_size).enumerate() {
        debug!(batch_index, batch_size = batch.len(), "embedding batch");

        let vectors = tokio::time::timeout(config.timeout(), provider.embed_batch(batch))
            .await
            .map_err(|_| {
                error!(
                    batch_index,
                    timeout_secs = config.timeout_secs,
                    "embedding batch timed out"
                );
                ThemeError::Embedding {
                    provider: "pipeline".into(),
                    message: format!(
                        "batch {batch_index} timed out after {}s",
                        config.timeout_secs
                    ),
                }
            })??;

        if vectors.len() != batch.len() {
            return Err(ThemeError::Embedding {
                provider: "pipeline".into(),
                message: format!(
                    "batch {batch_index} returned {} vectors for {} texts",
                    vectors.len(),
                    batch.len()
                ),
            });
        }
        embeddings.extend(vectors);
    }

    Ok(embeddings)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Lengths {
        batches: AtomicUsize,
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for Lengths {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 1.0])
        }

        async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed(text).await?);
            }
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        fn dimensions(&self) -> usize {
            2
        }
    }

    #[tokio::test]
    async fn texts_are_embedded_in_order_across_batches() {
        let provider = Lengths { batches: AtomicUsize::new(0), drop_last: false };
        let config = EmbeddingConfig { batch_size: 2, ..EmbeddingConfig::default() };
        let texts = ["a", "bb", "ccc", "dddd", "eeeee"];
        let vectors = embed_texts(&provider, &texts, &config).await.unwrap();

        assert_eq!(provider.batches.load(Ordering::SeqCst), 3);
        let lengths: Vec<f32> = vectors.iter().map(|v| v[0]).collect();
        assert_eq!(lengths, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn short_batches_are_rejected() {
        let provider = Lengths { batches: AtomicUsize::new(0), drop_last: true };
        let err =
            embed_texts(&provider, &["a", "b"], &EmbeddingConfig::default()).await.unwrap_err();
        assert!(matches!(err, ThemeError::Embedding { .. }));
    }

    struct Stalled;

    #[async_trait]
    impl EmbeddingProvider for Stalled {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            Ok(vec![0.0])
        }

        fn dimensions(&self) -> usize {
            1
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_batches_time_out() {
        let config = EmbeddingConfig { timeout_secs: 5, ..EmbeddingConfig::default() };
        let err = embed_texts(&Stalled, &["a", "b"], &config).await.unwrap_err();
        let ThemeError::Embedding { message, .. } = &err else {
            panic!("expected an embedding error, got {err:?}");
        };
        assert!(message.contains("timed out"));
    }
}
