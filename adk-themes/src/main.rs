use std::path::{Path, PathBuf};
use std::sync::Arc;

use adk_themes::ollama::{self, OllamaClient};
use adk_themes::{
    CancellationFlag, CsvRecordSource, DispersionCurve, JsonRecordSource, JsonReportSink,
    ProgressEvent, RecordSource, ReportSink, SegmentFilter, ThemeConfig, ThemePipeline,
};
use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Group idea submissions into themes and summarize each theme.
#[derive(Parser)]
#[command(name = "adk-themes")]
#[command(version)]
struct Args {
    /// Ideas export: CSV (`.csv`), or a JSON array or JSON Lines (any other extension)
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Only theme ideas from this segment
    #[arg(long, conflicts_with = "no_segment")]
    segment: Option<String>,

    /// Only theme ideas without a segment
    #[arg(long)]
    no_segment: bool,

    /// JSON configuration file; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the report here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Write the dispersion curve (k and inertia per candidate) here as JSON
    #[arg(long, value_name = "PATH")]
    curve: Option<PathBuf>,

    /// Ollama server URL
    #[arg(long, default_value = ollama::DEFAULT_BASE_URL)]
    ollama_url: String,

    /// Embedding model
    #[arg(long, default_value = ollama::DEFAULT_EMBEDDING_MODEL)]
    embedding_model: String,

    /// Dimensionality of the embedding model
    #[arg(long, default_value_t = ollama::DEFAULT_DIMENSIONS)]
    embedding_dimensions: usize,

    /// Long-form model for labels and final summaries
    #[arg(long, default_value = ollama::DEFAULT_CHAT_MODEL)]
    chat_model: String,

    /// Short-form model for chunk summaries
    #[arg(long, default_value = ollama::DEFAULT_SUMMARY_MODEL)]
    summary_model: String,

    /// Input ceiling of the short-form model, in characters
    #[arg(long, default_value_t = ollama::DEFAULT_MAX_INPUT_CHARS)]
    summary_max_input_chars: usize,

    /// Seed for every k-means fit
    #[arg(long)]
    seed: Option<u64>,

    /// Smallest candidate cluster count
    #[arg(long)]
    k_min: Option<usize>,

    /// Largest candidate cluster count
    #[arg(long)]
    k_max: Option<usize>,

    /// Cluster count to use when the dispersion curve has no knee
    #[arg(long)]
    fallback_k: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn theme_config(&self) -> Result<ThemeConfig> {
        let mut config = match &self.config {
            Some(path) => ThemeConfig::from_json_file(path)
                .with_context(|| format!("failed to load config '{}'", path.display()))?,
            None => ThemeConfig::default(),
        };

        if let Some(segment) = &self.segment {
            config.segment = SegmentFilter::Equals(segment.clone());
        } else if self.no_segment {
            config.segment = SegmentFilter::Missing;
        }
        if let Some(seed) = self.seed {
            config.clustering.seed = seed;
        }
        if let Some(k_min) = self.k_min {
            config.clustering.k_min = k_min;
        }
        if let Some(k_max) = self.k_max {
            config.clustering.k_max = k_max;
        }
        if self.fallback_k.is_some() {
            config.clustering.fallback_k = self.fallback_k;
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn record_source(path: &Path) -> Box<dyn RecordSource> {
    if path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("csv")) {
        Box::new(CsvRecordSource::new(path))
    } else {
        Box::new(JsonRecordSource::new(path))
    }
}

async fn write_curve(path: &Path, curve: Option<&DispersionCurve>) -> Result<()> {
    let Some(curve) = curve else {
        warn!("no dispersion curve for this run, skipping curve output");
        return Ok(());
    };
    let json = serde_json::to_string_pretty(curve)?;
    tokio::fs::write(path, json)
        .await
        .with_context(|| format!("failed to write curve '{}'", path.display()))?;
    info!(path = %path.display(), "wrote dispersion curve");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if args.verbose { "adk_themes=debug,info" } else { "adk_themes=info,warn" })
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config = args.theme_config()?;
    let client = Arc::new(
        OllamaClient::new(&args.ollama_url)
            .with_embedding_model(&args.embedding_model, args.embedding_dimensions)
            .with_chat_model(&args.chat_model)
            .with_summary_model(&args.summary_model, args.summary_max_input_chars),
    );

    let cancellation = CancellationFlag::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping before the next theme");
            ctrl_c.cancel();
        }
    });

    let (progress, mut events) = tokio::sync::mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::ThemeStarted { theme, index, total } => {
                    info!(theme = %theme, "summarizing theme {}/{total}", index + 1);
                }
                ProgressEvent::ThemeFinished { theme, strategy, unavailable, .. } => {
                    info!(theme = %theme, ?strategy, unavailable, "theme summarized");
                }
                ProgressEvent::BatchFinished { themes, unavailable } => {
                    info!(themes, unavailable, "all themes summarized");
                }
            }
        }
    });

    let pipeline = ThemePipeline::builder()
        .config(config)
        .embedding_provider(client.clone())
        .long_form(client.clone())
        .short_form(client)
        .progress(progress)
        .cancellation(cancellation)
        .build()?;

    let source = record_source(&args.input);
    let run = pipeline
        .run_source_detailed(source.as_ref())
        .await
        .with_context(|| format!("theme run over '{}' failed", args.input.display()))?;

    if let Some(curve) = &run.curve {
        for (k, inertia) in curve.points() {
            debug!(k, inertia, "dispersion curve");
        }
    }
    if let Some(path) = &args.curve {
        write_curve(path, run.curve.as_ref()).await?;
    }

    match &args.output {
        Some(path) => JsonReportSink::new(path).emit(&run.report).await?,
        None => println!("{}", run.report.to_json()?),
    }

    Ok(())
}
