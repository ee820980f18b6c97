use std::path::{Path, PathBuf};

use clap::{ArgGroup, Parser};
use speechtok_rs::config::{DatasetConfig, SplitSizes};
use speechtok_rs::labels::manifest::write_manifest;
use speechtok_rs::labels::preprocess::{
    audio_path_for_label, default_worker_count, extract_transcripts, read_transcript_listing,
    JsonLabelSource,
};
use speechtok_rs::{
    ManifestGenerator, ManifestSplits, PipelineConfig, SpeechTokError, TokenizerConfig,
    TokenizerRegistry, Vocabulary,
};

/// Builds the character vocabulary and the transcript manifest of a corpus.
#[derive(Debug, Parser)]
#[command(group(ArgGroup::new("input").required(true).args(["labels", "listing"])))]
struct Args {
    /// File listing one JSON label path per line.
    #[arg(long, env = "SPEECHTOK_LABELS")]
    labels: Option<PathBuf>,
    /// `audio<TAB>transcript` listing.
    #[arg(long, env = "SPEECHTOK_LISTING")]
    listing: Option<PathBuf>,
    /// Pipeline config; its vocabulary and manifest paths win over the flags below.
    #[arg(long, env = "SPEECHTOK_CONFIG")]
    config: Option<PathBuf>,
    #[arg(long, env = "SPEECHTOK_VOCAB_OUT", default_value = "vocab.csv")]
    vocab_out: PathBuf,
    #[arg(long, env = "SPEECHTOK_MANIFEST_OUT", default_value = "transcripts.txt")]
    manifest_out: PathBuf,
    #[arg(long, env = "SPEECHTOK_WORKERS")]
    workers: Option<usize>,
}

fn main() {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    if let Err(e) = run(Args::parse()) {
        tracing::error!(error = %e, "manifest preparation failed");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), SpeechTokError> {
    let (tokenizer_cfg, dataset_cfg) = match &args.config {
        Some(path) => {
            let cfg = PipelineConfig::load(path)?;
            (cfg.tokenizer, cfg.dataset)
        }
        None => (
            TokenizerConfig::new(&args.vocab_out),
            DatasetConfig {
                manifest_file_path: args.manifest_out.clone(),
                dataset_path: None,
                splits: SplitSizes::default(),
            },
        ),
    };

    let (audio_references, transcripts) = match (&args.labels, &args.listing) {
        (Some(labels), _) => {
            let workers = args.workers.unwrap_or_else(default_worker_count);
            collect_from_labels(labels, dataset_cfg.dataset_path.as_deref(), workers)?
        }
        (None, Some(listing)) => read_transcript_listing(listing)?.into_iter().unzip(),
        (None, None) => {
            return Err(SpeechTokError::invalid_input(
                "either --labels or --listing is required",
            ))
        }
    };

    Vocabulary::build(&transcripts, &tokenizer_cfg.special_tokens)
        .save(&tokenizer_cfg.vocab_path)?;

    let tokenizer = TokenizerRegistry::with_defaults().build(&tokenizer_cfg)?;
    let records = ManifestGenerator::new(tokenizer.as_ref()).generate(&audio_references, &transcripts)?;
    write_manifest(&dataset_cfg.manifest_file_path, &records)?;

    let splits = ManifestSplits::from_records(records, &dataset_cfg.splits);
    tracing::info!(
        train = splits.train.len(),
        valid = splits.valid.len(),
        test = splits.test.len(),
        "manifest splits"
    );
    Ok(())
}

/// Label paths are relative to `dataset_root` when one is configured.
fn collect_from_labels(
    list_path: &Path,
    dataset_root: Option<&Path>,
    workers: usize,
) -> Result<(Vec<String>, Vec<String>), SpeechTokError> {
    let list = std::fs::read_to_string(list_path)
        .map_err(|e| SpeechTokError::io("read label list", e))?;
    let label_paths: Vec<PathBuf> = list
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| match dataset_root {
            Some(root) => root.join(line),
            None => PathBuf::from(line),
        })
        .collect();

    let transcripts = extract_transcripts(&label_paths, &JsonLabelSource, workers)?;
    let audio_references = label_paths
        .iter()
        .map(|path| audio_path_for_label(path).display().to_string())
        .collect();
    Ok((audio_references, transcripts))
}
