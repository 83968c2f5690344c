//! CLI for the multimodal dialogue dataset pipeline.
//!
//! Subcommands:
//!  - `build`      : parse a CSV split, join audio embeddings, print a dataset summary.
//!  - `precompute` : warm the on-disk visual-feature cache for every utterance.
//!  - `inspect`    : print one example's transcripts, speakers, labels and shapes.
//!
//! All subcommands emit JSON on stdout so results can be piped into other
//! tooling. Diagnostics go through `tracing` (control with `RUST_LOG`).
//!
//! Usage examples:
//!  trimodal build --records train_sent_emo.csv --root train_splits/ --name train
//!  trimodal precompute --records train_sent_emo.csv --root train_splits/ \
//!      --name train --cache ./cache --rate 15
//!  trimodal inspect --records dev_sent_emo.csv --root dev_splits/ --name val --index 3

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use trimodal::media::ffmpeg::FfmpegDecoder;
use trimodal::media::sampler::FrameSampler;
use trimodal::{
    load_audio_table_json, AudioTable, DatasetBuilder, DatasetConfig, DialogueDataset,
    DiskFeatureCache, ExtractionParams, MediaStack, VideoSource,
};

mod summary;

use crate::summary::{dataset_summary, example_summary};

/// CLI entrypoint.
#[derive(Parser)]
#[command(
    name = "trimodal",
    about = "Multimodal dialogue dataset tooling — build, cache warm-up & inspection",
    version
)]
struct Cli {
    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a dataset from a CSV split and print a summary.
    Build(BuildArgs),

    /// Warm the visual-feature cache for every utterance of a split.
    Precompute(PrecomputeArgs),

    /// Print one example (transcripts, speakers, labels, shapes) as JSON.
    Inspect(InspectArgs),
}

/// Arguments shared by every subcommand: where the split lives.
#[derive(Args, Debug)]
struct SplitArgs {
    /// Path to the CSV split file.
    #[arg(long, value_name = "PATH")]
    records: PathBuf,

    /// Audio-embedding table (JSON) joined by "{dialogue_id}_{utterance_id}".
    /// Missing keys fall back to the zero-default pair.
    #[arg(long, value_name = "PATH")]
    audio: Option<PathBuf>,

    /// Directory containing the dia{d}_utt{u}.mp4 video files.
    #[arg(long, value_name = "DIR")]
    root: PathBuf,

    /// Split name; namespaces this dataset's cache entries.
    #[arg(long, default_value = "train")]
    name: String,

    /// Root directory of the visual-feature cache.
    #[arg(long, value_name = "DIR", default_value = "./cache")]
    cache: PathBuf,
}

/// Face-feature extraction parameters.
#[derive(Args, Debug)]
struct ParamArgs {
    /// Maximum person slots per feature tensor.
    #[arg(long, default_value_t = 7)]
    max_persons: usize,

    /// Keep every Nth decoded frame.
    #[arg(long = "rate", default_value_t = 30)]
    sampling_rate: usize,

    /// Side length each face crop is resized to.
    #[arg(long = "size", default_value_t = 224)]
    output_size: usize,
}

impl ParamArgs {
    fn to_params(&self) -> ExtractionParams {
        ExtractionParams {
            max_persons: self.max_persons,
            output_size: self.output_size,
            sampling_rate: self.sampling_rate,
        }
    }
}

#[derive(Args, Debug)]
struct BuildArgs {
    #[command(flatten)]
    split: SplitArgs,

    /// Put face features (instead of raw video) in the video slot.
    #[arg(long)]
    visual_features: bool,

    #[command(flatten)]
    params: ParamArgs,
}

#[derive(Args, Debug)]
struct PrecomputeArgs {
    #[command(flatten)]
    split: SplitArgs,

    #[command(flatten)]
    params: ParamArgs,
}

#[derive(Args, Debug)]
struct InspectArgs {
    #[command(flatten)]
    split: SplitArgs,

    /// Dialogue index to inspect.
    #[arg(long)]
    index: usize,

    /// Use face features for the video modality.
    #[arg(long)]
    visual_features: bool,

    /// Also materialize the video modality and print its shapes (decodes
    /// video or reads the feature cache; can be slow).
    #[arg(long)]
    with_video: bool,

    #[command(flatten)]
    params: ParamArgs,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Build(args) => cmd_build(args),
        Commands::Precompute(args) => cmd_precompute(args),
        Commands::Inspect(args) => cmd_inspect(args),
    }
}

/// Construct a dataset from the split arguments.
fn load_dataset(split: &SplitArgs, video_source: VideoSource) -> Result<DialogueDataset> {
    let audio = match &split.audio {
        Some(path) => load_audio_table_json(path)
            .with_context(|| format!("loading audio table {}", path.display()))?,
        None => AudioTable::new(),
    };

    // If ffmpeg is not on PATH the build itself still works (construction
    // does no media I/O); the decoder errors on first actual decode.
    let decoder = FfmpegDecoder::discover()
        .unwrap_or_else(|_| FfmpegDecoder::with_binaries("ffmpeg", "ffprobe"));
    let media = MediaStack::new(Arc::new(decoder), Arc::new(FrameSampler));
    let cache = Arc::new(DiskFeatureCache::new(&split.cache));

    let config = DatasetConfig::new(split.name.as_str(), &split.root).with_video_source(video_source);
    DatasetBuilder::new(config, media, cache)
        .build_from_csv_path(&split.records, &audio)
        .with_context(|| format!("building dataset from {}", split.records.display()))
}

fn cmd_build(args: BuildArgs) -> Result<()> {
    let video_source = if args.visual_features {
        VideoSource::FaceFeatures(args.params.to_params())
    } else {
        VideoSource::RawVideo
    };
    let dataset = load_dataset(&args.split, video_source)?;
    println!("{}", serde_json::to_string_pretty(&dataset_summary(&dataset))?);
    Ok(())
}

fn cmd_precompute(args: PrecomputeArgs) -> Result<()> {
    let params = args.params.to_params();
    let dataset = load_dataset(&args.split, VideoSource::FaceFeatures(params))?;

    let total = dataset.utterance_count();
    let computed = dataset
        .precompute_visual_features()
        .context("warming the visual-feature cache")?;

    let report = serde_json::json!({
        "dataset": dataset.name(),
        "cache_root": args.split.cache,
        "setting": params.setting_dir_name(),
        "utterances": total,
        "computed": computed,
        "hits": total - computed,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_inspect(args: InspectArgs) -> Result<()> {
    let video_source = if args.visual_features {
        VideoSource::FaceFeatures(args.params.to_params())
    } else {
        VideoSource::RawVideo
    };
    let dataset = load_dataset(&args.split, video_source)?;

    let Some(dialogue) = dataset.dialogue(args.index) else {
        bail!(
            "index {} out of range: dataset `{}` has {} dialogues",
            args.index,
            dataset.name(),
            dataset.len()
        );
    };
    let example = example_summary(dialogue, args.with_video)?;
    println!("{}", serde_json::to_string_pretty(&example)?);
    Ok(())
}
