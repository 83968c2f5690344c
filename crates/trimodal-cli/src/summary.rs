//! JSON summaries printed by the subcommands.

use anyhow::Result;
use serde_json::{json, Value};

use trimodal::{Dialogue, DialogueDataset, VideoSource};

/// Whole-dataset summary for `build`.
pub(crate) fn dataset_summary(dataset: &DialogueDataset) -> Value {
    json!({
        "name": dataset.name(),
        "root_dir": dataset.root_dir(),
        "dialogues": dataset.len(),
        "utterances": dataset.utterance_count(),
        "audio_fallbacks": dataset.audio_fallback_count(),
        "speakers": dataset.speaker_mapping(),
        "emotions": dataset.emotions().as_map(),
        "sentiments": dataset.sentiment_mapping(),
    })
}

/// One-example summary for `inspect`. With `with_video` the video modality is
/// materialized too, which decodes video or reads the feature cache.
pub(crate) fn example_summary(dialogue: &Dialogue, with_video: bool) -> Result<Value> {
    let labels = dialogue.labels();
    let audio_shapes: Vec<Value> = dialogue
        .audios()
        .iter()
        .map(|a| json!({ "filterbank": a.filterbank.dim(), "mfcc": a.mfcc.dim() }))
        .collect();

    let mut example = json!({
        "dialogue_id": dialogue.dialogue_id,
        "utterances": dialogue.len(),
        "transcripts": dialogue.transcripts(),
        "speakers": dialogue.speakers(),
        "emotions": labels.emotions,
        "sentiments": labels.sentiments,
        "audio_shapes": audio_shapes,
    });

    if with_video {
        let shapes: Vec<Value> = match dialogue.video_source() {
            VideoSource::RawVideo => dialogue
                .videos()?
                .iter()
                .map(|v| json!(v.dim()))
                .collect(),
            VideoSource::FaceFeatures(_) => dialogue
                .visual_features()?
                .iter()
                .map(|f| json!(f.dim()))
                .collect(),
        };
        example["video_shapes"] = Value::Array(shapes);
    }

    Ok(example)
}
