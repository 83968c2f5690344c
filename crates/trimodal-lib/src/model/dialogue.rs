use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::FeatureCache;
use crate::error::Result;
use crate::media::{ExtractionParams, FaceTensor, MediaStack, VideoTensor};
use crate::model::audio::AudioEmbedding;
use crate::model::utterance::Utterance;

/// What the "video" slot of a dialogue's inputs carries. Resolved once at
/// construction, not re-checked per call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoSource {
    /// Raw decoded frame tensors.
    RawVideo,
    /// Cached face-feature tensors extracted under these parameters.
    FaceFeatures(ExtractionParams),
}

/// Video modality of one assembled example.
#[derive(Clone, Debug)]
pub enum VideoModality {
    Raw(Vec<VideoTensor>),
    Faces(Vec<FaceTensor>),
}

/// Per-utterance inputs of one example, dialogue order throughout.
#[derive(Clone, Debug)]
pub struct DialogueInputs {
    pub transcripts: Vec<String>,
    pub video: VideoModality,
    pub audio: Vec<AudioEmbedding>,
    /// Dialogue-local speaker ids.
    pub speakers: Vec<u32>,
}

/// Per-utterance labels of one example.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DialogueLabels {
    pub emotions: Vec<u32>,
    pub sentiments: Vec<u32>,
}

/// Ordered group of utterances sharing one conversation.
///
/// Owns the speaker reparameterization: global speaker ids are renumbered to
/// a compact 0-based range scoped to this dialogue, assigned in order of
/// first appearance over the utterance sequence.
pub struct Dialogue {
    pub dialogue_id: i64,
    utterances: Vec<Utterance>,
    /// Global speaker id -> dialogue-local id; total over the speakers
    /// appearing in this dialogue, values exactly `{0..k-1}`.
    speaker_map: HashMap<u32, u32>,
    video_source: VideoSource,
    media: MediaStack,
    cache: Arc<dyn FeatureCache>,
}

impl Dialogue {
    /// `utterances` must already be sorted by `utterance_id`: the speaker
    /// remap depends on traversal order.
    pub(crate) fn new(
        dialogue_id: i64,
        utterances: Vec<Utterance>,
        video_source: VideoSource,
        media: MediaStack,
        cache: Arc<dyn FeatureCache>,
    ) -> Self {
        let speaker_map = reparameterize_speakers(&utterances);
        debug!(
            dialogue_id,
            utterances = utterances.len(),
            speakers = speaker_map.len(),
            "constructed dialogue"
        );
        Dialogue {
            dialogue_id,
            utterances,
            speaker_map,
            video_source,
            media,
            cache,
        }
    }

    pub fn utterances(&self) -> &[Utterance] {
        &self.utterances
    }

    pub fn len(&self) -> usize {
        self.utterances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.utterances.is_empty()
    }

    pub fn video_source(&self) -> VideoSource {
        self.video_source
    }

    pub fn speaker_map(&self) -> &HashMap<u32, u32> {
        &self.speaker_map
    }

    /// Extraction parameters in effect for `visual_features`.
    pub fn extraction_params(&self) -> ExtractionParams {
        match self.video_source {
            VideoSource::FaceFeatures(params) => params,
            VideoSource::RawVideo => ExtractionParams::default(),
        }
    }

    /// One transcript per utterance.
    pub fn transcripts(&self) -> Vec<String> {
        self.utterances
            .iter()
            .map(|u| u.transcript().to_string())
            .collect()
    }

    /// Raw decoded videos, one per utterance. Expensive and uncached.
    pub fn videos(&self) -> Result<Vec<VideoTensor>> {
        self.utterances
            .iter()
            .map(|u| u.load_video(self.media.decoder.as_ref()))
            .collect()
    }

    /// Cached visual features, one per utterance.
    pub fn visual_features(&self) -> Result<Vec<FaceTensor>> {
        let params = self.extraction_params();
        self.utterances
            .iter()
            .map(|u| u.cached_visual_features(&self.media, self.cache.as_ref(), params))
            .collect()
    }

    /// Stored audio embedding pairs, one per utterance. No I/O.
    pub fn audios(&self) -> Vec<AudioEmbedding> {
        self.utterances.iter().map(|u| u.audio.clone()).collect()
    }

    /// Dialogue-local speaker ids, one per utterance.
    pub fn speakers(&self) -> Vec<u32> {
        self.utterances
            .iter()
            .map(|u| self.speaker_map[&u.speaker])
            .collect()
    }

    /// `(emotion ids, sentiment ids)`, one of each per utterance.
    pub fn labels(&self) -> DialogueLabels {
        DialogueLabels {
            emotions: self.utterances.iter().map(|u| u.emotion).collect(),
            sentiments: self.utterances.iter().map(|u| u.sentiment).collect(),
        }
    }

    /// All inputs for one example; the video slot follows `video_source`.
    pub fn inputs(&self) -> Result<DialogueInputs> {
        let video = match self.video_source {
            VideoSource::RawVideo => VideoModality::Raw(self.videos()?),
            VideoSource::FaceFeatures(_) => VideoModality::Faces(self.visual_features()?),
        };
        Ok(DialogueInputs {
            transcripts: self.transcripts(),
            video,
            audio: self.audios(),
            speakers: self.speakers(),
        })
    }

    /// `(inputs, labels)` — the unit handed to the training loop.
    pub fn data(&self) -> Result<(DialogueInputs, DialogueLabels)> {
        Ok((self.inputs()?, self.labels()))
    }
}

/// First-appearance scan over the (sorted) utterance sequence: each newly
/// seen global speaker id gets the next local id starting at 0.
fn reparameterize_speakers(utterances: &[Utterance]) -> HashMap<u32, u32> {
    let mut map = HashMap::new();
    let mut next = 0u32;
    for utterance in utterances {
        map.entry(utterance.speaker).or_insert_with(|| {
            let id = next;
            next += 1;
            id
        });
    }
    map
}
