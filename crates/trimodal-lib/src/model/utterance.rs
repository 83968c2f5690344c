use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::cache::{FeatureCache, FeatureKey};
use crate::error::Result;
use crate::media::{ExtractionParams, FaceTensor, MediaStack, VideoDecoder, VideoTensor};
use crate::model::audio::AudioEmbedding;

/// One conversational turn in all three modalities.
///
/// Constructed once during dataset build and immutable afterwards; the only
/// external side effect tied to an utterance is a cache write keyed by its
/// identity fields, which never mutates the utterance itself.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Utterance {
    pub dialogue_id: i64,
    /// Unique within the owning dialogue; defines utterance order.
    pub utterance_id: i64,
    pub transcript: String,
    /// Global speaker id assigned by the dataset builder.
    pub speaker: u32,
    /// Emotion id from the fixed 7-class table.
    pub emotion: u32,
    pub sentiment: u32,
    /// Resolved video path, `dia{d}_utt{u}.mp4` under the dataset root.
    pub file_path: PathBuf,
    pub audio: AudioEmbedding,
    /// Dataset name namespacing this utterance's cache entries.
    pub dataset_name: String,
}

impl Utterance {
    /// Transcript text, passed through verbatim.
    // TODO: upstream CSVs still carry mojibake in some transcripts; treat as opaque text.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Globally-mapped speaker id.
    pub fn speaker(&self) -> u32 {
        self.speaker
    }

    /// `(emotion_id, sentiment_id)`.
    pub fn label(&self) -> (u32, u32) {
        (self.emotion, self.sentiment)
    }

    /// Decode the full video into `(frames, height, width, 3)`. Expensive and
    /// deliberately uncached: every call re-decodes.
    pub fn load_video(&self, decoder: &dyn VideoDecoder) -> Result<VideoTensor> {
        decoder.decode(&self.file_path)
    }

    /// Stored audio embedding pair; resolved at construction, no I/O.
    pub fn load_audio(&self) -> &AudioEmbedding {
        &self.audio
    }

    /// Cache key for this utterance under `params`.
    pub fn feature_key(&self, params: ExtractionParams) -> FeatureKey {
        FeatureKey {
            dataset: self.dataset_name.clone(),
            dialogue_id: self.dialogue_id,
            utterance_id: self.utterance_id,
            params,
        }
    }

    /// Visual features via the injected cache: on a miss this decodes the
    /// video and runs the extractor, then persists the result; on a hit it
    /// returns the stored tensor without touching either collaborator.
    pub fn cached_visual_features(
        &self,
        media: &MediaStack,
        cache: &dyn FeatureCache,
        params: ExtractionParams,
    ) -> Result<FaceTensor> {
        let key = self.feature_key(params);
        cache.get_or_compute(&key, &mut || {
            let frames = media.decoder.decode(&self.file_path)?;
            media.extractor.extract(&frames, &params)
        })
    }
}
