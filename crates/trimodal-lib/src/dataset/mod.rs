//! Dataset materialization: tabular ingestion, audio-embedding join,
//! dialogue grouping and the indexed access surface consumed by a batching
//! layer.
//!
//! Construction is pure in-memory work; all disk I/O (video decode, feature
//! extraction, cache reads/writes) is deferred to the per-utterance lazy
//! accessors.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::cache::FeatureCache;
use crate::error::{DatasetError, Result};
use crate::media::{MediaStack, VideoTensor};
use crate::model::audio::AudioEmbedding;
use crate::model::dialogue::{Dialogue, DialogueInputs, DialogueLabels, VideoSource};
use crate::model::utterance::Utterance;

pub mod tabular;

use tabular::UtteranceRecord;

/// One training example: `(inputs, labels)`.
pub type Example = (DialogueInputs, DialogueLabels);

/// The fixed 7-class emotion mapping (frame-attention-network convention).
pub const EMOTION_CLASSES: [(&str, u32); 7] = [
    ("joy", 0),
    ("anger", 1),
    ("disgust", 2),
    ("fear", 3),
    ("sadness", 4),
    ("neutral", 5),
    ("surprise", 6),
];

/// Immutable emotion-name -> id table owned by the dataset configuration.
///
/// Rows carrying an emotion outside this table abort the build with
/// `UnknownLabel`; the table is never derived from the data.
#[derive(Clone, Debug)]
pub struct EmotionTable {
    by_name: HashMap<String, u32>,
}

impl Default for EmotionTable {
    fn default() -> Self {
        EmotionTable {
            by_name: EMOTION_CLASSES
                .iter()
                .map(|&(name, id)| (name.to_string(), id))
                .collect(),
        }
    }
}

impl EmotionTable {
    pub fn id(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// Name -> id view in deterministic order, for summaries.
    pub fn as_map(&self) -> BTreeMap<String, u32> {
        self.by_name
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

/// Configuration of one dataset split.
#[derive(Clone, Debug)]
pub struct DatasetConfig {
    /// Split name; namespaces this dataset's cache entries.
    pub name: String,
    /// Directory the `dia{d}_utt{u}.mp4` files live under.
    pub root_dir: PathBuf,
    /// What the video slot of each example carries.
    pub video_source: VideoSource,
    pub emotions: EmotionTable,
}

impl DatasetConfig {
    pub fn new(name: impl Into<String>, root_dir: impl Into<PathBuf>) -> Self {
        DatasetConfig {
            name: name.into(),
            root_dir: root_dir.into(),
            video_source: VideoSource::RawVideo,
            emotions: EmotionTable::default(),
        }
    }

    pub fn with_video_source(mut self, video_source: VideoSource) -> Self {
        self.video_source = video_source;
        self
    }
}

/// Externally supplied mapping from `"{dialogue_id}_{utterance_id}"` to an
/// audio embedding pair.
#[derive(Clone, Debug, Default)]
pub struct AudioTable {
    entries: HashMap<String, AudioEmbedding>,
}

impl AudioTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Composite lookup key for one utterance.
    pub fn key(dialogue_id: i64, utterance_id: i64) -> String {
        format!("{dialogue_id}_{utterance_id}")
    }

    pub fn insert(&mut self, dialogue_id: i64, utterance_id: i64, embedding: AudioEmbedding) {
        self.entries
            .insert(Self::key(dialogue_id, utterance_id), embedding);
    }

    /// Insert under a pre-formatted composite key (used by table loaders).
    pub fn insert_keyed(&mut self, key: impl Into<String>, embedding: AudioEmbedding) {
        self.entries.insert(key.into(), embedding);
    }

    pub fn get(&self, dialogue_id: i64, utterance_id: i64) -> Option<&AudioEmbedding> {
        self.entries.get(&Self::key(dialogue_id, utterance_id))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AudioEmbedding)> {
        self.entries.iter()
    }
}

/// Builds `DialogueDataset`s from parsed records and an audio table.
pub struct DatasetBuilder {
    config: DatasetConfig,
    media: MediaStack,
    cache: Arc<dyn FeatureCache>,
}

impl DatasetBuilder {
    pub fn new(config: DatasetConfig, media: MediaStack, cache: Arc<dyn FeatureCache>) -> Self {
        DatasetBuilder {
            config,
            media,
            cache,
        }
    }

    /// Read and parse a CSV split file, then build.
    pub fn build_from_csv_path(&self, path: &Path, audio: &AudioTable) -> Result<DialogueDataset> {
        let text = std::fs::read_to_string(path).map_err(|e| DatasetError::TableIo {
            path: path.to_path_buf(),
            source: e,
        })?;
        let records = tabular::parse_records(&text)?;
        self.build(&records, audio)
    }

    /// Assemble the dataset.
    ///
    /// Structural failures (unknown emotion) abort the whole build; a missing
    /// audio-embedding key is substituted with the zero-default pair, counted
    /// and logged, never fatal.
    pub fn build(&self, records: &[UtteranceRecord], audio: &AudioTable) -> Result<DialogueDataset> {
        // Distinct names are sorted before id assignment so the maps are
        // stable across runs regardless of input row order.
        let speaker_mapping = enumerate_sorted(records.iter().map(|r| r.speaker.as_str()));
        let sentiment_mapping = enumerate_sorted(records.iter().map(|r| r.sentiment.as_str()));

        let mut order: Vec<i64> = Vec::new();
        let mut groups: HashMap<i64, Vec<Utterance>> = HashMap::new();
        let mut audio_fallbacks = 0usize;

        for record in records {
            let emotion =
                self.config
                    .emotions
                    .id(&record.emotion)
                    .ok_or_else(|| DatasetError::UnknownLabel {
                        label: record.emotion.clone(),
                        line: record.line,
                    })?;

            let audio_embedding = match audio.get(record.dialogue_id, record.utterance_id) {
                Some(embedding) => embedding.clone(),
                None => {
                    warn!(
                        dialogue_id = record.dialogue_id,
                        utterance_id = record.utterance_id,
                        "no audio embedding for utterance, substituting zero default"
                    );
                    audio_fallbacks += 1;
                    AudioEmbedding::zeros()
                }
            };

            let utterance = Utterance {
                dialogue_id: record.dialogue_id,
                utterance_id: record.utterance_id,
                transcript: record.transcript.clone(),
                speaker: speaker_mapping[&record.speaker],
                emotion,
                sentiment: sentiment_mapping[&record.sentiment],
                file_path: self
                    .config
                    .root_dir
                    .join(format!("dia{}_utt{}.mp4", record.dialogue_id, record.utterance_id)),
                audio: audio_embedding,
                dataset_name: self.config.name.clone(),
            };

            groups
                .entry(record.dialogue_id)
                .or_insert_with(|| {
                    order.push(record.dialogue_id);
                    Vec::new()
                })
                .push(utterance);
        }

        let mut dialogues = Vec::with_capacity(order.len());
        for dialogue_id in order {
            let mut utterances = groups.remove(&dialogue_id).expect("grouped above");
            // Sort before constructing the dialogue: the speaker remap is
            // derived from traversal order.
            utterances.sort_by_key(|u| u.utterance_id);
            dialogues.push(Dialogue::new(
                dialogue_id,
                utterances,
                self.config.video_source,
                self.media.clone(),
                self.cache.clone(),
            ));
        }

        info!(
            name = %self.config.name,
            dialogues = dialogues.len(),
            utterances = records.len(),
            audio_fallbacks,
            "built dataset"
        );

        Ok(DialogueDataset {
            name: self.config.name.clone(),
            root_dir: self.config.root_dir.clone(),
            dialogues,
            speaker_mapping,
            emotions: self.config.emotions.clone(),
            sentiment_mapping,
            audio_fallbacks,
            media: self.media.clone(),
            cache: self.cache.clone(),
        })
    }
}

/// Sorted distinct values -> dense 0-based ids.
fn enumerate_sorted<'a>(values: impl Iterator<Item = &'a str>) -> BTreeMap<String, u32> {
    values
        .collect::<BTreeSet<_>>()
        .into_iter()
        .enumerate()
        .map(|(id, name)| (name.to_string(), id as u32))
        .collect()
}

/// Indexed collection of dialogues exposed to the batching/loading layer.
///
/// `get` materializes one example; a failing `get` for one index leaves every
/// other index intact.
pub struct DialogueDataset {
    name: String,
    root_dir: PathBuf,
    dialogues: Vec<Dialogue>,
    speaker_mapping: BTreeMap<String, u32>,
    emotions: EmotionTable,
    sentiment_mapping: BTreeMap<String, u32>,
    audio_fallbacks: usize,
    media: MediaStack,
    cache: Arc<dyn FeatureCache>,
}

impl std::fmt::Debug for DialogueDataset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueDataset")
            .field("name", &self.name)
            .field("root_dir", &self.root_dir)
            .field("dialogues", &self.dialogues.len())
            .field("speaker_mapping", &self.speaker_mapping)
            .field("emotions", &self.emotions)
            .field("sentiment_mapping", &self.sentiment_mapping)
            .field("audio_fallbacks", &self.audio_fallbacks)
            .finish_non_exhaustive()
    }
}

impl DialogueDataset {
    /// Number of dialogues.
    pub fn len(&self) -> usize {
        self.dialogues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dialogues.is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    /// Materialize example `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= len()`; the upward contract is `len()`-bounded
    /// iteration. Use [`DialogueDataset::dialogue`] for checked access.
    pub fn get(&self, index: usize) -> Result<Example> {
        self.dialogues[index].data()
    }

    pub fn dialogue(&self, index: usize) -> Option<&Dialogue> {
        self.dialogues.get(index)
    }

    pub fn dialogues(&self) -> &[Dialogue] {
        &self.dialogues
    }

    pub fn utterance_count(&self) -> usize {
        self.dialogues.iter().map(Dialogue::len).sum()
    }

    /// Direct-load debugging accessor: transcripts of one dialogue.
    pub fn load_transcript(&self, index: usize) -> Vec<String> {
        self.dialogues[index].transcripts()
    }

    /// Direct-load debugging accessor: audio pairs of one dialogue.
    pub fn load_audio(&self, index: usize) -> Vec<AudioEmbedding> {
        self.dialogues[index].audios()
    }

    /// Direct-load debugging accessor: raw videos of one dialogue.
    pub fn load_video(&self, index: usize) -> Result<Vec<VideoTensor>> {
        self.dialogues[index].videos()
    }

    pub fn speaker_mapping(&self) -> &BTreeMap<String, u32> {
        &self.speaker_mapping
    }

    pub fn emotions(&self) -> &EmotionTable {
        &self.emotions
    }

    pub fn sentiment_mapping(&self) -> &BTreeMap<String, u32> {
        &self.sentiment_mapping
    }

    /// How many utterances fell back to the zero-default audio pair during
    /// the build. Silent substitution can mask data-quality problems; callers
    /// should surface this number.
    pub fn audio_fallback_count(&self) -> usize {
        self.audio_fallbacks
    }

    /// Warm the visual-feature cache for every utterance, fanning out across
    /// dialogues. Per-utterance work stays inline on its worker. Returns how
    /// many entries were computed fresh (the rest were hits).
    pub fn precompute_visual_features(&self) -> Result<usize> {
        let computed = AtomicUsize::new(0);
        self.dialogues.par_iter().try_for_each(|dialogue| -> Result<()> {
            let params = dialogue.extraction_params();
            for utterance in dialogue.utterances() {
                let key = utterance.feature_key(params);
                self.cache.get_or_compute(&key, &mut || {
                    computed.fetch_add(1, Ordering::Relaxed);
                    let frames = self.media.decoder.decode(&utterance.file_path)?;
                    self.media.extractor.extract(&frames, &params)
                })?;
            }
            Ok(())
        })?;
        Ok(computed.load(Ordering::Relaxed))
    }
}
