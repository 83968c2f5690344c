//! Library entry point for the multimodal dialogue dataset pipeline.
//!
//! This file re-exports the core types and provides helpers to persist and
//! restore the externally-produced audio-embedding table as JSON. The
//! helpers use internal, well-typed serialisable representations so the
//! persisted format can evolve without touching the model source files.

// Public modules
pub mod cache;
pub mod dataset;
pub mod error;
pub mod media;
pub mod model;

// Re-export primary types for ergonomic use.
pub use cache::{DiskFeatureCache, FeatureCache, FeatureKey, MemoryFeatureCache};
pub use dataset::{
    AudioTable, DatasetBuilder, DatasetConfig, DialogueDataset, EmotionTable, Example,
    EMOTION_CLASSES,
};
pub use error::{DatasetError, Result};
pub use media::{
    ExtractionParams, FaceFeatureExtractor, FaceTensor, MediaStack, VideoDecoder, VideoTensor,
};
pub use model::audio::AudioEmbedding;
pub use model::dialogue::{Dialogue, DialogueInputs, DialogueLabels, VideoModality, VideoSource};
pub use model::utterance::Utterance;

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Serializable representation of one audio-table entry.
///
/// Intentionally independent of [`AudioEmbedding`] so persistence can evolve
/// separately from the in-memory model: the two fixed-shape `(n, 1)` column
/// tensors are flattened to plain vectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableAudioEntry {
    /// Composite `"{dialogue_id}_{utterance_id}"` key.
    pub key: String,
    pub filterbank: Vec<f32>,
    pub mfcc: Vec<f32>,
}

/// Top-level serialisable audio-table container.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SerializableAudioTable {
    pub metadata: HashMap<String, String>,
    pub entries: Vec<SerializableAudioEntry>,
}

/// Save an [`AudioTable`] to a JSON file.
///
/// Entries are written in stable key order so the output is diffable.
pub fn save_audio_table_json(table: &AudioTable, path: &Path) -> Result<()> {
    let mut entries: Vec<SerializableAudioEntry> = table
        .iter()
        .map(|(key, embedding)| SerializableAudioEntry {
            key: key.clone(),
            filterbank: embedding.filterbank.iter().copied().collect(),
            mfcc: embedding.mfcc.iter().copied().collect(),
        })
        .collect();
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    let mut metadata = HashMap::new();
    metadata.insert("format_version".to_string(), "trimodal-audio-1".to_string());

    let serial = SerializableAudioTable { metadata, entries };

    let file = File::create(path).map_err(|e| DatasetError::TableIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    serde_json::to_writer(BufWriter::new(file), &serial).map_err(|e| DatasetError::TableCodec {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(())
}

/// Load an [`AudioTable`] from a JSON file previously written with
/// [`save_audio_table_json`].
///
/// Flattened vectors are restored as `(n, 1)` column tensors of whatever
/// length was persisted; shape policing is left to consumers that care.
pub fn load_audio_table_json(path: &Path) -> Result<AudioTable> {
    let file = File::open(path).map_err(|e| DatasetError::TableIo {
        path: path.to_path_buf(),
        source: e,
    })?;
    let serial: SerializableAudioTable =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| DatasetError::TableCodec {
            path: path.to_path_buf(),
            source: e,
        })?;

    let mut table = AudioTable::new();
    for entry in serial.entries {
        let filterbank_len = entry.filterbank.len();
        let mfcc_len = entry.mfcc.len();
        let embedding = AudioEmbedding::new(
            Array2::from_shape_vec((filterbank_len, 1), entry.filterbank)
                .expect("(n, 1) shape always holds n elements"),
            Array2::from_shape_vec((mfcc_len, 1), entry.mfcc)
                .expect("(n, 1) shape always holds n elements"),
        );
        table.insert_keyed(entry.key, embedding);
    }
    Ok(table)
}
