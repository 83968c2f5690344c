//! End-to-end tests: tabular records -> dataset -> lazily materialized
//! examples, with deterministic in-test media collaborators and real disk
//! caches under temporary roots.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array4, Array5};
use trimodal::dataset::tabular::UtteranceRecord;
use trimodal::{
    AudioEmbedding, AudioTable, DatasetBuilder, DatasetConfig, DatasetError, DiskFeatureCache,
    ExtractionParams, FaceFeatureExtractor, FaceTensor, FeatureCache, MediaStack,
    MemoryFeatureCache, VideoDecoder, VideoModality, VideoSource, VideoTensor,
};

/// Deterministic decoder that counts invocations and can be told to fail for
/// one specific file name.
struct CountingDecoder {
    frames: usize,
    height: usize,
    width: usize,
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl CountingDecoder {
    fn new(frames: usize, height: usize, width: usize) -> Self {
        CountingDecoder {
            frames,
            height,
            width,
            fail_on: None,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing_on(mut self, file_name: &str) -> Self {
        self.fail_on = Some(file_name.to_string());
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VideoDecoder for CountingDecoder {
    fn decode(&self, path: &Path) -> trimodal::Result<VideoTensor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if self.fail_on.as_deref() == Some(name.as_str()) {
            return Err(DatasetError::VideoDecode {
                path: path.to_path_buf(),
                message: "simulated decode failure".to_string(),
            });
        }
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        let seed = (hasher.finish() & 0xff) as u8;
        Ok(Array4::from_shape_fn(
            (self.frames, self.height, self.width, 3),
            |(f, y, x, c)| seed.wrapping_add((f + y * 3 + x * 5 + c) as u8),
        ))
    }
}

/// Deterministic extractor: wraps frame pixels into the feature shape.
struct TinyExtractor;

impl FaceFeatureExtractor for TinyExtractor {
    fn extract(
        &self,
        frames: &VideoTensor,
        params: &ExtractionParams,
    ) -> trimodal::Result<FaceTensor> {
        let (frame_count, height, width, _) = frames.dim();
        let sampled: Vec<usize> = (0..frame_count).step_by(params.sampling_rate.max(1)).collect();
        let size = params.output_size;
        Ok(Array5::from_shape_fn(
            (sampled.len(), params.max_persons, size, size, 3),
            |(si, person, y, x, c)| {
                frames[[sampled[si], y % height, x % width, c]].wrapping_add(person as u8)
            },
        ))
    }
}

fn record(
    dialogue_id: i64,
    utterance_id: i64,
    speaker: &str,
    emotion: &str,
    sentiment: &str,
) -> UtteranceRecord {
    UtteranceRecord {
        transcript: format!("dia {dialogue_id} utt {utterance_id}"),
        speaker: speaker.to_string(),
        emotion: emotion.to_string(),
        sentiment: sentiment.to_string(),
        dialogue_id,
        utterance_id,
        line: (utterance_id + 2) as usize,
    }
}

fn tiny_params() -> ExtractionParams {
    ExtractionParams {
        max_persons: 2,
        output_size: 4,
        sampling_rate: 2,
    }
}

fn builder_with(
    decoder: Arc<CountingDecoder>,
    cache: Arc<dyn FeatureCache>,
    video_source: VideoSource,
) -> DatasetBuilder {
    let media = MediaStack::new(decoder, Arc::new(TinyExtractor));
    DatasetBuilder::new(
        DatasetConfig::new("train", "/data/videos").with_video_source(video_source),
        media,
        cache,
    )
}

/// The canonical scenario: two rows for dialogue 1, one for dialogue 2, with
/// speaker B appearing in both dialogues under different local ids.
fn scenario_records() -> Vec<UtteranceRecord> {
    vec![
        record(1, 0, "A", "joy", "positive"),
        record(1, 1, "B", "neutral", "neutral"),
        record(2, 0, "B", "anger", "negative"),
    ]
}

#[test]
fn test_end_to_end_two_dialogue_scenario() {
    let decoder = Arc::new(CountingDecoder::new(4, 3, 3));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::FaceFeatures(tiny_params()),
    );
    let dataset = builder.build(&scenario_records(), &AudioTable::new()).unwrap();

    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.utterance_count(), 3);

    let dialogue1 = dataset.dialogue(0).unwrap();
    let dialogue2 = dataset.dialogue(1).unwrap();
    assert_eq!(dialogue1.speakers(), vec![0, 1]);
    // B is locally 0 in dialogue 2 despite its different global id:
    // reparameterization is independent per dialogue.
    assert_eq!(dialogue2.speakers(), vec![0]);

    let (inputs, labels) = dataset.get(0).unwrap();
    assert_eq!(inputs.transcripts, vec!["dia 1 utt 0", "dia 1 utt 1"]);
    assert_eq!(inputs.speakers, vec![0, 1]);
    assert_eq!(labels.emotions, vec![0, 5]); // joy, neutral
    match inputs.video {
        VideoModality::Faces(faces) => {
            assert_eq!(faces.len(), 2);
            // 4 frames sampled at rate 2 -> 2 samples.
            assert_eq!(faces[0].dim(), (2, 2, 4, 4, 3));
        }
        VideoModality::Raw(_) => panic!("expected face features"),
    }

    let (_, labels2) = dataset.get(1).unwrap();
    assert_eq!(labels2.emotions, vec![1]); // anger
}

#[test]
fn test_emotion_ids_stay_within_fixed_table_range() {
    let decoder = Arc::new(CountingDecoder::new(2, 2, 2));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );
    let records = vec![
        record(0, 0, "A", "joy", "positive"),
        record(0, 1, "B", "disgust", "negative"),
        record(0, 2, "C", "surprise", "positive"),
        record(1, 0, "A", "fear", "negative"),
        record(1, 1, "B", "sadness", "negative"),
    ];
    let dataset = builder.build(&records, &AudioTable::new()).unwrap();
    for dialogue in dataset.dialogues() {
        let labels = dialogue.labels();
        assert!(labels.emotions.iter().all(|&e| e <= 6));
    }
}

#[test]
fn test_missing_audio_key_substitutes_zero_default() {
    let decoder = Arc::new(CountingDecoder::new(2, 2, 2));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );

    let mut audio = AudioTable::new();
    audio.insert(
        1,
        0,
        AudioEmbedding::new(
            ndarray::Array2::from_elem((128, 1), 1.5),
            ndarray::Array2::from_elem((20, 1), -2.0),
        ),
    );
    // Key "1_1" and "2_0" are absent.
    let dataset = builder.build(&scenario_records(), &audio).unwrap();
    assert_eq!(dataset.audio_fallback_count(), 2);

    let audios = dataset.load_audio(0);
    assert_eq!(audios[0].filterbank[[0, 0]], 1.5);
    assert_eq!(audios[1], AudioEmbedding::zeros());
    assert_eq!(audios[1].filterbank.dim(), (128, 1));
    assert_eq!(audios[1].mfcc.dim(), (20, 1));
}

#[test]
fn test_unknown_emotion_aborts_the_build() {
    let decoder = Arc::new(CountingDecoder::new(2, 2, 2));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );
    let records = vec![
        record(0, 0, "A", "joy", "positive"),
        record(0, 1, "B", "confused", "neutral"),
    ];
    let err = builder.build(&records, &AudioTable::new()).unwrap_err();
    match err {
        DatasetError::UnknownLabel { label, line } => {
            assert_eq!(label, "confused");
            assert_eq!(line, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_visual_features_second_access_is_pure_cache_hit() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = Arc::new(CountingDecoder::new(6, 3, 3));
    let builder = builder_with(
        decoder.clone(),
        Arc::new(DiskFeatureCache::new(dir.path())),
        VideoSource::FaceFeatures(tiny_params()),
    );
    let dataset = builder.build(&scenario_records(), &AudioTable::new()).unwrap();

    let first = dataset.dialogue(0).unwrap().visual_features().unwrap();
    assert_eq!(decoder.calls(), 2);

    // Bit-identical result, and no further decode or extraction.
    let second = dataset.dialogue(0).unwrap().visual_features().unwrap();
    assert_eq!(decoder.calls(), 2);
    assert_eq!(first, second);
}

#[test]
fn test_cache_persists_across_dataset_instances() {
    let dir = tempfile::tempdir().unwrap();
    let records = scenario_records();

    let decoder1 = Arc::new(CountingDecoder::new(6, 3, 3));
    let builder1 = builder_with(
        decoder1.clone(),
        Arc::new(DiskFeatureCache::new(dir.path())),
        VideoSource::FaceFeatures(tiny_params()),
    );
    let dataset1 = builder1.build(&records, &AudioTable::new()).unwrap();
    let first = dataset1.dialogue(1).unwrap().visual_features().unwrap();
    assert_eq!(decoder1.calls(), 1);

    // Fresh builder + decoder over the same cache root: the read-back equals
    // the originally computed tensor with no decode at all.
    let decoder2 = Arc::new(CountingDecoder::new(6, 3, 3));
    let builder2 = builder_with(
        decoder2.clone(),
        Arc::new(DiskFeatureCache::new(dir.path())),
        VideoSource::FaceFeatures(tiny_params()),
    );
    let dataset2 = builder2.build(&records, &AudioTable::new()).unwrap();
    let reread = dataset2.dialogue(1).unwrap().visual_features().unwrap();
    assert_eq!(decoder2.calls(), 0);
    assert_eq!(first, reread);
}

#[test]
fn test_precompute_warms_every_entry_once() {
    let dir = tempfile::tempdir().unwrap();
    let decoder = Arc::new(CountingDecoder::new(4, 3, 3));
    let builder = builder_with(
        decoder.clone(),
        Arc::new(DiskFeatureCache::new(dir.path())),
        VideoSource::FaceFeatures(tiny_params()),
    );
    let dataset = builder.build(&scenario_records(), &AudioTable::new()).unwrap();

    assert_eq!(dataset.precompute_visual_features().unwrap(), 3);
    assert_eq!(decoder.calls(), 3);

    // Everything is warm now: re-running computes nothing, and example
    // materialization decodes nothing.
    assert_eq!(dataset.precompute_visual_features().unwrap(), 0);
    dataset.get(0).unwrap();
    dataset.get(1).unwrap();
    assert_eq!(decoder.calls(), 3);
}

#[test]
fn test_failing_dialogue_leaves_other_indices_usable() {
    let decoder = Arc::new(CountingDecoder::new(4, 3, 3).failing_on("dia1_utt1.mp4"));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::FaceFeatures(tiny_params()),
    );
    let dataset = builder.build(&scenario_records(), &AudioTable::new()).unwrap();

    let err = dataset.get(0).unwrap_err();
    match err {
        DatasetError::FeatureCompute {
            dialogue_id,
            utterance_id,
            source,
        } => {
            assert_eq!((dialogue_id, utterance_id), (1, 1));
            assert!(matches!(*source, DatasetError::VideoDecode { .. }));
        }
        other => panic!("unexpected error: {other}"),
    }

    // Dialogue 2 is unaffected.
    assert!(dataset.get(1).is_ok());
}

#[test]
fn test_speaker_mapping_is_sorted_regardless_of_row_order() {
    let decoder = Arc::new(CountingDecoder::new(2, 2, 2));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );
    let records = vec![
        record(0, 0, "Rachel", "joy", "positive"),
        record(0, 1, "Chandler", "neutral", "neutral"),
        record(1, 0, "Monica", "anger", "negative"),
    ];
    let dataset = builder.build(&records, &AudioTable::new()).unwrap();

    let names: Vec<&str> = dataset
        .speaker_mapping()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(names, vec!["Chandler", "Monica", "Rachel"]);
    let ids: Vec<u32> = dataset.speaker_mapping().values().copied().collect();
    assert_eq!(ids, vec![0, 1, 2]);
}

#[test]
fn test_video_paths_follow_naming_template() {
    let decoder = Arc::new(CountingDecoder::new(2, 2, 2));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );
    let dataset = builder.build(&scenario_records(), &AudioTable::new()).unwrap();
    let utterance = &dataset.dialogue(1).unwrap().utterances()[0];
    assert_eq!(
        utterance.file_path,
        PathBuf::from("/data/videos/dia2_utt0.mp4")
    );
}

#[test]
fn test_build_from_csv_path() {
    let dir = tempfile::tempdir().unwrap();
    let csv_path = dir.path().join("train_sent_emo.csv");
    std::fs::write(
        &csv_path,
        "Sr No.,Utterance,Speaker,Emotion,Sentiment,Dialogue_ID,Utterance_ID\n\
         1,\"Hello, there!\",A,joy,positive,1,0\n\
         2,Hi.,B,neutral,neutral,1,1\n\
         3,What?!,B,anger,negative,2,0\n",
    )
    .unwrap();

    let decoder = Arc::new(CountingDecoder::new(2, 2, 2));
    let builder = builder_with(
        decoder,
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );
    let dataset = builder
        .build_from_csv_path(&csv_path, &AudioTable::new())
        .unwrap();

    assert_eq!(dataset.len(), 2);
    assert_eq!(dataset.load_transcript(0), vec!["Hello, there!", "Hi."]);
    assert_eq!(dataset.dialogue(1).unwrap().speakers(), vec![0]);
}

#[test]
fn test_raw_video_source_decodes_per_call() {
    let decoder = Arc::new(CountingDecoder::new(3, 2, 2));
    let builder = builder_with(
        decoder.clone(),
        Arc::new(MemoryFeatureCache::new()),
        VideoSource::RawVideo,
    );
    let dataset = builder.build(&scenario_records(), &AudioTable::new()).unwrap();

    let (inputs, _) = dataset.get(1).unwrap();
    match inputs.video {
        VideoModality::Raw(videos) => {
            assert_eq!(videos.len(), 1);
            assert_eq!(videos[0].dim(), (3, 2, 2, 3));
        }
        VideoModality::Faces(_) => panic!("expected raw video"),
    }
    assert_eq!(decoder.calls(), 1);

    // Raw video is deliberately uncached: a second materialization re-decodes.
    dataset.get(1).unwrap();
    assert_eq!(decoder.calls(), 2);
}
