//! Media collaborator interfaces: video decoding and face-feature extraction.
//!
//! The dataset core treats both as black boxes behind traits so that tests
//! can substitute deterministic stubs and production code can plug in a real
//! detector. `FfmpegDecoder` is the shipped decoder; `FrameSampler` is a
//! detector-less baseline extractor.

use std::path::Path;
use std::sync::Arc;

use ndarray::{Array4, Array5};
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub mod ffmpeg;
pub mod sampler;

#[cfg(any(test, feature = "stub-media"))]
pub mod stub;

/// Decoded video: `(frames, height, width, 3)`, RGB byte samples.
pub type VideoTensor = Array4<u8>;

/// Extracted visual features: `(sampled_frames, max_persons, output_size,
/// output_size, 3)`, byte samples. Person slots with no detection are
/// zero-filled.
pub type FaceTensor = Array5<u8>;

/// Parameters of one face-feature extraction setting.
///
/// Distinct parameter tuples map to distinct cache subdirectories; identical
/// tuples always map to the same one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionParams {
    /// Maximum number of person slots in the output tensor.
    pub max_persons: usize,
    /// Side length each face crop is resized to.
    pub output_size: usize,
    /// Keep every `sampling_rate`-th decoded frame.
    pub sampling_rate: usize,
}

impl Default for ExtractionParams {
    fn default() -> Self {
        ExtractionParams {
            max_persons: 7,
            output_size: 224,
            sampling_rate: 30,
        }
    }
}

impl ExtractionParams {
    /// Directory name encoding this parameter tuple, e.g.
    /// `persons_7_rate_30_size_224`.
    pub fn setting_dir_name(&self) -> String {
        format!(
            "persons_{}_rate_{}_size_{}",
            self.max_persons, self.sampling_rate, self.output_size
        )
    }
}

/// Video decoder collaborator: file path in, dense frame tensor out.
pub trait VideoDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<VideoTensor>;
}

/// Face-feature extractor collaborator: frame tensor in, fixed-shape feature
/// tensor out.
pub trait FaceFeatureExtractor: Send + Sync {
    fn extract(&self, frames: &VideoTensor, params: &ExtractionParams) -> Result<FaceTensor>;
}

/// The pair of media collaborators threaded through the dataset into each
/// dialogue at construction time.
#[derive(Clone)]
pub struct MediaStack {
    pub decoder: Arc<dyn VideoDecoder>,
    pub extractor: Arc<dyn FaceFeatureExtractor>,
}

impl MediaStack {
    pub fn new(decoder: Arc<dyn VideoDecoder>, extractor: Arc<dyn FaceFeatureExtractor>) -> Self {
        MediaStack { decoder, extractor }
    }
}
