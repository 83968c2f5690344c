//! Deterministic stub media collaborators.
//!
//! Selected for `cfg(test)` automatically and for dependent crates via the
//! `stub-media` feature, so test suites run without real video assets or a
//! face-detection model. `StubDecoder` additionally counts its invocations,
//! which lets tests assert that a cache hit performs no decode.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array4, Array5};

use crate::error::Result;
use crate::media::{
    ExtractionParams, FaceFeatureExtractor, FaceTensor, VideoDecoder, VideoTensor,
};

/// Deterministic byte derived from the hash of `seed` and an index.
fn deterministic_byte(seed: &str, index: usize) -> u8 {
    let mut hasher = DefaultHasher::new();
    seed.hash(&mut hasher);
    index.hash(&mut hasher);
    (hasher.finish() & 0xff) as u8
}

/// Fake decoder producing small hash-seeded frame tensors.
pub struct StubDecoder {
    frame_count: usize,
    height: usize,
    width: usize,
    calls: AtomicUsize,
}

impl StubDecoder {
    pub fn new(frame_count: usize, height: usize, width: usize) -> Self {
        StubDecoder {
            frame_count,
            height,
            width,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of `decode` invocations so far.
    pub fn decode_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VideoDecoder for StubDecoder {
    fn decode(&self, path: &Path) -> Result<VideoTensor> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let seed = path.to_string_lossy().into_owned();
        let (h, w) = (self.height, self.width);
        let frames = Array4::from_shape_fn((self.frame_count, h, w, 3), |(f, y, x, c)| {
            deterministic_byte(&seed, ((f * h + y) * w + x) * 3 + c)
        });
        Ok(frames)
    }
}

/// Fake extractor: reduces frames into the feature shape by wrapping indices,
/// offset per person slot so slots differ deterministically.
#[derive(Debug, Default)]
pub struct StubExtractor;

impl FaceFeatureExtractor for StubExtractor {
    fn extract(&self, frames: &VideoTensor, params: &ExtractionParams) -> Result<FaceTensor> {
        let (frame_count, height, width, _) = frames.dim();
        let rate = params.sampling_rate.max(1);
        let sampled: Vec<usize> = (0..frame_count).step_by(rate).collect();
        let size = params.output_size;

        let out = Array5::from_shape_fn(
            (sampled.len(), params.max_persons, size, size, 3),
            |(si, person, y, x, c)| {
                if height == 0 || width == 0 {
                    return 0;
                }
                let fi = sampled[si];
                frames[[fi, y % height, x % width, c]].wrapping_add(person as u8)
            },
        );
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_stub_decoder_is_deterministic_per_path() {
        let decoder = StubDecoder::new(4, 6, 6);
        let path = PathBuf::from("dia0_utt0.mp4");
        let a = decoder.decode(&path).unwrap();
        let b = decoder.decode(&path).unwrap();
        assert_eq!(a, b);
        assert_eq!(decoder.decode_calls(), 2);

        let c = decoder.decode(&PathBuf::from("dia0_utt1.mp4")).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_stub_extractor_shape_and_determinism() {
        let decoder = StubDecoder::new(8, 5, 5);
        let frames = decoder.decode(&PathBuf::from("x.mp4")).unwrap();
        let params = ExtractionParams {
            max_persons: 2,
            output_size: 8,
            sampling_rate: 4,
        };
        let a = StubExtractor.extract(&frames, &params).unwrap();
        let b = StubExtractor.extract(&frames, &params).unwrap();
        assert_eq!(a.dim(), (2, 2, 8, 8, 3));
        assert_eq!(a, b);
    }
}
