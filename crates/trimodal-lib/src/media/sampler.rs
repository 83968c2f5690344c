//! Detector-less baseline extractor.
//!
//! `FrameSampler` keeps every `sampling_rate`-th frame, nearest-neighbor
//! resizes the full frame into person slot 0 and leaves the remaining slots
//! zero-filled. A real face detector integrates by implementing
//! [`FaceFeatureExtractor`] instead.

use ndarray::Array5;

use crate::error::{DatasetError, Result};
use crate::media::{ExtractionParams, FaceFeatureExtractor, FaceTensor, VideoTensor};

/// Baseline extractor: whole-frame crops, no detection.
#[derive(Debug, Default)]
pub struct FrameSampler;

impl FaceFeatureExtractor for FrameSampler {
    fn extract(&self, frames: &VideoTensor, params: &ExtractionParams) -> Result<FaceTensor> {
        if params.sampling_rate == 0 {
            return Err(DatasetError::FeatureExtract(
                "sampling_rate must be nonzero".to_string(),
            ));
        }
        if params.output_size == 0 || params.max_persons == 0 {
            return Err(DatasetError::FeatureExtract(
                "output_size and max_persons must be nonzero".to_string(),
            ));
        }

        let (frame_count, height, width, _) = frames.dim();
        let size = params.output_size;

        let sampled: Vec<usize> = (0..frame_count).step_by(params.sampling_rate).collect();
        let mut out = Array5::<u8>::zeros((sampled.len(), params.max_persons, size, size, 3));

        if !sampled.is_empty() && (height == 0 || width == 0) {
            return Err(DatasetError::FeatureExtract(
                "cannot sample zero-sized frames".to_string(),
            ));
        }

        for (si, &fi) in sampled.iter().enumerate() {
            for y in 0..size {
                let sy = y * height / size;
                for x in 0..size {
                    let sx = x * width / size;
                    for c in 0..3 {
                        out[[si, 0, y, x, c]] = frames[[fi, sy, sx, c]];
                    }
                }
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    fn gradient_frames(frames: usize, height: usize, width: usize) -> VideoTensor {
        Array4::from_shape_fn((frames, height, width, 3), |(f, y, x, c)| {
            (f * 31 + y * 7 + x * 3 + c) as u8
        })
    }

    #[test]
    fn test_output_shape_follows_params() {
        let frames = gradient_frames(10, 8, 12);
        let params = ExtractionParams {
            max_persons: 4,
            output_size: 16,
            sampling_rate: 3,
        };
        let out = FrameSampler.extract(&frames, &params).unwrap();
        // Frames 0, 3, 6, 9 survive sampling.
        assert_eq!(out.dim(), (4, 4, 16, 16, 3));
    }

    #[test]
    fn test_only_slot_zero_is_populated() {
        let frames = gradient_frames(2, 4, 4);
        let params = ExtractionParams {
            max_persons: 3,
            output_size: 4,
            sampling_rate: 1,
        };
        let out = FrameSampler.extract(&frames, &params).unwrap();
        assert!(out.iter().any(|&v| v != 0));
        for person in 1..3 {
            for f in 0..2 {
                for y in 0..4 {
                    for x in 0..4 {
                        for c in 0..3 {
                            assert_eq!(out[[f, person, y, x, c]], 0);
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_video_yields_zero_samples() {
        let frames = Array4::<u8>::zeros((0, 4, 4, 3));
        let out = FrameSampler
            .extract(&frames, &ExtractionParams::default())
            .unwrap();
        assert_eq!(out.dim().0, 0);
    }

    #[test]
    fn test_zero_sampling_rate_is_rejected() {
        let frames = gradient_frames(1, 2, 2);
        let params = ExtractionParams {
            sampling_rate: 0,
            ..ExtractionParams::default()
        };
        assert!(matches!(
            FrameSampler.extract(&frames, &params),
            Err(DatasetError::FeatureExtract(_))
        ));
    }
}
