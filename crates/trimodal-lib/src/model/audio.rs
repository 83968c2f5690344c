// Audio embeddings are supplied pre-built by an external table; this type
// only carries them. The zero default stands in for utterances missing from
// that table.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// Rows in the primary (filterbank) component of the pair.
pub const FILTERBANK_DIM: usize = 128;
/// Rows in the secondary (MFCC) component of the pair.
pub const MFCC_DIM: usize = 20;

/// Pre-computed audio embedding pair for one utterance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AudioEmbedding {
    pub filterbank: Array2<f32>,
    pub mfcc: Array2<f32>,
}

impl AudioEmbedding {
    pub fn new(filterbank: Array2<f32>, mfcc: Array2<f32>) -> Self {
        AudioEmbedding { filterbank, mfcc }
    }

    /// The documented default pair substituted on a table miss: zero-valued
    /// tensors of shapes `(128, 1)` and `(20, 1)`.
    pub fn zeros() -> Self {
        AudioEmbedding {
            filterbank: Array2::zeros((FILTERBANK_DIM, 1)),
            mfcc: Array2::zeros((MFCC_DIM, 1)),
        }
    }
}
