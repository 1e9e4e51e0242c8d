//! Per-image inputs supplied by the data pipeline.

use crate::common::*;

/// Image properties needed to build targets and to rescale detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageMeta {
    /// The `[height, width]` of the padded network input.
    pub pad_shape: [usize; 2],
    /// Divisors of `[l, t, r, b]` mapping input pixels back to the original image.
    #[serde(default = "default_scale_factor")]
    pub scale_factor: [f32; 4],
}

fn default_scale_factor() -> [f32; 4] {
    [1.0; 4]
}

impl ImageMeta {
    pub fn new(pad_shape: [usize; 2]) -> Self {
        Self {
            pad_shape,
            scale_factor: default_scale_factor(),
        }
    }

    /// The `[height, width]` of the feature grid at the given stride.
    pub fn feature_shape(&self, down_ratio: usize) -> [usize; 2] {
        let [h, w] = self.pad_shape;
        [h / down_ratio, w / down_ratio]
    }
}

/// Ground truth boxes of one image in input pixel coordinates.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageGroundTruth {
    pub bboxes: Vec<LTRB<f32>>,
    /// Class labels starting from 1.
    pub labels: Vec<usize>,
}

impl ImageGroundTruth {
    pub fn new(bboxes: Vec<LTRB<f32>>, labels: Vec<usize>) -> Result<Self> {
        ensure!(
            bboxes.len() == labels.len(),
            "the number of boxes ({}) and labels ({}) must be equal",
            bboxes.len(),
            labels.len()
        );
        Ok(Self { bboxes, labels })
    }

    /// Build from raw `[l, t, r, b]` arrays, rejecting malformed boxes.
    pub fn from_raw(bboxes: &[[f32; 4]], labels: Vec<usize>) -> Result<Self> {
        let bboxes: Vec<_> = bboxes
            .iter()
            .enumerate()
            .map(|(index, &ltrb)| {
                LTRB::try_from(ltrb)
                    .with_context(|| format!("invalid box {:?} at index {}", ltrb, index))
            })
            .collect::<Result<_>>()?;
        Self::new(bboxes, labels)
    }

    pub fn len(&self) -> usize {
        self.bboxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bboxes.is_empty()
    }
}
