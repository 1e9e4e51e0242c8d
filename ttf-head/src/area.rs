//! Area-based priority and weighting of ground truth boxes.

use crate::common::*;

/// The transform applied on box areas to obtain regression weights.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AreaProcess {
    /// Plain `w * h` area.
    None,
    /// Constant 1 for every box.
    Norm,
    /// Natural logarithm of the area.
    Log,
    /// Square root of the area.
    Sqrt,
}

impl Default for AreaProcess {
    fn default() -> Self {
        Self::Log
    }
}

impl AreaProcess {
    fn area_metric(&self, bbox: &LTRB<f32>) -> f32 {
        let area = bbox.area();
        match self {
            Self::None => area,
            Self::Norm => 1.0,
            Self::Log => area.ln(),
            Self::Sqrt => area.sqrt(),
        }
    }

    /// Compute the area metric of each box.
    ///
    /// The `log` metric is non-positive for boxes with areas not above 1.
    pub fn area_metrics(&self, bboxes: &[LTRB<f32>]) -> Vec<f32> {
        bboxes.iter().map(|bbox| self.area_metric(bbox)).collect()
    }
}

/// Order box indexes from the largest area to the smallest.
///
/// Boxes with equal areas keep their input order. The order does not depend on
/// the area process since every mode is monotonic or constant in the area.
pub fn priority_order(bboxes: &[LTRB<f32>]) -> Vec<usize> {
    let areas = bbox::areas(bboxes);
    let mut indexes: Vec<usize> = (0..bboxes.len()).collect();
    indexes.sort_by(|&lhs, &rhs| {
        areas[rhs]
            .partial_cmp(&areas[lhs])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    indexes
}
