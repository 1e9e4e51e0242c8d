//! Batched box region helpers.

use super::{RectFloat, RectNum, LTRB};
use crate::common::*;

/// Compute the areas of a batch of boxes.
pub fn areas<T>(bboxes: &[LTRB<T>]) -> Vec<T>
where
    T: Float,
{
    bboxes.iter().map(|bbox| bbox.area()).collect()
}

/// Shrink a batch of boxes towards their centers.
///
/// Each side loses `ratio` of the box size, see [RectFloat::shrink_to_center].
pub fn center_regions<T>(bboxes: &[LTRB<T>], ratio: T) -> Vec<LTRB<T>>
where
    T: Float,
{
    bboxes
        .iter()
        .map(|bbox| bbox.shrink_to_center(ratio))
        .collect()
}
