use super::{size::SizeTensor, EPSILON};
use crate::common::*;
use bbox::LTRB;

/// Checked tensor of box parameters in LTRB format.
///
/// The four components share one arbitrary shape, so that boxes can be laid out
/// as a flat list as well as a dense `[batch, height, width]` grid.
#[derive(Debug, TensorLike, Getters)]
pub struct LtrbTensor {
    /// The left edges.
    #[get = "pub"]
    pub(crate) l: Tensor,
    /// The top edges.
    #[get = "pub"]
    pub(crate) t: Tensor,
    /// The right edges.
    #[get = "pub"]
    pub(crate) r: Tensor,
    /// The bottom edges.
    #[get = "pub"]
    pub(crate) b: Tensor,
}

/// Unchecked tensor of box parameters in LTRB format.
#[derive(Debug, TensorLike)]
pub struct LtrbTensorUnchecked {
    pub l: Tensor,
    pub t: Tensor,
    pub r: Tensor,
    pub b: Tensor,
}

impl LtrbTensor {
    /// Split a tensor along a dimension of size 4 holding `[l, t, r, b]` components.
    pub fn from_stacked(tensor: &Tensor, dim: i64) -> Result<Self> {
        let size = tensor.size();
        let ndim = size.len() as i64;
        let dim = if dim < 0 { dim + ndim } else { dim };
        ensure!(
            (0..ndim).contains(&dim),
            "dimension {} is out of range for a {}-d tensor",
            dim,
            ndim
        );
        ensure!(
            size[dim as usize] == 4,
            "expect 4 components along dimension {}, but get {}",
            dim,
            size[dim as usize]
        );

        let [l, t, r, b] = [0, 1, 2, 3].map(|index| tensor.select(dim, index));
        Ok(Self { l, t, r, b })
    }

    pub fn shape(&self) -> Vec<i64> {
        self.l.size()
    }

    /// Keep the boxes where `mask` is set. The output is flattened.
    pub fn masked_select(&self, mask: &Tensor) -> Self {
        let Self { l, t, r, b } = self;
        Self {
            l: l.masked_select(mask),
            t: t.masked_select(mask),
            r: r.masked_select(mask),
            b: b.masked_select(mask),
        }
    }

    /// Compute the box size.
    pub fn size(&self) -> SizeTensor {
        let Self { l, t, r, b } = self;
        SizeTensor { w: r - l, h: b - t }
    }

    /// Compute the box area.
    pub fn area(&self) -> Tensor {
        self.size().area()
    }

    /// Compute the intersection area with the other box tensor.
    pub fn intersect_area_with(&self, other: &Self) -> Tensor {
        let Self {
            l: lhs_l,
            t: lhs_t,
            r: lhs_r,
            b: lhs_b,
        } = self;
        let Self {
            l: rhs_l,
            t: rhs_t,
            r: rhs_r,
            b: rhs_b,
        } = other;

        let max_l = lhs_l.maximum(rhs_l);
        let max_t = lhs_t.maximum(rhs_t);
        let min_r = lhs_r.minimum(rhs_r);
        let min_b = lhs_b.minimum(rhs_b);

        let inner_w = (min_r - max_l).clamp_min(0.0);
        let inner_h = (min_b - max_t).clamp_min(0.0);

        inner_w * inner_h
    }

    /// Compute the rectangle closure with the other box tensor.
    pub fn closure_with(&self, other: &Self) -> Self {
        let Self {
            l: lhs_l,
            t: lhs_t,
            r: lhs_r,
            b: lhs_b,
        } = self;
        let Self {
            l: rhs_l,
            t: rhs_t,
            r: rhs_r,
            b: rhs_b,
        } = other;

        Self {
            l: lhs_l.minimum(rhs_l),
            t: lhs_t.minimum(rhs_t),
            r: lhs_r.maximum(rhs_r),
            b: lhs_b.maximum(rhs_b),
        }
    }

    /// Compute the GIoU score with the other box tensor.
    pub fn giou_with(&self, other: &Self) -> Tensor {
        let inter_area = self.intersect_area_with(other);
        let union_area = self.area() + other.area() - &inter_area + EPSILON;
        let closure_area = self.closure_with(other).area() + EPSILON;
        let iou = &inter_area / &union_area;
        iou - (&closure_area - &union_area) / &closure_area
    }
}

impl TryFrom<LtrbTensorUnchecked> for LtrbTensor {
    type Error = Error;

    fn try_from(from: LtrbTensorUnchecked) -> Result<Self, Self::Error> {
        let LtrbTensorUnchecked { l, t, r, b } = from;
        let shape = l.size();
        ensure!(
            t.size() == shape && r.size() == shape && b.size() == shape,
            "size mismatch"
        );
        ensure!(
            hashset! {
                l.device(),
                t.device(),
                r.device(),
                b.device(),
            }
            .len()
                == 1,
            "device mismatch"
        );
        Ok(Self { l, t, r, b })
    }
}

impl From<&[LTRB<f32>]> for LtrbTensor {
    fn from(from: &[LTRB<f32>]) -> Self {
        let (l_vec, t_vec, r_vec, b_vec) = from
            .iter()
            .map(|bbox| {
                let [l, t, r, b]: [f32; 4] = bbox.into();
                (l, t, r, b)
            })
            .unzip_n_vec();

        Self {
            l: Tensor::of_slice(&l_vec),
            t: Tensor::of_slice(&t_vec),
            r: Tensor::of_slice(&r_vec),
            b: Tensor::of_slice(&b_vec),
        }
    }
}
