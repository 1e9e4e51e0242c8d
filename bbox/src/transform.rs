use super::LTRB;
use crate::common::*;

/// Axis-aligned scaling followed by translation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Transform<T> {
    pub sx: T,
    pub sy: T,
    pub tx: T,
    pub ty: T,
}

impl<T> Transform<T>
where
    T: Copy + Num,
{
    /// Pure scaling on both axes.
    pub fn scale(sx: T, sy: T) -> Self {
        Self {
            sx,
            sy,
            tx: T::zero(),
            ty: T::zero(),
        }
    }

    /// Downscale by an integer stride, mapping image pixels to feature cells.
    pub fn down_sample(stride: T) -> Self {
        let inv = T::one() / stride;
        Self::scale(inv, inv)
    }
}

impl<T> Mul<&LTRB<T>> for &Transform<T>
where
    T: Copy + Num,
{
    type Output = LTRB<T>;

    fn mul(self, rhs: &LTRB<T>) -> Self::Output {
        rhs.transform(self)
    }
}
