use super::Rect;
use crate::{common::*, Transform};

/// Bounding box in LTRB format, i.e. left, top, right and bottom edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LTRB<T> {
    pub(crate) l: T,
    pub(crate) t: T,
    pub(crate) r: T,
    pub(crate) b: T,
}

impl<T> LTRB<T>
where
    T: Copy + Num,
{
    pub fn transform(&self, transform: &Transform<T>) -> Self {
        LTRB {
            l: self.l * transform.sx + transform.tx,
            t: self.t * transform.sy + transform.ty,
            r: self.r * transform.sx + transform.tx,
            b: self.b * transform.sy + transform.ty,
        }
    }
}

impl<T> LTRB<T>
where
    T: Float,
{
    /// Clamp horizontal edges into `[0, max_x]` and vertical edges into `[0, max_y]`.
    pub fn clamp(&self, max_x: T, max_y: T) -> Self {
        let zero = T::zero();
        LTRB {
            l: self.l.max(zero).min(max_x),
            t: self.t.max(zero).min(max_y),
            r: self.r.max(zero).min(max_x),
            b: self.b.max(zero).min(max_y),
        }
    }
}

impl<T> Rect for LTRB<T>
where
    T: Copy + Num + PartialOrd,
{
    type Type = T;

    fn l(&self) -> Self::Type {
        self.l
    }

    fn t(&self) -> Self::Type {
        self.t
    }

    fn r(&self) -> Self::Type {
        self.r
    }

    fn b(&self) -> Self::Type {
        self.b
    }

    fn cx(&self) -> Self::Type {
        let two = T::one() + T::one();
        (self.l + self.r) / two
    }

    fn cy(&self) -> Self::Type {
        let two = T::one() + T::one();
        (self.t + self.b) / two
    }

    fn w(&self) -> Self::Type {
        self.r - self.l
    }

    fn h(&self) -> Self::Type {
        self.b - self.t
    }

    fn try_from_ltrb(ltrb: [Self::Type; 4]) -> Result<Self> {
        let [l, t, r, b] = ltrb;
        ensure!(r >= l && b >= t, "r >= l and b >= t must hold");
        Ok(Self { l, t, r, b })
    }
}

impl<T> TryFrom<[T; 4]> for LTRB<T>
where
    T: Copy + Num + PartialOrd,
{
    type Error = anyhow::Error;

    fn try_from(from: [T; 4]) -> Result<Self, Self::Error> {
        Self::try_from_ltrb(from)
    }
}

impl<T> From<&LTRB<T>> for [T; 4]
where
    T: Copy,
{
    fn from(from: &LTRB<T>) -> Self {
        let LTRB { l, t, r, b } = *from;
        [l, t, r, b]
    }
}

impl<T> From<LTRB<T>> for [T; 4]
where
    T: Copy,
{
    fn from(from: LTRB<T>) -> Self {
        (&from).into()
    }
}
