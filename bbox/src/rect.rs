use super::LTRB;
use crate::common::*;

/// The generic rectangle.
pub trait Rect {
    type Type;

    fn l(&self) -> Self::Type;
    fn t(&self) -> Self::Type;
    fn r(&self) -> Self::Type;
    fn b(&self) -> Self::Type;
    fn cx(&self) -> Self::Type;
    fn cy(&self) -> Self::Type;
    fn w(&self) -> Self::Type;
    fn h(&self) -> Self::Type;

    fn try_from_ltrb(ltrb: [Self::Type; 4]) -> Result<Self>
    where
        Self: Sized;
}

pub trait RectNum: Rect
where
    Self::Type: Num + PartialOrd,
{
    fn from_ltrb(ltrb: [Self::Type; 4]) -> Self
    where
        Self: Sized,
    {
        Self::try_from_ltrb(ltrb).unwrap()
    }

    fn ltrb(&self) -> [Self::Type; 4] {
        [self.l(), self.t(), self.r(), self.b()]
    }

    fn wh(&self) -> [Self::Type; 2] {
        [self.w(), self.h()]
    }

    fn area(&self) -> <Self::Type as Mul<Self::Type>>::Output
    where
        Self::Type: Mul<Self::Type>,
    {
        self.w() * self.h()
    }
}

pub trait RectFloat: RectNum
where
    Self::Type: Float,
{
    /// Compute the smallest box enclosing both boxes.
    fn closure_with<R>(&self, other: &R) -> LTRB<Self::Type>
    where
        R: Rect<Type = Self::Type>,
    {
        let l = self.l().min(other.l());
        let t = self.t().min(other.t());
        let r = self.r().max(other.r());
        let b = self.b().max(other.b());
        LTRB { l, t, r, b }
    }

    fn intersect_with<R>(&self, other: &R) -> Option<LTRB<Self::Type>>
    where
        R: Rect<Type = Self::Type>,
    {
        let l = self.l().max(other.l());
        let t = self.t().max(other.t());
        let r = self.r().min(other.r());
        let b = self.b().min(other.b());
        (r > l && b > t).then(|| LTRB { l, t, r, b })
    }

    fn intersection_area_with<R>(&self, other: &R) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        self.intersect_with(other)
            .map(|rect| rect.area())
            .unwrap_or_else(Self::Type::zero)
    }

    /// Compute the generalized IoU, which stays informative for disjoint boxes.
    fn giou_with<R>(&self, other: &R, epsilon: Self::Type) -> Self::Type
    where
        R: Rect<Type = Self::Type>,
    {
        let inter_area = self.intersection_area_with(other);
        let union_area = self.area() + other.area() - inter_area + epsilon;
        let closure_area = self.closure_with(other).area() + epsilon;
        inter_area / union_area - (closure_area - union_area) / closure_area
    }

    /// Shrink the box towards its center by removing `ratio` of the size from each side.
    ///
    /// The resulting width is `w * (1 - 2 * ratio)`, and likewise for the height.
    fn shrink_to_center(&self, ratio: Self::Type) -> LTRB<Self::Type> {
        let one = Self::Type::one();
        let [l, t, r, b] = self.ltrb();
        LTRB {
            l: (one - ratio) * l + ratio * r,
            t: (one - ratio) * t + ratio * b,
            r: ratio * l + (one - ratio) * r,
            b: ratio * t + (one - ratio) * b,
        }
    }
}

impl<T> RectNum for T
where
    T: Rect,
    T::Type: Num + PartialOrd,
{
}

impl<T> RectFloat for T
where
    T: Rect,
    T::Type: Float,
{
}
