use crate::common::*;

/// Channel arrangement of the box regression map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RegressionLayout {
    /// One shared group of 4 planes serves all classes.
    Agnostic,
    /// One group of 4 planes per foreground class.
    PerClass { num_fg: usize },
}

impl RegressionLayout {
    pub fn new(wh_agnostic: bool, num_fg: usize) -> Self {
        if wh_agnostic {
            Self::Agnostic
        } else {
            Self::PerClass { num_fg }
        }
    }

    pub fn is_agnostic(&self) -> bool {
        matches!(self, Self::Agnostic)
    }

    /// The number of regression planes.
    pub fn wh_planes(&self) -> usize {
        self.weight_planes() * 4
    }

    /// The number of weight planes, one per group of 4 regression planes.
    pub fn weight_planes(&self) -> usize {
        match *self {
            Self::Agnostic => 1,
            Self::PerClass { num_fg } => num_fg,
        }
    }

    /// The weight plane index of a zero-based class.
    pub fn weight_plane(&self, class: usize) -> usize {
        match self {
            Self::Agnostic => 0,
            Self::PerClass { .. } => class,
        }
    }

    /// The regression planes holding `[l, t, r, b]` of a zero-based class.
    pub fn plane_range(&self, class: usize) -> Range<usize> {
        let begin = self.weight_plane(class) * 4;
        begin..(begin + 4)
    }
}
