//! Loss building blocks for dense anchor-free detection heads.

mod common;

pub mod center_focal_loss;
pub use center_focal_loss::*;

pub mod giou_loss;
pub use giou_loss::*;
