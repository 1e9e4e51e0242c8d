//! Safe bounding box types and functions.

mod common;

pub use ltrb::*;
pub mod ltrb;

pub use rect::*;
pub mod rect;

pub use region::*;
pub mod region;

pub use transform::*;
mod transform;

pub mod prelude {
    pub use crate::rect::{Rect, RectFloat, RectNum};
}
