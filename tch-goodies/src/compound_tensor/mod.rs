mod ltrb;
mod size;

pub use ltrb::*;
pub use size::*;

/// Numerical guard added to denominators of box metrics.
pub const EPSILON: f64 = 1e-6;
