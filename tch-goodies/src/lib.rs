pub mod compound_tensor;
mod common;
pub mod tensor;

pub use compound_tensor::*;
pub use tensor::*;
