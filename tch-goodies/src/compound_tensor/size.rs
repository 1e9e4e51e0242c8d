use crate::common::*;

/// Tensor of box sizes.
#[derive(Debug, TensorLike, Getters)]
pub struct SizeTensor {
    #[get = "pub"]
    pub(crate) w: Tensor,
    #[get = "pub"]
    pub(crate) h: Tensor,
}

impl SizeTensor {
    pub fn area(&self) -> Tensor {
        &self.w * &self.h
    }
}
