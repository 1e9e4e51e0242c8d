use crate::common::*;

pub trait TensorExt {
    fn is_empty(&self) -> bool;

    /// Zero out every value that is not the maximum of its `kernel_size` square neighborhood.
    ///
    /// The input is expected in `[batch, channel, height, width]` shape.
    fn f_suppress_non_peaks(&self, kernel_size: i64) -> Result<Tensor>;
}

impl TensorExt for Tensor {
    fn is_empty(&self) -> bool {
        self.numel() == 0
    }

    fn f_suppress_non_peaks(&self, kernel_size: i64) -> Result<Tensor> {
        ensure!(
            kernel_size > 0 && kernel_size % 2 == 1,
            "kernel_size must be a positive odd number, but get {}",
            kernel_size
        );
        let _ = self
            .size4()
            .map_err(|_| format_err!("expect a 4-d tensor, but get {:?}", self.size()))?;

        let padding = (kernel_size - 1) / 2;
        let hmax = self.f_max_pool2d(
            &[kernel_size, kernel_size],
            &[1, 1],
            &[padding, padding],
            &[1, 1],
            false,
        )?;
        let keep = hmax.f_eq_tensor(self)?.to_kind(self.kind());
        Ok(self * keep)
    }
}
