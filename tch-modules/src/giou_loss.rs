use crate::common::*;

/// Weighted GIoU loss initializer.
#[derive(Debug, Clone)]
pub struct WeightedGIoULossInit {
    /// Added to the weight sum before normalization.
    pub avg_eps: f64,
}

impl Default for WeightedGIoULossInit {
    fn default() -> Self {
        Self { avg_eps: 1e-4 }
    }
}

impl WeightedGIoULossInit {
    pub fn build(self) -> Result<WeightedGIoULoss> {
        let Self { avg_eps } = self;
        ensure!(
            avg_eps > 0.0,
            "avg_eps must be positive, but get {}",
            avg_eps
        );
        Ok(WeightedGIoULoss { avg_eps })
    }
}

/// Per-cell GIoU loss weighted by a dense weight map.
///
/// Only cells with positive weight take part. The weighted sum of `1 - giou` is
/// divided by the total weight plus `avg_eps`.
#[derive(Debug)]
pub struct WeightedGIoULoss {
    avg_eps: f64,
}

impl WeightedGIoULoss {
    pub fn forward(
        &self,
        pred: &LtrbTensor,
        target: &LtrbTensor,
        weight: &Tensor,
    ) -> Result<Tensor> {
        ensure!(
            pred.shape() == target.shape() && pred.shape() == weight.size(),
            "prediction, target and weight shape mismatch: {:?}, {:?} and {:?}",
            pred.shape(),
            target.shape(),
            weight.size()
        );

        let pos_mask = weight.gt(0.0);
        let pos_weight = weight.masked_select(&pos_mask);
        let avg_factor = weight.sum(Kind::Float) + self.avg_eps;

        if pos_weight.is_empty() {
            debug!("no positive cell for GIoU loss");
            return Ok(Tensor::zeros(&[], (Kind::Float, weight.device())));
        }

        let pred = pred.masked_select(&pos_mask);
        let target = target.masked_select(&pos_mask);
        let giou = pred.giou_with(&target);
        let loss = ((1.0f64 - giou) * pos_weight).sum(Kind::Float) / avg_factor;

        Ok(loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use bbox::{prelude::*, LTRB};
    use rand::prelude::*;

    fn boxes(values: &[[f32; 4]]) -> LtrbTensor {
        let bboxes: Vec<_> = values
            .iter()
            .map(|&ltrb| LTRB::from_ltrb(ltrb))
            .collect();
        LtrbTensor::from(bboxes.as_slice())
    }

    #[test]
    fn giou_loss_identical_boxes() -> Result<()> {
        let loss_fn = WeightedGIoULossInit::default().build()?;
        let mut rng = rand::thread_rng();

        let values: Vec<[f32; 4]> = (0..16)
            .map(|_| {
                let l = rng.gen_range(0.0..100.0);
                let t = rng.gen_range(0.0..100.0);
                let w = rng.gen_range(1.0..50.0);
                let h = rng.gen_range(1.0..50.0);
                [l, t, l + w, t + h]
            })
            .collect();
        let weight = Tensor::rand(&[16], (Kind::Float, Device::Cpu)) + 0.1;

        let loss = loss_fn
            .forward(&boxes(&values), &boxes(&values), &weight)?
            .double_value(&[]);
        assert_abs_diff_eq!(loss, 0.0, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn giou_loss_misaligned_boxes() -> Result<()> {
        let loss_fn = WeightedGIoULossInit::default().build()?;
        let pred_values = [[0f32, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 10.0]];
        let target_values = [[5f32, 5.0, 15.0, 15.0], [30.0, 30.0, 40.0, 40.0]];
        let weight = Tensor::of_slice(&[1f32, 3.0]);

        let loss = loss_fn
            .forward(&boxes(&pred_values), &boxes(&target_values), &weight)?
            .double_value(&[]);

        let expect = {
            let distances: Vec<f32> = pred_values
                .iter()
                .zip(&target_values)
                .map(|(pred, target)| {
                    1.0 - LTRB::from_ltrb(*pred).giou_with(&LTRB::from_ltrb(*target), 1e-6)
                })
                .collect();
            (distances[0] + 3.0 * distances[1]) as f64 / (4.0 + 1e-4)
        };

        ensure!(loss > 0.0);
        assert_abs_diff_eq!(loss, expect, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn giou_loss_ignores_zero_weights() -> Result<()> {
        let loss_fn = WeightedGIoULossInit::default().build()?;

        // sentinel targets of unassigned cells are never evaluated
        let pred_values = [[0f32, 0.0, 10.0, 10.0], [0.0, 0.0, 10.0, 10.0]];
        let target_values = [[0f32, 0.0, 10.0, 10.0], [-1.0, -1.0, -1.0, -1.0]];
        let weight = Tensor::of_slice(&[2f32, 0.0]);

        let loss = loss_fn
            .forward(&boxes(&pred_values), &boxes(&target_values), &weight)?
            .double_value(&[]);
        ensure!(loss.is_finite());
        assert_abs_diff_eq!(loss, 0.0, epsilon = 1e-4);

        let weight = Tensor::zeros(&[2], (Kind::Float, Device::Cpu));
        let loss = loss_fn
            .forward(&boxes(&pred_values), &boxes(&target_values), &weight)?
            .double_value(&[]);
        assert_abs_diff_eq!(loss, 0.0);
        Ok(())
    }

    #[test]
    fn giou_loss_shape_mismatch() -> Result<()> {
        let loss_fn = WeightedGIoULossInit::default().build()?;
        let values = [[0f32, 0.0, 10.0, 10.0]];
        let weight = Tensor::ones(&[2], (Kind::Float, Device::Cpu));
        ensure!(loss_fn
            .forward(&boxes(&values), &boxes(&values), &weight)
            .is_err());
        Ok(())
    }
}
