//! Heatmap and box regression losses.

use crate::{
    base_location::{BaseLocationCache, GridKey},
    common::*,
    layout::RegressionLayout,
    target::TtfTargets,
};

pub use ttf_loss::*;
pub use ttf_loss_output::*;

mod ttf_loss {
    use super::*;

    #[derive(Debug, Clone)]
    pub struct TtfLossInit {
        pub layout: RegressionLayout,
        pub down_ratio: usize,
        pub hm_weight: f64,
        pub giou_weight: f64,
        pub focal_loss: CenterFocalLossInit,
        pub giou_loss: WeightedGIoULossInit,
    }

    impl TtfLossInit {
        pub fn build(self) -> Result<TtfLoss> {
            let Self {
                layout,
                down_ratio,
                hm_weight,
                giou_weight,
                focal_loss,
                giou_loss,
            } = self;

            ensure!(down_ratio > 0, "down_ratio must be positive");
            ensure!(hm_weight >= 0.0, "hm_weight must be non-negative");
            ensure!(giou_weight >= 0.0, "giou_weight must be non-negative");

            Ok(TtfLoss {
                layout,
                down_ratio,
                hm_weight,
                giou_weight,
                focal_loss: focal_loss.build()?,
                giou_loss: giou_loss.build()?,
                base_locations: BaseLocationCache::new(),
            })
        }
    }

    impl Default for TtfLossInit {
        fn default() -> Self {
            Self {
                layout: RegressionLayout::PerClass { num_fg: 80 },
                down_ratio: 4,
                hm_weight: 1.0,
                giou_weight: 1.0,
                focal_loss: CenterFocalLossInit::default(),
                giou_loss: WeightedGIoULossInit::default(),
            }
        }
    }

    #[derive(Derivative)]
    #[derivative(Debug)]
    pub struct TtfLoss {
        layout: RegressionLayout,
        down_ratio: usize,
        hm_weight: f64,
        giou_weight: f64,
        focal_loss: CenterFocalLoss,
        giou_loss: WeightedGIoULoss,
        #[derivative(Debug = "ignore")]
        base_locations: BaseLocationCache,
    }

    impl TtfLoss {
        /// Compute the losses of activated predictions against the targets.
        ///
        /// `pred_heatmap` holds `[batch, num_fg, height, width]` logits and `pred_wh`
        /// holds `[batch, wh_planes, height, width]` non-negative edge distances.
        pub fn forward(
            &self,
            pred_heatmap: &Tensor,
            pred_wh: &Tensor,
            targets: &TtfTargets,
        ) -> Result<TtfLossOutput> {
            let (batch, num_fg, height, width) = pred_heatmap.size4()?;
            let wh_planes = self.layout.wh_planes() as i64;
            let weight_planes = self.layout.weight_planes() as i64;

            ensure!(
                pred_wh.size() == vec![batch, wh_planes, height, width],
                "expect regression shape {:?}, but get {:?}",
                [batch, wh_planes, height, width],
                pred_wh.size()
            );
            ensure!(
                targets.heatmap().size() == vec![batch, num_fg, height, width],
                "heatmap target shape {:?} does not match the prediction {:?}",
                targets.heatmap().size(),
                pred_heatmap.size()
            );
            ensure!(
                targets.box_target().size() == pred_wh.size(),
                "box target shape {:?} does not match the prediction {:?}",
                targets.box_target().size(),
                pred_wh.size()
            );
            ensure!(
                targets.wh_weight().size() == vec![batch, weight_planes, height, width],
                "unexpected weight shape {:?}",
                targets.wh_weight().size()
            );

            let heatmap_loss =
                self.focal_loss.forward(pred_heatmap, targets.heatmap())? * self.hm_weight;
            let wh_loss = self.wh_loss(pred_wh, targets)? * self.giou_weight;

            Ok(TtfLossOutput {
                heatmap_loss,
                wh_loss,
            })
        }

        fn wh_loss(&self, pred_wh: &Tensor, targets: &TtfTargets) -> Result<Tensor> {
            let (batch, _, height, width) = pred_wh.size4()?;
            let groups = self.layout.weight_planes() as i64;
            let grouped_shape = [batch, groups, 4, height, width];

            let base_loc = self.base_locations.get(GridKey {
                height,
                width,
                down_ratio: self.down_ratio as i64,
                device: pred_wh.device(),
            })?;
            let base_x = base_loc.select(0, 0);
            let base_y = base_loc.select(0, 1);

            // [batch, groups, height, width] per component
            let pred_boxes: LtrbTensor = {
                let pred_wh = pred_wh.reshape(&grouped_shape);
                LtrbTensorUnchecked {
                    l: &base_x - pred_wh.select(2, 0),
                    t: &base_y - pred_wh.select(2, 1),
                    r: &base_x + pred_wh.select(2, 2),
                    b: &base_y + pred_wh.select(2, 3),
                }
                .try_into()?
            };
            let target_boxes =
                LtrbTensor::from_stacked(&targets.box_target().reshape(&grouped_shape), 2)?;

            self.giou_loss
                .forward(&pred_boxes, &target_boxes, targets.wh_weight())
        }
    }
}

mod ttf_loss_output {
    use super::*;

    /// The name of the heatmap loss in logs.
    pub const HEATMAP_LOSS_NAME: &str = "losses/ttf_loss_heatmap";
    /// The name of the box regression loss in logs.
    pub const WH_LOSS_NAME: &str = "losses/ttf_loss_wh";

    #[derive(Debug, TensorLike)]
    pub struct TtfLossOutput {
        pub heatmap_loss: Tensor,
        pub wh_loss: Tensor,
    }

    impl TtfLossOutput {
        /// The losses paired with their names.
        pub fn named_losses(&self) -> [(&'static str, &Tensor); 2] {
            [
                (HEATMAP_LOSS_NAME, &self.heatmap_loss),
                (WH_LOSS_NAME, &self.wh_loss),
            ]
        }
    }
}
