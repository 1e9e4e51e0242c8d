//! The detection head combining target generation, loss and decoding.

use crate::{
    area::AreaProcess,
    common::*,
    decode::{ImageDetections, TtfDecoder, TtfDecoderInit},
    layout::RegressionLayout,
    loss::{TtfLoss, TtfLossInit, TtfLossOutput},
    meta::{ImageGroundTruth, ImageMeta},
    target::{TtfTargetGenerator, TtfTargetGeneratorInit, TtfTargets},
};

/// Head initializer. The defaults follow the COCO setting.
#[derive(Debug, Clone)]
pub struct TtfHeadInit {
    /// The stride of the deepest backbone feature.
    pub base_down_ratio: usize,
    /// Output channels of each upsampling stage.
    pub planes: Vec<usize>,
    /// Number of shortcut layers of each upsampling stage.
    pub shortcut_cfg: Vec<usize>,
    /// The number of classes including the background.
    pub num_classes: usize,
    pub wh_offset_base: f64,
    pub wh_area_process: AreaProcess,
    pub wh_agnostic: bool,
    pub wh_heatmap: bool,
    pub hm_center_ratio: f64,
    pub center_ratio: f64,
    pub giou_weight: f64,
    pub hm_weight: f64,
    pub max_per_img: usize,
    pub score_thr: f64,
}

impl Default for TtfHeadInit {
    fn default() -> Self {
        Self {
            base_down_ratio: 32,
            planes: vec![256, 128, 64],
            shortcut_cfg: vec![1, 2, 3],
            num_classes: 81,
            wh_offset_base: 1.0,
            wh_area_process: AreaProcess::Log,
            wh_agnostic: false,
            wh_heatmap: false,
            hm_center_ratio: 0.27,
            center_ratio: 0.2,
            giou_weight: 1.0,
            hm_weight: 1.0,
            max_per_img: 100,
            score_thr: 0.01,
        }
    }
}

impl TtfHeadInit {
    pub fn build(self) -> Result<TtfHead> {
        let Self {
            base_down_ratio,
            planes,
            shortcut_cfg,
            num_classes,
            wh_offset_base,
            wh_area_process,
            wh_agnostic,
            wh_heatmap,
            hm_center_ratio,
            center_ratio,
            giou_weight,
            hm_weight,
            max_per_img,
            score_thr,
        } = self;

        ensure!(
            (2..=4).contains(&planes.len()),
            "the number of upsampling stages must be in range [2, 4], but get {}",
            planes.len()
        );
        ensure!(
            planes.len() == shortcut_cfg.len(),
            "planes ({:?}) and shortcut_cfg ({:?}) must have equal lengths",
            planes,
            shortcut_cfg
        );
        ensure!(
            planes.iter().all(|&channels| channels > 0),
            "planes must be positive, but get {:?}",
            planes
        );
        ensure!(
            shortcut_cfg.iter().all(|&num_layers| num_layers > 0),
            "shortcut layer counts must be positive, but get {:?}",
            shortcut_cfg
        );

        let upsample_ratio = 1usize << planes.len();
        ensure!(
            base_down_ratio >= upsample_ratio && base_down_ratio % upsample_ratio == 0,
            "base_down_ratio {} is not divisible by the upsampling ratio {}",
            base_down_ratio,
            upsample_ratio
        );
        let down_ratio = base_down_ratio / upsample_ratio;

        ensure!(
            num_classes >= 2,
            "num_classes must include the background and at least one class, but get {}",
            num_classes
        );
        ensure!(
            wh_offset_base > 0.0,
            "wh_offset_base must be positive, but get {}",
            wh_offset_base
        );
        ensure!(
            score_thr.is_finite(),
            "score_thr must be finite, but get {}",
            score_thr
        );

        let num_fg = num_classes - 1;
        let layout = RegressionLayout::new(wh_agnostic, num_fg);

        let target_generator = TtfTargetGeneratorInit {
            num_fg,
            layout,
            down_ratio,
            area_process: wh_area_process,
            wh_heatmap,
            hm_center_ratio,
            center_ratio,
        }
        .build()?;
        let loss = TtfLossInit {
            layout,
            down_ratio,
            hm_weight,
            giou_weight,
            ..Default::default()
        }
        .build()?;
        let decoder = TtfDecoderInit {
            layout,
            down_ratio,
            max_per_img,
            score_thr: r64(score_thr),
            ..Default::default()
        }
        .build()?;

        debug!(
            "build head with down ratio {}, {} foreground classes and {} regression planes",
            down_ratio,
            num_fg,
            layout.wh_planes()
        );

        Ok(TtfHead {
            down_ratio,
            num_fg,
            layout,
            wh_offset_base,
            area_process: wh_area_process,
            target_generator,
            loss,
            decoder,
        })
    }
}

#[derive(Debug, CopyGetters, Getters)]
pub struct TtfHead {
    /// The stride from feature cells to input pixels.
    #[getset(get_copy = "pub")]
    down_ratio: usize,
    /// The number of foreground classes.
    #[getset(get_copy = "pub")]
    num_fg: usize,
    #[getset(get_copy = "pub")]
    layout: RegressionLayout,
    #[getset(get_copy = "pub")]
    wh_offset_base: f64,
    #[getset(get_copy = "pub")]
    area_process: AreaProcess,
    #[getset(get = "pub")]
    target_generator: TtfTargetGenerator,
    loss: TtfLoss,
    decoder: TtfDecoder,
}

impl TtfHead {
    /// Apply the output activation on raw head predictions.
    ///
    /// Heatmap logits are kept as is. Regression values are rectified and scaled
    /// by `wh_offset_base`.
    pub fn activate(&self, raw_heatmap: &Tensor, raw_wh: &Tensor) -> Result<HeadOutput> {
        let (batch, num_fg, height, width) = raw_heatmap.size4()?;
        ensure!(
            num_fg == self.num_fg as i64,
            "expect {} heatmap channels, but get {}",
            self.num_fg,
            num_fg
        );
        let wh_shape = vec![batch, self.layout.wh_planes() as i64, height, width];
        ensure!(
            raw_wh.size() == wh_shape,
            "expect regression shape {:?}, but get {:?}",
            wh_shape,
            raw_wh.size()
        );

        Ok(HeadOutput {
            heatmap: raw_heatmap.shallow_clone(),
            wh: raw_wh.relu() * self.wh_offset_base,
        })
    }

    /// The `[height, width]` of the feature grid for an image.
    pub fn feature_shape(&self, meta: &ImageMeta) -> [usize; 2] {
        meta.feature_shape(self.down_ratio)
    }

    /// Build the training targets on the device of the predictions.
    pub fn targets(
        &self,
        ground_truths: &[ImageGroundTruth],
        metas: &[ImageMeta],
        device: Device,
    ) -> Result<TtfTargets> {
        self.target_generator.forward(ground_truths, metas, device)
    }

    /// Compute the heatmap and the box regression losses.
    pub fn loss(
        &self,
        output: &HeadOutput,
        ground_truths: &[ImageGroundTruth],
        metas: &[ImageMeta],
    ) -> Result<TtfLossOutput> {
        let targets = self.targets(ground_truths, metas, output.heatmap.device())?;
        self.loss.forward(&output.heatmap, &output.wh, &targets)
    }

    /// Decode the predictions into per-image detections.
    pub fn get_bboxes(
        &self,
        output: &HeadOutput,
        metas: &[ImageMeta],
        rescale: bool,
    ) -> Result<Vec<ImageDetections>> {
        self.decoder
            .forward(&output.heatmap, &output.wh, metas, rescale)
    }
}

/// Activated head predictions.
#[derive(Debug, TensorLike)]
pub struct HeadOutput {
    /// `[batch, num_fg, height, width]` heatmap logits.
    pub heatmap: Tensor,
    /// `[batch, wh_planes, height, width]` non-negative distances to the box edges.
    pub wh: Tensor,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn default_head_geometry() -> Result<()> {
        let head = TtfHeadInit::default().build()?;
        assert_eq!(head.down_ratio(), 4);
        assert_eq!(head.num_fg(), 80);
        assert_eq!(head.layout().wh_planes(), 320);
        assert_eq!(head.area_process(), AreaProcess::Log);
        assert_eq!(head.feature_shape(&ImageMeta::new([512, 512])), [128, 128]);

        let head = TtfHeadInit {
            planes: vec![128, 64],
            shortcut_cfg: vec![1, 2],
            wh_agnostic: true,
            ..Default::default()
        }
        .build()?;
        assert_eq!(head.down_ratio(), 8);
        assert_eq!(head.layout(), RegressionLayout::Agnostic);
        Ok(())
    }

    #[test]
    fn invalid_head_configs() {
        let invalid = [
            TtfHeadInit {
                planes: vec![64],
                shortcut_cfg: vec![1],
                ..Default::default()
            },
            TtfHeadInit {
                shortcut_cfg: vec![1, 2],
                ..Default::default()
            },
            TtfHeadInit {
                shortcut_cfg: vec![1, 0, 3],
                ..Default::default()
            },
            TtfHeadInit {
                base_down_ratio: 12,
                ..Default::default()
            },
            TtfHeadInit {
                num_classes: 1,
                ..Default::default()
            },
            TtfHeadInit {
                wh_offset_base: 0.0,
                ..Default::default()
            },
            TtfHeadInit {
                center_ratio: 1.5,
                ..Default::default()
            },
        ];

        for init in invalid {
            assert!(init.clone().build().is_err(), "{:?} must be rejected", init);
        }
    }

    #[test]
    fn activation_rectifies_and_scales() -> Result<()> {
        let head = TtfHeadInit {
            num_classes: 3,
            wh_agnostic: true,
            wh_offset_base: 16.0,
            ..Default::default()
        }
        .build()?;

        let raw_heatmap = Tensor::zeros(&[1, 2, 2, 2], (Kind::Float, Device::Cpu));
        let raw_wh = Tensor::of_slice(&[-1f32, 0.5, 2.0, -3.0])
            .view([1, 1, 2, 2])
            .repeat(&[1, 4, 1, 1]);
        let output = head.activate(&raw_heatmap, &raw_wh)?;

        let wh: Vec<f32> = Vec::from(&output.wh.select(1, 0).contiguous().view([-1]));
        assert_eq!(wh, vec![0.0, 8.0, 32.0, 0.0]);
        assert_abs_diff_eq!(output.heatmap.abs().sum(Kind::Double).double_value(&[]), 0.0);

        let bad_wh = Tensor::zeros(&[1, 8, 2, 2], (Kind::Float, Device::Cpu));
        ensure!(head.activate(&raw_heatmap, &bad_wh).is_err());
        Ok(())
    }
}
