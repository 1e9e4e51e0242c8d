//! Dense training target generation.

use crate::{
    area::{priority_order, AreaProcess},
    common::*,
    gaussian::draw_truncate_gaussian,
    layout::RegressionLayout,
    meta::{ImageGroundTruth, ImageMeta},
};
use bbox::Transform;

/// Target generator initializer.
#[derive(Debug, Clone)]
pub struct TtfTargetGeneratorInit {
    /// The number of foreground classes.
    pub num_fg: usize,
    pub layout: RegressionLayout,
    pub down_ratio: usize,
    pub area_process: AreaProcess,
    /// Use the non-zero gaussian cells as the positive region instead of the shrunk box.
    pub wh_heatmap: bool,
    /// Gaussian radius relative to the box size on the feature grid.
    pub hm_center_ratio: f64,
    /// Size ratio of the positive region to the box.
    pub center_ratio: f64,
}

impl Default for TtfTargetGeneratorInit {
    fn default() -> Self {
        Self {
            num_fg: 80,
            layout: RegressionLayout::PerClass { num_fg: 80 },
            down_ratio: 4,
            area_process: AreaProcess::Log,
            wh_heatmap: false,
            hm_center_ratio: 0.27,
            center_ratio: 0.2,
        }
    }
}

impl TtfTargetGeneratorInit {
    pub fn build(self) -> Result<TtfTargetGenerator> {
        let Self {
            num_fg,
            layout,
            down_ratio,
            area_process,
            wh_heatmap,
            hm_center_ratio,
            center_ratio,
        } = self;

        ensure!(num_fg > 0, "num_fg must be positive");
        ensure!(
            layout.is_agnostic() || layout.weight_planes() == num_fg,
            "the regression layout {:?} does not match {} foreground classes",
            layout,
            num_fg
        );
        ensure!(down_ratio > 0, "down_ratio must be positive");
        ensure!(
            hm_center_ratio >= 0.0,
            "hm_center_ratio must be non-negative, but get {}",
            hm_center_ratio
        );
        ensure!(
            center_ratio > 0.0 && center_ratio <= 1.0,
            "center_ratio must be in range (0, 1], but get {}",
            center_ratio
        );

        Ok(TtfTargetGenerator {
            num_fg,
            layout,
            down_ratio,
            area_process,
            wh_heatmap,
            hm_center_ratio,
            center_ratio,
        })
    }
}

/// Converts ground truth boxes to heatmap, box target and weight maps.
#[derive(Debug, Clone, CopyGetters)]
pub struct TtfTargetGenerator {
    #[getset(get_copy = "pub")]
    num_fg: usize,
    #[getset(get_copy = "pub")]
    layout: RegressionLayout,
    #[getset(get_copy = "pub")]
    down_ratio: usize,
    area_process: AreaProcess,
    wh_heatmap: bool,
    hm_center_ratio: f64,
    center_ratio: f64,
}

impl TtfTargetGenerator {
    /// Build the batched targets for a batch of images.
    ///
    /// The feature grid is derived from the padded shape of the first image.
    /// Images are processed in parallel.
    pub fn forward(
        &self,
        ground_truths: &[ImageGroundTruth],
        metas: &[ImageMeta],
        device: Device,
    ) -> Result<TtfTargets> {
        ensure!(!metas.is_empty(), "the batch must not be empty");
        ensure!(
            ground_truths.len() == metas.len(),
            "the number of ground truths ({}) and image metas ({}) must be equal",
            ground_truths.len(),
            metas.len()
        );

        let feature_shape = metas[0].feature_shape(self.down_ratio);
        let images: Vec<ImageTargets> = ground_truths
            .par_iter()
            .enumerate()
            .map(|(index, gt)| {
                self.image_targets(gt, feature_shape)
                    .with_context(|| format!("failed to build targets for image {}", index))
            })
            .collect::<Result<_>>()?;

        TtfTargets::from_images(&images, device)
    }

    /// Build the targets of one image on a `[height, width]` feature grid.
    pub fn image_targets(
        &self,
        ground_truth: &ImageGroundTruth,
        feature_shape: [usize; 2],
    ) -> Result<ImageTargets> {
        let ImageGroundTruth { bboxes, labels } = ground_truth;
        let [feat_h, feat_w] = feature_shape;
        ensure!(
            bboxes.len() == labels.len(),
            "the number of boxes ({}) and labels ({}) must be equal",
            bboxes.len(),
            labels.len()
        );
        if let Some(&label) = labels
            .iter()
            .find(|&&label| label == 0 || label > self.num_fg)
        {
            bail!(
                "label {} is out of range, expect a value in [1, {}]",
                label,
                self.num_fg
            );
        }

        let mut targets = ImageTargets::new(self.num_fg, self.layout, feature_shape);
        if bboxes.is_empty() || feat_h == 0 || feat_w == 0 {
            return Ok(targets);
        }

        let down_ratio = self.down_ratio as f32;
        let to_feature = Transform::down_sample(down_ratio);
        let max_x = (feat_w - 1) as f32;
        let max_y = (feat_h - 1) as f32;
        let shrink_ratio = (1.0 - self.center_ratio as f32) / 2.0;
        let regions = bbox::center_regions(bboxes, shrink_ratio);
        let area_weights = self.area_process.area_metrics(bboxes);

        let mut scratch = Array2::<f32>::zeros((feat_h, feat_w));

        // large boxes go first so that smaller ones overwrite them
        for index in priority_order(bboxes) {
            let bbox = &bboxes[index];
            let class = labels[index] - 1;
            let area_weight = area_weights[index];

            let feat_bbox = (&to_feature * bbox).clamp(max_x, max_y);
            let h_radius = (feat_bbox.h() as f64 * self.hm_center_ratio) as usize;
            let w_radius = (feat_bbox.w() as f64 * self.hm_center_ratio) as usize;
            let center = [
                (bbox.cx() / down_ratio) as i64,
                (bbox.cy() / down_ratio) as i64,
            ];

            scratch.fill(0.0);
            draw_truncate_gaussian(&mut scratch.view_mut(), center, h_radius, w_radius, 1.0);
            Zip::from(targets.heatmap.index_axis_mut(ndarray::Axis(0), class))
                .and(&scratch)
                .for_each(|heat, &value| *heat = heat.max(value));

            let cells = if self.wh_heatmap {
                scratch
                    .indexed_iter()
                    .filter(|(_, &value)| value > 0.0)
                    .map(|(cell, _)| cell)
                    .collect()
            } else {
                region_cells(&regions[index], down_ratio, max_x, max_y)
            };

            let ltrb: [f32; 4] = bbox.into();
            for (channel, value) in self.layout.plane_range(class).zip(ltrb) {
                cells.iter().for_each(|&(row, col)| {
                    targets.box_target[[channel, row, col]] = value;
                });
            }

            let local_sum: f64 = cells
                .iter()
                .map(|&(row, col)| scratch[[row, col]] as f64)
                .sum();
            if local_sum <= 0.0 || !area_weight.is_finite() || area_weight <= 0.0 {
                warn!(
                    "skip weights of degenerate box {:?}, gaussian mass {} and area weight {}",
                    bbox, local_sum, area_weight
                );
                continue;
            }

            let plane = self.layout.weight_plane(class);
            cells.iter().for_each(|&(row, col)| {
                let weight = scratch[[row, col]] as f64 * area_weight as f64 / local_sum;
                targets.wh_weight[[plane, row, col]] = weight as f32;
            });
        }

        Ok(targets)
    }
}

/// Collect the `(row, col)` cells of a center region on the feature grid.
///
/// Edges are rounded to integer image pixels, scaled down and rounded again,
/// with halfway values rounded to even.
fn region_cells(
    region: &LTRB<f32>,
    down_ratio: f32,
    max_x: f32,
    max_y: f32,
) -> Vec<(usize, usize)> {
    let to_cell = |value: f32, max: f32| {
        (value.round_ties_even() / down_ratio)
            .round_ties_even()
            .clamp(0.0, max) as usize
    };
    let [l, t, r, b]: [f32; 4] = region.into();
    let (x1, y1) = (to_cell(l, max_x), to_cell(t, max_y));
    let (x2, y2) = (to_cell(r, max_x), to_cell(b, max_y));

    (y1..=y2)
        .flat_map(|row| (x1..=x2).map(move |col| (row, col)))
        .collect()
}

/// The targets of one image.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTargets {
    /// `[num_fg, height, width]` center likelihood in `[0, 1]`.
    pub heatmap: Array3<f32>,
    /// `[wh_planes, height, width]` absolute `[l, t, r, b]` boxes, or -1 where unassigned.
    pub box_target: Array3<f32>,
    /// `[weight_planes, height, width]` regression weights.
    pub wh_weight: Array3<f32>,
}

impl ImageTargets {
    pub fn new(num_fg: usize, layout: RegressionLayout, feature_shape: [usize; 2]) -> Self {
        let [h, w] = feature_shape;
        Self {
            heatmap: Array3::zeros((num_fg, h, w)),
            box_target: Array3::from_elem((layout.wh_planes(), h, w), -1.0),
            wh_weight: Array3::zeros((layout.weight_planes(), h, w)),
        }
    }

    /// The number of heatmap cells holding a gaussian peak.
    pub fn num_peaks(&self) -> usize {
        self.heatmap.iter().filter(|&&value| value >= 1.0).count()
    }

    /// The number of cells with a positive regression weight.
    pub fn num_positive_cells(&self) -> usize {
        self.wh_weight.iter().filter(|&&value| value > 0.0).count()
    }

    pub fn weight_sum(&self) -> f64 {
        self.wh_weight.iter().map(|&value| value as f64).sum()
    }
}

/// Batched training targets.
#[derive(Debug, TensorLike, Getters)]
pub struct TtfTargets {
    /// `[batch, num_fg, height, width]`
    #[getset(get = "pub")]
    heatmap: Tensor,
    /// `[batch, wh_planes, height, width]`
    #[getset(get = "pub")]
    box_target: Tensor,
    /// `[batch, weight_planes, height, width]`
    #[getset(get = "pub")]
    wh_weight: Tensor,
}

impl TtfTargets {
    /// Stack per-image targets into batch tensors on the device.
    pub fn from_images(images: &[ImageTargets], device: Device) -> Result<Self> {
        ensure!(!images.is_empty(), "the batch must not be empty");

        let stack = |arrays: Vec<&Array3<f32>>| -> Result<Tensor> {
            let tensors: Vec<Tensor> = arrays
                .into_iter()
                .map(|array| {
                    let (c, h, w) = array.dim();
                    let values = array
                        .as_slice()
                        .ok_or_else(|| format_err!("target arrays must be contiguous"))?;
                    Ok(Tensor::of_slice(values).view([c as i64, h as i64, w as i64]))
                })
                .collect::<Result<_>>()?;
            Ok(Tensor::f_stack(&tensors, 0)?.to_device(device))
        };

        tch::no_grad(|| {
            let (heatmaps, box_targets, wh_weights): (Vec<_>, Vec<_>, Vec<_>) = images
                .iter()
                .map(|image| (&image.heatmap, &image.box_target, &image.wh_weight))
                .unzip_n_vec();

            Ok(Self {
                heatmap: stack(heatmaps)?,
                box_target: stack(box_targets)?,
                wh_weight: stack(wh_weights)?,
            })
        })
    }

    pub fn batch_size(&self) -> i64 {
        self.heatmap.size()[0]
    }
}
