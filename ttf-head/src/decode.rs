//! Decoding of dense predictions into scored boxes.

use crate::{common::*, layout::RegressionLayout, meta::ImageMeta};

#[derive(Debug, Clone)]
pub struct TtfDecoderInit {
    pub layout: RegressionLayout,
    pub down_ratio: usize,
    /// The maximum number of detections per image.
    pub max_per_img: usize,
    /// Detections with scores at or below the threshold are dropped.
    pub score_thr: R64,
    /// The neighborhood size of the peak test.
    pub nms_kernel: i64,
}

impl Default for TtfDecoderInit {
    fn default() -> Self {
        Self {
            layout: RegressionLayout::PerClass { num_fg: 80 },
            down_ratio: 4,
            max_per_img: 100,
            score_thr: r64(0.01),
            nms_kernel: 3,
        }
    }
}

impl TtfDecoderInit {
    pub fn build(self) -> Result<TtfDecoder> {
        let Self {
            layout,
            down_ratio,
            max_per_img,
            score_thr,
            nms_kernel,
        } = self;

        ensure!(down_ratio > 0, "down_ratio must be positive");
        ensure!(max_per_img > 0, "max_per_img must be positive");
        ensure!(
            score_thr >= 0.0,
            "score_thr must be non-negative, but get {}",
            score_thr
        );
        ensure!(
            nms_kernel > 0 && nms_kernel % 2 == 1,
            "nms_kernel must be a positive odd number, but get {}",
            nms_kernel
        );

        Ok(TtfDecoder {
            layout,
            down_ratio,
            max_per_img,
            score_thr: score_thr.raw(),
            nms_kernel,
        })
    }
}

#[derive(Debug)]
pub struct TtfDecoder {
    layout: RegressionLayout,
    down_ratio: usize,
    max_per_img: usize,
    score_thr: f64,
    nms_kernel: i64,
}

impl TtfDecoder {
    /// Decode activated predictions into per-image detections.
    ///
    /// With `rescale`, box coordinates are divided by the image scale factors.
    pub fn forward(
        &self,
        pred_heatmap: &Tensor,
        pred_wh: &Tensor,
        metas: &[ImageMeta],
        rescale: bool,
    ) -> Result<Vec<ImageDetections>> {
        let (batch, num_fg, height, width) = pred_heatmap.size4()?;
        let wh_planes = self.layout.wh_planes() as i64;
        ensure!(
            self.layout.is_agnostic() || num_fg == self.layout.weight_planes() as i64,
            "the regression layout {:?} does not match {} heatmap channels",
            self.layout,
            num_fg
        );
        ensure!(
            pred_wh.size() == vec![batch, wh_planes, height, width],
            "expect regression shape {:?}, but get {:?}",
            [batch, wh_planes, height, width],
            pred_wh.size()
        );
        ensure!(
            metas.len() == batch as usize,
            "the number of image metas ({}) does not match the batch size ({})",
            metas.len(),
            batch
        );

        let device = pred_heatmap.device();
        let candidates = tch::no_grad(|| self.select_candidates(pred_heatmap, pred_wh))?;

        metas
            .iter()
            .zip(candidates)
            .map(|(meta, candidates)| {
                candidates.into_detections(
                    self.layout,
                    self.down_ratio as f32,
                    width,
                    self.score_thr,
                    rescale.then(|| meta.scale_factor),
                    device,
                )
            })
            .collect()
    }

    /// Run peak suppression and two-stage top-k on the whole batch.
    fn select_candidates(
        &self,
        pred_heatmap: &Tensor,
        pred_wh: &Tensor,
    ) -> Result<Vec<Candidates>> {
        let (batch, num_fg, height, width) = pred_heatmap.size4()?;
        let wh_planes = pred_wh.size()[1];
        let num_cells = height * width;

        if batch == 0 {
            return Ok(vec![]);
        }
        if num_fg == 0 || num_cells == 0 {
            return Ok((0..batch).map(|_| Candidates::default()).collect());
        }

        let heat = pred_heatmap
            .detach()
            .sigmoid()
            .f_suppress_non_peaks(self.nms_kernel)?;

        // top-k within each class, then top-k across classes
        let per_class_k = (self.max_per_img as i64).min(num_cells);
        let (class_scores, class_cells) = heat
            .view([batch, num_fg, num_cells])
            .f_topk(per_class_k, -1, true, true)?;
        let k = (self.max_per_img as i64).min(num_fg * per_class_k);
        let (scores, picks) = class_scores
            .view([batch, num_fg * per_class_k])
            .f_topk(k, -1, true, true)?;
        let cells = class_cells
            .view([batch, num_fg * per_class_k])
            .f_gather(1, &picks, false)?;

        let offsets = {
            let wh = pred_wh
                .detach()
                .permute(&[0, 2, 3, 1])
                .contiguous()
                .view([batch, num_cells, wh_planes]);
            let index = cells.unsqueeze(-1).expand(&[batch, k, wh_planes], false);
            wh.f_gather(1, &index, false)?
        };

        let flatten = |tensor: &Tensor, kind: Kind| -> Tensor {
            tensor
                .to_device(Device::Cpu)
                .to_kind(kind)
                .contiguous()
                .view([-1])
        };
        let scores = Vec::<f32>::from(&flatten(&scores, Kind::Float));
        let picks = Vec::<i64>::from(&flatten(&picks, Kind::Int64));
        let cells = Vec::<i64>::from(&flatten(&cells, Kind::Int64));
        let offsets = Vec::<f32>::from(&flatten(&offsets, Kind::Float));

        let k = k as usize;
        let wh_planes = wh_planes as usize;
        let candidates = (0..batch as usize)
            .map(|index| {
                let range = (index * k)..((index + 1) * k);
                Candidates {
                    scores: scores[range.clone()].to_vec(),
                    classes: picks[range.clone()]
                        .iter()
                        .map(|&pick| (pick / per_class_k) as usize)
                        .collect(),
                    cells: cells[range]
                        .iter()
                        .map(|&cell| cell as usize)
                        .collect(),
                    offsets: offsets[(index * k * wh_planes)..((index + 1) * k * wh_planes)]
                        .to_vec(),
                }
            })
            .collect();

        Ok(candidates)
    }
}

/// The top-k cells of one image in descending score order.
#[derive(Debug, Clone, Default)]
struct Candidates {
    scores: Vec<f32>,
    classes: Vec<usize>,
    /// Flat `row * width + col` cell indexes.
    cells: Vec<usize>,
    /// `wh_planes` regression values per candidate.
    offsets: Vec<f32>,
}

impl Candidates {
    fn into_detections(
        self,
        layout: RegressionLayout,
        down_ratio: f32,
        width: i64,
        score_thr: f64,
        scale_factor: Option<[f32; 4]>,
        device: Device,
    ) -> Result<ImageDetections> {
        let Self {
            scores,
            classes,
            cells,
            offsets,
        } = self;
        let width = width as usize;
        let wh_planes = layout.wh_planes();

        let (rows, labels): (Vec<[f32; 5]>, Vec<i64>) = izip!(0.., scores, classes, cells)
            .filter(|(_, score, _, _)| *score as f64 > score_thr)
            .map(|(index, score, class, cell)| {
                let x = (cell % width) as f32 * down_ratio;
                let y = (cell / width) as f32 * down_ratio;
                let planes = layout.plane_range(class);
                let base = index * wh_planes;
                let dist = &offsets[(base + planes.start)..(base + planes.end)];

                let mut ltrb = [x - dist[0], y - dist[1], x + dist[2], y + dist[3]];
                if let Some(factor) = scale_factor {
                    ltrb.iter_mut()
                        .zip(factor)
                        .for_each(|(value, factor)| *value /= factor);
                }

                let [l, t, r, b] = ltrb;
                ([l, t, r, b, score], class as i64)
            })
            .unzip();

        let num = rows.len() as i64;
        let flat: Vec<f32> = rows.iter().flatten().copied().collect();
        let bboxes = Tensor::of_slice(&flat).view([num, 5]).to_device(device);
        let labels = Tensor::of_slice(&labels).to_device(device);

        Ok(ImageDetections { bboxes, labels })
    }
}

/// Detections of one image.
#[derive(Debug, TensorLike)]
pub struct ImageDetections {
    /// `[num, 5]` rows of `[l, t, r, b, score]` in descending score order.
    pub bboxes: Tensor,
    /// `[num]` zero-based foreground class indexes.
    pub labels: Tensor,
}

impl ImageDetections {
    pub fn len(&self) -> usize {
        self.labels.size()[0] as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn scores(&self) -> Tensor {
        self.bboxes.select(1, 4)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn logit(prob: f64) -> f64 {
        (prob / (1.0 - prob)).ln()
    }

    fn decoder(layout: RegressionLayout, max_per_img: usize, score_thr: f64) -> Result<TtfDecoder> {
        TtfDecoderInit {
            layout,
            down_ratio: 4,
            max_per_img,
            score_thr: r64(score_thr),
            ..Default::default()
        }
        .build()
    }

    #[test]
    fn decode_single_peak() -> Result<()> {
        let device = Device::Cpu;
        let decoder = decoder(RegressionLayout::Agnostic, 1, 0.5)?;

        let heatmap = Tensor::full(&[1, 2, 16, 16], -20.0, (Kind::Float, device));
        let _ = heatmap.i((0, 1, 7, 7)).fill_(logit(0.9));
        let wh = Tensor::zeros(&[1, 4, 16, 16], (Kind::Float, device));
        for (channel, value) in [18.0, 18.0, 22.0, 22.0].iter().enumerate() {
            let _ = wh.i((0, channel as i64, 7, 7)).fill_(*value);
        }

        let detections = decoder.forward(&heatmap, &wh, &[ImageMeta::new([64, 64])], false)?;
        assert_eq!(detections.len(), 1);
        let detections = &detections[0];
        assert_eq!(detections.len(), 1);

        let row: Vec<f32> = Vec::from(&detections.bboxes.view([-1]));
        assert_abs_diff_eq!(row[0], 10.0, epsilon = 2.0);
        assert_abs_diff_eq!(row[1], 10.0, epsilon = 2.0);
        assert_abs_diff_eq!(row[2], 50.0, epsilon = 2.0);
        assert_abs_diff_eq!(row[3], 50.0, epsilon = 2.0);
        assert_abs_diff_eq!(row[4], 0.9, epsilon = 1e-4);
        assert_eq!(detections.labels.int64_value(&[0]), 1);
        Ok(())
    }

    #[test]
    fn decode_per_class_offsets_and_rescale() -> Result<()> {
        let device = Device::Cpu;
        let decoder = decoder(RegressionLayout::PerClass { num_fg: 3 }, 10, 0.3)?;

        let heatmap = Tensor::full(&[1, 3, 8, 8], -20.0, (Kind::Float, device));
        let _ = heatmap.i((0, 2, 2, 5)).fill_(logit(0.8));
        let _ = heatmap.i((0, 0, 6, 1)).fill_(logit(0.6));

        let wh = Tensor::ones(&[1, 12, 8, 8], (Kind::Float, device));
        for channel in 8..12 {
            let _ = wh.i((0, channel, 2, 5)).fill_(4.0);
        }

        let mut meta = ImageMeta::new([32, 32]);
        meta.scale_factor = [2.0, 2.0, 2.0, 2.0];
        let detections = decoder.forward(&heatmap, &wh, &[meta], true)?;
        let detections = &detections[0];
        assert_eq!(detections.len(), 2);

        let rows: Vec<f32> = Vec::from(&detections.bboxes.view([-1]));
        // x = 20, y = 8 with class 2 offsets of 4
        assert_eq!(&rows[0..4], &[8.0, 2.0, 12.0, 6.0]);
        assert_abs_diff_eq!(rows[4], 0.8, epsilon = 1e-4);
        // x = 4, y = 24 with class 0 offsets of 1
        assert_eq!(&rows[5..9], &[1.5, 11.5, 2.5, 12.5]);

        let labels: Vec<i64> = Vec::from(&detections.labels);
        assert_eq!(labels, vec![2, 0]);
        Ok(())
    }

    #[test]
    fn decode_top_k_is_sorted_and_bounded() -> Result<()> {
        let device = Device::Cpu;
        let heatmap = Tensor::full(&[2, 2, 8, 8], -20.0, (Kind::Float, device));
        let peaks = [
            (0, 0, 1, 1, 0.55),
            (0, 1, 1, 5, 0.95),
            (0, 0, 5, 1, 0.75),
            (0, 1, 6, 6, 0.65),
            (1, 0, 3, 3, 0.85),
        ];
        for &(image, class, row, col, prob) in &peaks {
            let _ = heatmap.i((image, class, row, col)).fill_(logit(prob));
        }
        let wh = Tensor::ones(&[2, 4, 8, 8], (Kind::Float, device));
        let metas = [ImageMeta::new([32, 32]), ImageMeta::new([32, 32])];

        for max_per_img in [1, 3, 10] {
            let decoder = decoder(RegressionLayout::Agnostic, max_per_img, 0.5)?;
            let detections = decoder.forward(&heatmap, &wh, &metas, false)?;

            let expect = [max_per_img.min(4), max_per_img.min(1)];
            for (image, detections) in detections.iter().enumerate() {
                assert_eq!(detections.len(), expect[image]);
                let scores: Vec<f32> = Vec::from(&detections.scores());
                ensure!(scores.windows(2).all(|pair| pair[0] >= pair[1]));
            }
        }

        let decoder = decoder(RegressionLayout::Agnostic, 10, 0.7)?;
        let detections = decoder.forward(&heatmap, &wh, &metas, false)?;
        assert_eq!(detections[0].len(), 2);
        let labels: Vec<i64> = Vec::from(&detections[0].labels);
        assert_eq!(labels, vec![1, 0]);
        Ok(())
    }

    #[test]
    fn decode_suppresses_neighbors() -> Result<()> {
        let device = Device::Cpu;
        let decoder = decoder(RegressionLayout::Agnostic, 10, 0.5)?;
        let heatmap = Tensor::full(&[1, 1, 8, 8], -20.0, (Kind::Float, device));
        let _ = heatmap.i((0, 0, 4, 4)).fill_(logit(0.9));
        let _ = heatmap.i((0, 0, 4, 5)).fill_(logit(0.8));
        let wh = Tensor::ones(&[1, 4, 8, 8], (Kind::Float, device));

        let detections = decoder.forward(&heatmap, &wh, &[ImageMeta::new([32, 32])], false)?;
        assert_eq!(detections[0].len(), 1);
        Ok(())
    }

    #[test]
    fn decode_rejects_bad_input() -> Result<()> {
        let decoder = decoder(RegressionLayout::Agnostic, 10, 0.5)?;
        let heatmap = Tensor::zeros(&[2, 1, 8, 8], (Kind::Float, Device::Cpu));
        let wh = Tensor::zeros(&[2, 4, 8, 8], (Kind::Float, Device::Cpu));
        ensure!(decoder
            .forward(&heatmap, &wh, &[ImageMeta::new([32, 32])], false)
            .is_err());

        let wh = Tensor::zeros(&[2, 8, 8, 8], (Kind::Float, Device::Cpu));
        let metas = [ImageMeta::new([32, 32]), ImageMeta::new([32, 32])];
        ensure!(decoder.forward(&heatmap, &wh, &metas, false).is_err());

        ensure!(TtfDecoderInit {
            nms_kernel: 2,
            ..Default::default()
        }
        .build()
        .is_err());
        Ok(())
    }

    #[test]
    fn decode_rejects_class_count_mismatch() -> Result<()> {
        let device = Device::Cpu;
        let per_class = decoder(RegressionLayout::PerClass { num_fg: 2 }, 1, 0.1)?;
        let heatmap = Tensor::full(&[1, 3, 8, 8], -20.0, (Kind::Float, device));
        let _ = heatmap.i((0, 2, 3, 3)).fill_(logit(0.9));
        let wh = Tensor::ones(&[1, 8, 8, 8], (Kind::Float, device));

        let metas = [ImageMeta::new([32, 32])];
        ensure!(per_class.forward(&heatmap, &wh, &metas, false).is_err());

        // the agnostic layout accepts any class count
        let agnostic = decoder(RegressionLayout::Agnostic, 1, 0.1)?;
        let wh = Tensor::ones(&[1, 4, 8, 8], (Kind::Float, device));
        let detections = agnostic.forward(&heatmap, &wh, &metas, false)?;
        assert_eq!(detections[0].len(), 1);
        Ok(())
    }

    #[test]
    fn decode_rejects_zero_kernel() -> Result<()> {
        ensure!(TtfDecoderInit {
            nms_kernel: 0,
            ..Default::default()
        }
        .build()
        .is_err());
        Ok(())
    }
}
