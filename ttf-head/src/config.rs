//! Head configuration format.

use crate::{area::AreaProcess, common::*, head::TtfHeadInit};

/// The head configuration. Omitted fields fall back to the defaults of [TtfHeadInit].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub base_down_ratio: Option<usize>,
    pub planes: Option<Vec<usize>>,
    pub shortcut_cfg: Option<Vec<usize>>,
    pub num_classes: Option<usize>,
    pub wh_offset_base: Option<R64>,
    pub wh_area_process: Option<AreaProcess>,
    pub wh_agnostic: Option<bool>,
    pub wh_heatmap: Option<bool>,
    pub hm_center_ratio: Option<R64>,
    pub center_ratio: Option<R64>,
    pub giou_weight: Option<R64>,
    pub hm_weight: Option<R64>,
    pub max_per_img: Option<usize>,
    pub score_thr: Option<R64>,
}

impl Config {
    pub fn open<P>(path: P) -> Result<Self>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("unable to read config file '{}'", path.display()))?;
        let config = Self::from_str(&text)
            .with_context(|| format!("unable to parse config file '{}'", path.display()))?;
        Ok(config)
    }

    pub fn head_init(&self) -> TtfHeadInit {
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
        } = self.clone();
        let default = TtfHeadInit::default();

        TtfHeadInit {
            base_down_ratio: base_down_ratio.unwrap_or(default.base_down_ratio),
            planes: planes.unwrap_or(default.planes),
            shortcut_cfg: shortcut_cfg.unwrap_or(default.shortcut_cfg),
            num_classes: num_classes.unwrap_or(default.num_classes),
            wh_offset_base: wh_offset_base.map_or(default.wh_offset_base, R64::raw),
            wh_area_process: wh_area_process.unwrap_or(default.wh_area_process),
            wh_agnostic: wh_agnostic.unwrap_or(default.wh_agnostic),
            wh_heatmap: wh_heatmap.unwrap_or(default.wh_heatmap),
            hm_center_ratio: hm_center_ratio.map_or(default.hm_center_ratio, R64::raw),
            center_ratio: center_ratio.map_or(default.center_ratio, R64::raw),
            giou_weight: giou_weight.map_or(default.giou_weight, R64::raw),
            hm_weight: hm_weight.map_or(default.hm_weight, R64::raw),
            max_per_img: max_per_img.unwrap_or(default.max_per_img),
            score_thr: score_thr.map_or(default.score_thr, R64::raw),
        }
    }
}

impl FromStr for Config {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Ok(json5::from_str(text)?)
    }
}
