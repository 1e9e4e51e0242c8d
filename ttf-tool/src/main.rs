use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use prettytable::{cell, row, Table};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use ttf_head::{Config, ImageGroundTruth, ImageMeta, TtfHead};

#[derive(Debug, Clone, Parser)]
/// Inspect TTF head configurations and the training targets they produce.
enum Opts {
    Info {
        /// configuration file
        config_file: PathBuf,
    },
    Targets {
        /// configuration file
        config_file: PathBuf,
        /// JSON5 annotation file
        annotation_file: PathBuf,
    },
}

/// An annotated image in the annotation file.
#[derive(Debug, Clone, Deserialize)]
struct Annotation {
    meta: ImageMeta,
    #[serde(default)]
    bboxes: Vec<[f32; 4]>,
    #[serde(default)]
    labels: Vec<usize>,
}

fn main() -> Result<()> {
    pretty_env_logger::init();

    match Opts::parse() {
        Opts::Info { config_file } => info(config_file)?,
        Opts::Targets {
            config_file,
            annotation_file,
        } => targets(config_file, annotation_file)?,
    }

    Ok(())
}

fn load_head(config_file: impl AsRef<Path>) -> Result<TtfHead> {
    let config = Config::open(config_file)?;
    config.head_init().build()
}

fn load_annotations(annotation_file: impl AsRef<Path>) -> Result<Vec<Annotation>> {
    let annotation_file = annotation_file.as_ref();
    let text = std::fs::read_to_string(annotation_file).with_context(|| {
        format!(
            "unable to read annotation file '{}'",
            annotation_file.display()
        )
    })?;
    let annotations = json5::from_str(&text).with_context(|| {
        format!(
            "unable to parse annotation file '{}'",
            annotation_file.display()
        )
    })?;
    Ok(annotations)
}

fn info(config_file: impl AsRef<Path>) -> Result<()> {
    let head = load_head(config_file)?;
    let layout = head.layout();

    let mut table = Table::new();
    table.add_row(row!["property", "value"]);
    table.add_row(row!["down ratio", head.down_ratio()]);
    table.add_row(row!["foreground classes", head.num_fg()]);
    table.add_row(row!["class agnostic", layout.is_agnostic()]);
    table.add_row(row!["regression planes", layout.wh_planes()]);
    table.add_row(row!["weight planes", layout.weight_planes()]);
    table.add_row(row!["area process", head.area_process()]);
    table.add_row(row!["wh offset base", head.wh_offset_base()]);
    table.printstd();

    Ok(())
}

fn targets(config_file: impl AsRef<Path>, annotation_file: impl AsRef<Path>) -> Result<()> {
    let head = load_head(config_file)?;
    let annotations = load_annotations(annotation_file)?;
    info!("loaded {} annotated images", annotations.len());

    let mut table = Table::new();
    table.add_row(row![
        "index",
        "pad shape",
        "feature shape",
        "boxes",
        "peaks",
        "positive cells",
        "weight sum"
    ]);

    for (index, annotation) in annotations.into_iter().enumerate() {
        let Annotation {
            meta,
            bboxes,
            labels,
        } = annotation;
        let gt = ImageGroundTruth::from_raw(&bboxes, labels)
            .with_context(|| format!("invalid annotation at index {}", index))?;
        let feature_shape = head.feature_shape(&meta);
        let targets = head
            .target_generator()
            .image_targets(&gt, feature_shape)
            .with_context(|| format!("failed to build targets for image {}", index))?;

        table.add_row(row![
            index,
            format!("{:?}", meta.pad_shape),
            format!("{:?}", feature_shape),
            gt.len(),
            targets.num_peaks(),
            targets.num_positive_cells(),
            format!("{:.4}", targets.weight_sum()),
        ]);
    }

    table.printstd();
    Ok(())
}
