use log::info;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::config::DatasetLayout;
use crate::error::{CurateError, Result};
use crate::mapping::CategoryMapping;
use crate::utils::{copy_into, create_output_directory, list_images};

/// Pipeline stages that own output directories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Classify,
    Collect,
    Merge,
    Yolo,
}

/// Output directories written by `stage`.
pub fn stage_outputs(layout: &DatasetLayout, stage: Stage) -> Vec<&Path> {
    match stage {
        Stage::Classify => vec![
            layout.matched.images.as_path(),
            layout.mismatched.images.as_path(),
            layout.unannotated.images.as_path(),
        ],
        Stage::Collect => vec![
            layout.matched.annotations.as_path(),
            layout.mismatched.annotations.as_path(),
            layout.unannotated.annotations.as_path(),
        ],
        Stage::Merge => vec![
            layout.processed_images_dir.as_path(),
            layout.processed_labels_dir.as_path(),
            layout.processed_mismatched_images_dir.as_path(),
            layout.processed_mismatched_labels_dir.as_path(),
        ],
        Stage::Yolo => vec![
            layout.yolo_images_dir.as_path(),
            layout.yolo_labels_dir.as_path(),
        ],
    }
}

/// Set up the output directories of one stage, optionally clearing them first.
pub fn setup_output_directories(layout: &DatasetLayout, stage: Stage, clean: bool) -> Result<()> {
    for dir in stage_outputs(layout, stage) {
        create_output_directory(dir, clean)?;
    }
    Ok(())
}

/// Copy every image of `src_dir` into `dst_dir`. Returns the number copied.
pub fn copy_images(src_dir: &Path, dst_dir: &Path) -> Result<usize> {
    let images = list_images(src_dir)?;
    for image in &images {
        copy_into(image, dst_dir)?;
    }
    Ok(images.len())
}

/// Dataset description consumed by the training library.
///
/// `names[i]` is the display name of class index `i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetManifest {
    pub path: String,
    pub train: String,
    pub val: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DatasetManifest {
    pub fn new(layout: &DatasetLayout, mapping: &CategoryMapping) -> Result<Self> {
        let root = fs::canonicalize(&layout.base_dir)
            .map_err(|e| CurateError::io(&layout.base_dir, e))?;
        let train = relative_to(&layout.yolo_images_dir, &layout.base_dir);
        Ok(Self {
            path: root.to_string_lossy().into_owned(),
            val: train.clone(),
            train,
            nc: mapping.len(),
            names: mapping.names().to_vec(),
        })
    }
}

fn relative_to(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .map(PathBuf::from)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .replace('\\', "/")
}

/// Create the data.yaml file for YOLO training
pub fn create_dataset_yaml(layout: &DatasetLayout, mapping: &CategoryMapping) -> Result<PathBuf> {
    let manifest = DatasetManifest::new(layout, mapping)?;
    let yaml_path = &layout.data_yaml;
    if let Some(parent) = yaml_path.parent() {
        fs::create_dir_all(parent).map_err(|e| CurateError::io(parent, e))?;
    }

    let yaml_content = serde_yaml::to_string(&manifest).map_err(|source| CurateError::Yaml {
        path: yaml_path.clone(),
        source,
    })?;
    let file = File::create(yaml_path).map_err(|e| CurateError::io(yaml_path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(yaml_content.as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| CurateError::io(yaml_path, e))?;

    info!(
        "Wrote {:?} ({} classes, train: {})",
        yaml_path, manifest.nc, manifest.train
    );
    Ok(yaml_path.clone())
}
