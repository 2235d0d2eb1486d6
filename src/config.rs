use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::{CurateError, Result};

/// Command-line arguments for curating the pill corpus into a YOLO dataset.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// YAML configuration file describing the dataset layout
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Root directory of the dataset (overrides `base_dir` from the config)
    #[arg(short = 'd', long = "base_dir", global = true)]
    pub base_dir: Option<PathBuf>,

    /// Delete and recreate stage output directories before writing
    #[arg(long = "clean", global = true)]
    pub clean: bool,

    /// Allowed overshoot outside [0, 1] for normalized boxes
    #[arg(long = "tolerance", global = true, value_parser = validate_tolerance)]
    pub tolerance: Option<f64>,

    /// How training images are made visible in the YOLO image directory
    #[arg(long = "link_mode", global = true, value_enum)]
    pub link_mode: Option<LinkMode>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Sort raw images into matched / mismatched / unannotated
    Classify,
    /// Gather per-pill annotation fragments into one folder per image
    Collect,
    /// Merge each image's fragments into a single annotation record
    Merge,
    /// Build and save the category id <-> class index mapping
    Map,
    /// Write YOLO labels, link images and create data.yaml
    Yolo,
    /// Run every stage from classification to the YOLO dataset
    Run,
    /// Convert detections from the external predictor into a submission CSV
    Submit {
        /// JSON file mapping image file names to detections
        #[arg(long = "detections")]
        detections: PathBuf,

        /// Output CSV path
        #[arg(short = 'o', long = "output")]
        output: PathBuf,
    },
}

// Strategy used to expose images under the YOLO training directory
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkMode {
    /// Symlink when the filesystem supports it, copy otherwise
    #[default]
    Auto,
    Symlink,
    Copy,
}

/// How pill ids are encoded in image names and annotation folders.
///
/// An image `K-001900-016548_0_2.png` carries ids `001900` and `016548`;
/// its fragments live in `K-001900-016548_json/K-<id>/<stem>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    pub prefix: String,
    pub id_separator: String,
    pub suffix_delimiter: String,
    pub group_suffix: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            prefix: "K-".to_string(),
            id_separator: "-".to_string(),
            suffix_delimiter: "_".to_string(),
            group_suffix: "_json".to_string(),
        }
    }
}

/// Directory names relative to `base_dir`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub raw_images: String,
    pub raw_annotations: String,
    pub filtered: String,
    pub processed: String,
    pub yolo: String,
    pub mapping_file: String,
    pub data_yaml: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            raw_images: "raw/images".to_string(),
            raw_annotations: "raw/annotations".to_string(),
            filtered: "filtered".to_string(),
            processed: "processed".to_string(),
            yolo: "yolo".to_string(),
            mapping_file: "mapping/category_mapping.json".to_string(),
            data_yaml: "yolo/data.yaml".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub naming: NamingConfig,
    pub paths: PathsConfig,
    pub geometry_tolerance: f64,
    pub link_mode: LinkMode,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            naming: NamingConfig::default(),
            paths: PathsConfig::default(),
            geometry_tolerance: 1e-6,
            link_mode: LinkMode::Auto,
        }
    }
}

impl PipelineConfig {
    /// Load a YAML config file; missing keys fall back to their defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| CurateError::io(path, e))?;
        serde_yaml::from_reader(file).map_err(|source| CurateError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<()> {
        let naming = &self.naming;
        if naming.prefix.is_empty() {
            return Err(CurateError::Config("naming.prefix must not be empty".into()));
        }
        if naming.id_separator.is_empty() || naming.suffix_delimiter.is_empty() {
            return Err(CurateError::Config(
                "naming.id_separator and naming.suffix_delimiter must not be empty".into(),
            ));
        }
        if naming.id_separator == naming.suffix_delimiter {
            return Err(CurateError::Config(format!(
                "naming.id_separator and naming.suffix_delimiter are both '{}'",
                naming.id_separator
            )));
        }
        if !self.geometry_tolerance.is_finite() || self.geometry_tolerance < 0.0 {
            return Err(CurateError::Config(format!(
                "geometry_tolerance must be a non-negative number, got {}",
                self.geometry_tolerance
            )));
        }

        let paths = &self.paths;
        for (key, value) in [
            ("paths.raw_images", &paths.raw_images),
            ("paths.raw_annotations", &paths.raw_annotations),
            ("paths.filtered", &paths.filtered),
            ("paths.processed", &paths.processed),
            ("paths.yolo", &paths.yolo),
            ("paths.mapping_file", &paths.mapping_file),
            ("paths.data_yaml", &paths.data_yaml),
        ] {
            if value.trim().is_empty() {
                return Err(CurateError::Config(format!("{} must not be empty", key)));
            }
        }
        Ok(())
    }
}

impl Args {
    /// Resolve the effective configuration: file (or defaults), then CLI overrides.
    pub fn to_pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(tolerance) = self.tolerance {
            config.geometry_tolerance = tolerance;
        }
        if let Some(link_mode) = self.link_mode {
            config.link_mode = link_mode;
        }
        config.validate()?;
        Ok(config)
    }
}

/// Image and annotation directories for one classification outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDirs {
    pub images: PathBuf,
    pub annotations: PathBuf,
}

impl ClassDirs {
    fn under(root: &Path) -> Self {
        Self {
            images: root.join("images"),
            annotations: root.join("annotations"),
        }
    }
}

/// Every location the pipeline reads or writes, resolved once from the config.
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetLayout {
    pub base_dir: PathBuf,
    pub raw_images_dir: PathBuf,
    pub raw_annotations_dir: PathBuf,
    pub filtered_dir: PathBuf,
    pub matched: ClassDirs,
    pub mismatched: ClassDirs,
    pub unannotated: ClassDirs,
    pub processed_dir: PathBuf,
    pub processed_images_dir: PathBuf,
    pub processed_labels_dir: PathBuf,
    pub processed_mismatched_images_dir: PathBuf,
    pub processed_mismatched_labels_dir: PathBuf,
    pub yolo_dir: PathBuf,
    pub yolo_images_dir: PathBuf,
    pub yolo_labels_dir: PathBuf,
    pub mapping_file: PathBuf,
    pub data_yaml: PathBuf,
}

impl DatasetLayout {
    pub fn resolve(config: &PipelineConfig) -> Self {
        let base = config.base_dir.clone();
        let paths = &config.paths;
        let filtered_dir = base.join(&paths.filtered);
        let processed_dir = base.join(&paths.processed);
        let yolo_dir = base.join(&paths.yolo);

        Self {
            raw_images_dir: base.join(&paths.raw_images),
            raw_annotations_dir: base.join(&paths.raw_annotations),
            matched: ClassDirs::under(&filtered_dir.join("matched")),
            mismatched: ClassDirs::under(&filtered_dir.join("mismatched")),
            unannotated: ClassDirs::under(&filtered_dir.join("unannotated")),
            filtered_dir,
            processed_images_dir: processed_dir.join("images"),
            processed_labels_dir: processed_dir.join("labels"),
            processed_mismatched_images_dir: processed_dir.join("mismatched_images"),
            processed_mismatched_labels_dir: processed_dir.join("mismatched_labels"),
            processed_dir,
            yolo_images_dir: yolo_dir.join("images").join("train"),
            yolo_labels_dir: yolo_dir.join("labels").join("train"),
            yolo_dir,
            mapping_file: base.join(&paths.mapping_file),
            data_yaml: base.join(&paths.data_yaml),
            base_dir: base,
        }
    }
}

// Validate that the tolerance is a small non-negative number
fn validate_tolerance(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..1.0).contains(&val) => Ok(val),
        _ => Err("TOLERANCE must be in [0.0, 1.0)".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_tolerance() {
        assert!(validate_tolerance("0.0").is_ok());
        assert!(validate_tolerance("0.001").is_ok());
        assert!(validate_tolerance("1.0").is_err());
        assert!(validate_tolerance("-0.1").is_err());
        assert!(validate_tolerance("abc").is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: PipelineConfig =
            serde_yaml::from_str("base_dir: /data\nnaming:\n  prefix: P-\n").unwrap();
        assert_eq!(config.base_dir, PathBuf::from("/data"));
        assert_eq!(config.naming.prefix, "P-");
        assert_eq!(config.naming.group_suffix, "_json");
        assert_eq!(config.paths, PathsConfig::default());
        assert_eq!(config.link_mode, LinkMode::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_clashing_separators() {
        let mut config = PipelineConfig::default();
        config.naming.suffix_delimiter = "-".to_string();
        assert!(matches!(config.validate(), Err(CurateError::Config(_))));
    }

    #[test]
    fn test_layout_follows_contract() {
        let config = PipelineConfig {
            base_dir: PathBuf::from("/data"),
            ..PipelineConfig::default()
        };
        let layout = DatasetLayout::resolve(&config);
        assert_eq!(layout.raw_images_dir, PathBuf::from("/data/raw/images"));
        assert_eq!(
            layout.mismatched.annotations,
            PathBuf::from("/data/filtered/mismatched/annotations")
        );
        assert_eq!(
            layout.processed_mismatched_labels_dir,
            PathBuf::from("/data/processed/mismatched_labels")
        );
        assert_eq!(layout.yolo_images_dir, PathBuf::from("/data/yolo/images/train"));
        assert_eq!(layout.yolo_labels_dir, PathBuf::from("/data/yolo/labels/train"));
    }
}
