//! Pill image corpus to YOLO dataset curation
//!
//! This library sorts raw pill images by annotation completeness, merges the
//! per-pill COCO-style annotation fragments of each image into one record,
//! maps sparse category ids onto dense class indices and writes normalized
//! YOLO labels for training.

pub mod classify;
pub mod collect;
pub mod config;
pub mod conversion;
pub mod dataset;
pub mod error;
pub mod identity;
pub mod io;
pub mod link;
pub mod mapping;
pub mod merge;
pub mod submission;
pub mod types;
pub mod utils;
pub mod yolo_dataset;

// Re-export commonly used types and functions
pub use config::{Args, Command, DatasetLayout, LinkMode, PipelineConfig};
pub use dataset::{curate, run_all, CurationReport};
pub use error::{CurateError, Result};
pub use identity::parse_identity;
pub use mapping::CategoryMapping;
pub use types::{AnnotationFile, ImageClass, NormalizedLabel, PillIdentity};
pub use yolo_dataset::process_yolo_dataset;
