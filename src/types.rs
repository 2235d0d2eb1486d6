use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::sync::OnceLock;

// Supported image formats
pub const IMG_FORMATS: &[&str] = &["bmp", "jpeg", "jpg", "png", "tif", "tiff", "webp"];

// Precomputed HashSet of image extensions for fast lookup
pub static IMAGE_EXTENSIONS_SET: OnceLock<HashSet<String>> = OnceLock::new();

/// Get the image extensions set
pub fn get_image_extensions_set() -> &'static HashSet<String> {
    IMAGE_EXTENSIONS_SET.get_or_init(|| IMG_FORMATS.iter().map(|ext| ext.to_lowercase()).collect())
}

/// Identity of an image derived from its file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PillIdentity {
    pub object_ids: Vec<String>,
    pub canonical_id: String,
    pub file_stem: String,
}

/// Image descriptor as found in the `images` array of an annotation file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub id: i64,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
}

/// Category descriptor; attributes other than `id`/`name` are carried through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One object annotation. `bbox` is `[x, y, width, height]` in pixels, kept
/// as the JSON numbers it was written with so merging never reformats it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub image_id: Option<i64>,
    pub category_id: i64,
    pub bbox: [Number; 4],
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Annotation {
    /// Pixel box as floats. A value without an `f64` form becomes NaN.
    pub fn pixel_bbox(&self) -> [f64; 4] {
        let [x, y, w, h] = &self.bbox;
        [x, y, w, h].map(|v| v.as_f64().unwrap_or(f64::NAN))
    }
}

/// COCO-style annotation document.
///
/// Used both for the per-pill fragments and for the merged per-image record;
/// a merged record always holds exactly one image and annotations whose ids
/// run `1..=N`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnnotationFile {
    #[serde(default)]
    pub images: Vec<ImageInfo>,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub categories: Vec<Category>,
}

impl AnnotationFile {
    /// The image this record describes. Only the first entry is meaningful.
    pub fn image(&self) -> Option<&ImageInfo> {
        self.images.first()
    }
}

/// Annotation completeness of a raw image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ImageClass {
    /// Every pill id has a fragment
    Matched,
    /// Some, but not all, pill ids have a fragment
    Mismatched,
    /// No pill id has a fragment
    Unannotated,
}

impl ImageClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageClass::Matched => "matched",
            ImageClass::Mismatched => "mismatched",
            ImageClass::Unannotated => "unannotated",
        }
    }
}

/// One line of a YOLO label file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloBox {
    pub class_index: usize,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

/// Normalized labels for one image, in annotation order.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedLabel {
    pub file_stem: String,
    pub boxes: Vec<YoloBox>,
}

impl NormalizedLabel {
    /// Render as YOLO text: `<class> <xc> <yc> <w> <h>` with six decimals.
    pub fn to_yolo_string(&self) -> String {
        let mut yolo_data = String::with_capacity(self.boxes.len() * 48);
        for b in &self.boxes {
            yolo_data.push_str(&format!(
                "{} {:.6} {:.6} {:.6} {:.6}\n",
                b.class_index, b.x_center, b.y_center, b.width, b.height
            ));
        }
        yolo_data
    }
}

// Struct to hold classification counters
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ClassificationStats {
    pub total_images: usize,
    pub matched: usize,
    pub mismatched: usize,
    pub unannotated: usize,
    pub skipped_invalid_name: usize,
}

impl ClassificationStats {
    pub fn record(&mut self, class: ImageClass) {
        self.total_images += 1;
        match class {
            ImageClass::Matched => self.matched += 1,
            ImageClass::Mismatched => self.mismatched += 1,
            ImageClass::Unannotated => self.unannotated += 1,
        }
    }

    pub fn record_skipped(&mut self) {
        self.total_images += 1;
        self.skipped_invalid_name += 1;
    }

    pub fn print_summary(&self) {
        log::info!("=== Classification Summary ===");
        log::info!("Total images: {}", self.total_images);
        log::info!("Matched: {}", self.matched);
        log::info!("Mismatched: {}", self.mismatched);
        log::info!("No annotation: {}", self.unannotated);
        if self.skipped_invalid_name > 0 {
            log::warn!(
                "Skipped (file name without pill ids): {}",
                self.skipped_invalid_name
            );
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CollectionStats {
    pub images_seen: usize,
    pub groups_created: usize,
    pub fragments_copied: usize,
    pub skipped_missing_group: usize,
    pub skipped_invalid_name: usize,
}

impl CollectionStats {
    pub fn print_summary(&self, label: &str) {
        log::info!(
            "[{}] collected {} fragments into {} image folders ({} images without annotation group)",
            label,
            self.fragments_copied,
            self.groups_created,
            self.skipped_missing_group
        );
        if self.skipped_invalid_name > 0 {
            log::warn!(
                "[{}] skipped {} images whose names carry no pill ids",
                label,
                self.skipped_invalid_name
            );
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct MergeStats {
    pub folders_seen: usize,
    pub merged_records: usize,
    pub skipped_empty: usize,
    pub annotations: usize,
}

impl MergeStats {
    pub fn print_summary(&self, label: &str) {
        log::info!(
            "[{}] merged annotations for {} images ({} annotations, {} empty folders skipped)",
            label,
            self.merged_records,
            self.annotations,
            self.skipped_empty
        );
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct LabelStats {
    pub records_seen: usize,
    pub labels_written: usize,
    pub boxes_written: usize,
    pub rejected_geometry: usize,
    pub images_linked: usize,
    pub images_already_present: usize,
    pub images_without_label: usize,
}

impl LabelStats {
    pub fn print_summary(&self) {
        log::info!("=== YOLO Dataset Summary ===");
        log::info!("Merged records read: {}", self.records_seen);
        log::info!(
            "Label files written: {} ({} boxes)",
            self.labels_written,
            self.boxes_written
        );
        log::info!(
            "Images linked: {} (already present: {})",
            self.images_linked,
            self.images_already_present
        );
        if self.rejected_geometry > 0 {
            log::warn!(
                "Records rejected for out-of-range boxes: {}",
                self.rejected_geometry
            );
        }
        if self.images_without_label > 0 {
            log::warn!(
                "Images left out for lack of a label file: {}",
                self.images_without_label
            );
        }
    }
}
