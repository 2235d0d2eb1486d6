use std::path::Path;

use crate::error::{CurateError, Result};
use crate::mapping::CategoryMapping;
use crate::types::{AnnotationFile, ImageInfo, NormalizedLabel, YoloBox};

/// Convert a pixel `[x, y, w, h]` box into normalized `(xc, yc, w, h)`.
pub fn normalize_bbox(
    bbox: [f64; 4],
    image_width: u32,
    image_height: u32,
) -> (f64, f64, f64, f64) {
    let [x, y, w, h] = bbox;
    let img_w = image_width as f64;
    let img_h = image_height as f64;

    let x_center = (x + w / 2.0) / img_w;
    let y_center = (y + h / 2.0) / img_h;
    let width = w / img_w;
    let height = h / img_h;

    (x_center, y_center, width, height)
}

/// Inverse of [`normalize_bbox`].
pub fn denormalize_bbox(
    normalized: (f64, f64, f64, f64),
    image_width: u32,
    image_height: u32,
) -> [f64; 4] {
    let (x_center, y_center, width, height) = normalized;
    let img_w = image_width as f64;
    let img_h = image_height as f64;
    let w = width * img_w;
    let h = height * img_h;
    [x_center * img_w - w / 2.0, y_center * img_h - h / 2.0, w, h]
}

fn in_unit_range(value: f64, tolerance: f64) -> bool {
    value.is_finite() && value >= -tolerance && value <= 1.0 + tolerance
}

/// Convert every annotation of a merged record into a YOLO box.
///
/// Boxes keep the record's annotation order. An unknown category id or a
/// box that leaves `[0, 1]` by more than `tolerance` is an error; values are
/// never clamped. `source` is the record's path, used for error context.
pub fn convert_record(
    source: &Path,
    record: &AnnotationFile,
    mapping: &CategoryMapping,
    tolerance: f64,
) -> Result<NormalizedLabel> {
    let image: &ImageInfo = record.image().ok_or_else(|| CurateError::MalformedFragment {
        path: source.to_path_buf(),
        reason: "no entry in \"images\"".to_string(),
    })?;

    let file_stem = Path::new(&image.file_name)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| image.file_name.clone());

    let mut boxes = Vec::with_capacity(record.annotations.len());
    for annotation in &record.annotations {
        let class_index = mapping.to_index(annotation.category_id)?;
        let (x_center, y_center, width, height) =
            normalize_bbox(annotation.pixel_bbox(), image.width, image.height);

        if ![x_center, y_center, width, height]
            .iter()
            .all(|&v| in_unit_range(v, tolerance))
        {
            return Err(CurateError::GeometryOutOfRange {
                file_name: image.file_name.clone(),
                annotation_id: annotation.id,
                x_center,
                y_center,
                width,
                height,
            });
        }

        boxes.push(YoloBox {
            class_index,
            x_center,
            y_center,
            width,
            height,
        });
    }

    Ok(NormalizedLabel { file_stem, boxes })
}
