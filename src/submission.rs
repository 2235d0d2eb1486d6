//! Submission CSV export for detections produced by the external predictor.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{CurateError, Result};
use crate::mapping::CategoryMapping;

/// A detection in class-index space with a corner-format pixel box.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub class_index: usize,
    /// `[x1, y1, x2, y2]`
    pub bbox: [f64; 4],
    pub score: f64,
}

/// Detections keyed by image file name; iteration is sorted by name.
pub type Predictions = BTreeMap<String, Vec<Detection>>;

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRow {
    pub annotation_id: u64,
    pub image_id: u64,
    pub category_id: i64,
    pub bbox: [f64; 4],
    pub score: f64,
}

const HEADER: &str = "annotation_id,image_id,category_id,bbox_x,bbox_y,bbox_w,bbox_h,score";

fn image_id_from_name(image_name: &str) -> Result<u64> {
    Path::new(image_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.parse().ok())
        .ok_or_else(|| CurateError::InvalidSubmissionImage(image_name.to_string()))
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Translate detections back into external category ids.
///
/// Rows follow image name order; annotation ids start at 1.
pub fn to_submission_rows(
    predictions: &Predictions,
    mapping: &CategoryMapping,
) -> Result<Vec<SubmissionRow>> {
    let mut rows = Vec::new();
    let mut annotation_id = 1;
    for (image_name, detections) in predictions {
        let image_id = image_id_from_name(image_name)?;
        for detection in detections {
            let [x1, y1, x2, y2] = detection.bbox;
            rows.push(SubmissionRow {
                annotation_id,
                image_id,
                category_id: mapping.to_category_id(detection.class_index)?,
                bbox: [x1, y1, x2 - x1, y2 - y1],
                score: round4(detection.score),
            });
            annotation_id += 1;
        }
    }
    Ok(rows)
}

pub fn write_submission_csv(path: &Path, rows: &[SubmissionRow]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| CurateError::io(parent, e))?;
    }
    let file = File::create(path).map_err(|e| CurateError::io(path, e))?;
    let mut writer = BufWriter::new(file);

    let mut write_all = || -> std::io::Result<()> {
        writeln!(writer, "{}", HEADER)?;
        // floats always carry a fractional part, `2.0` rather than `2`
        for row in rows {
            let [x, y, w, h] = row.bbox;
            writeln!(
                writer,
                "{},{},{},{:?},{:?},{:?},{:?},{:?}",
                row.annotation_id, row.image_id, row.category_id, x, y, w, h, row.score
            )?;
        }
        writer.flush()
    };
    write_all().map_err(|e| CurateError::io(path, e))?;

    info!("Wrote {} submission rows to {:?}", rows.len(), path);
    Ok(())
}

/// Read predictions JSON, translate class indices and write the CSV.
pub fn export_submission(
    detections_path: &Path,
    output_path: &Path,
    mapping: &CategoryMapping,
) -> Result<usize> {
    let predictions: Predictions = crate::utils::read_json(detections_path)?;
    info!("Loaded detections for {} images", predictions.len());
    let rows = to_submission_rows(&predictions, mapping)?;
    write_submission_csv(output_path, &rows)?;
    Ok(rows.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> CategoryMapping {
        CategoryMapping::from_categories(vec![
            (1899, "a".to_string()),
            (3350, "b".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn test_rows_sorted_and_translated() {
        let mut predictions = Predictions::new();
        predictions.insert(
            "2.png".to_string(),
            vec![Detection {
                class_index: 0,
                bbox: [10.0, 20.0, 40.0, 80.0],
                score: 0.876543,
            }],
        );
        predictions.insert(
            "10.png".to_string(),
            vec![Detection {
                class_index: 1,
                bbox: [0.0, 0.0, 5.0, 5.0],
                score: 0.5,
            }],
        );

        let rows = to_submission_rows(&predictions, &mapping()).unwrap();
        assert_eq!(rows.len(), 2);
        // "10.png" sorts before "2.png"
        assert_eq!(rows[0].image_id, 10);
        assert_eq!(rows[0].category_id, 3350);
        assert_eq!(rows[1].annotation_id, 2);
        assert_eq!(rows[1].category_id, 1899);
        assert_eq!(rows[1].bbox, [10.0, 20.0, 30.0, 60.0]);
        assert_eq!(rows[1].score, 0.8765);
    }

    #[test]
    fn test_unknown_index_aborts() {
        let mut predictions = Predictions::new();
        predictions.insert(
            "1.png".to_string(),
            vec![Detection {
                class_index: 5,
                bbox: [0.0, 0.0, 1.0, 1.0],
                score: 0.9,
            }],
        );
        assert!(matches!(
            to_submission_rows(&predictions, &mapping()),
            Err(CurateError::UnknownIndex(5))
        ));
    }

    #[test]
    fn test_non_numeric_image_name() {
        let mut predictions = Predictions::new();
        predictions.insert("abc.png".to_string(), Vec::new());
        assert!(matches!(
            to_submission_rows(&predictions, &mapping()),
            Err(CurateError::InvalidSubmissionImage(_))
        ));
    }

    #[test]
    fn test_write_csv() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("out/submission.csv");
        let rows = vec![SubmissionRow {
            annotation_id: 1,
            image_id: 3,
            category_id: 1899,
            bbox: [1.5, 2.0, 3.0, 4.0],
            score: 0.9,
        }];
        write_submission_csv(&path, &rows).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, format!("{}\n1,3,1899,1.5,2.0,3.0,4.0,0.9\n", HEADER));
    }
}
