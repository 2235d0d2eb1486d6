use log::{error, info, warn};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::config::{DatasetLayout, PipelineConfig};
use crate::conversion::convert_record;
use crate::error::{CurateError, Result};
use crate::io::create_dataset_yaml;
use crate::link::{select_linker, ImageLinker};
use crate::mapping::CategoryMapping;
use crate::types::{AnnotationFile, LabelStats, NormalizedLabel};
use crate::utils::{create_progress_bar, file_name_str, list_images, list_json_files, read_json};

enum LabelOutcome {
    Written { stem: String, boxes: usize },
    Rejected(CurateError),
}

/// Write one label file, `<stem>.txt`, one line per box.
pub fn write_label_file(labels_dir: &Path, label: &NormalizedLabel) -> Result<String> {
    let stem = sanitize_filename::sanitize(&label.file_stem);
    let label_output_path = labels_dir.join(format!("{}.txt", stem));
    let file =
        File::create(&label_output_path).map_err(|e| CurateError::io(&label_output_path, e))?;
    let mut writer = BufWriter::new(file);
    writer
        .write_all(label.to_yolo_string().as_bytes())
        .and_then(|_| writer.flush())
        .map_err(|e| CurateError::io(&label_output_path, e))?;
    Ok(stem)
}

fn convert_and_write(
    record_path: &Path,
    labels_dir: &Path,
    mapping: &CategoryMapping,
    tolerance: f64,
) -> Result<LabelOutcome> {
    let record: AnnotationFile = read_json(record_path)?;
    match convert_record(record_path, &record, mapping, tolerance) {
        Ok(label) => {
            let stem = write_label_file(labels_dir, &label)?;
            Ok(LabelOutcome::Written {
                stem,
                boxes: label.boxes.len(),
            })
        }
        Err(e) if e.is_item_level() => Ok(LabelOutcome::Rejected(e)),
        Err(e) => Err(e),
    }
}

/// Convert every merged record under `records_dir` into a YOLO label file.
///
/// Returns the stems of the label files written. Records with out-of-range
/// boxes are reported and get no label; an unknown category aborts the pass.
pub fn build_labels(
    records_dir: &Path,
    labels_dir: &Path,
    mapping: &CategoryMapping,
    tolerance: f64,
    stats: &mut LabelStats,
) -> Result<BTreeSet<String>> {
    let record_files = list_json_files(records_dir)?;
    info!(
        "Converting {} merged records from {:?}",
        record_files.len(),
        records_dir
    );

    let pb = create_progress_bar(record_files.len() as u64, "Labels");
    let outcomes: Vec<LabelOutcome> = record_files
        .par_iter()
        .map(|record_path| {
            let outcome = convert_and_write(record_path, labels_dir, mapping, tolerance);
            pb.inc(1);
            outcome
        })
        .collect::<Result<_>>()?;
    pb.finish_with_message("Label conversion complete");

    let mut written = BTreeSet::new();
    for (record_path, outcome) in record_files.iter().zip(outcomes) {
        stats.records_seen += 1;
        match outcome {
            LabelOutcome::Written { stem, boxes } => {
                stats.labels_written += 1;
                stats.boxes_written += boxes;
                written.insert(stem);
            }
            LabelOutcome::Rejected(e) => {
                error!("Rejected {:?}: {}", record_path, e);
                stats.rejected_geometry += 1;
            }
        }
    }
    Ok(written)
}

/// Expose every labelled image of `images_dir` in `target_dir`.
///
/// Entries already present in `target_dir` are left untouched. Images
/// without a label are skipped so they never turn into background samples.
pub fn link_images(
    images_dir: &Path,
    target_dir: &Path,
    labelled: &BTreeSet<String>,
    linker: &dyn ImageLinker,
    stats: &mut LabelStats,
) -> Result<()> {
    for image_path in list_images(images_dir)? {
        let Some(name) = file_name_str(&image_path) else {
            continue;
        };
        let stem = image_path
            .file_stem()
            .map(|stem| sanitize_filename::sanitize(stem.to_string_lossy()))
            .unwrap_or_default();
        if !labelled.contains(&stem) {
            warn!("No label file for {}, not linking it", name);
            stats.images_without_label += 1;
            continue;
        }

        let dst = target_dir.join(name);
        if fs::symlink_metadata(&dst).is_ok() {
            stats.images_already_present += 1;
            continue;
        }
        linker
            .link(&image_path, &dst)
            .map_err(|e| CurateError::io(&dst, e))?;
        stats.images_linked += 1;
    }
    Ok(())
}

/// Build the YOLO training directory from the merged matched records.
pub fn process_yolo_dataset(
    layout: &DatasetLayout,
    config: &PipelineConfig,
    mapping: &CategoryMapping,
) -> Result<LabelStats> {
    let mut stats = LabelStats::default();

    let labelled = build_labels(
        &layout.processed_labels_dir,
        &layout.yolo_labels_dir,
        mapping,
        config.geometry_tolerance,
        &mut stats,
    )?;

    let linker = select_linker(&layout.yolo_images_dir, config.link_mode);
    info!("Linking images with strategy: {}", linker.name());
    link_images(
        &layout.processed_images_dir,
        &layout.yolo_images_dir,
        &labelled,
        linker.as_ref(),
        &mut stats,
    )?;

    info!("Creating data.yaml file...");
    create_dataset_yaml(layout, mapping)?;

    stats.print_summary();
    Ok(stats)
}
