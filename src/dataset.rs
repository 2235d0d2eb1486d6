use log::info;

use crate::classify::{classify_images, ClassifiedImages};
use crate::collect::collect_fragments;
use crate::config::{ClassDirs, DatasetLayout, PipelineConfig};
use crate::error::Result;
use crate::io::{copy_images, setup_output_directories, Stage};
use crate::mapping::CategoryMapping;
use crate::merge::merge_groups;
use crate::types::{ClassificationStats, CollectionStats, LabelStats, MergeStats};
use crate::utils::list_images;
use crate::yolo_dataset::process_yolo_dataset;

/// Counters of a full curation run.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CurationReport {
    pub classification: ClassificationStats,
    pub matched_collection: CollectionStats,
    pub mismatched_collection: CollectionStats,
    pub matched_merge: MergeStats,
    pub mismatched_merge: MergeStats,
    pub staged_matched_images: usize,
    pub staged_mismatched_images: usize,
}

/// Step 1: sort raw images into matched / mismatched / unannotated.
pub fn run_classify(
    layout: &DatasetLayout,
    config: &PipelineConfig,
    clean: bool,
) -> Result<ClassifiedImages> {
    setup_output_directories(layout, Stage::Classify, clean)?;
    classify_images(layout, &config.naming)
}

/// Step 2: gather fragments for the matched and mismatched image sets.
pub fn run_collect(
    layout: &DatasetLayout,
    config: &PipelineConfig,
    clean: bool,
) -> Result<(CollectionStats, CollectionStats)> {
    setup_output_directories(layout, Stage::Collect, clean)?;

    let collect = |label: &str, dirs: &ClassDirs| -> Result<CollectionStats> {
        let images = list_images(&dirs.images)?;
        let stats = collect_fragments(
            &images,
            &layout.raw_annotations_dir,
            &dirs.annotations,
            &config.naming,
        )?;
        stats.print_summary(label);
        Ok(stats)
    };

    let matched = collect("Matched", &layout.matched)?;
    let mismatched = collect("Mismatched", &layout.mismatched)?;
    Ok((matched, mismatched))
}

/// Step 3: merge fragment groups into per-image records and stage their images.
pub fn run_merge(layout: &DatasetLayout, clean: bool) -> Result<CurationReport> {
    setup_output_directories(layout, Stage::Merge, clean)?;

    let mut report = CurationReport {
        matched_merge: merge_groups(
            &layout.matched.annotations,
            &layout.processed_labels_dir,
            "Matched",
        )?,
        mismatched_merge: merge_groups(
            &layout.mismatched.annotations,
            &layout.processed_mismatched_labels_dir,
            "Mismatched",
        )?,
        ..CurationReport::default()
    };

    report.staged_matched_images =
        copy_images(&layout.matched.images, &layout.processed_images_dir)?;
    report.staged_mismatched_images = copy_images(
        &layout.mismatched.images,
        &layout.processed_mismatched_images_dir,
    )?;
    info!(
        "Staged {} matched and {} mismatched images under {:?}",
        report.staged_matched_images, report.staged_mismatched_images, layout.processed_dir
    );
    Ok(report)
}

/// Steps 1-3 in sequence.
pub fn curate(
    layout: &DatasetLayout,
    config: &PipelineConfig,
    clean: bool,
) -> Result<CurationReport> {
    info!("===== STEP 1: classify images =====");
    let classified = run_classify(layout, config, clean)?;

    info!("===== STEP 2: collect annotations =====");
    let (matched_collection, mismatched_collection) = run_collect(layout, config, clean)?;

    info!("===== STEP 3: merge annotations =====");
    let merged = run_merge(layout, clean)?;

    Ok(CurationReport {
        classification: classified.stats,
        matched_collection,
        mismatched_collection,
        ..merged
    })
}

/// Build the category mapping from the matched records and persist it.
pub fn run_mapping(layout: &DatasetLayout) -> Result<CategoryMapping> {
    let mapping = CategoryMapping::build(&layout.processed_labels_dir)?;
    mapping.save(&layout.mapping_file)?;
    info!("Category mapping holds {} classes", mapping.len());
    Ok(mapping)
}

/// Build the YOLO dataset with the mapping saved by [`run_mapping`].
pub fn run_yolo(
    layout: &DatasetLayout,
    config: &PipelineConfig,
    clean: bool,
) -> Result<LabelStats> {
    setup_output_directories(layout, Stage::Yolo, clean)?;
    let mapping = CategoryMapping::load(&layout.mapping_file)?;
    process_yolo_dataset(layout, config, &mapping)
}

/// Every stage: curation, category mapping, YOLO dataset.
pub fn run_all(
    layout: &DatasetLayout,
    config: &PipelineConfig,
    clean: bool,
) -> Result<(CurationReport, LabelStats)> {
    let report = curate(layout, config, clean)?;

    info!("===== STEP 4: category mapping =====");
    let mapping = run_mapping(layout)?;

    info!("===== STEP 5: YOLO dataset =====");
    setup_output_directories(layout, Stage::Yolo, clean)?;
    let label_stats = process_yolo_dataset(layout, config, &mapping)?;

    info!("Dataset curation completed successfully.");
    Ok((report, label_stats))
}
