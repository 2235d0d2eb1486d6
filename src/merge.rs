//! Merging per-pill fragments into one annotation record per image.
//!
//! The first fragment (in file name order) supplies the image descriptor.
//! Categories are deduplicated by id keeping the first name seen, and
//! annotations are renumbered `1..=N` and re-pointed at the record's image.

use log::{info, warn};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::Path;

use crate::error::{CurateError, Result};
use crate::types::{AnnotationFile, ImageInfo, MergeStats};
use crate::utils::{
    create_progress_bar, list_json_files, list_subdirs, read_json, write_json_pretty,
};

/// Accumulates fragments of a single image into one record.
#[derive(Debug, Default)]
pub struct RecordMerger {
    image: Option<ImageInfo>,
    record: AnnotationFile,
    seen_categories: HashSet<i64>,
    next_annotation_id: u64,
}

impl RecordMerger {
    pub fn new() -> Self {
        Self {
            next_annotation_id: 1,
            ..Self::default()
        }
    }

    /// Fold one fragment into the record. `source` is used for error context.
    pub fn add_fragment(&mut self, source: &Path, fragment: AnnotationFile) -> Result<()> {
        let image_id = match &self.image {
            Some(image) => image.id,
            None => {
                let image = fragment.image().cloned().ok_or_else(|| {
                    CurateError::MalformedFragment {
                        path: source.to_path_buf(),
                        reason: "no entry in \"images\"".to_string(),
                    }
                })?;
                let id = image.id;
                self.image = Some(image);
                id
            }
        };

        for category in fragment.categories {
            if self.seen_categories.insert(category.id) {
                self.record.categories.push(category);
            }
        }

        for mut annotation in fragment.annotations {
            annotation.id = self.next_annotation_id;
            annotation.image_id = Some(image_id);
            self.next_annotation_id += 1;
            self.record.annotations.push(annotation);
        }
        Ok(())
    }

    /// The merged record, or `None` if no fragment was added.
    pub fn finish(self) -> Option<AnnotationFile> {
        let image = self.image?;
        let mut record = self.record;
        record.images = vec![image];
        Some(record)
    }
}

/// Merge every fragment file of one image folder, in file name order.
pub fn merge_group_dir(group_dir: &Path) -> Result<Option<AnnotationFile>> {
    let fragment_files = list_json_files(group_dir)?;
    let mut merger = RecordMerger::new();
    for path in &fragment_files {
        let fragment: AnnotationFile = read_json(path)?;
        merger.add_fragment(path, fragment)?;
    }
    Ok(merger.finish())
}

fn merge_and_write(group_dir: &Path, output_root: &Path) -> Result<Option<usize>> {
    let Some(record) = merge_group_dir(group_dir)? else {
        return Ok(None);
    };
    let folder_name = group_dir
        .file_name()
        .ok_or_else(|| CurateError::io(group_dir, std::io::ErrorKind::InvalidInput.into()))?;
    let out_path = output_root.join(format!("{}.json", folder_name.to_string_lossy()));
    write_json_pretty(&out_path, &record)?;
    Ok(Some(record.annotations.len()))
}

/// Merge each per-image folder under `group_root` into `output_root/<folder>.json`.
///
/// Folders without fragment files are skipped without error. A malformed
/// fragment aborts the pass; records already written stay on disk.
pub fn merge_groups(group_root: &Path, output_root: &Path, label: &str) -> Result<MergeStats> {
    let mut stats = MergeStats::default();
    if !group_root.is_dir() {
        warn!("[{}] nothing to merge, {:?} does not exist", label, group_root);
        return Ok(stats);
    }

    let group_dirs = list_subdirs(group_root)?;
    info!("[{}] merging {} image folders", label, group_dirs.len());

    let pb = create_progress_bar(group_dirs.len() as u64, label);
    let merged: Vec<Option<usize>> = group_dirs
        .par_iter()
        .map(|group_dir| {
            let merged = merge_and_write(group_dir, output_root);
            pb.inc(1);
            merged
        })
        .collect::<Result<_>>()?;
    pb.finish_with_message("Merge complete");

    for annotations in merged {
        stats.folders_seen += 1;
        match annotations {
            Some(count) => {
                stats.merged_records += 1;
                stats.annotations += count;
            }
            None => stats.skipped_empty += 1,
        }
    }

    stats.print_summary(label);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Annotation, Category};
    use serde_json::{Map, Number};

    fn fragment(
        image_id: i64,
        categories: &[(i64, &str)],
        boxes: &[(i64, [f64; 4])],
    ) -> AnnotationFile {
        AnnotationFile {
            images: vec![ImageInfo {
                id: image_id,
                file_name: "K-000001-000002_0.png".to_string(),
                width: 976,
                height: 1280,
            }],
            categories: categories
                .iter()
                .map(|&(id, name)| Category {
                    id,
                    name: name.to_string(),
                    extra: Map::new(),
                })
                .collect(),
            annotations: boxes
                .iter()
                .map(|&(category_id, bbox)| Annotation {
                    id: 99,
                    image_id: Some(image_id + 1000),
                    category_id,
                    bbox: bbox.map(|v| Number::from_f64(v).unwrap()),
                    extra: Map::new(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_first_fragment_wins_and_ids_renumbered() {
        let mut merger = RecordMerger::new();
        let source = Path::new("a.json");
        merger
            .add_fragment(
                source,
                fragment(7, &[(1899, "first")], &[(1899, [1.0, 2.0, 3.0, 4.0])]),
            )
            .unwrap();
        merger
            .add_fragment(
                source,
                fragment(
                    8,
                    &[(1899, "second"), (3350, "other")],
                    &[(3350, [5.0, 6.0, 7.0, 8.0]), (1899, [0.0, 0.0, 1.0, 1.0])],
                ),
            )
            .unwrap();
        let record = merger.finish().unwrap();

        assert_eq!(record.images.len(), 1);
        assert_eq!(record.images[0].id, 7);
        let ids: Vec<u64> = record.annotations.iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert!(record.annotations.iter().all(|a| a.image_id == Some(7)));
        let categories: Vec<(i64, &str)> = record
            .categories
            .iter()
            .map(|c| (c.id, c.name.as_str()))
            .collect();
        assert_eq!(categories, vec![(1899, "first"), (3350, "other")]);
    }

    #[test]
    fn test_empty_merger_yields_nothing() {
        assert!(RecordMerger::new().finish().is_none());
    }

    #[test]
    fn test_fragment_without_image_is_malformed() {
        let mut merger = RecordMerger::new();
        let err = merger
            .add_fragment(Path::new("bad.json"), AnnotationFile::default())
            .unwrap_err();
        assert!(matches!(err, CurateError::MalformedFragment { .. }));
        assert!(!err.is_item_level());
    }
}
