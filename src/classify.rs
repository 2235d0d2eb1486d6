//! Sorting raw images by annotation completeness.

use log::{info, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use crate::config::{DatasetLayout, NamingConfig};
use crate::error::{CurateError, Result};
use crate::identity::{annotation_group_dir, fragment_path, parse_identity};
use crate::types::{ClassificationStats, ImageClass, PillIdentity};
use crate::utils::{copy_into, create_progress_bar, file_name_str, list_images};

/// Images of one classification pass, grouped by outcome in sorted order.
#[derive(Debug, Default, Clone)]
pub struct ClassifiedImages {
    pub matched: Vec<PathBuf>,
    pub mismatched: Vec<PathBuf>,
    pub unannotated: Vec<PathBuf>,
    /// Images whose names carry no pill identity
    pub skipped: Vec<PathBuf>,
    pub stats: ClassificationStats,
}

enum Outcome {
    Classified(ImageClass),
    Skipped(CurateError),
}

/// Decide the class from the number of pills that have a fragment.
///
/// An image without any pill id is never vacuously matched.
pub fn class_from_counts(found: usize, expected: usize) -> ImageClass {
    if expected == 0 || found == 0 {
        ImageClass::Unannotated
    } else if found == expected {
        ImageClass::Matched
    } else {
        ImageClass::Mismatched
    }
}

/// Number of pills of `identity` with a fragment under `annotations_root`.
///
/// A missing annotation group counts as zero fragments, not as an error.
pub fn count_fragments(
    identity: &PillIdentity,
    annotations_root: &Path,
    naming: &NamingConfig,
) -> usize {
    let group_dir = annotation_group_dir(annotations_root, identity, naming);
    if !group_dir.is_dir() {
        return 0;
    }
    identity
        .object_ids
        .iter()
        .filter(|id| fragment_path(&group_dir, identity, id, naming).is_file())
        .count()
}

pub fn classify_image(
    identity: &PillIdentity,
    annotations_root: &Path,
    naming: &NamingConfig,
) -> ImageClass {
    let found = count_fragments(identity, annotations_root, naming);
    class_from_counts(found, identity.object_ids.len())
}

fn target_dir(layout: &DatasetLayout, class: ImageClass) -> &Path {
    match class {
        ImageClass::Matched => &layout.matched.images,
        ImageClass::Mismatched => &layout.mismatched.images,
        ImageClass::Unannotated => &layout.unannotated.images,
    }
}

fn classify_and_copy(
    image_path: &Path,
    layout: &DatasetLayout,
    naming: &NamingConfig,
) -> Result<Outcome> {
    let name = file_name_str(image_path).unwrap_or_default();
    let identity = match parse_identity(name, naming) {
        Ok(identity) => identity,
        Err(e) => return Ok(Outcome::Skipped(e)),
    };
    let class = classify_image(&identity, &layout.raw_annotations_dir, naming);
    copy_into(image_path, target_dir(layout, class))?;
    Ok(Outcome::Classified(class))
}

/// Classify every raw image and copy it into its class directory.
///
/// Copies are not idempotent bookkeeping: running twice without cleaning the
/// filtered outputs simply copies again.
pub fn classify_images(layout: &DatasetLayout, naming: &NamingConfig) -> Result<ClassifiedImages> {
    if !layout.raw_images_dir.is_dir() {
        return Err(CurateError::io(
            &layout.raw_images_dir,
            std::io::ErrorKind::NotFound.into(),
        ));
    }
    let images = list_images(&layout.raw_images_dir)?;
    info!(
        "Classifying {} images from {:?}",
        images.len(),
        layout.raw_images_dir
    );

    let pb = create_progress_bar(images.len() as u64, "Classify");
    let outcomes: Vec<Result<Outcome>> = images
        .par_iter()
        .map(|image_path| {
            let outcome = classify_and_copy(image_path, layout, naming);
            pb.inc(1);
            outcome
        })
        .collect();
    pb.finish_with_message("Classification complete");

    let mut result = ClassifiedImages::default();
    for (image_path, outcome) in images.into_iter().zip(outcomes) {
        match outcome? {
            Outcome::Classified(class) => {
                result.stats.record(class);
                match class {
                    ImageClass::Matched => result.matched.push(image_path),
                    ImageClass::Mismatched => result.mismatched.push(image_path),
                    ImageClass::Unannotated => result.unannotated.push(image_path),
                }
            }
            Outcome::Skipped(e) => {
                warn!("Skipping {:?}: {}", image_path, e);
                result.stats.record_skipped();
                result.skipped.push(image_path);
            }
        }
    }

    result.stats.print_summary();
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_class_from_counts() {
        assert_eq!(class_from_counts(3, 3), ImageClass::Matched);
        assert_eq!(class_from_counts(1, 3), ImageClass::Mismatched);
        assert_eq!(class_from_counts(0, 3), ImageClass::Unannotated);
        assert_eq!(class_from_counts(0, 0), ImageClass::Unannotated);
    }

    #[test]
    fn test_missing_group_counts_as_zero() {
        let temp_dir = tempfile::tempdir().unwrap();
        let naming = NamingConfig::default();
        let identity = parse_identity("K-000001-000002_0.png", &naming).unwrap();
        assert_eq!(count_fragments(&identity, temp_dir.path(), &naming), 0);
        assert_eq!(
            classify_image(&identity, temp_dir.path(), &naming),
            ImageClass::Unannotated
        );
    }
}
