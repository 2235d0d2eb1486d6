//! Gathering scattered per-pill fragments into one folder per image.

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::NamingConfig;
use crate::error::{CurateError, Result};
use crate::identity::{annotation_group_dir, fragment_path, parse_identity};
use crate::types::CollectionStats;
use crate::utils::file_name_str;

/// Copy the fragments of each image into `output_root/<file stem>/<pill id>.json`.
///
/// Images without an annotation group contribute nothing. Only pills whose
/// fragment exists are copied, so a mismatched image yields a partial folder.
pub fn collect_fragments(
    images: &[PathBuf],
    annotations_root: &Path,
    output_root: &Path,
    naming: &NamingConfig,
) -> Result<CollectionStats> {
    let mut stats = CollectionStats::default();

    for image_path in images {
        stats.images_seen += 1;
        let name = file_name_str(image_path).unwrap_or_default();
        let identity = match parse_identity(name, naming) {
            Ok(identity) => identity,
            Err(e) => {
                warn!("Skipping {:?}: {}", image_path, e);
                stats.skipped_invalid_name += 1;
                continue;
            }
        };

        let group_dir = annotation_group_dir(annotations_root, &identity, naming);
        if !group_dir.is_dir() {
            debug!("No annotation group for {}", name);
            stats.skipped_missing_group += 1;
            continue;
        }

        let image_out_dir = output_root.join(&identity.file_stem);
        let mut copied = 0;
        for object_id in &identity.object_ids {
            let src = fragment_path(&group_dir, &identity, object_id, naming);
            if !src.is_file() {
                continue;
            }
            if copied == 0 {
                fs::create_dir_all(&image_out_dir)
                    .map_err(|e| CurateError::io(&image_out_dir, e))?;
            }
            let dst = image_out_dir.join(format!("{}.json", object_id));
            fs::copy(&src, &dst).map_err(|e| CurateError::io(&dst, e))?;
            copied += 1;
        }

        if copied > 0 {
            stats.groups_created += 1;
            stats.fragments_copied += copied;
        }
    }

    Ok(stats)
}
