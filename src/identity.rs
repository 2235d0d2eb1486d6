//! Pill identity parsing
//!
//! Raw image names follow `<prefix><id1>-<id2>-...-<idK><suffix>.<ext>`, e.g.
//! `K-001900-016548-019607_0_2_0_2_70_000_200.png`. Everything else in the
//! pipeline locates annotation files through the identity derived here.

use std::path::{Path, PathBuf};

use crate::config::NamingConfig;
use crate::error::{CurateError, Result};
use crate::types::PillIdentity;

/// Derive the pill identity of an image from its file name.
///
/// An id part that is empty after the prefix yields an identity without
/// object ids; callers classify such images as unannotated.
pub fn parse_identity(file_name: &str, naming: &NamingConfig) -> Result<PillIdentity> {
    let invalid = |reason: &str| CurateError::InvalidFileName {
        name: file_name.to_string(),
        reason: reason.to_string(),
    };

    let file_stem = Path::new(file_name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .ok_or_else(|| invalid("no file stem"))?;

    let id_part = file_stem
        .split(naming.suffix_delimiter.as_str())
        .next()
        .unwrap_or_default()
        .strip_prefix(naming.prefix.as_str())
        .ok_or_else(|| invalid(&format!("expected prefix '{}'", naming.prefix)))?;

    let object_ids: Vec<String> = if id_part.is_empty() {
        Vec::new()
    } else {
        id_part
            .split(naming.id_separator.as_str())
            .map(str::to_string)
            .collect()
    };
    if object_ids.iter().any(|id| id.is_empty()) {
        return Err(invalid("empty pill id between separators"));
    }

    Ok(PillIdentity {
        canonical_id: object_ids.join(&naming.id_separator),
        object_ids,
        file_stem: file_stem.to_string(),
    })
}

/// Folder holding every fragment of images that share `canonical_id`.
pub fn annotation_group_dir(
    annotations_root: &Path,
    identity: &PillIdentity,
    naming: &NamingConfig,
) -> PathBuf {
    annotations_root.join(format!(
        "{}{}{}",
        naming.prefix, identity.canonical_id, naming.group_suffix
    ))
}

/// Location of the fragment describing pill `object_id` in this image.
pub fn fragment_path(
    group_dir: &Path,
    identity: &PillIdentity,
    object_id: &str,
    naming: &NamingConfig,
) -> PathBuf {
    group_dir
        .join(format!("{}{}", naming.prefix, object_id))
        .join(format!("{}.json", identity.file_stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAME: &str = "K-001900-016548-019607_0_2_0_2_70_000_200.png";

    #[test]
    fn test_parse_identity() {
        let identity = parse_identity(NAME, &NamingConfig::default()).unwrap();
        assert_eq!(identity.object_ids, vec!["001900", "016548", "019607"]);
        assert_eq!(identity.canonical_id, "001900-016548-019607");
        assert_eq!(identity.file_stem, "K-001900-016548-019607_0_2_0_2_70_000_200");
    }

    #[test]
    fn test_parse_identity_is_pure() {
        let naming = NamingConfig::default();
        assert_eq!(
            parse_identity(NAME, &naming).unwrap(),
            parse_identity(NAME, &naming).unwrap()
        );
    }

    #[test]
    fn test_single_id_without_suffix() {
        let identity = parse_identity("K-000250.jpg", &NamingConfig::default()).unwrap();
        assert_eq!(identity.object_ids, vec!["000250"]);
        assert_eq!(identity.file_stem, "K-000250");
    }

    #[test]
    fn test_empty_id_part() {
        let identity = parse_identity("K-_0_2.png", &NamingConfig::default()).unwrap();
        assert!(identity.object_ids.is_empty());
        assert_eq!(identity.canonical_id, "");
    }

    #[test]
    fn test_rejects_malformed_names() {
        let naming = NamingConfig::default();
        for name in ["IMG_0001.png", "K-001900--016548_0.png", ".png", ""] {
            let err = parse_identity(name, &naming).unwrap_err();
            assert!(err.is_item_level(), "{name} should be an item-level failure");
        }
    }

    #[test]
    fn test_fragment_locations() {
        let naming = NamingConfig::default();
        let identity = parse_identity(NAME, &naming).unwrap();
        let group = annotation_group_dir(Path::new("/raw/ann"), &identity, &naming);
        assert_eq!(group, PathBuf::from("/raw/ann/K-001900-016548-019607_json"));
        assert_eq!(
            fragment_path(&group, &identity, "016548", &naming),
            PathBuf::from(
                "/raw/ann/K-001900-016548-019607_json/K-016548/\
                 K-001900-016548-019607_0_2_0_2_70_000_200.json"
            )
        );
    }
}
