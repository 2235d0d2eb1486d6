//! Deterministic mapping between external category ids and YOLO class indices.
//!
//! Indices are assigned in ascending order of category id, so the mapping only
//! depends on the set of ids in the corpus, never on file iteration order.

use log::info;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use crate::error::{CurateError, Result};
use crate::types::{AnnotationFile, Category};
use crate::utils::{list_json_files, read_json, write_json_pretty};

/// Bidirectional category id <-> class index table.
///
/// Immutable once built; persist with [`CategoryMapping::save`] and restore
/// with [`CategoryMapping::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryMapping {
    category_to_index: BTreeMap<i64, usize>,
    index_to_category: Vec<i64>,
    names: Vec<String>,
}

// On-disk representation. JSON object keys are strings; serde_json restores
// them to integers when reading into integer-keyed maps.
#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    category_to_yolo: BTreeMap<i64, usize>,
    yolo_to_category: BTreeMap<usize, i64>,
    yolo_names: Vec<String>,
}

impl CategoryMapping {
    /// Build from `(category id, name)` pairs. On a repeated id the last name wins.
    pub fn from_categories<I>(categories: I) -> Option<Self>
    where
        I: IntoIterator<Item = (i64, String)>,
    {
        let by_id: BTreeMap<i64, String> = categories.into_iter().collect();
        if by_id.is_empty() {
            return None;
        }

        let mut category_to_index = BTreeMap::new();
        let mut index_to_category = Vec::with_capacity(by_id.len());
        let mut names = Vec::with_capacity(by_id.len());
        for (index, (category_id, name)) in by_id.into_iter().enumerate() {
            category_to_index.insert(category_id, index);
            index_to_category.push(category_id);
            names.push(name);
        }

        Some(Self {
            category_to_index,
            index_to_category,
            names,
        })
    }

    /// Scan every merged record under `records_dir` and build the mapping.
    pub fn build(records_dir: &Path) -> Result<Self> {
        if !records_dir.is_dir() {
            return Err(CurateError::MissingMappingSource(records_dir.to_path_buf()));
        }

        let record_files = list_json_files(records_dir)?;
        let per_record: Vec<Vec<Category>> = record_files
            .par_iter()
            .map(|path| read_json::<AnnotationFile>(path).map(|record| record.categories))
            .collect::<Result<_>>()?;

        let pairs = per_record
            .into_iter()
            .flatten()
            .map(|category| (category.id, category.name));
        let mapping = Self::from_categories(pairs)
            .ok_or_else(|| CurateError::EmptyCategorySet(records_dir.to_path_buf()))?;

        info!(
            "Mapped {} categories from {} merged records",
            mapping.len(),
            record_files.len()
        );
        Ok(mapping)
    }

    pub fn to_index(&self, category_id: i64) -> Result<usize> {
        self.category_to_index
            .get(&category_id)
            .copied()
            .ok_or(CurateError::UnknownCategory(category_id))
    }

    pub fn to_category_id(&self, index: usize) -> Result<i64> {
        self.index_to_category
            .get(index)
            .copied()
            .ok_or(CurateError::UnknownIndex(index))
    }

    /// Class names ordered by class index.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| CurateError::io(parent, e))?;
        }
        let file = MappingFile {
            category_to_yolo: self.category_to_index.clone(),
            yolo_to_category: self.index_to_category.iter().copied().enumerate().collect(),
            yolo_names: self.names.clone(),
        };
        write_json_pretty(path, &file)?;
        info!("Saved category mapping to {:?}", path);
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file: MappingFile = read_json(path)?;
        let mapping = Self::from_file(file)?;
        info!("Loaded {} categories from {:?}", mapping.len(), path);
        Ok(mapping)
    }

    fn from_file(file: MappingFile) -> Result<Self> {
        let count = file.yolo_names.len();
        if file.category_to_yolo.len() != count || file.yolo_to_category.len() != count {
            return Err(CurateError::InvalidMapping(format!(
                "table sizes differ: {} category ids, {} indices, {} names",
                file.category_to_yolo.len(),
                file.yolo_to_category.len(),
                count
            )));
        }

        // BTreeMap iteration is ascending, so dense indices come out as 0..count
        let mut index_to_category = Vec::with_capacity(count);
        for (expected, (&index, &category_id)) in file.yolo_to_category.iter().enumerate() {
            if index != expected {
                return Err(CurateError::InvalidMapping(format!(
                    "class indices are not dense: found {} at position {}",
                    index, expected
                )));
            }
            if file.category_to_yolo.get(&category_id) != Some(&index) {
                return Err(CurateError::InvalidMapping(format!(
                    "category {} and class {} do not map to each other",
                    category_id, index
                )));
            }
            index_to_category.push(category_id);
        }

        Ok(Self {
            category_to_index: file.category_to_yolo,
            index_to_category,
            names: file.yolo_names,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> CategoryMapping {
        CategoryMapping::from_categories(vec![
            (7, "seven".to_string()),
            (3, "three".to_string()),
            (15, "fifteen".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn test_indices_follow_ascending_ids() {
        let mapping = sample();
        assert_eq!(mapping.to_index(3).unwrap(), 0);
        assert_eq!(mapping.to_index(7).unwrap(), 1);
        assert_eq!(mapping.to_index(15).unwrap(), 2);
        assert_eq!(mapping.names(), &["three", "seven", "fifteen"]);
    }

    #[test]
    fn test_order_independent() {
        let reversed = CategoryMapping::from_categories(vec![
            (15, "fifteen".to_string()),
            (3, "three".to_string()),
            (7, "seven".to_string()),
        ])
        .unwrap();
        assert_eq!(sample(), reversed);
    }

    #[test]
    fn test_bijective() {
        let mapping = sample();
        for index in 0..mapping.len() {
            let category_id = mapping.to_category_id(index).unwrap();
            assert_eq!(mapping.to_index(category_id).unwrap(), index);
        }
        for category_id in [3, 7, 15] {
            let index = mapping.to_index(category_id).unwrap();
            assert_eq!(mapping.to_category_id(index).unwrap(), category_id);
        }
    }

    #[test]
    fn test_unknown_lookups_fail() {
        let mapping = sample();
        assert!(matches!(
            mapping.to_index(4),
            Err(CurateError::UnknownCategory(4))
        ));
        assert!(matches!(
            mapping.to_category_id(3),
            Err(CurateError::UnknownIndex(3))
        ));
    }

    #[test]
    fn test_last_name_wins_on_repeated_id() {
        let mapping = CategoryMapping::from_categories(vec![
            (3, "old".to_string()),
            (3, "new".to_string()),
        ])
        .unwrap();
        assert_eq!(mapping.names(), &["new"]);
    }

    #[test]
    fn test_empty_yields_none() {
        assert!(CategoryMapping::from_categories(Vec::new()).is_none());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("mapping/category_mapping.json");
        let mapping = sample();
        mapping.save(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["category_to_yolo"]["15"], 2);
        assert_eq!(raw["yolo_to_category"]["0"], 3);
        assert_eq!(raw["yolo_names"][1], "seven");

        assert_eq!(CategoryMapping::load(&path).unwrap(), mapping);
    }

    #[test]
    fn test_load_rejects_inconsistent_tables() {
        let file = MappingFile {
            category_to_yolo: BTreeMap::from([(3, 0), (7, 1)]),
            yolo_to_category: BTreeMap::from([(0, 7), (1, 3)]),
            yolo_names: vec!["a".to_string(), "b".to_string()],
        };
        assert!(matches!(
            CategoryMapping::from_file(file),
            Err(CurateError::InvalidMapping(_))
        ));
    }
}
