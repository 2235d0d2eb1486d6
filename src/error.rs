use std::path::{Path, PathBuf};

/// Errors raised while curating the dataset.
///
/// Variants split into two tiers. Item-level errors (see
/// [`CurateError::is_item_level`]) are logged and the offending image is
/// skipped; every other variant aborts the running stage.
#[derive(Debug, thiserror::Error)]
pub enum CurateError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON ({path}): {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YAML ({path}): {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Cannot derive pill ids from file name '{name}': {reason}")]
    InvalidFileName { name: String, reason: String },

    #[error("Malformed annotation fragment {path}: {reason}")]
    MalformedFragment { path: PathBuf, reason: String },

    #[error("Category mapping source directory does not exist: {0}")]
    MissingMappingSource(PathBuf),

    #[error("No categories found in any merged record under {0}")]
    EmptyCategorySet(PathBuf),

    #[error("Category id {0} is not part of the category mapping")]
    UnknownCategory(i64),

    #[error("Class index {0} is not part of the category mapping")]
    UnknownIndex(usize),

    #[error(
        "Normalized box of annotation {annotation_id} in '{file_name}' is outside [0, 1]: \
         ({x_center:.6}, {y_center:.6}, {width:.6}, {height:.6})"
    )]
    GeometryOutOfRange {
        file_name: String,
        annotation_id: u64,
        x_center: f64,
        y_center: f64,
        width: f64,
        height: f64,
    },

    #[error("Invalid category mapping: {0}")]
    InvalidMapping(String),

    #[error("Image name '{0}' does not carry a numeric image id")]
    InvalidSubmissionImage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, CurateError>;

impl CurateError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        CurateError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn json(path: impl AsRef<Path>, source: serde_json::Error) -> Self {
        CurateError::Json {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// True for failures that concern a single image and must not halt the batch.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            CurateError::InvalidFileName { .. } | CurateError::GeometryOutOfRange { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_tiers() {
        let parse = CurateError::InvalidFileName {
            name: "x.png".to_string(),
            reason: "missing prefix".to_string(),
        };
        assert!(parse.is_item_level());
        assert!(!CurateError::UnknownCategory(7).is_item_level());
        assert!(!CurateError::EmptyCategorySet(PathBuf::from("labels")).is_item_level());
    }
}
