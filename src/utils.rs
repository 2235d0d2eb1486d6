use glob::glob;
use indicatif::{ProgressBar, ProgressStyle};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{CurateError, Result};
use crate::types::get_image_extensions_set;

/// Read and parse a JSON document directly from a file stream.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = fs::File::open(path).map_err(|e| CurateError::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| CurateError::json(path, e))
}

/// Write a value as pretty-printed JSON (two-space indent, UTF-8 kept as is).
pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = fs::File::create(path).map_err(|e| CurateError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value).map_err(|e| CurateError::json(path, e))?;
    writer.flush().map_err(|e| CurateError::io(path, e))
}

/// Create a progress bar with the given length and label
pub fn create_progress_bar(len: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{}] [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}})",
                label
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Create an output directory. With `clean`, an existing one is deleted and recreated.
pub fn create_output_directory(path: &Path, clean: bool) -> Result<PathBuf> {
    if clean && path.exists() {
        log::warn!(
            "Directory {:?} already exists. Deleting and recreating it.",
            path
        );
        fs::remove_dir_all(path).map_err(|e| CurateError::io(path, e))?;
    }
    fs::create_dir_all(path).map_err(|e| CurateError::io(path, e))?;
    Ok(path.to_path_buf())
}

/// Files directly under `dir` whose extension satisfies `keep`, sorted by path.
fn list_files_sorted(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let pattern = format!("{}/*", glob::Pattern::escape(&dir.to_string_lossy()));
    let entries = glob(&pattern).map_err(|e| {
        CurateError::Config(format!("invalid glob pattern {}: {}", pattern, e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|path| path.is_file())
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| keep(&ext.to_lowercase()))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Image files directly under `dir`, sorted by path.
pub fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let extensions = get_image_extensions_set();
    list_files_sorted(dir, |ext| extensions.contains(ext))
}

/// JSON files directly under `dir`, sorted by path.
pub fn list_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    list_files_sorted(dir, |ext| ext == "json")
}

/// Immediate subdirectories of `dir`, sorted by path.
pub fn list_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir).map_err(|e| CurateError::io(dir, e))? {
        let entry = entry.map_err(|e| CurateError::io(dir, e))?;
        let path = entry.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// File name of `path` as UTF-8, if it has one.
pub fn file_name_str(path: &Path) -> Option<&str> {
    path.file_name().and_then(|name| name.to_str())
}

/// Copy `src` into `dir`, keeping its file name.
pub fn copy_into(src: &Path, dir: &Path) -> Result<PathBuf> {
    let name = src
        .file_name()
        .ok_or_else(|| CurateError::io(src, std::io::ErrorKind::InvalidInput.into()))?;
    let dst = dir.join(name);
    fs::copy(src, &dst).map_err(|e| CurateError::io(&dst, e))?;
    Ok(dst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listings_are_sorted_and_filtered() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path();
        for name in ["b.png", "a.JPG", "c.json", "notes.txt"] {
            fs::write(dir.join(name), b"x").unwrap();
        }
        fs::create_dir(dir.join("sub.png")).unwrap();

        let images = list_images(dir).unwrap();
        let names: Vec<_> = images.iter().filter_map(|p| file_name_str(p)).collect();
        assert_eq!(names, vec!["a.JPG", "b.png"]);

        let json = list_json_files(dir).unwrap();
        assert_eq!(json.len(), 1);

        let subdirs = list_subdirs(dir).unwrap();
        assert_eq!(subdirs, vec![dir.join("sub.png")]);
    }

    #[test]
    fn test_create_output_directory_clean() {
        let temp_dir = tempfile::tempdir().unwrap();
        let out = temp_dir.path().join("out");
        create_output_directory(&out, false).unwrap();
        fs::write(out.join("stale.txt"), b"x").unwrap();

        create_output_directory(&out, false).unwrap();
        assert!(out.join("stale.txt").exists());

        create_output_directory(&out, true).unwrap();
        assert!(!out.join("stale.txt").exists());
        assert!(out.is_dir());
    }
}
