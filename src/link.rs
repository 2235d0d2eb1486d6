//! Making images visible under the YOLO training directory.

use log::{debug, warn};
use std::fs;
use std::io;
use std::path::Path;

use crate::config::LinkMode;

/// Makes `src` reachable at `dst`.
pub trait ImageLinker: Send + Sync {
    fn name(&self) -> &'static str;
    fn link(&self, src: &Path, dst: &Path) -> io::Result<()>;
}

/// Symbolic link to the absolute source path.
pub struct SymlinkLinker;

/// Physical copy of the source file.
pub struct CopyLinker;

impl ImageLinker for SymlinkLinker {
    fn name(&self) -> &'static str {
        "symlink"
    }

    fn link(&self, src: &Path, dst: &Path) -> io::Result<()> {
        let target = fs::canonicalize(src)?;
        make_symlink(&target, dst)
    }
}

impl ImageLinker for CopyLinker {
    fn name(&self) -> &'static str {
        "copy"
    }

    fn link(&self, src: &Path, dst: &Path) -> io::Result<()> {
        fs::copy(src, dst).map(|_| ())
    }
}

#[cfg(unix)]
fn make_symlink(target: &Path, dst: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(windows)]
fn make_symlink(target: &Path, dst: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_file(target, dst)
}

#[cfg(not(any(unix, windows)))]
fn make_symlink(_target: &Path, _dst: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}

/// Check whether `dir` accepts symbolic links by creating and removing one.
pub fn supports_symlinks(dir: &Path) -> bool {
    let probe_target = dir.join(".pill2yolo_link_probe_target");
    let probe_link = dir.join(".pill2yolo_link_probe");
    let _ = fs::remove_file(&probe_link);

    let supported = fs::write(&probe_target, b"")
        .and_then(|_| make_symlink(&probe_target, &probe_link))
        .is_ok();

    let _ = fs::remove_file(&probe_link);
    let _ = fs::remove_file(&probe_target);
    supported
}

/// Pick the linking strategy for `target_dir`.
///
/// `Auto` prefers symlinks and falls back to copying when the filesystem
/// refuses them. An explicit `Symlink` request is honoured as is.
pub fn select_linker(target_dir: &Path, mode: LinkMode) -> Box<dyn ImageLinker> {
    match mode {
        LinkMode::Copy => Box::new(CopyLinker),
        LinkMode::Symlink => Box::new(SymlinkLinker),
        LinkMode::Auto => {
            if supports_symlinks(target_dir) {
                debug!("{:?} supports symlinks", target_dir);
                Box::new(SymlinkLinker)
            } else {
                warn!(
                    "Symlinks are not supported in {:?}; images will be copied",
                    target_dir
                );
                Box::new(CopyLinker)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_linker() {
        let temp_dir = tempfile::tempdir().unwrap();
        let src = temp_dir.path().join("a.png");
        let dst = temp_dir.path().join("b.png");
        fs::write(&src, b"pixels").unwrap();

        CopyLinker.link(&src, &dst).unwrap();
        assert_eq!(fs::read(&dst).unwrap(), b"pixels");
        assert!(!fs::symlink_metadata(&dst).unwrap().file_type().is_symlink());
    }

    #[test]
    fn test_select_explicit_modes() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert_eq!(select_linker(temp_dir.path(), LinkMode::Copy).name(), "copy");
        assert_eq!(
            select_linker(temp_dir.path(), LinkMode::Symlink).name(),
            "symlink"
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_auto_prefers_symlink() {
        let temp_dir = tempfile::tempdir().unwrap();
        let linker = select_linker(temp_dir.path(), LinkMode::Auto);
        assert_eq!(linker.name(), "symlink");
        assert_eq!(fs::read_dir(temp_dir.path()).unwrap().count(), 0);

        let src = temp_dir.path().join("a.png");
        let dst = temp_dir.path().join("link.png");
        fs::write(&src, b"pixels").unwrap();
        linker.link(&src, &dst).unwrap();
        assert!(fs::symlink_metadata(&dst).unwrap().file_type().is_symlink());
        assert_eq!(fs::read(&dst).unwrap(), b"pixels");
    }
}
