use crate::error::SimError;
use ignore::{Walk, WalkBuilder};
use std::path::Path;
use tracing::{debug, warn};

/// Depth-first walk over everything under `root`. Hidden and git-ignored
/// entries are included and symlinks are followed.
pub fn walker(root: &Path) -> Walk {
    WalkBuilder::new(root)
        .standard_filters(false)
        .follow_links(true)
        .build()
}

/// Recursively collects the names (not paths) of every file under `dir` whose
/// extension is `extension`. Names found in several subdirectories appear once
/// per occurrence.
pub fn collect_files(dir: &Path, extension: &str) -> Result<Vec<String>, SimError> {
    check_root(dir)?;

    let mut names = Vec::new();
    for result in walker(dir) {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", dir.display(), e);
                continue;
            }
        };
        if !entry.file_type().is_some_and(|ft| ft.is_file()) {
            continue;
        }
        let path = entry.path();
        if !has_extension(path, extension) {
            continue;
        }
        match entry.file_name().to_str() {
            Some(name) => names.push(name.to_string()),
            None => warn!("Skipping {}: file name is not valid UTF-8", path.display()),
        }
    }

    debug!("Discovered {} .{} files under {}", names.len(), extension, dir.display());
    Ok(names)
}

fn check_root(dir: &Path) -> Result<(), SimError> {
    let read_dir_error = |source| SimError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };
    let metadata = std::fs::metadata(dir).map_err(read_dir_error)?;
    if !metadata.is_dir() {
        return Err(read_dir_error(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            "not a directory",
        )));
    }
    Ok(())
}

pub fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(extension)
}
