use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use zip::ZipArchive;

use crate::error::OasisError;

/// Unpacks every entry of `zip_path` under `target_dir`, keeping the archive's internal paths.
pub fn extract_zip(zip_path: &Path, target_dir: &Path) -> Result<usize, OasisError> {
    let file = fs::File::open(zip_path)
        .map_err(|err| OasisError::Filesystem(format!("open zip {}: {err}", zip_path.display())))?;
    let mut archive =
        ZipArchive::new(file).map_err(|err| OasisError::Filesystem(err.to_string()))?;

    let mut extracted = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        let entry_path = match entry.enclosed_name() {
            Some(path) => target_dir.join(path),
            None => {
                return Err(OasisError::Filesystem(format!(
                    "zip entry path traversal detected: {}",
                    entry.name()
                )));
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)
                .map_err(|err| OasisError::Filesystem(err.to_string()))?;
            continue;
        }

        if let Some(parent) = entry_path.parent() {
            fs::create_dir_all(parent).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        }
        let mut outfile = fs::File::create(&entry_path)
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        io::copy(&mut entry, &mut outfile)
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        extracted += 1;
    }
    Ok(extracted)
}

/// Moves a directory, falling back to copy + delete when `rename` cannot cross devices.
///
/// `to` must not exist yet. An existing target is never merged into.
pub fn move_dir(from: &Path, to: &Path) -> Result<(), OasisError> {
    if to.exists() {
        return Err(OasisError::DestinationExists(to.to_path_buf()));
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::CrossesDevices => {
            copy_dir_recursive(from, to)?;
            fs::remove_dir_all(from).map_err(|err| OasisError::Filesystem(err.to_string()))
        }
        Err(err) => Err(OasisError::Filesystem(format!(
            "move {} -> {}: {err}",
            from.display(),
            to.display()
        ))),
    }
}

pub fn copy_dir_recursive(source: &Path, dest: &Path) -> Result<(), OasisError> {
    fs::create_dir_all(dest).map_err(|err| OasisError::Filesystem(err.to_string()))?;
    for entry in walk_dir(source)? {
        let relative = entry
            .strip_prefix(source)
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        let target = dest.join(relative);
        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent)
                    .map_err(|err| OasisError::Filesystem(err.to_string()))?;
            }
            fs::copy(&entry, &target).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        }
    }
    Ok(())
}

/// Removes a file or a whole directory tree.
pub fn remove_entry(path: &Path) -> Result<(), OasisError> {
    let result = if path.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    result.map_err(|err| OasisError::Filesystem(format!("remove {}: {err}", path.display())))
}

pub fn count_entries(dir: &Path) -> Result<usize, OasisError> {
    let entries = fs::read_dir(dir)
        .map_err(|err| OasisError::Filesystem(format!("read {}: {err}", dir.display())))?;
    let mut count = 0;
    for entry in entries {
        entry.map_err(|err| OasisError::Filesystem(format!("read {}: {err}", dir.display())))?;
        count += 1;
    }
    Ok(count)
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, OasisError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| OasisError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}
