use std::fs;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{AssessmentId, ExperimentLabel};
use crate::error::OasisError;
use crate::fs_util;

pub const MRI_DIR: &str = "mri";

#[derive(Debug, Clone)]
pub struct PostProcessOutcome {
    pub destination: Utf8PathBuf,
    pub removed: Vec<Utf8PathBuf>,
}

/// Where a NITRC assessor archive puts the MRI folder once extracted into `output_dir`.
pub fn mri_source_dir(
    output_dir: &Utf8Path,
    id: &AssessmentId,
    label: &ExperimentLabel,
) -> Utf8PathBuf {
    output_dir
        .join(id.as_str())
        .join("out")
        .join("resources")
        .join("DATA")
        .join("files")
        .join(label.as_str())
        .join(MRI_DIR)
}

pub fn archive_path(output_dir: &Utf8Path, label: &ExperimentLabel) -> Utf8PathBuf {
    output_dir.join(format!("{}.zip", label.as_str()))
}

/// Moves `mri` into `<output>/<label>`, drops the extracted tree and the zip,
/// then prunes the MRI folder down to `files_to_keep` when that list is non-empty.
pub fn post_process(
    output_dir: &Utf8Path,
    id: &AssessmentId,
    label: &ExperimentLabel,
    files_to_keep: &[String],
) -> Result<PostProcessOutcome, OasisError> {
    let source = mri_source_dir(output_dir, id, label);
    if !source.as_std_path().is_dir() {
        return Err(OasisError::UnexpectedLayout(source.into_std_path_buf()));
    }

    let destination = output_dir.join(label.as_str());
    if destination.as_std_path().exists() {
        fs::remove_dir_all(destination.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
    }
    fs::create_dir_all(destination.as_std_path())
        .map_err(|err| OasisError::Filesystem(err.to_string()))?;

    let mri_dir = destination.join(MRI_DIR);
    fs_util::move_dir(source.as_std_path(), mri_dir.as_std_path())?;

    let extracted_root = output_dir.join(id.as_str());
    fs::remove_dir_all(extracted_root.as_std_path()).map_err(|err| {
        OasisError::Filesystem(format!("remove {extracted_root}: {err}"))
    })?;

    let removed = if files_to_keep.is_empty() {
        Vec::new()
    } else {
        prune_mri(&mri_dir, files_to_keep)?
    };

    let zip_path = archive_path(output_dir, label);
    fs::remove_file(zip_path.as_std_path())
        .map_err(|err| OasisError::Filesystem(format!("remove {zip_path}: {err}")))?;

    Ok(PostProcessOutcome {
        destination,
        removed,
    })
}

/// Removes every direct entry of `mri_dir` whose name is not in `files_to_keep`.
pub fn prune_mri(
    mri_dir: &Utf8Path,
    files_to_keep: &[String],
) -> Result<Vec<Utf8PathBuf>, OasisError> {
    let entries = fs::read_dir(mri_dir.as_std_path())
        .map_err(|err| OasisError::Filesystem(format!("read {mri_dir}: {err}")))?;

    let mut doomed = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| OasisError::Filesystem(err.to_string()))?;
        let name = entry.file_name();
        let keep = name
            .to_str()
            .map(|name| files_to_keep.iter().any(|wanted| wanted == name))
            .unwrap_or(false);
        if !keep {
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                OasisError::Filesystem(format!("non-utf8 path in mri folder: {}", path.display()))
            })?;
            doomed.push(path);
        }
    }
    doomed.sort();

    for path in &doomed {
        fs_util::remove_entry(path.as_std_path())?;
        tracing::debug!(path = %path, "pruned");
    }
    Ok(doomed)
}
