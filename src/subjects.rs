use std::fs;
use std::path::Path;

use crate::domain::AssessmentId;
use crate::error::OasisError;

/// Reads one assessment id per line. Blank lines are skipped and line terminators
/// are stripped explicitly, so the last id survives a missing trailing newline.
pub fn read_subject_list(path: &Path) -> Result<Vec<AssessmentId>, OasisError> {
    let content =
        fs::read_to_string(path).map_err(|_| OasisError::SubjectListRead(path.to_path_buf()))?;
    parse_subject_list(&content)
}

pub fn parse_subject_list(content: &str) -> Result<Vec<AssessmentId>, OasisError> {
    content
        .lines()
        .map(|line| line.trim_end_matches(['\r', '\n']))
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.parse::<AssessmentId>())
        .collect()
}
