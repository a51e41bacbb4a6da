use std::fs;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{AssessmentId, Credentials, ExperimentLabel, OverwritePolicy, ProjectId};
use crate::error::OasisError;
use crate::fs_util;
use crate::nitrc::{ArchiveSession, ArchiveSource, DEFAULT_BASE_URL, assessment_url};
use crate::postprocess::{self, MRI_DIR};
use crate::subjects::read_subject_list;

/// Placeholder freesurfer leaves in an otherwise empty MRI folder.
pub const SENTINEL_FILE: &str = ".xdebug_mris_calc";

#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub subjects_file: Utf8PathBuf,
    pub credentials: Credentials,
    pub files_to_keep: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct CleanRequest {
    pub empty_dir: Utf8PathBuf,
    pub check_dir: String,
    pub dry_run: bool,
}

impl CleanRequest {
    pub fn new(empty_dir: impl Into<Utf8PathBuf>) -> Self {
        Self {
            empty_dir: empty_dir.into(),
            check_dir: MRI_DIR.to_string(),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Downloaded,
    Skipped,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectOutcome {
    pub assessment_id: String,
    pub experiment_label: Option<String>,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub destination: Option<String>,
    pub removed: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadReport {
    pub project: String,
    pub started_at: String,
    pub finished_at: String,
    pub items: Vec<SubjectOutcome>,
}

impl DownloadReport {
    pub fn count(&self, status: OutcomeStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MovedSubject {
    pub experiment_label: String,
    pub from: String,
    pub to: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanReport {
    pub dry_run: bool,
    pub moved: Vec<MovedSubject>,
    pub kept: usize,
    pub missing_check_dir: Vec<String>,
    pub conflicts: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    fn msg(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            elapsed: None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Capabilities every data source manager offers.
pub trait DataManager {
    fn output_dir(&self) -> &Utf8Path;

    fn project(&self) -> ProjectId;

    fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, OasisError>;

    fn clean(
        &self,
        request: &CleanRequest,
        sink: &dyn ProgressSink,
    ) -> Result<CleanReport, OasisError>;
}

/// Downloads the `mri` folder of OASIS-3 freesurfer assessments.
#[derive(Debug, Clone)]
pub struct FreesurferManager<S: ArchiveSource> {
    output_dir: Utf8PathBuf,
    project: ProjectId,
    base_url: String,
    overwrite: OverwritePolicy,
    source: S,
}

impl<S: ArchiveSource> FreesurferManager<S> {
    /// Creates `output_dir` when it does not exist yet.
    pub fn new(output_dir: impl Into<Utf8PathBuf>, source: S) -> Result<Self, OasisError> {
        let output_dir = output_dir.into();
        fs::create_dir_all(output_dir.as_std_path())
            .map_err(|err| OasisError::Filesystem(format!("create {output_dir}: {err}")))?;
        Ok(Self {
            output_dir,
            project: ProjectId::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            overwrite: OverwritePolicy::default(),
            source,
        })
    }

    pub fn with_project(mut self, project: ProjectId) -> Self {
        self.project = project;
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_overwrite(mut self, overwrite: OverwritePolicy) -> Self {
        self.overwrite = overwrite;
        self
    }

    fn download_one(
        &self,
        session: &S::Session,
        id: &AssessmentId,
        files_to_keep: &[String],
        sink: &dyn ProgressSink,
    ) -> Result<SubjectOutcome, OasisError> {
        sink.event(ProgressEvent::msg(format!("- Starting download for: {id}")));

        let label = match id.experiment_label() {
            Ok(label) => label,
            Err(err) => {
                tracing::warn!(id = %id, "cannot derive experiment label");
                sink.event(ProgressEvent::msg(format!("- Skipping {id}: {err}")));
                return Ok(failed(id, None, err.to_string()));
            }
        };

        let destination = self.output_dir.join(label.as_str());
        if destination.as_std_path().exists() {
            match self.overwrite {
                OverwritePolicy::Overwrite => {}
                OverwritePolicy::Skip => {
                    sink.event(ProgressEvent::msg(format!(
                        "- {destination} already present, skipping"
                    )));
                    return Ok(SubjectOutcome {
                        assessment_id: id.to_string(),
                        experiment_label: Some(label.to_string()),
                        status: OutcomeStatus::Skipped,
                        reason: Some("destination already exists".to_string()),
                        destination: Some(destination.to_string()),
                        removed: Vec::new(),
                    });
                }
                OverwritePolicy::Fail => {
                    let err = OasisError::DestinationExists(destination.into_std_path_buf());
                    tracing::warn!(id = %id, "{err}");
                    sink.event(ProgressEvent::msg(format!("- {err}")));
                    return Ok(failed(id, Some(&label), err.to_string()));
                }
            }
        }

        let url = assessment_url(&self.base_url, self.project, id, &label);
        let zip_path = postprocess::archive_path(&self.output_dir, &label);
        let start = std::time::Instant::now();
        if let Err(err) = self.fetch_to(session, &url, &zip_path) {
            tracing::warn!(id = %id, url = %url, "download failed: {err}");
            sink.event(ProgressEvent::msg(format!("- {err}")));
            sink.event(ProgressEvent::msg(url.clone()));
            return Ok(failed(id, Some(&label), err.to_string()));
        }
        sink.event(ProgressEvent {
            message: format!("- File {zip_path} downloaded"),
            elapsed: Some(start.elapsed()),
        });

        let entries = fs_util::extract_zip(zip_path.as_std_path(), self.output_dir.as_std_path())?;
        tracing::debug!(id = %id, entries, "archive extracted");
        sink.event(ProgressEvent::msg(
            "- Zip file extracted. Starting post-processing.",
        ));

        let outcome = postprocess::post_process(&self.output_dir, id, &label, files_to_keep)?;
        for path in &outcome.removed {
            sink.event(ProgressEvent::msg(format!("- Removed: {path}")));
        }

        Ok(SubjectOutcome {
            assessment_id: id.to_string(),
            experiment_label: Some(label.to_string()),
            status: OutcomeStatus::Downloaded,
            reason: None,
            destination: Some(outcome.destination.to_string()),
            removed: outcome.removed.iter().map(|path| path.to_string()).collect(),
        })
    }

    /// Streams into a temp file first so an interrupted transfer never leaves a truncated zip.
    fn fetch_to(
        &self,
        session: &S::Session,
        url: &str,
        zip_path: &Utf8Path,
    ) -> Result<(), OasisError> {
        let temp = tempfile::Builder::new()
            .prefix(".oasis-dm-download")
            .tempfile_in(self.output_dir.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        session.fetch_archive(url, temp.path())?;
        temp.persist(zip_path.as_std_path())
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

impl<S: ArchiveSource> DataManager for FreesurferManager<S> {
    fn output_dir(&self) -> &Utf8Path {
        &self.output_dir
    }

    fn project(&self) -> ProjectId {
        self.project
    }

    fn download(
        &self,
        request: &DownloadRequest,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadReport, OasisError> {
        let ids = read_subject_list(request.subjects_file.as_std_path())?;
        if ids.is_empty() {
            return Err(OasisError::EmptySubjectList(
                request.subjects_file.clone().into_std_path_buf(),
            ));
        }

        let started_at = iso_timestamp();
        let session = self.source.open_session(&request.credentials)?;
        sink.event(ProgressEvent::msg("Session started correctly"));
        tracing::debug!(subjects = ids.len(), project = %self.project, "download run started");

        let mut items = Vec::with_capacity(ids.len());
        for id in &ids {
            items.push(self.download_one(&session, id, &request.files_to_keep, sink)?);
        }
        drop(session);

        Ok(DownloadReport {
            project: self.project.to_string(),
            started_at,
            finished_at: iso_timestamp(),
            items,
        })
    }

    fn clean(
        &self,
        request: &CleanRequest,
        sink: &dyn ProgressSink,
    ) -> Result<CleanReport, OasisError> {
        let empty_dir = request.empty_dir.as_path();
        if !request.dry_run {
            fs::create_dir_all(empty_dir.as_std_path())
                .map_err(|err| OasisError::Filesystem(format!("create {empty_dir}: {err}")))?;
        }

        let mut subjects = Vec::new();
        let entries = fs::read_dir(self.output_dir.as_std_path())
            .map_err(|err| OasisError::Filesystem(format!("read {}: {err}", self.output_dir)))?;
        for entry in entries {
            let entry = entry.map_err(|err| OasisError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                OasisError::Filesystem(format!("non-utf8 path: {}", path.display()))
            })?;
            if !path.as_std_path().is_dir() || same_dir(&path, empty_dir) {
                continue;
            }
            subjects.push(path);
        }
        subjects.sort();

        let mut report = CleanReport {
            dry_run: request.dry_run,
            moved: Vec::new(),
            kept: 0,
            missing_check_dir: Vec::new(),
            conflicts: Vec::new(),
        };

        for subject in subjects {
            let name = subject.file_name().unwrap_or_default().to_string();
            let check_path = subject.join(&request.check_dir);
            if !check_path.as_std_path().is_dir() {
                tracing::warn!(path = %check_path, "check folder missing, leaving subject in place");
                report.missing_check_dir.push(name);
                continue;
            }
            if fs_util::count_entries(check_path.as_std_path())? != 1 {
                report.kept += 1;
                continue;
            }

            let target = empty_dir.join(&name);
            if target.as_std_path().exists() {
                tracing::warn!(path = %target, "holding folder already has this subject, leaving it in place");
                report.conflicts.push(name);
                continue;
            }
            if !request.dry_run {
                fs_util::move_dir(subject.as_std_path(), target.as_std_path())?;
            }
            sink.event(ProgressEvent::msg(format!("Empty: {check_path}")));
            report.moved.push(MovedSubject {
                experiment_label: name,
                from: subject.to_string(),
                to: target.to_string(),
            });
        }

        Ok(report)
    }
}

fn failed(id: &AssessmentId, label: Option<&ExperimentLabel>, reason: String) -> SubjectOutcome {
    SubjectOutcome {
        assessment_id: id.to_string(),
        experiment_label: label.map(|label| label.to_string()),
        status: OutcomeStatus::Failed,
        reason: Some(reason),
        destination: None,
        removed: Vec::new(),
    }
}

fn same_dir(a: &Utf8Path, b: &Utf8Path) -> bool {
    match (a.canonicalize_utf8(), b.canonicalize_utf8()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
