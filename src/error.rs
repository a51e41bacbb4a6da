use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum OasisError {
    #[error("subject list {0} contains no freesurfer ids")]
    #[diagnostic(help("put one id per line, e.g. OAS30001_Freesurfer53_d0129"))]
    EmptySubjectList(PathBuf),

    #[error("failed to read subject list at {0}")]
    SubjectListRead(PathBuf),

    #[error("invalid freesurfer assessment id: {0}")]
    InvalidAssessmentId(String),

    #[error("unsupported project: {0}")]
    #[diagnostic(help("only OASIS3 is available"))]
    UnsupportedProject(String),

    #[error("missing NITRC credentials: {0}")]
    MissingCredentials(&'static str),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("NITRC request failed: {0}")]
    NitrcHttp(String),

    #[error("NITRC returned status {status} for {url}")]
    NitrcStatus { status: u16, url: String },

    #[error("destination already exists: {0}")]
    DestinationExists(PathBuf),

    #[error("archive layout not recognized, missing {0}")]
    UnexpectedLayout(PathBuf),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}
