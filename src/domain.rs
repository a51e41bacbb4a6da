use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::OasisError;

/// Freesurfer assessment id as listed by NITRC, e.g. `OAS30001_Freesurfer53_d0129`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssessmentId(String);

impl AssessmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives `SUBJECT_MR_TIME` from tokens 0 and 2 of the underscore split.
    pub fn experiment_label(&self) -> Result<ExperimentLabel, OasisError> {
        let tokens = self.0.split('_').collect::<Vec<_>>();
        match tokens.as_slice() {
            [subject, _, time, ..] if !subject.is_empty() && !time.is_empty() => {
                Ok(ExperimentLabel::new(subject, time))
            }
            _ => Err(OasisError::InvalidAssessmentId(self.0.clone())),
        }
    }
}

impl fmt::Display for AssessmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for AssessmentId {
    type Err = OasisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(OasisError::InvalidAssessmentId(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// MR session label, used both as the remote experiment id and the local folder name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ExperimentLabel {
    subject: String,
    label: String,
}

impl ExperimentLabel {
    pub fn new(subject: &str, time: &str) -> Self {
        Self {
            subject: subject.to_string(),
            label: format!("{subject}_MR_{time}"),
        }
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn as_str(&self) -> &str {
        &self.label
    }
}

impl fmt::Display for ExperimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ProjectId {
    #[default]
    Oasis3,
}

impl ProjectId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectId::Oasis3 => "OASIS3",
        }
    }
}

impl fmt::Display for ProjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ProjectId {
    type Err = OasisError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_uppercase().as_str() {
            "OASIS3" => Ok(ProjectId::Oasis3),
            _ => Err(OasisError::UnsupportedProject(value.to_string())),
        }
    }
}

/// What to do when `<output>/<label>` is already on disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OverwritePolicy {
    #[default]
    Overwrite,
    Skip,
    Fail,
}

impl fmt::Display for OverwritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverwritePolicy::Overwrite => write!(f, "overwrite"),
            OverwritePolicy::Skip => write!(f, "skip"),
            OverwritePolicy::Fail => write!(f, "fail"),
        }
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn label_from_assessment_id() {
        let id: AssessmentId = "OAS30001_Freesurfer53_d0129".parse().unwrap();
        let label = id.experiment_label().unwrap();
        assert_eq!(label.as_str(), "OAS30001_MR_d0129");
        assert_eq!(label.subject(), "OAS30001");
    }

    #[test]
    fn label_ignores_extra_tokens() {
        let id: AssessmentId = "OAS30001_Freesurfer53_d0129_v2".parse().unwrap();
        assert_eq!(id.experiment_label().unwrap().as_str(), "OAS30001_MR_d0129");
    }

    #[test]
    fn label_requires_three_tokens() {
        let id: AssessmentId = "OAS30001_d0129".parse().unwrap();
        assert_matches!(
            id.experiment_label(),
            Err(OasisError::InvalidAssessmentId(_))
        );
    }

    #[test]
    fn project_parsing() {
        assert_eq!("oasis3".parse::<ProjectId>().unwrap(), ProjectId::Oasis3);
        assert_matches!(
            "OASIS4".parse::<ProjectId>(),
            Err(OasisError::UnsupportedProject(_))
        );
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("alice", "secret");
        let rendered = format!("{creds:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("secret"));
    }
}
