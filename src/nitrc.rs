use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::{AssessmentId, Credentials, ExperimentLabel, ProjectId};
use crate::error::OasisError;

pub const DEFAULT_BASE_URL: &str = "https://www.nitrc.org/ir/data/archive/projects/";

/// Builds the XNAT endpoint serving one assessor's files as a single zip.
pub fn download_url(
    base_url: &str,
    project: ProjectId,
    subject: &str,
    experiment: &str,
    assessor: &str,
) -> String {
    format!(
        "{base_url}{project}/subjects/{subject}/experiments/{experiment}/assessors/{assessor}/files?format=zip"
    )
}

pub fn assessment_url(
    base_url: &str,
    project: ProjectId,
    id: &AssessmentId,
    label: &ExperimentLabel,
) -> String {
    download_url(base_url, project, label.subject(), label.as_str(), id.as_str())
}

/// Opens authenticated sessions against an archive host.
pub trait ArchiveSource {
    type Session: ArchiveSession;

    fn open_session(&self, credentials: &Credentials) -> Result<Self::Session, OasisError>;
}

/// One authenticated session, reused for every subject of a download run.
pub trait ArchiveSession {
    /// Writes the response body to `destination` when the server answers 200.
    fn fetch_archive(&self, url: &str, destination: &Path) -> Result<(), OasisError>;
}

#[derive(Debug, Clone)]
pub struct NitrcHttpSource {
    timeout: Duration,
}

impl NitrcHttpSource {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl ArchiveSource for NitrcHttpSource {
    type Session = NitrcHttpSession;

    fn open_session(&self, credentials: &Credentials) -> Result<NitrcHttpSession, OasisError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("oasis-dm/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| OasisError::NitrcHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(self.timeout)
            .build()
            .map_err(|err| OasisError::NitrcHttp(err.to_string()))?;
        Ok(NitrcHttpSession {
            client,
            credentials: credentials.clone(),
        })
    }
}

pub struct NitrcHttpSession {
    client: Client,
    credentials: Credentials,
}

impl ArchiveSession for NitrcHttpSession {
    fn fetch_archive(&self, url: &str, destination: &Path) -> Result<(), OasisError> {
        let mut response = self
            .client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
            .send()
            .map_err(|err| OasisError::NitrcHttp(err.to_string()))?;
        if response.status() != StatusCode::OK {
            return Err(OasisError::NitrcStatus {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }
        let mut file =
            File::create(destination).map_err(|err| OasisError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| OasisError::Filesystem(err.to_string()))?;
        Ok(())
    }
}
