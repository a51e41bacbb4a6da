use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::io::{Cursor, Write};
use std::path::Path;
use std::rc::Rc;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use zip::ZipWriter;
use zip::write::SimpleFileOptions;

use oasis_data_manager::app::{
    DataManager, DownloadRequest, FreesurferManager, OutcomeStatus, ProgressEvent, ProgressSink,
};
use oasis_data_manager::domain::{Credentials, OverwritePolicy, ProjectId};
use oasis_data_manager::error::OasisError;
use oasis_data_manager::nitrc::{ArchiveSession, ArchiveSource, DEFAULT_BASE_URL, download_url};

const IDS: [&str; 3] = [
    "OAS30001_Freesurfer53_d0129",
    "OAS30002_Freesurfer53_d0653",
    "OAS30003_Freesurfer53_d1631",
];

#[derive(Clone)]
enum Reply {
    Archive(Vec<u8>),
    Status(u16),
}

#[derive(Default)]
struct FakeNitrc {
    replies: HashMap<String, Reply>,
    requested: Rc<RefCell<Vec<String>>>,
    sessions: Rc<RefCell<usize>>,
}

struct FakeSession {
    replies: HashMap<String, Reply>,
    requested: Rc<RefCell<Vec<String>>>,
}

impl ArchiveSource for FakeNitrc {
    type Session = FakeSession;

    fn open_session(&self, credentials: &Credentials) -> Result<FakeSession, OasisError> {
        assert_eq!(credentials.username, "alice");
        *self.sessions.borrow_mut() += 1;
        Ok(FakeSession {
            replies: self.replies.clone(),
            requested: Rc::clone(&self.requested),
        })
    }
}

impl ArchiveSession for FakeSession {
    fn fetch_archive(&self, url: &str, destination: &Path) -> Result<(), OasisError> {
        self.requested.borrow_mut().push(url.to_string());
        match self.replies.get(url) {
            Some(Reply::Archive(bytes)) => {
                fs::write(destination, bytes).map_err(|err| OasisError::Filesystem(err.to_string()))
            }
            Some(Reply::Status(status)) => Err(OasisError::NitrcStatus {
                status: *status,
                url: url.to_string(),
            }),
            None => Err(OasisError::NitrcStatus {
                status: 404,
                url: url.to_string(),
            }),
        }
    }
}

#[derive(Default)]
struct RecordingSink {
    lines: RefCell<Vec<String>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.lines.borrow_mut().push(event.message);
    }
}

fn label_for(id: &str) -> String {
    let parts = id.split('_').collect::<Vec<_>>();
    format!("{}_MR_{}", parts[0], parts[2])
}

fn url_for(id: &str) -> String {
    let label = label_for(id);
    let subject = id.split('_').next().unwrap();
    download_url(DEFAULT_BASE_URL, ProjectId::Oasis3, subject, &label, id)
}

fn freesurfer_zip(id: &str) -> Vec<u8> {
    let label = label_for(id);
    let files = format!("{id}/out/resources/DATA/files/{label}");
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, body) in [
        (format!("{files}/mri/T1.mgz"), "t1"),
        (format!("{files}/mri/T2.mgz"), "t2"),
        (format!("{files}/mri/transforms/talairach.xfm"), "xfm"),
        (format!("{files}/stats/aseg.stats"), "stats"),
        (format!("{id}/out/resources/snapshots/axial.gif"), "gif"),
    ] {
        writer.start_file(name, options).unwrap();
        writer.write_all(body.as_bytes()).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

fn setup(statuses: &[(&str, Option<u16>)]) -> (tempfile::TempDir, Utf8PathBuf, FakeNitrc) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let mut fake = FakeNitrc::default();
    for (id, status) in statuses {
        let reply = match status {
            None => Reply::Archive(freesurfer_zip(id)),
            Some(status) => Reply::Status(*status),
        };
        fake.replies.insert(url_for(id), reply);
    }
    (temp, root, fake)
}

fn write_list(root: &Utf8Path, content: &str) -> Utf8PathBuf {
    let path = root.join("subjects.csv");
    fs::write(path.as_std_path(), content).unwrap();
    path
}

fn request(list: Utf8PathBuf, keep: &[&str]) -> DownloadRequest {
    DownloadRequest {
        subjects_file: list,
        credentials: Credentials::new("alice", "secret"),
        files_to_keep: keep.iter().map(|name| name.to_string()).collect(),
    }
}

fn names(dir: &Utf8Path) -> Vec<String> {
    let mut names = fs::read_dir(dir.as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect::<Vec<_>>();
    names.sort();
    names
}

#[test]
fn every_subject_ends_up_as_a_single_mri_folder() {
    let (_temp, root, fake) = setup(&[(IDS[0], None), (IDS[1], None), (IDS[2], None)]);
    let list = write_list(&root, &format!("{}\n{}\n{}", IDS[0], IDS[1], IDS[2]));
    let output = root.join("freesurfers");
    let manager = FreesurferManager::new(output.clone(), fake).unwrap();

    let report = manager.download(&request(list, &[]), &RecordingSink::default()).unwrap();

    assert_eq!(report.count(OutcomeStatus::Downloaded), 3);
    assert_eq!(
        names(&output),
        vec!["OAS30001_MR_d0129", "OAS30002_MR_d0653", "OAS30003_MR_d1631"]
    );
    for label in names(&output) {
        let subject = output.join(&label);
        assert_eq!(names(&subject), vec!["mri"]);
        assert_eq!(
            names(&subject.join("mri")),
            vec!["T1.mgz", "T2.mgz", "transforms"]
        );
    }
}

#[test]
fn allow_list_prunes_each_subject() {
    let (_temp, root, fake) = setup(&[(IDS[0], None)]);
    let list = write_list(&root, &format!("{}\n", IDS[0]));
    let output = root.join("freesurfers");
    let manager = FreesurferManager::new(output.clone(), fake).unwrap();
    let sink = RecordingSink::default();

    let report = manager.download(&request(list, &["T1.mgz"]), &sink).unwrap();

    let mri = output.join("OAS30001_MR_d0129/mri");
    assert_eq!(names(&mri), vec!["T1.mgz"]);
    assert_eq!(report.items[0].removed.len(), 2);
    let removals = sink
        .lines
        .borrow()
        .iter()
        .filter(|line| line.starts_with("- Removed: "))
        .count();
    assert_eq!(removals, 2);
}

#[test]
fn a_rejected_subject_does_not_stop_the_others() {
    let (_temp, root, fake) = setup(&[(IDS[0], None), (IDS[1], Some(404)), (IDS[2], None)]);
    let list = write_list(&root, &format!("{}\n{}\n{}\n", IDS[0], IDS[1], IDS[2]));
    let output = root.join("freesurfers");
    let manager = FreesurferManager::new(output.clone(), fake).unwrap();

    let report = manager.download(&request(list, &[]), &RecordingSink::default()).unwrap();

    assert_eq!(names(&output), vec!["OAS30001_MR_d0129", "OAS30003_MR_d1631"]);
    assert_eq!(report.count(OutcomeStatus::Downloaded), 2);
    let failed = &report.items[1];
    assert_eq!(failed.status, OutcomeStatus::Failed);
    assert_eq!(failed.experiment_label.as_deref(), Some("OAS30002_MR_d0653"));
    assert!(failed.reason.as_deref().unwrap().contains("404"));
}

#[test]
fn empty_list_fails_before_any_request() {
    let (_temp, root, fake) = setup(&[(IDS[0], None)]);
    let requested = Rc::clone(&fake.requested);
    let sessions = Rc::clone(&fake.sessions);
    let list = write_list(&root, "\n");
    let manager = FreesurferManager::new(root.join("freesurfers"), fake).unwrap();

    let err = manager
        .download(&request(list, &[]), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, OasisError::EmptySubjectList(_));
    assert_eq!(*sessions.borrow(), 0);
    assert!(requested.borrow().is_empty());
}

#[test]
fn one_session_serves_the_whole_run() {
    let (_temp, root, fake) = setup(&[(IDS[0], None), (IDS[1], None)]);
    let requested = Rc::clone(&fake.requested);
    let list = write_list(&root, &format!("{}\n{}", IDS[0], IDS[1]));
    let manager = FreesurferManager::new(root.join("freesurfers"), fake).unwrap();
    let sink = RecordingSink::default();

    manager.download(&request(list, &[]), &sink).unwrap();

    assert_eq!(
        *requested.borrow(),
        vec![url_for(IDS[0]), url_for(IDS[1])]
    );
    let started = sink
        .lines
        .borrow()
        .iter()
        .filter(|line| line.as_str() == "Session started correctly")
        .count();
    assert_eq!(started, 1);
}

#[test]
fn skip_policy_keeps_existing_destination() {
    let (_temp, root, fake) = setup(&[(IDS[0], None)]);
    let requested = Rc::clone(&fake.requested);
    let list = write_list(&root, IDS[0]);
    let output = root.join("freesurfers");
    fs::create_dir_all(output.join("OAS30001_MR_d0129/mri").as_std_path()).unwrap();
    fs::write(output.join("OAS30001_MR_d0129/mri/old.mgz").as_std_path(), b"old").unwrap();
    let manager = FreesurferManager::new(output.clone(), fake)
        .unwrap()
        .with_overwrite(OverwritePolicy::Skip);

    let report = manager.download(&request(list, &[]), &RecordingSink::default()).unwrap();

    assert_eq!(report.items[0].status, OutcomeStatus::Skipped);
    assert!(requested.borrow().is_empty());
    assert_eq!(names(&output.join("OAS30001_MR_d0129/mri")), vec!["old.mgz"]);
}

#[test]
fn overwrite_policy_replaces_existing_destination() {
    let (_temp, root, fake) = setup(&[(IDS[0], None)]);
    let list = write_list(&root, IDS[0]);
    let output = root.join("freesurfers");
    fs::create_dir_all(output.join("OAS30001_MR_d0129/mri").as_std_path()).unwrap();
    fs::write(output.join("OAS30001_MR_d0129/mri/old.mgz").as_std_path(), b"old").unwrap();
    let manager = FreesurferManager::new(output.clone(), fake).unwrap();

    manager.download(&request(list, &[]), &RecordingSink::default()).unwrap();

    assert_eq!(
        names(&output.join("OAS30001_MR_d0129/mri")),
        vec!["T1.mgz", "T2.mgz", "transforms"]
    );
}

#[test]
fn unexpected_archive_layout_aborts_the_run() {
    let (_temp, root, mut fake) = setup(&[(IDS[1], None)]);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    writer
        .start_file(format!("{}/README.txt", IDS[0]), SimpleFileOptions::default())
        .unwrap();
    writer.write_all(b"nothing here").unwrap();
    let bytes = writer.finish().unwrap().into_inner();
    fake.replies.insert(url_for(IDS[0]), Reply::Archive(bytes));
    let requested = Rc::clone(&fake.requested);

    let list = write_list(&root, &format!("{}\n{}\n", IDS[0], IDS[1]));
    let manager = FreesurferManager::new(root.join("freesurfers"), fake).unwrap();

    let err = manager
        .download(&request(list, &[]), &RecordingSink::default())
        .unwrap_err();

    assert_matches!(err, OasisError::UnexpectedLayout(_));
    assert_eq!(requested.borrow().len(), 1);
}
