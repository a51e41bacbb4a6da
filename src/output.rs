use std::io::{self, Write};

use serde::Serialize;

use crate::app::{CleanReport, DownloadReport, OutcomeStatus, ProgressEvent, ProgressSink};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_download(result: &DownloadReport) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_clean(result: &CleanReport) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Prints progress lines on stdout as they happen.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_download_summary(result: &DownloadReport) {
        println!(
            "Downloaded: {}, skipped: {}, failed: {}",
            result.count(OutcomeStatus::Downloaded),
            result.count(OutcomeStatus::Skipped),
            result.count(OutcomeStatus::Failed)
        );
        for item in result
            .items
            .iter()
            .filter(|item| item.status == OutcomeStatus::Failed)
        {
            println!(
                "  {} ({})",
                item.assessment_id,
                item.reason.as_deref().unwrap_or("unknown")
            );
        }
    }

    pub fn print_clean_summary(result: &CleanReport) {
        let verb = if result.dry_run { "Would move" } else { "Moved" };
        println!(
            "{verb} {} empty subject(s), kept {}",
            result.moved.len(),
            result.kept
        );
        if !result.missing_check_dir.is_empty() {
            println!(
                "No check folder in: {}",
                result.missing_check_dir.join(", ")
            );
        }
        if !result.conflicts.is_empty() {
            println!(
                "Already in the holding folder, left in place: {}",
                result.conflicts.join(", ")
            );
        }
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => println!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => println!("{}", event.message),
        }
    }
}
