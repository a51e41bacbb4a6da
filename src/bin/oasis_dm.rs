use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use tracing_subscriber::EnvFilter;

use oasis_data_manager::app::{CleanRequest, DataManager, DownloadRequest, FreesurferManager};
use oasis_data_manager::config::{ConfigLoader, ResolvedConfig};
use oasis_data_manager::domain::{Credentials, OverwritePolicy, ProjectId};
use oasis_data_manager::error::OasisError;
use oasis_data_manager::nitrc::NitrcHttpSource;
use oasis_data_manager::output::{ConsoleOutput, JsonOutput, OutputMode};

#[derive(Parser)]
#[command(name = "oasis-dm")]
#[command(about = "Download and tidy OASIS-3 freesurfer MRI folders from NITRC")]
#[command(version, author)]
struct Cli {
    #[arg(long, global = true)]
    non_interactive: bool,

    #[arg(long, global = true)]
    config: Option<String>,

    #[arg(long, global = true)]
    output_dir: Option<Utf8PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Download the mri folder of every freesurfer id in a list file")]
    Download(DownloadArgs),
    #[command(about = "Move subjects whose mri folder only holds the sentinel file")]
    Clean(CleanArgs),
}

#[derive(Args)]
struct DownloadArgs {
    subjects_file: Utf8PathBuf,

    #[arg(long, env = "NITRC_USERNAME")]
    username: Option<String>,

    #[arg(long, env = "NITRC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long = "keep", value_name = "FILE")]
    files_to_keep: Vec<String>,

    #[arg(long)]
    overwrite: Option<OverwritePolicy>,

    #[arg(long)]
    project: Option<String>,
}

#[derive(Args)]
struct CleanArgs {
    empty_dir: Utf8PathBuf,

    #[arg(long)]
    check_dir: Option<String>,

    #[arg(long)]
    dry_run: bool,
}

fn main() -> ExitCode {
    if let Err(report) = run() {
        eprintln!("{report:?}");
        if let Some(oasis) = report.downcast_ref::<OasisError>() {
            return ExitCode::from(map_exit_code(oasis));
        }
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

fn map_exit_code(error: &OasisError) -> u8 {
    match error {
        OasisError::EmptySubjectList(_)
        | OasisError::SubjectListRead(_)
        | OasisError::MissingCredentials(_)
        | OasisError::UnsupportedProject(_)
        | OasisError::ConfigRead(_)
        | OasisError::ConfigParse(_) => 2,
        OasisError::UnexpectedLayout(_) => 3,
        _ => 1,
    }
}

fn run() -> miette::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let output_mode = if cli.non_interactive {
        OutputMode::NonInteractive
    } else {
        OutputMode::Interactive
    };

    let mut config = ConfigLoader::resolve(cli.config.as_deref())?;
    if let Some(output_dir) = cli.output_dir {
        config.output_dir = output_dir;
    }

    match cli.command {
        Commands::Download(args) => run_download(args, config, output_mode),
        Commands::Clean(args) => run_clean(args, config, output_mode),
    }
}

fn build_manager(config: &ResolvedConfig) -> miette::Result<FreesurferManager<NitrcHttpSource>> {
    let source = NitrcHttpSource::new(config.timeout);
    let manager = FreesurferManager::new(config.output_dir.clone(), source)?
        .with_project(config.project)
        .with_base_url(config.base_url.clone())
        .with_overwrite(config.overwrite);
    Ok(manager)
}

fn run_download(
    args: DownloadArgs,
    mut config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let DownloadArgs {
        subjects_file,
        username,
        password,
        files_to_keep,
        overwrite,
        project,
    } = args;

    if let Some(project) = project {
        config.project = project.parse::<ProjectId>()?;
    }
    if let Some(overwrite) = overwrite {
        config.overwrite = overwrite;
    }
    let files_to_keep = if files_to_keep.is_empty() {
        config.files_to_keep.clone()
    } else {
        files_to_keep
    };

    let username = username
        .or_else(|| config.username.clone())
        .ok_or(OasisError::MissingCredentials(
            "pass --username or set NITRC_USERNAME",
        ))?;
    let password = password
        .ok_or(OasisError::MissingCredentials(
            "pass --password or set NITRC_PASSWORD",
        ))?;

    let manager = build_manager(&config)?;
    let request = DownloadRequest {
        subjects_file,
        credentials: Credentials::new(username, password),
        files_to_keep,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = manager.download(&request, &JsonOutput)?;
            JsonOutput::print_download(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = manager.download(&request, &ConsoleOutput)?;
            ConsoleOutput::print_download_summary(&result);
        }
    }
    Ok(())
}

fn run_clean(
    args: CleanArgs,
    config: ResolvedConfig,
    output_mode: OutputMode,
) -> miette::Result<()> {
    let manager = build_manager(&config)?;
    let request = CleanRequest {
        empty_dir: args.empty_dir,
        check_dir: args.check_dir.unwrap_or_else(|| config.check_dir.clone()),
        dry_run: args.dry_run,
    };

    match output_mode {
        OutputMode::NonInteractive => {
            let result = manager.clean(&request, &JsonOutput)?;
            JsonOutput::print_clean(&result).into_diagnostic()?;
        }
        OutputMode::Interactive => {
            let result = manager.clean(&request, &ConsoleOutput)?;
            ConsoleOutput::print_clean_summary(&result);
        }
    }
    Ok(())
}
