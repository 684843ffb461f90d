//! wxdraft command line.
//!
//! Turns a Markdown article and a cover image into a WeChat Official Account
//! draft in two steps: `process` renders a preview, `publish` submits it.

use std::path::{Path, PathBuf};
use std::io::Write;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tokio::sync::broadcast::error::RecvError;

use wxdraft::config::default_config_path;
use wxdraft::db::Database;
use wxdraft::error::ProcessError;
use wxdraft::job::{JobFilter, JobStatus, JobStore};
use wxdraft::logging::{init_logging, LogFormat};
use wxdraft::pipeline::{
    ChannelProgress, Pipeline, PipelineConfig, ProcessingRequest, ProgressEvent, UploadedFile,
};
use wxdraft::{load_config, Config, WxDraftError};

/// Publish Markdown articles as WeChat Official Account drafts.
#[derive(Parser, Debug)]
#[command(name = "wxdraft", version, about)]
struct Cli {
    /// Configuration file.
    #[arg(long, env = "WXDRAFT_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log output format (text or json).
    #[arg(long, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Upload files, render the article and write a preview.
    Process {
        /// Markdown article with YAML frontmatter.
        #[arg(long)]
        markdown: PathBuf,
        /// Cover image, uploaded as the draft thumbnail.
        #[arg(long)]
        cover: PathBuf,
        /// Image referenced from the article. Repeatable.
        #[arg(long = "image")]
        images: Vec<PathBuf>,
    },
    /// Submit a previewed job as a draft.
    Publish { job_id: String },
    /// Print a stored job as JSON.
    Show { job_id: String },
    /// List recent jobs.
    List {
        /// Only jobs in this status, e.g. PREVIEW_READY.
        #[arg(long)]
        status: Option<JobStatus>,
        #[arg(long, default_value_t = 20)]
        limit: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            report_failure(&mut std::io::stderr().lock(), &e);
            ExitCode::FAILURE
        }
    }
}

/// Writes the one line a failed command leaves on the terminal.
fn report_failure(out: &mut impl Write, error: &WxDraftError) {
    let _ = writeln!(out, "error: {}", error);
}

async fn run(cli: Cli) -> Result<(), WxDraftError> {
    let config = read_config(cli.config.as_deref())?;

    match cli.command {
        Command::Process {
            markdown,
            cover,
            images,
        } => {
            let request = ProcessingRequest {
                markdown: read_upload(&markdown)?,
                cover: read_upload(&cover)?,
                content_images: images
                    .iter()
                    .map(|p| read_upload(p))
                    .collect::<Result<Vec<_>, _>>()?,
            };

            let pipeline = Pipeline::from_config(&config)?;
            let progress = ChannelProgress::new(32);
            let printer = spawn_progress_printer(&progress);
            let result = pipeline.start_processing(request, &progress).await;
            drop(progress);
            let _ = printer.await;

            let outcome = result?;
            println!("job:     {}", outcome.job_id);
            println!("preview: {}", outcome.preview_url);
            for warning in &outcome.warnings {
                println!("warning: {}", warning);
            }
        }
        Command::Publish { job_id } => {
            let pipeline = Pipeline::from_config(&config)?;
            let progress = ChannelProgress::new(32);
            let printer = spawn_progress_printer(&progress);
            let result = pipeline.confirm_and_publish(&job_id, &progress).await;
            drop(progress);
            let _ = printer.await;

            let outcome = result?;
            println!("job:      {}", outcome.job_id);
            println!("media_id: {}", outcome.media_id);
            if outcome.thumbnail_refreshed {
                println!("note:     thumbnail was re-uploaded");
            }
        }
        Command::Show { job_id } => {
            let db = open_database(&config)?;
            match db.load(&job_id)? {
                Some(job) => println!("{}", to_json(&job)?),
                None => {
                    return Err(wxdraft::PipelineError::NotFound(format!("job {}", job_id)).into())
                }
            }
        }
        Command::List { status, limit } => {
            let db = open_database(&config)?;
            let jobs = db.list(&JobFilter {
                status,
                limit: Some(limit),
                offset: None,
            })?;
            for job in jobs {
                println!(
                    "{}  {:<13}  {}  {}",
                    job.id,
                    job.status.as_str(),
                    job.created_at.format("%Y-%m-%d %H:%M"),
                    job.metadata.title().unwrap_or("-")
                );
            }
        }
    }
    Ok(())
}

fn read_config(path: Option<&Path>) -> Result<Config, WxDraftError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => default_config_path().ok_or_else(|| {
            wxdraft::ConfigError::Validation {
                message: "no --config given and home directory is unknown".to_string(),
            }
        })?,
    };
    Ok(load_config(path)?)
}

fn open_database(config: &Config) -> Result<Database, WxDraftError> {
    let pipeline_config = PipelineConfig::from_config(config);
    Ok(Database::open(&pipeline_config.database_path)?)
}

fn read_upload(path: &Path) -> Result<UploadedFile, ProcessError> {
    UploadedFile::from_path(path).map_err(|source| ProcessError::ReadFile {
        path: path.to_path_buf(),
        source,
    })
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, WxDraftError> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Prints phase events to stderr until the reporter is dropped.
fn spawn_progress_printer(progress: &ChannelProgress) -> tokio::task::JoinHandle<()> {
    let mut rx = progress.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ProgressEvent::Phase { message, .. }) => eprintln!("  {}", message),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_reported_once() {
        let error = WxDraftError::from(wxdraft::PipelineError::NotFound("job abc".to_string()));
        let mut out = Vec::new();
        report_failure(&mut out, &error);

        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.starts_with("error: "));
        assert!(text.contains("job abc"));
    }
}
