use std::{
    collections::HashSet,
    io::Write,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use client_core::{
    config::{load_settings, load_settings_from},
    ClientEvent, Confirmation, DownloadClient, DuplicateConfirmer, RegistrySnapshot,
    SubmissionBatch, SubmissionOutcome,
};
use shared::{
    domain::{Quality, TaskId},
    protocol::{DuplicateReport, TaskRecord},
};
use tokio::sync::broadcast;
use tracing::warn;

#[derive(Parser, Debug)]
#[command(name = "downloader", about = "Submit and track media downloads")]
struct Args {
    /// Backend base url, e.g. http://localhost:9000
    #[arg(long, global = true)]
    server_url: Option<String>,
    /// Settings file (defaults to ./downloader.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Queue one or more sources under a genre
    Submit {
        #[arg(required = true)]
        urls: Vec<String>,
        #[arg(long)]
        genre: String,
        /// best, high, medium, low or 0-3
        #[arg(long)]
        quality: Option<Quality>,
        /// Submit even when likely duplicates are reported
        #[arg(long, short = 'y')]
        yes: bool,
        /// Follow the submitted tasks until they finish
        #[arg(long)]
        watch: bool,
    },
    /// Print the active queue and history
    Status {
        #[arg(long)]
        json: bool,
    },
    Genres,
    Artifacts,
    /// Download an artifact's bytes
    Fetch {
        path: String,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Cut a time range out of an artifact
    Cut {
        #[arg(long)]
        path: String,
        #[arg(long)]
        start: f64,
        #[arg(long)]
        end: f64,
        /// Overrides the duration reported by the backend
        #[arg(long)]
        duration: Option<f64>,
        #[arg(long, default_value = ".")]
        out_dir: PathBuf,
    },
    /// Follow live progress until interrupted
    Watch,
}

/// Prints the report and asks on the terminal, unless `assume_yes`.
struct TerminalConfirmer {
    assume_yes: bool,
}

#[async_trait]
impl DuplicateConfirmer for TerminalConfirmer {
    async fn confirm(&self, batch: &SubmissionBatch, report: &DuplicateReport) -> Confirmation {
        print_report(report);
        if self.assume_yes {
            return Confirmation::Proceed;
        }

        print!("Submit {} source(s) anyway? [y/N] ", batch.len());
        let _ = std::io::stdout().flush();
        let answer = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match answer {
            Ok(Ok(line)) if matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes") => {
                Confirmation::Proceed
            }
            Ok(Ok(_)) => Confirmation::Cancel,
            Ok(Err(err)) => {
                warn!(error = %err, "could not read confirmation, cancelling");
                Confirmation::Cancel
            }
            Err(err) => {
                warn!(error = %err, "confirmation prompt failed, cancelling");
                Confirmation::Cancel
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with_writer(std::io::stderr)
        .init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => {
            if !path.exists() {
                return Err(anyhow!("settings file {} does not exist", path.display()));
            }
            load_settings_from(path)
        }
        None => load_settings(),
    };
    if let Some(server_url) = args.server_url {
        settings.server_url = server_url.trim_end_matches('/').to_string();
    }
    let default_quality = settings.default_quality;
    let client = DownloadClient::new(settings).context("failed to build client")?;

    match args.command {
        Command::Submit {
            urls,
            genre,
            quality,
            yes,
            watch,
        } => {
            let batch = SubmissionBatch::new(urls, genre, quality.unwrap_or(default_quality))?;
            let confirmer = TerminalConfirmer { assume_yes: yes };
            let mut events = client.subscribe();
            if watch {
                client.start_session().await?;
            }

            match client.submit_checked(batch, &confirmer).await? {
                SubmissionOutcome::Cancelled => println!("Submission cancelled."),
                SubmissionOutcome::Submitted(ids) => {
                    for id in &ids {
                        println!("queued {id}");
                    }
                    if watch {
                        follow(&client, &mut events, Some(ids.into_iter().collect())).await?;
                    }
                }
            }
        }
        Command::Status { json } => {
            client.refresh_status().await?;
            let snapshot = client.snapshot().await;
            if json {
                let history: Vec<&TaskRecord> =
                    snapshot.history.iter().map(|entry| entry.record()).collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "active": snapshot.active,
                        "history": history,
                    }))?
                );
            } else {
                print_snapshot(&snapshot);
            }
        }
        Command::Genres => {
            for genre in client.list_genres().await? {
                println!("{genre}");
            }
        }
        Command::Artifacts => {
            for artifact in client.list_artifacts().await? {
                let duration = artifact
                    .duration_seconds
                    .map(|seconds| format!("{seconds:.1}s"))
                    .unwrap_or_else(|| "-".into());
                println!("{:>10}  {:>8}  {}", artifact.size, duration, artifact.path);
            }
        }
        Command::Fetch { path, out } => {
            let bytes = client.fetch_artifact_bytes(&path).await?;
            let out = match out {
                Some(out) => out,
                None => PathBuf::from(
                    Path::new(&path)
                        .file_name()
                        .ok_or_else(|| anyhow!("cannot derive a file name from '{path}'"))?,
                ),
            };
            std::fs::write(&out, &bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} bytes to {}", bytes.len(), out.display());
        }
        Command::Cut {
            path,
            start,
            end,
            duration,
            out_dir,
        } => {
            let mut artifact = client
                .list_artifacts()
                .await?
                .into_iter()
                .find(|artifact| artifact.path == path)
                .ok_or_else(|| anyhow!("no artifact at '{path}'"))?;
            if duration.is_some() {
                artifact.duration_seconds = duration;
            }
            let clip = client.cut_clip(&artifact, start, end).await?;
            let out = out_dir.join(&clip.file_name);
            std::fs::write(&out, &clip.bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("wrote {} bytes to {}", clip.bytes.len(), out.display());
        }
        Command::Watch => {
            let mut events = client.subscribe();
            client.start_session().await?;
            follow(&client, &mut events, None).await?;
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Prints registry changes until every id in `until` has finished, or until
/// ctrl-c when `until` is `None`. An empty `until` returns right away.
async fn follow(
    client: &Arc<DownloadClient>,
    events: &mut broadcast::Receiver<ClientEvent>,
    until: Option<HashSet<TaskId>>,
) -> Result<()> {
    print_snapshot(&client.snapshot().await);
    if until.as_ref().is_some_and(|ids| ids.is_empty()) {
        return Ok(());
    }
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => return Ok(()),
            event = events.recv() => match event {
                Ok(ClientEvent::RegistryChanged(snapshot)) => {
                    print_snapshot(&snapshot);
                    if let Some(ids) = &until {
                        if ids.iter().all(|id| is_finished(&snapshot, id)) {
                            return Ok(());
                        }
                    }
                }
                Ok(ClientEvent::StreamDisconnected) => warn!("live updates disconnected, relying on polling"),
                Ok(ClientEvent::Error(message)) => eprintln!("error: {message}"),
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "display fell behind");
                }
                Err(broadcast::error::RecvError::Closed) => return Ok(()),
            },
        }
    }
}

fn is_finished(snapshot: &RegistrySnapshot, id: &TaskId) -> bool {
    match snapshot.get(id) {
        Some(task) => task.status.is_terminal(),
        None => snapshot.history.iter().any(|entry| &entry.id == id),
    }
}

fn print_snapshot(snapshot: &RegistrySnapshot) {
    println!("-- revision {} --", snapshot.revision);
    for task in &snapshot.active {
        print_task(task);
    }
    if !snapshot.history.is_empty() {
        println!("history:");
        for entry in &snapshot.history {
            print_task(entry.record());
        }
    }
}

fn print_task(task: &TaskRecord) {
    let detail = task
        .error_detail
        .as_deref()
        .or(task.artifact_path.as_deref())
        .unwrap_or("");
    println!(
        "  {:<12} {:>5.1}%  {}  {}",
        task.status.as_str(),
        task.progress,
        task.display_name(),
        detail
    );
}

fn print_report(report: &DuplicateReport) {
    if report.url_already_downloaded {
        println!("This source has already been downloaded.");
    }
    for similar in &report.similar_matches {
        let proposed = match (&similar.proposed.artist, &similar.proposed.title) {
            (Some(artist), Some(title)) => format!("{artist} - {title}"),
            _ => similar.proposed.url.clone(),
        };
        println!("Possible duplicate of {proposed}:");
        for existing in &similar.matches {
            println!("  {} - {} ({})", existing.artist, existing.title, existing.origin);
        }
    }
}
