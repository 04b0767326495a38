//! LocallyDrive CLI - Command line access to a Google Drive account.
//!
//! Reads the service-account key path from `GOOGLE_APPLICATION_CREDENTIALS`
//! and prints results as JSON. Ctrl-C cancels the running operation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use locallydrive_common::DriveSettings;
use locallydrive_storage::model::DEFAULT_PAGE_SIZE;
use locallydrive_storage::progress::DEFAULT_PROGRESS_CAPACITY;
use locallydrive_storage::{
    progress_channel, DriveClient, ListRequest, ProgressReceiver, ProgressSender,
    TransferProgress, UploadRequest, DRIVE_READONLY_SCOPE,
};

#[derive(Parser)]
#[command(name = "locallydrive")]
#[command(about = "LocallyDrive - Google Drive file transfer")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// Print transfer progress to stderr.
    #[arg(long)]
    progress: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List files, most recently modified first.
    List {
        /// Results per page (1-1000).
        #[arg(short = 'n', long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: i32,

        /// Continue from a previous page.
        #[arg(short = 't', long)]
        page_token: Option<String>,

        /// Drive query predicate, e.g. "mimeType = 'application/pdf'".
        #[arg(short, long)]
        filter: Option<String>,

        /// Sort order, e.g. "name".
        #[arg(short, long)]
        order_by: Option<String>,

        /// Include trashed files.
        #[arg(long)]
        include_trashed: bool,

        /// Follow page tokens and print every file.
        #[arg(short, long)]
        all: bool,
    },

    /// List the children of a folder, folders first.
    Folder {
        /// Folder id.
        folder_id: String,

        /// Results per page (1-1000).
        #[arg(short = 'n', long, default_value_t = DEFAULT_PAGE_SIZE)]
        page_size: i32,

        /// Continue from a previous page.
        #[arg(short = 't', long)]
        page_token: Option<String>,
    },

    /// Upload a local file.
    Upload {
        /// File to upload.
        source: PathBuf,

        /// Name in Drive (default: the source file name).
        #[arg(long)]
        name: Option<String>,

        /// Content type of the file.
        #[arg(short, long, default_value = "application/octet-stream")]
        mime_type: String,

        /// Parent folder id; may be repeated.
        #[arg(short, long = "parent")]
        parents: Vec<String>,
    },

    /// Download a file by id.
    Download {
        /// File id.
        file_id: String,

        /// Destination path.
        #[arg(short, long)]
        dest: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let settings = DriveSettings::from_env().context("Invalid configuration")?;
    let client = DriveClient::from_settings(&settings).context("Failed to create Drive client")?;

    let cancel = CancellationToken::new();
    let watcher = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            watcher.cancel();
        }
    });

    match cli.command {
        Commands::List {
            page_size,
            page_token,
            filter,
            order_by,
            include_trashed,
            all,
        } => {
            let mut request = ListRequest::new(page_size).include_trashed(include_trashed);
            if let Some(token) = page_token {
                request = request.with_page_token(token);
            }
            if let Some(filter) = filter {
                request = request.with_filter(filter);
            }
            if let Some(order_by) = order_by {
                request = request.with_order_by(order_by);
            }
            cmd_list(&client.with_scope(DRIVE_READONLY_SCOPE), &request, all, &cancel).await
        }

        Commands::Folder {
            folder_id,
            page_size,
            page_token,
        } => {
            let page = client
                .with_scope(DRIVE_READONLY_SCOPE)
                .list_by_folder(&folder_id, page_size, page_token.as_deref(), &cancel)
                .await
                .context("Failed to list folder")?;
            let folders = page.files.iter().filter(|f| f.is_folder()).count();
            info!(
                folders,
                files = page.files.len() - folders,
                has_more = page.has_more(),
                "Listed folder {}",
                folder_id
            );
            print_json(&page)
        }

        Commands::Upload {
            source,
            name,
            mime_type,
            parents,
        } => cmd_upload(&client, &source, name, mime_type, parents, cli.progress, &cancel).await,

        Commands::Download { file_id, dest } => {
            let client = client.with_scope(DRIVE_READONLY_SCOPE);
            cmd_download(&client, &file_id, &dest, cli.progress, &cancel).await
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print progress events to stderr until the transfer drops its sender.
fn watch_progress(enabled: bool) -> (Option<ProgressSender>, Option<JoinHandle<()>>) {
    if !enabled {
        return (None, None);
    }

    let (tx, rx) = progress_channel(DEFAULT_PROGRESS_CAPACITY);
    (Some(tx), Some(tokio::spawn(print_progress(rx))))
}

/// Wait for the progress printer to drain.
async fn finish_progress(printer: Option<JoinHandle<()>>) {
    if let Some(printer) = printer {
        if let Err(e) = printer.await {
            warn!(error = %e, "Progress printer failed");
        }
    }
}

async fn print_progress(mut rx: ProgressReceiver) {
    while let Some(event) = rx.recv().await {
        match event {
            TransferProgress::Uploading { bytes } => eprintln!("  uploading: {} bytes", bytes),
            TransferProgress::Downloading { bytes } => eprintln!("  downloaded: {} bytes", bytes),
            TransferProgress::Completed { bytes } => eprintln!("  done: {} bytes", bytes),
            TransferProgress::Failed { message } => eprintln!("  failed: {}", message),
        }
    }
}

/// List one page, or every page with `--all`.
async fn cmd_list(
    client: &DriveClient,
    request: &ListRequest,
    all: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    if all {
        let files = client
            .list_all(request, cancel)
            .await
            .context("Failed to list files")?;
        info!("Listed {} files", files.len());
        print_json(&files)
    } else {
        let page = client
            .list(request, cancel)
            .await
            .context("Failed to list files")?;
        print_json(&page)
    }
}

/// Upload a local file.
async fn cmd_upload(
    client: &DriveClient,
    source: &Path,
    name: Option<String>,
    mime_type: String,
    parents: Vec<String>,
    progress: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let file_name = match name {
        Some(name) => name,
        None => source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .context("Source path has no file name")?,
    };

    let mut file = tokio::fs::File::open(source)
        .await
        .with_context(|| format!("Failed to open {}", source.display()))?;

    let mut request = UploadRequest::new(file_name, mime_type).with_seekable(&mut file);
    for parent in parents {
        request = request.with_parent(parent);
    }

    let (sender, printer) = watch_progress(progress);
    let result = client.upload(request, sender, cancel).await;
    finish_progress(printer).await;

    let uploaded = result.context("Upload failed")?;
    print_json(&uploaded)
}

/// Download a file to `dest`.
async fn cmd_download(
    client: &DriveClient,
    file_id: &str,
    dest: &Path,
    progress: bool,
    cancel: &CancellationToken,
) -> Result<()> {
    let (sender, printer) = watch_progress(progress);
    let result = client.download(file_id, sender, cancel).await;
    finish_progress(printer).await;

    let buffer = result.context("Download failed")?;
    let bytes = buffer.get_ref().len();
    tokio::fs::write(dest, buffer.into_inner())
        .await
        .with_context(|| format!("Failed to write {}", dest.display()))?;

    println!("Downloaded {} bytes to {}", bytes, dest.display());
    Ok(())
}
