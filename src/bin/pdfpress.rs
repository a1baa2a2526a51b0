//! CLI binary for pdfpress.
//!
//! A thin shim over the library crate: maps flags and environment variables
//! to `PipelineConfig` and its collaborators, then runs the server, a queue
//! worker, or a one-shot local job.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdfpress::{
    compressor_for, merge_documents, page_count, pipeline::input, render_cover, server,
    Authorizer, Backend, Compressor, CoverDefaults, CoverLabels, CoverSheet, Delivery,
    DriveClient, DriveConfig, FileCredentialStore, OAuthClient, OAuthConfig, Pipeline,
    PipelineConfig, Preset, RemoteCompressor, RemoteConfig, SpoolQueue, Worker, Workspace,
};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve uploads on :3000, compressing with Ghostscript
  pdfpress serve --bind 0.0.0.0:3000

  # Accept uploads into the queue and compress in the same process
  PDFPRESS_DELIVERY=queue pdfpress serve --embedded-worker

  # Run a standalone worker against the same spool
  pdfpress worker --workspace /srv/pdfpress

  # Compress one file locally
  pdfpress compress tugas.pdf -o tugas-small.pdf --preset screen

  # Build sessions 1-4 with covers, then compress
  pdfpress assemble --name "Budi" --student-id 2401 --class TI-2A \
      --from 1 --to 4 p1.pdf p2.pdf p3.pdf p4.pdf --compress --preset ebook

ENVIRONMENT VARIABLES:
  PDFPRESS_BIND            Listen address (default 127.0.0.1:3000)
  PDFPRESS_WORKSPACE       Scratch root for job directories
  PDFPRESS_SPOOL           Queue spool directory (default <workspace>/.spool)
  PDFPRESS_MAX_UPLOAD_MB   Upload limit in MiB (default 50)
  PDFPRESS_DELIVERY        download, json, or queue
  PDFPRESS_BACKEND         ghostscript, remote, or passthrough
  PDFPRESS_PRESET          screen, ebook, printer, prepress
  PDFPRESS_GS_BIN          Ghostscript executable (default gs)
  PDFPRESS_EMBEDDED_WORKER Run a queue worker inside `serve`
  GOOGLE_CLIENT_ID         OAuth client for Drive uploads
  GOOGLE_CLIENT_SECRET
  GOOGLE_REDIRECT_URI
  PDFPRESS_TOKEN_FILE      Stored OAuth token (default token.json)
  DRIVE_FOLDER_ID          Destination folder; enables Drive upload
  ILOVEPDF_PUBLIC_KEY      Remote compression key; enables /proxy/compress
  PDFPRESS_CLASS           Cover default: class
  PDFPRESS_COURSE          Cover default: course
  PDFPRESS_LECTURER        Cover default: lecturer
"#;

/// Assemble, compress and publish PDF submissions.
#[derive(Parser, Debug)]
#[command(
    name = "pdfpress",
    version,
    about = "Assemble, compress and publish PDF submissions",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDFPRESS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDFPRESS_QUIET")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server.
    Serve(ServeArgs),
    /// Consume the job spool until interrupted.
    Worker(PipelineArgs),
    /// Compress one local file.
    Compress(CompressArgs),
    /// Build a multi-session document with cover pages.
    Assemble(AssembleArgs),
}

/// Settings shared by every subcommand that runs the pipeline.
#[derive(Args, Debug)]
struct PipelineArgs {
    /// Scratch root for job directories.
    #[arg(long, env = "PDFPRESS_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Queue spool directory.
    #[arg(long, env = "PDFPRESS_SPOOL")]
    spool: Option<PathBuf>,

    /// Upload limit in MiB.
    #[arg(long, env = "PDFPRESS_MAX_UPLOAD_MB", default_value_t = 50)]
    max_upload_mb: usize,

    /// download, json, or queue.
    #[arg(long, env = "PDFPRESS_DELIVERY", default_value = "download")]
    delivery: Delivery,

    /// ghostscript, remote, or passthrough.
    #[arg(long, env = "PDFPRESS_BACKEND", default_value = "ghostscript")]
    backend: Backend,

    /// Default preset: screen, ebook, printer, prepress.
    #[arg(long, env = "PDFPRESS_PRESET", default_value = "ebook")]
    preset: Preset,

    /// Ghostscript executable.
    #[arg(long, env = "PDFPRESS_GS_BIN", default_value = "gs")]
    gs_bin: String,

    /// Remote compression key; enables the proxy route and the remote backend.
    #[arg(long, env = "ILOVEPDF_PUBLIC_KEY", hide_env_values = true)]
    ilovepdf_public_key: Option<String>,

    /// Cover default: class.
    #[arg(long = "default-class", env = "PDFPRESS_CLASS")]
    class_name: Option<String>,

    /// Cover default: course.
    #[arg(long = "default-course", env = "PDFPRESS_COURSE")]
    course: Option<String>,

    /// Cover default: lecturer.
    #[arg(long = "default-lecturer", env = "PDFPRESS_LECTURER")]
    lecturer: Option<String>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Listen address.
    #[arg(long, env = "PDFPRESS_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Run a queue worker inside the server process.
    #[arg(long, env = "PDFPRESS_EMBEDDED_WORKER")]
    embedded_worker: bool,

    #[arg(long, env = "GOOGLE_CLIENT_ID")]
    google_client_id: Option<String>,

    #[arg(long, env = "GOOGLE_CLIENT_SECRET", hide_env_values = true)]
    google_client_secret: Option<String>,

    #[arg(long, env = "GOOGLE_REDIRECT_URI")]
    google_redirect_uri: Option<String>,

    /// Where the OAuth token is stored.
    #[arg(long, env = "PDFPRESS_TOKEN_FILE", default_value = "token.json")]
    token_file: PathBuf,

    /// Destination Drive folder. Setting it enables Drive upload.
    #[arg(long, env = "DRIVE_FOLDER_ID")]
    drive_folder_id: Option<String>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct CompressArgs {
    /// PDF to compress.
    input: PathBuf,

    /// Output path. Default: `<input stem>-compressed.pdf`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[derive(Args, Debug)]
struct AssembleArgs {
    /// Student name printed on every cover.
    #[arg(long)]
    name: String,

    /// Student id printed on every cover.
    #[arg(long)]
    student_id: String,

    /// Class printed on every cover; falls back to PDFPRESS_CLASS.
    #[arg(long = "class")]
    class: Option<String>,

    /// First session number.
    #[arg(long)]
    from: u32,

    /// Last session number (inclusive).
    #[arg(long)]
    to: u32,

    /// Compress the assembled document with `--preset`.
    #[arg(long)]
    compress: bool,

    /// Output path. Default: "<name> (<student id>) <class>.pdf".
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// One file per session, in session order.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    #[command(flatten)]
    pipeline: PipelineArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => serve(args).await,
        Command::Worker(args) => worker(args).await,
        Command::Compress(args) => compress(args, cli.quiet).await,
        Command::Assemble(args) => assemble(args, cli.quiet).await,
    }
}

// ── Subcommands ──────────────────────────────────────────────────────────────

async fn serve(args: ServeArgs) -> Result<()> {
    let config = build_config(&args.pipeline, args.drive_folder_id.is_some())?;
    let remote = remote_client(&args.pipeline);
    let compressor =
        compressor_for(&config, remote.clone()).context("Failed to select compressor")?;

    let authorizer = match (
        &args.google_client_id,
        &args.google_client_secret,
        &args.google_redirect_uri,
    ) {
        (Some(id), Some(secret), Some(redirect)) => {
            let oauth = OAuthClient::new(OAuthConfig::new(id, secret, redirect));
            let store = Arc::new(FileCredentialStore::new(&args.token_file));
            Some(Arc::new(Authorizer::new(oauth, store)))
        }
        _ => None,
    };

    let mut pipeline = Pipeline::new(config.clone(), Arc::clone(&compressor));
    if let Some(folder) = &args.drive_folder_id {
        let Some(auth) = &authorizer else {
            bail!("DRIVE_FOLDER_ID is set but the Google OAuth client is not configured");
        };
        let drive = DriveClient::new(DriveConfig::new(Some(folder.clone())), Arc::clone(auth));
        pipeline = pipeline.with_drive(drive);
    }

    let embedded = args.embedded_worker.then(|| {
        if config.delivery != Delivery::Queue {
            warn!(
                "Embedded worker started but delivery is '{}'; nothing will be queued",
                config.delivery.as_str()
            );
        }
        worker_for(&config, pipeline.queue().clone(), Arc::clone(&compressor))
    });

    let mut state = server::AppState::new(pipeline);
    if let Some(auth) = authorizer {
        state = state.with_authorizer(auth);
    }
    if let Some(remote) = remote {
        state = state.with_remote(remote);
    }

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
        let _ = stop_tx.send(true);
    });

    let worker_task = embedded.map(|worker| tokio::spawn(worker.run(stopped(stop_rx.clone()))));

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;
    server::serve(listener, state, stopped(stop_rx))
        .await
        .context("Server failed")?;

    if let Some(task) = worker_task {
        task.await.context("Worker task panicked")?;
    }
    Ok(())
}

async fn worker(args: PipelineArgs) -> Result<()> {
    let config = build_config(&args, false)?;
    let compressor = compressor_for(&config, remote_client(&args))
        .context("Failed to select compressor")?;

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown requested");
        }
    };
    let queue = SpoolQueue::new(config.spool_dir.clone());
    worker_for(&config, queue, compressor).run(shutdown).await;
    Ok(())
}

async fn compress(args: CompressArgs, quiet: bool) -> Result<()> {
    let config = build_config(&args.pipeline, false)?;
    let compressor = compressor_for(&config, remote_client(&args.pipeline))
        .context("Failed to select compressor")?;
    let preset = config.preset;

    let bytes = tokio::fs::read(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    input::validate_pdf(&bytes)?;

    let output = args
        .output
        .unwrap_or_else(|| default_compressed_path(&args.input));

    let bar = spinner(quiet, "Compressing", &args.input.display().to_string());
    let start = Instant::now();
    let written = compress_bytes(&config, compressor.as_ref(), preset, &bytes, &output).await;
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    let written = written?;

    if !quiet {
        eprintln!(
            "{} {} {} {}",
            green("✔"),
            bold(&output.display().to_string()),
            dim(&format!("{} → {}", human_bytes(bytes.len() as u64), human_bytes(written))),
            dim(&format!("({:.1}s, {})", start.elapsed().as_secs_f64(), preset)),
        );
    }
    Ok(())
}

async fn assemble(args: AssembleArgs, quiet: bool) -> Result<()> {
    let sessions = session_count(args.from, args.to)?;
    if args.files.len() != sessions {
        bail!(
            "Sessions {}..={} need {} files, got {}",
            args.from,
            args.to,
            sessions,
            args.files.len()
        );
    }

    let config = build_config(&args.pipeline, false)?;
    let class_name = args
        .class
        .clone()
        .or_else(|| config.cover_defaults.class_name.clone());

    let bar = spinner(quiet, "Assembling", "reading files");

    // ── Step 1: Read every session file ──────────────────────────────────
    let mut documents = Vec::with_capacity(sessions);
    for path in &args.files {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        input::validate_pdf(&bytes).with_context(|| format!("{} is not a PDF", path.display()))?;
        documents.push(bytes);
    }

    // ── Step 2: Cover + document per session, concatenated ───────────────
    if let Some(b) = &bar {
        b.set_message(format!("{sessions} sessions"));
    }
    let sheets: Vec<CoverSheet> = (args.from..=args.to)
        .map(|session| {
            let mut sheet = CoverSheet::new(session, &args.name, &args.student_id);
            sheet.class_name = class_name.clone();
            sheet.with_defaults(&config.cover_defaults)
        })
        .collect();
    let merged = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
        let labels = CoverLabels::default();
        let mut parts = Vec::with_capacity(documents.len() * 2);
        for (sheet, document) in sheets.iter().zip(documents) {
            parts.push(render_cover(sheet, &labels)?);
            parts.push(document);
        }
        let refs: Vec<&[u8]> = parts.iter().map(Vec::as_slice).collect();
        Ok(merge_documents(&refs)?)
    })
    .await
    .context("Assembly task panicked")??;
    let pages = page_count(&merged)?;

    // ── Step 3: Write, optionally through the compressor ─────────────────
    let output = args.output.unwrap_or_else(|| {
        let stem = match &class_name {
            Some(class) => format!("{} ({}) {}", args.name, args.student_id, class),
            None => format!("{} ({})", args.name, args.student_id),
        };
        PathBuf::from(format!("{}.pdf", input::sanitize_filename(&stem)))
    });

    let written = if args.compress {
        let preset = config.preset;
        if let Some(b) = &bar {
            b.set_prefix("Compressing");
            b.set_message(preset.to_string());
        }
        let compressor = compressor_for(&config, remote_client(&args.pipeline))
            .context("Failed to select compressor")?;
        compress_bytes(&config, compressor.as_ref(), preset, &merged, &output).await
    } else {
        tokio::fs::write(&output, &merged)
            .await
            .map(|_| merged.len() as u64)
            .with_context(|| format!("Failed to write {}", output.display()))
    };
    if let Some(b) = &bar {
        b.finish_and_clear();
    }
    let written = written?;

    if !quiet {
        eprintln!(
            "{} {} {}",
            green("✔"),
            bold(&output.display().to_string()),
            dim(&format!(
                "{sessions} sessions, {pages} pages, {}",
                human_bytes(written)
            )),
        );
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn build_config(args: &PipelineArgs, upload_to_drive: bool) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .max_upload_mb(args.max_upload_mb)
        .delivery(args.delivery)
        .backend(args.backend)
        .preset(args.preset)
        .gs_binary(&args.gs_bin)
        .upload_to_drive(upload_to_drive)
        .cover_defaults(CoverDefaults {
            class_name: args.class_name.clone(),
            course: args.course.clone(),
            lecturer: args.lecturer.clone(),
        });
    if let Some(root) = &args.workspace {
        builder = builder.workspace_root(root);
    }
    if let Some(spool) = &args.spool {
        builder = builder.spool_dir(spool);
    }
    builder.build().context("Invalid configuration")
}

fn remote_client(args: &PipelineArgs) -> Option<Arc<RemoteCompressor>> {
    args.ilovepdf_public_key
        .as_deref()
        .filter(|k| !k.is_empty())
        .map(|key| Arc::new(RemoteCompressor::new(RemoteConfig::new(key))))
}

fn worker_for(
    config: &PipelineConfig,
    queue: SpoolQueue,
    compressor: Arc<dyn Compressor>,
) -> Worker {
    Worker::new(
        queue,
        Workspace::new(config.workspace_root.clone()),
        compressor,
        config.preset,
    )
    .with_poll_interval(Duration::from_millis(config.queue_poll_ms))
}

/// Run `bytes` through the compressor inside a job directory and copy the
/// result to `output`. Returns the output size.
async fn compress_bytes(
    config: &PipelineConfig,
    compressor: &dyn Compressor,
    preset: Preset,
    bytes: &[u8],
    output: &Path,
) -> Result<u64> {
    let job = Workspace::new(config.workspace_root.clone()).allocate().await?;
    job.write_input(bytes).await?;
    let result = async {
        compressor
            .compress(job.input_path(), job.output_path(), preset)
            .await?;
        tokio::fs::copy(job.output_path(), output)
            .await
            .with_context(|| format!("Failed to write {}", output.display()))
    }
    .await;
    job.release().await;
    result
}

/// Resolves once the watch channel flips to `true` or its sender is gone.
async fn stopped(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            break;
        }
    }
}

fn spinner(quiet: bool, prefix: &'static str, message: &str) -> Option<ProgressBar> {
    if quiet {
        return None;
    }
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS),
    );
    bar.set_prefix(prefix);
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar.println(format!("{} {}", cyan("◆"), bold(&format!("{prefix} {message}"))));
    Some(bar)
}

/// Number of sessions in `from..=to`.
fn session_count(from: u32, to: u32) -> Result<usize> {
    if to < from {
        bail!("--to ({}) must not be before --from ({})", to, from);
    }
    to.checked_sub(from)
        .and_then(|n| n.checked_add(1))
        .and_then(|n| usize::try_from(n).ok())
        .with_context(|| format!("Session range {from}..={to} is too large"))
}

fn default_compressed_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    input.with_file_name(format!("{stem}-compressed.pdf"))
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} {}", UNITS[0])
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
