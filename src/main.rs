use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use talk_upload::config::Config;
use talk_upload::core::{
    ChannelSink, JobRequest, JobResult, JobScheduler, ProgressEvent, SubmitOutcome, UploadJob,
    UploadScheduler,
};
use talk_upload::remote::NextcloudClient;

#[derive(Parser)]
#[command(name = "talk-upload")]
#[command(about = "Upload a file and share it into a conversation")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    /// Local file, as a path or file:// URI
    file: String,

    /// Conversation token to share into
    #[arg(long)]
    conversation: String,

    /// Display name used in progress output
    #[arg(long)]
    conversation_name: Option<String>,

    /// Opaque metadata forwarded with the share, e.g. a JSON caption
    #[arg(long)]
    metadata: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    let store = Arc::new(NextcloudClient::new(&config.server)?);
    let (sink, mut events) = ChannelSink::new();

    let conversation_name = args
        .conversation_name
        .clone()
        .unwrap_or_else(|| args.conversation.clone());
    let mut request = JobRequest::new(&args.file, &args.conversation, &conversation_name);
    if let Some(metadata) = &args.metadata {
        request = request.with_metadata(metadata.clone());
    }
    let job = UploadJob::new(request, store, Arc::new(sink)).with_settings(config.upload.clone());

    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                ProgressEvent::Started { file_name, conversation_name, .. } => {
                    println!("Uploading {} to {}", file_name, conversation_name);
                }
                ProgressEvent::Progress { percentage, .. } => println!("{}%", percentage),
                ProgressEvent::Succeeded { .. } => println!("Done"),
                ProgressEvent::Failed { file_name, .. } => eprintln!("Failed to upload {}", file_name),
                ProgressEvent::Cancelled { .. } => println!("Cancelled"),
            }
        }
    });

    let scheduler = UploadScheduler::new(config.upload.max_concurrent);
    let id = match scheduler.submit(job).await? {
        SubmitOutcome::Accepted(id) => id,
        SubmitOutcome::Dropped { existing } => {
            anyhow::bail!("{} is already being uploaded as {}", args.file, existing)
        }
    };

    let result = tokio::select! {
        result = scheduler.wait(id) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping upload");
            scheduler.cancel(id).await?;
            scheduler.wait(id).await?
        }
    };

    scheduler.shutdown().await?;
    if let Err(err) = printer.await {
        warn!("Progress printer stopped: {}", err);
    }

    match result {
        Some(JobResult::Succeeded) => Ok(()),
        Some(JobResult::Cancelled) => std::process::exit(130),
        Some(JobResult::Failed) | None => std::process::exit(1),
    }
}
