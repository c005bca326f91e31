use anyhow::Context;
use clap::{Parser, Subcommand};
use log::info;
use overlaycore::detection::{MediaKind, Recognition};
use service::Recognized;
use std::fs;
use std::path::{Path, PathBuf};
use tokio::runtime::Builder as TokioBuilder;
use workflow::config::{AnnotatorConfig, DEFAULT_SERVICE_URL, DEFAULT_TIMEOUT_SECS};
use workflow::runner::{describe_boxes, describe_video, load_saved_result, FrameSelector, Runner};

mod service;
mod workflow;

#[derive(Parser)]
#[command(author, version, about = "Detection overlay driver for the recognition service")]
struct Args {
    /// Load the annotator config from YAML instead of flags
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = DEFAULT_SERVICE_URL)]
    service_url: String,
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS)]
    timeout_secs: u64,
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,
    /// TrueType/OpenType font used for box labels
    #[arg(long)]
    font: Option<PathBuf>,
    /// Keep label chips inside the canvas for boxes touching the top edge
    #[arg(long, default_value_t = false)]
    clamp_chips: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize objects in an image and write the annotated copy
    Image {
        file: PathBuf,
        #[arg(long)]
        prompt: String,
        /// Write the raw result document to this path
        #[arg(long)]
        save_result: Option<PathBuf>,
    },
    /// Recognize objects in a video's sampled frames
    Video {
        file: PathBuf,
        #[arg(long)]
        prompt: String,
        /// Directory of extracted frames to annotate
        #[arg(long)]
        frames: Option<PathBuf>,
        #[arg(long)]
        save_result: Option<PathBuf>,
    },
    /// Render a saved result over local media without the service
    Render {
        #[arg(long)]
        result: PathBuf,
        /// Image file, or a directory of extracted frames
        #[arg(long)]
        media: PathBuf,
        #[arg(long, conflicts_with = "time")]
        frame: Option<usize>,
        /// Playback time in seconds
        #[arg(long)]
        time: Option<f64>,
    },
    /// Browse or prune stored recognition runs
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
}

#[derive(Subcommand)]
enum HistoryAction {
    List,
    Show { id: i64 },
    Delete { id: i64 },
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = if let Some(path) = &args.config {
        AnnotatorConfig::load(path)?
    } else {
        AnnotatorConfig::from_args(
            args.service_url.clone(),
            args.timeout_secs,
            args.output_dir.clone(),
            args.font.clone(),
            args.clamp_chips,
        )
    };
    let runner = Runner::new(config)?;

    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for service requests")?;
    runtime.block_on(dispatch(&runner, args.command))?;

    let snapshot = runner.metrics().snapshot();
    info!(
        "frames_rendered={} boxes_drawn={} failures={}",
        snapshot.frames_rendered, snapshot.boxes_drawn, snapshot.failures
    );
    Ok(())
}

async fn dispatch(runner: &Runner, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Image {
            file,
            prompt,
            save_result,
        } => {
            let recognized = recognize(runner, MediaKind::Image, &file, &prompt).await?;
            save_raw(&recognized, save_result.as_deref())?;
            if let Recognition::Image(image) = &recognized.recognition {
                println!("Detected {} objects in {}", image.boxes.len(), file.display());
                for line in describe_boxes(&image.boxes) {
                    println!("{}", line);
                }
                if let Some(log) = &image.error_log {
                    println!("Service log: {}", log);
                }
                if let Some(stored) = &image.output_path {
                    info!("service rendering at {}", runner.client().output_url(stored));
                }
                let target = runner.render_image(&file, image)?;
                println!("Annotated image -> {}", target.display());
            }
        }
        Command::Video {
            file,
            prompt,
            frames,
            save_result,
        } => {
            let recognized = recognize(runner, MediaKind::Video, &file, &prompt).await?;
            save_raw(&recognized, save_result.as_deref())?;
            if let Recognition::Video(video) = &recognized.recognition {
                for line in describe_video(video) {
                    println!("{}", line);
                }
                if let Some(dir) = frames {
                    let written = runner.render_video(&dir, video)?;
                    println!(
                        "Annotated {} frames -> {}",
                        written.len(),
                        runner.config().output_dir.display()
                    );
                }
            }
        }
        Command::Render {
            result,
            media,
            frame,
            time,
        } => {
            let recognition = load_saved_result(&result)?;
            let selector = match (frame, time) {
                (Some(index), _) => Some(FrameSelector::Index(index)),
                (None, Some(secs)) => Some(FrameSelector::Time(secs)),
                (None, None) => None,
            };
            let target = runner.render_offline(&recognition, &media, selector)?;
            println!("Rendered {} -> {}", result.display(), target.display());
        }
        Command::History { action } => history(runner, action).await?,
    }
    Ok(())
}

async fn recognize(
    runner: &Runner,
    kind: MediaKind,
    file: &Path,
    prompt: &str,
) -> anyhow::Result<Recognized> {
    info!("uploading {} for {} recognition", file.display(), kind.as_str());
    match runner.client().recognize(kind, file, prompt).await {
        Ok(recognized) => Ok(recognized),
        Err(err) => {
            runner.metrics().record_failure();
            Err(err)
        }
    }
}

fn save_raw(recognized: &Recognized, target: Option<&Path>) -> anyhow::Result<()> {
    if let Some(path) = target {
        let body = serde_json::to_string_pretty(&recognized.raw)
            .context("serializing recognition result")?;
        fs::write(path, body).with_context(|| format!("writing {}", path.display()))?;
        println!("Saved result -> {}", path.display());
    }
    Ok(())
}

async fn history(runner: &Runner, action: HistoryAction) -> anyhow::Result<()> {
    let client = runner.client();
    match action {
        HistoryAction::List => {
            let entries = client.history().await?;
            if entries.is_empty() {
                println!("No history records");
            }
            for entry in entries {
                println!(
                    "#{} [{}] {} | {} | {} | {}",
                    entry.id,
                    entry.kind.as_str(),
                    entry.timestamp,
                    entry.upload_file_name(),
                    entry.prompt,
                    entry.summary()
                );
            }
        }
        HistoryAction::Show { id } => {
            let entry = client.history_item(id).await?;
            println!("#{} [{}] {}", entry.id, entry.kind.as_str(), entry.timestamp);
            println!("prompt: {}", entry.prompt);
            println!("upload: {}", client.upload_url(&entry.file_path));
            match entry.recognition()? {
                Recognition::Image(image) => {
                    if let Some(stored) = &image.output_path {
                        println!("output: {}", client.output_url(stored));
                    }
                    for line in describe_boxes(&image.boxes) {
                        println!("{}", line);
                    }
                }
                Recognition::Video(video) => {
                    for line in describe_video(&video) {
                        println!("{}", line);
                    }
                }
            }
        }
        HistoryAction::Delete { id } => {
            client.delete_history(id).await?;
            println!("Deleted history record {}", id);
        }
    }
    Ok(())
}
