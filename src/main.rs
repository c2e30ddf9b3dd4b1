use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn, Level};

use chromatic_gif::{
    color::Color,
    config::Config,
    effects::{CpuRenderContext, EditMode, EditSettings, LocalFrameProcessor, ModeSet, RecolorRule, RemovalSpec},
    frames::{GifDecoder, GifEncoder},
    pipeline::{new_store, FrameJobScheduler, ProjectBatchScheduler, ProjectState, ProjectStatus},
    remote::{GeminiEditService, RemoteEditClient, RetryPolicy},
};

#[derive(Parser)]
#[command(
    name = "chromatic-gif",
    version,
    about = "Recolor objects and remove backgrounds in animated GIFs",
    long_about = "Chromatic-GIF edits every frame of one or more animated GIFs, either through a remote AI image edit service or with deterministic local pixel transforms, and writes the results as new GIFs."
)]
struct Cli {
    /// Input GIF files, processed in order
    #[arg(short, long = "input", required = true)]
    inputs: Vec<PathBuf>,

    /// Directory for the edited GIFs
    #[arg(short, long, default_value = ".")]
    output: PathBuf,

    /// Recolor rule SOURCE:TARGET[:description], e.g. FF0000:0000FF:the car
    #[arg(long)]
    recolor: Vec<RecolorRule>,

    /// Remove the background
    #[arg(long)]
    remove_bg: bool,

    /// Background key color
    #[arg(long, default_value = "00FF00")]
    key: Color,

    /// Fill the removed background with this color instead of transparency
    #[arg(long)]
    replace: Option<Color>,

    /// Key color tolerance (RGB distance)
    #[arg(long)]
    tolerance: Option<f32>,

    /// Extra instruction for the remote edit service
    #[arg(long)]
    prompt: Option<String>,

    /// Use the remote edit service
    #[arg(long)]
    remote: bool,

    /// Configuration file (optional)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn settings(&self, config: &Config) -> EditSettings {
        let mut modes = ModeSet::new();
        if !self.recolor.is_empty() {
            modes.insert(EditMode::Recolor);
        }
        if self.remove_bg {
            modes.insert(EditMode::RemoveBackground);
        }

        let removal = match self.replace {
            Some(fill) => RemovalSpec::solid(self.key, fill),
            None => RemovalSpec::transparent(self.key),
        }
        .with_tolerance(self.tolerance.unwrap_or(config.processing.default_tolerance));

        EditSettings {
            modes,
            rules: self.recolor.clone(),
            removal,
            prompt: self.prompt.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .init();

    info!("Starting Chromatic-GIF v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config = match &cli.config {
        Some(config_path) => {
            info!("Loading configuration from {:?}", config_path);
            Config::from_file(config_path)?
        }
        None => {
            info!("Using default configuration");
            Config::default()
        }
    };
    config.validate()?;

    let settings = cli.settings(&config);
    settings.validate().map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let use_remote = cli.remote || config.remote.enabled;
    let scheduler = build_scheduler(&config, use_remote);

    // Decode every input into a project
    let decoder = GifDecoder::new(config.decoding.clone());
    let mut projects = Vec::with_capacity(cli.inputs.len());
    let mut names = HashSet::new();
    for input in &cli.inputs {
        let frames = decoder
            .decode_file(input)
            .await
            .with_context(|| format!("Failed to decode {:?}", input))?;
        let name = unique_name(project_name(input), &mut names);
        info!("Loaded {} frames from {:?} as '{}'", frames.len(), input, name);
        projects.push(ProjectState::new(name, frames, settings.clone()).with_remote(use_remote));
    }

    let store = new_store(projects);
    let batch = Arc::new(ProjectBatchScheduler::new(Arc::new(scheduler)));

    {
        let batch = batch.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, stopping after the current frames");
                batch.stop();
            }
        });
    }

    let summary = batch.run_all(&store).await?;

    tokio::fs::create_dir_all(&cli.output)
        .await
        .with_context(|| format!("Failed to create output directory {:?}", cli.output))?;

    let outputs: Vec<(String, Vec<u8>)> = store
        .read()
        .iter()
        .filter(|p| p.status() == ProjectStatus::Completed)
        .filter_map(|p| p.result().map(|r| (p.name.clone(), r.bytes.clone())))
        .collect();

    for (name, bytes) in outputs {
        let path = cli.output.join(format!("{}_edited.gif", name));
        tokio::fs::write(&path, &bytes)
            .await
            .with_context(|| format!("Failed to write {:?}", path))?;
        info!("Saved {:?} ({} bytes)", path, bytes.len());
    }

    for project in store.read().iter().filter(|p| p.status() == ProjectStatus::Error) {
        warn!("{}: {}", project.name, project.error().unwrap_or("unknown error"));
    }

    info!(
        "Done: {} completed, {} failed{}",
        summary.completed,
        summary.failed,
        if summary.stopped { ", stopped early" } else { "" }
    );

    if summary.failed > 0 {
        anyhow::bail!("{} project(s) failed", summary.failed);
    }
    Ok(())
}

fn build_scheduler(config: &Config, use_remote: bool) -> FrameJobScheduler {
    let local = LocalFrameProcessor::from_config(&config.processing, Arc::new(CpuRenderContext));
    let encoder = GifEncoder::new(config.encoding.clone());
    let scheduler = FrameJobScheduler::new(config.processing.clone(), Arc::new(local), Arc::new(encoder));

    if !use_remote {
        return scheduler;
    }

    match GeminiEditService::from_env(&config.remote) {
        Ok(service) => {
            info!("Remote editing enabled ({})", config.remote.model);
            let client = RemoteEditClient::new(Arc::new(service), RetryPolicy::from_config(&config.remote));
            scheduler.with_remote(Arc::new(client))
        }
        Err(e) => {
            warn!("Remote editing unavailable, using local processing: {}", e);
            scheduler
        }
    }
}

fn project_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "animation".to_string())
}

/// Inputs sharing a file stem get `_2`, `_3`, ... so their outputs do not overwrite each other
fn unique_name(base: String, taken: &mut HashSet<String>) -> String {
    let mut name = base.clone();
    let mut n = 2;
    while taken.contains(&name) {
        name = format!("{}_{}", base, n);
        n += 1;
    }
    taken.insert(name.clone());
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_stem_in_different_directories_gets_distinct_names() {
        let mut taken = HashSet::new();
        let names: Vec<String> = ["a/car.gif", "b/car.gif", "car.gif", "truck.gif"]
            .iter()
            .map(|p| unique_name(project_name(Path::new(p)), &mut taken))
            .collect();
        assert_eq!(names, vec!["car", "car_2", "car_3", "truck"]);
    }

    #[test]
    fn test_suffix_skips_names_already_taken() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("car_2".to_string(), &mut taken), "car_2");
        assert_eq!(unique_name("car".to_string(), &mut taken), "car");
        assert_eq!(unique_name("car".to_string(), &mut taken), "car_3");
    }
}
