//! Narration pipeline command-line controller.

mod pipeline;
mod progress;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use narrate_client::{ClientConfig, PipelineClient};
use narrate_models::ServiceSettings;

use crate::pipeline::{check_options, Controller, RunOptions};

#[derive(Parser)]
#[command(name = "narrate", about = "Narrate a video through the pipeline server")]
struct Cli {
    /// Pipeline server URL (overrides NARRATE_SERVER_URL)
    #[arg(long, global = true)]
    server: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Upload, analyze, voice, merge and publish one video
    Run(RunArgs),
    /// Save service credentials on the server
    Settings(SettingsArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Video file to narrate
    #[arg(long)]
    video: PathBuf,

    /// MIME type of the video (guessed from the extension by default)
    #[arg(long)]
    mime: Option<String>,

    /// Where the generated script is written for editing
    #[arg(long, default_value = "script.txt")]
    script_file: PathBuf,

    /// Wait for the script to be edited before generating speech
    #[arg(long)]
    edit: bool,

    /// Download the merged video here before publishing
    #[arg(long)]
    preview_dir: Option<PathBuf>,

    /// Video title; publishing is skipped without one
    #[arg(long)]
    title: Option<String>,

    /// Video description
    #[arg(long, default_value = "")]
    description: String,

    /// Publish without asking for confirmation
    #[arg(short, long)]
    yes: bool,
}

#[derive(Args)]
struct SettingsArgs {
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    gemini_api_key: Option<String>,

    #[arg(long, env = "YOUTUBE_API_KEY", hide_env_values = true)]
    youtube_api_key: Option<String>,

    #[arg(long, env = "YOUTUBE_CLIENT_ID", hide_env_values = true)]
    youtube_client_id: Option<String>,

    #[arg(long, env = "YOUTUBE_CLIENT_SECRET", hide_env_values = true)]
    youtube_client_secret: Option<String>,
}

impl From<RunArgs> for RunOptions {
    fn from(args: RunArgs) -> Self {
        Self {
            video: args.video,
            mime: args.mime,
            script_file: args.script_file,
            edit: args.edit,
            preview_dir: args.preview_dir,
            title: args.title,
            description: args.description,
            assume_yes: args.yes,
        }
    }
}

impl From<SettingsArgs> for ServiceSettings {
    fn from(args: SettingsArgs) -> Self {
        Self {
            gemini_api_key: args.gemini_api_key,
            youtube_api_key: args.youtube_api_key,
            youtube_client_id: args.youtube_client_id,
            youtube_client_secret: args.youtube_client_secret,
        }
    }
}

fn init_tracing() -> Result<()> {
    // Colored output for dev, JSON for log collection
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env().add_directive("narrate=info".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_ansi(true)
                    .with_target(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}

async fn execute(cli: Cli) -> Result<ExitCode> {
    let mut config = ClientConfig::from_env();
    if let Some(server) = cli.server {
        config = config.with_base_url(server);
    }
    info!("Using pipeline server {}", config.base_url);
    let client = PipelineClient::new(config)?;

    match cli.command {
        Command::Run(args) => {
            let options = RunOptions::from(args);
            check_options(&options)?;
            let controller = Controller::new(client);

            // Dropping the run on Ctrl-C releases the in-flight stage
            tokio::select! {
                result = controller.run(&options) => {
                    Ok(if result? { ExitCode::SUCCESS } else { ExitCode::FAILURE })
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Interrupted; in-flight stage abandoned");
                    Ok(ExitCode::from(130))
                }
            }
        }
        Command::Settings(args) => {
            let settings = ServiceSettings::from(args);
            if settings.is_empty() {
                bail!("Nothing to save: pass at least one credential");
            }
            let message = client.save_settings(&settings).await?;
            println!("{}", message);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    if let Err(e) = init_tracing() {
        eprintln!("Failed to initialize logging: {:#}", e);
        return ExitCode::FAILURE;
    }

    match execute(Cli::parse()).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
