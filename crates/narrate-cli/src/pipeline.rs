//! Stage-by-stage controller for `narrate run`.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, info_span, Instrument};

use narrate_client::{
    ErrorKind, PipelineClient, PipelineError, StageRequest, StageSequencer, StartOutcome,
};
use narrate_models::{JobState, PipelineJob, Stage};

use crate::progress::TerminalSink;

/// Inputs of one pipeline run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub video: PathBuf,
    pub mime: Option<String>,
    pub script_file: PathBuf,
    pub edit: bool,
    pub preview_dir: Option<PathBuf>,
    pub title: Option<String>,
    pub description: String,
    pub assume_yes: bool,
}

/// Drives the sequencer through the stages in order.
pub struct Controller {
    client: PipelineClient,
    sequencer: StageSequencer<PipelineClient>,
}

impl Controller {
    pub fn new(client: PipelineClient) -> Self {
        let idle_timeout = client.config().idle_timeout;
        Self {
            sequencer: StageSequencer::new(client.clone(), idle_timeout),
            client,
        }
    }

    /// Run every stage. Returns false when a stage failed.
    pub async fn run(&self, options: &RunOptions) -> Result<bool> {
        let upload = match &options.mime {
            Some(mime) => StageRequest::Upload {
                path: options.video.clone(),
                mime: mime.clone(),
            },
            None => StageRequest::upload(&options.video),
        };
        if !self.stage(upload).await? {
            return Ok(false);
        }

        let run = self.sequencer.current();
        let video = run
            .uploaded_video()
            .context("Upload finished without a video reference")?;
        println!("Uploaded: {}", self.client.resolve(&video.video_url)?);

        let analyze = StageRequest::Analyze {
            unique_filename: video.unique_filename.clone(),
        };
        if !self.stage(analyze).await? {
            return Ok(false);
        }

        if !self.synthesize(options).await? {
            return Ok(false);
        }
        if let Some(audio_url) = self.sequencer.current().audio_url() {
            println!("Narration audio: {}", self.client.resolve(audio_url)?);
        }

        if !self.stage(StageRequest::Merge).await? {
            return Ok(false);
        }
        let merged = self
            .sequencer
            .current()
            .merged_video_url()
            .map(str::to_string)
            .context("Merge finished without a video URL")?;
        println!("Merged video: {}", self.client.resolve(&merged)?);

        if let Some(dir) = &options.preview_dir {
            let dest = self.preview(&merged, dir).await?;
            println!("Preview saved to {}", dest.display());
        }

        let Some(title) = options.title.as_deref() else {
            println!("No title given; skipping publish.");
            return Ok(true);
        };
        if !options.assume_yes && !confirm(&format!("Publish \"{}\"?", title.trim())).await? {
            println!("Publish cancelled.");
            return Ok(true);
        }

        let publish = StageRequest::Publish {
            title: title.to_string(),
            description: options.description.clone(),
        };
        self.stage(publish).await
    }

    /// Write the script for editing, read it back and synthesize.
    ///
    /// In edit mode a script that fails to parse is handed back to the user
    /// instead of ending the run.
    async fn synthesize(&self, options: &RunOptions) -> Result<bool> {
        let script = self
            .sequencer
            .current()
            .script()
            .cloned()
            .context("Analysis finished without a script")?;
        tokio::fs::write(&options.script_file, script.to_text() + "\n")
            .await
            .with_context(|| format!("Failed to write {}", options.script_file.display()))?;
        println!(
            "Script ({} entries) written to {}",
            script.len(),
            options.script_file.display()
        );

        loop {
            if options.edit {
                prompt(&format!(
                    "Edit {} and press Enter to generate speech",
                    options.script_file.display()
                ))
                .await?;
            }

            let script_text = tokio::fs::read_to_string(&options.script_file)
                .await
                .with_context(|| format!("Failed to read {}", options.script_file.display()))?;

            match self.start(StageRequest::Synthesize { script_text }).await {
                Ok(job) => return Ok(report(&job)),
                Err(e) if options.edit && e.kind() == ErrorKind::Validation => {
                    eprintln!("{}", e);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Start one stage; prints its error and returns false on failure.
    async fn stage(&self, request: StageRequest) -> Result<bool> {
        let stage = request.stage();
        let job = self
            .start(request)
            .await
            .with_context(|| format!("Could not start {}", stage))?;
        Ok(report(&job))
    }

    async fn start(&self, request: StageRequest) -> Result<PipelineJob, PipelineError> {
        let stage = request.stage();
        let span = info_span!("run", run_id = %self.sequencer.current().id);
        let mut sink = TerminalSink::new(stage.as_str());

        let outcome = self
            .sequencer
            .start(request, &mut sink)
            .instrument(span)
            .await?;

        match outcome {
            StartOutcome::Finished(job) => Ok(job),
            StartOutcome::AlreadyRunning | StartOutcome::Superseded => {
                Ok(self.sequencer.job(stage))
            }
        }
    }

    async fn preview(&self, merged_url: &str, dir: &Path) -> Result<PathBuf> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        let file_name = merged_url
            .rsplit('/')
            .find(|segment| !segment.is_empty())
            .unwrap_or("preview.mp4");
        let dest = dir.join(file_name);

        let mut sink = TerminalSink::new("preview");
        let bytes = self
            .client
            .download(merged_url, &dest, &mut sink)
            .await
            .context("Preview download failed")?;
        info!("Preview downloaded ({} bytes)", bytes);
        Ok(dest)
    }
}

fn report(job: &PipelineJob) -> bool {
    match job.state {
        JobState::Succeeded => {
            println!("{}: {}", label(job.stage), job.status_message);
            true
        }
        JobState::Failed => {
            eprintln!(
                "{} failed: {}",
                label(job.stage),
                job.error_message.as_deref().unwrap_or("unknown error")
            );
            false
        }
        JobState::Idle | JobState::Running => false,
    }
}

fn label(stage: Stage) -> &'static str {
    match stage {
        Stage::Upload => "Upload",
        Stage::Analyze => "Analysis",
        Stage::Synthesize => "Speech",
        Stage::Merge => "Merge",
        Stage::Publish => "Publish",
    }
}

async fn read_line() -> Result<String> {
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .context("Failed to read from stdin")?;
    Ok(line)
}

async fn prompt(message: &str) -> Result<()> {
    println!("{}", message);
    read_line().await?;
    Ok(())
}

async fn confirm(question: &str) -> Result<bool> {
    println!("{} [y/N]", question);
    let answer = read_line().await?;
    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}

/// Reject option combinations that cannot work before anything is sent.
pub fn check_options(options: &RunOptions) -> Result<()> {
    if options.script_file.is_dir() {
        bail!(
            "--script-file {} is a directory",
            options.script_file.display()
        );
    }
    if let Some(title) = &options.title {
        if title.trim().is_empty() {
            bail!("--title cannot be blank");
        }
    }
    Ok(())
}
