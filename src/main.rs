use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use interview_live::audio::AudioSource;
use interview_live::{
    create_router, render_transcript, AppState, Config, InterviewContext, TranscriptWriter,
};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "interview-live")]
#[command(about = "Real-time voice interview sessions")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/interview-live")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one interview in the terminal; Ctrl-C ends it
    Run {
        /// Resume text file
        #[arg(long)]
        resume: PathBuf,

        /// Job description text file
        #[arg(long)]
        job: PathBuf,

        /// Prebuilt voice override
        #[arg(long)]
        voice: Option<String>,

        /// Stream a WAV file instead of the microphone
        #[arg(long)]
        input_wav: Option<String>,
    },
    /// Serve the HTTP control API
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Interview Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match args.command {
        Command::Run {
            resume,
            job,
            voice,
            input_wav,
        } => run_interview(cfg, resume, job, voice, input_wav).await,
        Command::Serve => serve(cfg).await,
    }
}

async fn run_interview(
    cfg: Config,
    resume: PathBuf,
    job: PathBuf,
    voice: Option<String>,
    input_wav: Option<String>,
) -> Result<()> {
    let context = InterviewContext {
        resume: std::fs::read_to_string(&resume)
            .with_context(|| format!("Failed to read resume {:?}", resume))?,
        job_description: std::fs::read_to_string(&job)
            .with_context(|| format!("Failed to read job description {:?}", job))?,
    };

    let source = match input_wav {
        Some(path) => AudioSource::File(path),
        None => AudioSource::Microphone,
    };

    let writer = TranscriptWriter::new(cfg.transcripts_dir())?;
    let (session, handle) = cfg
        .open_session(cfg.session(context, voice), source)
        .await?;

    info!("Interview {} starting. Press Ctrl-C to end.", handle.session_id());

    let ender = handle.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ending interview");
            ender.end();
        }
    });

    let outcome = match session.run().await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Interview could not start: {}", e);
            return Err(e.into());
        }
    };

    if let Some(notice) = outcome.end_reason.notice() {
        warn!("{}", notice);
    }

    let saved = writer.write(&outcome)?;
    info!("Transcript saved to {}", saved.text_path.display());

    println!("{}", render_transcript(&outcome.transcript));

    Ok(())
}

async fn serve(cfg: Config) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let writer = TranscriptWriter::new(cfg.transcripts_dir())?;
    let app = create_router(AppState::new(cfg, writer));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("HTTP server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
