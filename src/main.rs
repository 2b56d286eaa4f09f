use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use loqa_live::{
    create_router, AppState, AudioBackendFactory, AudioOutput, AudioSource, Config,
    ConnectionStatus, GeminiLiveClient, SessionController, SessionHandle,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Loqa Live - realtime voice assistant client
#[derive(Parser, Debug)]
#[command(name = "loqa-live")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file (without extension is fine); LOQA_LIVE__* variables override it
    #[arg(short = 'c', long = "config", default_value = "config/loqa-live")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the HTTP control API
    Serve(AudioArgs),

    /// Hold one conversation in the terminal until Ctrl-C
    Talk(AudioArgs),
}

#[derive(Args, Debug, Clone)]
struct AudioArgs {
    /// Stream a WAV file instead of the microphone
    #[arg(long = "input-wav", value_name = "FILE")]
    input_wav: Option<PathBuf>,

    /// Record reply audio to a WAV file (implies --headless)
    #[arg(long = "output-wav", value_name = "FILE")]
    output_wav: Option<PathBuf>,

    /// Play replies on a software clock instead of the speaker
    #[arg(long)]
    headless: bool,
}

impl AudioArgs {
    fn devices(&self) -> AudioBackendFactory {
        let source = match &self.input_wav {
            Some(path) => AudioSource::File(path.clone()),
            None => AudioSource::Microphone,
        };

        let output = if self.headless || self.output_wav.is_some() {
            AudioOutput::Clocked {
                record_to: self.output_wav.clone(),
            }
        } else {
            AudioOutput::Speaker
        };

        AudioBackendFactory::new(source, output)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install default crypto provider"))?;

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;

    info!("Loqa Live v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);
    info!("Model: {} (voice {})", cfg.live.model, cfg.live.voice);

    let transport = GeminiLiveClient::from_config(&cfg.live).context("Failed to configure Live API client")?;

    match cli.command {
        Commands::Serve(audio) => {
            let session = SessionController::spawn(cfg.session_config(), Arc::new(audio.devices()), Arc::new(transport));
            serve(&cfg, session).await
        }
        Commands::Talk(audio) => {
            let session = SessionController::spawn(cfg.session_config(), Arc::new(audio.devices()), Arc::new(transport));
            talk(session).await
        }
    }
}

async fn serve(cfg: &Config, session: SessionHandle) -> Result<()> {
    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);

    let app = create_router(AppState::new(session.clone()));
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("HTTP server failed")?;

    session.shutdown().await?;
    Ok(())
}

async fn talk(session: SessionHandle) -> Result<()> {
    let mut updates = session.subscribe();

    if let Err(e) = session.start().await {
        let snapshot = session.snapshot().await?;
        error!("Failed to start: {}", e);
        println!("{}", snapshot.error.unwrap_or_else(|| e.to_string()));
        session.shutdown().await?;
        return Ok(());
    }

    println!("Listening. Press Ctrl-C to stop.");

    let mut printed = 0;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }

                let snapshot = updates.borrow_and_update().clone();

                for message in snapshot.messages.iter().skip(printed) {
                    println!("\r{:?}: {}", message.sender, message.text);
                }
                printed = snapshot.messages.len();

                if !snapshot.user_partial.is_empty() || !snapshot.assistant_partial.is_empty() {
                    print!("\r> {} | {}", snapshot.user_partial, snapshot.assistant_partial);
                    std::io::stdout().flush().ok();
                }

                if snapshot.status == ConnectionStatus::Disconnected {
                    if let Some(error) = snapshot.error {
                        println!("\n{}", error);
                    }
                    break;
                }
            }
        }
    }

    let stats = session.stop().await?;
    println!(
        "\nSession ended after {:.1}s: {} frames sent, {} gated, {} turns, {} interruptions",
        stats.duration_secs, stats.frames_sent, stats.frames_gated, stats.turns_completed, stats.interruptions
    );
    if let Some(latency) = session.snapshot().await?.latency_secs {
        println!("Last reply latency: {:.2}s", latency);
    }

    session.shutdown().await?;
    Ok(())
}
