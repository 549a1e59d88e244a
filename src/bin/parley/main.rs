use std::path::PathBuf;

use clap::{CommandFactory, Parser};
use clap_complete::{Shell, generate};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use parley::audio::decode::decode;
use parley::config::{Config, OPENAI_API_KEY_ENV, SpeakerMode};
use parley::error::ParleyError;
use parley::output::Sink;
use parley::pipeline::Pipeline;
use parley::stt;

#[derive(Parser)]
#[command(
    name = "parley",
    about = "Transcribe a recorded conversation with alternating speaker labels",
    long_about = "Parley splits a recording into utterances, transcribes each one with the \
        configured speech-to-text backend, and labels the result as a two-person \
        conversation. Speaker changes are inferred from pauses (for backends that \
        return their own timestamps) or by alternating on every utterance; no voice \
        prints are involved."
)]
struct Cli {
    /// Audio file to transcribe (WAV, or anything ffmpeg can read)
    #[arg(required_unless_present = "completions")]
    input: Option<PathBuf>,

    /// Save the transcript to this file instead of printing it
    ///
    /// A `.txt` extension is appended when the path does not already have one.
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// API key for the OpenAI backend
    #[arg(long, env = OPENAI_API_KEY_ENV, hide_env_values = true)]
    api_key: Option<String>,

    /// Speech-to-text backend (openai, command, whisper, vosk)
    #[arg(long)]
    backend: Option<String>,

    /// How speaker changes are inferred
    #[arg(long, value_enum)]
    mode: Option<SpeakerMode>,

    /// Path to config file
    ///
    /// Defaults to ~/.config/parley/config.yaml when that file exists.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, short)]
    verbose: bool,

    /// Print a completion script for the given shell and exit
    #[arg(long, value_name = "SHELL", exclusive = true)]
    completions: Option<Shell>,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("parley=debug,info")
    } else {
        EnvFilter::new("parley=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn load_config(cli: &Cli) -> Result<Config, ParleyError> {
    let mut config = Config::load_or_default(cli.config.as_deref())?;

    if let Some(backend) = &cli.backend {
        config.stt.backend.clone_from(backend);
    }
    if let Some(key) = &cli.api_key {
        config.stt.openai_api_key = Some(key.clone());
    }
    if let Some(mode) = cli.mode {
        config.speaker.mode = mode;
    }

    config.validate()?;
    Ok(config)
}

fn run(cli: Cli) -> Result<(), ParleyError> {
    if let Some(shell) = cli.completions {
        generate(shell, &mut Cli::command(), "parley", &mut std::io::stdout());
        return Ok(());
    }

    let input = cli
        .input
        .clone()
        .ok_or_else(|| ParleyError::Config("an input audio file is required".to_string()))?;

    let config = load_config(&cli)?;
    let sink = Sink::from_output(cli.output.as_deref(), &config.output.extension);

    let rt = tokio::runtime::Runtime::new()?;
    let _guard = rt.enter();

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    rt.spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("received Ctrl+C, stopping after the current unit...");
            ctrl_c.cancel();
        }
    });

    let backend = stt::create_backend(&config.stt)?;
    tracing::info!("STT backend '{}' initialized", backend.name());

    tracing::info!("processing {}", input.display());
    let audio = decode(&input)?;

    let mut pipeline = Pipeline::new(&config, backend, cancel);
    let transcript = pipeline.run(&audio);

    sink.write(&transcript)
}
