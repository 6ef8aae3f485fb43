//! speakd CLI: synthesize text to a file, verify an engine, or query the generation API.
//!
//!   speakd-cli [--config engine.toml] [--language hi] [--output out.mp3|-] TEXT...
//!   speakd-cli verify [--config engine.toml]
//!   speakd-cli ask PROMPT...

use anyhow::Result;
use speakd_core::{
    verify_engine, EngineConfig, GenerationClient, GenerationConfig, RawSpeakRequest,
    SynthesisOutcome, Synthesizer,
};
use std::env;
use std::io::{self, Write};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

const DEFAULT_OUTPUT: &str = "speech.mp3";

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn,speakd_cli=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(|s| s.as_str()) {
        Some("verify") => run_verify(&args[2..]).await,
        Some("ask") => run_ask(&args[2..]).await,
        _ => run_speak(&args[1..]).await,
    }
}

#[derive(Debug, Default)]
struct SpeakArgs {
    config: Option<PathBuf>,
    language: Option<String>,
    output: Option<String>,
    text: Vec<String>,
}

fn parse_args(args: &[String]) -> SpeakArgs {
    let mut parsed = SpeakArgs::default();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    parsed.config = Some(PathBuf::from(&args[i]));
                }
            }
            "--language" | "-l" => {
                i += 1;
                if i < args.len() {
                    parsed.language = Some(args[i].clone());
                }
            }
            "--output" | "-o" => {
                i += 1;
                if i < args.len() {
                    parsed.output = Some(args[i].clone());
                }
            }
            other => parsed.text.push(other.to_string()),
        }
        i += 1;
    }
    parsed
}

fn load_engine(config: Option<&PathBuf>) -> Result<EngineConfig> {
    match config {
        Some(path) => EngineConfig::load_path(path),
        None => Ok(EngineConfig::default()),
    }
}

async fn run_speak(args: &[String]) -> Result<()> {
    let args = parse_args(args);
    let synth = Synthesizer::new(load_engine(args.config.as_ref())?);
    let raw = RawSpeakRequest::new(args.text.join(" "), args.language.as_deref());

    let audio = match synth.speak(&raw).await? {
        SynthesisOutcome::Success { audio } => audio,
        SynthesisOutcome::Failure { kind, diagnostics } => {
            anyhow::bail!("{} ({}): {}", kind.message(), kind, diagnostics)
        }
    };

    match args.output.as_deref().unwrap_or(DEFAULT_OUTPUT) {
        "-" => {
            io::stdout().write_all(&audio)?;
            io::stdout().flush()?;
        }
        path => {
            let out_path = PathBuf::from(path);
            if let Some(p) = out_path.parent() {
                std::fs::create_dir_all(p)?;
            }
            std::fs::write(&out_path, &audio)?;
            info!(bytes = audio.len(), path = %out_path.display(), "wrote audio");
        }
    }
    Ok(())
}

async fn run_verify(args: &[String]) -> Result<()> {
    let args = parse_args(args);
    let engine = load_engine(args.config.as_ref())?;
    match verify_engine(&engine).await {
        SynthesisOutcome::Success { audio } => {
            info!(
                program = %engine.program.display(),
                bytes = audio.len(),
                "engine verification passed"
            );
            Ok(())
        }
        SynthesisOutcome::Failure { kind, diagnostics } => {
            anyhow::bail!(
                "Engine verification failed {}: {}: {}",
                engine.program.display(),
                kind,
                diagnostics
            )
        }
    }
}

async fn run_ask(args: &[String]) -> Result<()> {
    let prompt = args.join(" ");
    if prompt.trim().is_empty() {
        anyhow::bail!("ask needs a prompt");
    }
    let client = GenerationClient::new(&GenerationConfig::from_env())?;
    let text = client.generate(&prompt).await?;
    println!("{}", text);
    Ok(())
}
