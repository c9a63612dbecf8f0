use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing_subscriber::EnvFilter;

use chorus_gateway::chat::{Conversation, generate_reply};
use chorus_gateway::providers::{ElevenLabsClient, OpenAiClient};
use chorus_gateway::{ApiServerBuilder, Config, OutputFormat, TtsRequest, stream_tts, trim_for_tts};

/// Chorus - Voice and chat gateway for AI assistants
#[derive(Parser)]
#[command(name = "chorus", version, about)]
struct Cli {
    /// Address to bind
    #[arg(long, env = "CHORUS_HOST")]
    host: Option<String>,

    /// Port to listen on
    #[arg(long, env = "CHORUS_PORT")]
    port: Option<u16>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gateway (default)
    Serve,
    /// Stream TTS for some text and write the audio to a file
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
        /// Output file
        #[arg(short, long, default_value = "chorus-tts-test.mp3")]
        output: PathBuf,
        /// Output format (e.g. `mp3_44100_128`, `wav_44100`)
        #[arg(short, long)]
        format: Option<OutputFormat>,
    },
    /// Send one message to the model and print the reply
    TestChat {
        /// Prompt to send
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    // Set up logging based on verbosity; RUST_LOG wins when set
    let filter = match cli.verbose {
        0 => "info,chorus_gateway=info",
        1 => "info,chorus_gateway=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.api_server.host = host;
    }
    if let Some(port) = cli.port {
        config.api_server.port = port;
    }

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(&config).await,
        Command::TestTts {
            text,
            output,
            format,
        } => test_tts(&config, &text, &output, format).await,
        Command::TestChat { prompt } => test_chat(&config, &prompt).await,
    }
}

async fn serve(config: &Config) -> anyhow::Result<()> {
    tracing::info!(
        host = %config.api_server.host,
        port = config.api_server.port,
        model = %config.llm.model,
        tts_stream = config.has_tts_stream(),
        "starting chorus gateway"
    );

    let server = ApiServerBuilder::from_config(config)?.build();

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("shutting down"),
    }

    Ok(())
}

/// Run the TTS relay against the configured account
async fn test_tts(
    config: &Config,
    text: &str,
    output: &Path,
    format: Option<OutputFormat>,
) -> anyhow::Result<()> {
    let client = ElevenLabsClient::from_config(config)?
        .ok_or_else(|| anyhow::anyhow!("ELEVENLABS_API_KEY is not set"))?;

    let (text, truncated) = trim_for_tts(text, config.tts.max_chars);
    if truncated {
        println!("Text trimmed to {} characters", config.tts.max_chars);
    }

    let request = TtsRequest {
        text: text.into_owned(),
        voice_id: config.tts.voice_id.clone(),
        model_id: config.tts.model_id.clone(),
        output_format: format.unwrap_or(config.tts.output_format),
        retry_budget: config.tts.retries,
    };
    println!(
        "Streaming TTS (voice {}, format {})...",
        request.voice_id, request.output_format
    );

    let mut audio = stream_tts(Arc::new(client), request);
    let mut file = tokio::fs::File::create(output).await?;
    let mut chunks = 0usize;
    let mut bytes = 0usize;
    while let Some(chunk) = audio.next().await {
        let chunk = chunk?;
        chunks += 1;
        bytes += chunk.len();
        file.write_all(&chunk).await?;
    }
    file.flush().await?;

    println!("Wrote {bytes} bytes in {chunks} chunks to {}", output.display());
    Ok(())
}

/// Send one user message and print the reply
async fn test_chat(config: &Config, prompt: &str) -> anyhow::Result<()> {
    let client = OpenAiClient::from_config(config)?;
    let conversation = Conversation::single_user(prompt, &config.llm.chat_defaults());

    let reply = generate_reply(&client, &conversation).await?;
    println!("[{}] {}", reply.model, reply.reply);
    Ok(())
}
