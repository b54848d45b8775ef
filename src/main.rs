use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use aural::audio::{AudioCapture, AudioPlayback, PLAYBACK_SAMPLE_RATE};
use aural::{
    Config, HttpTranscriber, HttpTranslator, InputSource, ModelClient, NoTranslation, NoopSpeaker,
    PushToTalk, SessionLoop, Speaker, SpeechSynthesizer, TextPrompt, Translator, VoiceOutput,
};

/// Aural - a voice assistant for self-hosted model servers
#[derive(Parser)]
#[command(name = "aural", version, about)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "AURAL_CONFIG")]
    config: Option<PathBuf>,

    /// Type requests instead of speaking them
    #[arg(long)]
    text: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Synthesize a line of speech and play it
    Say {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
    /// Send one prompt through the endpoint chain and print the reply
    Ask {
        /// Prompt text
        prompt: String,

        /// Model to query (defaults to the configured default)
        #[arg(short, long)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,aural=info",
        1 => "info,aural=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    let config_path = cli.config.as_deref();

    // Handle subcommands
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Say { text } => say(config_path, &text).await,
            Command::Ask { prompt, model } => ask(config_path, &prompt, model.as_deref()).await,
        };
    }

    tracing::info!(text_mode = cli.text, "starting aural");

    let config = Config::load(config_path)?;
    tracing::debug!(?config, "loaded configuration");

    let input: Box<dyn InputSource> = if cli.text {
        Box::new(TextPrompt::new())
    } else {
        match AudioCapture::new() {
            Ok(capture) => Box::new(PushToTalk::new(
                capture,
                Duration::from_secs(config.capture.max_seconds),
            )),
            Err(e) => {
                tracing::warn!(error = %e, "no capture device, falling back to typed input");
                Box::new(TextPrompt::new())
            }
        }
    };

    let speaker: Box<dyn Speaker> = match AudioPlayback::new() {
        Ok(playback) => Box::new(VoiceOutput::new(
            SpeechSynthesizer::new(&config.tts, config.request_timeout)?,
            playback,
        )),
        Err(e) => {
            tracing::warn!(error = %e, "no playback device, replies will be printed only");
            Box::new(NoopSpeaker)
        }
    };

    let translator: Box<dyn Translator> = match &config.translation {
        Some(translation) => Box::new(HttpTranslator::new(translation, config.request_timeout)?),
        None => Box::new(NoTranslation),
    };

    let transcriber = HttpTranscriber::new(&config.stt, config.request_timeout)?;

    let session = SessionLoop::from_config(
        &config,
        input,
        Box::new(transcriber),
        speaker,
        translator,
    )?;

    // Console renderer lives for the whole session
    tokio::spawn(aural::render_console(session.event_bus().subscribe()));

    // Set up shutdown signal
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = shutdown_tx.send(()).await;
        }
    });

    tracing::info!("aural ready - press Ctrl+C to exit");

    // The session runs on the main thread (cpal streams aren't Send)
    session.run(shutdown_rx).await?;

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    let sample_rate = capture.sample_rate();
    println!("Sample rate: {sample_rate} Hz");
    println!("---");

    capture.begin()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let energy = capture.level();

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | [{meter}]", i + 1);
    }

    let samples = capture.finish();
    let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

    println!("\n---");
    println!("Captured {} samples, peak {peak:.4}", samples.len());
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");
    println!("  4. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let mut playback = AudioPlayback::new()?;

    // Generate 2 seconds of 440Hz sine wave at the playback rate
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (PLAYBACK_SAMPLE_RATE as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / PLAYBACK_SAMPLE_RATE as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!(
        "Playing {} samples at {PLAYBACK_SAMPLE_RATE} Hz...",
        samples.len()
    );

    playback.play(samples).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: pactl list sinks short");
    println!("  3. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Synthesize a line of speech and play it
async fn say(config_path: Option<&Path>, text: &str) -> anyhow::Result<()> {
    println!("Synthesizing: \"{text}\"\n");

    let config = Config::load(config_path)?;
    let synthesizer = SpeechSynthesizer::new(&config.tts, config.request_timeout)?;

    let mp3_data = synthesizer.synthesize(text).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    println!("Playing audio...");
    let mut playback = AudioPlayback::new()?;
    playback.play_mp3(&mp3_data).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}

/// Send one prompt through the endpoint chain and print the reply
async fn ask(config_path: Option<&Path>, prompt: &str, model: Option<&str>) -> anyhow::Result<()> {
    let config = Config::load(config_path)?;
    let client = ModelClient::new(
        config.endpoints.clone(),
        &config.cleanup,
        config.request_timeout,
    )?;
    let model = model.unwrap_or(&config.default_model);

    let reply = client.query(model, prompt, &[]).await?;
    println!("{}", reply.text);
    println!("\n(answered by {})", reply.endpoint);

    Ok(())
}
