use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use talkback::audio::{AudioCapture, AudioOutput, decode_mp3, rms_energy};
use talkback::chat::{ChatBackend, ChatStore, HttpChatBackend, HttpChatStore, JsonFileStore, Sender};
use talkback::speech::{CloudSynthesizer, MicRecognizer, SpeechToText, TextToSpeech};
use talkback::voice::PlaybackRequest;
use talkback::{ChatApp, Config, VoiceController, VoiceState};

/// How long Ctrl-C waits for a barge-in to settle before shutting down
const STOP_GRACE: Duration = Duration::from_secs(2);

/// Talkback - chat client with a hands-free voice mode
#[derive(Parser)]
#[command(name = "talkback", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Disable voice features (for machines without audio hardware)
    #[arg(long, env = "TALKBACK_DISABLE_VOICE")]
    disable_voice: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hands-free conversation; Enter barges in or restarts, Ctrl-C exits
    Voice,
    /// Text chat with the displayed conversation
    Chat {
        /// Start a new chat instead of continuing the latest one
        #[arg(long)]
        new: bool,
    },
    /// List chats
    Chats,
    /// List synthesis voices
    Voices,
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,talkback=info",
        1 => "info,talkback=debug",
        2 => "debug",
        _ => "trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load_with_options(cli.disable_voice)?;
    tracing::debug!(
        voice = ?config.voice,
        backend = %config.chat.backend_url,
        data_dir = %config.data_dir.display(),
        "loaded configuration"
    );

    match cli.command {
        Command::Voice => cmd_voice(config).await,
        Command::Chat { new } => cmd_chat(config, new).await,
        Command::Chats => cmd_chats(config).await,
        Command::Voices => cmd_voices(&config),
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestTts { text } => test_tts(&config, &text).await,
    }
}

/// Build the chat app from configuration and load stored chats
async fn open_app(config: &Config) -> anyhow::Result<ChatApp> {
    let store: Arc<dyn ChatStore> = match &config.chat.sync_url {
        Some(url) => {
            tracing::info!(url = %url, "syncing chats with remote store");
            Arc::new(HttpChatStore::new(url.clone(), config.chat.sync_token.clone()))
        }
        None => Arc::new(JsonFileStore::new(config.chats_path())),
    };
    let backend: Arc<dyn ChatBackend> = Arc::new(HttpChatBackend::new(
        config.chat.backend_url.clone(),
        config.chat.request_timeout,
    )?);

    let app = ChatApp::new(store, backend);
    if let Err(e) = app.load().await {
        tracing::warn!(error = %e, "failed to load chats, starting empty");
    }
    Ok(app)
}

/// Display the most recent chat, creating one if there is none
async fn display_latest(app: &ChatApp, new: bool) -> anyhow::Result<()> {
    match app.list().await.first() {
        Some(chat) if !new => app.select_chat(chat.id).await?,
        _ => {
            app.new_chat().await?;
        }
    }
    Ok(())
}

async fn cmd_voice(config: Config) -> anyhow::Result<()> {
    if !config.voice.enabled {
        anyhow::bail!("voice is disabled (--disable-voice or TALKBACK_DISABLE_VOICE)");
    }

    let mut app = open_app(&config).await?;
    display_latest(&app, false).await?;

    let stt = match SpeechToText::from_config(
        &config.speech,
        &config.api_keys,
        &config.voice.language,
    ) {
        Ok(stt) => Some(stt),
        Err(e) => {
            tracing::warn!(error = %e, "speech-to-text unavailable");
            None
        }
    };
    let recognizer = MicRecognizer::new(stt, config.voice.partial_interval);
    let tts = TextToSpeech::from_config(&config.speech, &config.api_keys)?;
    let synthesizer = CloudSynthesizer::new(tts);

    let (controller, handle) = VoiceController::new(
        config.voice.clone(),
        Box::new(recognizer),
        Box::new(synthesizer),
        app.bridge(),
    );
    app.attach_voice(handle.clone());
    let controller_task = tokio::spawn(controller.run());

    // Echo the conversation as the state machine moves through it
    let mut states = handle.subscribe();
    let chats = Arc::clone(app.chats());
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            let last = chats
                .read()
                .await
                .current()
                .and_then(|c| c.messages.last().cloned());
            match (state, last) {
                (VoiceState::Speaking, Some(m)) if m.sender == Sender::Ai => {
                    println!("ai: {}", m.content);
                }
                (VoiceState::Finalizing, _) => println!("..."),
                (VoiceState::Listening, _) => println!("[listening]"),
                (VoiceState::Idle, _) => println!("[voice off - press Enter to talk]"),
                _ => {}
            }
        }
    });

    handle.start()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(_)) => {
                    if handle.state() == VoiceState::Idle {
                        handle.start()?;
                    } else {
                        handle.force_stop()?;
                    }
                }
                Ok(None) | Err(_) => break,
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    handle.force_stop()?;
    if tokio::time::timeout(STOP_GRACE, handle.wait_for(VoiceState::Idle))
        .await
        .is_err()
    {
        tracing::warn!("voice mode did not settle, shutting down anyway");
    }
    handle.shutdown()?;
    controller_task.await?;

    app.save().await?;
    Ok(())
}

async fn cmd_chat(config: Config, new: bool) -> anyhow::Result<()> {
    let app = open_app(&config).await?;
    display_latest(&app, new).await?;

    if let Some(chat) = app.current().await {
        println!("== {} ==", chat.title);
        for message in &chat.messages {
            let who = match message.sender {
                Sender::User => "you",
                Sender::Ai => "ai",
            };
            println!("{who}: {}", message.content);
        }
    }
    println!("(/new starts a chat, /quit exits)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/new" => {
                app.new_chat().await?;
                if let Some(chat) = app.current().await {
                    println!("== {} ==", chat.title);
                }
            }
            text => match app.send_text(text).await {
                Ok(reply) => println!("ai: {reply}"),
                Err(e) => println!("(not sent: {e})"),
            },
        }
    }

    Ok(())
}

async fn cmd_chats(config: Config) -> anyhow::Result<()> {
    let app = open_app(&config).await?;
    let chats = app.list().await;
    if chats.is_empty() {
        println!("No chats yet");
    }
    for chat in chats {
        println!("{}  {} ({} messages)", chat.id, chat.title, chat.messages.len());
    }
    Ok(())
}

fn cmd_voices(config: &Config) -> anyhow::Result<()> {
    let tts = TextToSpeech::from_config(&config.speech, &config.api_keys)?;
    for voice in tts.voices() {
        let marker = if voice.default { " (default)" } else { "" };
        println!("{}{marker}", voice.name);
    }
    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;
    capture.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = capture.peek_buffer();
        let energy = rms_energy(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);

        capture.clear_buffer();
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test TTS output
async fn test_tts(config: &Config, text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let tts = TextToSpeech::from_config(&config.speech, &config.api_keys)?;
    let request = PlaybackRequest {
        text: text.to_string(),
        voice: config.voice.voice.clone(),
        rate: config.voice.rate,
        pitch: config.voice.pitch,
    };

    println!("Synthesizing speech...");
    let mp3_data = tts.synthesize(&request).await?;
    println!("Got {} bytes of audio data", mp3_data.len());

    let audio = decode_mp3(&mp3_data)?;
    println!("Playing {:.1}s at {} Hz...", audio.duration().as_secs_f32(), audio.sample_rate);
    tokio::task::spawn_blocking(move || {
        let output = AudioOutput::new(audio.sample_rate)?;
        output.play_blocking(audio, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
