//! Terminal voice client for the Parla Gateway.
//!
//! Connects a microphone and speaker to a relay session and prints the
//! transcript as it forms. Lines typed at the prompt are sent as text
//! messages; `/quit` ends the session.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;

use parla_gateway::audio::{CpalCapture, CpalPlayer};
use parla_gateway::client::{SessionController, Speaker, TurnState};

/// Parla Console - talk to a relay session from the terminal
#[derive(Parser, Debug)]
#[command(name = "parla-console")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Relay WebSocket URL
    #[arg(long, default_value = "ws://127.0.0.1:8080/realtime")]
    relay_url: String,

    /// Start with the microphone muted (text-only until unmuted)
    #[arg(long)]
    muted: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let player = Arc::new(CpalPlayer::new().context("no audio output available")?);
    let controller = Arc::new(SessionController::new(player));

    controller.on_message(|message| {
        let who = match message.speaker {
            Speaker::User => "you",
            Speaker::Assistant => "assistant",
        };
        println!("[{who}] {}", message.text);
    });
    controller.on_turn(|turn| {
        if turn == TurnState::AssistantSpeaking {
            println!("(assistant is speaking...)");
        }
    });

    controller
        .connect(&cli.relay_url)
        .await
        .context("could not reach the relay")?;
    println!("connected to {}", cli.relay_url);

    // The capture device pushes frames regardless; the controller's recording
    // gate decides whether they go out.
    let capture = {
        let controller = Arc::clone(&controller);
        match CpalCapture::start(move |frame| controller.ingest_frame(&frame)) {
            Ok(capture) => Some(capture),
            Err(e) => {
                // Audio-out still works; the session degrades to text input.
                warn!("microphone unavailable: {e}");
                None
            }
        }
    };
    if capture.is_some() && !cli.muted {
        controller.start_recording();
        println!("microphone live - speak, or type a message");
    } else {
        println!("type a message ('/record' to unmute)");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => continue,
            "/quit" => break,
            "/record" => {
                controller.start_recording();
                println!("recording on");
            }
            "/mute" => {
                controller.stop_recording();
                println!("recording off");
            }
            text => {
                if let Err(e) = controller.send_text_message(text).await {
                    warn!("send failed: {e}");
                    break;
                }
            }
        }
    }

    if let Some(capture) = capture {
        capture.stop();
    }
    controller.disconnect();
    println!("session closed");
    Ok(())
}
