//! Face Send - Test Client for the Face Daemon
//!
//! Sends protocol lines to a running `face-daemon`, the same way the speech
//! pipeline would.
//!
//! # Usage
//!
//! ```bash
//! face-send emotion happy --duration-ms 2000 --reason greeting
//! face-send asr "turn on the" --partial
//! face-send llm "Sure, turning it on now." --chunk-chars 4 --interval-ms 40
//! face-send raw '{"emotion_output":{"expression_type":"sad"}}'
//! face-send --socket-path /tmp/face.sock demo
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use face_conductor::protocol::{DEFAULT_DURATION_MS, TYPE_ASR, TYPE_LLM_STREAM};
use face_conductor::transport::DEFAULT_TCP_ADDR;

/// Send test messages to the face daemon
#[derive(Parser, Debug)]
#[command(name = "face-send", version, about)]
struct Args {
    /// Daemon TCP address
    #[arg(long, env = "FACE_LISTEN", default_value = DEFAULT_TCP_ADDR)]
    addr: String,

    /// Connect to a Unix socket instead of TCP
    #[arg(long, env = "FACE_SOCKET")]
    socket_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Change the expression
    Emotion {
        /// Expression name (e.g. happy, sad, warning)
        expression: String,
        /// How long to hold it; 0 or less holds it until replaced
        #[arg(long, default_value_t = DEFAULT_DURATION_MS, allow_negative_numbers = true)]
        duration_ms: i64,
        /// Why the expression changed
        #[arg(long, default_value = "face-send")]
        reason: String,
    },
    /// Send a transcript update
    Asr {
        /// Transcript text
        text: String,
        /// Send as a partial result instead of a final one
        #[arg(long)]
        partial: bool,
    },
    /// Stream a reply in chunks, then an empty final chunk
    Llm {
        /// Reply text
        text: String,
        /// Characters per chunk
        #[arg(long, default_value_t = 6)]
        chunk_chars: usize,
        /// Delay between chunks in milliseconds
        #[arg(long, default_value_t = 50)]
        interval_ms: u64,
    },
    /// Send one line as-is
    Raw {
        /// The line to send
        line: String,
    },
    /// Play a short scripted conversation
    Demo,
}

fn emotion_line(expression: &str, duration_ms: i64, reason: &str) -> Value {
    json!({
        "emotion_output": {
            "expression_type": expression,
            "duration_ms": duration_ms,
            "trigger_reason": reason,
        }
    })
}

fn text_line(kind: &str, text: &str, is_final: bool) -> Value {
    json!({ "type": kind, "text": text, "isFinal": is_final })
}

/// Split `text` into chunks of at most `size` characters
fn chunks(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|chunk| chunk.iter().collect())
        .collect()
}

struct Sender {
    stream: Box<dyn AsyncWrite + Send + Unpin>,
}

impl Sender {
    async fn connect(args: &Args) -> Result<Self> {
        #[cfg(unix)]
        if let Some(path) = &args.socket_path {
            let stream = tokio::net::UnixStream::connect(path)
                .await
                .with_context(|| format!("Failed to connect to {}", path.display()))?;
            info!(path = %path.display(), "Connected");
            return Ok(Self {
                stream: Box::new(stream),
            });
        }

        let stream = tokio::net::TcpStream::connect(&args.addr)
            .await
            .with_context(|| format!("Failed to connect to {}", args.addr))?;
        info!(addr = %args.addr, "Connected");
        Ok(Self {
            stream: Box::new(stream),
        })
    }

    async fn send_raw(&mut self, line: &str) -> Result<()> {
        debug!(line, "Sending");
        self.stream.write_all(line.as_bytes()).await?;
        self.stream.write_all(b"\n").await?;
        self.stream.flush().await?;
        Ok(())
    }

    async fn send(&mut self, value: &Value) -> Result<()> {
        self.send_raw(&value.to_string()).await
    }

    async fn stream_reply(&mut self, text: &str, chunk_chars: usize, interval: Duration) -> Result<()> {
        for part in chunks(text, chunk_chars) {
            self.send(&text_line(TYPE_LLM_STREAM, &part, false)).await?;
            tokio::time::sleep(interval).await;
        }
        self.send(&text_line(TYPE_LLM_STREAM, "", true)).await
    }

    /// Transcript, then a streamed reply, then an emotion
    async fn demo(&mut self) -> Result<()> {
        let pause = |ms| tokio::time::sleep(Duration::from_millis(ms));

        self.send(&text_line(TYPE_ASR, "what's the", false)).await?;
        pause(300).await;
        self.send(&text_line(TYPE_ASR, "what's the weather like", true))
            .await?;
        pause(500).await;

        self.stream_reply(
            "It's sunny and warm today, a great day for a walk!",
            6,
            Duration::from_millis(60),
        )
        .await?;
        pause(1000).await;

        self.send(&emotion_line("happy", 3000, "demo")).await?;
        Ok(())
    }

    async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut sender = Sender::connect(&args).await?;

    match &args.command {
        Command::Emotion {
            expression,
            duration_ms,
            reason,
        } => {
            sender
                .send(&emotion_line(expression, *duration_ms, reason))
                .await?;
        }
        Command::Asr { text, partial } => {
            sender.send(&text_line(TYPE_ASR, text, !*partial)).await?;
        }
        Command::Llm {
            text,
            chunk_chars,
            interval_ms,
        } => {
            sender
                .stream_reply(text, *chunk_chars, Duration::from_millis(*interval_ms))
                .await?;
        }
        Command::Raw { line } => sender.send_raw(line).await?,
        Command::Demo => sender.demo().await?,
    }

    sender.close().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use face_conductor::{decode_line, ExpressionState, InboundMessage};

    #[test]
    fn test_cli_is_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_chunks_respect_char_boundaries() {
        assert_eq!(chunks("今天天气很好", 4), vec!["今天天气", "很好"]);
        assert_eq!(chunks("abc", 0), vec!["a", "b", "c"]);
        assert!(chunks("", 3).is_empty());
    }

    #[test]
    fn test_emotion_line_decodes() {
        let line = emotion_line("happy", 1500, "greeting").to_string();
        match decode_line(&line).unwrap() {
            InboundMessage::Emotion(command) => {
                assert_eq!(command.target, ExpressionState::Happy);
                assert_eq!(command.duration_ms, 1500);
                assert_eq!(command.trigger_reason, "greeting");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["face-send", "asr", "hi", "--partial"]).unwrap();
        assert!(matches!(args.command, Command::Asr { partial: true, .. }));

        let args = Args::try_parse_from([
            "face-send",
            "emotion",
            "sad",
            "--duration-ms",
            "-1",
        ])
        .unwrap();
        assert!(matches!(
            args.command,
            Command::Emotion { duration_ms: -1, .. }
        ));
    }

    #[test]
    fn test_text_lines_decode() {
        let asr = text_line(TYPE_ASR, "hi", true).to_string();
        assert!(matches!(
            decode_line(&asr).unwrap(),
            InboundMessage::Transcript(chunk) if chunk.text == "hi" && chunk.is_final
        ));

        let llm = text_line(TYPE_LLM_STREAM, "yo", false).to_string();
        assert!(matches!(
            decode_line(&llm).unwrap(),
            InboundMessage::Reply(chunk) if chunk.text == "yo" && !chunk.is_final
        ));
    }
}
