//! `notegraph chat`: Send one message and stream the reply.

use notegraph_agent::{StreamEncoder, StreamEvent};
use notegraph_config::AppConfig;
use notegraph_core::message::{Conversation, Message};
use notegraph_gateway::AppState;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

pub struct ChatOptions {
    pub tools: bool,
    pub raw: bool,
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// How a streamed reply ended.
#[derive(Debug, PartialEq, Eq)]
pub enum ChatEnd {
    Done { model: String },
    Failed { message: String },
    /// The stream closed without a terminal event (Ctrl+C).
    Interrupted,
}

/// Write a reply stream to `out` as it arrives.
///
/// Raw mode writes every event as one NDJSON line. Otherwise only the reply
/// text goes to `out`; tool activity is noted on stderr.
pub async fn render_stream<W: AsyncWrite + Unpin>(
    rx: &mut mpsc::Receiver<StreamEvent>,
    raw: bool,
    out: W,
) -> std::io::Result<ChatEnd> {
    let mut encoder = StreamEncoder::new(out);
    while let Some(event) = rx.recv().await {
        if raw {
            encoder.write(&event).await?;
        }
        match event {
            StreamEvent::Delta { content } if !raw => {
                let out = encoder.get_mut();
                out.write_all(content.as_bytes()).await?;
                out.flush().await?;
            }
            StreamEvent::ToolResult { tool_name, .. } if !raw => {
                eprintln!("\n  [tool] {tool_name}");
            }
            StreamEvent::Done { model } => {
                if !raw {
                    encoder.get_mut().write_all(b"\n").await?;
                }
                return Ok(ChatEnd::Done { model });
            }
            StreamEvent::Error { message } => return Ok(ChatEnd::Failed { message }),
            _ => {}
        }
    }
    Ok(ChatEnd::Interrupted)
}

pub async fn run(message: String, options: ChatOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Fail early with setup instructions when no key is set
    if !config.has_api_key() && options.provider.is_none() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    NOTEGRAPH_API_KEY   (generic)");
        eprintln!("    OPENROUTER_API_KEY  (recommended)");
        eprintln!("    OPENAI_API_KEY / ANTHROPIC_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let state = AppState::from_config(config)?;
    let agent = state.agent_for(options.provider.as_deref(), options.model.as_deref(), None)?;
    let conversation = Conversation::seeded(
        &state.config.agent.system_prompt,
        [Message::user(&message)],
    );

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let mut rx = agent.run_stream(conversation, options.tools, cancel);
    match render_stream(&mut rx, options.raw, tokio::io::stdout()).await? {
        ChatEnd::Done { model } => {
            tracing::debug!(model = %model, "Chat finished");
            Ok(())
        }
        ChatEnd::Failed { message } if options.raw => Err(message.into()),
        ChatEnd::Failed { message } => Err(format!("Agent failed: {message}").into()),
        ChatEnd::Interrupted => {
            eprintln!("\n  Cancelled.");
            Ok(())
        }
    }
}
