//! Chat commands: send, history, abort and the interactive session.

use crate::render::{self, StreamPrinter};
use crate::repl::{Repl, ReplConfig};
use crate::Overrides;
use clap::Args;
use gatelink_client::{ChatMessage, SessionStream};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Send command arguments.
#[derive(Args)]
pub struct SendArgs {
    /// Message text
    pub message: String,

    /// Session key (default from config)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Print the call result instead of waiting for the streamed reply
    #[arg(long)]
    pub no_wait: bool,
}

/// History command arguments.
#[derive(Args)]
pub struct HistoryArgs {
    /// Session key (default from config)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Maximum messages to return
    #[arg(short, long)]
    pub limit: Option<usize>,
}

/// Abort command arguments.
#[derive(Args)]
pub struct AbortArgs {
    /// Session key (default from config)
    #[arg(short, long)]
    pub session: Option<String>,
}

/// Interactive chat arguments.
#[derive(Args)]
pub struct ChatArgs {
    /// Session key (default from config)
    #[arg(short, long)]
    pub session: Option<String>,

    /// Show the model's thinking after each reply
    #[arg(long)]
    pub show_thinking: bool,
}

/// Text carried directly by a non-streaming `chat` result, if any.
pub fn immediate_reply(result: &Value) -> Option<&str> {
    result
        .get("message")
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
}

/// Print a reply as it streams in and return the finalized message.
///
/// `baseline` is the transcript length taken before the message was sent;
/// only messages after it count as the reply. Gives up after `timeout`
/// without a new update. A gateway that answers synchronously (reply text
/// in the call result, no stream started) is handled without waiting.
pub async fn await_reply(
    stream: &SessionStream,
    baseline: usize,
    result: &Value,
    timeout: Duration,
) -> Option<ChatMessage> {
    let mut views = stream.watch();
    let mut printer = StreamPrinter::after(baseline);

    let initial = views.borrow_and_update().clone();
    let started = initial.streaming || initial.messages.len() > baseline;
    if !started {
        if let Some(text) = immediate_reply(result) {
            println!("{}", text);
            return None;
        }
    }
    if let Some(done) = printer.update(&initial) {
        return Some(done);
    }

    loop {
        match tokio::time::timeout(timeout, views.changed()).await {
            Ok(Ok(())) => {
                let view = views.borrow_and_update().clone();
                if let Some(done) = printer.update(&view) {
                    return Some(done);
                }
            }
            Ok(Err(_)) => return None,
            Err(_) => {
                eprintln!("{}", console::style("(no reply before timeout)").dim());
                return None;
            }
        }
    }
}

/// Run the send command.
pub async fn send(args: SendArgs, overrides: &Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;
    let timeout = config.requests.timeout();
    let session = super::session_or_default(args.session, &config);
    let client = super::connect(config).await?;

    let stream = client.stream_session(session.as_str());
    let result = client.send_message(&session, &args.message).await?;

    if args.no_wait || !client.is_connected() {
        render::render_json(&result);
    } else {
        await_reply(&stream, 0, &result, timeout).await;
    }

    client.disconnect();
    Ok(())
}

/// Run the history command.
pub async fn history(args: HistoryArgs, overrides: &Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;
    let session = super::session_or_default(args.session, &config);
    let client = super::connect(config).await?;

    let result = client.fetch_history(&session, args.limit).await?;
    render::render_history(&result);

    client.disconnect();
    Ok(())
}

/// Run the abort command.
pub async fn abort(args: AbortArgs, overrides: &Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;
    let session = super::session_or_default(args.session, &config);
    let client = super::connect(config).await?;

    let result = client.abort(&session).await?;
    render::render_json(&result);

    client.disconnect();
    Ok(())
}

/// Run the interactive chat session.
pub async fn interactive(args: ChatArgs, overrides: &Overrides) -> anyhow::Result<()> {
    let config = overrides.load()?;
    let session = super::session_or_default(args.session, &config);
    let client = Arc::new(super::connect(config).await?);

    let repl_config = ReplConfig {
        show_thinking: args.show_thinking,
        ..ReplConfig::default()
    };
    let result = Repl::new(Arc::clone(&client), session, repl_config).run().await;

    client.disconnect();
    result
}
