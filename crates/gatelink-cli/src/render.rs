//! Terminal rendering utilities.
//!
//! Provides markdown rendering, event and history formatting, and
//! incremental display of streamed replies.

use console::style;
use gatelink_client::{ChatMessage, ConnectionState, Event, EventKind, StreamView};
use serde_json::Value;
use std::io::Write;

/// Render markdown text to the terminal.
pub fn render_markdown(text: &str) {
    let skin = termimad::MadSkin::default();
    skin.print_text(text);
}

/// Print a JSON value to stdout.
pub fn render_json(value: &Value) {
    let text = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
    println!("{}", text);
}

/// One-line summary of an event.
pub fn format_event(event: &Event) -> String {
    match event.kind() {
        EventKind::StateChanged(state) => format!("{} {}", style("connection").dim(), state_label(state)),
        EventKind::Unrecognized(frame) => {
            format!("{} {}", style("unrecognized").red(), frame)
        }
        _ => format!("{} {}", style(&event.topic).cyan(), event.data),
    }
}

/// Print an event line.
pub fn render_event(event: &Event) {
    println!("{}", format_event(event));
}

/// Colored connection state name.
pub fn state_label(state: ConnectionState) -> String {
    match state {
        ConnectionState::Connected => style(state.as_str()).green().to_string(),
        ConnectionState::Connecting | ConnectionState::Reconnecting => {
            style(state.as_str()).yellow().to_string()
        }
        ConnectionState::Disconnected => style(state.as_str()).red().to_string(),
    }
}

/// Lines for a `chat.history` result: `role: text` per message. Results
/// without a `messages` array yield no lines.
pub fn format_history(result: &Value) -> Vec<String> {
    let Some(messages) = result.get("messages").and_then(Value::as_array) else {
        return Vec::new();
    };

    messages
        .iter()
        .map(|message| {
            let role = message.get("role").and_then(Value::as_str).unwrap_or("?");
            format!("{}: {}", role, content_text(message.get("content")))
        })
        .collect()
}

/// Flatten message content: a plain string, or the text of every block.
fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Array(blocks)) => blocks
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Print a `chat.history` result, message bodies rendered as markdown.
pub fn render_history(result: &Value) {
    let lines = format_history(result);
    if lines.is_empty() {
        render_json(result);
        return;
    }
    for line in lines {
        match line.split_once(": ") {
            Some((role, text)) => {
                println!("{}", style(format!("{}:", role)).bold());
                render_markdown(text);
            }
            None => println!("{}", line),
        }
    }
}

/// Print the thinking part of a finished reply.
pub fn render_thinking(message: &ChatMessage) {
    let thinking = message.thinking();
    if !thinking.is_empty() {
        eprintln!("{} {}", style("thinking:").dim(), style(&thinking).dim());
    }
}

/// Prints a streamed reply as it grows.
///
/// Each published view is compared with what has been printed so far and
/// only the new suffix of the live assistant message is written. Messages
/// before `skip` in the transcript belong to earlier turns and are ignored.
#[derive(Debug, Default)]
pub struct StreamPrinter {
    skip: usize,
    message_id: Option<String>,
    printed: usize,
}

impl StreamPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// A printer that ignores the first `skip` messages.
    pub fn after(skip: usize) -> Self {
        Self {
            skip,
            ..Self::default()
        }
    }

    /// The text not yet printed for the latest assistant message, and that
    /// message if it is finalized.
    pub fn advance(&mut self, view: &StreamView) -> (String, Option<ChatMessage>) {
        let Some(message) = view
            .messages
            .iter()
            .skip(self.skip)
            .rev()
            .find(|m| m.role == "assistant")
        else {
            return (String::new(), None);
        };

        if self.message_id.as_deref() != Some(message.id.as_str()) {
            self.message_id = Some(message.id.clone());
            self.printed = 0;
        }

        let text = message.text();
        let suffix = text.get(self.printed..).unwrap_or_default().to_string();
        self.printed = text.len();

        let finished = (!message.streaming).then(|| message.clone());
        (suffix, finished)
    }

    /// Print the new suffix; returns the finalized message once done.
    pub fn update(&mut self, view: &StreamView) -> Option<ChatMessage> {
        let (suffix, finished) = self.advance(view);
        if !suffix.is_empty() {
            print!("{}", suffix);
            let _ = std::io::stdout().flush();
        }
        if finished.is_some() {
            println!();
        }
        finished
    }
}

/// Print the welcome banner for the REPL.
pub fn render_welcome(url: &str, session: &str) {
    eprintln!(
        "{} {} {}",
        style("gatelink").bold().cyan(),
        style("chat").dim(),
        style(format!("({})", url)).dim(),
    );
    eprintln!("{} {}", style("session:").dim(), session);
    eprintln!("{}", style("Type /help for commands, /quit to exit.").dim());
    eprintln!();
}

/// Print the help message.
pub fn render_help() {
    eprintln!("{}", style("Available commands:").bold());
    eprintln!("  {}            - Show this help", style("/help").cyan());
    eprintln!("  {}            - Exit the REPL", style("/quit").cyan());
    eprintln!("  {} - Switch to another session", style("/session <key>").cyan());
    eprintln!("  {}         - Show recent history", style("/history").cyan());
    eprintln!("  {}           - Abort the current reply", style("/abort").cyan());
    eprintln!("  {}          - Show connection status", style("/status").cyan());
    eprintln!();
}
