//! Interactive read-eval-print loop.
//!
//! Provides `gatelink chat` -- an interactive session with rustyline line
//! editing that sends messages over the shared socket and renders the
//! streamed reply as it accumulates.

use crate::commands::chat::await_reply;
use crate::render;
use gatelink_client::{ChatMessage, GatewayClient, SessionStream};
use rustyline::error::ReadlineError;
use rustyline::highlight::MatchingBracketHighlighter;
use rustyline::hint::HistoryHinter;
use rustyline::{CompletionType, Config, EditMode, Editor};
use rustyline_derive::{Helper, Highlighter, Hinter, Validator};
use std::path::PathBuf;
use std::sync::Arc;

/// Slash commands understood by the REPL.
const COMMANDS: &[&str] = &["/help", "/quit", "/exit", "/session", "/history", "/abort", "/status"];

/// REPL configuration.
pub struct ReplConfig {
    /// Path to history file.
    pub history_file: PathBuf,
    /// Show the thinking part of replies.
    pub show_thinking: bool,
    /// Messages shown by `/history`.
    pub history_limit: usize,
}

impl Default for ReplConfig {
    fn default() -> Self {
        let history_file = gatelink_core::paths::history_file()
            .unwrap_or_else(|_| PathBuf::from(".gatelink_history"));

        Self {
            history_file,
            show_thinking: false,
            history_limit: 20,
        }
    }
}

/// Tab-completion helper for slash commands.
#[derive(Helper, Highlighter, Hinter, Validator)]
struct ReplHelper {
    #[rustyline(Hinter)]
    hinter: HistoryHinter,
    #[rustyline(Highlighter)]
    highlighter: MatchingBracketHighlighter,
    #[rustyline(Validator)]
    validator: rustyline::validate::MatchingBracketValidator,
}

impl rustyline::completion::Completer for ReplHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.starts_with('/') {
            let prefix = &line[..pos];
            let matches: Vec<String> = COMMANDS
                .iter()
                .filter(|c| c.starts_with(prefix))
                .map(|c| c.to_string())
                .collect();
            Ok((0, matches))
        } else {
            Ok((pos, Vec::new()))
        }
    }
}

/// A parsed slash command.
#[derive(Debug, PartialEq, Eq)]
pub enum SlashCommand {
    Help,
    Quit,
    Session(Option<String>),
    History,
    Abort,
    Status,
    Unknown(String),
}

impl SlashCommand {
    pub fn parse(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        match parts.next().unwrap_or("") {
            "/help" => Self::Help,
            "/quit" | "/exit" => Self::Quit,
            "/session" => Self::Session(parts.next().map(str::to_string)),
            "/history" => Self::History,
            "/abort" => Self::Abort,
            "/status" => Self::Status,
            other => Self::Unknown(other.to_string()),
        }
    }
}

/// The interactive REPL.
pub struct Repl {
    client: Arc<GatewayClient>,
    stream: SessionStream,
    session_key: String,
    config: ReplConfig,
}

impl Repl {
    /// Create a new REPL bound to `session_key`.
    pub fn new(client: Arc<GatewayClient>, session_key: String, config: ReplConfig) -> Self {
        let stream = client.stream_session(session_key.as_str());
        Self {
            client,
            stream,
            session_key,
            config,
        }
    }

    /// Run the REPL loop.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        render::render_welcome(&self.client.endpoint().url, &self.session_key);

        let rl_config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .edit_mode(EditMode::Emacs)
            .build();

        let helper = ReplHelper {
            hinter: HistoryHinter::new(),
            highlighter: MatchingBracketHighlighter::new(),
            validator: rustyline::validate::MatchingBracketValidator::new(),
        };

        let mut rl: Editor<ReplHelper, rustyline::history::FileHistory> =
            Editor::with_config(rl_config)?;
        rl.set_helper(Some(helper));

        let _ = rl.load_history(&self.config.history_file);

        loop {
            let prompt = console::style(format!("{}> ", self.session_key))
                .green()
                .bold()
                .to_string();
            match rl.readline(&prompt) {
                Ok(line) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let _ = rl.add_history_entry(trimmed);

                    if trimmed.starts_with('/') {
                        match self.handle_command(SlashCommand::parse(trimmed)).await {
                            CommandResult::Continue => {}
                            CommandResult::Quit => break,
                        }
                        continue;
                    }

                    self.send_message(trimmed).await;
                }
                Err(ReadlineError::Interrupted) => {
                    // Ctrl-C: cancel current input, not exit
                    eprintln!("{}", console::style("^C (type /quit to exit)").dim());
                    continue;
                }
                Err(ReadlineError::Eof) => break,
                Err(err) => {
                    eprintln!("{}: {}", console::style("Error").red(), err);
                    break;
                }
            }
        }

        if let Some(parent) = self.config.history_file.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = rl.save_history(&self.config.history_file);

        eprintln!("{}", console::style("Goodbye!").dim());
        Ok(())
    }

    async fn handle_command(&mut self, command: SlashCommand) -> CommandResult {
        match command {
            SlashCommand::Help => render::render_help(),
            SlashCommand::Quit => return CommandResult::Quit,
            SlashCommand::Session(None) => {
                eprintln!("  {} {}", console::style("session:").dim(), self.session_key);
            }
            SlashCommand::Session(Some(key)) => {
                self.stream.bind(key.as_str());
                self.session_key = key;
                eprintln!(
                    "{} {}",
                    console::style("Switched to session").dim(),
                    self.session_key
                );
            }
            SlashCommand::History => {
                match self
                    .client
                    .fetch_history(&self.session_key, Some(self.config.history_limit))
                    .await
                {
                    Ok(result) => render::render_history(&result),
                    Err(e) => eprintln!("{}: {}", console::style("Error").red(), e),
                }
            }
            SlashCommand::Abort => match self.client.abort(&self.session_key).await {
                Ok(_) => eprintln!("{}", console::style("Aborted.").dim()),
                Err(e) => eprintln!("{}: {}", console::style("Error").red(), e),
            },
            SlashCommand::Status => {
                eprintln!("  {} {}", console::style("session:").dim(), self.session_key);
                eprintln!(
                    "  {} {}",
                    console::style("state:").dim(),
                    render::state_label(self.client.state())
                );
                eprintln!(
                    "  {} {}",
                    console::style("pending:").dim(),
                    self.client.pending_requests()
                );
                eprintln!(
                    "  {} {}",
                    console::style("reconnect attempts:").dim(),
                    self.client.reconnect_attempts()
                );
            }
            SlashCommand::Unknown(name) => {
                eprintln!("{}: {}", console::style("Unknown command").red(), name);
                render::render_help();
            }
        }
        CommandResult::Continue
    }

    /// Send a message and display the streamed reply.
    async fn send_message(&self, message: &str) {
        self.stream
            .push(ChatMessage::text_message("user", self.session_key.as_str(), message));
        let baseline = self.stream.view().messages.len();

        let result = match self.client.send_message(&self.session_key, message).await {
            Ok(result) => result,
            Err(e) => {
                let hint = if e.is_transient() { " (reconnecting)" } else { "" };
                eprintln!("{}: {}{}", console::style("Error").red(), e, hint);
                return;
            }
        };

        let timeout = self.client.config().requests.timeout();
        if let Some(reply) = await_reply(&self.stream, baseline, &result, timeout).await {
            if self.config.show_thinking {
                render::render_thinking(&reply);
            }
        }
        eprintln!();
    }
}

/// Result of handling a slash command.
enum CommandResult {
    Continue,
    Quit,
}
