//! REPL implementation
//!
//! This module implements the interactive Read-Eval-Print Loop for Schema-Browser.

use crate::cli::commands::{format_error, Command, CommandHandler, CommandType};
use crate::config::{ProfileStore, Settings};
use crate::database::session::Connectivity;
use crate::error::{BrowserError, Result};
use crate::workspace::SharedWorkspace;
use rustyline::completion::Completer;
use rustyline::error::ReadlineError;
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::history::DefaultHistory;
use rustyline::validate::Validator;
use rustyline::Context;
use rustyline::Helper;
use rustyline::{CompletionType, Config, Editor};
use std::path::PathBuf;
use std::sync::Arc;

const COMMANDS: &[&str] = &[
    "/connect",
    "/open",
    "/test",
    "/disconnect",
    "/status",
    "/profiles",
    "/save",
    "/forget",
    "/schemas",
    "/tables",
    "/columns",
    "/refresh",
    "/history",
    "/page",
    "/find",
    "/help",
    "/quit",
    "/exit",
];

/// Schema-Browser command completer
struct SchemaBrowserCompleter;

impl Completer for SchemaBrowserCompleter {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &Context<'_>,
    ) -> std::result::Result<(usize, Vec<String>), ReadlineError> {
        if line.starts_with('/') && !line.contains(' ') {
            let matches: Vec<String> = COMMANDS
                .iter()
                .filter(|cmd| cmd.starts_with(line))
                .map(|s| s.to_string())
                .collect();
            Ok((0, matches))
        } else {
            Ok((0, vec![]))
        }
    }
}

impl Hinter for SchemaBrowserCompleter {
    type Hint = String;
}

impl Highlighter for SchemaBrowserCompleter {}

impl Validator for SchemaBrowserCompleter {}

impl Helper for SchemaBrowserCompleter {}

/// Schema-Browser REPL
pub struct Repl {
    /// The rustyline editor
    editor: Editor<SchemaBrowserCompleter, DefaultHistory>,
    /// Whether the REPL should continue running
    running: bool,
    history_path: PathBuf,
    workspace: SharedWorkspace,
    handler: CommandHandler,
}

impl Repl {
    /// Create a new REPL instance
    pub fn new(
        workspace: SharedWorkspace,
        store: Arc<dyn ProfileStore + Send + Sync>,
        settings: &Settings,
    ) -> Result<Self> {
        let config = Config::builder()
            .history_ignore_space(true)
            .completion_type(CompletionType::List)
            .auto_add_history(true)
            .build();

        let mut editor = Editor::<SchemaBrowserCompleter, DefaultHistory>::with_config(config)
            .map_err(|e| {
                BrowserError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("Failed to initialize editor: {}", e),
                ))
            })?;

        editor.set_helper(Some(SchemaBrowserCompleter));

        let history_path = dirs::home_dir()
            .map(|p| p.join(".schema-browser").join("history"))
            .unwrap_or_else(|| ".schema-browser-history".into());

        if let Err(e) = editor.load_history(&history_path) {
            tracing::debug!(error = %e, "no readline history loaded");
        }

        let handler = CommandHandler::new(workspace.clone(), store, settings.page_size);

        Ok(Self {
            editor,
            running: true,
            history_path,
            workspace,
            handler,
        })
    }

    /// Run the REPL loop
    pub async fn run(&mut self) -> Result<()> {
        self.print_welcome();

        while self.running {
            let prompt = self.prompt().await;
            match self.editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim();

                    if line.is_empty() {
                        continue;
                    }

                    match Command::parse(line) {
                        Ok(command) => {
                            self.handle_command(command).await;
                        }
                        Err(e) => {
                            println!("{}", format_error(&e));
                        }
                    }
                }
                Err(ReadlineError::Interrupted) => {
                    println!("^C");
                    continue;
                }
                Err(ReadlineError::Eof) => {
                    println!();
                    self.running = false;
                }
                Err(err) => {
                    println!("Error: {:?}", err);
                    self.running = false;
                }
            }
        }

        self.workspace.lock().await.disconnect().await;
        self.save_history();

        Ok(())
    }

    async fn prompt(&self) -> String {
        let ws = self.workspace.lock().await;
        match (ws.connectivity(), ws.current_profile()) {
            (Connectivity::Connected, Some(profile)) => format!("{}> ", profile.database),
            (Connectivity::Failed(_), _) => "(failed)> ".to_string(),
            _ => "> ".to_string(),
        }
    }

    fn save_history(&mut self) {
        if let Some(parent) = self.history_path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::warn!(error = %e, "could not create history directory");
                return;
            }
        }
        if let Err(e) = self.editor.save_history(&self.history_path) {
            tracing::warn!(error = %e, "could not save readline history");
        }
    }

    fn print_welcome(&self) {
        println!();
        println!("Schema-Browser v{}", env!("CARGO_PKG_VERSION"));
        println!("PostgreSQL session and schema browser");
        println!();
        println!("Type /help for available commands. Anything else runs as SQL.");
        println!();
    }

    /// Handle a command
    async fn handle_command(&mut self, command: Command) {
        if command.command_type == CommandType::Quit {
            self.running = false;
        }

        match self.handler.handle(&command).await {
            Ok(msg) => {
                println!("{}", msg);
            }
            Err(e) => {
                println!("{}", format_error(&e));
            }
        }
    }
}
