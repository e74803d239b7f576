//! # Chat sessions
//!
//! A [`ChatSession`] owns everything a conversation needs: the provider client, the system
//! prompt of the selected vibe, static file context, an optional codebase index for
//! per-turn retrieval, the in-memory message history and the monthly history log.
//!
//! Each turn:
//!
//! 1. retrieves the `top_k` chunks most similar to the input (when a codebase is attached),
//! 2. wraps the input with retrieved and static context,
//! 3. streams the answer through the Markdown renderer,
//! 4. records the exchange in memory and in the log.
//!
//! [`ChatSession::ask`] runs a single turn; [`ChatSession::run`] drives the interactive loop.

use crossterm::style::Stylize;
use futures::StreamExt;
use std::error::Error;
use std::io::{self, BufRead, Write};
use tracing::{debug, warn};

use crate::context::{format_chunks, format_prompt_with_context};
use crate::embeddings::{Embedder, OpenAiEmbedder};
use crate::history::HistoryLog;
use crate::index::CodebaseIndex;
use crate::prompts::{Vibe, system_prompt};
use crate::providers::{Message, ProviderClient};
use crate::render::{PrettyPrinter, thinking_spinner};
use crate::retriever::retrieve;

/// An indexed codebase consulted on every turn.
pub struct Codebase<E: Embedder> {
    pub index: CodebaseIndex,
    pub embedder: E,
    pub top_k: usize,
}

pub struct ChatSession<E: Embedder = OpenAiEmbedder> {
    client: ProviderClient,
    system_prompt: &'static str,
    file_context: String,
    codebase: Option<Codebase<E>>,
    history: Vec<Message>,
    log: Option<HistoryLog>,
    spinner: bool,
}

impl<E: Embedder> ChatSession<E> {
    pub fn new(client: ProviderClient, vibe: Option<Vibe>, file_context: String) -> Self {
        Self {
            client,
            system_prompt: system_prompt(vibe),
            file_context,
            codebase: None,
            history: Vec::new(),
            log: None,
            spinner: false,
        }
    }

    pub fn with_codebase(mut self, codebase: Codebase<E>) -> Self {
        self.codebase = Some(codebase);
        self
    }

    pub fn with_history_log(mut self, log: HistoryLog) -> Self {
        self.log = Some(log);
        self
    }

    /// Show a spinner on stderr until the first token arrives.
    pub fn with_spinner(mut self, spinner: bool) -> Self {
        self.spinner = spinner;
        self
    }

    pub fn messages(&self) -> &[Message] {
        &self.history
    }

    /// Context for one turn: retrieved chunks first, then the static file context.
    pub async fn turn_context(&self, input: &str) -> Result<String, Box<dyn Error>> {
        let Some(codebase) = &self.codebase else {
            return Ok(self.file_context.clone());
        };

        let chunks = retrieve(&codebase.embedder, input, &codebase.index, codebase.top_k).await?;
        debug!("Retrieved {} chunks", chunks.len());
        Ok(format_chunks(&chunks) + &self.file_context)
    }

    /// Run one exchange, rendering the streamed answer into `printer`.
    ///
    /// Returns the full answer. Empty answers are neither remembered nor logged.
    pub async fn send<W: Write>(
        &mut self,
        input: &str,
        printer: &mut PrettyPrinter<W>,
    ) -> Result<String, Box<dyn Error>> {
        let context = self.turn_context(input).await?;
        let prompt = format_prompt_with_context(input, &context);

        let spinner = self.spinner.then(thinking_spinner);
        let mut tokens = self
            .client
            .stream_chat(self.system_prompt, &self.history, &prompt)
            .await?;

        let mut response = String::new();
        while let Some(token) = tokens.next().await {
            if let Some(spinner) = &spinner {
                spinner.finish_and_clear();
            }
            let token = token?;
            printer.add_chunk(&token)?;
            response.push_str(&token);
        }
        if let Some(spinner) = &spinner {
            spinner.finish_and_clear();
        }
        printer.flush()?;

        if !response.is_empty() {
            if let Some(log) = &self.log {
                if let Err(e) = log.append(&prompt, &response) {
                    warn!("Cannot write history log in {}: {e}", log.dir().display());
                }
            }
            self.history.push(Message::user(prompt));
            self.history.push(Message::assistant(response.clone()));
        }

        Ok(response)
    }

    /// Ask a single question and print the answer to stdout.
    pub async fn ask(&mut self, question: &str) -> Result<String, Box<dyn Error>> {
        let mut printer = PrettyPrinter::stdout();
        self.send(question, &mut printer).await
    }

    /// Interactive loop over stdin and stdout.
    pub async fn run(&mut self) -> Result<(), Box<dyn Error>> {
        let stdin = io::stdin();
        let mut input = stdin.lock();
        let mut out = io::stdout();
        self.run_with(&mut input, &mut out).await
    }

    /// Interactive loop over arbitrary input and output.
    ///
    /// `exit` or `quit` ends the session. End of input says goodbye. A failed turn prints the
    /// error and the loop continues.
    pub async fn run_with<R: BufRead, W: Write>(
        &mut self,
        input: &mut R,
        out: &mut W,
    ) -> Result<(), Box<dyn Error>> {
        writeln!(
            out,
            "{}",
            "Chat session started. Type 'exit' to end the conversation."
                .blue()
                .bold()
        )?;

        loop {
            write!(out, "\n>>> ")?;
            out.flush()?;

            let Some(line) = read_input(input)? else {
                writeln!(out, "{}", "Goodbye!".blue().bold())?;
                break;
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if matches!(line.to_lowercase().as_str(), "exit" | "quit") {
                writeln!(out, "{}", "Ending chat session".blue().bold())?;
                break;
            }

            let result = {
                let mut printer = PrettyPrinter::new(&mut *out);
                self.send(line, &mut printer).await
            };
            if let Err(e) = result {
                warn!("Turn failed: {e}");
                writeln!(out, "{}", format!("Error: {e}").red().bold())?;
            }
        }

        Ok(())
    }
}

/// Read one logical input. A line ending in `\` continues on the next line.
///
/// Returns `None` at end of input when nothing was read.
fn read_input<R: BufRead>(input: &mut R) -> io::Result<Option<String>> {
    let mut text = String::new();
    let mut read_any = false;

    loop {
        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            return Ok(read_any.then_some(text));
        }
        read_any = true;

        let line = line.trim_end_matches(['\n', '\r']);
        match line.strip_suffix('\\') {
            Some(head) => {
                text.push_str(head);
                text.push('\n');
            }
            None => {
                text.push_str(line);
                return Ok(Some(text));
            }
        }
    }
}
