//! # Terminal rendering
//!
//! Streams model answers to the terminal as Markdown while tokens arrive. Text is rendered a
//! line at a time; fenced code blocks are held back until the closing fence and then printed
//! with syntect highlighting (`base16-ocean.dark`, 24-bit colour).
//!
//! | Markdown         | Rendering           |
//! |------------------|---------------------|
//! | `#`, `##`, `###` | bold cyan           |
//! | `**bold**`       | bold                |
//! | `*italic*`       | italic              |
//! | `` `code` ``     | yellow              |
//! | ```` ```lang ```` | highlighted block  |
//!
//! The renderer writes to any [`Write`], so it can target a buffer in tests.

use crossterm::{
    QueueableCommand,
    style::{Attribute, Color, SetAttribute, SetForegroundColor},
};
use indicatif::{ProgressBar, ProgressStyle};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::error::Error;
use std::io::{self, Write};
use std::time::Duration;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Style, Theme, ThemeSet};
use syntect::parsing::{SyntaxReference, SyntaxSet};
use syntect::util::{LinesWithEndings, as_24_bit_terminal_escaped};

static SYNTAXES: Lazy<SyntaxSet> = Lazy::new(SyntaxSet::load_defaults_newlines);

static THEME: Lazy<Theme> = Lazy::new(|| {
    ThemeSet::load_defaults()
        .themes
        .remove("base16-ocean.dark")
        .unwrap_or_default()
});

static INLINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"`([^`]+)`|\*\*([^*]+)\*\*|\*([^*\s][^*]*)\*").expect("inline markdown pattern")
});

fn style_inline(line: &str) -> String {
    INLINE
        .replace_all(line, |caps: &Captures| {
            if let Some(code) = caps.get(1) {
                format!("\x1b[33m{}\x1b[0m", code.as_str())
            } else if let Some(bold) = caps.get(2) {
                format!("\x1b[1m{}\x1b[0m", bold.as_str())
            } else if let Some(italic) = caps.get(3) {
                format!("\x1b[3m{}\x1b[0m", italic.as_str())
            } else {
                caps[0].to_string()
            }
        })
        .into_owned()
}

fn syntax_for(language: &str) -> &'static SyntaxReference {
    let ps = &*SYNTAXES;
    ps.find_syntax_by_token(language)
        .or_else(|| ps.find_syntax_by_extension(language))
        .or_else(|| match language.to_lowercase().as_str() {
            "py" => ps.find_syntax_by_extension("py"),
            "js" | "javascript" => ps.find_syntax_by_extension("js"),
            "ts" | "typescript" => ps.find_syntax_by_extension("ts"),
            "rs" => ps.find_syntax_by_extension("rs"),
            "sh" | "bash" | "shell" | "zsh" => ps.find_syntax_by_extension("sh"),
            "yml" => ps.find_syntax_by_extension("yaml"),
            "md" => ps.find_syntax_by_extension("md"),
            _ => None,
        })
        .unwrap_or_else(|| ps.find_syntax_plain_text())
}

fn write_markdown_line<W: Write>(out: &mut W, line: &str) -> io::Result<()> {
    let header = ["### ", "## ", "# "]
        .iter()
        .find_map(|marker| line.strip_prefix(marker));

    if let Some(title) = header {
        out.queue(SetForegroundColor(Color::Cyan))?;
        out.queue(SetAttribute(Attribute::Bold))?;
        write!(out, "{title}")?;
        out.queue(SetAttribute(Attribute::Reset))?;
        out.queue(SetForegroundColor(Color::Reset))?;
        writeln!(out)
    } else {
        writeln!(out, "{}", style_inline(line))
    }
}

fn write_code_block<W: Write>(out: &mut W, code: &str, language: &str) -> Result<(), Box<dyn Error>> {
    if !language.is_empty() {
        out.queue(SetForegroundColor(Color::DarkGrey))?;
        out.queue(SetAttribute(Attribute::Italic))?;
        write!(out, "[{language}]")?;
        out.queue(SetAttribute(Attribute::Reset))?;
        out.queue(SetForegroundColor(Color::Reset))?;
        writeln!(out)?;
    }

    let mut highlighter = HighlightLines::new(syntax_for(language), &THEME);
    for line in LinesWithEndings::from(code) {
        let ranges: Vec<(Style, &str)> = highlighter.highlight_line(line, &SYNTAXES)?;
        write!(out, "{}", as_24_bit_terminal_escaped(&ranges[..], false))?;
        out.queue(SetAttribute(Attribute::Reset))?;
    }
    if !code.is_empty() && !code.ends_with('\n') {
        writeln!(out)?;
    }
    Ok(())
}

struct CodeBlock {
    language: String,
    content: String,
}

/// Streaming Markdown renderer.
///
/// Feed tokens with [`add_chunk`](Self::add_chunk) and call [`flush`](Self::flush) once the
/// answer is complete. An unterminated code block is still printed by `flush`.
pub struct PrettyPrinter<W: Write> {
    out: W,
    buffer: String,
    code: Option<CodeBlock>,
}

impl PrettyPrinter<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> PrettyPrinter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            buffer: String::new(),
            code: None,
        }
    }

    pub fn add_chunk(&mut self, chunk: &str) -> Result<(), Box<dyn Error>> {
        self.buffer.push_str(chunk);
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            self.handle_line(line.trim_end_matches(['\n', '\r']))?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), Box<dyn Error>> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.handle_line(&rest)?;
        }
        if let Some(block) = self.code.take() {
            write_code_block(&mut self.out, &block.content, &block.language)?;
        }
        self.out.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn handle_line(&mut self, line: &str) -> Result<(), Box<dyn Error>> {
        let fence = line.trim_start().strip_prefix("```");

        match fence {
            Some(language) => match self.code.take() {
                Some(block) => write_code_block(&mut self.out, &block.content, &block.language)?,
                None => {
                    self.code = Some(CodeBlock {
                        language: language.trim().to_string(),
                        content: String::new(),
                    })
                }
            },
            None => match self.code.as_mut() {
                Some(block) => {
                    block.content.push_str(line);
                    block.content.push('\n');
                }
                None => write_markdown_line(&mut self.out, line)?,
            },
        }
        Ok(())
    }
}

/// Spinner shown while waiting for the first token of an answer.
pub fn thinking_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.blue} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.set_message("Thinking...");
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
