//! Command-line interface of the `llm` binary, built with `clap` derive.
//!
//! Context options (`-f`, `-d`, `-c`, `-k`, `-v`) and provider selection (`-p`, `-m`) are
//! global, so they work with or without a subcommand. Running `llm` alone starts a chat.
//!
//! ```sh
//! llm -c ./my_project -k 5                # chat with retrieval over ./my_project
//! llm -f README.md ask "summarise this"   # one-shot question with a file as context
//! llm -p gemini -m gemini-2.0-flash       # switch (and remember) provider and model
//! llm history -n 20
//! llm index ./my_project --rebuild
//! llm search ./my_project "where is the config parsed?"
//! ```

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::ProviderKind;
use crate::prompts::Vibe;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, propagate_version = true, color = clap::ColorChoice::Always)]
pub struct Cli {
    #[command(flatten)]
    pub context: ContextArgs,

    #[command(flatten)]
    pub selection: ProviderArgs,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Where a conversation's context comes from.
#[derive(Args, Debug, Default, Clone)]
pub struct ContextArgs {
    /// Files whose contents are added to every prompt.
    #[arg(short = 'f', long = "files", num_args = 1.., global = true)]
    pub files: Vec<PathBuf>,

    /// Directories read recursively and added to every prompt.
    #[arg(short = 'd', long = "directory", num_args = 1.., global = true)]
    pub directories: Vec<PathBuf>,

    /// Codebase indexed for semantic retrieval; relevant chunks are added on each turn.
    #[arg(short = 'c', long = "codebase", global = true)]
    pub codebase: Option<PathBuf>,

    /// Number of chunks retrieved from the codebase per turn.
    #[arg(short = 'k', long = "top-k", global = true)]
    pub top_k: Option<usize>,

    /// Answering style.
    #[arg(short = 'v', long = "vibe", value_enum, global = true)]
    pub vibe: Option<Vibe>,
}

#[derive(Args, Debug, Default, Clone)]
pub struct ProviderArgs {
    /// Chat provider; saved as the new default.
    #[arg(short = 'p', long = "provider", value_enum, global = true)]
    pub provider: Option<ProviderKind>,

    /// Model identifier; saved as the provider's new default.
    #[arg(short = 'm', long = "model", global = true)]
    pub model: Option<String>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
#[command(about, long_about = None, color = clap::ColorChoice::Always)]
pub enum Commands {
    /// Start an interactive chat session (the default).
    #[clap(name = "chat")]
    Chat {
        /// Rebuild the codebase index instead of loading it from the cache.
        #[arg(long)]
        reindex: bool,
    },

    /// Ask a single question and print the answer.
    #[clap(name = "ask", alias = "a")]
    Ask {
        /// The question; several words are joined with spaces.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,
    },

    /// Show recent exchanges from this month's log.
    History {
        /// Number of entries to show.
        #[arg(short = 'n', long = "number")]
        number: Option<usize>,
    },

    /// Build the retrieval index for a directory.
    Index {
        directory: PathBuf,

        /// Ignore any cached index.
        #[arg(long)]
        rebuild: bool,
    },

    /// Print the chunks of a directory most similar to a query.
    Search { directory: PathBuf, query: String },

    /// Write the default configuration file.
    Init,
}

impl Commands {
    /// Command run when none is given.
    pub fn default_command() -> Self {
        Commands::Chat { reindex: false }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("llm").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_subcommand_means_chat() {
        let cli = parse(&["-c", "src", "-k", "5"]);
        assert_eq!(cli.command, None);
        assert_eq!(cli.context.codebase, Some(PathBuf::from("src")));
        assert_eq!(cli.context.top_k, Some(5));
    }

    #[test]
    fn global_options_work_after_the_subcommand() {
        let cli = parse(&["ask", "what", "is", "this?", "-p", "gemini", "-v", "concise"]);
        assert_eq!(
            cli.command,
            Some(Commands::Ask {
                question: vec!["what".into(), "is".into(), "this?".into()]
            })
        );
        assert_eq!(cli.selection.provider, Some(ProviderKind::Gemini));
        assert_eq!(cli.context.vibe, Some(Vibe::Concise));
    }

    #[test]
    fn several_files_can_follow_one_flag() {
        let cli = parse(&["chat", "-f", "a.rs", "b.rs"]);
        assert_eq!(cli.context.files, vec![PathBuf::from("a.rs"), PathBuf::from("b.rs")]);
    }

    #[test]
    fn unknown_vibe_and_provider_are_rejected() {
        assert!(Cli::try_parse_from(["llm", "-v", "pirate"]).is_err());
        assert!(Cli::try_parse_from(["llm", "-p", "mistral"]).is_err());
    }

    #[test]
    fn subcommands_parse_their_arguments() {
        assert_eq!(
            parse(&["history", "-n", "3"]).command,
            Some(Commands::History { number: Some(3) })
        );
        assert_eq!(
            parse(&["index", "proj", "--rebuild"]).command,
            Some(Commands::Index {
                directory: "proj".into(),
                rebuild: true
            })
        );
        assert_eq!(
            parse(&["search", "proj", "auth flow", "-k", "2"]).command,
            Some(Commands::Search {
                directory: "proj".into(),
                query: "auth flow".into()
            })
        );
        assert_eq!(parse(&["chat", "--reindex"]).command, Some(Commands::Chat { reindex: true }));
    }
}
