//! Entry point of the `llm` command-line chat client.
//!
//! Parses the command line, loads `config.yaml`, resolves the provider and model, and
//! dispatches to the selected subcommand. With no subcommand an interactive chat starts.
//!
//! ```sh
//! llm -c ./my_project
//! llm ask "What is the meaning of life?"
//! llm init
//! ```

use clap::Parser;
use once_cell::sync::OnceCell;
use std::error::Error;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use llm_cli::chat::{ChatSession, Codebase};
use llm_cli::commands::{Cli, Commands, ContextArgs, ProviderArgs};
use llm_cli::config::{self, LlmCliConfig};
use llm_cli::context::{read_directory, read_files};
use llm_cli::embeddings::{Embedder, OpenAiEmbedder};
use llm_cli::history::{DEFAULT_HISTORY_LIMIT, HistoryLog, display_history};
use llm_cli::index::{CodebaseIndex, IndexOptions, build_index, cache_path_for, rebuild_index};
use llm_cli::providers::ProviderClient;
use llm_cli::retriever::rank;

static TRACING: OnceCell<()> = OnceCell::new();

fn main() {
    TRACING.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    });

    let result = tokio::runtime::Runtime::new()
        .map_err(Box::<dyn Error>::from)
        .and_then(|runtime| runtime.block_on(run()));

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config_path = llm_cli::config_dir()?.join("config.yaml");
    debug!("Loading config from: {}", config_path.display());
    let mut config = config::load_config(&config_path)?;

    match cli.command.unwrap_or_else(Commands::default_command) {
        Commands::Chat { reindex } => {
            let mut session =
                start_session(&cli.context, cli.selection, &mut config, &config_path, reindex)
                    .await?
                    .with_spinner(true);
            session.run().await?;
        }
        Commands::Ask { question } => {
            let question = question.join(" ");
            let mut session =
                start_session(&cli.context, cli.selection, &mut config, &config_path, false)
                    .await?
                    .with_spinner(true);
            session.ask(&question).await?;
        }
        Commands::History { number } => {
            let log = HistoryLog::new(llm_cli::logs_dir()?);
            match log.last_entries(number.unwrap_or(DEFAULT_HISTORY_LIMIT))? {
                Some(entries) => display_history(&mut std::io::stdout(), &entries)?,
                None => {
                    println!("No log file found.");
                    display_history(&mut std::io::stdout(), &[])?;
                }
            }
        }
        Commands::Index { directory, rebuild } => {
            let embedder = OpenAiEmbedder::from_config(&config.retrieval)?;
            let (index, cache_path) = load_codebase(&embedder, &config, &directory, rebuild).await?;
            println!(
                "Indexed {} chunks from {} into {}",
                index.len(),
                directory.display(),
                cache_path.display()
            );
        }
        Commands::Search { directory, query } => {
            let embedder = OpenAiEmbedder::from_config(&config.retrieval)?;
            let (index, _) = load_codebase(&embedder, &config, &directory, false).await?;
            if index.is_empty() {
                println!("No indexable files in {}", directory.display());
                return Ok(());
            }
            let top_k = cli.context.top_k.unwrap_or(config.retrieval.top_k);
            let query_embedding = embedder.embed(&query).await?;
            for (chunk, score) in rank(&query_embedding, &index)?.into_iter().take(top_k) {
                println!("{score:.4}  {}", chunk.file_path);
                for line in chunk.text.lines().take(3) {
                    println!("        {line}");
                }
            }
        }
        Commands::Init => init(&config_path)?,
    }

    Ok(())
}

/// Build a chat session from the context options, persisting provider overrides.
async fn start_session(
    context: &ContextArgs,
    selection: ProviderArgs,
    config: &mut LlmCliConfig,
    config_path: &Path,
    reindex: bool,
) -> Result<ChatSession, Box<dyn Error>> {
    let resolved = config.resolve_provider(selection.provider, selection.model);
    if resolved.changed {
        config::save_config(config, config_path)?;
        info!("Default provider is now {} ({})", resolved.provider, resolved.model);
    }
    let client = ProviderClient::from_env(resolved.provider, resolved.model)?;

    let mut file_context = read_files(&context.files);
    for dir in &context.directories {
        file_context.push_str(&read_directory(dir));
    }

    let session = ChatSession::new(client, context.vibe, file_context)
        .with_history_log(HistoryLog::new(llm_cli::logs_dir()?));

    let Some(codebase) = &context.codebase else {
        return Ok(session);
    };
    let embedder = OpenAiEmbedder::from_config(&config.retrieval)?;
    let (index, _) = load_codebase(&embedder, config, codebase, reindex).await?;
    println!("Loaded {} chunks from {}", index.len(), codebase.display());

    Ok(session.with_codebase(Codebase {
        index,
        embedder,
        top_k: context.top_k.unwrap_or(config.retrieval.top_k),
    }))
}

async fn load_codebase(
    embedder: &OpenAiEmbedder,
    config: &LlmCliConfig,
    directory: &Path,
    rebuild: bool,
) -> Result<(CodebaseIndex, PathBuf), Box<dyn Error>> {
    let cache_path = cache_path_for(&llm_cli::index_cache_dir()?, directory);
    let options = IndexOptions::from(&config.retrieval);
    let index = if rebuild {
        rebuild_index(embedder, directory, &cache_path, &options).await?
    } else {
        build_index(embedder, directory, &cache_path, &options).await?
    };
    Ok((index, cache_path))
}

/// Write the default configuration unless one already exists.
fn init(config_path: &Path) -> Result<(), Box<dyn Error>> {
    if config_path.exists() {
        println!("Config already exists at {}", config_path.display());
        return Ok(());
    }
    config::save_config(&LlmCliConfig::default(), config_path)?;
    println!("Wrote default config to {}", config_path.display());
    Ok(())
}
