//! # llm_cli (library root)
//!
//! Core plumbing for the `llm` command-line chat client:
//! - Talking to hosted chat providers over streaming HTTP (`providers`, `chat`).
//! - Injecting local files and directories as prompt context (`context`, `prompts`).
//! - Ad-hoc semantic retrieval over a local codebase (`chunker`, `embeddings`, `index`,
//!   `retriever`).
//! - CLI parsing, configuration, history logging and terminal rendering (`commands`,
//!   `config`, `history`, `render`).
//!
//! ## On-disk layout
//! Everything lives under the per-platform project directories returned by
//! [`directories::ProjectDirs`]:
//!
//! - `config_dir()/config.yaml`: provider defaults and retrieval settings.
//! - `config_dir()/logs/llm_cli_YYYYMM.log`: one JSON line per chat exchange.
//! - `cache_dir()/indexes/<sha256>.json`: one persisted retrieval index per directory.
//!
//! ## Retrieval at a glance
//! ```no_run
//! use llm_cli::embeddings::OpenAiEmbedder;
//! use llm_cli::index::{IndexOptions, build_index, cache_path_for};
//! use llm_cli::retriever::retrieve;
//! use std::path::Path;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let embedder = OpenAiEmbedder::new("sk-...", "https://api.openai.com/v1", "text-embedding-3-small");
//! let dir = Path::new("./my_project");
//! let cache = cache_path_for(&llm_cli::index_cache_dir()?, dir);
//! let index = build_index(&embedder, dir, &cache, &IndexOptions::default()).await?;
//! for chunk in retrieve(&embedder, "where is the config parsed?", &index, 3).await? {
//!     println!("{}", chunk.file_path);
//! }
//! # Ok(()) }
//! ```

use directories::ProjectDirs;
use std::error::Error;
use std::path::PathBuf;

pub mod chat;
pub mod chunker;
pub mod commands;
pub mod config;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod history;
pub mod index;
pub mod prompts;
pub mod providers;
pub mod render;
pub mod retriever;

fn project_dirs() -> Result<ProjectDirs, Box<dyn Error>> {
    ProjectDirs::from("com", "llm-cli", "llm_cli")
        .ok_or_else(|| "Unable to determine config directory".into())
}

/// Return the per-platform configuration directory (e.g. `~/.config/llm_cli` on Linux).
///
/// The directory is **not** created by this function.
///
/// # Errors
/// Returns an error if the platform directories cannot be determined (heavily sandboxed
/// environments without a home directory).
pub fn config_dir() -> Result<PathBuf, Box<dyn Error>> {
    Ok(project_dirs()?.config_dir().to_path_buf())
}

/// Directory holding the monthly JSON history logs.
pub fn logs_dir() -> Result<PathBuf, Box<dyn Error>> {
    Ok(config_dir()?.join("logs"))
}

/// Directory holding persisted retrieval indexes, one file per indexed directory.
pub fn index_cache_dir() -> Result<PathBuf, Box<dyn Error>> {
    Ok(project_dirs()?.cache_dir().join("indexes"))
}
