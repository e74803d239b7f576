//! # Codebase index
//!
//! A persisted list of embedded text chunks for one local directory tree.
//!
//! ## Responsibilities
//! - **Walking**: recursively visits a directory, keeping files whose extension is in
//!   [`TEXT_EXTENSIONS`]. Symlinks to files are read; symlinked directories are not entered.
//!   Unreadable entries below the root are skipped with a warning. A missing or unreadable
//!   root is an error and leaves the cache untouched.
//! - **Chunking & embedding**: each file is split by [`chunk_text`] and each chunk embedded
//!   through an [`Embedder`], with a bounded number of requests in flight.
//! - **Persistence**: the finished index is written as a versioned JSON document to a cache
//!   file named after a hash of the directory path.
//! - **Reuse**: if the cache file exists it is loaded as-is. Changes to the source files are
//!   not detected; use [`rebuild_index`] to refresh.
//!
//! ## Cache layout
//! ```text
//! <cache_dir>/<sha256 of absolute dir path>.json
//! {"version": 1, "chunks": [{"embedding": [..], "text": "..", "file_path": ".."}, ..]}
//! ```

use futures::{StreamExt, TryStreamExt, stream};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::chunker::{DEFAULT_CHUNK_SIZE, chunk_text};
use crate::embeddings::Embedder;
use crate::error::{IndexError, Result};

/// Extensions (without the dot) of files considered text and indexed.
pub const TEXT_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "md", "txt", "java", "rs", "c", "cs", "sql",
];

/// Version written into every cache file. Files with another version are rebuilt.
pub const INDEX_FORMAT_VERSION: u32 = 1;

/// A slice of a source file together with its embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub embedding: Vec<f32>,
    pub text: String,
    pub file_path: String,
}

/// All chunks of one indexed directory, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CodebaseIndex {
    pub chunks: Vec<Chunk>,
}

impl CodebaseIndex {
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[derive(Serialize)]
struct IndexFileRef<'a> {
    version: u32,
    chunks: &'a [Chunk],
}

#[derive(Deserialize)]
struct IndexFile {
    version: u32,
    chunks: Vec<Chunk>,
}

/// Knobs for [`build_index`].
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Chunk width in characters.
    pub chunk_size: usize,
    /// Embedding requests in flight at once. `0` is treated as `1`.
    pub concurrency: usize,
    /// Draw a progress bar on stderr while embedding.
    pub show_progress: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            concurrency: 4,
            show_progress: false,
        }
    }
}

impl From<&crate::config::RetrievalConfig> for IndexOptions {
    fn from(config: &crate::config::RetrievalConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            concurrency: config.concurrency,
            show_progress: true,
        }
    }
}

/// Cache file for `directory` under `cache_dir`.
///
/// The key is the SHA-256 of the absolute path string, so the same directory always maps to
/// the same file no matter how its contents change. Paths that cannot be canonicalized are
/// hashed as given.
pub fn cache_path_for(cache_dir: &Path, directory: &Path) -> PathBuf {
    let absolute = fs::canonicalize(directory).unwrap_or_else(|_| directory.to_path_buf());
    let digest = sha256::digest(absolute.to_string_lossy().as_bytes());
    cache_dir.join(format!("{digest}.json"))
}

/// Load the index for `directory`, building and persisting it on first use.
///
/// An existing cache file at `cache_path` is returned without any validation of the
/// source files. A cache that cannot be parsed is logged and rebuilt.
///
/// # Errors
/// - Any embedding failure aborts the build; nothing is written.
/// - Failure to write the cache file.
pub async fn build_index<E: Embedder>(
    embedder: &E,
    directory: &Path,
    cache_path: &Path,
    options: &IndexOptions,
) -> Result<CodebaseIndex> {
    if cache_path.exists() {
        match load_index(cache_path) {
            Ok(index) => {
                debug!(
                    chunks = index.len(),
                    "Loaded cached index {}",
                    cache_path.display()
                );
                return Ok(index);
            }
            Err(e) => warn!(
                "Ignoring unreadable index cache {}: {e}; rebuilding",
                cache_path.display()
            ),
        }
    }

    rebuild_index(embedder, directory, cache_path, options).await
}

/// Build the index for `directory` from scratch and overwrite `cache_path`.
///
/// # Errors
/// - `directory` does not exist, is not a directory, or cannot be listed.
/// - Any embedding failure, or failure to write the cache file.
pub async fn rebuild_index<E: Embedder>(
    embedder: &E,
    directory: &Path,
    cache_path: &Path,
    options: &IndexOptions,
) -> Result<CodebaseIndex> {
    let files = collect_text_files(directory)?;
    info!(
        files = files.len(),
        "Indexing {} into {}",
        directory.display(),
        cache_path.display()
    );

    let pending: Vec<(String, String)> = files
        .iter()
        .flat_map(|(path, content)| {
            chunk_text(content, options.chunk_size)
                .into_iter()
                .map(move |text| (path.clone(), text.to_string()))
        })
        .collect();

    let progress = if options.show_progress {
        let bar = ProgressBar::new(pending.len() as u64);
        bar.set_style(
            ProgressStyle::with_template("{msg} [{bar:40}] {pos}/{len} chunks ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_message("Embedding");
        bar
    } else {
        ProgressBar::hidden()
    };

    let chunks: Vec<Chunk> = stream::iter(pending)
        .map(|(file_path, text)| {
            let progress = &progress;
            async move {
                let embedding = embedder.embed(&text).await?;
                progress.inc(1);
                Ok::<_, IndexError>(Chunk {
                    embedding,
                    text,
                    file_path,
                })
            }
        })
        .buffered(options.concurrency.max(1))
        .try_collect()
        .await
        .inspect_err(|_| progress.abandon())?;
    progress.finish_and_clear();

    let index = CodebaseIndex { chunks };
    save_index(cache_path, &index)?;
    info!(chunks = index.len(), "Index written to {}", cache_path.display());

    Ok(index)
}

/// Read and decode a cache file.
pub fn load_index(cache_path: &Path) -> Result<CodebaseIndex> {
    let bytes = fs::read(cache_path).map_err(|e| IndexError::io(cache_path, e))?;
    let file: IndexFile = serde_json::from_slice(&bytes)?;
    if file.version != INDEX_FORMAT_VERSION {
        return Err(IndexError::Version {
            found: file.version,
            expected: INDEX_FORMAT_VERSION,
        });
    }
    Ok(CodebaseIndex {
        chunks: file.chunks,
    })
}

/// Write `index` to `cache_path` through a temporary file in the same directory, so readers
/// never observe a partial document.
pub fn save_index(cache_path: &Path, index: &CodebaseIndex) -> Result<()> {
    let parent = match cache_path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(|e| IndexError::io(parent, e))?;

    let document = serde_json::to_vec(&IndexFileRef {
        version: INDEX_FORMAT_VERSION,
        chunks: &index.chunks,
    })?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| IndexError::io(parent, e))?;
    tmp.write_all(&document)
        .map_err(|e| IndexError::io(tmp.path(), e))?;
    tmp.persist(cache_path)
        .map_err(|e| IndexError::io(cache_path, e.error))?;
    Ok(())
}

/// Whether `path` has an extension from [`TEXT_EXTENSIONS`].
pub fn is_text_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| TEXT_EXTENSIONS.contains(&ext))
}

/// Decode bytes as UTF-8, dropping invalid sequences.
pub fn decode_lossy(bytes: &[u8]) -> String {
    bytes.utf8_chunks().map(|chunk| chunk.valid()).collect()
}

/// Walk `directory` and return `(path, content)` for every eligible file, sorted by name
/// within each directory.
fn collect_text_files(directory: &Path) -> Result<Vec<(String, String)>> {
    let metadata = fs::metadata(directory).map_err(|e| IndexError::io(directory, e))?;
    if !metadata.is_dir() {
        return Err(IndexError::io(
            directory,
            io::Error::new(io::ErrorKind::NotADirectory, "not a directory"),
        ));
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                let source = e
                    .into_io_error()
                    .unwrap_or_else(|| io::Error::other("cannot walk directory"));
                return Err(IndexError::io(directory, source));
            }
            Err(e) => {
                warn!("Skipping unreadable entry: {e}");
                continue;
            }
        };
        let is_file = entry.file_type().is_file()
            || (entry.path_is_symlink() && entry.path().is_file());
        if !is_file || !is_text_file(entry.path()) {
            continue;
        }

        match fs::read(entry.path()) {
            Ok(bytes) => {
                debug!("Indexing file: {}", entry.path().display());
                files.push((
                    entry.path().to_string_lossy().into_owned(),
                    decode_lossy(&bytes),
                ));
            }
            Err(e) => warn!("Skipping {}: {e}", entry.path().display()),
        }
    }

    Ok(files)
}
