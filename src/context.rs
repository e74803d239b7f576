//! Building the file context injected into prompts.
//!
//! Two sources feed a turn's context:
//! - static context read once per session from `--files` and `--directory`,
//! - retrieved chunks from a `--codebase` index, recomputed every turn.
//!
//! Both are rendered as `<file path="...">` blocks and wrapped, together with the user's
//! question, by [`format_prompt_with_context`].

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::index::Chunk;

/// Extensions never read by [`read_directory`].
pub const SKIPPED_EXTENSIONS: &[&str] = &["pyc", "pyo", "so", "dll", "bin"];

fn push_file_block(out: &mut String, path: &str, content: &str) {
    let _ = writeln!(out, "<file path=\"{path}\">\n{content}\n</file>");
}

/// Read each file in `files` into one context string.
///
/// Missing or unreadable files are reported on stderr and skipped.
pub fn read_files<P: AsRef<Path>>(files: &[P]) -> String {
    let mut context = String::new();
    for file in files {
        let file = file.as_ref();
        match fs::read_to_string(file) {
            Ok(content) => push_file_block(&mut context, &file.to_string_lossy(), &content),
            Err(e) => {
                warn!("Cannot read {}: {e}", file.display());
                eprintln!("Warning: File {} not found", file.display());
            }
        }
    }
    context
}

/// Recursively read every UTF-8 file under `dir` into one context string.
///
/// Files with an extension in [`SKIPPED_EXTENSIONS`], files that are not valid UTF-8, and
/// entries that cannot be read are skipped.
pub fn read_directory(dir: &Path) -> String {
    let mut context = String::new();

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let skipped = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| SKIPPED_EXTENSIONS.contains(&ext));
        if skipped {
            continue;
        }

        match fs::read_to_string(entry.path()) {
            Ok(content) => {
                push_file_block(&mut context, &entry.path().to_string_lossy(), &content)
            }
            Err(e) => debug!("Skipping {}: {e}", entry.path().display()),
        }
    }

    context
}

/// Render retrieved chunks as context blocks, best match first.
pub fn format_chunks(chunks: &[&Chunk]) -> String {
    let mut context = String::new();
    for chunk in chunks {
        push_file_block(&mut context, &chunk.file_path, &chunk.text);
    }
    context
}

/// Wrap `prompt` with `file_context`. Without context the prompt is returned unchanged.
pub fn format_prompt_with_context(prompt: &str, file_context: &str) -> String {
    if file_context.is_empty() {
        return prompt.to_string();
    }

    format!(
        "<files_context>\n{file_context}\n</files_context>\n\n<user_query>\n{prompt}\n</user_query>"
    )
}
