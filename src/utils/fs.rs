//! Atomic file writes for the staging tree.
//!
//! The staging directory has a single writer (the compile coordinator) and
//! many readers (child processes loading compiled modules). A reader must
//! never observe a half-written output, so every write goes to a temporary
//! sibling first and is moved into place with `rename`.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};

/// Write `contents` to `path` atomically.
///
/// Creates parent directories as needed. The temporary file lives in the
/// same directory as the target so the final `rename` stays on one
/// filesystem.
pub fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path
        .parent()
        .with_context(|| format!("no parent directory for `{}`", path.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create `{}`", dir.display()))?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tsrun-write")
        .tempfile_in(dir)
        .with_context(|| format!("failed to create temp file in `{}`", dir.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write staging output for `{}`", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to move staging output into `{}`", path.display()))?;
    Ok(())
}
