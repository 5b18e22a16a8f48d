//! Workspace configuration from `package.json`.
//!
//! Options live under the `"tsrun"` key of the nearest package manifest:
//!
//! ```json
//! {
//!   "tsrun": {
//!     "extensions": [".ts", ".tsx"],
//!     "ignore": ["**/generated/**"],
//!     "esbuild": { "resolveExtensions": [".ts", ".js"] }
//!   }
//! }
//! ```
//!
//! All fields are optional. Each package root carries its own config, read
//! when its build group is assembled, so packages in one workspace can
//! diverge.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::utils::normalize_path;

/// Manifest file that identifies a package root.
pub const MANIFEST: &str = "package.json";

/// Manifest key holding runner options.
const CONFIG_KEY: &str = "tsrun";

/// Source extensions recognized when no config overrides them.
pub const DEFAULT_EXTENSIONS: &[&str] = &[".tsx", ".ts", ".jsx", ".mjs", ".cjs", ".js"];

// ============================================================================
// ProjectConfig
// ============================================================================

/// Per-package runner options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectConfig {
    /// Source extensions the loader hook intercepts. Defaults to
    /// [`DEFAULT_EXTENSIONS`].
    pub extensions: Option<Vec<String>>,

    /// Glob patterns excluded from group builds.
    pub ignore: Vec<String>,

    /// Transpiler tuning. The key name is kept for compatibility with
    /// existing workspace manifests.
    pub esbuild: Option<TranspilerConfig>,
}

/// Transpiler sub-table (`esbuild` manifest key).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TranspilerConfig {
    /// Extra extensions considered during group enumeration.
    pub resolve_extensions: Option<Vec<String>>,
}

impl ProjectConfig {
    /// Load the config for a package root. A missing manifest key yields the
    /// defaults; a missing or unparsable manifest is an error.
    pub fn load(root: &Path) -> Result<Self> {
        let manifest = root.join(MANIFEST);
        let text = std::fs::read_to_string(&manifest)
            .with_context(|| format!("failed to read `{}`", manifest.display()))?;
        let value: serde_json::Value = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse `{}`", manifest.display()))?;

        match value.get(CONFIG_KEY) {
            Some(section) => serde_json::from_value(section.clone())
                .with_context(|| format!("invalid `{CONFIG_KEY}` section in `{}`", manifest.display())),
            None => Ok(Self::default()),
        }
    }

    /// Extensions the loader hook intercepts (configured or default),
    /// normalized to a leading dot.
    pub fn effective_extensions(&self) -> Vec<String> {
        let configured = self.extensions.as_ref().map(|exts| {
            exts.iter()
                .map(|e| normalize_extension(e))
                .collect::<Vec<_>>()
        });
        configured.unwrap_or_else(|| DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect())
    }

    /// Extensions used when enumerating group candidates: the effective set
    /// plus any configured `resolveExtensions`.
    pub fn enumeration_extensions(&self) -> Vec<String> {
        let mut exts = self.effective_extensions();
        if let Some(resolve) = self
            .esbuild
            .as_ref()
            .and_then(|t| t.resolve_extensions.as_ref())
        {
            for ext in resolve {
                let ext = normalize_extension(ext);
                if !exts.contains(&ext) {
                    exts.push(ext);
                }
            }
        }
        exts
    }
}

fn normalize_extension(ext: &str) -> String {
    if ext.starts_with('.') {
        ext.to_string()
    } else {
        format!(".{ext}")
    }
}

// ============================================================================
// Root discovery
// ============================================================================

/// Find the nearest directory at or above `start` containing a package
/// manifest.
pub fn find_package_root(start: &Path) -> Option<PathBuf> {
    let start = normalize_path(start);
    let mut dir = if start.is_dir() {
        start.as_path()
    } else {
        start.parent()?
    };
    loop {
        if dir.join(MANIFEST).is_file() {
            return Some(dir.to_path_buf());
        }
        dir = dir.parent()?;
    }
}

/// Find the workspace root: the nearest package root enclosing the current
/// directory.
pub fn find_workspace_root() -> Result<PathBuf> {
    let cwd = std::env::current_dir().context("failed to get current working directory")?;
    find_package_root(&cwd).with_context(|| {
        format!(
            "no `{MANIFEST}` found in `{}` or any parent directory",
            cwd.display()
        )
    })
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_manifest(dir: &Path, body: &str) {
        std::fs::write(dir.join(MANIFEST), body).unwrap();
    }

    #[test]
    fn test_defaults_when_key_missing() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), r#"{ "name": "app", "version": "1.0.0" }"#);

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert!(config.ignore.is_empty());
        assert_eq!(
            config.effective_extensions(),
            DEFAULT_EXTENSIONS.iter().map(|e| e.to_string()).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_parses_config_section() {
        let dir = TempDir::new().unwrap();
        write_manifest(
            dir.path(),
            r#"{
                "name": "app",
                "tsrun": {
                    "extensions": ["ts", ".tsx"],
                    "ignore": ["**/generated/**"],
                    "esbuild": { "resolveExtensions": [".ts", ".mts"] }
                }
            }"#,
        );

        let config = ProjectConfig::load(dir.path()).unwrap();
        assert_eq!(config.effective_extensions(), vec![".ts", ".tsx"]);
        assert_eq!(config.ignore, vec!["**/generated/**"]);
        // resolveExtensions merge without duplicating .ts
        assert_eq!(config.enumeration_extensions(), vec![".ts", ".tsx", ".mts"]);
    }

    #[test]
    fn test_missing_manifest_is_error() {
        let dir = TempDir::new().unwrap();
        assert!(ProjectConfig::load(dir.path()).is_err());
    }

    #[test]
    fn test_find_package_root_walks_up() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "{}");
        let nested = dir.path().join("src/deep");
        std::fs::create_dir_all(&nested).unwrap();

        let root = find_package_root(&nested).unwrap();
        assert_eq!(root, normalize_path(dir.path()));
    }

    #[test]
    fn test_find_package_root_prefers_nearest() {
        let dir = TempDir::new().unwrap();
        write_manifest(dir.path(), "{}");
        let pkg = dir.path().join("packages/lib");
        std::fs::create_dir_all(&pkg).unwrap();
        write_manifest(&pkg, "{}");

        let root = find_package_root(&pkg.join("src")).unwrap();
        assert_eq!(root, normalize_path(&pkg));
    }

}
