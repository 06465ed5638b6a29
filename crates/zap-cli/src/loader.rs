//! Resolves command-line patterns to template sources.

use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct Source {
    pub path: PathBuf,
    pub text: String,
}

impl Source {
    pub fn name(&self) -> String {
        self.path.display().to_string()
    }
}

/// Expands `patterns` (files, directories or glob patterns) and reads every
/// matched file once, in path order.
///
/// Directories are searched recursively for files ending in one of
/// `extensions`. A pattern that matches nothing is an error.
pub fn load(patterns: &[String], extensions: &[String]) -> Result<Vec<Source>> {
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        let matched = expand(pattern, extensions)?;
        if matched.is_empty() {
            bail!("pattern matches no files: {}", pattern);
        }
        paths.extend(matched);
    }

    paths
        .into_iter()
        .map(|path| {
            let text = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            debug!(path = %path.display(), bytes = text.len(), "loaded template source");
            Ok(Source { path, text })
        })
        .collect()
}

fn expand(pattern: &str, extensions: &[String]) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if path.is_dir() {
        let mut found = Vec::new();
        for ext in extensions {
            let nested = path.join("**").join(format!("*.{}", ext));
            found.extend(glob_files(&nested.to_string_lossy())?);
        }
        return Ok(found);
    }
    glob_files(pattern)
}

fn glob_files(pattern: &str) -> Result<Vec<PathBuf>> {
    let paths = glob::glob(pattern).with_context(|| format!("Invalid glob pattern: {}", pattern))?;
    Ok(paths.filter_map(|path| path.ok()).filter(|path| path.is_file()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &Path, name: &str, text: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, text).unwrap();
    }

    fn exts() -> Vec<String> {
        vec!["tmpl".to_string(), "html".to_string()]
    }

    #[test]
    fn test_load_single_file() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tmpl", "A");
        let file = dir.path().join("a.tmpl").to_string_lossy().to_string();

        let sources = load(&[file], &exts()).unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].text, "A");
    }

    #[test]
    fn test_directory_uses_extensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tmpl", "A");
        write(dir.path(), "nested/b.html", "B");
        write(dir.path(), "notes.txt", "skip");

        let root = dir.path().to_string_lossy().to_string();
        let sources = load(&[root], &exts()).unwrap();
        let texts: Vec<&str> = sources.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["A", "B"]);
    }

    #[test]
    fn test_glob_and_dedup() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.tmpl", "A");
        write(dir.path(), "b.tmpl", "B");

        let glob = dir.path().join("*.tmpl").to_string_lossy().to_string();
        let file = dir.path().join("a.tmpl").to_string_lossy().to_string();
        let sources = load(&[glob, file], &exts()).unwrap();
        assert_eq!(sources.len(), 2);
        assert!(sources[0].name().ends_with("a.tmpl"));
    }

    #[test]
    fn test_unmatched_pattern_is_an_error() {
        let dir = TempDir::new().unwrap();
        let glob = dir.path().join("*.tmpl").to_string_lossy().to_string();
        let err = load(&[glob], &exts()).unwrap_err();
        assert!(err.to_string().contains("matches no files"));
    }
}
