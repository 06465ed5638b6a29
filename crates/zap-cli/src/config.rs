use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILES: [&str; 3] = [".zaprc", ".zaprc.toml", ".config/zaprc"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub left_delim: String,

    #[serde(default)]
    pub right_delim: String,

    /// Escape templates after compiling them.
    #[serde(default)]
    pub escape: bool,

    /// Extra function names templates may call.
    #[serde(default)]
    pub funcs: Vec<String>,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// File extensions picked up when a pattern names a directory.
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    #[serde(default = "default_true")]
    pub colored: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            left_delim: String::new(),
            right_delim: String::new(),
            escape: false,
            funcs: Vec::new(),
            log_level: default_log_level(),
            extensions: default_extensions(),
            colored: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

fn default_extensions() -> Vec<String> {
    vec!["tmpl".to_string(), "html".to_string()]
}

impl Config {
    /// Loads the first config file found in `dir`, then `~/.zaprc`.
    pub fn load(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Config::default()),
        }
    }

    pub fn find(dir: &Path) -> Option<PathBuf> {
        CONFIG_FILES
            .iter()
            .map(|name| dir.join(name))
            .chain(dirs::home_dir().map(|home| home.join(".zaprc")))
            .find(|path| path.is_file())
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Merges command-line flags into the config. Flags win.
    pub fn merge_cli_args(
        &mut self,
        left: Option<String>,
        right: Option<String>,
        funcs: Vec<String>,
        escape: bool,
        verbose: bool,
    ) {
        if let Some(left) = left {
            self.left_delim = left;
        }
        if let Some(right) = right {
            self.right_delim = right;
        }
        self.funcs.extend(funcs);
        if escape {
            self.escape = true;
        }
        if verbose {
            self.log_level = "debug".to_string();
        }
    }
}
