//! # zap-cli
//!
//! Command-line interface for zap templates.
//!
//! Loads template files, resolves `define` inheritance, `fill` and `block`,
//! optionally escapes every action for its HTML context, and prints the
//! resulting plain templates.

mod config;
mod errors;
mod loader;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use colored::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{Level, debug, info};
use zap::{Error, Lexer, Set, TokenKind};

use config::Config;
use errors::{EnhancedError, enhance_error};
use loader::Source;

#[derive(Parser)]
#[command(name = "zap")]
#[command(about = "Template inheritance compiler and contextual autoescaper", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Left action delimiter
    #[arg(long, global = true)]
    left: Option<String>,

    /// Right action delimiter
    #[arg(long, global = true)]
    right: Option<String>,

    /// Function name templates may call (repeatable)
    #[arg(long = "func", value_name = "NAME", global = true)]
    funcs: Vec<String>,

    /// Log phase boundaries to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile templates and print the result
    Compile {
        /// Files, directories or glob patterns
        patterns: Vec<String>,
        /// Escape actions for their HTML context
        #[arg(long)]
        escape: bool,
        /// Write one file per template into DIR
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,
    },
    /// Parse and compile templates without printing them
    Check {
        patterns: Vec<String>,
        #[arg(long)]
        escape: bool,
    },
    /// Print the token stream of a file
    Tokens { file: PathBuf },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load(Path::new(".")).unwrap_or_else(|e| {
        eprintln!("{} Failed to load config: {:#}", "⚠".yellow().bold(), e);
        Config::default()
    });
    let escape = match &cli.command {
        Commands::Compile { escape, .. } | Commands::Check { escape, .. } => *escape,
        Commands::Tokens { .. } => false,
    };
    config.merge_cli_args(cli.left, cli.right, cli.funcs, escape, cli.verbose);
    init_logging(&config.log_level)?;
    if !config.colored {
        colored::control::set_override(false);
    }

    match cli.command {
        Commands::Compile { patterns, out, .. } => {
            let set = build(&config, &patterns)?;
            match out {
                Some(dir) => write_templates(&set, &dir),
                None => {
                    println!("{}", set);
                    Ok(())
                }
            }
        }
        Commands::Check { patterns, .. } => {
            let set = build(&config, &patterns)?;
            let count = set.names().count();
            println!(
                "{} {} {}",
                "✓".green().bold(),
                "OK".green().bold(),
                format!("{} templates", count).dimmed()
            );
            Ok(())
        }
        Commands::Tokens { file } => print_tokens(&config, &file),
    }
}

fn init_logging(level: &str) -> Result<()> {
    let level: Level = level
        .parse()
        .with_context(|| format!("Invalid log level: {}", level))?;
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}

/// Loads, parses and compiles every source, escaping when configured.
/// Library errors are reported with a snippet and end the process.
fn build(config: &Config, patterns: &[String]) -> Result<Set> {
    let patterns = if patterns.is_empty() { vec![".".to_string()] } else { patterns.to_vec() };
    let sources = loader::load(&patterns, &config.extensions)?;

    let mut set = Set::new();
    set.delims(&config.left_delim, &config.right_delim)
        .funcs(config.funcs.iter().cloned());

    // Template name to the source that defined it, for error locations.
    let mut origin: HashMap<String, usize> = HashMap::new();
    for (i, source) in sources.iter().enumerate() {
        if let Err(err) = set.parse(&source.name(), &source.text) {
            report(&err, Some(source));
        }
        for name in set.names() {
            origin.entry(name.to_string()).or_insert(i);
        }
    }
    info!(sources = sources.len(), templates = origin.len(), "parsed");

    if let Err(err) = set.compile() {
        report(&err, None);
    }
    if config.escape
        && let Err(err) = set.escape()
    {
        let source = match &err {
            Error::Escape(e) => e.template.as_ref().and_then(|t| origin.get(t)).map(|&i| &sources[i]),
            _ => None,
        };
        report(&err, source);
    }
    debug!(templates = set.names().count(), escaped = config.escape, "built template set");
    Ok(set)
}

fn report(err: &Error, source: Option<&Source>) -> ! {
    let enhanced = match source {
        Some(source) => enhance_error(err, Some(source.name()), Some(source.text.clone())),
        None => enhance_error(err, None, None),
    };
    enhanced.display();
    std::process::exit(1);
}

fn write_templates(set: &Set, dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;
    for (name, define) in set.tree().iter() {
        let path = dir.join(output_file_name(name));
        fs::write(&path, format!("{}\n", define))
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} {}", "✓".green().bold(), path.display());
    }
    Ok(())
}

fn output_file_name(template: &str) -> String {
    let stem: String = template
        .chars()
        .map(|c| if c.is_alphanumeric() || matches!(c, '-' | '_' | '.') { c } else { '_' })
        .collect();
    format!("{}.tmpl", stem)
}

fn print_tokens(config: &Config, file: &Path) -> Result<()> {
    let text = fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let lexer = Lexer::new(&text, &config.left_delim, &config.right_delim);
    for token in lexer {
        if token.kind == TokenKind::Error {
            let enhanced = EnhancedError::new(format!("Syntax error: {}", token.value))
                .with_span(token.span)
                .with_file(file.display().to_string())
                .with_source(text.clone());
            enhanced.display();
            bail!("lexing {} failed", file.display());
        }
        println!(
            "{:>4}:{:<3} {:<20} {}",
            token.span.line,
            token.span.col,
            token.kind.display_name().cyan(),
            token
        );
    }
    Ok(())
}
