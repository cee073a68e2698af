//! CLI tool for rendering template files.

use std::path::PathBuf;

use anyhow::{bail, Context as _, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use templet::{Context, FileLoader, ParserOptions, Value};

#[derive(Parser)]
#[command(name = "templet")]
#[command(author, version, about = "Render a template file", long_about = None)]
struct Args {
    /// Template file to render
    file: PathBuf,

    /// Model variable as name=value (repeatable)
    #[arg(long = "set", value_name = "NAME=VALUE")]
    set: Vec<String>,

    /// Loop iteration budget for the whole render
    #[arg(long, default_value_t = templet::DEFAULT_MAX_LOOP_ITERATIONS)]
    max_loops: u64,

    /// Maximum function/include nesting depth
    #[arg(long, default_value_t = templet::DEFAULT_MAX_RECURSION_DEPTH)]
    max_depth: usize,

    /// Drop the first newline after each statement tag
    #[arg(long)]
    trim_blocks: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let Some(name) = args.file.file_name().and_then(|n| n.to_str()) else {
        bail!("'{}' is not a template file", args.file.display());
    };
    let root = args
        .file
        .parent()
        .map(PathBuf::from)
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from("."));

    let mut entries = Vec::with_capacity(args.set.len());
    for pair in &args.set {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("--set expects NAME=VALUE, got '{}'", pair);
        };
        entries.push((key.trim().to_owned(), parse_value(value)));
    }

    let options = if args.trim_blocks {
        ParserOptions::trim_blocks()
    } else {
        ParserOptions::default()
    };
    let mut ctx = Context::builder()
        .loader(FileLoader::new(root))
        .parser_options(options)
        .max_loop_iterations(args.max_loops)
        .max_recursion_depth(args.max_depth)
        .build();

    let output = ctx
        .render_name(name, Value::map(entries))
        .with_context(|| format!("failed to render {}", args.file.display()))?;
    print!("{}", output);
    Ok(())
}

/// Numbers and booleans are typed; everything else is text.
fn parse_value(raw: &str) -> Value {
    if let Ok(n) = raw.parse::<i64>() {
        Value::Int(n)
    } else if let Ok(n) = raw.parse::<f64>() {
        Value::Float(n)
    } else if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else {
        Value::from(raw)
    }
}
