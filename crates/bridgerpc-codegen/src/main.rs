//! protoc-gen-bridgerpc - protoc plugin entry point
//!
//! Invoked by `protoc --bridgerpc_out=<targets>:<dir>`. Reads an encoded
//! `CodeGeneratorRequest` from stdin and writes the encoded
//! `CodeGeneratorResponse` to stdout. Logs go to stderr; set
//! `BRIDGERPC_LOG=debug` for per-file detail.

use anyhow::Context;
use bridgerpc_codegen::{GeneratorOptions, RendererRegistry, logging, run};
use clap::Parser;
use std::fs::File;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "protoc-gen-bridgerpc")]
#[command(author, version, about = "protoc plugin for bridge RPC stubs", long_about = None)]
struct Cli {
    /// Read the encoded request from a file instead of stdin
    #[arg(long, value_name = "PATH")]
    request: Option<PathBuf>,

    /// List the accepted parameter tokens and exit
    #[arg(long)]
    targets: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init_logging();

    if cli.targets {
        for token in GeneratorOptions::known_tokens() {
            println!("{token}");
        }
        return Ok(());
    }

    let registry = RendererRegistry::builtin().context("failed to load stub templates")?;
    let stdout = io::stdout().lock();

    match cli.request {
        Some(path) => {
            let input = File::open(&path)
                .with_context(|| format!("failed to open request file {}", path.display()))?;
            run(input, stdout, &registry)
        }
        None => run(io::stdin().lock(), stdout, &registry),
    }
    .context("failed to generate stubs")
}
