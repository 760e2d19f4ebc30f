//! `emberc`: the EmberScript compiler and runner CLI (spec §6.3).

mod commands;
mod frontend;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "emberc")]
#[command(about = "EmberScript compiler and runner")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile source to a precompiled module.
    Compile {
        /// Source files to compile; reads stdin when none are given.
        files: Vec<String>,
        /// Output path (default "a.ember").
        #[arg(short = 'o', long = "output")]
        output: Option<String>,
        /// Parse and compile only; don't write a module.
        #[arg(short = 'p')]
        parse_only: bool,
        /// Omit debug info (line numbers, local/upvalue names) from the
        /// written module.
        #[arg(long)]
        strip: bool,
        /// List bytecode after compiling (repeat for a more verbose listing).
        #[arg(short = 'l', long = "list", action = clap::ArgAction::Count)]
        list: u8,
    },

    /// Load and execute a source or precompiled file.
    Run {
        file: String,
        /// Print disassembly before running.
        #[arg(long)]
        dump: bool,
    },

    /// Print disassembly only, without executing.
    Disasm { file: String },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_env("EMBER_LOG").unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Compile { files, output, parse_only, strip, list } => {
            commands::compile::execute(files, output, parse_only, strip, list)
        }
        Commands::Run { file, dump } => commands::run::execute(file, dump),
        Commands::Disasm { file } => commands::disasm::execute(file),
    }
}
