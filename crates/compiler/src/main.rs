//! Opal Compiler CLI
//!
//! Compiles a `.opal` source file to LLVM textual IR:
//!
//! ```text
//! opalc program.opal                 # writes program.ll
//! opalc program.opal -o out.ll       # explicit output path
//! opalc program.opal -v              # verbose pipeline tracing
//! ```
//!
//! Exit code 0 on success, 1 on any pipeline failure.

use clap::Parser as ClapParser;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::EnvFilter;

#[derive(ClapParser)]
#[command(name = "opalc")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Opal compiler - compile .opal programs to LLVM IR", long_about = None)]
struct Cli {
    /// Input .opal source file
    input: PathBuf,

    /// Output LLVM IR path (defaults to the input with an .ll extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Verbose mode (show compilation steps)
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let output = cli
        .output
        .unwrap_or_else(|| cli.input.with_extension("ll"));

    if let Err(e) = opalc::compile_file(&cli.input, &output) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}
