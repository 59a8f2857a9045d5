//! Opal Compiler Library
//!
//! Compiles `.opal` source to LLVM textual IR. The pipeline is a simple
//! sequential chain with error propagation at each phase:
//!
//! ```text
//! source → parse → analyze → codegen → .ll text
//! ```
//!
//! Compiled modules call into the Opal runtime (`opal-runtime`, built as
//! a static library) for every value operation; this crate only ever
//! produces text.

pub mod ast;
pub mod codegen;
pub mod config;
pub mod parser;
pub mod semantic;

pub use ast::{Program, Type};
pub use codegen::{CodeGen, CodeGenError, RUNTIME_DECLARATIONS, default_target_triple};
pub use config::{CompilerConfig, ConfigError};
pub use parser::{ParseError, Parser};
pub use semantic::{SemanticError, analyze};

use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// A failure anywhere in the compile pipeline.
#[derive(Debug)]
pub enum CompileError {
    Read(PathBuf, std::io::Error),
    Write(PathBuf, std::io::Error),
    Config(ConfigError),
    Parse(ParseError),
    Semantic(SemanticError),
    Codegen(CodeGenError),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Read(path, e) => write!(f, "cannot read '{}': {e}", path.display()),
            CompileError::Write(path, e) => write!(f, "cannot write '{}': {e}", path.display()),
            CompileError::Config(e) => write!(f, "{e}"),
            CompileError::Parse(e) => write!(f, "parse error: {e}"),
            CompileError::Semantic(e) => write!(f, "semantic error: {e}"),
            CompileError::Codegen(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for CompileError {}

impl From<ParseError> for CompileError {
    fn from(e: ParseError) -> Self {
        CompileError::Parse(e)
    }
}

impl From<SemanticError> for CompileError {
    fn from(e: SemanticError) -> Self {
        CompileError::Semantic(e)
    }
}

impl From<CodeGenError> for CompileError {
    fn from(e: CodeGenError) -> Self {
        CompileError::Codegen(e)
    }
}

impl From<ConfigError> for CompileError {
    fn from(e: ConfigError) -> Self {
        CompileError::Config(e)
    }
}

/// Compile source text to LLVM IR.
pub fn compile_source(source: &str, config: &CompilerConfig) -> Result<String, CompileError> {
    debug!("parsing");
    let program = Parser::new(source)?.parse()?;
    debug!(functions = program.functions.len(), "parsed");

    debug!("analyzing");
    analyze(&program)?;

    debug!("generating IR");
    let ir = CodeGen::new(config.target_triple(), config.build.emit_comments)
        .generate(&program)?;
    debug!(bytes = ir.len(), "generated");
    Ok(ir)
}

/// Compile a source file to an `.ll` file, discovering `opal.toml`
/// beside the input.
pub fn compile_file(input: &Path, output: &Path) -> Result<(), CompileError> {
    let config = CompilerConfig::discover(input)?;
    compile_file_with_config(input, output, &config)
}

pub fn compile_file_with_config(
    input: &Path,
    output: &Path,
    config: &CompilerConfig,
) -> Result<(), CompileError> {
    debug!(input = %input.display(), "reading source");
    let source =
        std::fs::read_to_string(input).map_err(|e| CompileError::Read(input.to_path_buf(), e))?;

    let ir = compile_source(&source, config)?;

    debug!(output = %output.display(), "writing IR");
    std::fs::write(output, ir).map_err(|e| CompileError::Write(output.to_path_buf(), e))
}
