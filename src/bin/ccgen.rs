//! Minimal host driver: reads an IL program as JSON, runs it through
//! [`cc_backend::generate`], and writes the resulting assembly.
//!
//! Everything this binary does -- argument parsing, reading the IL off
//! disk, choosing where the output goes -- sits outside the backend
//! itself (spec §1 Non-goals); the library has no file I/O of its own.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};

use cc_backend::{BackendError, IlOp, KernelType};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Kernel {
    Linux,
    Darwin,
}

impl From<Kernel> for KernelType {
    fn from(k: Kernel) -> Self {
        match k {
            Kernel::Linux => KernelType::Linux,
            Kernel::Darwin => KernelType::Darwin,
        }
    }
}

/// Lowers a JSON-encoded IL program to GNU-assembler text.
#[derive(Debug, Parser)]
#[command(name = "ccgen", about = "IL-to-x86-64 code generator")]
struct Args {
    /// Path to a JSON array of IL operations. Reads stdin if omitted.
    input: Option<PathBuf>,

    /// Target kernel, for symbol decoration.
    #[arg(long, value_enum, default_value_t = Kernel::Linux)]
    kernel: Kernel,

    /// Where to write the generated assembly. Writes stdout if omitted.
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = Args::parse();

    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ccgen: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), DriverError> {
    let raw = match &args.input {
        Some(path) => fs::read_to_string(path).map_err(|e| DriverError::Io(path.clone(), e))?,
        None => io::read_to_string(io::stdin()).map_err(|e| DriverError::Io(PathBuf::from("<stdin>"), e))?,
    };

    let il: Vec<IlOp> = serde_json::from_str(&raw).map_err(DriverError::Json)?;
    let asm = cc_backend::generate(&il, args.kernel.into()).map_err(DriverError::Backend)?;

    match &args.output {
        Some(path) => fs::write(path, asm).map_err(|e| DriverError::Io(path.clone(), e))?,
        None => io::stdout().write_all(asm.as_bytes()).map_err(|e| DriverError::Io(PathBuf::from("<stdout>"), e))?,
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum DriverError {
    #[error("{0:?}: {1}")]
    Io(PathBuf, #[source] io::Error),
    #[error("malformed IL json: {0}")]
    Json(#[source] serde_json::Error),
    #[error(transparent)]
    Backend(#[from] BackendError),
}
