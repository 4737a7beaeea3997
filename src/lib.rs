//! x86-64 code-generation backend for a small C compiler: lowers a
//! flat three-address IL into Intel-syntax, GNU-assembler text using a
//! single-pass, online spilling register allocator (spec §1).
//!
//! This crate has no lexer, parser, or semantic analysis of its own —
//! it starts from already-built IL (see [`il`]) and ends at assembly
//! text. Everything upstream of IL construction and everything
//! downstream of text emission (writing the file, invoking `as`/`ld`)
//! is the host driver's job; see [`bin/ccgen.rs`](../src/bin/ccgen.rs)
//! for a minimal one.

pub mod abi;
pub mod emitter;
pub mod error;
pub mod il;
pub mod registers;

pub use abi::KernelType;
pub use error::{BackendError, Result};
pub use il::IlOp;

use emitter::Emitter;

/// Lowers a complete IL program to assembly text.
///
/// This is the single entry point the rest of the compiler calls
/// (spec §6): feed it the IL produced by earlier stages and the target
/// kernel for symbol decoration, get back the full `.text`/`.data`
/// assembly listing, or the first fatal error encountered.
pub fn generate(il: &[IlOp], kernel: KernelType) -> Result<String> {
    Emitter::new(kernel).generate(il)
}
