//! System V AMD64 calling-convention constants.
//!
//! Reduced from the teacher's `CABIHandler`/`X86_64ABIHandler` to the
//! subset this backend actually needs: there is no struct-layout
//! cache and no red-zone handling here, because every frame this
//! backend builds reserves its own space with `sub rsp, N` and
//! realigns explicitly (spec §4.2) rather than relying on the red
//! zone.

use crate::registers::PhysicalReg;

/// Target OS, selecting symbol-name prefixing (spec §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelType {
    Linux,
    Darwin,
}

impl KernelType {
    /// Leading underscore required by the Mach-O ABI on Darwin.
    pub fn symbol_prefix(self) -> &'static str {
        match self {
            KernelType::Linux => "",
            KernelType::Darwin => "_",
        }
    }

    pub fn decorate<'a>(self, symbol: &'a str) -> String {
        format!("{}{}", self.symbol_prefix(), symbol)
    }
}

/// 1-based System V integer argument registers, in order.
pub const ARG_REGISTERS: [PhysicalReg; 6] = [
    PhysicalReg::Rdi,
    PhysicalReg::Rsi,
    PhysicalReg::Rdx,
    PhysicalReg::Rcx,
    PhysicalReg::R8,
    PhysicalReg::R9,
];

/// The register that receives the i-th (1-based) argument or call
/// argument. Mirrors `generate.c`'s `REAL_REG_RAX + i` scheme, adapted
/// to this crate's explicit register enum.
pub fn arg_register(index_one_based: u32) -> Option<PhysicalReg> {
    let idx = index_one_based.checked_sub(1)?;
    ARG_REGISTERS.get(idx as usize).copied()
}

/// The register a function return value is placed in.
pub const RETURN_REGISTER: PhysicalReg = PhysicalReg::Rax;

/// The register used as the dividend's high half / multiplication's
/// high half, and the modulo result register.
pub const DATA_REGISTER: PhysicalReg = PhysicalReg::Rdx;

/// The register `idiv`/shift instructions draw their count/divisor
/// from.
pub const COUNT_REGISTER: PhysicalReg = PhysicalReg::Rcx;

/// Mask applied to realign the stack pointer after reserving frame
/// space, matching `generate.c`'s `mov rax, 0xf; not rax; and rsp,
/// rax` sequence (i.e. `rsp &= !0xf`).
pub const STACK_ALIGN_MASK: i64 = !0xf;
