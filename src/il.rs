//! The IL this backend consumes: a flat list of three-address
//! operations over virtual registers, built upstream by the IL
//! construction stage (out of scope here, see spec §1).

use serde::{Deserialize, Serialize};

/// A virtual register id. Valid ids are `1..=127` (spec §3); `0` never
/// names a vreg and is rejected by the allocator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VReg(pub u32);

/// A pre-assigned jump-target label. Labels are plain numbers handed
/// out by the IL builder before the IL reaches this crate, so a
/// forward and a backward reference to the same control point already
/// share the same id (spec §3 "Label", §9 re-architecture note).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LabelRef(pub u32);

/// A 1-based local-variable stack slot; its address is `[rbp - 8*n]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalVar {
    pub slot: u32,
}

/// The payload of a `LoadImm`. `Int` carries the constant's raw source
/// token rather than an already-parsed value: spec §4.2 makes parsing
/// it (decimal, `0`-octal, `0x`-hex) the emitter's job, mirroring
/// `generate.c`'s `strtol(s, &p, 0)` over the token text rather than a
/// pre-resolved integer handed down from IL construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Int(String),
    Str(String),
}

/// The payload of a `Call`: the callee's name and the already-defined
/// vregs holding the argument values, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArgs {
    pub callee: String,
    pub args: Vec<VReg>,
}

/// One IL operation. Modeled as a sum type with per-variant payloads
/// (spec §9 design note) rather than a generic three-operand-plus-
/// opaque-AST-node record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IlOp {
    FuncBegin { name: String, frame_size: i64 },
    FuncEnd,

    LoadArg { dst: VReg, index: u32 },
    LoadImm { dst: VReg, value: Literal },
    LoadIdent { dst: VReg, ident: String },

    Add { dst: VReg, left: VReg, right: VReg },
    Sub { dst: VReg, left: VReg, right: VReg },
    And { dst: VReg, left: VReg, right: VReg },
    Or { dst: VReg, left: VReg, right: VReg },
    Xor { dst: VReg, left: VReg, right: VReg },

    Mul { dst: VReg, left: VReg, right: VReg },
    Div { dst: VReg, left: VReg, right: VReg },
    Mod { dst: VReg, left: VReg, right: VReg },

    ShiftLeft { dst: VReg, left: VReg, right: VReg },
    ShiftRight { dst: VReg, left: VReg, right: VReg },

    CmpG { dst: VReg, left: VReg, right: VReg },
    CmpGE { dst: VReg, left: VReg, right: VReg },
    CmpL { dst: VReg, left: VReg, right: VReg },
    CmpLE { dst: VReg, left: VReg, right: VReg },
    CmpE { dst: VReg, left: VReg, right: VReg },
    CmpNE { dst: VReg, left: VReg, right: VReg },

    SetLogicalValue { dst: VReg, left: VReg },
    LogicalAnd { dst: VReg, left: VReg, right: VReg },
    LogicalOr { dst: VReg, left: VReg, right: VReg },

    WriteLocalVar { var: LocalVar, right: VReg },
    ReadLocalVar { dst: VReg, var: LocalVar },

    Label { label: LabelRef },
    JmpIfZero { left: VReg, label: LabelRef },
    JmpIfNotZero { left: VReg, label: LabelRef },

    Return { left: VReg },
    Call { dst: VReg, call: CallArgs },
}

impl IlOp {
    /// The opcode's symbolic name, used in diagnostics (spec §7).
    pub fn name(&self) -> &'static str {
        match self {
            IlOp::FuncBegin { .. } => "FuncBegin",
            IlOp::FuncEnd => "FuncEnd",
            IlOp::LoadArg { .. } => "LoadArg",
            IlOp::LoadImm { .. } => "LoadImm",
            IlOp::LoadIdent { .. } => "LoadIdent",
            IlOp::Add { .. } => "Add",
            IlOp::Sub { .. } => "Sub",
            IlOp::And { .. } => "And",
            IlOp::Or { .. } => "Or",
            IlOp::Xor { .. } => "Xor",
            IlOp::Mul { .. } => "Mul",
            IlOp::Div { .. } => "Div",
            IlOp::Mod { .. } => "Mod",
            IlOp::ShiftLeft { .. } => "ShiftLeft",
            IlOp::ShiftRight { .. } => "ShiftRight",
            IlOp::CmpG { .. } => "CmpG",
            IlOp::CmpGE { .. } => "CmpGE",
            IlOp::CmpL { .. } => "CmpL",
            IlOp::CmpLE { .. } => "CmpLE",
            IlOp::CmpE { .. } => "CmpE",
            IlOp::CmpNE { .. } => "CmpNE",
            IlOp::SetLogicalValue { .. } => "SetLogicalValue",
            IlOp::LogicalAnd { .. } => "LogicalAnd",
            IlOp::LogicalOr { .. } => "LogicalOr",
            IlOp::WriteLocalVar { .. } => "WriteLocalVar",
            IlOp::ReadLocalVar { .. } => "ReadLocalVar",
            IlOp::Label { .. } => "Label",
            IlOp::JmpIfZero { .. } => "JmpIfZero",
            IlOp::JmpIfNotZero { .. } => "JmpIfNotZero",
            IlOp::Return { .. } => "Return",
            IlOp::Call { .. } => "Call",
        }
    }
}
