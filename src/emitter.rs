//! Walks the IL once, issuing allocator requests and emitting the
//! corresponding assembly text for each opcode (spec §4.2).

use std::fmt::Write as _;

use crate::abi::{self, KernelType};
use crate::error::{BackendError, Result};
use crate::il::{IlOp, Literal, VReg};
use crate::registers::{PhysicalReg, RegisterAllocator};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Emitting,
}

pub struct Emitter {
    kernel: KernelType,
    alloc: RegisterAllocator,
    state: State,
    text: String,
    globals: Vec<String>,
}

impl Emitter {
    pub fn new(kernel: KernelType) -> Self {
        Emitter {
            kernel,
            alloc: RegisterAllocator::new(),
            state: State::Idle,
            text: String::new(),
            globals: Vec::new(),
        }
    }

    /// Runs the whole pipeline over one IL program and returns the
    /// final assembly text, `.data` section included (spec §6).
    pub fn generate(mut self, il: &[IlOp]) -> Result<String> {
        // `.global` lines are emitted up front, one per function
        // symbol, ahead of any instruction text (spec §6).
        for op in il {
            if let IlOp::FuncBegin { name, .. } = op {
                self.declare_global(name);
            }
        }

        let mut out = String::new();
        out.push_str(".intel_syntax noprefix\n");
        for g in &self.globals {
            writeln!(out, "{}", g).unwrap();
        }

        for op in il {
            self.emit_op(op)?;
        }
        if self.state != State::Idle {
            return Err(BackendError::MalformedIl {
                opcode: "FuncEnd",
                expected: "a closing FuncEnd/Return for every FuncBegin",
            });
        }

        out.push_str(&self.text);
        out.push_str(&self.alloc.render_data_section());
        Ok(out)
    }

    fn declare_global(&mut self, symbol: &str) {
        let line = format!(".global {}", self.kernel.decorate(symbol));
        if !self.globals.contains(&line) {
            self.globals.push(line);
        }
    }

    fn emit_op(&mut self, op: &IlOp) -> Result<()> {
        match op {
            IlOp::FuncBegin { name, frame_size } => self.emit_func_begin(name, *frame_size)?,
            IlOp::FuncEnd => self.emit_func_end()?,

            IlOp::LoadArg { dst, index } => self.emit_load_arg(*dst, *index)?,
            IlOp::LoadImm { dst, value } => self.emit_load_imm(*dst, value)?,
            IlOp::LoadIdent { dst, ident } => self.emit_load_ident(*dst, ident)?,

            IlOp::Add { dst, left, right } => self.emit_arith("add", *dst, *left, *right)?,
            IlOp::Sub { dst, left, right } => self.emit_arith("sub", *dst, *left, *right)?,
            IlOp::And { dst, left, right } => self.emit_arith("and", *dst, *left, *right)?,
            IlOp::Or { dst, left, right } => self.emit_arith("or", *dst, *left, *right)?,
            IlOp::Xor { dst, left, right } => self.emit_arith("xor", *dst, *left, *right)?,

            IlOp::Mul { dst, left, right } => self.emit_mul(*dst, *left, *right)?,
            IlOp::Div { dst, left, right } => self.emit_divmod(*dst, *left, *right, abi::RETURN_REGISTER)?,
            IlOp::Mod { dst, left, right } => self.emit_divmod(*dst, *left, *right, abi::DATA_REGISTER)?,

            IlOp::ShiftLeft { dst, left, right } => self.emit_shift("SAL", *dst, *left, *right)?,
            IlOp::ShiftRight { dst, left, right } => self.emit_shift("SAR", *dst, *left, *right)?,

            IlOp::CmpG { dst, left, right } => self.emit_cmp("setg", *dst, *left, *right)?,
            IlOp::CmpGE { dst, left, right } => self.emit_cmp("setge", *dst, *left, *right)?,
            IlOp::CmpL { dst, left, right } => self.emit_cmp("setl", *dst, *left, *right)?,
            IlOp::CmpLE { dst, left, right } => self.emit_cmp("setle", *dst, *left, *right)?,
            IlOp::CmpE { dst, left, right } => self.emit_cmp("sete", *dst, *left, *right)?,
            IlOp::CmpNE { dst, left, right } => self.emit_cmp("setne", *dst, *left, *right)?,

            IlOp::SetLogicalValue { dst, left } => self.emit_set_logical_value(*dst, *left)?,
            IlOp::LogicalAnd { dst, left, right } => self.emit_logical("and", *dst, *left, *right)?,
            IlOp::LogicalOr { dst, left, right } => self.emit_logical("or", *dst, *left, *right)?,

            IlOp::WriteLocalVar { var, right } => self.emit_write_local(var.slot, *right)?,
            IlOp::ReadLocalVar { dst, var } => self.emit_read_local(*dst, var.slot)?,

            IlOp::Label { label } => self.emit_label(label.0)?,
            IlOp::JmpIfZero { left, label } => self.emit_conditional_jump("je", *left, label.0)?,
            IlOp::JmpIfNotZero { left, label } => self.emit_conditional_jump("jne", *left, label.0)?,

            IlOp::Return { left } => self.emit_return(*left)?,
            IlOp::Call { dst, call } => self.emit_call(*dst, call)?,
        }
        Ok(())
    }

    fn require_idle(&self, opcode: &'static str) -> Result<()> {
        if self.state != State::Idle {
            return Err(BackendError::MalformedIl {
                opcode,
                expected: "a FuncEnd/Return closing the current function first",
            });
        }
        Ok(())
    }

    fn require_emitting(&self, opcode: &'static str) -> Result<()> {
        if self.state != State::Emitting {
            return Err(BackendError::MalformedIl {
                opcode,
                expected: "a preceding FuncBegin",
            });
        }
        Ok(())
    }

    fn emit_func_begin(&mut self, name: &str, frame_size: i64) -> Result<()> {
        self.require_idle("FuncBegin")?;
        self.state = State::Emitting;
        self.alloc.reset_for_function();

        writeln!(self.text, "{}:", self.kernel.decorate(name)).unwrap();
        writeln!(self.text, "push rbp").unwrap();
        writeln!(self.text, "mov rbp, rsp").unwrap();
        writeln!(self.text, "mov rax, 0xf").unwrap();
        writeln!(self.text, "not rax").unwrap();
        writeln!(self.text, "sub rsp, {}", frame_size).unwrap();
        writeln!(self.text, "and rsp, rax").unwrap();
        Ok(())
    }

    fn emit_epilogue(&mut self) {
        writeln!(self.text, "mov rsp, rbp").unwrap();
        writeln!(self.text, "pop rbp").unwrap();
        writeln!(self.text, "ret").unwrap();
    }

    fn emit_func_end(&mut self) -> Result<()> {
        self.require_emitting("FuncEnd")?;
        self.emit_epilogue();
        self.state = State::Idle;
        Ok(())
    }

    fn emit_load_arg(&mut self, dst: VReg, index: u32) -> Result<()> {
        self.require_emitting("LoadArg")?;
        let phys = abi::arg_register(index + 1).ok_or(BackendError::UnsupportedOperand {
            opcode: "LoadArg",
            detail: format!("argument index {} exceeds the 6 integer argument registers", index),
        })?;
        self.alloc.pin(&mut self.text, dst, phys)?;
        Ok(())
    }

    fn emit_load_imm(&mut self, dst: VReg, value: &Literal) -> Result<()> {
        self.require_emitting("LoadImm")?;
        let phys = self.alloc.request_any(&mut self.text, dst)?;
        match value {
            Literal::Int(raw) => {
                let n = parse_c_integer_literal(raw)?;
                writeln!(self.text, "mov {}, {}", phys.name(), n).unwrap();
            }
            Literal::Str(s) => {
                let label_skip = self.alloc.fresh_label();
                let label_str = self.alloc.fresh_label();
                writeln!(self.text, "jmp L{}", label_skip).unwrap();
                writeln!(self.text, "L{}:", label_str).unwrap();
                writeln!(self.text, ".asciz \"{}\"", escape_asciz(s)).unwrap();
                writeln!(self.text, "L{}:", label_skip).unwrap();
                writeln!(self.text, "lea {}, [rip + L{}]", phys.name(), label_str).unwrap();
            }
        }
        Ok(())
    }

    fn emit_load_ident(&mut self, dst: VReg, ident: &str) -> Result<()> {
        self.require_emitting("LoadIdent")?;
        let phys = self.alloc.request_any(&mut self.text, dst)?;
        writeln!(self.text, "lea {}, [rip + {}]", phys.name(), self.kernel.decorate(ident)).unwrap();
        Ok(())
    }

    fn emit_arith(&mut self, mnemonic: &str, dst: VReg, left: VReg, right: VReg) -> Result<()> {
        self.require_emitting("arithmetic")?;
        let dst_p = self.alloc.request_any(&mut self.text, dst)?;
        let left_p = self.alloc.request_any(&mut self.text, left)?;
        let right_p = self.alloc.request_any(&mut self.text, right)?;
        writeln!(self.text, "{} {}, {}", mnemonic, left_p.name(), right_p.name()).unwrap();
        if dst_p != left_p {
            writeln!(self.text, "mov {}, {}", dst_p.name(), left_p.name()).unwrap();
        }
        Ok(())
    }

    fn emit_mul(&mut self, dst: VReg, left: VReg, right: VReg) -> Result<()> {
        self.require_emitting("Mul")?;
        // rdx:rax <- rax * r/m (spec §4.2: `imul` writes its high half
        // into rdx, so it must be preserved across the multiply).
        self.alloc.pin(&mut self.text, left, abi::RETURN_REGISTER)?;
        let right_p = self.alloc.request_any(&mut self.text, right)?;
        self.alloc.spill_one(&mut self.text, abi::DATA_REGISTER);
        // Rebind dst to rax now, before `imul` overwrites it: rax's
        // physical bits still hold left's value at this point, so the
        // spill this pin triggers correctly preserves left instead of
        // stomping its slot with imul's not-yet-computed product
        // (mirrors Div's ordering in generate.c:292-293).
        self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        writeln!(self.text, "imul {}", right_p.name()).unwrap();
        Ok(())
    }

    fn emit_divmod(&mut self, dst: VReg, left: VReg, right: VReg, dst_home: PhysicalReg) -> Result<()> {
        let opcode = if dst_home == abi::RETURN_REGISTER { "Div" } else { "Mod" };
        self.require_emitting(opcode)?;
        // rax <- rdx:rax / r/m, rdx <- rdx:rax % r/m.
        self.alloc.pin(&mut self.text, left, abi::RETURN_REGISTER)?;
        if dst_home == abi::RETURN_REGISTER {
            // Div's quotient lands back in rax, the register left just
            // occupied. Rebind dst there now, while rax's physical bits
            // still hold left's value, so the spill this pin triggers
            // preserves left instead of overwriting its slot with
            // idiv's not-yet-computed quotient (generate.c:292-293).
            self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        }
        self.alloc.pin(&mut self.text, right, abi::COUNT_REGISTER)?;
        self.alloc.spill_one(&mut self.text, abi::DATA_REGISTER);
        writeln!(self.text, "mov {}, 0", abi::DATA_REGISTER.name()).unwrap();
        writeln!(self.text, "idiv {}", abi::COUNT_REGISTER.name()).unwrap();
        if dst_home != abi::RETURN_REGISTER {
            // Mod's remainder lands in rdx, already spilled and freed
            // above, so binding dst there now is safe and emits
            // nothing extra.
            self.alloc.pin(&mut self.text, dst, dst_home)?;
        }
        Ok(())
    }

    fn emit_shift(&mut self, mnemonic: &str, dst: VReg, left: VReg, right: VReg) -> Result<()> {
        self.require_emitting("shift")?;
        self.alloc.pin(&mut self.text, left, abi::RETURN_REGISTER)?;
        self.alloc.pin(&mut self.text, right, abi::COUNT_REGISTER)?;
        // Rebind dst to rax now, before the shift overwrites it in
        // place -- the same hazard as Mul/Div above, and present in
        // generate.c's own shift arms too (dst bound to rax only
        // after `SAL`/`SAR` already ran).
        self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        writeln!(self.text, "{} {}, cl", mnemonic, abi::RETURN_REGISTER.name()).unwrap();
        Ok(())
    }

    fn emit_cmp(&mut self, set_mnemonic: &str, dst: VReg, left: VReg, right: VReg) -> Result<()> {
        self.require_emitting("comparison")?;
        self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        let left_p = self.alloc.request_any(&mut self.text, left)?;
        let right_p = self.alloc.request_any(&mut self.text, right)?;
        writeln!(self.text, "xor rax, rax").unwrap();
        writeln!(self.text, "cmp {}, {}", left_p.name(), right_p.name()).unwrap();
        writeln!(self.text, "{} al", set_mnemonic).unwrap();
        Ok(())
    }

    fn emit_set_logical_value(&mut self, dst: VReg, left: VReg) -> Result<()> {
        self.require_emitting("SetLogicalValue")?;
        self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        let left_p = self.alloc.request_any(&mut self.text, left)?;
        writeln!(self.text, "xor rax, rax").unwrap();
        writeln!(self.text, "cmp {}, 0", left_p.name()).unwrap();
        writeln!(self.text, "setne al").unwrap();
        Ok(())
    }

    /// `LogicalAnd`/`LogicalOr`: zero-test `dst`, then fold `left`,
    /// `right` with a bitwise reduction and report non-zero-ness.
    ///
    /// The reference generator's `LogicalAnd` arm emits a line with no
    /// mnemonic (`fprintf(fp, " %s, %s\n", left, right)`) -- a bug.
    /// This emits `and left, right` there instead, matching the shape
    /// `LogicalOr` already uses with `or` (spec §9 Open Question).
    fn emit_logical(&mut self, mnemonic: &str, dst: VReg, left: VReg, right: VReg) -> Result<()> {
        self.require_emitting("logical")?;
        self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        let left_p = self.alloc.request_any(&mut self.text, left)?;
        let right_p = self.alloc.request_any(&mut self.text, right)?;
        if mnemonic == "and" {
            writeln!(self.text, "cmp {}, 0", left_p.name()).unwrap();
            writeln!(self.text, "and {}, {}", left_p.name(), right_p.name()).unwrap();
        } else {
            writeln!(self.text, "xor rax, rax").unwrap();
            writeln!(self.text, "or {}, {}", left_p.name(), right_p.name()).unwrap();
        }
        writeln!(self.text, "setnz al").unwrap();
        Ok(())
    }

    fn emit_write_local(&mut self, slot: u32, right: VReg) -> Result<()> {
        self.require_emitting("WriteLocalVar")?;
        let right_p = self.alloc.request_any(&mut self.text, right)?;
        writeln!(self.text, "mov [rbp - {}], {}", 8 * slot, right_p.name()).unwrap();
        Ok(())
    }

    fn emit_read_local(&mut self, dst: VReg, slot: u32) -> Result<()> {
        self.require_emitting("ReadLocalVar")?;
        let dst_p = self.alloc.request_any(&mut self.text, dst)?;
        writeln!(self.text, "mov {}, [rbp - {}]", dst_p.name(), 8 * slot).unwrap();
        Ok(())
    }

    fn emit_label(&mut self, label: u32) -> Result<()> {
        self.require_emitting("Label")?;
        // Spilling everything at a label guarantees the allocator
        // state any jumping-in predecessor left behind is compatible
        // (spec §4.2).
        self.alloc.spill_all(&mut self.text);
        writeln!(self.text, "L{}:", label).unwrap();
        Ok(())
    }

    fn emit_conditional_jump(&mut self, mnemonic: &str, left: VReg, label: u32) -> Result<()> {
        self.require_emitting("conditional jump")?;
        let left_p = self.alloc.request_any(&mut self.text, left)?;
        writeln!(self.text, "cmp {}, 0", left_p.name()).unwrap();
        writeln!(self.text, "{} L{}", mnemonic, label).unwrap();
        Ok(())
    }

    fn emit_return(&mut self, left: VReg) -> Result<()> {
        self.require_emitting("Return")?;
        self.alloc.pin(&mut self.text, left, abi::RETURN_REGISTER)?;
        self.emit_epilogue();
        // `Return` does not close the function on its own: it may sit
        // ahead of other code with its own `FuncEnd`, and `generate.c`
        // emits the epilogue here without resetting any state. The
        // matching `FuncEnd` is what transitions back to `Idle`.
        Ok(())
    }

    fn emit_call(&mut self, dst: VReg, call: &crate::il::CallArgs) -> Result<()> {
        self.require_emitting("Call")?;
        if call.args.len() > abi::ARG_REGISTERS.len() {
            return Err(BackendError::UnsupportedOperand {
                opcode: "Call",
                detail: format!(
                    "{} arguments exceeds the {} integer argument registers",
                    call.args.len(),
                    abi::ARG_REGISTERS.len()
                ),
            });
        }
        for (i, arg_vreg) in call.args.iter().enumerate() {
            let phys = abi::ARG_REGISTERS[i];
            self.alloc.pin(&mut self.text, *arg_vreg, phys)?;
        }
        // Call targets are declared inline, at the call site, rather
        // than batched with the function-definition symbols up front
        // (spec §4.2 Call; mirrors the reference generator, which
        // only discovers callees while walking the IL).
        writeln!(self.text, ".global {}", self.kernel.decorate(&call.callee)).unwrap();
        self.alloc.spill_all(&mut self.text);
        writeln!(self.text, "call {}", self.kernel.decorate(&call.callee)).unwrap();
        self.alloc.pin(&mut self.text, dst, abi::RETURN_REGISTER)?;
        Ok(())
    }
}

fn escape_asciz(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Parses a `LoadImm` integer token the way `generate.c` parses
/// `val->token->str` with `strtol(s, &p, 0)`: an optional sign, then a
/// `0x`/`0X` hex literal, a `0`-prefixed octal literal, or a plain
/// decimal literal, with no trailing characters left over. Anything
/// else -- including an empty token -- is the same fatal
/// "not valid as integer" condition the reference generator raises.
fn parse_c_integer_literal(token: &str) -> Result<i64> {
    let invalid = || BackendError::InvalidLiteral(token.to_string());

    let (sign, unsigned) = match token.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, token),
    };
    if unsigned.is_empty() {
        return Err(invalid());
    }

    let (radix, digits) = if let Some(hex) = unsigned.strip_prefix("0x").or_else(|| unsigned.strip_prefix("0X")) {
        (16, hex)
    } else if unsigned.len() > 1 && unsigned.starts_with('0') {
        (8, &unsigned[1..])
    } else {
        (10, unsigned)
    };
    if digits.is_empty() {
        return Err(invalid());
    }

    i64::from_str_radix(digits, radix).map(|n| sign * n).map_err(|_| invalid())
}
