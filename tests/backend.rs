//! End-to-end scenarios from the backend's testable-properties list:
//! build a small IL program, run it through [`cc_backend::generate`],
//! and assert on fragments of the emitted assembly text.

use cc_backend::il::{CallArgs, IlOp, LabelRef, Literal, LocalVar, VReg};
use cc_backend::{generate, KernelType};

fn gen(il: &[IlOp]) -> String {
    generate(il, KernelType::Linux).expect("generation should succeed")
}

#[test]
fn identity_function() {
    let il = vec![
        IlOp::FuncBegin { name: "f".into(), frame_size: 0 },
        IlOp::LoadArg { dst: VReg(1), index: 0 },
        IlOp::Return { left: VReg(1) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains("f:"));
    assert!(asm.contains("push rbp"));
    assert!(asm.contains("mov rax, rdi"));
    assert!(asm.contains("pop rbp"));
    assert!(asm.contains("ret"));
}

#[test]
fn add_two_integers() {
    let il = vec![
        IlOp::FuncBegin { name: "addtwo".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("3".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("4".into()) },
        IlOp::Add { dst: VReg(3), left: VReg(1), right: VReg(2) },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains(", 3"));
    assert!(asm.contains(", 4"));
    assert!(asm.lines().any(|l| l.trim_start().starts_with("add ")));
    assert!(asm.contains("ret"));
}

#[test]
fn division_returns_quotient_in_rax() {
    let il = vec![
        IlOp::FuncBegin { name: "divide".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("10".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("3".into()) },
        IlOp::Div { dst: VReg(3), left: VReg(1), right: VReg(2) },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains("mov rdx, 0"));
    assert!(asm.contains("idiv rcx"));
    // dst is rebound to rax *before* idiv runs (not after), so its
    // value is already correct as idiv's rax write lands -- no
    // further `mov rax, ...` should appear between idiv and the
    // epilogue to relocate the quotient.
    let idiv_pos = asm.find("idiv rcx").unwrap();
    let tail = &asm[idiv_pos..];
    assert!(tail.contains("pop rbp"));
    assert!(
        !tail.lines().skip(1).any(|l| l.trim_start().starts_with("mov rax")),
        "quotient must already be in rax; no relocating mov expected after idiv: {tail}"
    );
}

#[test]
fn multiplication_leaves_product_in_rax_without_a_relocating_move() {
    let il = vec![
        IlOp::FuncBegin { name: "times".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("6".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("7".into()) },
        IlOp::Mul { dst: VReg(3), left: VReg(1), right: VReg(2) },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    // Left must be spilled to preserve its value *before* imul
    // overwrites rax with the product -- otherwise a later pin of
    // dst into rax would wrongly flush the product into left's slot.
    let imul_pos = asm.find("imul ").unwrap();
    let head = &asm[..imul_pos];
    assert!(head.contains("mov [rip + L"), "left must be spilled before imul clobbers rax");

    let tail = &asm[imul_pos..];
    assert!(
        !tail.lines().skip(1).any(|l| l.trim_start().starts_with("mov rax")),
        "product must already be in rax; no relocating mov expected after imul: {tail}"
    );
}

#[test]
fn modulo_returns_remainder_in_rdx() {
    let il = vec![
        IlOp::FuncBegin { name: "modulo".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("10".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("3".into()) },
        IlOp::Mod { dst: VReg(3), left: VReg(1), right: VReg(2) },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains("mov rdx, 0"));
    assert!(asm.contains("idiv rcx"));
    // Return's pin of the remainder into rax must reload it from rdx.
    let idiv_pos = asm.find("idiv rcx").unwrap();
    let tail = &asm[idiv_pos..];
    assert!(tail.contains("mov rax, rdx"));
}

#[test]
fn shift_left_leaves_result_in_rax_without_a_relocating_move() {
    let il = vec![
        IlOp::FuncBegin { name: "shifter".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("1".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("4".into()) },
        IlOp::ShiftLeft { dst: VReg(3), left: VReg(1), right: VReg(2) },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.lines().any(|l| l.trim_start() == "SAL rax, cl"));
    // Left must be spilled to preserve its value *before* the shift
    // overwrites rax in place.
    let sal_pos = asm.find("SAL rax, cl").unwrap();
    let head = &asm[..sal_pos];
    assert!(head.contains("mov [rip + L"), "left must be spilled before SAL clobbers rax");

    let tail = &asm[sal_pos..];
    assert!(
        !tail.lines().skip(1).any(|l| l.trim_start().starts_with("mov rax")),
        "shifted result must already be in rax; no relocating mov expected: {tail}"
    );
}

#[test]
fn spill_under_pressure_materializes_a_data_slot() {
    let mut il = vec![IlOp::FuncBegin { name: "pressure".into(), frame_size: 0 }];
    for i in 1..=10u32 {
        il.push(IlOp::LoadImm { dst: VReg(i), value: Literal::Int(i.to_string()) });
    }
    il.push(IlOp::Add { dst: VReg(11), left: VReg(1), right: VReg(2) });
    il.push(IlOp::Return { left: VReg(11) });
    il.push(IlOp::FuncEnd);

    let asm = gen(&il);

    assert!(asm.contains("mov [rip + L"), "at least one vreg must have been spilled");
    assert!(asm.contains(".data"));
    assert!(asm.contains(": .quad 0"));
}

#[test]
fn call_with_two_arguments() {
    let il = vec![
        IlOp::FuncBegin { name: "caller".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("1".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("2".into()) },
        IlOp::Call {
            dst: VReg(3),
            call: CallArgs { callee: "g".into(), args: vec![VReg(1), VReg(2)] },
        },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains(".global g"));
    assert!(asm.contains("call g"));
    let call_pos = asm.find("call g").unwrap();
    let head = &asm[..call_pos];
    // The two argument producers must have ended up pinned to rdi/rsi
    // by the time the call is reached.
    assert!(head.contains("rdi"));
    assert!(head.contains("rsi"));
}

#[test]
fn call_decorates_symbol_on_darwin() {
    let il = vec![
        IlOp::FuncBegin { name: "caller".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("1".into()) },
        IlOp::Call { dst: VReg(2), call: CallArgs { callee: "g".into(), args: vec![VReg(1)] } },
        IlOp::Return { left: VReg(2) },
        IlOp::FuncEnd,
    ];
    let asm = generate(&il, KernelType::Darwin).unwrap();

    assert!(asm.contains(".global _g"));
    assert!(asm.contains("call _g"));
}

#[test]
fn if_zero_branch_spills_all_at_the_label() {
    let il = vec![
        IlOp::FuncBegin { name: "branchy".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("0".into()) },
        IlOp::JmpIfZero { left: VReg(1), label: LabelRef(5) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("42".into()) },
        IlOp::Label { label: LabelRef(5) },
        IlOp::Return { left: VReg(1) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains("je L5"));
    assert!(asm.contains("L5:"));
    let label_pos = asm.find("L5:").unwrap();
    let head = &asm[..label_pos];
    assert!(head.contains("mov [rip + L"), "spill_all must run before the label");
}

#[test]
fn local_var_roundtrip_uses_rbp_relative_addressing() {
    let il = vec![
        IlOp::FuncBegin { name: "locals".into(), frame_size: 16 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("7".into()) },
        IlOp::WriteLocalVar { var: LocalVar { slot: 1 }, right: VReg(1) },
        IlOp::ReadLocalVar { dst: VReg(2), var: LocalVar { slot: 1 } },
        IlOp::Return { left: VReg(2) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    assert!(asm.contains("mov [rbp - 8],"));
    assert!(asm.contains("[rbp - 8]"));
}

#[test]
fn malformed_il_without_func_begin_is_rejected() {
    let il = vec![IlOp::Return { left: VReg(1) }];
    assert!(generate(&il, KernelType::Linux).is_err());
}

#[test]
fn unclosed_function_is_rejected() {
    let il = vec![IlOp::FuncBegin { name: "f".into(), frame_size: 0 }];
    assert!(generate(&il, KernelType::Linux).is_err());
}

#[test]
fn load_imm_accepts_c_style_octal_and_hex_prefixes() {
    let il = vec![
        IlOp::FuncBegin { name: "lits".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("0x2a".into()) },
        IlOp::LoadImm { dst: VReg(2), value: Literal::Int("052".into()) },
        IlOp::Add { dst: VReg(3), left: VReg(1), right: VReg(2) },
        IlOp::Return { left: VReg(3) },
        IlOp::FuncEnd,
    ];
    let asm = gen(&il);

    // 0x2a == 42 decimal, 052 octal == 42 decimal.
    assert!(asm.contains(", 42"));
}

#[test]
fn load_imm_rejects_a_literal_with_trailing_garbage() {
    let il = vec![
        IlOp::FuncBegin { name: "badlit".into(), frame_size: 0 },
        IlOp::LoadImm { dst: VReg(1), value: Literal::Int("12abc".into()) },
        IlOp::Return { left: VReg(1) },
        IlOp::FuncEnd,
    ];
    assert!(generate(&il, KernelType::Linux).is_err());
}
