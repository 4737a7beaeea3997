//! The online, single-pass register allocator (spec §4.1).
//!
//! One [`RegisterAllocator`] is created for the whole translation
//! unit, but its per-vreg records, physical-register table, and
//! reference-order tick are reset at each `FuncBegin`
//! ([`RegisterAllocator::reset_for_function`]) rather than living as
//! module-level statics the way the original C implementation's
//! global arrays did — the design note in spec §9 calls this out
//! explicitly as the re-architecture to make. Only the spill-label
//! counter and the accumulated spill directory survive across
//! functions, matching spec §3's "Lifecycles".

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::error::{BackendError, Result};
use crate::il::VReg;

/// The 9 scratch registers, in allocation order. This order doubles
/// as the System V argument-register order starting at `Rdi` (spec
/// §6): `rax, rdi, rsi, rdx, rcx, r8, r9, r10, r11`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhysicalReg {
    Rax,
    Rdi,
    Rsi,
    Rdx,
    Rcx,
    R8,
    R9,
    R10,
    R11,
}

pub const NUM_SCRATCH_REGS: usize = 9;

pub const SCRATCH_ORDER: [PhysicalReg; NUM_SCRATCH_REGS] = [
    PhysicalReg::Rax,
    PhysicalReg::Rdi,
    PhysicalReg::Rsi,
    PhysicalReg::Rdx,
    PhysicalReg::Rcx,
    PhysicalReg::R8,
    PhysicalReg::R9,
    PhysicalReg::R10,
    PhysicalReg::R11,
];

impl PhysicalReg {
    pub fn name(self) -> &'static str {
        match self {
            PhysicalReg::Rax => "rax",
            PhysicalReg::Rdi => "rdi",
            PhysicalReg::Rsi => "rsi",
            PhysicalReg::Rdx => "rdx",
            PhysicalReg::Rcx => "rcx",
            PhysicalReg::R8 => "r8",
            PhysicalReg::R9 => "r9",
            PhysicalReg::R10 => "r10",
            PhysicalReg::R11 => "r11",
        }
    }

    fn index(self) -> usize {
        SCRATCH_ORDER.iter().position(|&r| r == self).expect("exhaustive")
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct VregRecord {
    current_physical: Option<PhysicalReg>,
    spill_label: Option<u32>,
}

pub struct RegisterAllocator {
    table: [Option<VReg>; NUM_SCRATCH_REGS],
    order: [u64; NUM_SCRATCH_REGS],
    tick: u64,
    records: HashMap<VReg, VregRecord>,

    next_label: u32,
    /// `(vreg, label)` pairs for which a memory slot has been
    /// materialized, in creation order. Accumulates across the whole
    /// translation unit and is rendered once, at the end, as the
    /// trailing `.data` section (spec §3, §6).
    spill_directory: Vec<(VReg, u32)>,
}

impl RegisterAllocator {
    pub fn new() -> Self {
        RegisterAllocator {
            table: [None; NUM_SCRATCH_REGS],
            order: [0; NUM_SCRATCH_REGS],
            tick: 0,
            records: HashMap::new(),
            next_label: 1,
            spill_directory: Vec::new(),
        }
    }

    /// Reset allocator state at a function boundary. The spill-label
    /// counter and directory are intentionally left untouched.
    pub fn reset_for_function(&mut self) {
        self.table = [None; NUM_SCRATCH_REGS];
        self.order = [0; NUM_SCRATCH_REGS];
        self.tick = 0;
        self.records.clear();
    }

    fn record_mut(&mut self, vreg: VReg) -> Result<&mut VregRecord> {
        if vreg.0 == 0 || vreg.0 > 127 {
            return Err(BackendError::VregOutOfRange(vreg.0));
        }
        Ok(self.records.entry(vreg).or_default())
    }

    fn touch(&mut self, phys: PhysicalReg) {
        self.tick += 1;
        self.order[phys.index()] = self.tick;
    }

    /// Ensures `vreg` is resident in some physical register, spilling
    /// and/or reloading as needed, and returns that register.
    pub fn request_any(&mut self, out: &mut String, vreg: VReg) -> Result<PhysicalReg> {
        if let Some(phys) = self.record_mut(vreg)?.current_physical {
            self.touch(phys);
            return Ok(phys);
        }

        let phys = self.find_free_register(out, vreg)?;
        let spill_label = self.record_mut(vreg)?.spill_label;
        if let Some(label) = spill_label {
            self.emit_reload(out, phys, label);
        }

        self.table[phys.index()] = Some(vreg);
        self.record_mut(vreg)?.current_physical = Some(phys);
        self.touch(phys);
        Ok(phys)
    }

    /// Ensures `vreg` resides in exactly `target`, evicting whatever
    /// currently occupies it.
    pub fn pin(&mut self, out: &mut String, vreg: VReg, target: PhysicalReg) -> Result<()> {
        if self.record_mut(vreg)?.current_physical == Some(target) {
            self.touch(target);
            return Ok(());
        }

        self.spill_physical(out, target);

        let current = self.record_mut(vreg)?.current_physical;
        let label = self.record_mut(vreg)?.spill_label;
        if let Some(other) = current {
            writeln!(out, "mov {}, {}", target.name(), other.name()).unwrap();
            self.table[other.index()] = None;
        } else if let Some(label) = label {
            self.emit_reload(out, target, label);
        }

        self.table[target.index()] = Some(vreg);
        self.record_mut(vreg)?.current_physical = Some(target);
        self.touch(target);
        Ok(())
    }

    /// Spills every currently resident vreg to its memory slot. Used
    /// before calls and at label boundaries (spec §4.2).
    pub fn spill_all(&mut self, out: &mut String) {
        for phys in SCRATCH_ORDER {
            self.spill_physical(out, phys);
        }
    }

    /// Spills whatever currently occupies `phys`, if anything. Used to
    /// preserve the data register across `imul`/`idiv`, which clobber
    /// it as a side effect rather than as a requested operand (spec
    /// §4.2 Multiplication, Division and modulo).
    pub fn spill_one(&mut self, out: &mut String, phys: PhysicalReg) {
        self.spill_physical(out, phys);
    }

    /// Hands out a fresh, globally unique label number, for jump
    /// targets the emitter itself introduces (the skip-over-data
    /// pattern around inline string literals) rather than ones named
    /// by the IL. Shares the same monotonic counter as spill labels,
    /// matching the reference generator's single `GetLabelNumber()`.
    pub fn fresh_label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    fn spill_physical(&mut self, out: &mut String, phys: PhysicalReg) {
        let Some(vreg) = self.table[phys.index()] else {
            return;
        };
        let label = self.get_or_create_label(vreg);
        writeln!(out, "mov [rip + L{}], {}", label, phys.name()).unwrap();
        self.table[phys.index()] = None;
        if let Some(record) = self.records.get_mut(&vreg) {
            record.current_physical = None;
        }
    }

    fn emit_reload(&self, out: &mut String, phys: PhysicalReg, label: u32) {
        writeln!(out, "mov {}, [rip + L{}]", phys.name(), label).unwrap();
    }

    fn get_or_create_label(&mut self, vreg: VReg) -> u32 {
        if let Some(label) = self.records.get(&vreg).and_then(|r| r.spill_label) {
            return label;
        }
        let label = self.next_label;
        self.next_label += 1;
        self.records.entry(vreg).or_default().spill_label = Some(label);
        self.spill_directory.push((vreg, label));
        label
    }

    fn find_free_register(&mut self, out: &mut String, requester: VReg) -> Result<PhysicalReg> {
        if let Some(phys) = self.first_free() {
            return Ok(phys);
        }

        let victim = self.select_spill_candidate()?;
        log::debug!(
            "spilling {:?} out of {} to admit {:?}",
            self.table[victim.index()],
            victim.name(),
            requester
        );
        self.spill_physical(out, victim);

        self.first_free().ok_or(BackendError::AllocatorExhausted)
    }

    fn first_free(&self) -> Option<PhysicalReg> {
        SCRATCH_ORDER
            .into_iter()
            .find(|phys| self.table[phys.index()].is_none())
    }

    /// LRU-with-admission-rule spill selection (spec §4.1): the first
    /// occupied register whose reference-order tick is at least
    /// [`NUM_SCRATCH_REGS`] behind the current tick. If the current
    /// IL op pins more registers simultaneously than the machine has,
    /// no candidate ever qualifies and allocation is a fatal error.
    fn select_spill_candidate(&self) -> Result<PhysicalReg> {
        let threshold = self.tick.saturating_sub(NUM_SCRATCH_REGS as u64);
        SCRATCH_ORDER
            .into_iter()
            .find(|phys| {
                self.table[phys.index()].is_some() && self.order[phys.index()] <= threshold
            })
            .ok_or(BackendError::AllocatorExhausted)
    }

    /// Renders the accumulated spill directory as a trailing `.data`
    /// section (spec §6).
    pub fn render_data_section(&self) -> String {
        let mut out = String::new();
        out.push_str(".data\n");
        for (_, label) in &self.spill_directory {
            writeln!(out, "L{}: .quad 0", label).unwrap();
        }
        out
    }

    #[cfg(test)]
    pub(crate) fn is_resident(&self, vreg: VReg, phys: PhysicalReg) -> bool {
        self.table[phys.index()] == Some(vreg)
            && self.records.get(&vreg).and_then(|r| r.current_physical) == Some(phys)
    }

    #[cfg(test)]
    pub(crate) fn spill_label_of(&self, vreg: VReg) -> Option<u32> {
        self.records.get(&vreg).and_then(|r| r.spill_label)
    }
}

impl Default for RegisterAllocator {
    fn default() -> Self {
        Self::new()
    }
}
