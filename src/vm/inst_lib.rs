//! Instruction Library - Opcode table shared by every virtual CPU
//!
//! The table is declared once, in opcode order. Each entry carries the
//! instruction name, its nop modifier (for the four nops) and the tunable
//! redundancy/cost/failure values applied from an [`InstSetConfig`].
//!
//! | Range  | Category        | Instructions                                  |
//! |--------|-----------------|-----------------------------------------------|
//! | 0-3    | Nops            | Nop-A..Nop-D (modifiers 0..3)                 |
//! | 4-19   | Value / Stack   | Val-*, Stack-Delete, Push-Next/Prev/Comp      |
//! | 20-25  | Memory          | Mem-Set, Mem-Mark, Divide, Inject, Inst-R/W   |
//! | 26-29  | Conditionals    | If-Equal, If-Not-Equal, If-Less, If-Greater   |
//! | 30-35  | Heads / Flow    | Head-Push/Pop/Move, Call, Return, Search      |
//! | 36-41  | Threads / IO    | IO, Thread-Set/Get, Send/Retrieve-Msg, Apop.  |
//! | 42     | Null            | NULL                                          |
//!
//! Build it once and share it as `Arc<InstLib>`; it has no mutable state.

use super::instruction::{Instruction, MAX_SYMBOLS};
use super::random::RandomStream;
use crate::config::InstSetConfig;
use crate::error::{EvoError, Result};
use std::collections::HashMap;
use std::fmt;

/// Number of nop instructions (label alphabet size)
pub const NUM_NOPS: usize = 4;

/// Closed opcode set, discriminant = opcode index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Opcode {
    NopA = 0,
    NopB,
    NopC,
    NopD,
    ValShift,
    ValNand,
    ValAdd,
    ValSub,
    ValNegate,
    ValMult,
    ValDiv,
    ValMod,
    ValInc,
    ValDec,
    ValCopy,
    ValDelete,
    StackDelete,
    PushNext,
    PushPrev,
    PushComp,
    MemSet,
    MemMark,
    Divide,
    Inject,
    InstRead,
    InstWrite,
    IfEqual,
    IfNotEqual,
    IfLess,
    IfGreater,
    HeadPush,
    HeadPop,
    HeadMove,
    Call,
    Return,
    Search,
    Io,
    ThreadSet,
    ThreadGet,
    SendMsg,
    RetrieveMsg,
    Apoptosis,
    Null,
}

/// Static declaration: (opcode, name, nop modifier)
const TABLE: &[(Opcode, &str, Option<u8>)] = &[
    (Opcode::NopA, "Nop-A", Some(0)),
    (Opcode::NopB, "Nop-B", Some(1)),
    (Opcode::NopC, "Nop-C", Some(2)),
    (Opcode::NopD, "Nop-D", Some(3)),
    (Opcode::ValShift, "Val-Shift", None),
    (Opcode::ValNand, "Val-Nand", None),
    (Opcode::ValAdd, "Val-Add", None),
    (Opcode::ValSub, "Val-Sub", None),
    (Opcode::ValNegate, "Val-Negate", None),
    (Opcode::ValMult, "Val-Mult", None),
    (Opcode::ValDiv, "Val-Div", None),
    (Opcode::ValMod, "Val-Mod", None),
    (Opcode::ValInc, "Val-Inc", None),
    (Opcode::ValDec, "Val-Dec", None),
    (Opcode::ValCopy, "Val-Copy", None),
    (Opcode::ValDelete, "Val-Delete", None),
    (Opcode::StackDelete, "Stack-Delete", None),
    (Opcode::PushNext, "Push-Next", None),
    (Opcode::PushPrev, "Push-Prev", None),
    (Opcode::PushComp, "Push-Comp", None),
    (Opcode::MemSet, "Mem-Set", None),
    (Opcode::MemMark, "Mem-Mark", None),
    (Opcode::Divide, "Divide", None),
    (Opcode::Inject, "Inject", None),
    (Opcode::InstRead, "Inst-Read", None),
    (Opcode::InstWrite, "Inst-Write", None),
    (Opcode::IfEqual, "If-Equal", None),
    (Opcode::IfNotEqual, "If-Not-Equal", None),
    (Opcode::IfLess, "If-Less", None),
    (Opcode::IfGreater, "If-Greater", None),
    (Opcode::HeadPush, "Head-Push", None),
    (Opcode::HeadPop, "Head-Pop", None),
    (Opcode::HeadMove, "Head-Move", None),
    (Opcode::Call, "Call", None),
    (Opcode::Return, "Return", None),
    (Opcode::Search, "Search", None),
    (Opcode::Io, "IO", None),
    (Opcode::ThreadSet, "Thread-Set", None),
    (Opcode::ThreadGet, "Thread-Get", None),
    (Opcode::SendMsg, "Send-Msg", None),
    (Opcode::RetrieveMsg, "Retrieve-Msg", None),
    (Opcode::Apoptosis, "Apoptosis", None),
    (Opcode::Null, "NULL", None),
];

impl Opcode {
    /// Decode a raw opcode index
    pub fn from_u8(op: u8) -> Option<Self> {
        TABLE.get(op as usize).map(|(opcode, _, _)| *opcode)
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn inst(self) -> Instruction {
        Instruction(self as u8)
    }

    pub fn name(self) -> &'static str {
        TABLE[self as usize].1
    }

    pub const fn is_nop(self) -> bool {
        matches!(self, Self::NopA | Self::NopB | Self::NopC | Self::NopD)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Resolved library entry
#[derive(Debug, Clone, PartialEq)]
pub struct InstInfo {
    pub opcode: Opcode,
    pub name: &'static str,
    pub nop_mod: Option<u8>,
    pub redundancy: u32,
    pub cost: u32,
    pub prob_fail: f64,
}

/// Immutable instruction library
#[derive(Debug, Clone)]
pub struct InstLib {
    entries: Vec<InstInfo>,
    by_name: HashMap<&'static str, u8>,
    total_redundancy: u64,
}

impl InstLib {
    /// Standard library: every instruction redundancy 1 (NULL 0), cost 1
    pub fn standard() -> Self {
        let entries: Vec<InstInfo> = TABLE
            .iter()
            .map(|&(opcode, name, nop_mod)| InstInfo {
                opcode,
                name,
                nop_mod,
                redundancy: if opcode == Opcode::Null { 0 } else { 1 },
                cost: 1,
                prob_fail: 0.0,
            })
            .collect();
        let by_name = entries.iter().map(|e| (e.name, e.opcode.as_u8())).collect();
        let mut lib = Self { entries, by_name, total_redundancy: 0 };
        lib.recount();
        lib
    }

    /// Standard library with per-instruction overrides applied
    pub fn with_overrides(config: &InstSetConfig) -> Result<Self> {
        let mut lib = Self::standard();
        for (name, over) in &config.overrides {
            let op = lib.op_for_name(name)?;
            let entry = &mut lib.entries[op as usize];
            entry.redundancy = over.redundancy;
            entry.cost = over.cost.max(1);
            entry.prob_fail = over.prob_fail.clamp(0.0, 1.0);
        }
        lib.recount();
        debug_assert!(lib.entries.len() <= MAX_SYMBOLS);
        Ok(lib)
    }

    fn recount(&mut self) {
        self.total_redundancy = self.entries.iter().map(|e| e.redundancy as u64).sum();
    }

    fn op_for_name(&self, name: &str) -> Result<u8> {
        self.by_name
            .get(name)
            .copied()
            .or_else(|| {
                self.entries
                    .iter()
                    .position(|e| e.name.eq_ignore_ascii_case(name))
                    .map(|idx| idx as u8)
            })
            .ok_or_else(|| EvoError::UnknownInstruction(name.to_string()))
    }

    /// Number of instructions (valid opcodes are `0..size()`)
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn info(&self, inst: Instruction) -> Option<&InstInfo> {
        self.entries.get(inst.op() as usize)
    }

    /// Decoded opcode; out-of-range values decode as NULL
    pub fn opcode(&self, inst: Instruction) -> Opcode {
        self.info(inst).map(|e| e.opcode).unwrap_or(Opcode::Null)
    }

    pub fn name(&self, inst: Instruction) -> &'static str {
        self.info(inst).map(|e| e.name).unwrap_or("NULL")
    }

    pub fn inst_for_name(&self, name: &str) -> Result<Instruction> {
        self.op_for_name(name).map(Instruction)
    }

    pub fn is_nop(&self, inst: Instruction) -> bool {
        self.nop_mod(inst).is_some()
    }

    pub fn nop_mod(&self, inst: Instruction) -> Option<u8> {
        self.info(inst).and_then(|e| e.nop_mod)
    }

    pub fn cost(&self, inst: Instruction) -> u32 {
        self.info(inst).map(|e| e.cost).unwrap_or(1)
    }

    pub fn prob_fail(&self, inst: Instruction) -> f64 {
        self.info(inst).map(|e| e.prob_fail).unwrap_or(0.0)
    }

    /// Instruction that fills newly allocated space
    pub fn default_inst(&self) -> Instruction {
        Opcode::NopA.inst()
    }

    pub fn null_inst(&self) -> Instruction {
        Opcode::Null.inst()
    }

    /// Draw an instruction weighted by redundancy (one draw)
    pub fn random_inst(&self, rng: &mut RandomStream) -> Instruction {
        if self.total_redundancy == 0 {
            let _ = rng.uint(self.size());
            return self.default_inst();
        }
        let mut pick = rng.uint(self.total_redundancy as usize) as u64;
        for (op, entry) in self.entries.iter().enumerate() {
            let weight = entry.redundancy as u64;
            if pick < weight {
                return Instruction(op as u8);
            }
            pick -= weight;
        }
        self.default_inst()
    }
}

impl Default for InstLib {
    fn default() -> Self {
        Self::standard()
    }
}
