//! Memory - Instruction buffers and per-site flags
//!
//! ## Site flags (8 bits)
//!
//! ```text
//! [RESERVED:2][BREAKPOINT:1][INJECTED:1][EXECUTED:1][POINT_MUT:1][COPY_MUT:1][COPIED:1]
//! ```
//!
//! Space 0 is the running genome. Further spaces are allocated on demand
//! (label lookup, parasite install) and always hold at least one site, so a
//! wrapped head position is always dereferenceable.

use super::head::Head;
use super::instruction::{Genome, Instruction};

/// Per-site flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SiteFlags(pub u8);

impl SiteFlags {
    /// Written by Inst-Write
    pub const COPIED: u8 = 0b0000_0001;
    /// Value came from a copy mutation
    pub const COPY_MUT: u8 = 0b0000_0010;
    /// Point mutation applied in place
    pub const POINT_MUT: u8 = 0b0000_0100;
    /// Executed at least once
    pub const EXECUTED: u8 = 0b0000_1000;
    /// Installed by parasite injection
    pub const INJECTED: u8 = 0b0001_0000;
    /// Fetching this site signals a breakpoint
    pub const BREAKPOINT: u8 = 0b0010_0000;

    pub fn has(self, flag: u8) -> bool {
        (self.0 & flag) != 0
    }

    pub fn set(&mut self, flag: u8) {
        self.0 |= flag;
    }

    pub fn clear(&mut self, flag: u8) {
        self.0 &= !flag;
    }

    pub fn copied(self) -> bool {
        self.has(Self::COPIED)
    }

    pub fn executed(self) -> bool {
        self.has(Self::EXECUTED)
    }

    pub fn breakpoint(self) -> bool {
        self.has(Self::BREAKPOINT)
    }
}

/// One growable instruction buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemorySpace {
    insts: Vec<Instruction>,
    flags: Vec<SiteFlags>,
}

impl MemorySpace {
    /// Space holding `genome` with clear flags; empty input gets a placeholder
    pub fn from_genome(genome: &Genome, placeholder: Instruction) -> Self {
        if genome.is_empty() {
            return Self::placeholder(placeholder);
        }
        Self {
            insts: genome.as_slice().to_vec(),
            flags: vec![SiteFlags::default(); genome.len()],
        }
    }

    /// Single-site space
    pub fn placeholder(inst: Instruction) -> Self {
        Self { insts: vec![inst], flags: vec![SiteFlags::default()] }
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    /// Wrap a (possibly negative or oversized) position into range
    pub fn wrap(&self, pos: i32) -> usize {
        let len = self.insts.len().max(1) as i64;
        (pos as i64).rem_euclid(len) as usize
    }

    pub fn inst(&self, pos: usize) -> Instruction {
        self.insts.get(pos).copied().unwrap_or_default()
    }

    pub fn set_inst(&mut self, pos: usize, inst: Instruction) {
        if let Some(slot) = self.insts.get_mut(pos) {
            *slot = inst;
        }
    }

    pub fn flags(&self, pos: usize) -> SiteFlags {
        self.flags.get(pos).copied().unwrap_or_default()
    }

    pub fn set_flag(&mut self, pos: usize, flag: u8) {
        if let Some(f) = self.flags.get_mut(pos) {
            f.set(flag);
        }
    }

    pub fn clear_flag(&mut self, pos: usize, flag: u8) {
        if let Some(f) = self.flags.get_mut(pos) {
            f.clear(flag);
        }
    }

    /// Append one site duplicating the current last site (instruction and flags)
    pub fn grow_one(&mut self) {
        let inst = self.insts.last().copied().unwrap_or_default();
        let flags = self.flags.last().copied().unwrap_or_default();
        self.insts.push(inst);
        self.flags.push(flags);
    }

    /// Shrink to `len` sites (never below one)
    pub fn truncate(&mut self, len: usize) {
        let len = len.max(1);
        self.insts.truncate(len);
        self.flags.truncate(len);
    }

    pub fn insert(&mut self, pos: usize, inst: Instruction) {
        let pos = pos.min(self.insts.len());
        self.insts.insert(pos, inst);
        self.flags.insert(pos, SiteFlags::default());
    }

    pub fn remove(&mut self, pos: usize) {
        if pos < self.insts.len() && self.insts.len() > 1 {
            self.insts.remove(pos);
            self.flags.remove(pos);
        }
    }

    /// Number of sites in `0..len` carrying `flag`
    pub fn count_flag(&self, len: usize, flag: u8) -> usize {
        self.flags.iter().take(len).filter(|f| f.has(flag)).count()
    }

    /// Mark every site with `flag`
    pub fn flag_all(&mut self, flag: u8) {
        for f in &mut self.flags {
            f.set(flag);
        }
    }

    /// Replace contents by `genome`, clearing flags
    pub fn load(&mut self, genome: &Genome, placeholder: Instruction) {
        *self = Self::from_genome(genome, placeholder);
    }

    pub fn reclaim(&mut self, placeholder: Instruction) {
        *self = Self::placeholder(placeholder);
    }

    pub fn to_genome(&self) -> Genome {
        Genome::new(self.insts.clone())
    }

    pub fn insts(&self) -> &[Instruction] {
        &self.insts
    }
}

/// Arena of memory spaces; heads refer into it by index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryArray {
    spaces: Vec<MemorySpace>,
    marks: Vec<bool>,
}

impl MemoryArray {
    pub fn new(genome: &Genome, placeholder: Instruction) -> Self {
        Self {
            spaces: vec![MemorySpace::from_genome(genome, placeholder)],
            marks: vec![false],
        }
    }

    /// Number of spaces (always at least one)
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Allocate a placeholder space, returning its index
    pub fn allocate(&mut self, placeholder: Instruction) -> usize {
        self.spaces.push(MemorySpace::placeholder(placeholder));
        self.marks.push(false);
        self.spaces.len() - 1
    }

    /// Drop every space but the genome
    pub fn truncate_to_genome(&mut self) {
        self.spaces.truncate(1);
        self.marks.truncate(1);
        self.marks[0] = false;
    }

    pub fn space(&self, idx: usize) -> Option<&MemorySpace> {
        self.spaces.get(idx)
    }

    pub fn space_mut(&mut self, idx: usize) -> Option<&mut MemorySpace> {
        self.spaces.get_mut(idx)
    }

    pub fn genome(&self) -> &MemorySpace {
        &self.spaces[0]
    }

    pub fn genome_mut(&mut self) -> &mut MemorySpace {
        &mut self.spaces[0]
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemorySpace> {
        self.spaces.iter()
    }

    pub fn is_marked(&self, idx: usize) -> bool {
        self.marks.get(idx).copied().unwrap_or(false)
    }

    pub fn toggle_mark(&mut self, idx: usize) {
        if let Some(m) = self.marks.get_mut(idx) {
            *m = !*m;
        }
    }

    /// Resolve a head to a valid (space, position) pair
    pub fn locate(&self, head: &Head) -> (usize, usize) {
        let space = head.space % self.spaces.len();
        (space, self.spaces[space].wrap(head.pos))
    }

    /// Instruction under a head (position wrapped)
    pub fn inst_at(&self, head: &Head) -> Instruction {
        let (space, pos) = self.locate(head);
        self.spaces[space].inst(pos)
    }

    /// Flags under a head (position wrapped)
    pub fn flags_at(&self, head: &Head) -> SiteFlags {
        let (space, pos) = self.locate(head);
        self.spaces[space].flags(pos)
    }

    pub fn set_flag_at(&mut self, head: &Head, flag: u8) {
        let (space, pos) = self.locate(head);
        self.spaces[space].set_flag(pos, flag);
    }

    pub fn clear_flag_at(&mut self, head: &Head, flag: u8) {
        let (space, pos) = self.locate(head);
        self.spaces[space].clear_flag(pos, flag);
    }

    pub fn set_inst_at(&mut self, head: &Head, inst: Instruction) {
        let (space, pos) = self.locate(head);
        self.spaces[space].set_inst(pos, inst);
    }
}
