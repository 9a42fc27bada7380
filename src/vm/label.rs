//! Label - Runs of nops used as addresses
//!
//! A label is the modifier sequence of consecutive nop instructions
//! (`Nop-A Nop-C` → `[0, 2]`). Search matches a label anywhere inside a
//! longer nop run, so short labels may nest inside decorative ones:
//!
//! ```text
//! label [1, 2]      memory  ... Div  Nop-A Nop-B Nop-C Nop-D  Add ...
//!                                    └──── run ─────────┘
//!                                          └ match ┘ → returns index after Nop-C
//! ```

use super::inst_lib::InstLib;
use super::instruction::Instruction;
use std::fmt;

/// Longest label the hardware will read
pub const MAX_LABEL_SIZE: usize = 10;

/// Ordered nop-modifier sequence
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Label {
    nops: Vec<u8>,
}

impl Label {
    pub fn new() -> Self {
        Self { nops: Vec::new() }
    }

    pub fn from_mods(mods: &[u8]) -> Self {
        let mut label = Self::new();
        for &m in mods {
            label.add_nop(m);
        }
        label
    }

    /// Append a modifier; silently ignored past [`MAX_LABEL_SIZE`]
    pub fn add_nop(&mut self, m: u8) {
        if self.nops.len() < MAX_LABEL_SIZE {
            self.nops.push(m);
        }
    }

    pub fn clear(&mut self) {
        self.nops.clear();
    }

    pub fn len(&self) -> usize {
        self.nops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nops.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<u8> {
        self.nops.get(i).copied()
    }

    pub fn mods(&self) -> &[u8] {
        &self.nops
    }

    /// Shift every modifier by `offset` modulo `base` (complement when offset = base/2)
    pub fn rotate(&mut self, offset: u8, base: u8) {
        for n in &mut self.nops {
            *n = (*n + offset) % base;
        }
    }

    /// Bijective base-`base` value: distinct for every label, 0 only when empty
    pub fn as_int(&self, base: u64) -> u64 {
        self.nops
            .iter()
            .fold(0u64, |acc, &n| acc.wrapping_mul(base).wrapping_add(n as u64 + 1))
    }

    fn matches_at(&self, insts: &[Instruction], lib: &InstLib, offset: usize) -> bool {
        self.nops
            .iter()
            .enumerate()
            .all(|(i, &m)| insts.get(offset + i).and_then(|&inst| lib.nop_mod(inst)) == Some(m))
    }

    /// First offset within `[start, end)` where the whole label fits and matches
    fn match_in_run(&self, insts: &[Instruction], lib: &InstLib, start: usize, end: usize) -> Option<usize> {
        let size = self.nops.len();
        if end - start < size {
            return None;
        }
        (start..=end - size).find(|&offset| self.matches_at(insts, lib, offset))
    }

    /// Search forward from `pos` (skipping the label at `pos` itself).
    ///
    /// Returns the index one past the matched sub-label, or `None` when the
    /// scan leaves the space. An empty label never matches.
    pub fn find_forward(&self, insts: &[Instruction], lib: &InstLib, pos: usize) -> Option<usize> {
        let size = self.nops.len();
        if size == 0 || pos >= insts.len() {
            return None;
        }
        let search_start = pos;
        let mut pos = pos + size;

        while pos < insts.len() {
            if lib.is_nop(insts[pos]) {
                let mut start = pos;
                let mut end = pos + 1;
                while start > search_start && lib.is_nop(insts[start - 1]) {
                    start -= 1;
                }
                while end < insts.len() && lib.is_nop(insts[end]) {
                    end += 1;
                }
                if let Some(offset) = self.match_in_run(insts, lib, start, end) {
                    return Some(offset + size);
                }
                pos = end;
            }
            pos += size;
        }
        None
    }

    /// Search backward, starting `size` sites before `pos`.
    ///
    /// Returns the end of the nop run containing the match, or `None` when
    /// the scan passes position 0. `pos` may be negative.
    pub fn find_backward(&self, insts: &[Instruction], lib: &InstLib, pos: i64) -> Option<usize> {
        let size = self.nops.len() as i64;
        if size == 0 || pos >= insts.len() as i64 {
            return None;
        }
        let search_start = pos;
        let mut pos = pos - size;

        while pos >= 0 {
            let p = pos as usize;
            if lib.is_nop(insts[p]) {
                let mut start = p;
                let mut end = p + 1;
                while start > 0 && lib.is_nop(insts[start - 1]) {
                    start -= 1;
                }
                while (end as i64) < search_start && lib.is_nop(insts[end]) {
                    end += 1;
                }
                if self.match_in_run(insts, lib, start, end).is_some() {
                    return Some(end);
                }
                pos = start as i64 - 1;
            }
            pos -= size;
        }
        None
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for &n in &self.nops {
            write!(f, "{}", (b'A' + n) as char)?;
        }
        Ok(())
    }
}
