//! Instruction - Single-opcode value type and genome sequences
//!
//! ## Format
//!
//! ```text
//! [OPCODE:1]
//!     ↓
//!  index into the instruction library table
//! ```
//!
//! ## Symbols
//!
//! Genomes are written one character per instruction, by opcode index:
//!
//! ```text
//! 0..25   → 'a'..'z'
//! 26..51  → 'A'..'Z'
//! ```

use crate::error::{EvoError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of opcodes representable as a single display symbol
pub const MAX_SYMBOLS: usize = 52;

/// A single virtual CPU instruction (opcode index)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Instruction(pub u8);

impl Instruction {
    /// Create from raw opcode
    pub const fn new(op: u8) -> Self {
        Self(op)
    }

    /// Raw opcode
    pub const fn op(&self) -> u8 {
        self.0
    }

    /// Display symbol for this opcode, `'?'` when outside the symbol range
    pub fn symbol(&self) -> char {
        let op = self.0 as usize;
        match op {
            0..=25 => (b'a' + op as u8) as char,
            26..=51 => (b'A' + (op - 26) as u8) as char,
            _ => '?',
        }
    }

    /// Parse a display symbol
    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            'a'..='z' => Some(Self(symbol as u8 - b'a')),
            'A'..='Z' => Some(Self(symbol as u8 - b'A' + 26)),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

/// An ordered instruction sequence (genome, offspring, parasite code)
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Genome {
    insts: Vec<Instruction>,
}

impl Genome {
    pub fn new(insts: Vec<Instruction>) -> Self {
        Self { insts }
    }

    /// Parse from a symbol string (`"abc"` → opcodes 0, 1, 2)
    ///
    /// `num_insts` bounds the valid opcodes; whitespace is ignored.
    pub fn from_symbols(symbols: &str, num_insts: usize) -> Result<Self> {
        let mut insts = Vec::with_capacity(symbols.len());
        for (offset, symbol) in symbols.chars().enumerate() {
            if symbol.is_whitespace() {
                continue;
            }
            match Instruction::from_symbol(symbol) {
                Some(inst) if (inst.op() as usize) < num_insts => insts.push(inst),
                _ => return Err(EvoError::InvalidSymbol { symbol, offset }),
            }
        }
        if insts.is_empty() {
            return Err(EvoError::EmptyGenome);
        }
        Ok(Self { insts })
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.is_empty()
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.insts
    }

    pub fn into_vec(self) -> Vec<Instruction> {
        self.insts
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instruction> {
        self.insts.iter()
    }
}

impl From<Vec<Instruction>> for Genome {
    fn from(insts: Vec<Instruction>) -> Self {
        Self::new(insts)
    }
}

impl fmt::Display for Genome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for inst in &self.insts {
            write!(f, "{}", inst.symbol())?;
        }
        Ok(())
    }
}
