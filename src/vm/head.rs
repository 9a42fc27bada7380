//! Head - Cursor into a memory space
//!
//! A head is a plain `(space, position)` pair resolved against the
//! [`MemoryArray`] on every use, so resizing one space never leaves a
//! dangling reference in another thread.
//!
//! ## Full location (Head-Push / Head-Pop / Call / Return)
//!
//! ```text
//! [SPACE:8][POSITION:24]
//! ```

use super::memory::MemoryArray;
use std::fmt;

/// The four heads of a thread, in nop-modifier order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum HeadKind {
    Ip = 0,
    Read = 1,
    Write = 2,
    Flow = 3,
}

impl HeadKind {
    pub const COUNT: usize = 4;
    pub const ALL: [HeadKind; 4] = [Self::Ip, Self::Read, Self::Write, Self::Flow];

    /// Head selected by a nop modifier
    pub fn from_mod(m: u8) -> Option<Self> {
        Self::ALL.get(m as usize).copied()
    }

    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for HeadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ip => "IP",
            Self::Read => "R-Head",
            Self::Write => "W-Head",
            Self::Flow => "F-Head",
        };
        write!(f, "{}", name)
    }
}

/// Position bound to a memory space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Head {
    pub space: usize,
    pub pos: i32,
}

impl Head {
    const POS_MASK: i32 = 0x00FF_FFFF;
    const SPACE_SHIFT: u32 = 24;

    pub const fn new(space: usize, pos: i32) -> Self {
        Self { space, pos }
    }

    /// Position 0 of `space`
    pub fn reset(&mut self, space: usize) {
        self.space = space;
        self.pos = 0;
    }

    pub fn set(&mut self, pos: i32, space: usize) {
        self.space = space;
        self.pos = pos;
    }

    /// Normalise space modulo the space count and wrap the position
    pub fn adjust(&mut self, mem: &MemoryArray) {
        let (space, pos) = mem.locate(self);
        self.space = space;
        self.pos = pos as i32;
    }

    /// Step forward one site (wrapping)
    pub fn advance(&mut self, mem: &MemoryArray) {
        self.pos = self.pos.wrapping_add(1);
        self.adjust(mem);
    }

    /// Position after adjustment, without modifying the head
    pub fn adjusted(&self, mem: &MemoryArray) -> Head {
        let mut h = *self;
        h.adjust(mem);
        h
    }

    /// Head one site ahead (wrapping)
    pub fn next(&self, mem: &MemoryArray) -> Head {
        let mut h = *self;
        h.advance(mem);
        h
    }

    pub fn full_location(&self) -> i32 {
        (self.pos & Self::POS_MASK) | ((self.space as i32) << Self::SPACE_SHIFT)
    }

    /// Decode a full location; callers adjust against memory afterwards
    pub fn set_full_location(&mut self, value: i32) {
        self.pos = value & Self::POS_MASK;
        self.space = ((value as u32) >> Self::SPACE_SHIFT) as usize;
    }
}

impl fmt::Display for Head {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.space, self.pos)
    }
}
