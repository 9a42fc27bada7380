//! Stack - Fixed-depth circular operand stacks
//!
//! ```text
//! depth 10, ring buffer:
//!   push  → move pointer down one slot (wrapping), overwrite
//!   pop   → read slot, zero it, move pointer up one slot
//!   top   → read slot (0 when nothing was pushed)
//! ```
//!
//! Pushing onto a full stack silently drops the oldest value.

use std::fmt;

/// Slots per stack
pub const STACK_DEPTH: usize = 10;
/// Stacks per thread
pub const NUM_STACKS: usize = 4;

/// Conventional stack names, in nop-modifier order
pub const STACK_AX: usize = 0;
pub const STACK_BX: usize = 1;
pub const STACK_CX: usize = 2;
pub const STACK_DX: usize = 3;

/// One circular integer stack
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuStack {
    slots: [i32; STACK_DEPTH],
    sp: usize,
}

impl CpuStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, value: i32) {
        self.sp = if self.sp == 0 { STACK_DEPTH - 1 } else { self.sp - 1 };
        self.slots[self.sp] = value;
    }

    pub fn pop(&mut self) -> i32 {
        let value = self.slots[self.sp];
        self.slots[self.sp] = 0;
        self.sp = (self.sp + 1) % STACK_DEPTH;
        value
    }

    pub fn top(&self) -> i32 {
        self.slots[self.sp]
    }

    /// Value `depth` slots below the top
    pub fn get(&self, depth: usize) -> i32 {
        self.slots[(self.sp + depth) % STACK_DEPTH]
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn ok(&self) -> bool {
        self.sp < STACK_DEPTH
    }
}

impl fmt::Display for CpuStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [0x{:x}]", self.top(), self.top())
    }
}

/// The stacks owned by one thread
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StackBank {
    stacks: [CpuStack; NUM_STACKS],
}

impl StackBank {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack by index; out-of-range indices fall back to AX
    pub fn stack(&self, idx: usize) -> &CpuStack {
        &self.stacks[if idx < NUM_STACKS { idx } else { STACK_AX }]
    }

    pub fn stack_mut(&mut self, idx: usize) -> &mut CpuStack {
        &mut self.stacks[if idx < NUM_STACKS { idx } else { STACK_AX }]
    }

    pub fn push(&mut self, idx: usize, value: i32) {
        self.stack_mut(idx).push(value);
    }

    pub fn pop(&mut self, idx: usize) -> i32 {
        self.stack_mut(idx).pop()
    }

    pub fn top(&self, idx: usize) -> i32 {
        self.stack(idx).top()
    }

    pub fn clear(&mut self) {
        for s in &mut self.stacks {
            s.clear();
        }
    }

    pub fn ok(&self) -> bool {
        self.stacks.iter().all(CpuStack::ok)
    }
}
