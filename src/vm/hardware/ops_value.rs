//! Value and stack operation implementations for the Hardware
//!
//! Binary ops read `op1 = ?BX?` and `op2 = next(op1)` and push onto
//! `dst = ?BX?`. All arithmetic wraps; Div/Mod fail instead of trapping.

use super::{Context, Hardware};
use crate::vm::organism::{FaultKind, FaultLocation};
use crate::vm::stack::{STACK_AX, STACK_BX};

impl Hardware {
    /// `(dst, op1, op2)` for the binary value ops
    fn binary_operands(&mut self) -> (usize, i32, i32) {
        let dst = self.find_modified_stack(STACK_BX);
        let op1 = self.find_modified_stack(STACK_BX);
        let op2 = self.find_modified_next_stack(op1);
        (dst, self.stack_top(op1), self.stack_top(op2))
    }

    /// Positive amounts shift right, negative shift left, |amount| >= 32 flushes to 0
    pub(super) fn execute_val_shift(&mut self) -> bool {
        let dst = self.find_modified_stack(STACK_BX);
        let op1 = self.find_modified_stack(dst);
        let op2 = self.find_modified_next_stack(op1);
        let value = self.stack_top(op1);
        let shift = self.stack_top(op2);

        let result = if (0..32).contains(&shift) {
            value >> shift
        } else if shift < 0 && shift > -32 {
            value.wrapping_shl((-shift) as u32)
        } else {
            0
        };
        self.stack_push(dst, result);
        true
    }

    pub(super) fn execute_val_nand(&mut self) -> bool {
        let (dst, a, b) = self.binary_operands();
        self.stack_push(dst, !(a & b));
        true
    }

    pub(super) fn execute_val_add(&mut self) -> bool {
        let (dst, a, b) = self.binary_operands();
        self.stack_push(dst, a.wrapping_add(b));
        true
    }

    pub(super) fn execute_val_sub(&mut self) -> bool {
        let (dst, a, b) = self.binary_operands();
        self.stack_push(dst, a.wrapping_sub(b));
        true
    }

    pub(super) fn execute_val_negate(&mut self) -> bool {
        let dst = self.find_modified_stack(STACK_BX);
        let op1 = self.find_modified_stack(STACK_BX);
        let value = self.stack_top(op1);
        self.stack_push(dst, value.wrapping_neg());
        true
    }

    pub(super) fn execute_val_mult(&mut self) -> bool {
        let (dst, a, b) = self.binary_operands();
        self.stack_push(dst, a.wrapping_mul(b));
        true
    }

    pub(super) fn execute_val_div(&mut self, ctx: &mut Context<'_>) -> bool {
        let (dst, a, b) = self.binary_operands();
        if b == 0 {
            ctx.organism.fault(FaultLocation::Math, FaultKind::Error, "div: dividing by 0");
            return false;
        }
        match a.checked_div(b) {
            Some(q) => {
                self.stack_push(dst, q);
                true
            }
            None => {
                ctx.organism.fault(FaultLocation::Math, FaultKind::Error, "div: overflow exception");
                true
            }
        }
    }

    pub(super) fn execute_val_mod(&mut self, ctx: &mut Context<'_>) -> bool {
        let (dst, a, b) = self.binary_operands();
        if b == 0 {
            ctx.organism.fault(FaultLocation::Math, FaultKind::Error, "mod: modding by 0");
            return false;
        }
        self.stack_push(dst, a.wrapping_rem(b));
        true
    }

    pub(super) fn execute_val_inc(&mut self) -> bool {
        let dst = self.find_modified_stack(STACK_BX);
        let src = self.find_modified_stack(dst);
        let value = self.stack_top(src);
        self.stack_push(dst, value.wrapping_add(1));
        true
    }

    pub(super) fn execute_val_dec(&mut self) -> bool {
        let dst = self.find_modified_stack(STACK_BX);
        let src = self.find_modified_stack(dst);
        let value = self.stack_top(src);
        self.stack_push(dst, value.wrapping_sub(1));
        true
    }

    pub(super) fn execute_val_copy(&mut self) -> bool {
        let dst = self.find_modified_stack(STACK_BX);
        let src = self.find_modified_stack(dst);
        let value = self.stack_top(src);
        self.stack_push(dst, value);
        true
    }

    pub(super) fn execute_val_delete(&mut self) -> bool {
        let stack = self.find_modified_stack(STACK_BX);
        self.stack_pop(stack);
        true
    }

    pub(super) fn execute_stack_delete(&mut self) -> bool {
        let stack = self.find_modified_stack(STACK_BX);
        self.cur_mut().stacks.stack_mut(stack).clear();
        true
    }

    pub(super) fn execute_push_next(&mut self) -> bool {
        let src = self.find_modified_stack(STACK_AX);
        let dst = self.find_modified_next_stack(src);
        let value = self.stack_pop(src);
        self.stack_push(dst, value);
        true
    }

    pub(super) fn execute_push_prev(&mut self) -> bool {
        let src = self.find_modified_stack(STACK_BX);
        let dst = self.find_modified_previous_stack(src);
        let value = self.stack_pop(src);
        self.stack_push(dst, value);
        true
    }

    pub(super) fn execute_push_comp(&mut self) -> bool {
        let src = self.find_modified_stack(STACK_BX);
        let dst = self.find_modified_complement_stack(src);
        let value = self.stack_pop(src);
        self.stack_push(dst, value);
        true
    }
}
