//! Conditional and head-movement implementations for the Hardware
//!
//! Head locations travel through the stacks in full-location form
//! (`pos | space << 24`), so Head-Push/Head-Pop and Call/Return can move
//! between memory spaces.

use super::{Hardware, SearchDirection};
use crate::vm::head::{Head, HeadKind};
use crate::vm::inst_lib::NUM_NOPS;
use crate::vm::label::MAX_LABEL_SIZE;
use crate::vm::stack::{STACK_AX, STACK_BX};
use crate::vm::MAX_MEMSPACE_LABEL;

impl Hardware {
    /// Compare `?AX?` with the stack after it; skip the next instruction when false
    pub(super) fn execute_if(&mut self, cond: impl Fn(i32, i32) -> bool) -> bool {
        let op1 = self.find_modified_stack(STACK_AX);
        let op2 = self.find_modified_next_stack(op1);
        if !cond(self.stack_top(op1), self.stack_top(op2)) {
            self.advance_head(HeadKind::Ip);
        }
        true
    }

    pub(super) fn execute_head_push(&mut self) -> bool {
        let head = self.find_modified_head(HeadKind::Ip);
        let dst = self.find_modified_stack(STACK_BX);
        let location = self.cur().head(head).full_location();
        self.stack_push(dst, location);
        true
    }

    pub(super) fn execute_head_pop(&mut self) -> bool {
        let head = self.find_modified_head(HeadKind::Ip);
        let src = self.find_modified_stack(STACK_BX);
        let mut target = Head::default();
        target.set_full_location(self.stack_pop(src));
        self.set_head(head, target);
        true
    }

    /// Move `?IP?` to the flow head; moving the flow head steps it forward
    pub(super) fn execute_head_move(&mut self) -> bool {
        let head = self.find_modified_head(HeadKind::Ip);
        if head == HeadKind::Flow {
            self.advance_head(HeadKind::Flow);
            return true;
        }
        let flow = *self.cur().head(HeadKind::Flow);
        self.set_head(head, flow);
        if head == HeadKind::Ip {
            self.advance_ip = false;
        }
        true
    }

    /// Push the return location to AX and jump to the space named by the
    /// complemented label, or to the flow head when no label follows.
    pub(super) fn execute_call(&mut self) -> bool {
        let location = self.cur().ip().full_location();
        self.stack_push(STACK_AX, location);

        self.read_label(MAX_MEMSPACE_LABEL);
        let target = if self.cur().next_label.is_empty() {
            *self.cur().head(HeadKind::Flow)
        } else {
            let mut label = self.cur().next_label.clone();
            label.rotate(1, NUM_NOPS as u8);
            Head::new(self.find_memory_space(&label), 0)
        };
        self.set_head(HeadKind::Ip, target);
        self.advance_ip = false;
        true
    }

    pub(super) fn execute_return(&mut self) -> bool {
        let mut target = Head::default();
        target.set_full_location(self.stack_pop(STACK_AX));
        self.set_head(HeadKind::Ip, target);
        true
    }

    /// Find the complement of the following label from the top of the space.
    ///
    /// ```text
    /// found:     BX = distance to the end of the match, AX = label size,
    ///            flow head on the last nop of the match
    /// not found: BX = 0, flow head on the instruction after the IP
    /// ```
    pub(super) fn execute_search(&mut self) -> bool {
        self.read_label(MAX_LABEL_SIZE);
        self.cur_mut().next_label.rotate(2, NUM_NOPS as u8);
        let found = self.find_label(SearchDirection::FromStart);
        let ip = *self.cur().ip();

        if found.pos == ip.pos {
            self.set_head(HeadKind::Flow, Head::new(ip.space, ip.pos + 1));
            self.stack_push(STACK_BX, 0);
        } else {
            let size = self.cur().next_label.len() as i32;
            self.stack_push(STACK_BX, found.pos - ip.pos + size + 1);
            self.stack_push(STACK_AX, size);
            self.set_head(HeadKind::Flow, found);
        }
        true
    }
}
