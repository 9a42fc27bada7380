//! Memory operation implementations for the Hardware

use super::{Context, Hardware};
use crate::vm::head::HeadKind;
use crate::vm::instruction::Instruction;
use crate::vm::label::Label;
use crate::vm::memory::SiteFlags;
use crate::vm::stack::STACK_AX;
use crate::vm::MAX_MEMSPACE_LABEL;

/// Nops appended to parasite memory labels (four Nop-B)
const PARASITE_LABEL_SUFFIX: [u8; 4] = [1, 1, 1, 1];

impl Hardware {
    /// Read a memory-space label, namespacing it for parasite threads
    pub(super) fn read_memory_label(&mut self) -> Label {
        self.read_label(MAX_MEMSPACE_LABEL);
        let mut label = self.cur().next_label.clone();
        if self.config.parasite_mem_spaces && self.cur().owner.is_parasite() {
            for m in PARASITE_LABEL_SUFFIX {
                label.add_nop(m);
            }
        }
        label
    }

    /// Point the flow head at the start of the labeled space
    pub(super) fn execute_mem_set(&mut self) -> bool {
        let label = self.read_memory_label();
        let space = self.find_memory_space(&label);
        self.cur_mut().head_mut(HeadKind::Flow).set(0, space);
        true
    }

    pub(super) fn execute_mem_mark(&mut self) -> bool {
        let label = self.read_memory_label();
        let space = self.find_memory_space(&label);
        self.memory.toggle_mark(space);
        true
    }

    pub(super) fn execute_inst_read(&mut self, ctx: &mut Context<'_>) -> bool {
        let head = self.find_modified_head(HeadKind::Read);
        let dst = self.find_modified_stack(STACK_AX);
        self.adjust_head(head);
        let at = *self.cur().head(head);

        let exempt = self.config.parasite_no_copy_mut && self.cur().owner.is_parasite();
        let rate = self.config.mutations.copy_mut_prob;
        let mutated = !exempt && rate > 0.0 && ctx.rng.p(rate);
        let read = if mutated {
            ctx.organism.phenotype_mut().copy_mut_count += 1;
            self.lib.random_inst(ctx.rng)
        } else {
            self.memory.inst_at(&at)
        };

        let nop_mod = self.lib.nop_mod(read);
        let thread = self.cur_mut();
        thread.read_mutated = mutated;
        thread.stacks.push(dst, read.op() as i32);
        match nop_mod {
            Some(m) => thread.read_label.add_nop(m),
            None => thread.read_label.clear(),
        }

        self.advance_head(head);
        true
    }

    /// Write grows the target space by at most one site
    pub(super) fn execute_inst_write(&mut self) -> bool {
        let head = self.find_modified_head(HeadKind::Write);
        let src = self.find_modified_stack(STACK_AX);

        let at = *self.cur().head(head);
        let space_idx = at.space % self.memory.len();
        if let Some(space) = self.memory.space_mut(space_idx) {
            if at.pos >= space.len() as i32 - 1 {
                space.grow_one();
            }
        }
        self.adjust_head(head);
        let at = *self.cur().head(head);

        let mut value = self.stack_pop(src);
        if value < 0 || value as usize >= self.lib.size() {
            value = 0;
        }
        self.memory.set_inst_at(&at, Instruction(value as u8));
        self.memory.set_flag_at(&at, SiteFlags::COPIED);
        if self.cur().read_mutated {
            self.memory.set_flag_at(&at, SiteFlags::COPY_MUT);
        } else {
            self.memory.clear_flag_at(&at, SiteFlags::COPY_MUT);
        }

        self.advance_head(head);
        true
    }
}
