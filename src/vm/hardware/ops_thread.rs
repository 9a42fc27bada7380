//! Thread, IO and messaging implementations for the Hardware

use super::{Context, Hardware};
use crate::vm::head::HeadKind;
use crate::vm::organism::{FaultKind, FaultLocation};
use crate::vm::stack::{STACK_BX, STACK_CX};
use crate::vm::MAX_THREAD_LABEL;

impl Hardware {
    /// Output the top of the source stack, then push the next input onto `?BX?`
    pub(super) fn execute_io(&mut self, ctx: &mut Context<'_>) -> bool {
        let dst = self.find_modified_stack(STACK_BX);
        let src = self.find_modified_stack(dst);

        let out = self.stack_top(src);
        ctx.organism.do_output(out);

        let value = ctx.organism.next_input();
        self.stack_push(dst, value);
        ctx.organism.do_input(value);
        true
    }

    /// Start, restart or stop a thread.
    ///
    /// ```text
    /// label, BX != 0   create/restart thread `label` at the flow head's space; CX = id
    /// label, BX == 0   kill thread `label`
    /// none,  BX == 0   kill thread CX (0 = current)
    /// none,  BX != 0   no-op
    /// ```
    pub(super) fn execute_thread_set(&mut self, ctx: &mut Context<'_>) -> bool {
        self.read_label(MAX_THREAD_LABEL);
        let label = self.cur().next_label.clone();
        let priority = self.stack_top(STACK_BX);

        if !label.is_empty() {
            if priority != 0 {
                let space = self.cur().head(HeadKind::Flow).space;
                let id = self.thread_create(&label, space);
                self.stack_push(STACK_CX, id as i32);
                if id == 0 {
                    ctx.organism.fault(
                        FaultLocation::ThreadFork,
                        FaultKind::ForkThread,
                        "thread-set: thread creation failed",
                    );
                    return false;
                }
                return true;
            }
            if !self.thread_kill_label(&label) {
                ctx.organism.fault(
                    FaultLocation::ThreadKill,
                    FaultKind::KillThread,
                    "thread-set: no thread to kill",
                );
                return false;
            }
            return true;
        }

        if priority != 0 {
            return true;
        }
        let id = match self.stack_top(STACK_CX) {
            0 => self.threads.current_id() as i32 + 1,
            id => id,
        };
        if id < 1 || !self.thread_kill(id as usize) {
            ctx.organism.fault(
                FaultLocation::ThreadKill,
                FaultKind::KillThread,
                "thread-set: no thread to kill",
            );
            return false;
        }
        true
    }

    /// Push (running, id) of the labeled thread, or of thread CX, to BX and CX
    pub(super) fn execute_thread_get(&mut self) -> bool {
        self.read_label(MAX_THREAD_LABEL);
        let label = self.cur().next_label.clone();

        let idx = if label.is_empty() {
            match self.stack_top(STACK_CX) {
                0 => Some(self.threads.current_id()),
                id if id > 0 => Some(id as usize - 1),
                _ => None,
            }
        } else {
            self.threads.find_label(&label)
        };

        let (running, id) = match idx.and_then(|i| self.threads.get(i).map(|t| (i, t))) {
            Some((i, thread)) => (thread.running as i32, i as i32 + 1),
            None => (0, 0),
        };
        self.stack_push(STACK_BX, running);
        self.stack_push(STACK_CX, id);
        true
    }

    pub(super) fn execute_send_msg(&mut self, ctx: &mut Context<'_>) -> bool {
        let label = self.stack_top(STACK_BX);
        let data = self.stack_top(STACK_CX);
        if !ctx.organism.send_message(label, data) {
            ctx.organism.fault(FaultLocation::Message, FaultKind::Error, "send-msg: no recipient");
            return false;
        }
        true
    }

    pub(super) fn execute_retrieve_msg(&mut self, ctx: &mut Context<'_>) -> bool {
        let Some((label, data)) = ctx.organism.retrieve_message() else {
            return false;
        };
        self.stack_push(STACK_BX, data);
        self.stack_push(STACK_CX, label);
        true
    }

    pub(super) fn execute_apoptosis(&mut self, ctx: &mut Context<'_>) -> bool {
        ctx.organism.die();
        true
    }
}
