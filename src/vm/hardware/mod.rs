//! Hardware - Multi-threaded virtual CPU for one organism
//!
//! Each call to [`Hardware::single_process`] is one simulated time slice:
//!
//! ```text
//!   Idle ──► Fetching ──► Dispatching ──► AdvancingOrFaulted ──► Idle
//!               │  ▲            │                 │
//!               │  └── next ────┴─────────────────┘   (ThreadSlicing::All)
//!               └─ thread stopped / skipped / cost unpaid
//! ```
//!
//! Handlers live in the `ops_*` submodules, replication in `divide`, and
//! parasite transfer in `inject`. Handlers return `bool` (executed or not)
//! and report faults through the organism; nothing unwinds out of them.

mod divide;
mod inject;
mod ops_flow;
mod ops_memory;
mod ops_thread;
mod ops_value;

#[cfg(test)]
mod tests;

pub use inject::Parasite;

use super::head::{Head, HeadKind};
use super::inst_lib::{InstLib, Opcode, NUM_NOPS};
use super::instruction::{Genome, Instruction};
use super::label::{Label, MAX_LABEL_SIZE};
use super::memory::{MemoryArray, SiteFlags};
use super::organism::Organism;
use super::random::RandomStream;
use super::stack::NUM_STACKS;
use super::thread::{Thread, ThreadTable};
use crate::config::{HardwareConfig, ThreadSlicing};
use std::collections::HashMap;
use std::io::{self, Write};
use std::sync::Arc;

/// Collaborators borrowed for the duration of one engine call
pub struct Context<'a> {
    pub rng: &'a mut RandomStream,
    pub organism: &'a mut dyn Organism,
}

impl<'a> Context<'a> {
    pub fn new(rng: &'a mut RandomStream, organism: &'a mut dyn Organism) -> Self {
        Self { rng, organism }
    }
}

/// Engine phase, observable between and during calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineState {
    #[default]
    Idle,
    Fetching,
    Dispatching,
    AdvancingOrFaulted,
}

/// Result of one engine call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Continue,
    /// The organism was told to die at the end of this call
    Died,
}

/// Search direction for [`Hardware::find_label`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDirection {
    Backward,
    Forward,
    /// Forward from position 0 of the IP's space
    FromStart,
}

/// Virtual CPU state of one organism
#[derive(Debug, Clone)]
pub struct Hardware {
    lib: Arc<InstLib>,
    config: Arc<HardwareConfig>,
    memory: MemoryArray,
    mem_labels: HashMap<u64, usize>,
    threads: ThreadTable,
    advance_ip: bool,
    state: EngineState,
    /// Virulence of the installed parasite, overriding the configured one
    parasite_virulence: Option<f64>,
}

impl Hardware {
    pub fn new(lib: Arc<InstLib>, config: Arc<HardwareConfig>, genome: &Genome) -> Self {
        let memory = MemoryArray::new(genome, lib.default_inst());
        Self {
            lib,
            config,
            memory,
            mem_labels: HashMap::new(),
            threads: ThreadTable::new(),
            advance_ip: true,
            state: EngineState::Idle,
            parasite_virulence: None,
        }
    }

    /// Hardware loaded with the organism's genome
    pub fn from_organism(lib: Arc<InstLib>, config: Arc<HardwareConfig>, organism: &dyn Organism) -> Self {
        Self::new(lib, config, organism.genome())
    }

    /// Full reset: one thread, genome space only, labels and parasites cleared
    pub fn reset(&mut self, organism: &mut dyn Organism) {
        self.memory.truncate_to_genome();
        self.mem_labels.clear();
        self.threads.reset();
        self.parasite_virulence = None;
        organism.clear_parasites();
    }

    // =========================================================================
    // Engine
    // =========================================================================

    /// Run one time slice
    pub fn single_process(&mut self, ctx: &mut Context<'_>) -> StepResult {
        ctx.organism.phenotype_mut().time_used += 1;

        let num_inst_exec = match self.config.thread_slicing {
            ThreadSlicing::Single => 1,
            ThreadSlicing::All => self.threads.len(),
        };

        for _ in 0..num_inst_exec {
            self.state = EngineState::Fetching;
            self.threads.next();
            self.apply_virulence(ctx.rng);

            if self.threads.current().skip_cycle {
                self.threads.current_mut().skip_cycle = false;
                continue;
            }
            if !self.threads.current().running {
                continue;
            }

            let executing = self.threads.current_id();
            self.advance_ip = true;
            self.adjust_head(HeadKind::Ip);

            let ip = *self.threads.current().ip();
            if self.memory.flags_at(&ip).breakpoint() {
                ctx.organism.breakpoint();
            }
            let inst = self.memory.inst_at(&ip);
            log::trace!(
                "thread {} fetch {} at {} ({})",
                executing,
                self.lib.name(inst),
                ip,
                inst
            );

            if !self.pay_pre_cost(inst) {
                continue;
            }

            let prob_fail = self.lib.prob_fail(inst);
            let exec = !(prob_fail > 0.0 && ctx.rng.p(prob_fail));
            if exec {
                self.state = EngineState::Dispatching;
                self.execute_inst(ctx, inst);
            }

            self.state = EngineState::AdvancingOrFaulted;
            if self.advance_ip {
                let Self { memory, threads, .. } = self;
                if let Some(thread) = threads.get_mut(executing) {
                    thread.ip_mut().advance(memory);
                }
            }
        }
        self.state = EngineState::Idle;

        let phenotype = ctx.organism.phenotype();
        let max_executed = self.config.max_executed;
        if (max_executed > 0 && phenotype.time_used >= max_executed) || phenotype.to_die {
            ctx.organism.die();
            return StepResult::Died;
        }
        StepResult::Continue
    }

    /// Execute an instruction supplied from outside, without fetching it
    pub fn process_bonus_inst(&mut self, ctx: &mut Context<'_>, inst: Instruction) -> bool {
        let prev = self.state;
        self.state = EngineState::Dispatching;
        let ok = self.execute_inst(ctx, inst);
        self.state = prev;
        ok
    }

    fn apply_virulence(&mut self, rng: &mut RandomStream) {
        if self.config.thread_slicing != ThreadSlicing::Single {
            return;
        }
        let Some(virulence) = self.parasite_virulence.or(self.config.parasite_virulence) else {
            return;
        };
        let draw = rng.double();
        self.threads.set_current(if draw < virulence { 1 } else { 0 });
    }

    /// True once the instruction's cost has been paid in fetches
    fn pay_pre_cost(&mut self, inst: Instruction) -> bool {
        let cost = self.lib.cost(inst);
        if cost <= 1 {
            return true;
        }
        let thread = self.threads.current_mut();
        if thread.cost_remaining == 0 {
            thread.cost_remaining = cost;
        }
        thread.cost_remaining -= 1;
        thread.cost_remaining == 0
    }

    fn execute_inst(&mut self, ctx: &mut Context<'_>, inst: Instruction) -> bool {
        let mut actual = inst;
        let exec_err = self.config.mutations.exec_err_prob;
        if exec_err > 0.0 && ctx.rng.p(exec_err) {
            actual = self.lib.random_inst(ctx.rng);
        }

        let ip = *self.threads.current().ip();
        self.memory.set_flag_at(&ip, SiteFlags::EXECUTED);
        ctx.organism.phenotype_mut().inc_inst_count(actual.op());

        let ok = self.dispatch(ctx, self.lib.opcode(actual));
        if !ok {
            ctx.organism.phenotype_mut().dec_inst_count(actual.op());
        }
        ok
    }

    fn dispatch(&mut self, ctx: &mut Context<'_>, opcode: Opcode) -> bool {
        match opcode {
            Opcode::NopA | Opcode::NopB | Opcode::NopC | Opcode::NopD | Opcode::Null => true,

            // Value and stack ops (ops_value.rs)
            Opcode::ValShift => self.execute_val_shift(),
            Opcode::ValNand => self.execute_val_nand(),
            Opcode::ValAdd => self.execute_val_add(),
            Opcode::ValSub => self.execute_val_sub(),
            Opcode::ValNegate => self.execute_val_negate(),
            Opcode::ValMult => self.execute_val_mult(),
            Opcode::ValDiv => self.execute_val_div(ctx),
            Opcode::ValMod => self.execute_val_mod(ctx),
            Opcode::ValInc => self.execute_val_inc(),
            Opcode::ValDec => self.execute_val_dec(),
            Opcode::ValCopy => self.execute_val_copy(),
            Opcode::ValDelete => self.execute_val_delete(),
            Opcode::StackDelete => self.execute_stack_delete(),
            Opcode::PushNext => self.execute_push_next(),
            Opcode::PushPrev => self.execute_push_prev(),
            Opcode::PushComp => self.execute_push_comp(),

            // Memory ops (ops_memory.rs, divide.rs, inject.rs)
            Opcode::MemSet => self.execute_mem_set(),
            Opcode::MemMark => self.execute_mem_mark(),
            Opcode::Divide => self.execute_divide(ctx),
            Opcode::Inject => self.execute_inject(ctx),
            Opcode::InstRead => self.execute_inst_read(ctx),
            Opcode::InstWrite => self.execute_inst_write(),

            // Conditionals and flow (ops_flow.rs)
            Opcode::IfEqual => self.execute_if(|a, b| a == b),
            Opcode::IfNotEqual => self.execute_if(|a, b| a != b),
            Opcode::IfLess => self.execute_if(|a, b| a < b),
            Opcode::IfGreater => self.execute_if(|a, b| a > b),
            Opcode::HeadPush => self.execute_head_push(),
            Opcode::HeadPop => self.execute_head_pop(),
            Opcode::HeadMove => self.execute_head_move(),
            Opcode::Call => self.execute_call(),
            Opcode::Return => self.execute_return(),
            Opcode::Search => self.execute_search(),

            // Threads, IO and messaging (ops_thread.rs)
            Opcode::Io => self.execute_io(ctx),
            Opcode::ThreadSet => self.execute_thread_set(ctx),
            Opcode::ThreadGet => self.execute_thread_get(),
            Opcode::SendMsg => self.execute_send_msg(ctx),
            Opcode::RetrieveMsg => self.execute_retrieve_msg(ctx),
            Opcode::Apoptosis => self.execute_apoptosis(ctx),
        }
    }

    // =========================================================================
    // Heads and modifiers
    // =========================================================================

    fn cur(&self) -> &Thread {
        self.threads.current()
    }

    fn cur_mut(&mut self) -> &mut Thread {
        self.threads.current_mut()
    }

    fn adjust_head(&mut self, kind: HeadKind) {
        let Self { memory, threads, .. } = self;
        threads.current_mut().head_mut(kind).adjust(memory);
    }

    fn advance_head(&mut self, kind: HeadKind) {
        let Self { memory, threads, .. } = self;
        threads.current_mut().head_mut(kind).advance(memory);
    }

    /// Place a head of the current thread, adjusted into range
    fn set_head(&mut self, kind: HeadKind, head: Head) {
        let adjusted = head.adjusted(&self.memory);
        *self.cur_mut().head_mut(kind) = adjusted;
    }

    /// Re-adjust every head of every thread after a space shrinks
    fn adjust_all_heads(&mut self) {
        let Self { memory, threads, .. } = self;
        for thread in threads.iter_mut() {
            for head in thread.heads.iter_mut() {
                head.adjust(memory);
            }
        }
    }

    /// Consume the nop after the IP, if any, returning its modifier
    fn next_nop_mod(&mut self) -> Option<u8> {
        let next = self.cur().ip().next(&self.memory);
        let m = self.lib.nop_mod(self.memory.inst_at(&next))?;
        *self.cur_mut().ip_mut() = next;
        self.memory.set_flag_at(&next, SiteFlags::EXECUTED);
        Some(m)
    }

    fn find_modified_stack(&mut self, default: usize) -> usize {
        self.next_nop_mod().map(usize::from).unwrap_or(default)
    }

    fn find_modified_next_stack(&mut self, default: usize) -> usize {
        self.next_nop_mod()
            .map(usize::from)
            .unwrap_or((default + 1) % NUM_STACKS)
    }

    fn find_modified_previous_stack(&mut self, default: usize) -> usize {
        self.next_nop_mod()
            .map(usize::from)
            .unwrap_or((default + NUM_STACKS - 1) % NUM_STACKS)
    }

    /// Defaults to the previous stack, as the complement of a 4-stack bank does
    fn find_modified_complement_stack(&mut self, default: usize) -> usize {
        self.find_modified_previous_stack(default)
    }

    fn find_modified_head(&mut self, default: HeadKind) -> HeadKind {
        self.next_nop_mod().and_then(HeadKind::from_mod).unwrap_or(default)
    }

    fn stack_top(&self, idx: usize) -> i32 {
        self.cur().stacks.top(idx)
    }

    fn stack_push(&mut self, idx: usize, value: i32) {
        self.cur_mut().stacks.push(idx, value);
    }

    fn stack_pop(&mut self, idx: usize) -> i32 {
        self.cur_mut().stacks.pop(idx)
    }

    // =========================================================================
    // Labels
    // =========================================================================

    /// Read the nops following the IP into the next-label buffer.
    ///
    /// The IP is left on the last nop read. Only the first
    /// `max_label_exe_size` nops are marked executed.
    fn read_label(&mut self, max_size: usize) {
        let max_exe = self.config.max_label_exe_size;
        self.cur_mut().next_label.clear();

        let mut count = 0;
        while count < max_size {
            let next = self.cur().ip().next(&self.memory);
            let Some(m) = self.lib.nop_mod(self.memory.inst_at(&next)) else {
                break;
            };
            count += 1;
            let thread = self.cur_mut();
            *thread.ip_mut() = next;
            thread.next_label.add_nop(m);
            if thread.next_label.len() <= max_exe {
                self.memory.set_flag_at(&next, SiteFlags::EXECUTED);
            }
        }
    }

    /// Find the current next-label in the IP's space.
    ///
    /// Returns a head on the last nop of the match, or the IP itself when
    /// the label is empty or not found.
    pub fn find_label(&self, direction: SearchDirection) -> Head {
        let ip = self.cur().ip().adjusted(&self.memory);
        let label = &self.cur().next_label;
        if label.is_empty() {
            return ip;
        }
        let Some(space) = self.memory.space(ip.space) else {
            return ip;
        };
        let insts = space.insts();
        let found = match direction {
            SearchDirection::Backward => {
                label.find_backward(insts, &self.lib, ip.pos as i64 - label.len() as i64)
            }
            SearchDirection::Forward => label.find_forward(insts, &self.lib, ip.pos as usize),
            SearchDirection::FromStart => label.find_forward(insts, &self.lib, 0),
        };
        match found {
            Some(pos) if pos > 0 => Head::new(ip.space, pos as i32 - 1),
            _ => ip,
        }
    }

    /// Memory space for `label`; unknown labels get a fresh space
    fn find_memory_space(&mut self, label: &Label) -> usize {
        if label.is_empty() {
            return 0;
        }
        let key = label.as_int(NUM_NOPS as u64);
        if let Some(&idx) = self.mem_labels.get(&key) {
            return idx;
        }
        let idx = self.memory.allocate(self.lib.default_inst());
        self.mem_labels.insert(key, idx);
        log::debug!("allocated memory space {} for label {}", idx, label);
        idx
    }

    fn memory_space_exists(&self, label: &Label) -> bool {
        !label.is_empty() && self.mem_labels.contains_key(&label.as_int(NUM_NOPS as u64))
    }

    // =========================================================================
    // Threads
    // =========================================================================

    /// Start (or restart) the thread named `label` in `space`.
    ///
    /// Returns the 1-based thread id, or 0 on failure (cap reached, empty
    /// label, or a running thread already holds the label).
    pub fn thread_create(&mut self, label: &Label, space: usize) -> usize {
        if self.threads.len() >= self.config.max_cpu_threads || label.is_empty() {
            return 0;
        }
        if let Some(idx) = self.threads.find_label(label) {
            return match self.threads.get_mut(idx) {
                Some(thread) if !thread.running => {
                    thread.reset(space);
                    log::debug!("restarted thread {} ({}) in space {}", idx + 1, label, space);
                    idx + 1
                }
                _ => 0,
            };
        }

        let mut thread = Thread::new(space);
        thread.owner = self.cur().owner;
        let idx = self.threads.push_labeled(label, thread);
        self.adjust_all_heads();
        log::debug!("created thread {} ({}) in space {}", idx + 1, label, space);
        idx + 1
    }

    /// Stop thread `id` (1-based)
    pub fn thread_kill(&mut self, id: usize) -> bool {
        let killed = self.threads.kill(id);
        if killed {
            log::debug!("killed thread {}", id);
        }
        killed
    }

    fn thread_kill_label(&mut self, label: &Label) -> bool {
        match self.threads.find_label(label) {
            Some(idx) => self.thread_kill(idx + 1),
            None => false,
        }
    }

    // =========================================================================
    // Inspection
    // =========================================================================

    pub fn inst_lib(&self) -> &InstLib {
        &self.lib
    }

    pub fn config(&self) -> &HardwareConfig {
        &self.config
    }

    pub fn memory(&self) -> &MemoryArray {
        &self.memory
    }

    /// Mutable memory access for drivers (loading code, setting breakpoints)
    pub fn memory_mut(&mut self) -> &mut MemoryArray {
        &mut self.memory
    }

    pub fn threads(&self) -> &ThreadTable {
        &self.threads
    }

    pub fn num_threads(&self) -> usize {
        self.threads.len()
    }

    pub fn current_thread(&self) -> &Thread {
        self.cur()
    }

    pub fn head(&self, kind: HeadKind) -> Head {
        *self.cur().head(kind)
    }

    pub fn ip(&self) -> Head {
        self.head(HeadKind::Ip)
    }

    /// Top of a stack of the current thread
    pub fn stack(&self, idx: usize) -> i32 {
        self.stack_top(idx)
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn genome(&self) -> Genome {
        self.memory.genome().to_genome()
    }

    /// Internal consistency: stacks, labels, thread index and head ranges
    pub fn ok(&self) -> bool {
        if self.memory.is_empty() || self.threads.is_empty() {
            return false;
        }
        if self.threads.current_id() >= self.threads.len() {
            return false;
        }
        if self.memory.iter().any(|space| space.is_empty()) {
            return false;
        }
        self.threads.iter().all(|thread| {
            thread.ok()
                && thread.next_label.len() <= MAX_LABEL_SIZE
                && thread.heads.iter().all(|head| {
                    self.memory
                        .space(head.space)
                        .map(|space| head.pos >= 0 && (head.pos as usize) < space.len())
                        .unwrap_or(false)
                })
        })
    }

    /// Human-readable status of the current thread and all memory spaces
    pub fn print_status<W: Write>(&self, out: &mut W, organism: &dyn Organism) -> io::Result<()> {
        let thread = self.cur();
        write!(
            out,
            "{} THREAD: {}, {}   IP:{}   ",
            organism.phenotype().time_used,
            self.threads.current_id(),
            self.threads.len(),
            thread.ip()
        )?;
        for (name, idx) in [("AX", 0), ("BX", 1), ("CX", 2), ("DX", 3)] {
            write!(out, "{}:{}  ", name, thread.stacks.stack(idx))?;
        }
        writeln!(out)?;
        writeln!(
            out,
            "  R-Head:{}  W-Head:{}  F-Head:{}  RL:{}  owner:{}",
            thread.head(HeadKind::Read),
            thread.head(HeadKind::Write),
            thread.head(HeadKind::Flow),
            thread.read_label,
            thread.owner
        )?;
        for (i, space) in self.memory.iter().enumerate() {
            let mark = if self.memory.is_marked(i) { '*' } else { ' ' };
            writeln!(out, "  Mem {} ({})[{}]: {}", i, space.len(), mark, space.to_genome())?;
        }
        out.flush()
    }
}
