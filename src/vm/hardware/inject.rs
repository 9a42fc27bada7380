//! Inject - Sending code to a neighbour and hosting code received
//!
//! The sending side (`Inject`) works like Divide, but the block is handed to
//! [`Organism::inject_parasite`] together with the label naming the target
//! space. The receiving side is [`Hardware::parasite_infect_host`], called by
//! whoever delivers the code: it loads the block into a fresh labeled space
//! and starts a parasite-owned thread on it.

use super::divide::MutationPass;
use super::{Context, Hardware};
use crate::config::InjectMethod;
use crate::vm::head::HeadKind;
use crate::vm::instruction::Genome;
use crate::vm::label::Label;
use crate::vm::memory::SiteFlags;
use crate::vm::organism::{FaultKind, FaultLocation, Organism};
use crate::vm::thread::{Thread, ThreadOwner};

/// Code delivered to a host by a neighbour's Inject
#[derive(Debug, Clone, PartialEq)]
pub struct Parasite {
    pub id: u64,
    /// Names the memory space and thread the code is installed under
    pub label: Label,
    pub code: Genome,
    /// Scheduling bias toward the parasite thread (overrides the config)
    pub virulence: Option<f64>,
}

impl Parasite {
    pub fn new(id: u64, label: Label, code: Genome) -> Self {
        Self { id, label, code, virulence: None }
    }

    pub fn with_virulence(mut self, virulence: f64) -> Self {
        self.virulence = Some(virulence);
        self
    }
}

impl Hardware {
    pub(super) fn execute_inject(&mut self, ctx: &mut Context<'_>) -> bool {
        let label = self.read_memory_label();

        let write = *self.cur().head(HeadKind::Write);
        let space = write.space;
        if space == 0 || write.pos <= 0 || self.memory.space(space).is_none() {
            ctx.organism.fault(FaultLocation::Inject, FaultKind::Error, "inject: no code to inject");
            return false;
        }
        let end = write.pos as usize;
        let placeholder = self.lib.default_inst();

        if end < self.config.min_inject_size {
            if let Some(s) = self.memory.space_mut(space) {
                s.reclaim(placeholder);
            }
            self.adjust_all_heads();
            ctx.organism.fault(FaultLocation::Inject, FaultKind::Error, "inject: new size too small");
            return false;
        }

        let mut code = match self.memory.space_mut(space) {
            Some(s) => {
                s.truncate(end);
                s.to_genome().into_vec()
            }
            None => return false,
        };
        let rates = &self.config.mutations;
        let pass = MutationPass {
            substitution: rates.inject_mut_prob,
            insertion: rates.inject_ins_prob,
            deletion: rates.inject_del_prob,
        };
        self.mutate_code(ctx.rng, &mut code, pass);
        self.mutate_parent(ctx.rng);
        ctx.organism.phenotype_mut().div_type = 1.0;

        let size = code.len();
        let owner = self.cur().owner;
        let accepted = !code.is_empty() && ctx.organism.inject_parasite(owner, &label, Genome::new(code));

        if let Some(s) = self.memory.space_mut(space) {
            s.reclaim(placeholder);
        }
        self.adjust_all_heads();

        if self.config.inject_method == InjectMethod::Split {
            let ip_space = self.cur().ip().space;
            self.cur_mut().reset_heads_and_stacks(ip_space);
        }
        self.advance_ip = false;

        log::debug!(
            "inject {} sites from space {} as {} ({})",
            size,
            space,
            label,
            if accepted { "accepted" } else { "refused" }
        );
        accepted
    }

    /// Install a parasite in its own labeled space and thread.
    ///
    /// Fails when the label is empty or already names a space, when a running
    /// thread holds the label, or when no thread slot is left.
    pub fn parasite_infect_host(&mut self, parasite: &Parasite, organism: &mut dyn Organism) -> bool {
        let label = &parasite.label;
        if label.is_empty() || parasite.code.is_empty() || self.memory_space_exists(label) {
            return false;
        }

        let existing = self.threads.find_label(label);
        match existing.and_then(|idx| self.threads.get(idx)) {
            Some(thread) if thread.running => return false,
            Some(_) => {}
            None if self.threads.len() >= self.config.max_cpu_threads => return false,
            None => {}
        }

        let space = self.find_memory_space(label);
        let placeholder = self.lib.default_inst();
        if let Some(s) = self.memory.space_mut(space) {
            s.load(&parasite.code, placeholder);
            s.flag_all(SiteFlags::INJECTED);
        }

        let mut thread = Thread::new(space);
        thread.owner = ThreadOwner::Parasite(parasite.id);
        let idx = match existing.and_then(|idx| self.threads.get_mut(idx).map(|t| (idx, t))) {
            Some((idx, slot)) => {
                *slot = thread;
                idx
            }
            None => self.threads.push_labeled(label, thread),
        };

        if self.config.inject_is_virulent {
            if let Some(host) = self.threads.get_mut(0) {
                host.skip_cycle = true;
            }
        }
        self.parasite_virulence = parasite.virulence;
        organism.phenotype_mut().is_modified = true;

        log::debug!(
            "parasite {} installed as thread {} in space {} ({} sites)",
            parasite.id,
            idx + 1,
            space,
            parasite.code.len()
        );
        true
    }
}
