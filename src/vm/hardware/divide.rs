//! Divide - Carving an offspring out of a memory space
//!
//! ```text
//! write head (space s > 0, pos p > 0)
//!   ├─ viability: size bounds, executed/copied fractions, organism veto
//!   │     └─ any failure: fault, leave every space and thread untouched
//!   ├─ truncate s to p, take it as the offspring
//!   ├─ offspring mutations (substitution, insertion, deletion)
//!   ├─ parent point mutations in space 0
//!   ├─ activate_divide(offspring), reclaim s
//!   └─ parent reset per DivideMethod
//! ```
//!
//! Nothing is drawn from the random stream and nothing is resized until the
//! viability checks have passed.

use super::{Context, Hardware};
use crate::config::{DivideMethod, MAX_GENOME_LENGTH, MIN_GENOME_LENGTH};
use crate::vm::head::HeadKind;
use crate::vm::instruction::{Genome, Instruction};
use crate::vm::memory::SiteFlags;
use crate::vm::organism::{FaultKind, FaultLocation, Organism};
use crate::vm::random::RandomStream;

/// Per-site probabilities for one round of offspring mutations
#[derive(Debug, Clone, Copy)]
pub(super) struct MutationPass {
    pub substitution: f64,
    pub insertion: f64,
    pub deletion: f64,
}

impl Hardware {
    pub(super) fn execute_divide(&mut self, ctx: &mut Context<'_>) -> bool {
        self.divide(ctx)
    }

    /// Attempt a divide at the write head. Returns whether an offspring was produced.
    pub fn divide(&mut self, ctx: &mut Context<'_>) -> bool {
        self.divide_main(ctx, 1.0)
    }

    fn divide_main(&mut self, ctx: &mut Context<'_>, mut_multiplier: f64) -> bool {
        let write = *self.cur().head(HeadKind::Write);
        let space = write.space;
        let valid_target = space != 0
            && write.pos > 0
            && self.memory.space(space).is_some_and(|s| write.pos as usize <= s.len());
        if !valid_target {
            self.divide_failed(ctx.organism, "divide: no offspring memory to divide");
            return false;
        }
        let child_size = write.pos as usize;

        if let Err(message) = self.check_viable(ctx.organism, space, child_size) {
            self.divide_failed(ctx.organism, message);
            return false;
        }

        let parent_size = self.memory.genome().len();
        let lines_executed = self.memory.genome().count_flag(parent_size, SiteFlags::EXECUTED);
        let lines_copied = self
            .memory
            .space(space)
            .map(|s| s.count_flag(child_size, SiteFlags::COPIED))
            .unwrap_or(0);

        let mut code = match self.memory.space_mut(space) {
            Some(s) => {
                s.truncate(child_size);
                s.to_genome().into_vec()
            }
            None => return false,
        };

        let rates = &self.config.mutations;
        let pass = MutationPass {
            substitution: rates.div_mut_prob * mut_multiplier,
            insertion: rates.div_ins_prob * mut_multiplier,
            deletion: rates.div_del_prob * mut_multiplier,
        };
        self.mutate_code(ctx.rng, &mut code, pass);
        self.mutate_parent(ctx.rng);

        let phenotype = ctx.organism.phenotype_mut();
        phenotype.lines_executed = lines_executed;
        phenotype.lines_copied = lines_copied;
        phenotype.div_type = mut_multiplier;

        let offspring_len = code.len();
        let parent_alive = ctx.organism.activate_divide(Genome::new(code));

        let placeholder = self.lib.default_inst();
        if let Some(s) = self.memory.space_mut(space) {
            s.reclaim(placeholder);
        }
        self.adjust_all_heads();

        if parent_alive {
            self.reset_after_divide(ctx.organism);
        }

        log::debug!(
            "divide from space {}: offspring {} sites, parent {} sites, executed {}, copied {}",
            space,
            offspring_len,
            parent_size,
            lines_executed,
            lines_copied
        );
        true
    }

    /// Size bounds, executed/copied fractions, then the organism's own veto
    fn check_viable(
        &self,
        organism: &mut dyn Organism,
        space: usize,
        child_size: usize,
    ) -> Result<(), &'static str> {
        let parent_size = self.memory.genome().len();
        let range = self.config.offspring_size_range;

        let mut min_size = MIN_GENOME_LENGTH.max((parent_size as f64 / range) as usize);
        let mut max_size = MAX_GENOME_LENGTH.min((parent_size as f64 * range) as usize);
        if self.config.min_genome_size > 0 {
            min_size = min_size.max(self.config.min_genome_size);
        }
        if self.config.max_genome_size > 0 {
            max_size = max_size.min(self.config.max_genome_size);
        }
        if child_size < min_size {
            return Err("divide: invalid offspring length (too small)");
        }
        if child_size > max_size {
            return Err("divide: invalid offspring length (too large)");
        }

        let executed = self.memory.genome().count_flag(parent_size, SiteFlags::EXECUTED);
        if (executed as f64) < parent_size as f64 * self.config.min_exe_lines {
            return Err("divide: too few parent lines executed");
        }

        let copied = self
            .memory
            .space(space)
            .map(|s| s.count_flag(child_size, SiteFlags::COPIED))
            .unwrap_or(0);
        if (copied as f64) < child_size as f64 * self.config.min_copied_lines {
            return Err("divide: too few offspring lines copied");
        }

        if !organism.divide_check_viable(parent_size, child_size) {
            return Err("divide: offspring rejected by organism");
        }
        Ok(())
    }

    fn divide_failed(&mut self, organism: &mut dyn Organism, message: &str) {
        organism.fault(FaultLocation::Divide, FaultKind::Error, message);
        if self.config.divide_failure_resets {
            self.reset(organism);
            self.advance_ip = false;
        }
    }

    fn reset_after_divide(&mut self, organism: &mut dyn Organism) {
        match self.config.divide_method {
            DivideMethod::Offspring => return,
            DivideMethod::Split => self.reset(organism),
            DivideMethod::Birth => {
                let threads = self.threads.len();
                let modified = organism.phenotype().is_modified;
                if (!modified && threads > 1) || threads > 2 {
                    let id = self.threads.current_id() + 1;
                    self.thread_kill(id);
                } else {
                    self.cur_mut().reset_heads_and_stacks(0);
                }
            }
        }
        self.advance_ip = false;
    }

    /// Substitutions, then insertions, then deletions, each count drawn binomially
    pub(super) fn mutate_code(&self, rng: &mut RandomStream, code: &mut Vec<Instruction>, pass: MutationPass) {
        let len = code.len();
        if len == 0 {
            return;
        }

        let subs = rng.binomial(len, pass.substitution);
        for _ in 0..subs {
            let site = rng.uint(len);
            code[site] = self.lib.random_inst(rng);
        }

        let room = MAX_GENOME_LENGTH.saturating_sub(len);
        let inserts = rng.binomial(len, pass.insertion).min(room);
        if inserts > 0 {
            let mut sites: Vec<usize> = (0..inserts).map(|_| rng.uint(len + 1)).collect();
            sites.sort_unstable();
            for &site in sites.iter().rev() {
                code.insert(site, self.lib.random_inst(rng));
            }
        }

        let len = code.len();
        let spare = len.saturating_sub(MIN_GENOME_LENGTH);
        let deletes = rng.binomial(len, pass.deletion).min(spare);
        for _ in 0..deletes {
            let site = rng.uint(code.len());
            code.remove(site);
        }
    }

    /// Point mutations applied in place to the running genome
    pub(super) fn mutate_parent(&mut self, rng: &mut RandomStream) {
        let rate = self.config.mutations.parent_mut_prob;
        if rate <= 0.0 {
            return;
        }
        let len = self.memory.genome().len();
        for pos in 0..len {
            if rng.p(rate) {
                let inst = self.lib.random_inst(rng);
                let genome = self.memory.genome_mut();
                genome.set_inst(pos, inst);
                genome.set_flag(pos, SiteFlags::POINT_MUT);
            }
        }
    }
}
