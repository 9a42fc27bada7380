//! Organism - The collaborator a virtual CPU runs on behalf of
//!
//! The hardware never owns its organism. Every engine call receives it as
//! `&mut dyn Organism`, and everything outside the CPU (population
//! placement, task rewards, message routing, parasite delivery) happens
//! behind this trait.

use super::instruction::Genome;
use super::label::Label;
use super::thread::ThreadOwner;
use std::collections::VecDeque;
use std::fmt;

/// Where a fault was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultLocation {
    Math,
    ThreadFork,
    ThreadKill,
    Divide,
    Inject,
    Message,
}

/// What kind of fault it was
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    Error,
    ForkThread,
    KillThread,
}

impl fmt::Display for FaultLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Math => "math",
            Self::ThreadFork => "thread-fork",
            Self::ThreadKill => "thread-kill",
            Self::Divide => "divide",
            Self::Inject => "inject",
            Self::Message => "message",
        };
        write!(f, "{}", s)
    }
}

/// Counters the hardware maintains for the organism
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Phenotype {
    /// Engine calls made
    pub time_used: u64,
    /// Successful executions per opcode
    pub inst_counts: Vec<u64>,
    /// Set to request death at the end of the current call
    pub to_die: bool,
    /// Copy mutations produced by Inst-Read
    pub copy_mut_count: u64,
    /// Parent sites executed at the last divide
    pub lines_executed: usize,
    /// Offspring sites copied at the last divide
    pub lines_copied: usize,
    /// Mutation multiplier of the last divide/inject
    pub div_type: f64,
    /// Organism has been modified (e.g. by a parasite)
    pub is_modified: bool,
    pub divides: u64,
}

impl Phenotype {
    pub fn inc_inst_count(&mut self, op: u8) {
        let idx = op as usize;
        if self.inst_counts.len() <= idx {
            self.inst_counts.resize(idx + 1, 0);
        }
        self.inst_counts[idx] += 1;
    }

    pub fn dec_inst_count(&mut self, op: u8) {
        if let Some(c) = self.inst_counts.get_mut(op as usize) {
            *c = c.saturating_sub(1);
        }
    }

    pub fn inst_count(&self, op: u8) -> u64 {
        self.inst_counts.get(op as usize).copied().unwrap_or(0)
    }
}

/// Services the hardware consumes from its organism
pub trait Organism {
    /// Genome the hardware is built from
    fn genome(&self) -> &Genome;

    fn phenotype(&self) -> &Phenotype;
    fn phenotype_mut(&mut self) -> &mut Phenotype;

    fn fault(&mut self, location: FaultLocation, kind: FaultKind, message: &str);

    fn die(&mut self);

    /// A site carrying the breakpoint flag was fetched
    fn breakpoint(&mut self) {}

    fn next_input(&mut self) -> i32;
    fn do_input(&mut self, value: i32);
    fn do_output(&mut self, value: i32);

    /// Deliver `(label, data)` to the network; false when nobody takes it
    fn send_message(&mut self, label: i32, data: i32) -> bool;
    /// Next pending `(label, data)`
    fn retrieve_message(&mut self) -> Option<(i32, i32)>;

    /// Extra viability veto after the size checks pass
    fn divide_check_viable(&mut self, _parent_size: usize, _child_size: usize) -> bool {
        true
    }

    /// Hand over the offspring genome. Returns whether the parent is still alive.
    fn activate_divide(&mut self, offspring: Genome) -> bool;

    /// Offer parasite code to a neighbour. Returns whether it was installed.
    fn inject_parasite(&mut self, owner: ThreadOwner, label: &Label, code: Genome) -> bool;

    /// Forget all parasites hosted by this organism
    fn clear_parasites(&mut self);

    fn cell_id(&self) -> Option<usize> {
        None
    }
}

/// A fault as reported to [`RecordingOrganism`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaultRecord {
    pub location: FaultLocation,
    pub kind: FaultKind,
    pub message: String,
}

/// Injection offered through [`RecordingOrganism`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectRecord {
    pub owner: ThreadOwner,
    pub label: Label,
    pub code: Genome,
}

/// Standalone organism that records everything the hardware tells it.
///
/// Used by the trace binary and tests; it has no population around it, so
/// injections are recorded and accepted (or refused) by a flag, and
/// messages sent are looped back into its own inbox.
#[derive(Debug, Clone)]
pub struct RecordingOrganism {
    genome: Genome,
    phenotype: Phenotype,
    pub offspring: Vec<Genome>,
    pub faults: Vec<FaultRecord>,
    pub outputs: Vec<i32>,
    pub inputs_taken: Vec<i32>,
    pub sent: Vec<(i32, i32)>,
    pub injections: Vec<InjectRecord>,
    pub inbox: VecDeque<(i32, i32)>,
    pub inputs: Vec<i32>,
    input_pointer: usize,
    pub dead: bool,
    pub breakpoints: u64,
    pub parasites_cleared: u64,
    /// Parent survives its divides
    pub parent_survives: bool,
    /// Answer to `divide_check_viable`
    pub viable: bool,
    /// Answer to `inject_parasite`
    pub accept_parasites: bool,
    /// Loop sent messages back into the inbox
    pub loopback: bool,
    pub cell: Option<usize>,
}

impl RecordingOrganism {
    pub fn new(genome: Genome) -> Self {
        Self {
            genome,
            phenotype: Phenotype::default(),
            offspring: Vec::new(),
            faults: Vec::new(),
            outputs: Vec::new(),
            inputs_taken: Vec::new(),
            sent: Vec::new(),
            injections: Vec::new(),
            inbox: VecDeque::new(),
            inputs: vec![0x0f13_149f, 0x3308_e53e, 0x556f_0b5b],
            input_pointer: 0,
            dead: false,
            breakpoints: 0,
            parasites_cleared: 0,
            parent_survives: true,
            viable: true,
            accept_parasites: true,
            loopback: false,
            cell: None,
        }
    }

    pub fn with_inputs(mut self, inputs: Vec<i32>) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn fault_count(&self, location: FaultLocation) -> usize {
        self.faults.iter().filter(|f| f.location == location).count()
    }
}

impl Organism for RecordingOrganism {
    fn genome(&self) -> &Genome {
        &self.genome
    }

    fn phenotype(&self) -> &Phenotype {
        &self.phenotype
    }

    fn phenotype_mut(&mut self) -> &mut Phenotype {
        &mut self.phenotype
    }

    fn fault(&mut self, location: FaultLocation, kind: FaultKind, message: &str) {
        self.faults.push(FaultRecord { location, kind, message: message.to_string() });
    }

    fn die(&mut self) {
        self.dead = true;
    }

    fn breakpoint(&mut self) {
        self.breakpoints += 1;
    }

    fn next_input(&mut self) -> i32 {
        if self.inputs.is_empty() {
            return 0;
        }
        let value = self.inputs[self.input_pointer % self.inputs.len()];
        self.input_pointer = (self.input_pointer + 1) % self.inputs.len();
        value
    }

    fn do_input(&mut self, value: i32) {
        self.inputs_taken.push(value);
    }

    fn do_output(&mut self, value: i32) {
        self.outputs.push(value);
    }

    fn send_message(&mut self, label: i32, data: i32) -> bool {
        self.sent.push((label, data));
        if self.loopback {
            self.inbox.push_back((label, data));
        }
        true
    }

    fn retrieve_message(&mut self) -> Option<(i32, i32)> {
        self.inbox.pop_front()
    }

    fn divide_check_viable(&mut self, _parent_size: usize, _child_size: usize) -> bool {
        self.viable
    }

    fn activate_divide(&mut self, offspring: Genome) -> bool {
        self.offspring.push(offspring);
        self.phenotype.divides += 1;
        self.parent_survives
    }

    fn inject_parasite(&mut self, owner: ThreadOwner, label: &Label, code: Genome) -> bool {
        self.injections.push(InjectRecord { owner, label: label.clone(), code });
        self.accept_parasites
    }

    fn clear_parasites(&mut self) {
        self.parasites_cleared += 1;
    }

    fn cell_id(&self) -> Option<usize> {
        self.cell
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::instruction::Instruction;

    #[test]
    fn test_inst_counts() {
        let mut p = Phenotype::default();
        p.inc_inst_count(5);
        p.inc_inst_count(5);
        p.dec_inst_count(5);
        p.dec_inst_count(9);
        assert_eq!(p.inst_count(5), 1);
        assert_eq!(p.inst_count(9), 0);
    }

    #[test]
    fn test_recording_inputs_cycle() {
        let mut org = RecordingOrganism::new(Genome::new(vec![Instruction(0)]))
            .with_inputs(vec![1, 2]);
        assert_eq!(org.next_input(), 1);
        assert_eq!(org.next_input(), 2);
        assert_eq!(org.next_input(), 1);
    }

    #[test]
    fn test_recording_loopback() {
        let mut org = RecordingOrganism::new(Genome::default());
        assert!(org.send_message(1, 2));
        assert_eq!(org.retrieve_message(), None);
        org.loopback = true;
        org.send_message(3, 4);
        assert_eq!(org.retrieve_message(), Some((3, 4)));
    }
}
