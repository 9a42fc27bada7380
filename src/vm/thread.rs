//! Thread - Independent instruction streams within one organism
//!
//! Each thread owns its heads, stacks and label buffers. Threads are never
//! removed from the table; killing one only clears its `running` flag so
//! thread ids (1-based, as seen by organisms) stay stable.

use super::head::{Head, HeadKind};
use super::label::Label;
use super::stack::StackBank;
use super::inst_lib::NUM_NOPS;
use std::collections::HashMap;
use std::fmt;

/// Who a thread's work is accounted to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ThreadOwner {
    #[default]
    Host,
    /// Foreign code installed by injection, tagged with the parasite id
    Parasite(u64),
}

impl ThreadOwner {
    pub fn is_parasite(&self) -> bool {
        matches!(self, Self::Parasite(_))
    }
}

impl fmt::Display for ThreadOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Host => write!(f, "host"),
            Self::Parasite(id) => write!(f, "parasite#{}", id),
        }
    }
}

/// One instruction stream
#[derive(Debug, Clone, PartialEq)]
pub struct Thread {
    pub heads: [Head; HeadKind::COUNT],
    pub stacks: StackBank,
    /// Nops seen by recent Inst-Reads
    pub read_label: Label,
    /// Label most recently read after the IP
    pub next_label: Label,
    pub running: bool,
    /// Skip this thread once on its next scheduling turn
    pub skip_cycle: bool,
    pub owner: ThreadOwner,
    /// Fetches still owed before the current instruction may execute
    pub cost_remaining: u32,
    /// Last Inst-Read produced a copy mutation
    pub read_mutated: bool,
}

impl Thread {
    pub fn new(space: usize) -> Self {
        Self {
            heads: [Head::new(space, 0); HeadKind::COUNT],
            stacks: StackBank::new(),
            read_label: Label::new(),
            next_label: Label::new(),
            running: true,
            skip_cycle: false,
            owner: ThreadOwner::Host,
            cost_remaining: 0,
            read_mutated: false,
        }
    }

    /// Fresh running state in `space`; owner reverts to host
    pub fn reset(&mut self, space: usize) {
        *self = Self::new(space);
    }

    /// Heads to `space` position 0 and stacks cleared, other state kept
    pub fn reset_heads_and_stacks(&mut self, space: usize) {
        for head in &mut self.heads {
            head.reset(space);
        }
        self.stacks.clear();
    }

    pub fn head(&self, kind: HeadKind) -> &Head {
        &self.heads[kind.index()]
    }

    pub fn head_mut(&mut self, kind: HeadKind) -> &mut Head {
        &mut self.heads[kind.index()]
    }

    pub fn ip(&self) -> &Head {
        self.head(HeadKind::Ip)
    }

    pub fn ip_mut(&mut self) -> &mut Head {
        self.head_mut(HeadKind::Ip)
    }

    pub fn ok(&self) -> bool {
        self.stacks.ok()
    }
}

/// Thread list plus the label → thread index lookup
#[derive(Debug, Clone, PartialEq)]
pub struct ThreadTable {
    threads: Vec<Thread>,
    labels: HashMap<u64, usize>,
    current: usize,
}

impl ThreadTable {
    /// A single running host thread in space 0
    pub fn new() -> Self {
        Self { threads: vec![Thread::new(0)], labels: HashMap::new(), current: 0 }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn len(&self) -> usize {
        self.threads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.threads.is_empty()
    }

    pub fn current_id(&self) -> usize {
        self.current
    }

    pub fn set_current(&mut self, idx: usize) {
        self.current = if idx < self.threads.len() { idx } else { 0 };
    }

    pub fn current(&self) -> &Thread {
        &self.threads[self.current]
    }

    pub fn current_mut(&mut self) -> &mut Thread {
        &mut self.threads[self.current]
    }

    pub fn get(&self, idx: usize) -> Option<&Thread> {
        self.threads.get(idx)
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut Thread> {
        self.threads.get_mut(idx)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Thread> {
        self.threads.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Thread> {
        self.threads.iter_mut()
    }

    /// Move to the next thread, wrapping to 0
    pub fn next(&mut self) {
        self.current += 1;
        if self.current >= self.threads.len() {
            self.current = 0;
        }
    }

    /// Thread index registered for `label`; the empty label is thread 0
    pub fn find_label(&self, label: &Label) -> Option<usize> {
        if label.is_empty() {
            return Some(0);
        }
        self.labels.get(&label.as_int(NUM_NOPS as u64)).copied()
    }

    /// Append a thread registered under `label`, returning its index
    pub fn push_labeled(&mut self, label: &Label, thread: Thread) -> usize {
        let idx = self.threads.len();
        self.threads.push(thread);
        self.labels.insert(label.as_int(NUM_NOPS as u64), idx);
        idx
    }

    /// Stop thread `id` (1-based). Killing the current thread moves on first.
    pub fn kill(&mut self, id: usize) -> bool {
        if id < 1 || id > self.threads.len() {
            return false;
        }
        let idx = id - 1;
        if self.current == idx {
            self.next();
        }
        self.threads[idx].running = false;
        true
    }

    pub fn running_count(&self) -> usize {
        self.threads.iter().filter(|t| t.running).count()
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_table() {
        let table = ThreadTable::new();
        assert_eq!(table.len(), 1);
        assert!(table.current().running);
        assert_eq!(table.current().owner, ThreadOwner::Host);
        assert_eq!(table.find_label(&Label::new()), Some(0));
    }

    #[test]
    fn test_push_and_lookup() {
        let mut table = ThreadTable::new();
        let label = Label::from_mods(&[1, 2]);
        let idx = table.push_labeled(&label, Thread::new(1));
        assert_eq!(idx, 1);
        assert_eq!(table.find_label(&label), Some(1));
        assert_eq!(table.find_label(&Label::from_mods(&[1])), None);
    }

    #[test]
    fn test_kill_current_moves_on() {
        let mut table = ThreadTable::new();
        table.push_labeled(&Label::from_mods(&[0]), Thread::new(0));
        assert!(table.kill(1));
        assert_eq!(table.current_id(), 1);
        assert!(!table.get(0).unwrap().running);
        assert!(!table.kill(0));
        assert!(!table.kill(3));
        assert_eq!(table.running_count(), 1);
    }

    #[test]
    fn test_reset_heads_keeps_owner() {
        let mut thread = Thread::new(2);
        thread.owner = ThreadOwner::Parasite(9);
        thread.stacks.push(0, 4);
        thread.heads[1].pos = 5;
        thread.reset_heads_and_stacks(0);
        assert_eq!(thread.owner, ThreadOwner::Parasite(9));
        assert_eq!(thread.heads[1], Head::new(0, 0));
        assert_eq!(thread.stacks.top(0), 0);
        thread.reset(0);
        assert_eq!(thread.owner, ThreadOwner::Host);
    }
}
