use super::*;
use crate::config::{
    DivideMethod, InjectMethod, InstOverride, InstSetConfig, MutationRates, MAX_GENOME_LENGTH,
    MIN_GENOME_LENGTH,
};
use crate::vm::organism::{FaultLocation, RecordingOrganism};
use crate::vm::stack::{STACK_AX, STACK_BX, STACK_CX};
use crate::vm::thread::ThreadOwner;
use proptest::prelude::*;

/// Mem-Set A; Head-Move C; Search; loop { Inst-Read; Inst-Write; Divide; Head-Move A }
const SELF_COPY: [Opcode; 10] = [
    Opcode::MemSet,
    Opcode::NopA,
    Opcode::HeadMove,
    Opcode::NopC,
    Opcode::Search,
    Opcode::InstRead,
    Opcode::InstWrite,
    Opcode::Divide,
    Opcode::HeadMove,
    Opcode::NopA,
];

fn genome(ops: &[Opcode]) -> Genome {
    Genome::new(ops.iter().map(|op| op.inst()).collect())
}

fn quiet_config() -> HardwareConfig {
    HardwareConfig {
        offspring_size_range: 1.0,
        min_copied_lines: 0.0,
        min_exe_lines: 0.0,
        mutations: MutationRates::none(),
        ..HardwareConfig::default()
    }
}

struct Rig {
    hw: Hardware,
    org: RecordingOrganism,
    rng: RandomStream,
}

impl Rig {
    fn new(ops: &[Opcode], config: HardwareConfig) -> Self {
        Self::with_lib(ops, config, InstLib::standard())
    }

    fn with_lib(ops: &[Opcode], config: HardwareConfig, lib: InstLib) -> Self {
        let org = RecordingOrganism::new(genome(ops));
        let hw = Hardware::from_organism(Arc::new(lib), Arc::new(config), &org);
        Self { hw, org, rng: RandomStream::new(42) }
    }

    fn step(&mut self) -> StepResult {
        let mut ctx = Context::new(&mut self.rng, &mut self.org);
        self.hw.single_process(&mut ctx)
    }

    fn run(&mut self, steps: usize) {
        for _ in 0..steps {
            self.step();
        }
    }

    fn bonus(&mut self, op: Opcode) -> bool {
        let mut ctx = Context::new(&mut self.rng, &mut self.org);
        self.hw.process_bonus_inst(&mut ctx, op.inst())
    }

    fn divide(&mut self) -> bool {
        let mut ctx = Context::new(&mut self.rng, &mut self.org);
        self.hw.divide(&mut ctx)
    }
}

fn filler(n: usize) -> Vec<Opcode> {
    vec![Opcode::ValAdd; n]
}

// =============================================================================
// Replication
// =============================================================================

#[test]
fn test_self_copy_loop_produces_identical_offspring() {
    let mut rig = Rig::new(&SELF_COPY, quiet_config());

    let mut steps = 0;
    while rig.org.offspring.is_empty() && steps < 200 {
        rig.step();
        steps += 1;
    }

    assert_eq!(steps, 42);
    assert_eq!(rig.org.offspring.len(), 1);
    assert_eq!(rig.org.offspring[0], genome(&SELF_COPY));
    assert_eq!(rig.org.offspring[0].len(), 10);
    assert_eq!(rig.org.fault_count(FaultLocation::Divide), 9);
    assert_eq!(rig.org.phenotype().inst_count(Opcode::Divide.as_u8()), 1);

    // Split reset: one thread, genome space only, heads at the loop start
    assert_eq!(rig.hw.memory().len(), 1);
    assert_eq!(rig.hw.num_threads(), 1);
    for kind in HeadKind::ALL {
        assert_eq!(rig.hw.head(kind), Head::new(0, 0));
    }
    assert_eq!(rig.org.parasites_cleared, 1);
    assert!(rig.hw.ok());
}

#[test]
fn test_self_copy_loop_repeats_after_reset() {
    let mut rig = Rig::new(&SELF_COPY, quiet_config());
    rig.run(84);
    assert_eq!(rig.org.offspring.len(), 2);
    assert_eq!(rig.org.offspring[1], genome(&SELF_COPY));
    assert_eq!(rig.hw.genome(), genome(&SELF_COPY));
}

#[test]
fn test_offspring_method_keeps_parent_running() {
    let config = HardwareConfig { divide_method: DivideMethod::Offspring, ..quiet_config() };
    let mut rig = Rig::new(&SELF_COPY, config);
    rig.run(42);

    assert_eq!(rig.org.offspring.len(), 1);
    assert_eq!(rig.hw.ip(), Head::new(0, 8));
    assert_eq!(rig.hw.memory().space(1).map(|s| s.len()), Some(1));
    assert!(rig.hw.ok());
}

#[test]
fn test_divide_at_position_zero_is_atomic() {
    let mut rig = Rig::new(&SELF_COPY, quiet_config());
    rig.run(3);
    assert_eq!(rig.hw.head(HeadKind::Write), Head::new(1, 0));

    let memory = rig.hw.memory.clone();
    let threads = rig.hw.threads.clone();
    let draws = rig.rng.draws();

    assert!(!rig.divide());
    assert_eq!(rig.hw.memory, memory);
    assert_eq!(rig.hw.threads, threads);
    assert_eq!(rig.rng.draws(), draws);
    assert_eq!(rig.org.fault_count(FaultLocation::Divide), 1);
    assert!(rig.org.offspring.is_empty());
}

#[test]
fn test_divide_from_genome_space_fails() {
    let mut rig = Rig::new(&filler(12), quiet_config());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(10, 0);
    assert!(!rig.divide());
    assert_eq!(rig.hw.genome().len(), 12);
    assert!(rig.org.offspring.is_empty());
}

#[test]
fn test_divide_failure_resets_when_configured() {
    let config = HardwareConfig { divide_failure_resets: true, max_cpu_threads: 2, ..quiet_config() };
    let mut rig = Rig::new(&filler(10), config);
    rig.hw.find_memory_space(&Label::from_mods(&[2]));
    rig.hw.thread_create(&Label::from_mods(&[0]), 0);
    assert_eq!(rig.hw.memory().len(), 2);

    assert!(!rig.divide());
    assert_eq!(rig.hw.memory().len(), 1);
    assert_eq!(rig.hw.num_threads(), 1);
    assert_eq!(rig.org.parasites_cleared, 1);
}

#[test]
fn test_divide_respects_organism_veto_and_copied_fraction() {
    let mut rig = Rig::new(&filler(10), quiet_config());
    let space = rig.hw.find_memory_space(&Label::from_mods(&[0]));
    rig.hw.memory_mut().space_mut(space).unwrap().load(&genome(&filler(11)), Opcode::NopA.inst());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(10, space);

    rig.org.viable = false;
    assert!(!rig.divide());
    rig.org.viable = true;

    let mut strict = quiet_config();
    strict.min_copied_lines = 0.5;
    rig.hw.config = Arc::new(strict);
    assert!(!rig.divide());
    assert_eq!(rig.org.fault_count(FaultLocation::Divide), 2);

    rig.hw.config = Arc::new(quiet_config());
    assert!(rig.divide());
    assert_eq!(rig.org.offspring[0].len(), 10);
    assert_eq!(rig.org.phenotype().lines_copied, 0);
}

#[test]
fn test_birth_method_resets_only_calling_thread() {
    let config = HardwareConfig { divide_method: DivideMethod::Birth, ..quiet_config() };
    let mut rig = Rig::new(&filler(10), config);
    let space = rig.hw.find_memory_space(&Label::from_mods(&[0]));
    rig.hw.memory_mut().space_mut(space).unwrap().load(&genome(&filler(10)), Opcode::NopA.inst());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(10, space);
    rig.hw.threads.current_mut().stacks.push(STACK_AX, 9);

    assert!(rig.divide());
    assert_eq!(rig.hw.memory().len(), 2);
    assert_eq!(rig.hw.head(HeadKind::Write), Head::new(0, 0));
    assert_eq!(rig.hw.stack(STACK_AX), 0);
}

#[test]
fn test_divide_mutations_change_offspring() {
    let mut config = quiet_config();
    config.mutations.div_mut_prob = 1.0;
    let mut rig = Rig::new(&filler(10), config);
    let space = rig.hw.find_memory_space(&Label::from_mods(&[0]));
    rig.hw.memory_mut().space_mut(space).unwrap().load(&genome(&filler(10)), Opcode::NopA.inst());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(10, space);

    let draws = rig.rng.draws();
    assert!(rig.divide());
    // ten binomial trials, then a site and an instruction per substitution
    assert_eq!(rig.rng.draws(), draws + 10 + 20);
    assert_eq!(rig.org.offspring[0].len(), 10);
}

fn divide_rig(parent: usize, child: usize, config: HardwareConfig) -> Rig {
    let mut rig = Rig::new(&filler(parent), config);
    let space = rig.hw.find_memory_space(&Label::from_mods(&[0]));
    rig.hw.memory_mut().space_mut(space).unwrap().load(&genome(&filler(child)), Opcode::NopA.inst());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(child as i32, space);
    rig
}

#[test]
fn test_insertions_capped_at_max_length() {
    let mut config = quiet_config();
    config.mutations.div_ins_prob = 1.0;
    let mut rig = divide_rig(2040, 2040, config);

    let draws = rig.rng.draws();
    assert!(rig.divide());
    // 2040 trials, then a site and an instruction for each of the 8 inserts
    assert_eq!(rig.rng.draws(), draws + 2040 + 16);
    let child = &rig.org.offspring[0];
    assert_eq!(child.len(), MAX_GENOME_LENGTH);
    let kept = child.iter().filter(|&&inst| inst == Opcode::ValAdd.inst()).count();
    assert!(kept >= 2040);
}

#[test]
fn test_deletions_stop_at_min_length() {
    let mut config = quiet_config();
    config.mutations.div_del_prob = 1.0;
    let mut rig = divide_rig(10, 10, config);

    let draws = rig.rng.draws();
    assert!(rig.divide());
    // 10 trials, then one site per delete
    assert_eq!(rig.rng.draws(), draws + 10 + 2);
    assert_eq!(rig.org.offspring[0], genome(&filler(MIN_GENOME_LENGTH)));
}

#[test]
fn test_parent_mutations_flag_genome() {
    let mut config = quiet_config();
    config.mutations.parent_mut_prob = 1.0;
    let mut rig = divide_rig(10, 10, config);

    let draws = rig.rng.draws();
    assert!(rig.divide());
    // a trial and an instruction per parent site; the offspring is untouched
    assert_eq!(rig.rng.draws(), draws + 20);
    assert_eq!(rig.org.offspring[0], genome(&filler(10)));
    let parent = rig.hw.memory().genome();
    assert_eq!(parent.count_flag(parent.len(), SiteFlags::POINT_MUT), 10);
}

#[test]
fn test_zero_rates_draw_nothing_at_divide() {
    let mut rig = divide_rig(10, 10, quiet_config());
    assert!(rig.divide());
    assert_eq!(rig.rng.draws(), 0);
    assert_eq!(rig.hw.memory().genome().count_flag(10, SiteFlags::POINT_MUT), 0);
}

// =============================================================================
// Memory and copying
// =============================================================================

#[test]
fn test_write_past_end_grows_by_one() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(7, 0);

    rig.hw.threads.current_mut().stacks.push(STACK_AX, Opcode::ValSub.as_u8() as i32);
    assert!(rig.bonus(Opcode::InstWrite));
    assert_eq!(rig.hw.memory().genome().len(), 9);
    assert_eq!(rig.hw.memory().genome().inst(7), Opcode::ValSub.inst());
    assert_eq!(rig.hw.head(HeadKind::Write), Head::new(0, 8));

    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(2, 0);
    assert!(rig.bonus(Opcode::InstWrite));
    assert_eq!(rig.hw.memory().genome().len(), 9);
    assert!(rig.hw.memory().genome().flags(2).copied());
}

#[test]
fn test_write_out_of_range_value_writes_default() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(3, 0);
    rig.hw.threads.current_mut().stacks.push(STACK_AX, 999);
    assert!(rig.bonus(Opcode::InstWrite));
    assert_eq!(rig.hw.memory().genome().inst(3), Opcode::NopA.inst());
}

#[test]
fn test_copy_mutation_rate_statistics() {
    let mut config = quiet_config();
    config.mutations.copy_mut_prob = 0.25;
    let mut rig = Rig::new(&filler(8), config);
    for _ in 0..2000 {
        rig.bonus(Opcode::InstRead);
    }
    let count = rig.org.phenotype().copy_mut_count;
    assert!((400..=600).contains(&count), "copy mutations: {}", count);
}

#[test]
fn test_zero_copy_rate_draws_nothing() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    for _ in 0..50 {
        rig.bonus(Opcode::InstRead);
    }
    assert_eq!(rig.rng.draws(), 0);
    assert_eq!(rig.org.phenotype().copy_mut_count, 0);
    assert_eq!(rig.hw.head(HeadKind::Read), Head::new(0, 50 % 8));
}

#[test]
fn test_parasite_threads_skip_copy_mutations() {
    let mut config = quiet_config();
    config.mutations.copy_mut_prob = 1.0;
    config.parasite_no_copy_mut = true;
    let mut rig = Rig::new(&filler(8), config);
    rig.hw.threads.current_mut().owner = ThreadOwner::Parasite(3);
    rig.bonus(Opcode::InstRead);
    assert_eq!(rig.org.phenotype().copy_mut_count, 0);
    assert_eq!(rig.hw.stack(STACK_AX), Opcode::ValAdd.as_u8() as i32);
}

#[test]
fn test_mem_set_parasite_namespace() {
    let config = HardwareConfig { parasite_mem_spaces: true, ..quiet_config() };
    let mut ops = vec![Opcode::MemSet, Opcode::NopA];
    ops.extend(filler(6));
    let mut rig = Rig::new(&ops, config);
    rig.hw.threads.current_mut().owner = ThreadOwner::Parasite(1);
    rig.step();

    assert!(rig.hw.memory_space_exists(&Label::from_mods(&[0, 1, 1, 1, 1])));
    assert!(!rig.hw.memory_space_exists(&Label::from_mods(&[0])));
    assert_eq!(rig.hw.head(HeadKind::Flow), Head::new(1, 0));
}

// =============================================================================
// Arithmetic and flow
// =============================================================================

#[test]
fn test_div_by_zero_faults_and_advances() {
    let mut ops = vec![Opcode::ValDiv, Opcode::ValMod];
    ops.extend(filler(6));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.run(2);

    assert_eq!(rig.org.fault_count(FaultLocation::Math), 2);
    assert_eq!(rig.org.faults[0].message, "div: dividing by 0");
    assert_eq!(rig.org.faults[1].message, "mod: modding by 0");
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValDiv.as_u8()), 0);
    assert_eq!(rig.hw.ip(), Head::new(0, 2));
}

#[test]
fn test_div_overflow_faults_but_counts() {
    let mut ops = vec![Opcode::ValDiv];
    ops.extend(filler(7));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.hw.threads.current_mut().stacks.push(STACK_BX, i32::MIN);
    rig.hw.threads.current_mut().stacks.push(STACK_CX, -1);
    rig.step();

    assert_eq!(rig.org.fault_count(FaultLocation::Math), 1);
    assert_eq!(rig.org.faults[0].message, "div: overflow exception");
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValDiv.as_u8()), 1);
    assert_eq!(rig.hw.stack(STACK_BX), i32::MIN);
    assert_eq!(rig.hw.ip(), Head::new(0, 1));
}

proptest! {
    #[test]
    fn test_arithmetic_contract(a in any::<i32>(), b in any::<i32>()) {
        // (op, pushed value, instruction succeeds)
        let cases: [(Opcode, Option<i32>, bool); 6] = [
            (Opcode::ValAdd, Some(a.wrapping_add(b)), true),
            (Opcode::ValSub, Some(a.wrapping_sub(b)), true),
            (Opcode::ValMult, Some(a.wrapping_mul(b)), true),
            (Opcode::ValNand, Some(!(a & b)), true),
            (Opcode::ValDiv, a.checked_div(b), b != 0),
            (Opcode::ValMod, if b == 0 { None } else { Some(a.wrapping_rem(b)) }, b != 0),
        ];
        for (op, expected, succeeds) in cases {
            let mut rig = Rig::new(&filler(8), quiet_config());
            rig.hw.threads.current_mut().stacks.push(STACK_BX, a);
            rig.hw.threads.current_mut().stacks.push(STACK_CX, b);
            let ok = rig.bonus(op);
            prop_assert_eq!(ok, succeeds);
            if let Some(value) = expected {
                prop_assert_eq!(rig.hw.stack(STACK_BX), value);
            } else {
                prop_assert_eq!(rig.hw.stack(STACK_BX), a);
                prop_assert_eq!(rig.org.fault_count(FaultLocation::Math), 1);
            }
        }
    }

    #[test]
    fn test_shift_never_fails(value in any::<i32>(), shift in any::<i32>()) {
        let mut rig = Rig::new(&filler(8), quiet_config());
        rig.hw.threads.current_mut().stacks.push(STACK_BX, value);
        rig.hw.threads.current_mut().stacks.push(STACK_CX, shift);
        prop_assert!(rig.bonus(Opcode::ValShift));
        prop_assert!(rig.hw.ok());
    }
}

#[test]
fn test_if_skips_on_false() {
    let mut ops = vec![Opcode::IfNotEqual, Opcode::ValInc, Opcode::IfEqual, Opcode::ValInc];
    ops.extend(filler(4));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.step();
    assert_eq!(rig.hw.ip(), Head::new(0, 2));
    rig.step();
    assert_eq!(rig.hw.ip(), Head::new(0, 2));
    rig.step();
    assert_eq!(rig.hw.stack(STACK_BX), 1);
}

#[test]
fn test_search_finds_complement_label() {
    let ops = [
        Opcode::Search,
        Opcode::NopA,
        Opcode::ValAdd,
        Opcode::ValAdd,
        Opcode::NopC,
        Opcode::ValAdd,
        Opcode::ValAdd,
        Opcode::ValAdd,
    ];
    let mut rig = Rig::new(&ops, quiet_config());
    rig.step();

    assert_eq!(rig.hw.stack(STACK_BX), 5);
    assert_eq!(rig.hw.stack(STACK_AX), 1);
    assert_eq!(rig.hw.head(HeadKind::Flow), Head::new(0, 4));
    assert_eq!(rig.hw.ip(), Head::new(0, 2));
}

#[test]
fn test_search_miss_points_flow_after_ip() {
    let mut ops = vec![Opcode::Search, Opcode::NopB];
    ops.extend(filler(6));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.step();
    assert_eq!(rig.hw.stack(STACK_BX), 0);
    assert_eq!(rig.hw.head(HeadKind::Flow), Head::new(0, 2));
}

#[test]
fn test_head_push_and_pop() {
    let mut ops = vec![Opcode::HeadPush, Opcode::NopD, Opcode::HeadPop, Opcode::NopA];
    ops.extend(filler(4));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.hw.threads.current_mut().head_mut(HeadKind::Flow).set(5, 0);

    rig.step();
    assert_eq!(rig.hw.stack(STACK_BX), 5);
    rig.step();
    assert_eq!(rig.hw.ip(), Head::new(0, 6));
}

#[test]
fn test_call_and_return() {
    let mut ops = vec![Opcode::Call, Opcode::NopA];
    ops.extend(filler(6));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.step();

    assert_eq!(rig.hw.memory().len(), 2);
    assert_eq!(rig.hw.ip(), Head::new(1, 0));
    assert_eq!(rig.hw.stack(STACK_AX), 0);
    assert!(rig.hw.memory_space_exists(&Label::from_mods(&[1])));

    assert!(rig.bonus(Opcode::Return));
    assert_eq!(rig.hw.ip(), Head::new(0, 0));
}

// =============================================================================
// Threads
// =============================================================================

#[test]
fn test_thread_cap_and_restart() {
    let config = HardwareConfig { max_cpu_threads: 2, ..quiet_config() };
    let mut rig = Rig::new(&filler(8), config);
    let a = Label::from_mods(&[0]);
    let b = Label::from_mods(&[1]);

    assert_eq!(rig.hw.thread_create(&Label::new(), 0), 0);
    assert_eq!(rig.hw.thread_create(&a, 0), 2);
    assert_eq!(rig.hw.thread_create(&b, 0), 0);
    assert_eq!(rig.hw.num_threads(), 2);

    assert!(rig.hw.thread_kill(2));
    assert!(!rig.hw.threads().get(1).unwrap().running);
    rig.hw.config = Arc::new(HardwareConfig { max_cpu_threads: 3, ..quiet_config() });
    assert_eq!(rig.hw.thread_create(&a, 0), 2);
    assert!(rig.hw.threads().get(1).unwrap().running);
    assert_eq!(rig.hw.thread_create(&a, 0), 0);
}

#[test]
fn test_thread_set_creates_labeled_thread() {
    let config = HardwareConfig { max_cpu_threads: 4, ..quiet_config() };
    let mut ops = vec![Opcode::ValInc, Opcode::ThreadSet, Opcode::NopB];
    ops.extend(filler(5));
    let mut rig = Rig::new(&ops, config);
    rig.run(2);

    assert_eq!(rig.hw.num_threads(), 2);
    let host = rig.hw.threads().get(0).unwrap();
    assert_eq!(host.stacks.top(STACK_CX), 2);
    let child = rig.hw.threads().get(1).unwrap();
    assert!(child.running);
    assert_eq!(child.owner, ThreadOwner::Host);
    assert!(rig.org.faults.is_empty());
    assert!(rig.hw.ok());
}

#[test]
fn test_thread_set_over_cap_faults() {
    let mut ops = vec![Opcode::ValInc, Opcode::ThreadSet, Opcode::NopB];
    ops.extend(filler(5));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.run(2);

    assert_eq!(rig.hw.num_threads(), 1);
    assert_eq!(rig.org.fault_count(FaultLocation::ThreadFork), 1);
    assert_eq!(rig.hw.stack(STACK_CX), 0);
}

#[test]
fn test_thread_set_without_label_kills_current() {
    let mut rig = Rig::new(&[Opcode::ThreadSet; 8], quiet_config());
    rig.step();
    assert_eq!(rig.hw.threads().running_count(), 0);

    let ip = rig.hw.ip();
    rig.run(3);
    assert_eq!(rig.hw.ip(), ip);
    assert_eq!(rig.org.phenotype().time_used, 4);
}

#[test]
fn test_thread_get_reports_current() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    assert!(rig.bonus(Opcode::ThreadGet));
    assert_eq!(rig.hw.stack(STACK_BX), 1);
    assert_eq!(rig.hw.stack(STACK_CX), 1);

    rig.hw.threads.current_mut().stacks.push(STACK_CX, 5);
    assert!(rig.bonus(Opcode::ThreadGet));
    assert_eq!(rig.hw.stack(STACK_BX), 0);
    assert_eq!(rig.hw.stack(STACK_CX), 0);
}

#[test]
fn test_slicing_all_runs_every_thread() {
    let config = HardwareConfig {
        max_cpu_threads: 2,
        thread_slicing: ThreadSlicing::All,
        ..quiet_config()
    };
    let mut rig = Rig::new(&[Opcode::ValInc; 8], config);
    rig.hw.thread_create(&Label::from_mods(&[0]), 0);
    rig.step();

    assert_eq!(rig.hw.threads().get(0).unwrap().stacks.top(STACK_BX), 1);
    assert_eq!(rig.hw.threads().get(1).unwrap().stacks.top(STACK_BX), 1);
    assert_eq!(rig.org.phenotype().time_used, 1);
}

// =============================================================================
// Parasites
// =============================================================================

fn parasite_code() -> Genome {
    genome(&[Opcode::ValInc; 8])
}

#[test]
fn test_parasite_infect_installs_thread() {
    let config = HardwareConfig { max_cpu_threads: 2, inject_is_virulent: true, ..quiet_config() };
    let mut rig = Rig::new(&filler(8), config);
    let parasite = Parasite::new(7, Label::from_mods(&[1]), parasite_code());

    assert!(rig.hw.parasite_infect_host(&parasite, &mut rig.org));
    assert_eq!(rig.hw.num_threads(), 2);
    assert_eq!(rig.hw.memory().len(), 2);
    let thread = rig.hw.threads().get(1).unwrap();
    assert_eq!(thread.owner, ThreadOwner::Parasite(7));
    assert_eq!(*thread.ip(), Head::new(1, 0));
    let space = rig.hw.memory().space(1).unwrap();
    assert_eq!(space.count_flag(space.len(), SiteFlags::INJECTED), 8);
    assert!(rig.org.phenotype().is_modified);
    assert!(rig.hw.threads().get(0).unwrap().skip_cycle);

    // Label now names a space
    assert!(!rig.hw.parasite_infect_host(&parasite, &mut rig.org));
}

#[test]
fn test_virulent_infection_skips_host_once() {
    let config = HardwareConfig { max_cpu_threads: 2, inject_is_virulent: true, ..quiet_config() };
    let mut rig = Rig::new(&filler(8), config);
    let parasite = Parasite::new(1, Label::from_mods(&[2]), parasite_code());
    assert!(rig.hw.parasite_infect_host(&parasite, &mut rig.org));

    rig.run(2);
    let host = rig.hw.threads().get(0).unwrap();
    assert!(!host.skip_cycle);
    assert_eq!(*host.ip(), Head::new(0, 0));
    assert_eq!(*rig.hw.threads().get(1).unwrap().ip(), Head::new(1, 1));

    rig.run(2);
    assert_eq!(*rig.hw.threads().get(0).unwrap().ip(), Head::new(0, 1));
}

#[test]
fn test_parasite_virulence_biases_scheduling() {
    let config = HardwareConfig { max_cpu_threads: 2, ..quiet_config() };
    let mut rig = Rig::new(&filler(8), config);
    let parasite = Parasite::new(1, Label::from_mods(&[0]), parasite_code()).with_virulence(1.0);
    assert!(rig.hw.parasite_infect_host(&parasite, &mut rig.org));

    rig.run(5);
    assert_eq!(*rig.hw.threads().get(0).unwrap().ip(), Head::new(0, 0));
    assert_eq!(*rig.hw.threads().get(1).unwrap().ip(), Head::new(1, 5));
    assert_eq!(rig.rng.draws(), 5);
}

#[test]
fn test_parasite_infect_respects_thread_cap() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    let parasite = Parasite::new(1, Label::from_mods(&[0]), parasite_code());
    assert!(!rig.hw.parasite_infect_host(&parasite, &mut rig.org));
    assert_eq!(rig.hw.memory().len(), 1);
    assert!(!rig.org.phenotype().is_modified);
}

#[test]
fn test_reset_clears_parasites() {
    let config = HardwareConfig { max_cpu_threads: 2, ..quiet_config() };
    let mut rig = Rig::new(&filler(8), config);
    let parasite = Parasite::new(1, Label::from_mods(&[0]), parasite_code());
    assert!(rig.hw.parasite_infect_host(&parasite, &mut rig.org));

    rig.hw.reset(&mut rig.org);
    assert_eq!(rig.hw.memory().len(), 1);
    assert_eq!(rig.hw.num_threads(), 1);
    assert_eq!(rig.org.parasites_cleared, 1);
    assert!(rig.hw.ok());
}

fn inject_rig(config: HardwareConfig, end: i32) -> Rig {
    let mut ops = vec![Opcode::Inject, Opcode::NopB];
    ops.extend(filler(6));
    let mut rig = Rig::new(&ops, config);
    let space = rig.hw.find_memory_space(&Label::from_mods(&[3]));
    rig.hw.memory_mut().space_mut(space).unwrap().load(&genome(&filler(10)), Opcode::NopA.inst());
    rig.hw.threads.current_mut().head_mut(HeadKind::Write).set(end, space);
    rig
}

#[test]
fn test_inject_sends_block_and_reclaims_space() {
    let mut rig = inject_rig(quiet_config(), 9);
    rig.step();

    assert_eq!(rig.org.injections.len(), 1);
    let record = &rig.org.injections[0];
    assert_eq!(record.code.len(), 9);
    assert_eq!(record.label, Label::from_mods(&[1]));
    assert_eq!(record.owner, ThreadOwner::Host);
    assert_eq!(rig.hw.memory().space(1).unwrap().len(), 1);
    // IP stays on the label; the next fetch is the instruction after it
    assert_eq!(rig.hw.ip(), Head::new(0, 1));
    assert_eq!(rig.hw.head(HeadKind::Write), Head::new(1, 0));
    assert_eq!(rig.org.phenotype().inst_count(Opcode::Inject.as_u8()), 1);
    rig.step();
    assert_eq!(rig.hw.ip(), Head::new(0, 2));
}

#[test]
fn test_parasite_inject_label_stays_out_of_host_namespace() {
    let config = HardwareConfig { parasite_mem_spaces: true, ..quiet_config() };
    let mut rig = inject_rig(config, 9);
    rig.hw.threads.current_mut().owner = ThreadOwner::Parasite(5);
    rig.step();

    assert_eq!(rig.org.injections.len(), 1);
    let record = &rig.org.injections[0];
    assert_eq!(record.owner, ThreadOwner::Parasite(5));
    assert_eq!(record.label, Label::from_mods(&[1, 1, 1, 1, 1]));

    // The neighbour installs it where its own Mem-Set B cannot reach
    let config = HardwareConfig { max_cpu_threads: 2, parasite_mem_spaces: true, ..quiet_config() };
    let mut ops = vec![Opcode::MemSet, Opcode::NopB];
    ops.extend(filler(6));
    let mut host = Rig::new(&ops, config);
    let parasite = Parasite::new(5, record.label.clone(), parasite_code());
    assert!(host.hw.parasite_infect_host(&parasite, &mut host.org));
    assert_eq!(host.hw.memory().len(), 2);

    host.hw.threads.set_current(0);
    assert!(host.bonus(Opcode::MemSet));
    assert_eq!(host.hw.head(HeadKind::Flow), Head::new(2, 0));
    assert_eq!(*host.hw.threads().get(1).unwrap().ip(), Head::new(1, 0));
}

#[test]
fn test_host_inject_label_is_not_namespaced() {
    let config = HardwareConfig { parasite_mem_spaces: true, ..quiet_config() };
    let mut rig = inject_rig(config, 9);
    rig.step();
    assert_eq!(rig.org.injections[0].label, Label::from_mods(&[1]));
}

#[test]
fn test_inject_mutations_use_inject_rates() {
    let mut config = quiet_config();
    config.mutations.inject_mut_prob = 1.0;
    config.mutations.inject_del_prob = 1.0;
    config.mutations.div_ins_prob = 1.0;
    let mut rig = inject_rig(config, 9);

    let draws = rig.rng.draws();
    rig.step();
    // substitutions: 9 trials + site and instruction each; deletions: 9 trials + 1 site
    assert_eq!(rig.rng.draws(), draws + 27 + 10);
    assert_eq!(rig.org.injections[0].code.len(), MIN_GENOME_LENGTH);
    assert_eq!(rig.org.phenotype().div_type, 1.0);
}

#[test]
fn test_inject_too_small_reclaims_and_faults() {
    let mut rig = inject_rig(quiet_config(), 3);
    rig.step();

    assert!(rig.org.injections.is_empty());
    assert_eq!(rig.org.fault_count(FaultLocation::Inject), 1);
    assert_eq!(rig.org.faults[0].message, "inject: new size too small");
    assert_eq!(rig.hw.memory().space(1).unwrap().len(), 1);
}

#[test]
fn test_inject_refused_still_reclaims() {
    let mut rig = inject_rig(quiet_config(), 9);
    rig.org.accept_parasites = false;
    rig.step();

    assert_eq!(rig.org.injections.len(), 1);
    assert_eq!(rig.hw.memory().space(1).unwrap().len(), 1);
    assert_eq!(rig.org.phenotype().inst_count(Opcode::Inject.as_u8()), 0);
}

#[test]
fn test_inject_split_restarts_thread() {
    let config = HardwareConfig { inject_method: InjectMethod::Split, ..quiet_config() };
    let mut rig = inject_rig(config, 9);
    rig.hw.threads.current_mut().stacks.push(STACK_AX, 4);
    rig.step();

    assert_eq!(rig.hw.ip(), Head::new(0, 0));
    assert_eq!(rig.hw.head(HeadKind::Write), Head::new(0, 0));
    assert_eq!(rig.hw.stack(STACK_AX), 0);
}

// =============================================================================
// Engine
// =============================================================================

#[test]
fn test_cost_delays_execution() {
    let over = InstOverride { cost: 3, ..InstOverride::default() };
    let lib = InstLib::with_overrides(&InstSetConfig::default().with("Val-Inc", over)).unwrap();
    let mut rig = Rig::with_lib(&[Opcode::ValInc; 8], quiet_config(), lib);

    rig.run(2);
    assert_eq!(rig.hw.stack(STACK_BX), 0);
    assert_eq!(rig.hw.ip(), Head::new(0, 0));
    rig.step();
    assert_eq!(rig.hw.stack(STACK_BX), 1);
    assert_eq!(rig.hw.ip(), Head::new(0, 1));
    rig.run(3);
    assert_eq!(rig.hw.stack(STACK_BX), 2);
}

#[test]
fn test_prob_fail_skips_but_advances() {
    let over = InstOverride { prob_fail: 1.0, ..InstOverride::default() };
    let lib = InstLib::with_overrides(&InstSetConfig::default().with("Val-Inc", over)).unwrap();
    let mut rig = Rig::with_lib(&[Opcode::ValInc; 8], quiet_config(), lib);

    rig.step();
    assert_eq!(rig.hw.stack(STACK_BX), 0);
    assert_eq!(rig.hw.ip(), Head::new(0, 1));
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValInc.as_u8()), 0);
    assert_eq!(rig.rng.draws(), 1);
}

/// Library whose random instruction is always Val-Dec
fn val_dec_only(val_inc: InstOverride) -> InstLib {
    let standard = InstLib::standard();
    let mut set = InstSetConfig::default().with("Val-Inc", InstOverride { redundancy: 0, ..val_inc });
    for op in 0..standard.size() {
        let name = standard.name(Instruction::new(op as u8));
        if name != "Val-Dec" && name != "Val-Inc" {
            set = set.with(name, InstOverride { redundancy: 0, ..InstOverride::default() });
        }
    }
    InstLib::with_overrides(&set).unwrap()
}

#[test]
fn test_exec_error_substitutes_random_instruction() {
    let mut config = quiet_config();
    config.mutations.exec_err_prob = 1.0;
    let lib = val_dec_only(InstOverride { prob_fail: 1e-12, ..InstOverride::default() });
    let mut rig = Rig::with_lib(&[Opcode::ValInc; 8], config, lib);

    rig.step();
    // prob_fail trial, exec error trial, random instruction
    assert_eq!(rig.rng.draws(), 3);
    assert_eq!(rig.hw.stack(STACK_BX), -1);
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValDec.as_u8()), 1);
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValInc.as_u8()), 0);
    assert_eq!(rig.hw.ip(), Head::new(0, 1));
}

#[test]
fn test_exec_error_not_drawn_when_instruction_fails() {
    let mut config = quiet_config();
    config.mutations.exec_err_prob = 1.0;
    let lib = val_dec_only(InstOverride { prob_fail: 1.0, ..InstOverride::default() });
    let mut rig = Rig::with_lib(&[Opcode::ValInc; 8], config, lib);

    rig.step();
    assert_eq!(rig.rng.draws(), 1);
    assert_eq!(rig.hw.stack(STACK_BX), 0);
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValDec.as_u8()), 0);
}

#[test]
fn test_instruction_budget_kills() {
    let config = HardwareConfig { max_executed: 3, ..quiet_config() };
    let mut rig = Rig::new(&filler(8), config);
    assert_eq!(rig.step(), StepResult::Continue);
    assert_eq!(rig.step(), StepResult::Continue);
    assert_eq!(rig.step(), StepResult::Died);
    assert!(rig.org.dead);
}

#[test]
fn test_apoptosis_calls_die() {
    let mut rig = Rig::new(&[Opcode::Apoptosis; 8], quiet_config());
    rig.step();
    assert!(rig.org.dead);
}

#[test]
fn test_io_outputs_then_reads() {
    let mut rig = Rig::new(&[Opcode::Io; 8], quiet_config());
    rig.org.inputs = vec![5, 6];
    rig.run(2);
    assert_eq!(rig.org.outputs, vec![0, 5]);
    assert_eq!(rig.org.inputs_taken, vec![5, 6]);
    assert_eq!(rig.hw.stack(STACK_BX), 6);
}

#[test]
fn test_messages_loop_back() {
    let mut ops = vec![Opcode::SendMsg, Opcode::RetrieveMsg, Opcode::RetrieveMsg];
    ops.extend(filler(5));
    let mut rig = Rig::new(&ops, quiet_config());
    rig.org.loopback = true;
    rig.hw.threads.current_mut().stacks.push(STACK_BX, 3);
    rig.hw.threads.current_mut().stacks.push(STACK_CX, 4);

    rig.run(2);
    assert_eq!(rig.org.sent, vec![(3, 4)]);
    assert_eq!(rig.hw.stack(STACK_BX), 4);
    assert_eq!(rig.hw.stack(STACK_CX), 3);

    rig.step();
    assert_eq!(rig.org.phenotype().inst_count(Opcode::RetrieveMsg.as_u8()), 1);
}

#[test]
fn test_breakpoint_signals_organism() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    rig.hw.memory_mut().genome_mut().set_flag(0, SiteFlags::BREAKPOINT);
    rig.run(2);
    assert_eq!(rig.org.breakpoints, 1);
}

#[test]
fn test_executed_flags_and_counts() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    rig.run(3);
    let genome = rig.hw.memory().genome();
    assert_eq!(genome.count_flag(genome.len(), SiteFlags::EXECUTED), 3);
    assert_eq!(rig.org.phenotype().inst_count(Opcode::ValAdd.as_u8()), 3);
    assert_eq!(rig.hw.state(), EngineState::Idle);
}

#[test]
fn test_ok_detects_bad_head() {
    let mut rig = Rig::new(&filler(8), quiet_config());
    assert!(rig.hw.ok());
    rig.hw.threads.current_mut().head_mut(HeadKind::Read).pos = 99;
    assert!(!rig.hw.ok());
}

#[test]
fn test_print_status() {
    let mut rig = Rig::new(&SELF_COPY, quiet_config());
    rig.run(3);
    let mut out = Vec::new();
    rig.hw.print_status(&mut out, &rig.org).unwrap();
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("IP:(0, 5)"));
    assert!(text.contains("Mem 1"));
    assert!(text.contains("BX:"));
}
